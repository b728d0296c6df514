//! Connection state machine for the Portia connection.

use std::sync::Arc;

use super::PortiaClient;

/// State of the managed Portia connection.
///
/// Transitions, driven only by the ConnectionManager's supervisor task:
/// - Disconnected -> Connecting (attempt started)
/// - Connecting -> Connected (stream established, client running)
/// - Connecting -> Disconnected (attempt failed, retry after backoff)
/// - Connected -> Disconnected (connection lost or shut down)
#[derive(Debug, Clone, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(Arc<PortiaClient>),
}

impl ConnectionState {
    pub fn phase(&self) -> ConnectionPhase {
        match self {
            ConnectionState::Disconnected => ConnectionPhase::Disconnected,
            ConnectionState::Connecting => ConnectionPhase::Connecting,
            ConnectionState::Connected(_) => ConnectionPhase::Connected,
        }
    }

    pub fn client(&self) -> Option<&Arc<PortiaClient>> {
        match self {
            ConnectionState::Connected(client) => Some(client),
            _ => None,
        }
    }
}

/// Client-less view of [`ConnectionState`], published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}
