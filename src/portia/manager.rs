//! Lifecycle management for the Portia connection.
//!
//! The ConnectionManager owns exactly one connection attempt at a time. A
//! supervisor task drives the state machine in [`ConnectionState`]:
//! connect, run until the connection is lost, back off, reconnect. The
//! supervisor is the only writer of the state, so transitions are serialized
//! by construction.
//!
//! Readers take lock-free snapshots of the current state through `ArcSwap`.
//! Waiters subscribe to phase changes through a `watch` channel instead of
//! polling.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::client::DEFAULT_REQUEST_TIMEOUT;
use super::connection::Connector;
use super::connection_state::{ConnectionPhase, ConnectionState};
use super::PortiaClient;
use crate::config::PortiaSettings;
use crate::error::{LockResultExt, RequestError};

/// Timing knobs for the ConnectionManager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Per-request deadline for clients created by the manager.
    pub request_timeout: Duration,
    /// Bounded wait of `acquire_client`.
    pub acquire_timeout: Duration,
    /// First reconnect delay; doubles per failed attempt.
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            acquire_timeout: Duration::from_secs(10),
            reconnect_initial_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_secs(5),
        }
    }
}

impl From<&PortiaSettings> for ConnectionOptions {
    fn from(settings: &PortiaSettings) -> Self {
        Self {
            request_timeout: settings.request_timeout(),
            acquire_timeout: settings.acquire_timeout(),
            reconnect_initial_delay: settings.reconnect_initial_delay(),
            reconnect_max_delay: settings.reconnect_max_delay(),
        }
    }
}

/// Floor of the reconnect backoff; a zero delay would retry a refusing
/// endpoint in a busy loop.
const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(10);

/// State shared between the manager handle and its supervisor task.
struct Shared {
    state: ArcSwap<ConnectionState>,
    phase: watch::Sender<ConnectionPhase>,
}

impl Shared {
    fn transition(&self, next: ConnectionState) {
        let phase = next.phase();
        self.state.store(Arc::new(next));
        self.phase.send_replace(phase);
    }
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
    options: ConnectionOptions,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Start managing connections produced by `connector`.
    ///
    /// Returns immediately; the first attempt runs in the background.
    pub fn start<C: Connector>(connector: C, options: ConnectionOptions) -> Self {
        let (phase, _) = watch::channel(ConnectionPhase::Disconnected);
        let shared = Arc::new(Shared {
            state: ArcSwap::from_pointee(ConnectionState::Disconnected),
            phase,
        });
        let shutdown = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(
            connector,
            Arc::clone(&shared),
            options,
            shutdown.clone(),
        ));

        Self {
            shared,
            options,
            shutdown,
            supervisor: Mutex::new(Some(supervisor)),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.shared.state.load().phase()
    }

    /// Snapshot of the active client, if connected.
    pub fn current_client(&self) -> Option<Arc<PortiaClient>> {
        self.shared.state.load().client().cloned()
    }

    /// Subscribe to connect/disconnect transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionPhase> {
        self.shared.phase.subscribe()
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Wait up to the configured acquire timeout for a connected client.
    pub async fn acquire_client(&self) -> Result<Arc<PortiaClient>, RequestError> {
        self.acquire_client_within(self.options.acquire_timeout)
            .await
    }

    /// Wait up to `timeout` for a connected client.
    ///
    /// Resolves immediately when connected. Otherwise waits for the next
    /// transition to Connected and fails with `ConnectionTimeout` once
    /// `timeout` elapses. The wait is dropped as soon as either happens.
    pub async fn acquire_client_within(
        &self,
        timeout: Duration,
    ) -> Result<Arc<PortiaClient>, RequestError> {
        // Subscribe before the snapshot so a transition in between is not missed.
        let mut phases = self.subscribe();
        if let Some(client) = self.live_client() {
            return Ok(client);
        }

        let wait = async {
            loop {
                if phases.changed().await.is_err() {
                    // Supervisor gone; nothing will ever connect again.
                    return std::future::pending().await;
                }
                if let Some(client) = self.live_client() {
                    return client;
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| RequestError::ConnectionTimeout(timeout))
    }

    /// The current client, unless its connection already went away and the
    /// supervisor has not caught up yet.
    fn live_client(&self) -> Option<Arc<PortiaClient>> {
        self.current_client().filter(|client| !client.is_closed())
    }

    /// Stop reconnecting and close the active connection.
    ///
    /// Requests still pending on the connection fail with connection-closed.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let supervisor = self
            .supervisor
            .lock()
            .recover_poison("ConnectionManager::shutdown")
            .take();
        if let Some(supervisor) = supervisor {
            if let Err(e) = supervisor.await {
                warn!(target: "portia_router::manager", "Supervisor task failed: {}", e);
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Supervisor loop: one connection attempt at a time, reconnect on loss.
async fn supervise<C: Connector>(
    connector: C,
    shared: Arc<Shared>,
    options: ConnectionOptions,
    shutdown: CancellationToken,
) {
    let target = connector.describe();
    let initial_delay = options.reconnect_initial_delay.max(MIN_RECONNECT_DELAY);
    let max_delay = options.reconnect_max_delay.max(initial_delay);
    let mut delay = initial_delay;

    loop {
        shared.transition(ConnectionState::Connecting);
        debug!(target: "portia_router::manager", "Connecting to {}", target);

        let attempt = tokio::select! {
            _ = shutdown.cancelled() => break,
            attempt = connector.connect() => attempt,
        };

        match attempt {
            Ok(stream) => {
                info!(target: "portia_router::manager", "Connected to {}", target);
                let client = Arc::new(PortiaClient::new(stream, options.request_timeout));
                shared.transition(ConnectionState::Connected(Arc::clone(&client)));
                delay = initial_delay;

                tokio::select! {
                    _ = shutdown.cancelled() => {
                        client.close();
                        client.closed().await;
                        break;
                    }
                    _ = client.closed() => {
                        warn!(target: "portia_router::manager", "Lost connection to {}", target);
                    }
                }
                shared.transition(ConnectionState::Disconnected);
            }
            Err(e) => {
                warn!(
                    target: "portia_router::manager",
                    "Failed to connect to {}: {} (retrying in {:?})",
                    target,
                    e,
                    delay
                );
                shared.transition(ConnectionState::Disconnected);
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = (delay * 2).min(max_delay);
    }

    shared.transition(ConnectionState::Disconnected);
    debug!(target: "portia_router::manager", "Supervisor for {} stopped", target);
}
