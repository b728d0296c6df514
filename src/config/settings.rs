use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level router settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub portia: PortiaSettings,
    pub routing: RoutingSettings,
}

/// Where and how to talk to the Portia server.
#[derive(Debug, Clone, Deserialize)]
pub struct PortiaSettings {
    /// `host:port` of the resolution server.
    pub endpoint: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_initial_delay_ms() -> u64 {
    100
}

fn default_reconnect_max_delay_ms() -> u64 {
    5_000
}

impl PortiaSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout_ms: default_request_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

/// The two accepted shapes of the routing section.
///
/// Both are normalized into the same `RoutingTable`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RoutingSettings {
    Nested(NestedRouting),
    Flat(FlatRouting),
}

/// transport -> endpoint -> MNO
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NestedRouting {
    pub mapping: BTreeMap<String, BTreeMap<String, String>>,
    pub receive_inbound_connectors: Vec<String>,
    pub receive_outbound_connectors: Vec<String>,
}

/// MNO -> transport, with an optional default transport.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlatRouting {
    pub mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub default_transport: Option<String>,
    pub transport_names: Vec<String>,
    pub exposed_names: Vec<String>,
}
