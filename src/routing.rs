//! Routing table between (transport, endpoint) routes and MNOs.
//!
//! - `table` - the immutable bidirectional table and its lookups
//! - `nested` - builder for the `transport -> endpoint -> MNO` configuration
//! - `flat` - builder for the `MNO -> transport` configuration with a default

mod flat;
mod nested;
mod table;

pub use table::{DEFAULT_ENDPOINT, Route, RoutingTable};

use crate::config::RoutingSettings;
use crate::error::ConfigError;

impl RoutingTable {
    /// Build and validate the table from either configuration shape.
    pub fn from_settings(settings: &RoutingSettings) -> Result<Self, ConfigError> {
        match settings {
            RoutingSettings::Nested(nested) => Self::from_nested(nested),
            RoutingSettings::Flat(flat) => Self::from_flat(flat),
        }
    }
}
