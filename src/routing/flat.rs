//! Builder for the flat `MNO -> transport` form with a default transport.

use std::collections::{BTreeSet, HashMap};

use super::nested::single_connector;
use super::{Route, RoutingTable};
use crate::config::FlatRouting;
use crate::error::ConfigError;

impl RoutingTable {
    /// Build the table from the flat form.
    ///
    /// Every mapping targets the transport's `default` endpoint. Validation:
    /// 1. no transport is mapped by two MNOs (keeps the forward index injective)
    /// 2. mapped transports plus the default transport are exactly the
    ///    configured `transport_names`
    /// 3. exactly one exposed (application-facing) connector
    pub fn from_flat(config: &FlatRouting) -> Result<Self, ConfigError> {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (mno, transport) in &config.mappings {
            if let Some(first) = owners.insert(transport.as_str(), mno.as_str()) {
                return Err(ConfigError::DuplicateTransport {
                    transport: transport.clone(),
                    first: first.to_owned(),
                    second: mno.clone(),
                });
            }
        }

        let mut known: BTreeSet<&String> = config.mappings.values().collect();
        known.extend(config.default_transport.as_ref());
        let configured: BTreeSet<&String> = config.transport_names.iter().collect();
        if known != configured {
            return Err(ConfigError::TransportMismatch {
                configured: configured.into_iter().cloned().collect(),
                mapped: known.into_iter().cloned().collect(),
            });
        }

        let application = single_connector(&config.exposed_names)?;
        let entries = config
            .mappings
            .iter()
            .map(|(mno, transport)| (Route::default_endpoint(transport.as_str()), mno.clone()));
        let fallback = config
            .default_transport
            .as_deref()
            .map(Route::default_endpoint);

        Self::from_entries(entries, fallback, application)
    }
}
