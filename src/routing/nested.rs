//! Builder for the nested `transport -> endpoint -> MNO` form.

use std::collections::BTreeSet;

use super::table::Indexes;
use super::{Route, RoutingTable};
use crate::config::NestedRouting;
use crate::error::ConfigError;

impl RoutingTable {
    /// Build the table from the nested form.
    ///
    /// Validation, in order:
    /// 1. every declared MNO is unique across all transports and endpoints
    /// 2. the mapped transports are exactly the receivable inbound connectors
    /// 3. exactly one outbound-receiving connector is configured
    ///
    /// No fallback route exists in this form.
    pub fn from_nested(config: &NestedRouting) -> Result<Self, ConfigError> {
        let entries = config.mapping.iter().flat_map(|(transport, endpoints)| {
            endpoints
                .iter()
                .map(move |(endpoint, mno)| (Route::new(transport, endpoint), mno.clone()))
        });

        // Indexed before the other checks so ambiguity is reported first.
        let indexes = Indexes::build(entries)?;

        let configured: BTreeSet<&String> = config.receive_inbound_connectors.iter().collect();
        let mapped: BTreeSet<&String> = config.mapping.keys().collect();
        if configured != mapped {
            return Err(ConfigError::TransportMismatch {
                configured: configured.into_iter().cloned().collect(),
                mapped: mapped.into_iter().cloned().collect(),
            });
        }

        let application = single_connector(&config.receive_outbound_connectors)?;
        Ok(Self::from_indexes(indexes, None, application))
    }
}

/// The one configured application-facing connector.
pub(super) fn single_connector(connectors: &[String]) -> Result<String, ConfigError> {
    match connectors {
        [only] => Ok(only.clone()),
        _ => Err(ConfigError::OutboundConnectorCount {
            count: connectors.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn mapping(entries: &[(&str, &[(&str, &str)])]) -> BTreeMap<String, BTreeMap<String, String>> {
        entries
            .iter()
            .map(|(transport, endpoints)| {
                (
                    transport.to_string(),
                    endpoints
                        .iter()
                        .map(|(endpoint, mno)| (endpoint.to_string(), mno.to_string()))
                        .collect(),
                )
            })
            .collect()
    }

    fn config() -> NestedRouting {
        NestedRouting {
            mapping: mapping(&[
                ("transport1", &[("default", "mno1")]),
                ("transport2", &[("default", "mno2")]),
            ]),
            receive_inbound_connectors: vec!["transport1".into(), "transport2".into()],
            receive_outbound_connectors: vec!["app1".into()],
        }
    }

    #[test]
    fn builds_forward_and_reverse_indexes() {
        let table = RoutingTable::from_nested(&config()).unwrap();

        assert_eq!(table.mno_for("transport1", "default").unwrap(), "mno1");
        assert_eq!(
            table.route_for("mno2"),
            Some(&Route::default_endpoint("transport2"))
        );
        assert_eq!(table.application_connector(), "app1");
        assert_eq!(table.fallback(), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn supports_several_endpoints_per_transport() {
        let mut config = config();
        config.mapping = mapping(&[
            ("transport1", &[("default", "mno1"), ("ep1", "mno3")]),
            ("transport2", &[("default", "mno2")]),
        ]);

        let table = RoutingTable::from_nested(&config).unwrap();
        assert_eq!(table.route_for("mno3"), Some(&Route::new("transport1", "ep1")));
    }

    #[test]
    fn rejects_duplicate_mnos_across_transports() {
        let mut config = config();
        config.mapping = mapping(&[
            ("transport1", &[("default", "mno1")]),
            ("transport2", &[("default", "mno1"), ("ep1", "mno2")]),
        ]);

        let err = RoutingTable::from_nested(&config).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMno { ref mno, .. } if mno == "mno1"));
        assert!(err.to_string().starts_with("mappings are not unique"));
    }

    #[test]
    fn duplicate_mno_is_reported_before_other_problems() {
        let mut config = config();
        config.mapping = mapping(&[
            ("transport1", &[("default", "mno1")]),
            ("transport2", &[("default", "mno1")]),
        ]);
        config.receive_outbound_connectors.clear();

        assert!(matches!(
            RoutingTable::from_nested(&config),
            Err(ConfigError::DuplicateMno { .. })
        ));
    }

    #[test]
    fn rejects_unmapped_receivable_transport() {
        let mut config = config();
        config.receive_inbound_connectors.push("transport3".into());

        let err = RoutingTable::from_nested(&config).unwrap_err();
        assert!(matches!(err, ConfigError::TransportMismatch { .. }));
    }

    #[test]
    fn rejects_multiple_outbound_connectors() {
        let mut config = config();
        config.receive_outbound_connectors = vec!["app1".into(), "app2".into()];

        let err = RoutingTable::from_nested(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "only able to work with 1 receive outbound connector, there are 2 configured"
        );
    }

    #[test]
    fn rejects_missing_outbound_connector() {
        let mut config = config();
        config.receive_outbound_connectors.clear();

        assert!(matches!(
            RoutingTable::from_nested(&config),
            Err(ConfigError::OutboundConnectorCount { count: 0 })
        ));
    }
}
