//! Validated bidirectional mapping between routes and MNOs.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use serde::Serialize;

use crate::error::{ConfigError, DispatchError};

/// Endpoint used when a record does not carry one, and for every forward to
/// the application connector.
pub const DEFAULT_ENDPOINT: &str = "default";

/// A (connector, endpoint) pair that records are published to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Route {
    pub transport: String,
    pub endpoint: String,
}

impl Route {
    pub fn new(transport: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            endpoint: endpoint.into(),
        }
    }

    /// `transport` at the `default` endpoint.
    pub fn default_endpoint(transport: impl Into<String>) -> Self {
        Self::new(transport, DEFAULT_ENDPOINT)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport, self.endpoint)
    }
}

/// Immutable routing table shared by every in-flight dispatch.
///
/// - forward index: route -> MNO, used on inbound
/// - reverse index: MNO -> route, used on outbound; always the exact inverse
///   of the forward index
///
/// Built once by `from_nested` or `from_flat`; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    forward: HashMap<Route, String>,
    reverse: HashMap<String, Route>,
    /// Used on outbound when resolution yields no MNO or an unmapped one.
    fallback: Option<Route>,
    /// The single application-facing connector.
    application: String,
}

/// Forward and reverse indexes built together from `(route, mno)` entries.
pub(super) struct Indexes {
    forward: HashMap<Route, String>,
    reverse: HashMap<String, Route>,
}

impl Indexes {
    /// Rejects any MNO declared by more than one route.
    pub(super) fn build(
        entries: impl IntoIterator<Item = (Route, String)>,
    ) -> Result<Self, ConfigError> {
        let mut forward = HashMap::new();
        let mut reverse: HashMap<String, Route> = HashMap::new();

        for (route, mno) in entries {
            match reverse.entry(mno.clone()) {
                Entry::Occupied(existing) => {
                    return Err(ConfigError::DuplicateMno {
                        mno,
                        first: existing.get().clone(),
                        second: route,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(route.clone());
                }
            }
            forward.insert(route, mno);
        }

        Ok(Self { forward, reverse })
    }
}

impl RoutingTable {
    pub(super) fn from_indexes(
        indexes: Indexes,
        fallback: Option<Route>,
        application: String,
    ) -> Self {
        Self {
            forward: indexes.forward,
            reverse: indexes.reverse,
            fallback,
            application,
        }
    }

    /// Build both indexes from `(route, mno)` entries.
    pub(super) fn from_entries(
        entries: impl IntoIterator<Item = (Route, String)>,
        fallback: Option<Route>,
        application: String,
    ) -> Result<Self, ConfigError> {
        Ok(Self::from_indexes(Indexes::build(entries)?, fallback, application))
    }

    /// MNO declared for records arriving on `connector` at `endpoint`.
    pub fn mno_for(&self, connector: &str, endpoint: &str) -> Result<&str, DispatchError> {
        let route = Route::new(connector, endpoint);
        if let Some(mno) = self.forward.get(&route) {
            return Ok(mno);
        }

        if self.is_mapped_transport(connector) {
            Err(DispatchError::UnknownEndpoint {
                connector: connector.to_owned(),
                endpoint: endpoint.to_owned(),
            })
        } else {
            Err(DispatchError::UnknownConnector {
                connector: connector.to_owned(),
            })
        }
    }

    /// Route mapped to `mno`, if any. Does not apply the fallback.
    pub fn route_for(&self, mno: &str) -> Option<&Route> {
        self.reverse.get(mno)
    }

    pub fn fallback(&self) -> Option<&Route> {
        self.fallback.as_ref()
    }

    pub fn application_connector(&self) -> &str {
        &self.application
    }

    /// Where inbound messages and events are forwarded.
    pub fn application_route(&self) -> Route {
        Route::default_endpoint(self.application.as_str())
    }

    pub fn is_mapped_transport(&self, transport: &str) -> bool {
        self.forward.keys().any(|route| route.transport == transport)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
