//! Bus records as seen by the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::routing::DEFAULT_ENDPOINT;

const ROUTING_METADATA: &str = "routing_metadata";
const ENDPOINT_NAME: &str = "endpoint_name";

/// Which dispatch path a record takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Arrived on a transport, heading for the application.
    Inbound,
    /// Sent by the application, heading for whichever transport serves the recipient.
    Outbound,
    /// Delivery report or acknowledgement; never resolved.
    Event,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
            Self::Event => "event",
        }
    }
}

/// An opaque JSON message. Only the addressing fields are interpreted; every
/// other field is forwarded untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_addr(&self) -> Option<&str> {
        self.str_field("from_addr")
    }

    pub fn to_addr(&self) -> Option<&str> {
        self.str_field("to_addr")
    }

    /// Connector the record arrived on, when the bus recorded it.
    pub fn transport_name(&self) -> Option<&str> {
        self.str_field("transport_name")
    }

    /// Endpoint tag from the routing metadata, `default` when absent.
    pub fn routing_endpoint(&self) -> &str {
        self.0
            .get(ROUTING_METADATA)
            .and_then(|meta| meta.get(ENDPOINT_NAME))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ENDPOINT)
    }

    /// Stamp the endpoint the record is being published to.
    ///
    /// Replaces a non-object `routing_metadata` value.
    pub fn set_routing_endpoint(&mut self, endpoint: &str) {
        let meta = self
            .0
            .entry(ROUTING_METADATA)
            .or_insert_with(|| Value::Object(Map::new()));
        if !meta.is_object() {
            *meta = Value::Object(Map::new());
        }
        if let Value::Object(meta) = meta {
            meta.insert(ENDPOINT_NAME.to_owned(), Value::String(endpoint.to_owned()));
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
