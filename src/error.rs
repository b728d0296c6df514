//! Error handling types for portia-router
//!
//! Errors are layered the same way the router is: configuration problems are
//! caught once at construction, protocol anomalies are logged and isolated to
//! a single line, request failures reach the caller that issued the request,
//! and dispatch failures are reported per record.

use std::io;
use std::path::PathBuf;
use std::sync::PoisonError;
use std::time::Duration;

use thiserror::Error;

use crate::portia::protocol::{Command, ReferenceId};
use crate::routing::Route;

/// Rejected configuration. Fatal to startup, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two routes declare the same MNO, so outbound routing would be ambiguous.
    #[error("mappings are not unique: MNO {mno} is declared by both {first} and {second}")]
    DuplicateMno {
        mno: String,
        first: Route,
        second: Route,
    },

    /// Flat-form mapping sends two MNOs to the same transport.
    #[error("mappings are not unique: transport {transport} is mapped to both {first} and {second}")]
    DuplicateTransport {
        transport: String,
        first: String,
        second: String,
    },

    /// The mapped transports differ from the configured receivable transports.
    #[error("mappings differ from configured transports: configured {configured:?}, mapped {mapped:?}")]
    TransportMismatch {
        configured: Vec<String>,
        mapped: Vec<String>,
    },

    /// Anything other than exactly one application-facing connector.
    #[error(
        "only able to work with 1 receive outbound connector, there are {count} configured"
    )]
    OutboundConnectorCount { count: usize },

    /// Settings file could not be read.
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Settings file is not valid TOML or does not match the schema.
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A received line that could not be matched to a pending request.
///
/// Anomalies are logged by the reader and never tear down the connection.
#[derive(Debug, Error)]
pub enum ProtocolAnomaly {
    #[error("malformed reply line: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("reply is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("reply has unknown status {0:?}")]
    UnknownStatus(String),

    #[error("reply line exceeds the maximum line length")]
    LineTooLong,

    /// Late or duplicate reply, typically after the local deadline already fired.
    #[error("reply for unknown reference id {reference_id} ({reference_cmd})")]
    Unmatched {
        reference_id: ReferenceId,
        reference_cmd: String,
    },
}

/// Failure of a single request issued through the client.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The server answered with `status = "error"`.
    #[error("{message}")]
    Server {
        message: String,
        /// Full reply payload as received.
        reply: serde_json::Value,
    },

    #[error("Timeout exceeded.")]
    Timeout {
        reference_id: ReferenceId,
        cmd: Command,
    },

    #[error("connection closed before {cmd} request {reference_id} completed")]
    ConnectionClosed {
        reference_id: ReferenceId,
        cmd: Command,
    },

    /// No connected client became available within the bounded wait.
    #[error("no connected client available after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("reference id {reference_id} is already pending")]
    DuplicateReference { reference_id: ReferenceId },

    #[error("failed to send {cmd} request {reference_id}: {source}")]
    Send {
        reference_id: ReferenceId,
        cmd: Command,
        #[source]
        source: io::Error,
    },

    #[error("unexpected {cmd} response: {source}")]
    UnexpectedResponse {
        cmd: Command,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid annotation timestamp: {0}")]
    InvalidTimestamp(#[from] time::error::Format),
}

/// Per-record dispatch failure. The record is not forwarded.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no endpoint configured for {connector}")]
    UnknownConnector { connector: String },

    #[error("no MNO configured for {connector}:{endpoint}")]
    UnknownEndpoint { connector: String, endpoint: String },

    #[error("unable to route outbound message to {number}: Portia was unable to resolve")]
    Unresolved { number: String },

    #[error("unable to route outbound message to {number}: no mapping for network {network}")]
    NoMapping { number: String, network: String },

    #[error("record has no {0} field")]
    MissingField(&'static str),

    #[error("record {field} {value:?} holds no phone number")]
    InvalidNumber { field: &'static str, value: String },

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("failed to publish to {target}: {source}")]
    Publish {
        target: Route,
        #[source]
        source: io::Error,
    },
}

/// Recover the guard from a poisoned lock, logging which operation hit it.
pub(crate) trait LockResultExt<T> {
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "portia_router::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}
