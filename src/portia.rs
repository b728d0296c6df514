//! Client side of the Portia number-porting protocol.
//!
//! # Module Structure
//!
//! - `protocol` - envelopes, reference ids and the newline-delimited JSON codec
//! - `actor` - ResponseRouter (pending requests, deadlines) and the Reader task
//! - `client` - PortiaClient with the typed `get`/`resolve`/`annotate` operations
//! - `connection` - Connector trait and the TCP connector
//! - `manager` - ConnectionManager: reconnect loop and bounded client acquisition

mod actor;
mod client;
mod connection;
mod connection_state;
mod manager;
pub mod protocol;

pub use client::{
    AnnotationRecord, DEFAULT_REQUEST_TIMEOUT, OBSERVED_NETWORK, PortiaClient, Resolution,
    normalize_msisdn,
};
pub use connection::{Connector, TcpConnector};
pub use connection_state::{ConnectionPhase, ConnectionState};
pub use manager::{ConnectionManager, ConnectionOptions};

#[cfg(test)]
pub(crate) use connection::test_helpers;
