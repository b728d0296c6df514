//! Per-record routing decisions.
//!
//! Each record is handled as one task with three suspension points at most:
//! acquiring a client, one Portia request, and the publish. A failure at any
//! step ends the task and the record is not published.

use log::{debug, info, warn};

use super::publisher::Publisher;
use super::record::{Record, RecordKind};
use crate::config::Settings;
use crate::error::{ConfigError, DispatchError};
use crate::portia::{
    ConnectionManager, ConnectionOptions, OBSERVED_NETWORK, TcpConnector, normalize_msisdn,
};
use crate::routing::{Route, RoutingTable};

/// Routes bus records between transport connectors and the application
/// connector, using Portia to learn and look up MNOs.
pub struct Dispatcher<P> {
    table: RoutingTable,
    connections: ConnectionManager,
    publisher: P,
}

impl<P: Publisher> Dispatcher<P> {
    pub fn new(table: RoutingTable, connections: ConnectionManager, publisher: P) -> Self {
        info!(
            target: "portia_router::dispatch",
            "Dispatcher ready: {} routes, application connector {}",
            table.len(),
            table.application_connector()
        );
        Self {
            table,
            connections,
            publisher,
        }
    }

    /// Validate the routing section, then start connecting to Portia over TCP.
    ///
    /// An invalid routing section never opens a connection.
    pub fn from_settings(settings: &Settings, publisher: P) -> Result<Self, ConfigError> {
        let table = RoutingTable::from_settings(&settings.routing)?;
        let connections = ConnectionManager::start(
            TcpConnector::new(settings.portia.endpoint.as_str()),
            ConnectionOptions::from(&settings.portia),
        );
        Ok(Self::new(table, connections, publisher))
    }

    /// Route one record and publish it. Returns where it was published.
    pub async fn dispatch(
        &self,
        kind: RecordKind,
        connector: &str,
        record: Record,
    ) -> Result<Route, DispatchError> {
        let result = match kind {
            RecordKind::Inbound => self.dispatch_inbound(connector, record).await,
            RecordKind::Outbound => self.dispatch_outbound(record).await,
            RecordKind::Event => self.dispatch_event(record).await,
        };

        if let Err(e) = &result {
            warn!(
                target: "portia_router::dispatch",
                "Dropped {} record from {}: {}",
                kind.as_str(),
                connector,
                e
            );
        }
        result
    }

    /// Record the network the sender was seen on, then hand the message to
    /// the application.
    pub async fn dispatch_inbound(
        &self,
        connector: &str,
        record: Record,
    ) -> Result<Route, DispatchError> {
        let mno = self
            .table
            .mno_for(connector, record.routing_endpoint())?
            .to_owned();
        let sender = phone_number(record.from_addr(), "from_addr")?;

        let client = self.connections.acquire_client().await?;
        client.annotate(sender, OBSERVED_NETWORK, &mno, None).await?;
        debug!(
            target: "portia_router::dispatch",
            "Annotated {} with {}={}",
            sender,
            OBSERVED_NETWORK,
            mno
        );

        self.forward(RecordKind::Inbound, self.table.application_route(), record)
            .await
    }

    /// Resolve the recipient's MNO and send the message out through the
    /// transport mapped to it, or the fallback transport.
    pub async fn dispatch_outbound(&self, record: Record) -> Result<Route, DispatchError> {
        let recipient = phone_number(record.to_addr(), "to_addr")?;

        let client = self.connections.acquire_client().await?;
        let resolution = client.resolve(recipient).await?;
        let target = self.outbound_target(recipient, resolution.network)?;

        self.forward(RecordKind::Outbound, target, record).await
    }

    /// Events need no resolution and always go to the application.
    pub async fn dispatch_event(&self, record: Record) -> Result<Route, DispatchError> {
        self.forward(RecordKind::Event, self.table.application_route(), record)
            .await
    }

    fn outbound_target(
        &self,
        recipient: &str,
        network: Option<String>,
    ) -> Result<Route, DispatchError> {
        let Some(network) = network else {
            return self
                .table
                .fallback()
                .cloned()
                .ok_or_else(|| DispatchError::Unresolved {
                    number: recipient.to_owned(),
                });
        };

        match self.table.route_for(&network).or(self.table.fallback()) {
            Some(route) => Ok(route.clone()),
            None => Err(DispatchError::NoMapping {
                number: recipient.to_owned(),
                network,
            }),
        }
    }

    async fn forward(
        &self,
        kind: RecordKind,
        target: Route,
        mut record: Record,
    ) -> Result<Route, DispatchError> {
        record.set_routing_endpoint(&target.endpoint);
        if let Err(source) = self.publisher.publish(kind, &target, record).await {
            return Err(DispatchError::Publish { target, source });
        }
        debug!(
            target: "portia_router::dispatch",
            "Published {} record to {}",
            kind.as_str(),
            target
        );
        Ok(target)
    }

    /// Stop reconnecting and close the Portia connection. Requests still in
    /// flight fail with connection-closed.
    pub async fn shutdown(&self) {
        info!(target: "portia_router::dispatch", "Dispatcher shutting down");
        self.connections.shutdown().await;
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

/// The address in `field`, if it holds at least one digit to send Portia.
fn phone_number<'a>(
    addr: Option<&'a str>,
    field: &'static str,
) -> Result<&'a str, DispatchError> {
    let addr = addr.ok_or(DispatchError::MissingField(field))?;
    if normalize_msisdn(addr).is_empty() {
        return Err(DispatchError::InvalidNumber {
            field,
            value: addr.to_owned(),
        });
    }
    Ok(addr)
}
