//! Outbound side of the bus: where routed records are handed off.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::record::{Record, RecordKind};
use crate::error::LockResultExt;
use crate::routing::Route;

/// Publishes a routed record to a connector endpoint.
///
/// Implemented by whatever carries records between connectors: the stdio bus
/// of the binary, or a message broker when embedded.
pub trait Publisher: Send + Sync + 'static {
    fn publish(
        &self,
        kind: RecordKind,
        target: &Route,
        record: Record,
    ) -> impl Future<Output = io::Result<()>> + Send;
}

/// One publish decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Published {
    pub kind: RecordKind,
    pub connector: String,
    pub endpoint: String,
    pub record: Record,
}

impl Published {
    pub fn new(kind: RecordKind, target: &Route, record: Record) -> Self {
        Self {
            kind,
            connector: target.transport.clone(),
            endpoint: target.endpoint.clone(),
            record,
        }
    }

    pub fn route(&self) -> Route {
        Route::new(self.connector.as_str(), self.endpoint.as_str())
    }
}

/// Collects publish decisions in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    published: Arc<Mutex<Vec<Published>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in publish order.
    pub fn published(&self) -> Vec<Published> {
        self.published
            .lock()
            .recover_poison("MemoryPublisher::published")
            .clone()
    }

    pub fn take(&self) -> Vec<Published> {
        std::mem::take(
            &mut *self
                .published
                .lock()
                .recover_poison("MemoryPublisher::take"),
        )
    }
}

impl Publisher for MemoryPublisher {
    fn publish(
        &self,
        kind: RecordKind,
        target: &Route,
        record: Record,
    ) -> impl Future<Output = io::Result<()>> + Send {
        self.published
            .lock()
            .recover_poison("MemoryPublisher::publish")
            .push(Published::new(kind, target, record));
        std::future::ready(Ok(()))
    }
}

/// One line of bus output: a publish decision or a dropped record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum BusOutcome {
    Published(Published),
    Failed {
        kind: RecordKind,
        connector: String,
        error: String,
    },
}

/// Writes every outcome as one JSON line to `W`.
pub struct LinePublisher<W> {
    writer: tokio::sync::Mutex<W>,
}

impl<W> LinePublisher<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    /// Report a record that could not be routed.
    pub async fn report_failure(
        &self,
        kind: RecordKind,
        connector: &str,
        error: &(dyn std::error::Error + Send + Sync),
    ) -> io::Result<()> {
        self.write(&BusOutcome::Failed {
            kind,
            connector: connector.to_owned(),
            error: error.to_string(),
        })
        .await
    }

    async fn write(&self, outcome: &BusOutcome) -> io::Result<()> {
        let mut line = serde_json::to_vec(outcome)?;
        line.push(b'\n');

        // Whole lines only; concurrent dispatches never interleave.
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W> Publisher for LinePublisher<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    fn publish(
        &self,
        kind: RecordKind,
        target: &Route,
        record: Record,
    ) -> impl Future<Output = io::Result<()>> + Send {
        let outcome = BusOutcome::Published(Published::new(kind, target, record));
        async move { self.write(&outcome).await }
    }
}
