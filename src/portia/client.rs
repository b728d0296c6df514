//! Typed client for the Portia resolution server.
//!
//! Request flow:
//! 1. Generate a reference id and register it with the router (arms the deadline)
//! 2. Lock the writer and send the envelope, racing the deadline
//! 3. Await the oneshot receiver without holding any lock

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedWrite;

use super::actor::{ReaderTaskHandle, ResponseRouter, spawn_reader_task};
use super::protocol::{Command, Envelope, PortiaCodec, ReferenceId};
use crate::error::RequestError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Annotation key recording which network a number was last seen on.
pub const OBSERVED_NETWORK: &str = "observed-network";

/// Current annotation state of a number, as returned by `get`.
pub type AnnotationRecord = Map<String, Value>;

/// Result of a `resolve` call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Resolution {
    /// Resolved MNO, `None` when Portia could not resolve the number.
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub entry: Value,
    #[serde(default)]
    pub strategy: Option<String>,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One live connection to Portia.
pub struct PortiaClient {
    /// Writes are serialized; replies are awaited outside the lock.
    writer: tokio::sync::Mutex<FramedWrite<BoxedWriter, PortiaCodec>>,
    router: Arc<ResponseRouter>,
    reader_handle: ReaderTaskHandle,
    request_timeout: Duration,
}

impl std::fmt::Debug for PortiaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortiaClient")
            .field("pending", &self.router.pending_count())
            .field("closed", &self.is_closed())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl PortiaClient {
    /// Wrap an established byte stream and start its reader task.
    pub fn new<S>(stream: S, request_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let writer: BoxedWriter = Box::new(write_half);
        let router = Arc::new(ResponseRouter::new());
        let reader_handle = spawn_reader_task(read_half, Arc::clone(&router));

        Self {
            writer: tokio::sync::Mutex::new(FramedWrite::new(writer, PortiaCodec::new())),
            router,
            reader_handle,
            request_timeout,
        }
    }

    /// Send a command using the client's default timeout.
    pub async fn send(&self, cmd: Command, request: Map<String, Value>) -> Result<Value, RequestError> {
        self.send_with_timeout(cmd, request, self.request_timeout)
            .await
    }

    /// Send a command and wait for its reply or for `timeout` to elapse.
    ///
    /// Resolves exactly once: with the reply's `response`, with a server
    /// error, with a timeout, or with a connection-closed error.
    pub async fn send_with_timeout(
        &self,
        cmd: Command,
        request: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, RequestError> {
        let reference_id = ReferenceId::generate();
        let mut rx = self.router.register(reference_id.clone(), cmd, timeout)?;
        let envelope = Envelope::new(cmd, reference_id.clone(), request);

        debug!(target: "portia_router::client", "Sending {} request {}", cmd, reference_id);
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.send(envelope).await
        };

        // The deadline and connection loss must also win while the write is
        // stuck on a peer that stopped reading, or queued behind one.
        tokio::select! {
            outcome = &mut rx => {
                return outcome.unwrap_or(Err(RequestError::ConnectionClosed {
                    reference_id,
                    cmd,
                }));
            }
            written = write => {
                if let Err(source) = written {
                    self.router.remove(&reference_id);
                    return Err(RequestError::Send {
                        reference_id,
                        cmd,
                        source,
                    });
                }
            }
        }

        // A dropped sender means the router itself went away with the connection.
        rx.await.unwrap_or(Err(RequestError::ConnectionClosed {
            reference_id,
            cmd,
        }))
    }

    /// Fetch the current annotation state of `msisdn`.
    pub async fn get(&self, msisdn: &str) -> Result<AnnotationRecord, RequestError> {
        let response = self
            .send(Command::Get, msisdn_request(msisdn))
            .await?;
        decode_response(Command::Get, response)
    }

    /// Determine the current MNO of `msisdn`.
    pub async fn resolve(&self, msisdn: &str) -> Result<Resolution, RequestError> {
        let response = self
            .send(Command::Resolve, msisdn_request(msisdn))
            .await?;
        decode_response(Command::Resolve, response)
    }

    /// Record an observation against `msisdn`.
    ///
    /// Without a timestamp the server assigns one.
    pub async fn annotate(
        &self,
        msisdn: &str,
        key: &str,
        value: &str,
        timestamp: Option<OffsetDateTime>,
    ) -> Result<Value, RequestError> {
        let timestamp = match timestamp {
            Some(ts) => Value::String(ts.format(&Rfc3339)?),
            None => Value::Null,
        };
        let mut request = msisdn_request(msisdn);
        request.insert("key".to_owned(), json!(key));
        request.insert("value".to_owned(), json!(value));
        request.insert("timestamp".to_owned(), timestamp);

        self.send(Command::Annotate, request).await
    }

    /// Close the connection. Pending requests fail with connection-closed.
    pub fn close(&self) {
        self.reader_handle.cancel();
    }

    /// Resolves once the connection is gone and pending requests were failed.
    pub async fn closed(&self) {
        self.reader_handle.closed_token().cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.reader_handle.closed_token().is_cancelled()
    }

    pub fn pending_count(&self) -> usize {
        self.router.pending_count()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Normalize an MSISDN to the form Portia stores: digits only, no leading
/// `+` and no `00` international dialling prefix.
pub fn normalize_msisdn(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix("00") {
        Some(rest) => rest.to_owned(),
        None => digits,
    }
}

fn msisdn_request(msisdn: &str) -> Map<String, Value> {
    let mut request = Map::new();
    request.insert("msisdn".to_owned(), json!(normalize_msisdn(msisdn)));
    request
}

fn decode_response<T: DeserializeOwned>(cmd: Command, response: Value) -> Result<T, RequestError> {
    serde_json::from_value(response).map_err(|source| RequestError::UnexpectedResponse { cmd, source })
}
