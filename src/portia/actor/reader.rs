//! Reader task for the Portia connection.
//!
//! The Reader Task:
//! - Runs in a spawned tokio task
//! - Decodes reply lines with `PortiaCodec`
//! - Routes replies via ResponseRouter to oneshot waiters
//! - Logs protocol anomalies without tearing the connection down
//! - On EOF, read error or cancellation, fails every pending request and
//!   signals `closed`

use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use super::ResponseRouter;
use crate::portia::protocol::{DecodedLine, PortiaCodec};

/// Handle to a running Reader Task.
///
/// Dropping the handle cancels the reader, which fails whatever is still
/// pending on the connection.
pub(crate) struct ReaderTaskHandle {
    _join_handle: JoinHandle<()>,
    cancel_token: CancellationToken,
    closed: CancellationToken,
}

impl ReaderTaskHandle {
    /// Ask the reader to stop. Pending requests are failed once it exits.
    pub(crate) fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Token cancelled after the reader has exited and failed pending requests.
    pub(crate) fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }
}

impl Drop for ReaderTaskHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Spawn a reader task that decodes replies from `reader` and routes them.
pub(crate) fn spawn_reader_task<R>(reader: R, router: Arc<ResponseRouter>) -> ReaderTaskHandle
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let cancel_token = CancellationToken::new();
    let closed = CancellationToken::new();
    let frames = FramedRead::new(reader, PortiaCodec::new());

    let join_handle = tokio::spawn(reader_loop(
        frames,
        router,
        cancel_token.clone(),
        closed.clone(),
    ));

    ReaderTaskHandle {
        _join_handle: join_handle,
        cancel_token,
        closed,
    }
}

async fn reader_loop<R>(
    mut frames: FramedRead<R, PortiaCodec>,
    router: Arc<ResponseRouter>,
    cancel_token: CancellationToken,
    closed: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!(target: "portia_router::reader", "Reader task cancelled, shutting down");
                break;
            }

            frame = frames.next() => {
                match frame {
                    Some(Ok(line)) => handle_line(line, &router),
                    Some(Err(e)) => {
                        warn!(target: "portia_router::reader", "Read error: {}", e);
                        break;
                    }
                    None => {
                        info!(target: "portia_router::reader", "Connection closed by server");
                        break;
                    }
                }
            }
        }
    }

    let failed = router.fail_all();
    if failed > 0 {
        warn!(
            target: "portia_router::reader",
            "Failed {} pending request(s) on connection close",
            failed
        );
    }
    closed.cancel();
}

/// Handle one decoded line. Anomalies are isolated to the offending line.
fn handle_line(line: DecodedLine, router: &ResponseRouter) {
    if let Err(anomaly) = line.and_then(|reply| router.route(reply)) {
        warn!(target: "portia_router::reader", "Protocol anomaly: {}", anomaly);
    }
}
