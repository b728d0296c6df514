//! Response routing for pending Portia requests.
//!
//! The ResponseRouter owns the table of in-flight requests for one
//! connection and routes incoming replies to their waiters via oneshot
//! channels:
//! - Before sending a request, `register()` it to get a oneshot Receiver.
//!   Registration also arms the request's deadline timer.
//! - The Reader Task calls `route()` for every decoded reply.
//! - The deadline timer calls `expire()` if no reply arrived in time.
//! - The Reader Task calls `fail_all()` when the connection goes away.
//!
//! Every fulfillment path removes the entry under the same mutex, so whichever
//! of {reply, deadline, connection loss} gets there first wins and the others
//! become no-ops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::debug;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::error::{LockResultExt, ProtocolAnomaly, RequestError};
use crate::portia::protocol::{Command, ReferenceId, ReplyEnvelope, ReplyStatus};

/// Outcome delivered to a waiter exactly once.
pub(crate) type Fulfillment = Result<Value, RequestError>;

/// A request awaiting its reply.
struct PendingRequest {
    cmd: Command,
    tx: oneshot::Sender<Fulfillment>,
    /// Deadline timer, aborted when the request is fulfilled by any other path.
    deadline: Option<AbortHandle>,
}

impl PendingRequest {
    fn fulfill(self, outcome: Fulfillment) {
        if let Some(deadline) = self.deadline {
            deadline.abort();
        }
        // The requester may have given up; nothing left to notify then.
        let _ = self.tx.send(outcome);
    }
}

struct ResponseRouterState {
    pending: HashMap<ReferenceId, PendingRequest>,
    /// Set once the connection is gone; new registrations are refused.
    closed: bool,
}

pub(crate) struct ResponseRouter {
    state: Mutex<ResponseRouterState>,
}

impl ResponseRouter {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ResponseRouterState {
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Register a pending request and arm its deadline.
    ///
    /// Must be called before the envelope is written so that a fast reply
    /// always finds its entry.
    pub(crate) fn register(
        self: &Arc<Self>,
        id: ReferenceId,
        cmd: Command,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Fulfillment>, RequestError> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().recover_poison("ResponseRouter::register");

        if state.closed {
            return Err(RequestError::ConnectionClosed {
                reference_id: id,
                cmd,
            });
        }
        if state.pending.contains_key(&id) {
            return Err(RequestError::DuplicateReference { reference_id: id });
        }

        let deadline = spawn_deadline(Arc::downgrade(self), id.clone(), timeout);
        state.pending.insert(
            id,
            PendingRequest {
                cmd,
                tx,
                deadline: Some(deadline),
            },
        );

        Ok(rx)
    }

    /// Route a reply to its pending request.
    ///
    /// Returns an `Unmatched` anomaly when no request with the reply's
    /// reference id is pending (late reply after a timeout, or a duplicate).
    pub(crate) fn route(&self, reply: ReplyEnvelope) -> Result<(), ProtocolAnomaly> {
        let entry = self
            .state
            .lock()
            .recover_poison("ResponseRouter::route")
            .pending
            .remove(&reply.reference_id);

        let Some(entry) = entry else {
            return Err(ProtocolAnomaly::Unmatched {
                reference_id: reply.reference_id,
                reference_cmd: reply.reference_cmd,
            });
        };

        let outcome = match reply.status {
            ReplyStatus::Ok => Ok(reply.response),
            ReplyStatus::Error => Err(RequestError::Server {
                message: reply
                    .message
                    .unwrap_or_else(|| format!("{} request failed", entry.cmd)),
                reply: reply.raw,
            }),
        };
        entry.fulfill(outcome);
        Ok(())
    }

    /// Fail a request whose deadline elapsed.
    ///
    /// Returns `false` if the request was already fulfilled, in which case
    /// this is a no-op.
    pub(crate) fn expire(&self, id: &ReferenceId) -> bool {
        let entry = self
            .state
            .lock()
            .recover_poison("ResponseRouter::expire")
            .pending
            .remove(id);

        match entry {
            Some(mut entry) => {
                debug!(
                    target: "portia_router::router",
                    "{} request {} timed out",
                    entry.cmd,
                    id
                );
                // The timer is the caller; aborting it would abort ourselves.
                entry.deadline = None;
                let cmd = entry.cmd;
                entry.fulfill(Err(RequestError::Timeout {
                    reference_id: id.clone(),
                    cmd,
                }));
                true
            }
            None => false,
        }
    }

    /// Remove a pending request without fulfilling it.
    ///
    /// Used when the request could not be written to the connection.
    pub(crate) fn remove(&self, id: &ReferenceId) -> bool {
        let entry = self
            .state
            .lock()
            .recover_poison("ResponseRouter::remove")
            .pending
            .remove(id);

        match entry {
            Some(entry) => {
                if let Some(deadline) = entry.deadline {
                    deadline.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Fail every pending request with a connection-closed error and refuse
    /// further registrations.
    ///
    /// Returns the number of requests that were failed.
    pub(crate) fn fail_all(&self) -> usize {
        let entries: Vec<_> = {
            let mut state = self.state.lock().recover_poison("ResponseRouter::fail_all");
            state.closed = true;
            state.pending.drain().collect()
        };

        // Lock released before touching channels.
        let count = entries.len();
        for (id, entry) in entries {
            let cmd = entry.cmd;
            entry.fulfill(Err(RequestError::ConnectionClosed {
                reference_id: id,
                cmd,
            }));
        }
        count
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.state
            .lock()
            .recover_poison("ResponseRouter::pending_count")
            .pending
            .len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state
            .lock()
            .recover_poison("ResponseRouter::is_closed")
            .closed
    }
}

/// Spawn the deadline timer for one request.
///
/// Holds only a weak reference so a dropped connection does not keep its
/// router alive until every timer has run out.
fn spawn_deadline(router: Weak<ResponseRouter>, id: ReferenceId, timeout: Duration) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(router) = router.upgrade() {
            router.expire(&id);
        }
    })
    .abort_handle()
}
