//! Actor components for the Portia connection.
//!
//! # Components
//!
//! - `ResponseRouter`: pending-request table; routes replies to oneshot waiters
//!   and enforces per-request deadlines
//! - `Reader`: background task that decodes reply lines and routes them

mod reader;
mod response_router;

pub(crate) use reader::{ReaderTaskHandle, spawn_reader_task};
pub(crate) use response_router::ResponseRouter;
