//! Dispatch core: route bus records using the routing table and Portia.
//!
//! - `record` - the opaque record type and its addressing fields
//! - `publisher` - the seam through which routed records leave the dispatcher
//! - `dispatcher` - inbound, outbound and event paths

mod dispatcher;
mod publisher;
mod record;

pub use dispatcher::Dispatcher;
pub use publisher::{BusOutcome, LinePublisher, MemoryPublisher, Published, Publisher};
pub use record::{Record, RecordKind};
