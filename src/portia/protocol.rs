//! Wire protocol for the Portia number-porting server.
//!
//! - `reference_id` - correlation token type
//! - `envelope` - request/reply envelopes and reply validation
//! - `codec` - newline-delimited JSON framing

mod codec;
mod envelope;
mod reference_id;

pub use codec::{DecodedLine, MAX_LINE_LENGTH, PortiaCodec};
pub use envelope::{Command, Envelope, PROTOCOL_VERSION, ReplyEnvelope, ReplyStatus};
pub use reference_id::ReferenceId;
