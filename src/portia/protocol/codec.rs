//! Newline-delimited JSON framing for the Portia connection.
//!
//! Wraps `LinesCodec` so that framing errors which only affect a single line
//! surface as decoded [`ProtocolAnomaly`] items instead of stream errors. A
//! stream error ends the `FramedRead`, which would abort every in-flight
//! request on the connection.

use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::{Envelope, ReplyEnvelope};
use crate::error::ProtocolAnomaly;

/// Upper bound for a single reply line.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// One decoded line: either a valid reply or the anomaly it produced.
pub type DecodedLine = Result<ReplyEnvelope, ProtocolAnomaly>;

#[derive(Debug)]
pub struct PortiaCodec {
    lines: LinesCodec,
}

impl PortiaCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn lift(
        decoded: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<DecodedLine>, io::Error> {
        match decoded {
            Ok(Some(line)) => Ok(Some(ReplyEnvelope::parse(&line))),
            Ok(None) => Ok(None),
            // LinesCodec discards up to the next newline and then resumes.
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                Ok(Some(Err(ProtocolAnomaly::LineTooLong)))
            }
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Default for PortiaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PortiaCodec {
    type Item = DecodedLine;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::lift(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::lift(self.lines.decode_eof(src))
    }
}

impl Encoder<Envelope> for PortiaCodec {
    type Error = io::Error;

    /// serde_json escapes control characters, so the encoded envelope never
    /// contains a raw newline and always occupies exactly one line.
    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = serde_json::to_string(&item).map_err(io::Error::other)?;
        self.lines.encode(line, dst).map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            LinesCodecError::MaxLineLengthExceeded => {
                io::Error::new(io::ErrorKind::InvalidInput, e)
            }
        })
    }
}
