//! Request and reply envelopes of the Portia line protocol.
//!
//! Requests are serialized with serde. Replies are parsed into a generic
//! `serde_json::Value` first and then validated field by field, so that each
//! structural problem maps to a distinct [`ProtocolAnomaly`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ReferenceId;
use crate::error::ProtocolAnomaly;

/// Protocol version sent with every request.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Commands understood by the resolution server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Get,
    Resolve,
    Annotate,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Get => "get",
            Command::Resolve => "resolve",
            Command::Annotate => "annotate",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound request envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub cmd: Command,
    pub version: &'static str,
    pub id: ReferenceId,
    pub request: Map<String, Value>,
}

impl Envelope {
    pub fn new(cmd: Command, id: ReferenceId, request: Map<String, Value>) -> Self {
        Self {
            cmd,
            version: PROTOCOL_VERSION,
            id,
            request,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Inbound reply envelope, structurally validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyEnvelope {
    pub status: ReplyStatus,
    pub reference_id: ReferenceId,
    pub reference_cmd: String,
    /// `response` on ok replies, `Value::Null` otherwise.
    pub response: Value,
    /// `message` on error replies.
    pub message: Option<String>,
    /// The full reply object as received.
    pub raw: Value,
}

impl ReplyEnvelope {
    /// Parses one received line into a reply.
    ///
    /// Trailing whitespace (including a stray `\r`) is trimmed before parsing.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolAnomaly`] if the line is not JSON, if `status` or
    /// `reference_id` is missing, or if `status` is neither `ok` nor `error`.
    pub fn parse(line: &str) -> Result<Self, ProtocolAnomaly> {
        let raw: Value = serde_json::from_str(line.trim_end())?;

        let status = match raw.get("status").and_then(Value::as_str) {
            Some("ok") => ReplyStatus::Ok,
            Some("error") => ReplyStatus::Error,
            Some(other) => return Err(ProtocolAnomaly::UnknownStatus(other.to_owned())),
            None => return Err(ProtocolAnomaly::MissingField("status")),
        };
        let reference_id = raw
            .get("reference_id")
            .and_then(Value::as_str)
            .map(ReferenceId::from)
            .ok_or(ProtocolAnomaly::MissingField("reference_id"))?;
        let reference_cmd = raw
            .get("reference_cmd")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let response = match status {
            ReplyStatus::Ok => raw.get("response").cloned().unwrap_or(Value::Null),
            ReplyStatus::Error => Value::Null,
        };
        let message = raw
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(Self {
            status,
            reference_id,
            reference_cmd,
            response,
            message,
            raw,
        })
    }
}
