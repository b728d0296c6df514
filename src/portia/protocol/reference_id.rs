//! Correlation token for Portia requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique per-request correlation token, echoed back by the server as
/// `reference_id`.
///
/// Wraps a `String` so that it can be used as a `HashMap` key for the pending
/// request table and never confused with other string fields of the protocol
/// (commands, MSISDNs, network names).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    /// Generate a fresh id. ULIDs are unique per process without coordination.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReferenceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ReferenceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
