//! Protocol events carried by stream records

use serde::{Deserialize, Serialize};

use crate::models::CodeReference;

/// One decoded stream record
///
/// Transient: produced by the decoder, consumed by the reconciler, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ProtocolEvent {
    /// A text delta to append to the answer
    Content(String),
    /// The full set of references for the answer so far
    References(Vec<CodeReference>),
}

impl ProtocolEvent {
    /// Wire tag of this event
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Content(_) => "content",
            Self::References(_) => "references",
        }
    }
}
