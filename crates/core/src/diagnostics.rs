use sha2::{Digest, Sha256};
use std::fmt;

/// Per-request diagnostics context, passed explicitly to each stage.
///
/// Absence (`None`) means the caller did not ask for stage-level detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    session_id: String,
}

impl Diagnostics {
    /// Session id derived from the input content, so repeated submissions of
    /// the same photo correlate in the logs.
    pub fn for_input(bytes: &[u8]) -> Self {
        let hex = to_hex(&sha256_bytes(bytes));
        Self { session_id: hex[..12].to_string() }
    }

    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into() }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn span(&self, stage: &'static str) -> tracing::Span {
        tracing::info_span!("receipt_stage", session = %self.session_id, stage)
    }

    pub fn record(&self, stage: &str, detail: impl fmt::Display) {
        tracing::debug!(session = %self.session_id, stage, %detail, "stage diagnostic");
    }
}

/// Compute SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode a raw 32-byte hash as a lowercase hex string (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}
