//! Metadata and operation log carried by persisted calibration state.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Identifies what a persisted document is and when it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Document kind, e.g. `"fisheye_chessboard"`.
    pub kind: String,

    /// Schema version the document was written with.
    pub schema_version: u32,

    /// Unix timestamp when the run was started (seconds since epoch).
    pub created_at: u64,

    /// Unix timestamp of the last change (seconds since epoch).
    pub last_modified: u64,

    /// Optional free-form note, e.g. the device serial.
    #[serde(default)]
    pub description: Option<String>,
}

impl SessionMetadata {
    pub fn new(kind: impl Into<String>, schema_version: u32) -> Self {
        let now = current_timestamp();
        Self {
            kind: kind.into(),
            schema_version,
            created_at: now,
            last_modified: now,
            description: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_modified = current_timestamp();
    }
}

/// One entry of the operation log.
///
/// An audit trail for diagnosing interrupted runs, not a replay journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    /// Operation name (e.g. "download", "solve", "full_calibration").
    pub operation: String,
    pub success: bool,
    pub notes: Option<String>,
}

impl LogEntry {
    pub fn success(operation: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: true,
            notes: None,
        }
    }

    pub fn success_with_notes(operation: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Self::success(operation)
        }
    }

    pub fn failure(operation: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: false,
            notes: Some(error.into()),
        }
    }
}

/// Seconds since the Unix epoch; zero if the clock is before it.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
