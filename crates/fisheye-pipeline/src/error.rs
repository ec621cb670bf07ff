use std::time::Duration;

use fisheye_core::CoreError;
use thiserror::Error;

/// Errors raised while driving the device, storage or numeric backend.
///
/// Every variant is surfaced to the caller; cleanup (raw-mode exit, progress
/// dismissal) has already run by the time one is returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The device channel failed or disconnected.
    #[error("device link failure: {0}")]
    DeviceLink(String),
    /// A device round-trip did not complete in time.
    #[error("device did not respond within {0:?}")]
    Timeout(Duration),
    /// The operator or caller cancelled the run.
    #[error("operation cancelled")]
    Cancelled,
    /// The numeric backend could not solve the input.
    #[error("solver failed: {reason}")]
    Solver { reason: String },
    /// Device or local storage refused a read or write.
    #[error("storage error: {0}")]
    Storage(String),
    /// One file of a batch failed; the in-flight location was discarded.
    #[error("failed to download {file}: {source}")]
    PartialDownload {
        file: String,
        source: Box<PipelineError>,
    },
    /// An operation that needs a live preview ran in another state.
    #[error("preview session is {0}, expected ready")]
    NotReady(&'static str),
    #[error(transparent)]
    Core(#[from] CoreError),
    /// Checkpoint could not be encoded, decoded, or is from a newer schema.
    #[error("checkpoint error: {0:#}")]
    Checkpoint(anyhow::Error),
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
