//! Resumable state of one chessboard calibration run.

use std::path::PathBuf;

use anyhow::{Result, bail};
use fisheye_core::Real;
use serde::{Deserialize, Serialize};

use super::{ChessboardSolution, LocationSolve};
use crate::persistence::{RecordStore, load_json, save_json};
use crate::session::{LogEntry, SessionMetadata, current_timestamp};
use crate::{PipelineError, PipelineResult};

pub const CHECKPOINT_KIND: &str = "fisheye_chessboard";
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// A downloaded calibration picture in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedImage {
    /// File name on the device.
    pub file: String,
    pub offset: Real,
    /// Local path handed to the backend.
    pub path: PathBuf,
}

/// Every picture of one location, downloaded and fed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedLocation {
    pub location: String,
    pub images: Vec<CachedImage>,
    pub completed_at: u64,
}

/// Accumulated solve state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Batch mode: locations whose pictures are all accumulated.
    #[serde(default)]
    pub downloaded: Vec<CompletedLocation>,
    /// Live mode: solves the operator accepted.
    #[serde(default)]
    pub accepted: Vec<LocationSolve>,
}

/// Persisted after every completed location so an interrupted run loses at
/// most the location in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChessboardCheckpoint {
    pub metadata: SessionMetadata,
    /// Board the run was started with; a checkpoint for another board is not resumed.
    pub chessboard: [u32; 2],
    #[serde(default)]
    pub state: CheckpointState,
    #[serde(default)]
    pub output: Option<ChessboardSolution>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl ChessboardCheckpoint {
    pub fn new(chessboard: [u32; 2]) -> Self {
        Self {
            metadata: SessionMetadata::new(CHECKPOINT_KIND, CHECKPOINT_SCHEMA_VERSION),
            chessboard,
            state: CheckpointState::default(),
            output: None,
            log: Vec::new(),
        }
    }

    pub fn is_downloaded(&self, location: &str) -> bool {
        self.state.downloaded.iter().any(|l| l.location == location)
    }

    pub fn is_accepted(&self, location: &str) -> bool {
        self.state.accepted.iter().any(|s| s.location == location)
    }

    pub fn record_download(&mut self, location: impl Into<String>, images: Vec<CachedImage>) {
        let location = location.into();
        self.state.downloaded.retain(|l| l.location != location);
        self.log_success("download", format!("{location}: {} images", images.len()));
        self.state.downloaded.push(CompletedLocation {
            location,
            images,
            completed_at: current_timestamp(),
        });
        self.output = None;
    }

    /// Forget a location, e.g. when its cached pictures disappeared.
    pub fn forget_download(&mut self, location: &str) {
        self.state.downloaded.retain(|l| l.location != location);
        self.metadata.touch();
    }

    /// Commit an accepted solve; a retake replaces the previous one.
    pub fn record_solve(&mut self, solve: LocationSolve) {
        self.state.accepted.retain(|s| s.location != solve.location);
        self.log_success(
            "solve",
            format!("{}: ret {:.4}", solve.location, solve.solve.ret),
        );
        self.state.accepted.push(solve);
        self.output = None;
    }

    pub fn set_output(&mut self, solution: ChessboardSolution) {
        self.output = Some(solution);
        self.log.push(LogEntry::success("full_calibration"));
        self.metadata.touch();
    }

    /// Latest reprojection error, from the output or the last accepted solve.
    pub fn reprojection_error(&self) -> Option<Real> {
        self.output
            .as_ref()
            .and_then(|o| o.ret)
            .or_else(|| self.state.accepted.last().map(|s| s.solve.ret))
    }

    pub fn log_success(&mut self, operation: &str, notes: impl Into<String>) {
        self.log.push(LogEntry::success_with_notes(operation, notes));
        self.metadata.touch();
    }

    pub fn log_failure(&mut self, operation: &str, error: impl Into<String>) {
        self.log.push(LogEntry::failure(operation, error));
        self.metadata.touch();
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// Decode a checkpoint, refusing other document kinds and newer schemas.
    pub fn from_json(json: &str) -> Result<Self> {
        let checkpoint: Self = serde_json::from_str(json)?;
        checkpoint.check_compatible()?;
        Ok(checkpoint)
    }

    fn check_compatible(&self) -> Result<()> {
        if self.metadata.kind != CHECKPOINT_KIND {
            bail!("document kind {} is not a chessboard checkpoint", self.metadata.kind);
        }
        if self.metadata.schema_version > CHECKPOINT_SCHEMA_VERSION {
            bail!(
                "checkpoint schema version {} is newer than supported version {}",
                self.metadata.schema_version,
                CHECKPOINT_SCHEMA_VERSION
            );
        }
        Ok(())
    }

    pub async fn save<R: RecordStore>(&self, store: &mut R, key: &str) -> PipelineResult<()> {
        save_json(store, key, self).await
    }

    /// Load the checkpoint under `key`, or `None` if nothing was stored yet.
    pub async fn load<R: RecordStore>(store: &mut R, key: &str) -> PipelineResult<Option<Self>> {
        let Some(checkpoint) = load_json::<_, Self>(store, key).await? else {
            return Ok(None);
        };
        checkpoint
            .check_compatible()
            .map_err(PipelineError::Checkpoint)?;
        Ok(Some(checkpoint))
    }
}
