//! Chessboard calibration workflows.
//!
//! Two entry points produce the same [`ChessboardSolution`]:
//!
//! - [`ChessboardWorkflow`]: live capture, one solve per location with
//!   operator review of the reprojection quality;
//! - [`BatchCalibration`]: pictures previously stored on the device, fed to
//!   the backend's accumulator and solved together.
//!
//! Both persist a [`ChessboardCheckpoint`] after every completed location and
//! finish by storing the [`CalibrationRecord`] the preview session consumes.

use fisheye_core::CalibrationRecord;
use log::info;

use crate::PipelineResult;
use crate::persistence::{RecordStore, save_record};

mod batch;
mod checkpoint;
mod config;
mod live;
mod quality;
mod solution;

pub use batch::{BatchCalibration, CalibrationFile, group_by_location, parse_calibration_file};
pub use checkpoint::{
    CHECKPOINT_KIND, CHECKPOINT_SCHEMA_VERSION, CachedImage, CheckpointState,
    ChessboardCheckpoint, CompletedLocation,
};
pub use config::ChessboardConfig;
pub use live::{ChessboardWorkflow, SolveOutcome};
pub use quality::{QualityThresholds, ReprojectionQuality, result_message};
pub use solution::{ChessboardSolution, ChessboardSolve, LocationSolve};

/// Sample the record for `solution` and store it under the configured key.
async fn save_solution_record<R: RecordStore>(
    store: &mut R,
    config: &ChessboardConfig,
    solution: &ChessboardSolution,
) -> PipelineResult<CalibrationRecord> {
    let record = solution.to_record(&config.record_heights, config.chessboard, config.record_grid)?;
    save_record(store, &config.record_key, &record).await?;
    info!(
        "calibration record saved as {} ({} heights)",
        config.record_key,
        config.record_heights.len()
    );
    Ok(record)
}
