use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use fisheye_core::Real;

use super::QualityThresholds;
use crate::persistence::record_key;

/// Settings for both chessboard calibration modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessboardConfig {
    /// Inner corner counts `[cols, rows]`.
    pub chessboard: [u32; 2],
    /// Device directory holding captured `pic_<offset>_<location>.jpg` files.
    pub image_dir: String,
    /// Device directory checkpoints are uploaded to.
    pub storage_dir: String,
    /// Key of the checkpoint document.
    pub checkpoint_key: String,
    /// Key the finished calibration record is stored under.
    pub record_key: String,
    /// Heights (mm) the record's grids are sampled at, strictly ascending.
    pub record_heights: Vec<Real>,
    /// `[rows, cols]` of every record grid.
    pub record_grid: [usize; 2],
    /// Local directory downloaded images are cached in.
    pub cache_dir: PathBuf,
    pub quality: QualityThresholds,
    /// Limit for a single solver or device round-trip.
    pub round_trip_timeout_ms: u64,
    pub progress_id: String,
}

impl Default for ChessboardConfig {
    fn default() -> Self {
        Self {
            chessboard: [48, 36],
            image_dir: "camera_calib".to_string(),
            storage_dir: "fisheye".to_string(),
            checkpoint_key: "chessboard-checkpoint.json".to_string(),
            record_key: record_key("default", None),
            record_heights: (0..=8).map(|i| i as Real * 5.0).collect(),
            record_grid: [7, 7],
            cache_dir: std::env::temp_dir().join("fisheye-calibration"),
            quality: QualityThresholds::default(),
            round_trip_timeout_ms: 60_000,
            progress_id: "calibrate-chessboard".to_string(),
        }
    }
}

impl ChessboardConfig {
    pub fn round_trip_timeout(&self) -> Duration {
        Duration::from_millis(self.round_trip_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.chessboard.iter().all(|&n| n >= 2),
            "chessboard needs at least 2x2 inner corners, got {:?}",
            self.chessboard
        );
        ensure!(!self.checkpoint_key.is_empty(), "checkpoint key is empty");
        ensure!(!self.record_key.is_empty(), "record key is empty");
        ensure!(
            !self.record_heights.is_empty()
                && self.record_heights.iter().all(|h| h.is_finite())
                && self.record_heights.windows(2).all(|w| w[0] < w[1]),
            "record heights must be finite and strictly ascending, got {:?}",
            self.record_heights
        );
        ensure!(
            self.record_grid.iter().all(|&n| n >= 2),
            "record grid needs at least 2x2 nodes, got {:?}",
            self.record_grid
        );
        ensure!(self.round_trip_timeout_ms > 0, "round-trip timeout must be positive");
        self.quality.validate()
    }
}
