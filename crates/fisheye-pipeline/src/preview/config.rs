use std::time::Duration;

use anyhow::{Result, ensure};
use fisheye_core::Real;
use serde::{Deserialize, Serialize};

/// Settings for a live preview session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Inner corner counts `[cols, rows]` of the board the record was solved with.
    pub chessboard: [u32; 2],
    /// Limit for each device round-trip during setup.
    pub device_timeout_ms: u64,
    pub progress_id: String,
    /// Passed through with every matrix push.
    pub matrix_is_interim: bool,
    /// Alignment center override; the record's optical center otherwise.
    pub center: Option<[Real; 2]>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            chessboard: [48, 36],
            device_timeout_ms: 30_000,
            progress_id: "fisheye-preview".to_string(),
            matrix_is_interim: false,
            center: None,
        }
    }
}

impl PreviewConfig {
    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.chessboard.iter().all(|&n| n >= 2),
            "chessboard needs at least 2x2 inner corners, got {:?}",
            self.chessboard
        );
        ensure!(self.device_timeout_ms > 0, "device timeout must be positive");
        if let Some([x, y]) = self.center {
            ensure!(x.is_finite() && y.is_finite(), "center must be finite");
        }
        Ok(())
    }
}
