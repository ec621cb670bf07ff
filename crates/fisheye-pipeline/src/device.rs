//! Interfaces of the external collaborators the workflows drive.
//!
//! Implementations live outside this crate (device transport, UI toolkit,
//! numeric backend). Every device call is awaited strictly in sequence; the
//! traits take `&mut self` where the underlying channel cannot interleave
//! commands.

use std::future::Future;
use std::path::Path;

use fisheye_core::{
    LevelingData, LevelingSource, PerspectivePointGrid, Real, RotationCommand, RotationData,
};
use serde::{Deserialize, Serialize};

use crate::PipelineResult;
use crate::chessboard::{ChessboardSolution, ChessboardSolve};

/// Autofocus probe result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbePosition {
    /// Whether the autofocus run actually touched the object.
    pub did_af: bool,
    /// Probe Z travel in millimetres.
    pub z: Real,
}

/// Encoded camera frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Picture {
    pub bytes: Vec<u8>,
}

impl Picture {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Bytes received so far for one file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: u64,
}

impl TransferProgress {
    /// Completed fraction in `[0, 1]`; zero when the size is unknown.
    pub fn fraction(&self) -> Real {
        if self.total == 0 {
            0.0
        } else {
            (self.loaded as Real / self.total as Real).clamp(0.0, 1.0)
        }
    }
}

/// Motion/camera channel of one device connection.
pub trait MotionChannel {
    fn enter_raw_mode(&mut self) -> impl Future<Output = PipelineResult<()>>;
    fn end_raw_mode(&mut self) -> impl Future<Output = PipelineResult<()>>;
    fn raw_home(&mut self) -> impl Future<Output = PipelineResult<()>>;
    fn raw_home_z(&mut self) -> impl Future<Output = PipelineResult<()>>;
    fn raw_auto_focus(&mut self) -> impl Future<Output = PipelineResult<()>>;
    fn raw_get_probe_pos(&mut self) -> impl Future<Output = PipelineResult<ProbePosition>>;
    fn take_one_picture(&mut self) -> impl Future<Output = PipelineResult<Picture>>;
    fn set_fisheye_matrix(
        &mut self,
        grid: &PerspectivePointGrid,
        is_interim: bool,
    ) -> impl Future<Output = PipelineResult<()>>;
    fn set_3d_rotation(
        &mut self,
        command: RotationCommand,
    ) -> impl Future<Output = PipelineResult<()>>;
    fn fetch_leveling_data(
        &mut self,
        source: LevelingSource,
    ) -> impl Future<Output = PipelineResult<LevelingData>>;
    fn fetch_3d_rotation(&mut self) -> impl Future<Output = PipelineResult<RotationData>>;
}

/// Device file storage.
///
/// Takes `&self` so a checkpoint store and an image downloader can share one
/// storage handle.
pub trait FileStorage {
    fn ls(&self, dir: &str) -> impl Future<Output = PipelineResult<Vec<String>>>;
    fn download_file(
        &self,
        dir: &str,
        name: &str,
        on_progress: &mut dyn FnMut(TransferProgress),
    ) -> impl Future<Output = PipelineResult<Vec<u8>>>;
    fn upload_to_directory(
        &self,
        bytes: Vec<u8>,
        dir: &str,
        name: &str,
    ) -> impl Future<Output = PipelineResult<()>>;
}

impl<S: FileStorage + ?Sized> FileStorage for &S {
    fn ls(&self, dir: &str) -> impl Future<Output = PipelineResult<Vec<String>>> {
        (**self).ls(dir)
    }

    fn download_file(
        &self,
        dir: &str,
        name: &str,
        on_progress: &mut dyn FnMut(TransferProgress),
    ) -> impl Future<Output = PipelineResult<Vec<u8>>> {
        (**self).download_file(dir, name, on_progress)
    }

    fn upload_to_directory(
        &self,
        bytes: Vec<u8>,
        dir: &str,
        name: &str,
    ) -> impl Future<Output = PipelineResult<()>> {
        (**self).upload_to_directory(bytes, dir, name)
    }
}

/// Answer of a single-image chessboard solve.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverResponse {
    Solved(ChessboardSolve),
    Failed { reason: String },
}

/// External numeric calibration backend.
pub trait CalibrationBackend {
    /// Solve intrinsics and pose from one chessboard picture.
    fn calibrate_chessboard(
        &mut self,
        image: &[u8],
        offset: Real,
        chessboard: [u32; 2],
    ) -> impl Future<Output = PipelineResult<SolverResponse>>;

    /// Reset the incremental accumulator.
    fn start_calibration(&mut self) -> impl Future<Output = PipelineResult<()>>;

    /// Add one stored picture; `false` when no chessboard was found in it.
    fn add_calibrate_img(
        &mut self,
        offset: Real,
        path: &Path,
    ) -> impl Future<Output = PipelineResult<bool>>;

    /// Solve over every accumulated picture. `on_progress` receives `[0, 1]`.
    fn do_full_calibration(
        &mut self,
        on_progress: &mut dyn FnMut(Real),
    ) -> impl Future<Output = PipelineResult<ChessboardSolution>>;
}

/// Progress and alert presentation.
///
/// Indicators are addressed by id so workflows can dismiss exactly what they opened.
pub trait Presenter {
    /// Indeterminate indicator.
    fn open_nonstop(&mut self, id: &str, message: &str);
    /// Indicator with a percentage.
    fn open_stepping(&mut self, id: &str, message: &str);
    fn update(&mut self, id: &str, percentage: Option<Real>, message: &str);
    fn dismiss(&mut self, id: &str);
    fn show_error(&mut self, message: &str);
    fn show_info(&mut self, message: &str);
    /// Ask the operator to accept (`true`) or reject a result.
    fn confirm(&mut self, message: &str) -> impl Future<Output = bool>;
}
