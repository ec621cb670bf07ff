//! Calibration data model and pure perspective computations for a fisheye
//! camera mounted on a laser head.
//!
//! Nothing in this crate performs I/O. Device orchestration lives in
//! `fisheye-pipeline`; this crate supplies the leaves it calls on every
//! object-height change:
//!
//! - [`CalibrationRecord`]: intrinsics plus a [`PoseModel`] (discrete heights
//!   or cubic regression),
//! - [`effective_height`]: folds rig tilt into the lookup height,
//! - [`PerspectiveResolver`]: produces a [`PerspectivePointGrid`] for a height,
//! - [`LevelingProfile`]: per-region platform deviations scaled to a height,
//! - [`WorkareaRegistry`]: physical dimensions per machine model,
//! - [`FisheyeCamera`]: projects posed chessboard corners into pixels.
//!
//! # Example
//!
//! ```
//! use fisheye_core::{
//!     CalibrationRecord, LevelingProfile, PerspectiveResolver, PoseModel, RotationData,
//!     Workarea, effective_height,
//! };
//!
//! let pose = PoseModel::Discrete {
//!     heights: vec![0.0, 10.0],
//!     points: vec![vec![vec![[100.0, 100.0]]], vec![vec![[110.0, 90.0]]]],
//! };
//! let record = CalibrationRecord::new(
//!     [[800.0, 0.0, 640.0], [0.0, 800.0, 360.0], [0.0, 0.0, 1.0]],
//!     vec![0.0; 4],
//!     [640.0, 360.0],
//!     pose,
//! )
//! .unwrap();
//!
//! let workarea = Workarea::new(430.0, 300.0, 40.0);
//! let h = effective_height(3.0, &RotationData { dh: 2.0, ..Default::default() }, workarea.depth)
//!     .unwrap();
//! let grid = PerspectiveResolver::new(workarea, [48, 36])
//!     .resolve(h, &record, &LevelingProfile::default())
//!     .unwrap();
//! assert_eq!(grid.points[0][0], [105.0, 95.0]);
//! ```

mod error;
/// Correspondence grids and the rig descriptor.
pub mod grid;
mod height;
/// Platform leveling regions.
pub mod leveling;
/// Type aliases and polynomial helpers.
mod math;
mod projection;
mod record;
mod regression;
mod resolver;
mod rotation;
/// Shared fixtures for tests across the workspace.
///
/// Public so integration tests in other crates can build records without
/// repeating JSON, but not intended for production use.
pub mod test_utils;
mod workarea;

pub use error::CoreError;
pub use grid::{GridDescriptor, GridPoint, PerspectivePointGrid, PointGrid};
pub use height::effective_height;
pub use leveling::{LevelingData, LevelingOffsets, LevelingProfile, LevelingSource};
pub use math::*;
pub use projection::FisheyeCamera;
pub use record::{CalibrationRecord, NodeRegression, PoseModel, RegressionGrid};
pub use regression::{REGRESSION_DEGREE, fit_z3_regression};
pub use resolver::{PerspectiveModel, PerspectiveResolver, StandardModel};
pub use rotation::{RotationCommand, RotationData};
pub use workarea::{Workarea, WorkareaRegistry, WorkareaTable};
