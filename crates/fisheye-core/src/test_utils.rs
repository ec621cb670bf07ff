//! Record and rig fixtures shared by the workspace test suites.

use crate::{CalibrationRecord, PointGrid, PoseModel, Real, RegressionGrid, Workarea};

/// A plausible intrinsic matrix for a 1280x720 fisheye sensor.
pub fn sample_k() -> [[Real; 3]; 3] {
    [[800.0, 0.0, 640.0], [0.0, 800.0, 360.0], [0.0, 0.0, 1.0]]
}

pub fn sample_distortion() -> Vec<Real> {
    vec![0.12, -0.03, 0.004, -0.0005]
}

/// Workarea deep enough for every height used in fixtures.
pub fn sample_workarea() -> Workarea {
    Workarea::new(430.0, 300.0, 40.0)
}

/// Uniform grid of `rows x cols` nodes, every node offset by `shift`.
pub fn shifted_grid(rows: usize, cols: usize, shift: Real) -> PointGrid {
    (0..rows)
        .map(|i| {
            (0..cols)
                .map(|j| [j as Real * 50.0 + shift, i as Real * 50.0 + shift])
                .collect()
        })
        .collect()
}

pub fn discrete_record(heights: Vec<Real>, points: Vec<PointGrid>) -> CalibrationRecord {
    CalibrationRecord::new(
        sample_k(),
        sample_distortion(),
        [640.0, 360.0],
        PoseModel::Discrete { heights, points },
    )
    .expect("fixture record is valid")
}

pub fn regression_record(params: RegressionGrid) -> CalibrationRecord {
    CalibrationRecord::new(
        sample_k(),
        sample_distortion(),
        [640.0, 360.0],
        PoseModel::Regression { params },
    )
    .expect("fixture record is valid")
}

/// Regression grid whose nodes move linearly: `x = h + j`, `y = 2h + i`.
pub fn linear_regression_grid(rows: usize, cols: usize) -> RegressionGrid {
    (0..rows)
        .map(|i| {
            (0..cols)
                .map(|j| [[0.0, 0.0, 1.0, j as Real], [0.0, 0.0, 2.0, i as Real]])
                .collect()
        })
        .collect()
}
