use fisheye_core::{
    CalibrationRecord, CoreError, FisheyeCamera, PoseModel, Real, pad_coefficients, polyfit,
};
use serde::{Deserialize, Serialize};

/// Result of solving one chessboard picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChessboardSolve {
    pub k: [[Real; 3]; 3],
    pub d: Vec<Real>,
    pub rvec: [Real; 3],
    pub tvec: [Real; 3],
    /// RMS reprojection error in pixels.
    pub ret: Real,
}

/// An operator-accepted solve at one calibration location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSolve {
    pub location: String,
    /// Height offset of the capture relative to the reference position.
    pub offset: Real,
    pub solve: ChessboardSolve,
    /// Unix timestamp of the capture.
    pub captured_at: u64,
}

/// Combined intrinsics and height-dependent extrinsics of a calibration run.
///
/// `rvec_polyfit`/`tvec_polyfit` hold one `[slope, intercept]` pair per
/// vector component, as a function of capture offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChessboardSolution {
    pub k: [[Real; 3]; 3],
    pub d: Vec<Real>,
    pub rvec: [Real; 3],
    pub tvec: [Real; 3],
    pub rvec_polyfit: Vec<[Real; 2]>,
    pub tvec_polyfit: Vec<[Real; 2]>,
    #[serde(default)]
    pub ret: Option<Real>,
}

/// Linear fit of each vector component against the capture offsets.
///
/// A single distinct offset gives constant fits (zero slope, mean intercept).
fn extrinsic_regression(offsets: &[Real], vectors: &[[Real; 3]]) -> Result<Vec<[Real; 2]>, CoreError> {
    let mut distinct: Vec<Real> = offsets.to_vec();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();
    let degree = if distinct.len() >= 2 { 1 } else { 0 };

    (0..3)
        .map(|axis| {
            let ys: Vec<Real> = vectors.iter().map(|v| v[axis]).collect();
            let fit = pad_coefficients(&polyfit(offsets, &ys, degree)?, 2);
            Ok([fit[0], fit[1]])
        })
        .collect()
}

impl ChessboardSolution {
    /// Combine the accepted per-location solves.
    ///
    /// Intrinsics come from the solve with the lowest reprojection error;
    /// the reference pose is the capture nearest zero offset.
    pub fn from_accepted(solves: &[LocationSolve]) -> Result<Self, CoreError> {
        let best = solves
            .iter()
            .min_by(|a, b| a.solve.ret.total_cmp(&b.solve.ret))
            .ok_or(CoreError::NotEnoughSamples { needed: 1, got: 0 })?;
        let reference = solves
            .iter()
            .min_by(|a, b| a.offset.abs().total_cmp(&b.offset.abs()))
            .unwrap_or(best);

        let offsets: Vec<Real> = solves.iter().map(|s| s.offset).collect();
        let rvecs: Vec<[Real; 3]> = solves.iter().map(|s| s.solve.rvec).collect();
        let tvecs: Vec<[Real; 3]> = solves.iter().map(|s| s.solve.tvec).collect();
        let mean_ret = solves.iter().map(|s| s.solve.ret).sum::<Real>() / solves.len() as Real;

        Ok(Self {
            k: best.solve.k,
            d: best.solve.d.clone(),
            rvec: reference.solve.rvec,
            tvec: reference.solve.tvec,
            rvec_polyfit: extrinsic_regression(&offsets, &rvecs)?,
            tvec_polyfit: extrinsic_regression(&offsets, &tvecs)?,
            ret: Some(mean_ret),
        })
    }

    /// Rotation vector predicted at `offset`.
    pub fn rvec_at(&self, offset: Real) -> Vec<Real> {
        self.rvec_polyfit.iter().map(|[a, b]| a * offset + b).collect()
    }

    /// Translation vector predicted at `offset`.
    pub fn tvec_at(&self, offset: Real) -> Vec<Real> {
        self.tvec_polyfit.iter().map(|[a, b]| a * offset + b).collect()
    }

    /// Pose at `offset` from the fits, falling back to the reference pose
    /// for components without a fit.
    pub fn pose_at(&self, offset: Real) -> ([Real; 3], [Real; 3]) {
        let fitted = |fit: &[[Real; 2]], reference: [Real; 3]| -> [Real; 3] {
            std::array::from_fn(|axis| {
                fit.get(axis)
                    .map_or(reference[axis], |[a, b]| a * offset + b)
            })
        };
        (
            fitted(&self.rvec_polyfit, self.rvec),
            fitted(&self.tvec_polyfit, self.tvec),
        )
    }

    /// Discrete pose model sampled by projecting the board at each height.
    pub fn pose_model(
        &self,
        heights: &[Real],
        chessboard: [u32; 2],
        [rows, cols]: [usize; 2],
    ) -> Result<PoseModel, CoreError> {
        let camera = FisheyeCamera::new(self.k, &self.d)?;
        let points = heights
            .iter()
            .map(|&h| {
                let (rvec, tvec) = self.pose_at(h);
                camera.project_board(rvec, tvec, chessboard, (rows, cols))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PoseModel::Discrete {
            heights: heights.to_vec(),
            points,
        })
    }

    /// Calibration record with grids sampled at `heights`, anchored on the
    /// principal point.
    pub fn to_record(
        &self,
        heights: &[Real],
        chessboard: [u32; 2],
        grid: [usize; 2],
    ) -> Result<CalibrationRecord, CoreError> {
        let pose = self.pose_model(heights, chessboard, grid)?;
        let center = [self.k[0][2], self.k[1][2]];
        self.clone().into_record(center, pose)
    }

    /// Calibration record combining these intrinsics with a pose model
    /// produced from them.
    pub fn into_record(self, center: [Real; 2], pose: PoseModel) -> Result<CalibrationRecord, CoreError> {
        let record = CalibrationRecord::new(self.k, self.d, center, pose)?;
        Ok(match self.ret {
            Some(ret) => record.with_reprojection_error(ret),
            None => record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solve(ret: Real, rz: Real, tz: Real) -> ChessboardSolve {
        ChessboardSolve {
            k: [[800.0 + ret, 0.0, 640.0], [0.0, 800.0, 360.0], [0.0, 0.0, 1.0]],
            d: vec![0.1, 0.0, 0.0, 0.0],
            rvec: [0.0, 0.0, rz],
            tvec: [1.0, 2.0, tz],
            ret,
        }
    }

    fn at(location: &str, offset: Real, s: ChessboardSolve) -> LocationSolve {
        LocationSolve {
            location: location.to_string(),
            offset,
            solve: s,
            captured_at: 0,
        }
    }

    #[test]
    fn combines_locations_with_linear_extrinsics() {
        let solves = vec![
            at("top_left", -5.0, solve(0.8, 0.1, 95.0)),
            at("center", 0.0, solve(0.4, 0.2, 100.0)),
            at("bottom_right", 5.0, solve(1.2, 0.3, 105.0)),
        ];
        let solution = ChessboardSolution::from_accepted(&solves).unwrap();
        assert_eq!(solution.k[0][0], 800.4);
        assert_eq!(solution.tvec, [1.0, 2.0, 100.0]);
        assert_relative_eq!(solution.tvec_polyfit[2][0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(solution.tvec_polyfit[2][1], 100.0, epsilon = 1e-9);
        assert_relative_eq!(solution.rvec_at(10.0)[2], 0.4, epsilon = 1e-9);
        assert_relative_eq!(solution.ret.unwrap(), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn single_offset_gives_constant_fit() {
        let solves = vec![
            at("a", 2.0, solve(0.5, 0.1, 90.0)),
            at("b", 2.0, solve(0.7, 0.3, 110.0)),
        ];
        let solution = ChessboardSolution::from_accepted(&solves).unwrap();
        assert_eq!(solution.tvec_polyfit[2][0], 0.0);
        assert_relative_eq!(solution.tvec_polyfit[2][1], 100.0, epsilon = 1e-9);
    }

    #[test]
    fn nothing_accepted_is_an_error() {
        assert!(ChessboardSolution::from_accepted(&[]).is_err());
    }

    #[test]
    fn record_grids_follow_the_fitted_pose() {
        let solves = vec![
            at("center", 0.0, solve(0.4, 0.0, 100.0)),
            at("top", 10.0, solve(0.6, 0.0, 120.0)),
        ];
        let solution = ChessboardSolution::from_accepted(&solves).unwrap();
        let (_, tvec) = solution.pose_at(5.0);
        assert_relative_eq!(tvec[2], 110.0, epsilon = 1e-9);

        let record = solution.to_record(&[0.0, 5.0, 10.0], [7, 5], [2, 2]).unwrap();
        assert_eq!(record.center, [640.0, 360.0]);
        let PoseModel::Discrete { heights, points } = &record.pose else {
            panic!("expected a discrete pose model");
        };
        assert_eq!(heights, &[0.0, 5.0, 10.0]);
        assert_eq!(points.len(), 3);
        // The board moves away as the offset grows, so its far corner closes in.
        assert!(points[2][1][1][0] < points[0][1][1][0]);
        assert_eq!(record.ret, solution.ret);
    }

    #[test]
    fn record_keeps_solution_error() {
        let solution =
            ChessboardSolution::from_accepted(&[at("c", 0.0, solve(0.6, 0.0, 100.0))]).unwrap();
        let pose = PoseModel::Regression {
            params: vec![vec![[[0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]]]],
        };
        let record = solution.into_record([640.0, 360.0], pose).unwrap();
        assert_eq!(record.ret, Some(0.6));
        assert_eq!(record.k[0][0], 800.6);
    }
}
