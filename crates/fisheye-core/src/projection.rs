//! Equidistant fisheye projection of chessboard corners into image pixels.

use crate::grid::{SQUARE_SIZE_MM, split_indices};
use crate::{CoreError, GridPoint, PointGrid, Real, Rot3, Vec3};

/// Camera-frame depth at or below which a point is treated as behind the lens.
const MIN_DEPTH: Real = 1.0e-9;

/// Intrinsic matrix plus the four equidistant distortion coefficients
/// `θd = θ (1 + k1 θ² + k2 θ⁴ + k3 θ⁶ + k4 θ⁸)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FisheyeCamera {
    pub k: [[Real; 3]; 3],
    pub d: [Real; 4],
}

impl FisheyeCamera {
    /// Missing distortion coefficients are zero, extra ones are ignored.
    pub fn new(k: [[Real; 3]; 3], d: &[Real]) -> Result<Self, CoreError> {
        if k.iter().flatten().chain(d).any(|v| !v.is_finite()) {
            return Err(CoreError::NonFiniteInput("camera intrinsics"));
        }
        let mut coeffs = [0.0; 4];
        for (c, v) in coeffs.iter_mut().zip(d) {
            *c = *v;
        }
        Ok(Self { k, d: coeffs })
    }

    /// Pixel of a point in camera coordinates, `None` behind the camera.
    pub fn project(&self, p_c: &Vec3) -> Option<GridPoint> {
        if p_c.z <= MIN_DEPTH {
            return None;
        }
        let a = p_c.x / p_c.z;
        let b = p_c.y / p_c.z;
        let r = a.hypot(b);
        let theta = r.atan();
        let t2 = theta * theta;
        let [k1, k2, k3, k4] = self.d;
        let theta_d = theta * (1.0 + t2 * (k1 + t2 * (k2 + t2 * (k3 + t2 * k4))));
        let scale = if r > MIN_DEPTH { theta_d / r } else { 1.0 };
        let (xd, yd) = (a * scale, b * scale);

        let k = &self.k;
        Some([
            k[0][0] * xd + k[0][1] * yd + k[0][2],
            k[1][1] * yd + k[1][2],
        ])
    }

    /// Pixels of the board corners picked by a `rows x cols` grid, with the
    /// board posed by the axis-angle `rvec` and translation `tvec` (mm).
    pub fn project_board(
        &self,
        rvec: [Real; 3],
        tvec: [Real; 3],
        chessboard: [u32; 2],
        (rows, cols): (usize, usize),
    ) -> Result<PointGrid, CoreError> {
        if rvec.iter().chain(&tvec).any(|v| !v.is_finite()) {
            return Err(CoreError::NonFiniteInput("board pose"));
        }
        let rotation = Rot3::new(Vec3::from(rvec));
        let translation = Vec3::from(tvec);

        split_indices(chessboard, rows, cols)
            .into_iter()
            .enumerate()
            .map(|(row, corners)| {
                corners
                    .into_iter()
                    .enumerate()
                    .map(|(col, [x, y])| {
                        let corner =
                            Vec3::new(x as Real * SQUARE_SIZE_MM, y as Real * SQUARE_SIZE_MM, 0.0);
                        self.project(&(rotation * corner + translation))
                            .ok_or(CoreError::BehindCamera { row, col })
                    })
                    .collect()
            })
            .collect()
    }
}
