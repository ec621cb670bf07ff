//! Converting discrete-height samples into the cubic regression form.

use crate::grid::{ensure_shape, grid_shape};
use crate::{CoreError, NodeRegression, PointGrid, PoseModel, Real, RegressionGrid};
use crate::{pad_coefficients, polyfit};

/// Highest polynomial degree stored per node.
pub const REGRESSION_DEGREE: usize = 3;

/// Fit every grid node against height.
///
/// Uses degree `min(3, samples - 1)`; lower-degree fits are zero-padded so
/// every node carries four coefficients.
pub fn fit_z3_regression(heights: &[Real], points: &[PointGrid]) -> Result<RegressionGrid, CoreError> {
    if heights.len() != points.len() {
        return Err(CoreError::GridShapeMismatch {
            expected: heights.len(),
            got: points.len(),
        });
    }
    let Some(first) = points.first() else {
        return Err(CoreError::NotEnoughSamples { needed: 1, got: 0 });
    };
    let shape = grid_shape(first);
    for grid in points {
        ensure_shape(grid, shape)?;
    }

    let degree = REGRESSION_DEGREE.min(heights.len() - 1);
    let (rows, cols) = shape;
    let mut params = Vec::with_capacity(rows);
    for i in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for j in 0..cols {
            let mut node: NodeRegression = [[0.0; 4]; 2];
            for (axis, coeffs) in node.iter_mut().enumerate() {
                let ys: Vec<Real> = points.iter().map(|g| g[i][j][axis]).collect();
                let fit = polyfit(heights, &ys, degree)?;
                coeffs.copy_from_slice(&pad_coefficients(&fit, REGRESSION_DEGREE + 1));
            }
            row.push(node);
        }
        params.push(row);
    }
    Ok(params)
}

impl PoseModel {
    /// Regression form of this model; a regression model is returned as is.
    pub fn to_regression(&self) -> Result<PoseModel, CoreError> {
        match self {
            Self::Discrete { heights, points } => Ok(Self::Regression {
                params: fit_z3_regression(heights, points)?,
            }),
            Self::Regression { .. } => Ok(self.clone()),
        }
    }
}
