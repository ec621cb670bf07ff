//! Perspective point resolution for an arbitrary object height.

use log::info;

use crate::grid::{ensure_shape, grid_shape};
use crate::{
    CalibrationRecord, CoreError, GridDescriptor, GridPoint, LevelingOffsets, LevelingProfile,
    PerspectivePointGrid, PointGrid, PoseModel, Real, RegressionGrid, Workarea, eval_poly,
};

/// The two ways of turning a pose model into a correspondence grid.
///
/// [`PerspectiveResolver`] dispatches to exactly one of these per call.
pub trait PerspectiveModel {
    /// Interpolate between the grids sampled at `heights`.
    fn interpolate(
        &self,
        height: Real,
        heights: &[Real],
        points: &[PointGrid],
        offsets: &LevelingOffsets,
        descriptor: &GridDescriptor,
    ) -> Result<PointGrid, CoreError>;

    /// Evaluate the per-node cubic regression at `height`.
    fn evaluate_regression(
        &self,
        height: Real,
        params: &RegressionGrid,
        offsets: &LevelingOffsets,
        descriptor: &GridDescriptor,
    ) -> Result<PointGrid, CoreError>;
}

impl<M: PerspectiveModel + ?Sized> PerspectiveModel for &M {
    fn interpolate(
        &self,
        height: Real,
        heights: &[Real],
        points: &[PointGrid],
        offsets: &LevelingOffsets,
        descriptor: &GridDescriptor,
    ) -> Result<PointGrid, CoreError> {
        (**self).interpolate(height, heights, points, offsets, descriptor)
    }

    fn evaluate_regression(
        &self,
        height: Real,
        params: &RegressionGrid,
        offsets: &LevelingOffsets,
        descriptor: &GridDescriptor,
    ) -> Result<PointGrid, CoreError> {
        (**self).evaluate_regression(height, params, offsets, descriptor)
    }
}

/// Linear interpolation between bracketing heights and cubic regression,
/// with the leveling offset of each node's region added to its height.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardModel;

/// Largest index `i <= len - 2` with `heights[i] <= h`, or 0.
fn bracket_index(heights: &[Real], h: Real) -> usize {
    let searchable = &heights[..heights.len().saturating_sub(1)];
    searchable.partition_point(|&x| x <= h).saturating_sub(1)
}

fn lerp_point(h0: Real, p0: GridPoint, h1: Real, p1: GridPoint, h: Real) -> GridPoint {
    let span = h1 - h0;
    let w1 = (h - h0) / span;
    let w0 = (h1 - h) / span;
    [p0[0] * w0 + p1[0] * w1, p0[1] * w0 + p1[1] * w1]
}

impl PerspectiveModel for StandardModel {
    fn interpolate(
        &self,
        height: Real,
        heights: &[Real],
        points: &[PointGrid],
        offsets: &LevelingOffsets,
        descriptor: &GridDescriptor,
    ) -> Result<PointGrid, CoreError> {
        if heights.len() != points.len() {
            return Err(CoreError::GridShapeMismatch {
                expected: heights.len(),
                got: points.len(),
            });
        }
        let (Some(first), Some(last)) = (heights.first(), heights.last()) else {
            return Err(CoreError::MalformedRecord(
                "discrete pose model has no heights".into(),
            ));
        };
        if heights.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CoreError::MalformedRecord(
                "calibration heights must be strictly ascending".into(),
            ));
        }
        let (rows, cols) = grid_shape(&points[0]);
        for grid in points {
            ensure_shape(grid, (rows, cols))?;
        }
        if points.len() == 1 {
            return Ok(points[0].clone());
        }

        let positions = descriptor.real_positions(rows, cols);
        let top = points.len() - 1;

        let mut out = Vec::with_capacity(rows);
        for i in 0..rows {
            let mut row = Vec::with_capacity(cols);
            for j in 0..cols {
                let [x, y] = positions[i][j];
                let h = height + offsets.at(x, y, descriptor.workarea);
                let node = if h <= *first {
                    points[0][i][j]
                } else if h >= *last {
                    points[top][i][j]
                } else {
                    let idx = bracket_index(heights, h);
                    lerp_point(
                        heights[idx],
                        points[idx][i][j],
                        heights[idx + 1],
                        points[idx + 1][i][j],
                        h,
                    )
                };
                row.push(node);
            }
            out.push(row);
        }
        Ok(out)
    }

    fn evaluate_regression(
        &self,
        height: Real,
        params: &RegressionGrid,
        offsets: &LevelingOffsets,
        descriptor: &GridDescriptor,
    ) -> Result<PointGrid, CoreError> {
        let (rows, cols) = (params.len(), params.first().map_or(0, Vec::len));
        let positions = descriptor.real_positions(rows, cols);
        params
            .iter()
            .zip(&positions)
            .map(|(row, pos_row)| {
                if row.len() != cols {
                    return Err(CoreError::GridShapeMismatch {
                        expected: cols,
                        got: row.len(),
                    });
                }
                Ok(row
                    .iter()
                    .zip(pos_row)
                    .map(|(node, [x, y])| {
                        let h = height + offsets.at(*x, *y, descriptor.workarea);
                        [eval_poly(&node[0], h), eval_poly(&node[1], h)]
                    })
                    .collect::<Vec<_>>())
            })
            .collect()
    }
}

/// Turns an effective height and a calibration record into a correspondence grid.
///
/// Pure: the record is only read, and identical inputs give identical grids.
#[derive(Debug, Clone)]
pub struct PerspectiveResolver<M = StandardModel> {
    model: M,
    workarea: Workarea,
    chessboard: [u32; 2],
    center: Option<[Real; 2]>,
}

impl PerspectiveResolver<StandardModel> {
    pub fn new(workarea: Workarea, chessboard: [u32; 2]) -> Self {
        Self::with_model(StandardModel, workarea, chessboard)
    }
}

impl<M: PerspectiveModel> PerspectiveResolver<M> {
    pub fn with_model(model: M, workarea: Workarea, chessboard: [u32; 2]) -> Self {
        Self {
            model,
            workarea,
            chessboard,
            center: None,
        }
    }

    /// Align on `center` instead of the record's optical center.
    pub fn with_center(mut self, center: [Real; 2]) -> Self {
        self.center = Some(center);
        self
    }

    pub fn workarea(&self) -> &Workarea {
        &self.workarea
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn descriptor(&self, record: &CalibrationRecord) -> GridDescriptor {
        GridDescriptor {
            chessboard: self.chessboard,
            workarea: self.workarea.extent(),
            center: self.center.unwrap_or(record.center),
        }
    }

    pub fn resolve(
        &self,
        effective_height: Real,
        record: &CalibrationRecord,
        leveling: &LevelingProfile,
    ) -> Result<PerspectivePointGrid, CoreError> {
        if !effective_height.is_finite() {
            return Err(CoreError::NonFiniteInput("effective height"));
        }
        self.workarea.validate()?;
        record.validate()?;
        let offsets = leveling.offsets_at(effective_height, self.workarea.depth)?;
        let descriptor = self.descriptor(record);

        info!(
            "resolving perspective grid: effective height {effective_height:.3}, branch {}",
            record.pose.kind()
        );
        let points = match &record.pose {
            PoseModel::Discrete { heights, points } => {
                self.model
                    .interpolate(effective_height, heights, points, &offsets, &descriptor)?
            }
            PoseModel::Regression { params } => {
                self.model
                    .evaluate_regression(effective_height, params, &offsets, &descriptor)?
            }
        };
        Ok(PerspectivePointGrid::new(effective_height, points))
    }
}
