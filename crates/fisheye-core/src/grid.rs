//! Correspondence-point grids and the rig descriptor shared by both resolver branches.

use serde::{Deserialize, Serialize};

use crate::{CoreError, Real};

/// One pixel correspondence `[x, y]`.
pub type GridPoint = [Real; 2];

/// Row-major 2-D grid of correspondence points.
pub type PointGrid = Vec<Vec<GridPoint>>;

/// Output resolution of the perspective-transformed preview image.
pub const PIXELS_PER_MM: Real = 5.0;
/// Padding (pixels) around the chessboard in the transformed image.
pub const CANVAS_PADDING_PX: Real = 100.0;
/// Edge length of one chessboard square in millimetres.
pub const SQUARE_SIZE_MM: Real = 10.0;

/// Resolver output: a correspondence grid tagged with the height it was built for.
///
/// Recomputed on every object-height change and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectivePointGrid {
    pub height: Real,
    pub points: PointGrid,
}

impl PerspectivePointGrid {
    pub fn new(height: Real, points: PointGrid) -> Self {
        Self { height, points }
    }

    /// `(rows, cols)` of the grid.
    pub fn shape(&self) -> (usize, usize) {
        grid_shape(&self.points)
    }
}

/// `(rows, cols)` of a grid; `cols` is taken from the first row.
pub fn grid_shape(grid: &[Vec<GridPoint>]) -> (usize, usize) {
    (grid.len(), grid.first().map_or(0, Vec::len))
}

/// Check that `grid` is exactly `shape` (rows, cols).
pub(crate) fn ensure_shape(grid: &[Vec<GridPoint>], shape: (usize, usize)) -> Result<(), CoreError> {
    if grid.len() != shape.0 {
        return Err(CoreError::GridShapeMismatch {
            expected: shape.0,
            got: grid.len(),
        });
    }
    for row in grid {
        if row.len() != shape.1 {
            return Err(CoreError::GridShapeMismatch {
                expected: shape.1,
                got: row.len(),
            });
        }
    }
    Ok(())
}

/// Chessboard corner index covered by each node of a `rows x cols` grid.
///
/// The grid splits the board evenly along both axes; the last node is
/// clamped to the last corner.
pub fn split_indices(chessboard: [u32; 2], rows: usize, cols: usize) -> Vec<Vec<[u32; 2]>> {
    let pick = |n: usize, splits: usize, corners: u32| -> u32 {
        if splits == 0 || corners == 0 {
            return 0;
        }
        let idx = (n as u64 * corners as u64 / splits as u64) as u32;
        idx.min(corners - 1)
    };
    let split_rows = rows.saturating_sub(1);
    let split_cols = cols.saturating_sub(1);
    (0..rows)
        .map(|i| {
            (0..cols)
                .map(|j| [pick(i, split_rows, chessboard[0]), pick(j, split_cols, chessboard[1])])
                .collect()
        })
        .collect()
}

/// Physical rig layout the resolver needs to place grid points on the workarea.
///
/// Shared by the interpolation and regression branches so the resolver stays
/// agnostic to which machine is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridDescriptor {
    /// Chessboard corner counts `[cols, rows]`.
    pub chessboard: [u32; 2],
    /// Workarea `[width, height]` in millimetres.
    pub workarea: [Real; 2],
    /// Alignment center of the transformed image, in pixels.
    pub center: [Real; 2],
}

impl GridDescriptor {
    /// Chessboard corner index covered by each grid node.
    pub fn split_indices(&self, rows: usize, cols: usize) -> Vec<Vec<[u32; 2]>> {
        split_indices(self.chessboard, rows, cols)
    }

    /// Physical workarea position (mm) of each grid node.
    pub fn real_positions(&self, rows: usize, cols: usize) -> PointGrid {
        let [cx, cy] = self.center;
        let [w, h] = self.workarea;
        self.split_indices(rows, cols)
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|[x, y]| {
                        let px = CANVAS_PADDING_PX + x as Real * SQUARE_SIZE_MM * PIXELS_PER_MM;
                        let py = CANVAS_PADDING_PX + y as Real * SQUARE_SIZE_MM * PIXELS_PER_MM;
                        [(px - cx) / PIXELS_PER_MM + w / 2.0, (py - cy) / PIXELS_PER_MM + h / 2.0]
                    })
                    .collect()
            })
            .collect()
    }
}
