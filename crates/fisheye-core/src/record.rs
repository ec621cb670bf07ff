//! Calibration record: lens intrinsics plus a per-height pose model.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::grid::{ensure_shape, grid_shape};
use crate::{CoreError, Mat3, PointGrid, Real};

/// Cubic coefficients `[a3, a2, a1, a0]` for the x and y coordinate of one grid node.
pub type NodeRegression = [[Real; 4]; 2];

/// Row-major grid of per-node regressions.
pub type RegressionGrid = Vec<Vec<NodeRegression>>;

/// How correspondence points vary with height.
#[derive(Debug, Clone, PartialEq)]
pub enum PoseModel {
    /// Grids sampled at ascending calibration heights.
    Discrete {
        heights: Vec<Real>,
        points: Vec<PointGrid>,
    },
    /// Cubic fit of every grid node against height.
    Regression { params: RegressionGrid },
}

impl PoseModel {
    /// Short branch name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discrete { .. } => "interpolation",
            Self::Regression { .. } => "regression",
        }
    }

    /// `(rows, cols)` of the grids this model produces.
    pub fn grid_shape(&self) -> (usize, usize) {
        match self {
            Self::Discrete { points, .. } => points.first().map_or((0, 0), |g| grid_shape(g)),
            Self::Regression { params } => (params.len(), params.first().map_or(0, Vec::len)),
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::Discrete { heights, points } => {
                if heights.is_empty() {
                    return Err(CoreError::MalformedRecord(
                        "discrete pose model has no heights".into(),
                    ));
                }
                if heights.len() != points.len() {
                    return Err(CoreError::GridShapeMismatch {
                        expected: heights.len(),
                        got: points.len(),
                    });
                }
                if heights.iter().any(|h| !h.is_finite()) {
                    return Err(CoreError::NonFiniteInput("calibration heights"));
                }
                if heights.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(CoreError::MalformedRecord(
                        "calibration heights must be strictly ascending".into(),
                    ));
                }
                let shape = grid_shape(&points[0]);
                if shape.0 == 0 || shape.1 == 0 {
                    return Err(CoreError::MalformedRecord("empty point grid".into()));
                }
                for grid in points {
                    ensure_shape(grid, shape)?;
                }
                Ok(())
            }
            Self::Regression { params } => {
                let cols = params.first().map_or(0, Vec::len);
                if cols == 0 {
                    return Err(CoreError::MalformedRecord(
                        "regression pose model is empty".into(),
                    ));
                }
                for row in params {
                    if row.len() != cols {
                        return Err(CoreError::GridShapeMismatch {
                            expected: cols,
                            got: row.len(),
                        });
                    }
                    if row.iter().flatten().flatten().any(|c| !c.is_finite()) {
                        return Err(CoreError::NonFiniteInput("regression coefficients"));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Calibration state for one camera/device pairing.
///
/// Superseded, never mutated, on re-calibration. The JSON form uses the
/// device-side keys (`k`, `d`, `center`, `heights`, `points`, `z3regParam`);
/// when both pose forms are stored the discrete one wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordFile", into = "RecordFile")]
pub struct CalibrationRecord {
    /// Intrinsic matrix, row-major.
    pub k: [[Real; 3]; 3],
    /// Distortion coefficients.
    pub d: Vec<Real>,
    /// Optical center in pixels; the default alignment anchor.
    pub center: [Real; 2],
    pub pose: PoseModel,
    /// Reprojection error of the solve that produced this record.
    pub ret: Option<Real>,
}

impl CalibrationRecord {
    pub fn new(
        k: [[Real; 3]; 3],
        d: Vec<Real>,
        center: [Real; 2],
        pose: PoseModel,
    ) -> Result<Self, CoreError> {
        let record = Self {
            k,
            d,
            center,
            pose,
            ret: None,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn with_reprojection_error(mut self, ret: Real) -> Self {
        self.ret = Some(ret);
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let mut values = self.k.iter().flatten().chain(&self.d).chain(&self.center);
        if values.any(|v| !v.is_finite()) {
            return Err(CoreError::NonFiniteInput("camera intrinsics"));
        }
        self.pose.validate()
    }

    pub fn k_matrix(&self) -> Mat3 {
        Mat3::from_fn(|r, c| self.k[r][c])
    }
}

#[derive(Serialize, Deserialize)]
struct RecordFile {
    k: [[Real; 3]; 3],
    #[serde(default)]
    d: Vec<Real>,
    center: [Real; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    heights: Option<Vec<Real>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    points: Option<Vec<PointGrid>>,
    #[serde(
        rename = "z3regParam",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    z3_reg_param: Option<RegressionGrid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ret: Option<Real>,
}

impl TryFrom<RecordFile> for CalibrationRecord {
    type Error = CoreError;

    fn try_from(file: RecordFile) -> Result<Self, Self::Error> {
        let heights = file.heights.filter(|h| !h.is_empty());
        let points = file.points.filter(|p| !p.is_empty());
        let regression = file.z3_reg_param.filter(|r| !r.is_empty());

        let pose = match (heights, points, regression) {
            (Some(heights), Some(points), regression) => {
                if regression.is_some() {
                    debug!("record carries both pose forms, using discrete heights");
                }
                PoseModel::Discrete { heights, points }
            }
            (_, _, Some(params)) => PoseModel::Regression { params },
            (Some(_), None, None) | (None, Some(_), None) => {
                return Err(CoreError::MalformedRecord(
                    "discrete pose needs both heights and points".into(),
                ));
            }
            (None, None, None) => {
                return Err(CoreError::MalformedRecord(
                    "record has neither discrete heights nor regression parameters".into(),
                ));
            }
        };

        let record = CalibrationRecord {
            k: file.k,
            d: file.d,
            center: file.center,
            pose,
            ret: file.ret,
        };
        record.validate()?;
        Ok(record)
    }
}

impl From<CalibrationRecord> for RecordFile {
    fn from(record: CalibrationRecord) -> Self {
        let (heights, points, z3_reg_param) = match record.pose {
            PoseModel::Discrete { heights, points } => (Some(heights), Some(points), None),
            PoseModel::Regression { params } => (None, None, Some(params)),
        };
        RecordFile {
            k: record.k,
            d: record.d,
            center: record.center,
            heights,
            points,
            z3_reg_param,
            ret: record.ret,
        }
    }
}
