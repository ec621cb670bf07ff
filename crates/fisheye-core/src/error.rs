use thiserror::Error;

use crate::Real;

/// Errors raised by the pure computation layer.
///
/// These are never defaulted away: a silently wrong perspective grid shows up
/// as a misaligned preview with nothing to diagnose it from.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The record carries neither discrete-height nor regression pose data.
    #[error("malformed calibration record: {0}")]
    MalformedRecord(String),
    /// Two grids (or a grid and its heights) disagree in shape.
    #[error("grid shape mismatch: expected {expected}, got {got}")]
    GridShapeMismatch { expected: usize, got: usize },
    /// A NaN or infinite value reached a computation.
    #[error("non-finite value in {0}")]
    NonFiniteInput(&'static str),
    /// Workarea dimensions cannot be used for compensation.
    #[error("invalid workarea: width {width}, height {height}, depth {depth}")]
    InvalidWorkarea {
        width: Real,
        height: Real,
        depth: Real,
    },
    /// Workarea depth must be positive and finite.
    #[error("invalid workarea depth {0}")]
    InvalidDepth(Real),
    /// Not enough samples for the requested fit.
    #[error("need at least {needed} samples, got {got}")]
    NotEnoughSamples { needed: usize, got: usize },
    /// A board corner projected from behind the camera.
    #[error("board corner at node ({row}, {col}) is behind the camera")]
    BehindCamera { row: usize, col: usize },
    /// Least-squares solve failed.
    #[error("polynomial fit is singular")]
    SingularFit,
}
