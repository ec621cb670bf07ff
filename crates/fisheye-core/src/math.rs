use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector2, Vector3};

use crate::CoreError;

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Rot3 = Rotation3<Real>;

/// Evaluate a polynomial with coefficients ordered from the highest degree down.
///
/// `[a3, a2, a1, a0]` evaluates `a3 x³ + a2 x² + a1 x + a0`.
pub fn eval_poly(coeffs: &[Real], x: Real) -> Real {
    coeffs.iter().fold(0.0, |acc, c| acc * x + c)
}

/// Least-squares polynomial fit of `ys` against `xs`.
///
/// Returns `degree + 1` coefficients ordered from the highest degree down,
/// matching [`eval_poly`].
pub fn polyfit(xs: &[Real], ys: &[Real], degree: usize) -> Result<Vec<Real>, CoreError> {
    let n = xs.len();
    if ys.len() != n {
        return Err(CoreError::GridShapeMismatch {
            expected: n,
            got: ys.len(),
        });
    }
    if n < degree + 1 {
        return Err(CoreError::NotEnoughSamples {
            needed: degree + 1,
            got: n,
        });
    }
    if xs.iter().chain(ys).any(|v| !v.is_finite()) {
        return Err(CoreError::NonFiniteInput("polynomial samples"));
    }

    let cols = degree + 1;
    let a = DMatrix::from_fn(n, cols, |r, c| xs[r].powi((degree - c) as i32));
    let b = DVector::from_column_slice(ys);
    let solution = a
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(|_| CoreError::SingularFit)?;
    Ok(solution.iter().copied().collect())
}

/// Pad a coefficient vector on the high-degree side up to `len` entries.
pub fn pad_coefficients(coeffs: &[Real], len: usize) -> Vec<Real> {
    let mut out = vec![0.0; len.saturating_sub(coeffs.len())];
    out.extend_from_slice(coeffs);
    out
}
