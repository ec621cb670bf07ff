//! Height compensation for rig tilt.

use log::debug;

use crate::{CoreError, Real, RotationData};

/// Height used for perspective lookup.
///
/// Folds the rotation height delta into `object_height` and caps the result
/// at `workarea_depth`, the lowest surface the camera can see. Pure: equal
/// inputs always give equal outputs.
pub fn effective_height(
    object_height: Real,
    rotation: &RotationData,
    workarea_depth: Real,
) -> Result<Real, CoreError> {
    if !object_height.is_finite() {
        return Err(CoreError::NonFiniteInput("object height"));
    }
    if !rotation.dh.is_finite() {
        return Err(CoreError::NonFiniteInput("rotation height delta"));
    }
    if !(workarea_depth.is_finite() && workarea_depth > 0.0) {
        return Err(CoreError::InvalidDepth(workarea_depth));
    }
    let raw = object_height + rotation.dh;
    let effective = raw.min(workarea_depth);
    if effective < raw {
        debug!("effective height {raw} clipped to workarea depth {workarea_depth}");
    }
    Ok(effective)
}
