use serde::{Deserialize, Serialize};

use crate::{CoreError, Mat3, Real, Rot3};

/// Camera/gantry tilt relative to the work surface.
///
/// Angles are in radians. `sh`/`ch` project the object height into the
/// device's rotation height term, `dh` shifts the lookup height, and
/// `tx`/`ty` translate the transformed image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationData {
    pub rx: Real,
    pub ry: Real,
    pub rz: Real,
    pub sh: Real,
    pub ch: Real,
    pub dh: Real,
    #[serde(default)]
    pub tx: Real,
    #[serde(default)]
    pub ty: Real,
}

/// Rotation transform as the device applies it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationCommand {
    pub rx: Real,
    pub ry: Real,
    pub rz: Real,
    pub h: Real,
    pub tx: Real,
    pub ty: Real,
}

impl RotationData {
    fn ensure_finite(&self) -> Result<(), CoreError> {
        let values = [
            self.rx, self.ry, self.rz, self.sh, self.ch, self.dh, self.tx, self.ty,
        ];
        if values.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(CoreError::NonFiniteInput("rotation data"))
        }
    }

    /// Device command for an object of `object_height` in a workarea of `depth`.
    ///
    /// `h = sh * (depth - object_height) + ch`: the distance from the camera
    /// to the object surface, projected through the tilt.
    pub fn command(&self, object_height: Real, depth: Real) -> Result<RotationCommand, CoreError> {
        self.ensure_finite()?;
        if !object_height.is_finite() {
            return Err(CoreError::NonFiniteInput("object height"));
        }
        if !(depth.is_finite() && depth > 0.0) {
            return Err(CoreError::InvalidDepth(depth));
        }
        Ok(RotationCommand {
            rx: self.rx,
            ry: self.ry,
            rz: self.rz,
            h: self.sh * (depth - object_height) + self.ch,
            tx: self.tx,
            ty: self.ty,
        })
    }

    /// Rotation as a matrix (roll `rx`, pitch `ry`, yaw `rz`).
    pub fn matrix(&self) -> Mat3 {
        Rot3::from_euler_angles(self.rx, self.ry, self.rz).into_inner()
    }
}
