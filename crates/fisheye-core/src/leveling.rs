//! Platform leveling data and height-scaled region offsets.
//!
//! The workarea is split into a 3x3 region map:
//!
//! ```text
//! A | B | C
//! D | E | F
//! G | H | I
//! ```
//!
//! `E` is the reference region the camera was calibrated against.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Real};

/// Region keys in row-major order.
pub const REGION_KEYS: [&str; 9] = ["A", "B", "C", "D", "E", "F", "G", "H", "I"];
const REFERENCE_REGION: usize = 4;

/// The three reference locations leveling data is measured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelingSource {
    HexaPlatform,
    BottomCover,
    Offset,
}

impl LevelingSource {
    pub const ALL: [LevelingSource; 3] = [Self::HexaPlatform, Self::BottomCover, Self::Offset];

    /// Identifier used by the device when querying this source.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HexaPlatform => "hexa_platform",
            Self::BottomCover => "bottom_cover",
            Self::Offset => "offset",
        }
    }
}

impl fmt::Display for LevelingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-region values for one leveling source, keyed `A..I`.
///
/// Missing regions read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelingData(pub BTreeMap<String, Real>);

impl LevelingData {
    pub fn from_regions(values: [Real; 9]) -> Self {
        Self(
            REGION_KEYS
                .iter()
                .zip(values)
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    pub fn region(&self, index: usize) -> Real {
        REGION_KEYS
            .get(index)
            .and_then(|k| self.0.get(*k))
            .copied()
            .unwrap_or(0.0)
    }

    fn regions(&self) -> [Real; 9] {
        std::array::from_fn(|i| self.region(i))
    }
}

/// Leveling data from all three sources, fetched once per preview session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelingProfile {
    pub hexa_platform: LevelingData,
    pub bottom_cover: LevelingData,
    pub offset: LevelingData,
}

impl LevelingProfile {
    pub fn set(&mut self, source: LevelingSource, data: LevelingData) {
        match source {
            LevelingSource::HexaPlatform => self.hexa_platform = data,
            LevelingSource::BottomCover => self.bottom_cover = data,
            LevelingSource::Offset => self.offset = data,
        }
    }

    /// Unscaled per-region height offsets, relative to the center region `E`:
    ///
    /// `base[k] = (hexa[E] - hexa[k]) - (cover[E] - cover[k]) + offset[k]`
    ///
    /// The cover deviation was already present at calibration time and is
    /// removed; the fixed per-region offset is added as is.
    pub fn base_offsets(&self) -> LevelingOffsets {
        let hexa = self.hexa_platform.regions();
        let cover = self.bottom_cover.regions();
        let fixed = self.offset.regions();
        let regions = std::array::from_fn(|i| {
            let platform = hexa[REFERENCE_REGION] - hexa[i];
            let calibrated = cover[REFERENCE_REGION] - cover[i];
            platform - calibrated + fixed[i]
        });
        LevelingOffsets { regions }
    }

    /// Region offsets scaled to `height` within a workarea of `depth`.
    ///
    /// Deviations shrink linearly as the object rises toward the camera and
    /// vanish at full depth.
    pub fn offsets_at(&self, height: Real, depth: Real) -> Result<LevelingOffsets, CoreError> {
        if !height.is_finite() {
            return Err(CoreError::NonFiniteInput("leveling height"));
        }
        if !(depth.is_finite() && depth > 0.0) {
            return Err(CoreError::InvalidDepth(depth));
        }
        let factor = (1.0 - height / depth).clamp(0.0, 1.0);
        Ok(self.base_offsets().scaled(factor))
    }
}

/// Height offsets per region, ready to be added to a grid point's height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelingOffsets {
    pub regions: [Real; 9],
}

impl LevelingOffsets {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn scaled(&self, factor: Real) -> Self {
        Self {
            regions: self.regions.map(|v| v * factor),
        }
    }

    /// Region index (`0..9`, row-major) containing `(x, y)` on a `[width, height]` workarea.
    pub fn region_index(x: Real, y: Real, workarea: [Real; 2]) -> usize {
        let third = |v: Real, extent: Real| {
            if 3.0 * v > 2.0 * extent {
                2
            } else if 3.0 * v > extent {
                1
            } else {
                0
            }
        };
        third(y, workarea[1]) * 3 + third(x, workarea[0])
    }

    pub fn at(&self, x: Real, y: Real, workarea: [Real; 2]) -> Real {
        self.regions[Self::region_index(x, y, workarea)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_map_to_thirds() {
        let wa = [300.0, 300.0];
        let probes = [
            (50.0, 50.0),
            (150.0, 50.0),
            (250.0, 50.0),
            (50.0, 150.0),
            (150.0, 150.0),
            (250.0, 150.0),
            (50.0, 250.0),
            (150.0, 250.0),
            (250.0, 250.0),
        ];
        for (expected, (x, y)) in probes.into_iter().enumerate() {
            assert_eq!(
                LevelingOffsets::region_index(x, y, wa),
                expected,
                "{} at ({x}, {y})",
                REGION_KEYS[expected]
            );
        }
    }

    #[test]
    fn boundaries_belong_to_lower_region() {
        assert_eq!(LevelingOffsets::region_index(100.0, 0.0, [300.0, 300.0]), 0);
        assert_eq!(LevelingOffsets::region_index(200.0, 0.0, [300.0, 300.0]), 1);
    }

    #[test]
    fn base_offsets_are_relative_to_reference_region() {
        let mut profile = LevelingProfile::default();
        profile.set(
            LevelingSource::HexaPlatform,
            LevelingData::from_regions([1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0]),
        );
        profile.set(
            LevelingSource::Offset,
            LevelingData::from_regions([0.5; 9]),
        );
        let base = profile.base_offsets();
        assert_eq!(base.regions[0], 2.0 - 1.0 + 0.5);
        assert_eq!(base.regions[4], 0.5);
        assert_eq!(base.regions[8], 2.0 + 0.5);
    }

    #[test]
    fn offsets_vanish_at_full_depth() {
        let profile = LevelingProfile {
            offset: LevelingData::from_regions([1.0; 9]),
            ..Default::default()
        };
        assert_eq!(profile.offsets_at(0.0, 40.0).unwrap().regions, [1.0; 9]);
        assert_eq!(profile.offsets_at(10.0, 40.0).unwrap().regions, [0.75; 9]);
        assert_eq!(profile.offsets_at(40.0, 40.0).unwrap().regions, [0.0; 9]);
        assert_eq!(profile.offsets_at(55.0, 40.0).unwrap().regions, [0.0; 9]);
    }

    #[test]
    fn missing_keys_read_as_zero() {
        let data: LevelingData = serde_json::from_str(r#"{"A": 1.5}"#).unwrap();
        assert_eq!(data.region(0), 1.5);
        assert_eq!(data.region(4), 0.0);
    }

    #[test]
    fn rejects_non_positive_depth() {
        assert!(LevelingProfile::default().offsets_at(1.0, 0.0).is_err());
    }
}
