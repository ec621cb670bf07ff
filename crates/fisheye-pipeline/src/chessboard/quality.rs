use std::fmt;

use anyhow::{Result, ensure};
use fisheye_core::Real;
use serde::{Deserialize, Serialize};

/// Quality band of a chessboard solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReprojectionQuality {
    Excellent,
    Good,
    Poor,
}

impl ReprojectionQuality {
    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Poor => "poor",
        }
    }
}

impl fmt::Display for ReprojectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Upper bounds (inclusive, pixels RMS) of the better quality bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub excellent_max: Real,
    pub good_max: Real,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent_max: 1.0,
            good_max: 3.0,
        }
    }
}

impl QualityThresholds {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.excellent_max > 0.0 && self.excellent_max.is_finite(),
            "excellent_max must be positive, got {}",
            self.excellent_max
        );
        ensure!(
            self.good_max >= self.excellent_max && self.good_max.is_finite(),
            "good_max ({}) must not be below excellent_max ({})",
            self.good_max,
            self.excellent_max
        );
        Ok(())
    }

    /// Classify a reprojection error; NaN is poor.
    pub fn classify(&self, ret: Real) -> ReprojectionQuality {
        if ret <= self.excellent_max {
            ReprojectionQuality::Excellent
        } else if ret <= self.good_max {
            ReprojectionQuality::Good
        } else {
            ReprojectionQuality::Poor
        }
    }
}

/// Operator-facing summary of a solve.
pub fn result_message(quality: ReprojectionQuality, ret: Real) -> String {
    format!("Calibration result: {quality} (reprojection error {ret:.2})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_errors_fall_into_their_bands() {
        let thresholds = QualityThresholds::default();
        let cases = [
            (0.5, ReprojectionQuality::Excellent),
            (2.0, ReprojectionQuality::Good),
            (5.0, ReprojectionQuality::Poor),
        ];
        for (ret, expected) in cases {
            let quality = thresholds.classify(ret);
            assert_eq!(quality, expected, "ret {ret}");
            let message = result_message(quality, ret);
            assert!(message.contains(expected.label()), "{message}");
            assert!(message.contains(&format!("{ret:.2}")), "{message}");
        }
    }

    #[test]
    fn band_edges_are_inclusive() {
        let thresholds = QualityThresholds::default();
        assert_eq!(thresholds.classify(1.0), ReprojectionQuality::Excellent);
        assert_eq!(thresholds.classify(3.0), ReprojectionQuality::Good);
        assert_eq!(thresholds.classify(3.0001), ReprojectionQuality::Poor);
        assert_eq!(thresholds.classify(Real::NAN), ReprojectionQuality::Poor);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let thresholds = QualityThresholds {
            excellent_max: 2.0,
            good_max: 1.0,
        };
        assert!(thresholds.validate().is_err());
        assert!(QualityThresholds::default().validate().is_ok());
    }
}
