//! Gaze fusion: reconcile the two iris measurements.
//!
//! The eye-geometry layer runs on raw ratios before smoothing. The head-yaw
//! layer runs on smoothed copies and its output is never fed back into the
//! filters.

use serde::{Deserialize, Serialize};

use crate::{error::FaceError, features::IrisRatio};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Eye aspect ratio above which that eye is treated as closed.
    pub eye_ratio_threshold: f64,
    /// Cross-blend weight when both eyes are open.
    pub eye_blend: f64,
    /// Yaw, in degrees, beyond which the far eye is distrusted.
    pub yaw_threshold_deg: f64,
    /// Cross-blend weight when the head faces the camera.
    pub yaw_blend: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            eye_ratio_threshold: 3.2,
            eye_blend: 0.2,
            yaw_threshold_deg: 15.0,
            yaw_blend: 0.4,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), FaceError> {
        for (name, value) in [("eye_blend", self.eye_blend), ("yaw_blend", self.yaw_blend)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FaceError::Fusion { name, value });
            }
        }
        for (name, value) in [
            ("eye_ratio_threshold", self.eye_ratio_threshold),
            ("yaw_threshold_deg", self.yaw_threshold_deg),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(FaceError::Fusion { name, value });
            }
        }
        Ok(())
    }
}

/// Layer 1: distrust an eye whose opening is too narrow to place the iris.
pub fn fuse_by_eye_geometry(
    left: IrisRatio,
    right: IrisRatio,
    left_ratio: f64,
    right_ratio: f64,
    config: &FusionConfig,
) -> (IrisRatio, IrisRatio) {
    let threshold = config.eye_ratio_threshold;
    match (left_ratio > threshold, right_ratio > threshold) {
        (true, true) => (IrisRatio::ZERO, IrisRatio::ZERO),
        (true, false) => (right, right),
        (false, true) => (left, left),
        (false, false) => (
            left.blend(config.eye_blend, right),
            right.blend(config.eye_blend, left),
        ),
    }
}

/// Layer 2: when the head is turned, trust the eye nearer the camera.
///
/// Positive yaw copies the left eye onto the right one.
pub fn fuse_by_head_yaw(
    left: IrisRatio,
    right: IrisRatio,
    yaw_deg: f64,
    config: &FusionConfig,
) -> (IrisRatio, IrisRatio) {
    let threshold = config.yaw_threshold_deg;
    if yaw_deg > threshold {
        (left, left)
    } else if yaw_deg < -threshold {
        (right, right)
    } else {
        (
            left.blend(config.yaw_blend, right),
            right.blend(config.yaw_blend, left),
        )
    }
}
