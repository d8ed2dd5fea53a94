//! Per-frame ratios derived from the normalized landmarks.
//!
//! Everything here is a pure function of one [`LandmarkSet`]; temporal
//! filtering happens downstream.

use serde::Serialize;

use crate::{
    fusion::{FusionConfig, fuse_by_eye_geometry},
    landmarks::{LEFT_IRIS_CENTER, LandmarkSet, RIGHT_IRIS_CENTER, distance, mean3},
};

/// Normalize `x` into `[0, 1]` over `[lo, hi]`, clamping outside the range.
pub fn remap(x: f64, lo: f64, hi: f64) -> f64 {
    (x.clamp(lo, hi) - lo) / (hi - lo)
}

pub fn lerp(c: f64, a: f64, b: f64) -> f64 {
    (1.0 - c) * a + c * b
}

/// Division that saturates instead of producing NaN for degenerate geometry.
fn ratio(num: f64, den: f64) -> f64 {
    if den.abs() > f64::EPSILON {
        num / den
    } else if num == 0.0 {
        0.0
    } else {
        num.signum() * f64::INFINITY
    }
}

/// Iris offset from the eye centre, each axis in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IrisRatio {
    pub x: f64,
    pub y: f64,
}

impl IrisRatio {
    pub const ZERO: IrisRatio = IrisRatio { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Component-wise [`lerp`] towards `other`.
    pub fn blend(self, c: f64, other: IrisRatio) -> IrisRatio {
        IrisRatio {
            x: lerp(c, self.x, other.x),
            y: lerp(c, self.y, other.y),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MouthShape {
    /// Corner-to-corner spread, in `[-0.8, 0.8]`.
    pub width: f64,
    /// Lip separation, in `[0, 1]`.
    pub open: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EyeState {
    pub iris: IrisRatio,
    /// Raw width/height of the eye opening; large when the eye is shut.
    pub aspect_ratio: f64,
    /// 1 for open, 0 for closed.
    pub openness: f64,
}

/// Raw per-frame measurements for one face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FeatureSample {
    pub mouth: MouthShape,
    pub left_eye: EyeState,
    pub right_eye: EyeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeSide {
    Left,
    Right,
}

struct EyeIndices {
    inner: usize,
    outer: usize,
    lid_a: usize,
    lid_b: usize,
    iris: usize,
}

impl EyeSide {
    fn indices(self) -> EyeIndices {
        match self {
            EyeSide::Left => EyeIndices {
                inner: 133,
                outer: 33,
                lid_a: 159,
                lid_b: 145,
                iris: LEFT_IRIS_CENTER,
            },
            EyeSide::Right => EyeIndices {
                inner: 263,
                outer: 362,
                lid_a: 386,
                lid_b: 374,
                iris: RIGHT_IRIS_CENTER,
            },
        }
    }
}

pub fn mouth(landmarks: &LandmarkSet) -> MouthShape {
    let p = |i| landmarks.point(i);

    let aspect = ((distance(p(81), p(178)) + distance(p(13), p(14)) + distance(p(311), p(402)))
        / (2.0 * distance(p(78), p(308)) + 1e-6))
        .clamp(0.0, 1.0);

    let inner_eye_span = distance(p(133), p(362));
    let outer_eye_span = distance(p(130), p(263));
    let open_ratio = ratio(distance(p(13), p(14)), inner_eye_span);
    let width_ratio = ratio(distance(p(61), p(291)), outer_eye_span);

    MouthShape {
        width: ((remap(width_ratio, 0.35, 0.9) - 0.4) * 2.2).clamp(-0.8, 0.8),
        open: remap(open_ratio + aspect / 2.0, 0.17, 0.8),
    }
}

/// Iris position and openness for one eye, before any fusion.
pub fn eye(landmarks: &LandmarkSet, side: EyeSide) -> EyeState {
    let idx = side.indices();
    let p = |i| landmarks.point(i);

    let width = distance(p(idx.inner), p(idx.outer));
    let height = distance(p(idx.lid_a), p(idx.lid_b));
    let mid = mean3(p(idx.inner), p(idx.outer), p(idx.lid_a));
    let iris = p(idx.iris);

    let aspect_ratio = ratio(width, height);
    EyeState {
        iris: IrisRatio {
            x: ratio(iris[0] - mid[0], width / 4.0).clamp(-1.0, 1.0),
            y: ratio(iris[1] - mid[1], height / 5.0).clamp(-1.0, 1.0),
        },
        aspect_ratio,
        openness: 1.0 - remap(aspect_ratio / 6.0, 0.53, 0.6),
    }
}

/// Measure the whole face, with eye-geometry fusion applied to the iris ratios.
pub fn extract(landmarks: &LandmarkSet, fusion: &FusionConfig) -> FeatureSample {
    let mut left_eye = eye(landmarks, EyeSide::Left);
    let mut right_eye = eye(landmarks, EyeSide::Right);

    let (left_iris, right_iris) = fuse_by_eye_geometry(
        left_eye.iris,
        right_eye.iris,
        left_eye.aspect_ratio,
        right_eye.aspect_ratio,
        fusion,
    );
    left_eye.iris = left_iris;
    right_eye.iris = right_iris;

    FeatureSample {
        mouth: mouth(landmarks),
        left_eye,
        right_eye,
    }
}
