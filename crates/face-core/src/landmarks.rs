//! Landmark containers and the fixed MediaPipe face-mesh indices.

use crate::error::FaceError;

/// Head-geometry points, matched against [`crate::MODEL_POINTS`].
pub const PIXEL_LANDMARKS: usize = 468;
/// Head-geometry points plus the ten refined iris points.
pub const NORMALIZED_LANDMARKS: usize = 478;

pub const LEFT_IRIS_CENTER: usize = 468;
pub const RIGHT_IRIS_CENTER: usize = 473;

/// One detected face.
///
/// `pixel` holds integer pixel coordinates (stored as `f64`) and feeds the
/// pose solver. `normalized` holds `(x, y, z)` in `[0, 1]` image units and
/// feeds every ratio in [`crate::features`].
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    pub pixel: Vec<[f64; 2]>,
    pub normalized: Vec<[f64; 3]>,
}

impl LandmarkSet {
    pub fn new(pixel: Vec<[f64; 2]>, normalized: Vec<[f64; 3]>) -> Self {
        Self { pixel, normalized }
    }

    /// Build both views from normalized detector output.
    ///
    /// Pixel coordinates are truncated to whole pixels and only the first
    /// [`PIXEL_LANDMARKS`] points are kept for them.
    pub fn from_normalized(normalized: Vec<[f64; 3]>, width: i32, height: i32) -> Self {
        let (w, h) = (width as f64, height as f64);
        let pixel = normalized
            .iter()
            .take(PIXEL_LANDMARKS)
            .map(|p| [(p[0] * w).trunc(), (p[1] * h).trunc()])
            .collect();
        Self { pixel, normalized }
    }

    /// Reject sets with the wrong number of points or non-finite coordinates.
    pub fn validate(&self) -> Result<(), FaceError> {
        if self.pixel.len() != PIXEL_LANDMARKS {
            return Err(FaceError::LandmarkCount {
                kind: "pixel",
                expected: PIXEL_LANDMARKS,
                actual: self.pixel.len(),
            });
        }
        if self.normalized.len() != NORMALIZED_LANDMARKS {
            return Err(FaceError::LandmarkCount {
                kind: "normalized",
                expected: NORMALIZED_LANDMARKS,
                actual: self.normalized.len(),
            });
        }
        if let Some(index) = self
            .pixel
            .iter()
            .position(|p| p.iter().any(|v| !v.is_finite()))
        {
            return Err(FaceError::NonFinite {
                kind: "pixel",
                index,
            });
        }
        if let Some(index) = self
            .normalized
            .iter()
            .position(|p| p.iter().any(|v| !v.is_finite()))
        {
            return Err(FaceError::NonFinite {
                kind: "normalized",
                index,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn point(&self, index: usize) -> [f64; 3] {
        self.normalized[index]
    }

    /// Mean of the pixel landmarks, used as the origin for pose overlays.
    pub fn pixel_centroid(&self) -> [f64; 2] {
        if self.pixel.is_empty() {
            return [0.0, 0.0];
        }
        let n = self.pixel.len() as f64;
        let (sx, sy) = self
            .pixel
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
        [sx / n, sy / n]
    }
}

pub(crate) fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

pub(crate) fn mean3(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> [f64; 3] {
    [
        (a[0] + b[0] + c[0]) / 3.0,
        (a[1] + b[1] + c[1]) / 3.0,
        (a[2] + b[2] + c[2]) / 3.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(n: usize) -> Vec<[f64; 3]> {
        vec![[0.5, 0.5, 0.0]; n]
    }

    #[test]
    fn from_normalized_truncates_and_limits_pixels() {
        let mut points = flat(NORMALIZED_LANDMARKS);
        points[0] = [0.251, 0.999, 0.0];
        let set = LandmarkSet::from_normalized(points, 640, 480);
        assert_eq!(set.pixel.len(), PIXEL_LANDMARKS);
        assert_eq!(set.normalized.len(), NORMALIZED_LANDMARKS);
        assert_eq!(set.pixel[0], [160.0, 479.0]);
        assert!(set.validate().is_ok());
    }

    #[test]
    fn validate_rejects_wrong_counts() {
        let set = LandmarkSet::new(vec![[0.0, 0.0]; 10], flat(NORMALIZED_LANDMARKS));
        assert!(matches!(
            set.validate(),
            Err(FaceError::LandmarkCount {
                kind: "pixel",
                actual: 10,
                ..
            })
        ));

        let set = LandmarkSet::new(vec![[0.0, 0.0]; PIXEL_LANDMARKS], flat(PIXEL_LANDMARKS));
        assert!(matches!(
            set.validate(),
            Err(FaceError::LandmarkCount {
                kind: "normalized",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_nan() {
        let mut normalized = flat(NORMALIZED_LANDMARKS);
        normalized[473][1] = f64::NAN;
        let set = LandmarkSet::new(vec![[0.0, 0.0]; PIXEL_LANDMARKS], normalized);
        assert!(matches!(
            set.validate(),
            Err(FaceError::NonFinite {
                kind: "normalized",
                index: 473
            })
        ));
    }

    #[test]
    fn centroid_of_pixels() {
        let set = LandmarkSet::new(vec![[0.0, 0.0], [10.0, 20.0]], Vec::new());
        assert_eq!(set.pixel_centroid(), [5.0, 10.0]);
    }
}
