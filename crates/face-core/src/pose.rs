//! Head pose from 2-D landmarks and the canonical 3-D face model.
//!
//! The perspective-n-point solve itself is delegated to a [`PoseSolver`];
//! this module owns the camera model, the solver warm start and the
//! conversion of a rotation vector into pitch/yaw/roll degrees.

use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::Serialize;
use tracing::trace;

use crate::{error::FaceError, landmarks::LandmarkSet, model_points::MODEL_POINTS};

/// Pinhole intrinsics with no lens distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion: [f64; 4],
}

impl CameraIntrinsics {
    /// Approximate intrinsics for an uncalibrated webcam: focal length equal
    /// to the frame width, principal point at the centre.
    pub fn from_frame_size(width: i32, height: i32) -> Self {
        let w = width as f64;
        let h = height as f64;
        Self {
            fx: w,
            fy: w,
            cx: w / 2.0,
            cy: h / 2.0,
            distortion: [0.0; 4],
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// Raw solver output: axis-angle rotation and translation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoseVectors {
    pub rotation: [f64; 3],
    pub translation: [f64; 3],
}

impl PoseVectors {
    fn is_finite(&self) -> bool {
        self.rotation
            .iter()
            .chain(self.translation.iter())
            .all(|v| v.is_finite())
    }
}

/// Head orientation in degrees plus the solver's translation.
///
/// Pitch is wrapped into `[0, 360)`; yaw and roll are negated so that they
/// read as the subject sees them rather than the camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PoseEstimate {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    pub translation: [f64; 3],
}

impl PoseEstimate {
    pub fn from_vectors(vectors: &PoseVectors) -> Self {
        let [x, y, z] = rq_euler_degrees(&rodrigues(vectors.rotation));
        let pitch = if x < 0.0 { x + 360.0 } else { x };
        Self {
            pitch,
            yaw: -y,
            roll: -z,
            translation: vectors.translation,
        }
    }

    pub fn rotation(&self) -> [f64; 3] {
        [self.pitch, self.yaw, self.roll]
    }
}

/// Perspective-n-point back end.
///
/// `guess` is the previous solution (all zeros before the first one) and is
/// offered as the starting point; solvers may ignore it.
pub trait PoseSolver: Send {
    fn solve(
        &mut self,
        model: &[[f64; 3]],
        observed: &[[f64; 2]],
        intrinsics: &CameraIntrinsics,
        guess: &PoseVectors,
    ) -> Result<PoseVectors, FaceError>;
}

impl<S: PoseSolver + ?Sized> PoseSolver for Box<S> {
    fn solve(
        &mut self,
        model: &[[f64; 3]],
        observed: &[[f64; 2]],
        intrinsics: &CameraIntrinsics,
        guess: &PoseVectors,
    ) -> Result<PoseVectors, FaceError> {
        (**self).solve(model, observed, intrinsics, guess)
    }
}

/// Stateful wrapper that warm-starts the solver with its last answer.
pub struct HeadPoseEstimator<S> {
    solver: S,
    previous: PoseVectors,
    intrinsics: Option<((i32, i32), CameraIntrinsics)>,
}

impl<S: PoseSolver> HeadPoseEstimator<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            previous: PoseVectors::default(),
            intrinsics: None,
        }
    }

    pub fn previous(&self) -> &PoseVectors {
        &self.previous
    }

    pub fn estimate(
        &mut self,
        landmarks: &LandmarkSet,
        width: i32,
        height: i32,
    ) -> Result<PoseEstimate, FaceError> {
        if landmarks.pixel.len() != MODEL_POINTS.len() {
            return Err(FaceError::Correspondence {
                model: MODEL_POINTS.len(),
                observed: landmarks.pixel.len(),
            });
        }

        let intrinsics = match self.intrinsics {
            Some((size, intrinsics)) if size == (width, height) => intrinsics,
            _ => {
                let intrinsics = CameraIntrinsics::from_frame_size(width, height);
                self.intrinsics = Some(((width, height), intrinsics));
                intrinsics
            }
        };

        let vectors =
            self.solver
                .solve(&MODEL_POINTS, &landmarks.pixel, &intrinsics, &self.previous)?;
        if !vectors.is_finite() {
            return Err(FaceError::PoseNotFound);
        }
        self.previous = vectors;

        let estimate = PoseEstimate::from_vectors(&vectors);
        trace!(
            pitch = estimate.pitch,
            yaw = estimate.yaw,
            roll = estimate.roll,
            "head pose"
        );
        Ok(estimate)
    }
}

/// Axis-angle vector to rotation matrix.
pub fn rodrigues(rvec: [f64; 3]) -> Matrix3<f64> {
    Rotation3::from_scaled_axis(Vector3::from(rvec)).into_inner()
}

/// Euler angles (degrees) of a rotation matrix via Givens RQ decomposition.
///
/// For `m = Rz(z) * Ry(y) * Rx(x)` this returns `[x, y, z]`, choosing the
/// solution whose upper-triangular factor has non-negative leading diagonal
/// entries.
pub fn rq_euler_degrees(m: &Matrix3<f64>) -> [f64; 3] {
    let (c_x, s_x) = givens(m[(2, 2)], m[(2, 1)]);
    let qx = Matrix3::new(
        1.0, 0.0, 0.0, //
        0.0, c_x, s_x, //
        0.0, -s_x, c_x,
    );
    let r = m * qx;

    let (c_y, s_y) = givens(r[(2, 2)], -r[(2, 0)]);
    let qy = Matrix3::new(
        c_y, 0.0, -s_y, //
        0.0, 1.0, 0.0, //
        s_y, 0.0, c_y,
    );
    let m2 = r * qy;

    let (c_z, s_z) = givens(m2[(1, 1)], m2[(1, 0)]);
    let mut qz = Matrix3::new(
        c_z, s_z, 0.0, //
        -s_z, c_z, 0.0, //
        0.0, 0.0, 1.0,
    );
    let upper = m2 * qz;

    // Flip by 180 degrees so the first two diagonal entries are positive.
    if upper[(0, 0)] < 0.0 {
        if upper[(1, 1)] < 0.0 {
            qz[(0, 0)] = -qz[(0, 0)];
            qz[(0, 1)] = -qz[(0, 1)];
        } else {
            qz[(0, 0)] = -qz[(0, 0)];
        }
    } else if upper[(1, 1)] < 0.0 {
        qz[(0, 1)] = -qz[(0, 1)];
    }

    [
        signed_acos_degrees(qx[(1, 1)], qx[(1, 2)]),
        signed_acos_degrees(qy[(0, 0)], qy[(2, 0)]),
        signed_acos_degrees(qz[(0, 0)], qz[(0, 1)]),
    ]
}

/// Normalized `(cos, sin)` pair zeroing one sub-diagonal entry.
fn givens(c: f64, s: f64) -> (f64, f64) {
    let z = 1.0 / (c * c + s * s + f64::EPSILON).sqrt();
    (c * z, s * z)
}

fn signed_acos_degrees(cos: f64, sign_of: f64) -> f64 {
    let angle = cos.clamp(-1.0, 1.0).acos().to_degrees();
    if sign_of >= 0.0 { angle } else { -angle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{NORMALIZED_LANDMARKS, PIXEL_LANDMARKS};

    fn rx(deg: f64) -> Matrix3<f64> {
        Rotation3::from_axis_angle(&Vector3::x_axis(), deg.to_radians()).into_inner()
    }

    fn ry(deg: f64) -> Matrix3<f64> {
        Rotation3::from_axis_angle(&Vector3::y_axis(), deg.to_radians()).into_inner()
    }

    fn rz(deg: f64) -> Matrix3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), deg.to_radians()).into_inner()
    }

    fn assert_angles(actual: [f64; 3], expected: [f64; 3]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-4, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn intrinsics_use_width_as_focal_length() {
        let k = CameraIntrinsics::from_frame_size(640, 480);
        let m = k.matrix();
        assert_eq!(m.row(0).iter().copied().collect::<Vec<_>>(), [640.0, 0.0, 320.0]);
        assert_eq!(m.row(1).iter().copied().collect::<Vec<_>>(), [0.0, 640.0, 240.0]);
        assert_eq!(m.row(2).iter().copied().collect::<Vec<_>>(), [0.0, 0.0, 1.0]);
        assert_eq!(k.distortion, [0.0; 4]);
    }

    #[test]
    fn rodrigues_quarter_turn_about_z() {
        let r = rodrigues([0.0, 0.0, std::f64::consts::FRAC_PI_2]);
        let expected = Matrix3::new(
            0.0, -1.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0,
        );
        assert!((r - expected).abs().max() < 1e-12);
        assert_eq!(rodrigues([0.0; 3]), Matrix3::identity());
    }

    #[test]
    fn rodrigues_keeps_the_axis_fixed() {
        let axis = Vector3::new(1.0, -2.0, 0.5).normalize();
        let r = rodrigues((axis * 0.7).into());
        assert!((r * axis - axis).norm() < 1e-12);
        assert!((r.determinant() - 1.0).abs() < 1e-12);
        assert!((r * r.transpose() - Matrix3::identity()).norm() < 1e-12);
    }

    #[test]
    fn single_axis_rotations_decompose() {
        assert_angles(rq_euler_degrees(&rx(20.0)), [20.0, 0.0, 0.0]);
        assert_angles(rq_euler_degrees(&rx(-170.0)), [-170.0, 0.0, 0.0]);
        assert_angles(rq_euler_degrees(&ry(30.0)), [0.0, 30.0, 0.0]);
        assert_angles(rq_euler_degrees(&rz(-25.0)), [0.0, 0.0, -25.0]);
    }

    #[test]
    fn composite_rotation_decomposes_in_zyx_order() {
        let m = rz(5.0) * ry(-12.0) * rx(25.0);
        assert_angles(rq_euler_degrees(&m), [25.0, -12.0, 5.0]);
    }

    #[test]
    fn estimate_wraps_pitch_and_negates_yaw_roll() {
        let pose = PoseEstimate::from_vectors(&PoseVectors {
            rotation: [(-170.0f64).to_radians(), 0.0, 0.0],
            translation: [1.0, 2.0, 3.0],
        });
        assert!((pose.pitch - 190.0).abs() < 1e-4);
        assert!(pose.yaw.abs() < 1e-4);
        assert_eq!(pose.translation, [1.0, 2.0, 3.0]);

        let pose = PoseEstimate::from_vectors(&PoseVectors {
            rotation: [0.0, 30.0f64.to_radians(), 0.0],
            translation: [0.0; 3],
        });
        assert!((pose.yaw - -30.0).abs() < 1e-4);

        let pose = PoseEstimate::from_vectors(&PoseVectors {
            rotation: [0.0, 0.0, 10.0f64.to_radians()],
            translation: [0.0; 3],
        });
        assert!((pose.roll - -10.0).abs() < 1e-4);
    }

    struct Recording {
        guesses: Vec<PoseVectors>,
        answers: Vec<PoseVectors>,
    }

    impl PoseSolver for Recording {
        fn solve(
            &mut self,
            model: &[[f64; 3]],
            observed: &[[f64; 2]],
            intrinsics: &CameraIntrinsics,
            guess: &PoseVectors,
        ) -> Result<PoseVectors, FaceError> {
            assert_eq!(model.len(), observed.len());
            assert_eq!(intrinsics.fx, 640.0);
            self.guesses.push(*guess);
            Ok(self.answers.remove(0))
        }
    }

    fn face() -> LandmarkSet {
        LandmarkSet::new(
            vec![[320.0, 240.0]; PIXEL_LANDMARKS],
            vec![[0.5, 0.5, 0.0]; NORMALIZED_LANDMARKS],
        )
    }

    #[test]
    fn previous_solution_is_fed_back_as_guess() {
        let first = PoseVectors {
            rotation: [0.1, 0.2, 0.3],
            translation: [0.0, 0.0, 50.0],
        };
        let second = PoseVectors {
            rotation: [0.15, 0.2, 0.3],
            translation: [1.0, 0.0, 50.0],
        };
        let mut estimator = HeadPoseEstimator::new(Recording {
            guesses: Vec::new(),
            answers: vec![first, second],
        });

        estimator.estimate(&face(), 640, 480).unwrap();
        estimator.estimate(&face(), 640, 480).unwrap();

        assert_eq!(estimator.solver.guesses, vec![PoseVectors::default(), first]);
        assert_eq!(estimator.previous(), &second);
    }

    #[test]
    fn non_finite_solution_is_rejected_and_not_kept() {
        let mut estimator = HeadPoseEstimator::new(Recording {
            guesses: Vec::new(),
            answers: vec![PoseVectors {
                rotation: [f64::NAN, 0.0, 0.0],
                translation: [0.0; 3],
            }],
        });
        assert!(matches!(
            estimator.estimate(&face(), 640, 480),
            Err(FaceError::PoseNotFound)
        ));
        assert_eq!(estimator.previous(), &PoseVectors::default());
    }

    #[test]
    fn mismatched_point_count_is_an_error() {
        let mut estimator = HeadPoseEstimator::new(Recording {
            guesses: Vec::new(),
            answers: Vec::new(),
        });
        let mut set = face();
        set.pixel.truncate(10);
        assert!(matches!(
            estimator.estimate(&set, 640, 480),
            Err(FaceError::Correspondence { observed: 10, .. })
        ));
    }
}
