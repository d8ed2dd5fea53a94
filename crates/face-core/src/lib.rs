//! Face geometry for the tracking pipeline.
//!
//! Turns one detected face into raw feature ratios ([`features`]), reconciles
//! the two iris readings ([`fusion`]) and recovers the head pose ([`pose`]).
//! Landmark detection and the PnP solve are abstracted behind
//! [`LandmarkDetector`] and [`PoseSolver`]; OpenCV implementations live behind
//! the `opencv` feature.

#[cfg(feature = "opencv")]
mod backend;
mod detector;
mod error;
pub mod features;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod fusion;
mod landmarks;
mod model_points;
pub mod pose;

#[cfg(feature = "opencv")]
pub use backend::{OpenCvFaceMesh, OpenCvPnpSolver};
pub use detector::LandmarkDetector;
pub use error::FaceError;
pub use features::{EyeState, FeatureSample, IrisRatio, MouthShape, extract, lerp, remap};
pub use fusion::{FusionConfig, fuse_by_eye_geometry, fuse_by_head_yaw};
pub use landmarks::{
    LEFT_IRIS_CENTER, LandmarkSet, NORMALIZED_LANDMARKS, PIXEL_LANDMARKS, RIGHT_IRIS_CENTER,
};
pub use model_points::MODEL_POINTS;
pub use pose::{CameraIntrinsics, HeadPoseEstimator, PoseEstimate, PoseSolver, PoseVectors};
