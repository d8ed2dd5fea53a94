//! Hardware and model back ends selected at build time.

use anyhow::Result;

use super::config::TrackingConfig;

/// Camera, face-mesh detector and PnP solver for a live run.
pub struct Backends {
    pub source: Box<dyn video_ingest::FrameSource>,
    pub detector: Box<dyn face_core::LandmarkDetector>,
    pub solver: Box<dyn face_core::PoseSolver>,
}

#[cfg(feature = "with-opencv")]
pub fn open(config: &TrackingConfig) -> Result<Backends> {
    use anyhow::Context;
    use face_core::{OpenCvFaceMesh, OpenCvPnpSolver};
    use video_ingest::OpenCvCamera;

    let detector = OpenCvFaceMesh::load(
        &config.detector.model,
        config.detector.input_size,
        config.detector.min_confidence,
    )
    .with_context(|| {
        format!(
            "failed to load face mesh model {}",
            config.detector.model.display()
        )
    })?;
    let source = OpenCvCamera::open(
        &config.capture.camera,
        (config.capture.width, config.capture.height),
        config.capture.fps,
    )
    .with_context(|| format!("failed to open camera {}", config.capture.camera))?;

    Ok(Backends {
        source: Box::new(source),
        detector: Box::new(detector),
        solver: Box::new(OpenCvPnpSolver),
    })
}

#[cfg(not(feature = "with-opencv"))]
pub fn open(config: &TrackingConfig) -> Result<Backends> {
    anyhow::bail!(
        "camera {} needs the OpenCV back end; rebuild with --features with-opencv",
        config.capture.camera
    )
}
