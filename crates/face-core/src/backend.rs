//! OpenCV back ends: SQPnP pose solving and a DNN face-mesh detector.

use std::path::Path;

use opencv::{
    calib3d,
    core::{self, Mat, Point2d, Point3d, Scalar, Vector},
    dnn::{self, Net, NetTrait, NetTraitConst},
    prelude::*,
};
use tracing::debug;
use video_ingest::Frame;

use crate::{
    detector::LandmarkDetector,
    error::FaceError,
    landmarks::{LandmarkSet, NORMALIZED_LANDMARKS},
    pose::{CameraIntrinsics, PoseSolver, PoseVectors},
};

fn cv(err: opencv::Error) -> FaceError {
    FaceError::Other(err.into())
}

/// `cv::solvePnP` with the SQPnP method, warm-started from the guess.
#[derive(Debug, Default)]
pub struct OpenCvPnpSolver;

impl PoseSolver for OpenCvPnpSolver {
    fn solve(
        &mut self,
        model: &[[f64; 3]],
        observed: &[[f64; 2]],
        intrinsics: &CameraIntrinsics,
        guess: &PoseVectors,
    ) -> Result<PoseVectors, FaceError> {
        if model.len() != observed.len() {
            return Err(FaceError::Correspondence {
                model: model.len(),
                observed: observed.len(),
            });
        }

        let object: Vector<Point3d> = model
            .iter()
            .map(|p| Point3d::new(p[0], p[1], p[2]))
            .collect();
        let image: Vector<Point2d> = observed.iter().map(|p| Point2d::new(p[0], p[1])).collect();
        // nalgebra is column-major; OpenCV wants rows.
        let rows: [[f64; 3]; 3] = intrinsics.matrix().transpose().into();
        let camera = Mat::from_slice_2d(&rows).map_err(cv)?;
        let distortion = Mat::from_slice_2d(&[intrinsics.distortion]).map_err(cv)?;

        let column = |v: [f64; 3]| Mat::from_slice_2d(&[[v[0]], [v[1]], [v[2]]]);
        let mut rvec = column(guess.rotation).map_err(cv)?;
        let mut tvec = column(guess.translation).map_err(cv)?;

        let solved = calib3d::solve_pnp(
            &object,
            &image,
            &camera,
            &distortion,
            &mut rvec,
            &mut tvec,
            true,
            calib3d::SOLVEPNP_SQPNP,
        )
        .map_err(cv)?;
        if !solved {
            return Err(FaceError::PoseNotFound);
        }

        let read = |m: &Mat| -> Result<[f64; 3], FaceError> {
            Ok([
                *m.at::<f64>(0).map_err(cv)?,
                *m.at::<f64>(1).map_err(cv)?,
                *m.at::<f64>(2).map_err(cv)?,
            ])
        };
        Ok(PoseVectors {
            rotation: read(&rvec)?,
            translation: read(&tvec)?,
        })
    }
}

/// Full-frame face-mesh network loaded from ONNX.
///
/// The network is expected to take a square RGB input scaled to `[-1, 1]`
/// and to produce 478 `(x, y, z)` landmarks in input pixels as its first
/// output, optionally followed by a face-presence logit.
pub struct OpenCvFaceMesh {
    net: Net,
    input_size: i32,
    min_confidence: f32,
}

impl OpenCvFaceMesh {
    pub fn load(path: &Path, input_size: i32, min_confidence: f32) -> Result<Self, FaceError> {
        let model = || FaceError::Model {
            path: path.to_path_buf(),
        };
        let path_str = path.to_str().ok_or_else(model)?;
        let net = dnn::read_net_from_onnx(path_str).map_err(|_| model())?;
        if net.empty().map_err(cv)? {
            return Err(model());
        }
        debug!(?path, input_size, "face mesh model loaded");
        Ok(Self {
            net,
            input_size,
            min_confidence,
        })
    }
}

impl LandmarkDetector for OpenCvFaceMesh {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, FaceError> {
        let flat = Mat::from_slice(&frame.data).map_err(cv)?;
        let bgr = flat.reshape(3, frame.height).map_err(cv)?;
        let size = core::Size::new(self.input_size, self.input_size);
        let blob = dnn::blob_from_image(
            &*bgr,
            1.0 / 127.5,
            size,
            Scalar::all(127.5),
            true,
            false,
            core::CV_32F,
        )
        .map_err(cv)?;

        self.net
            .set_input(&blob, "", 1.0, Scalar::default())
            .map_err(cv)?;
        let names = self.net.get_unconnected_out_layers_names().map_err(cv)?;
        let mut outputs: Vector<Mat> = Vector::new();
        self.net.forward(&mut outputs, &names).map_err(cv)?;

        if outputs.len() > 1 {
            let logit = *outputs.get(1).map_err(cv)?.at::<f32>(0).map_err(cv)?;
            let score = 1.0 / (1.0 + (-logit).exp());
            if score < self.min_confidence {
                return Ok(None);
            }
        }

        let mesh = outputs.get(0).map_err(cv)?;
        let values = mesh.data_typed::<f32>().map_err(cv)?;
        if values.len() < NORMALIZED_LANDMARKS * 3 {
            return Err(FaceError::LandmarkCount {
                kind: "network",
                expected: NORMALIZED_LANDMARKS * 3,
                actual: values.len(),
            });
        }

        let scale = self.input_size as f64;
        let normalized = values
            .chunks_exact(3)
            .take(NORMALIZED_LANDMARKS)
            .map(|p| [p[0] as f64 / scale, p[1] as f64 / scale, p[2] as f64 / scale])
            .collect();
        Ok(Some(LandmarkSet::from_normalized(
            normalized,
            frame.width,
            frame.height,
        )))
    }
}
