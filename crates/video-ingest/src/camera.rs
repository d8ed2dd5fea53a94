//! OpenCV-backed webcam source.

use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, warn};

use crate::{
    device::parse_device_index,
    source::FrameSource,
    types::{CaptureError, Frame},
};

/// Local camera opened through OpenCV's videoio module.
///
/// Frames come out as BGR8 at `target_size`, resized when the driver does not
/// honour the requested resolution. The device is released on drop.
pub struct OpenCvCamera {
    uri: String,
    cap: VideoCapture,
    target_size: (i32, i32),
    frame: Mat,
    scratch: Mat,
}

impl OpenCvCamera {
    pub fn open(uri: &str, target_size: (i32, i32), fps: f64) -> Result<Self, CaptureError> {
        let mut cap = open_video_capture(uri)?;
        configure_camera(&mut cap, target_size, fps);
        debug!(uri, width = target_size.0, height = target_size.1, fps, "camera opened");
        Ok(Self {
            uri: uri.to_string(),
            cap,
            target_size,
            frame: Mat::default(),
            scratch: Mat::default(),
        })
    }

    fn read_error(&self) -> CaptureError {
        CaptureError::Read {
            uri: self.uri.clone(),
        }
    }
}

impl FrameSource for OpenCvCamera {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed {
            return Err(self.read_error());
        }

        let size = self
            .frame
            .size()
            .map_err(|e| CaptureError::Other(e.into()))?;
        if size.width <= 0 || size.height <= 0 {
            return Err(self.read_error());
        }

        let (target_w, target_h) = self.target_size;
        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &self.frame,
                &mut self.scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &self.scratch
        } else {
            &self.frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Frame::bgr(data, target_w, target_h).map(Some)
    }

    fn describe(&self) -> String {
        format!("opencv:{}", self.uri)
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        if let Err(err) = self.cap.release() {
            warn!(uri = %self.uri, error = %err, "failed to release camera");
        }
    }
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!(index, backend, error = %err, "failed to open camera device");
                }
            }
        }
    }

    match VideoCapture::from_file(uri, videoio::CAP_ANY) {
        Ok(cap) => {
            if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                return Ok(cap);
            }
        }
        Err(err) => {
            warn!(uri, error = %err, "failed to open video source");
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Request resolution, frame rate and MJPG; drivers may ignore any of them.
fn configure_camera(cap: &mut VideoCapture, target_size: (i32, i32), fps: f64) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}
