//! Frame capture: the [`Frame`] type, the [`FrameSource`] trait the pipeline
//! pulls from, and (with the `opencv` feature) a webcam backend.

#[cfg(feature = "opencv")]
mod camera;
mod device;
mod source;
mod types;

#[cfg(feature = "opencv")]
pub use camera::OpenCvCamera;
pub use device::parse_device_index;
pub use source::{FrameSource, ReplaySource};
pub use types::{CaptureError, Frame, FrameFormat};
