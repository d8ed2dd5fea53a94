use video_ingest::Frame;

use crate::{error::FaceError, landmarks::LandmarkSet};

/// Finds at most one face per frame.
///
/// `Ok(None)` means no face was visible, which the pipeline treats as a
/// normal frame. Callers validate the returned set before using it.
pub trait LandmarkDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, FaceError>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, FaceError> {
        (**self).detect(frame)
    }
}
