//! Pull-based frame sources consumed by the capture stage.

use std::collections::VecDeque;

use crate::types::{CaptureError, Frame};

/// Anything that can hand out frames on demand.
///
/// `read` is called in a tight loop by the capture stage. A transient failure
/// is reported as `Err` and the caller simply tries again; `Ok(None)` means
/// the source is exhausted and capture should stop. Device handles are
/// released when the source is dropped.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Human readable description used in logs and spans.
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).read()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Replays a fixed list of frames, then reports exhaustion.
///
/// Useful for offline runs and pipeline tests.
pub struct ReplaySource {
    frames: VecDeque<Frame>,
    label: String,
}

impl ReplaySource {
    pub fn new(label: impl Into<String>, frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            label: label.into(),
        }
    }
}

impl FrameSource for ReplaySource {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        Ok(self.frames.pop_front())
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.label)
    }
}
