use chrono::Utc;
use thiserror::Error;

/// Raw BGR8 frame captured from a video source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// Wrap a BGR8 buffer stamped with the current wall-clock time.
    pub fn bgr(data: Vec<u8>, width: i32, height: i32) -> Result<Self, CaptureError> {
        Self::bgr_at(data, width, height, Utc::now().timestamp_millis())
    }

    /// Wrap a BGR8 buffer with an explicit capture timestamp.
    pub fn bgr_at(
        data: Vec<u8>,
        width: i32,
        height: i32,
        timestamp_ms: i64,
    ) -> Result<Self, CaptureError> {
        let expected = expected_len(width, height, FrameFormat::Bgr8);
        if width <= 0 || height <= 0 || data.len() != expected {
            return Err(CaptureError::Geometry {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms,
            format: FrameFormat::Bgr8,
        })
    }

    /// Milliseconds elapsed since the frame was captured.
    pub fn age_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.timestamp_ms
    }
}

fn expected_len(width: i32, height: i32, format: FrameFormat) -> usize {
    (width.max(0) as usize) * (height.max(0) as usize) * format.bytes_per_pixel()
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("failed to read frame from {uri:?}")]
    Read { uri: String },
    #[error("frame buffer of {len} bytes does not match {width}x{height}")]
    Geometry { width: i32, height: i32, len: usize },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_buffer() {
        let frame = Frame::bgr_at(vec![0; 4 * 2 * 3], 4, 2, 1_000).unwrap();
        assert_eq!(frame.format, FrameFormat::Bgr8);
        assert_eq!(frame.timestamp_ms, 1_000);
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let err = Frame::bgr_at(vec![0; 10], 4, 2, 0).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Geometry {
                width: 4,
                height: 2,
                len: 10
            }
        ));
        assert!(Frame::bgr_at(Vec::new(), 0, 0, 0).is_err());
    }
}
