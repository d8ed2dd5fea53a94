use std::sync::{Arc, Mutex};

use face_core::{IrisRatio, MouthShape};
use serde::Serialize;
use video_ingest::Frame;

/// Smoothed tracking values after rotation offsets and yaw fusion.
///
/// Starts at all zeros and is only replaced when a face is seen, so frames
/// without a face repeat the last known values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackedState {
    /// Pitch, yaw and roll in degrees.
    pub head_rotation: [f64; 3],
    pub head_translation: [f64; 3],
    pub mouth: MouthShape,
    pub left_iris: IrisRatio,
    pub right_iris: IrisRatio,
    /// Left and right eye openness.
    pub eye_openness: [f64; 2],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EyePair {
    pub left: f32,
    pub right: f32,
}

/// JSON message sent to the primary peer once per processed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TelemetryFrame {
    pub head_rotation: Vec3,
    pub head_translation: Vec3,
    pub iris: Vec2,
    pub eye: EyePair,
    pub mouth: Vec2,
}

impl From<&TrackedState> for TelemetryFrame {
    fn from(state: &TrackedState) -> Self {
        let [pitch, yaw, roll] = state.head_rotation;
        let [tx, ty, tz] = state.head_translation;
        Self {
            head_rotation: Vec3 {
                x: pitch as f32,
                y: yaw as f32,
                z: roll as f32,
            },
            head_translation: Vec3 {
                x: tx as f32,
                y: ty as f32,
                z: tz as f32,
            },
            iris: Vec2 {
                x: ((state.left_iris.x + state.right_iris.x) / 2.0) as f32,
                y: ((state.left_iris.y + state.right_iris.y) / 2.0 * -1.5) as f32,
            },
            eye: EyePair {
                left: state.eye_openness[0] as f32,
                right: state.eye_openness[1] as f32,
            },
            mouth: Vec2 {
                x: state.mouth.width as f32,
                y: (state.mouth.open * 2.0 - 1.0) as f32,
            },
        }
    }
}

impl TelemetryFrame {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Debug drawing inputs for a frame where a face was found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    /// Mean of the pixel landmarks.
    pub centroid: [f64; 2],
    /// Pitch, yaw and roll in degrees, offsets included.
    pub head_rotation: [f64; 3],
    pub left_iris: IrisRatio,
    pub right_iris: IrisRatio,
}

/// Processing stage output handed to the broadcast stage.
#[derive(Debug, Clone)]
pub struct OutputItem {
    pub frame: Frame,
    pub telemetry: TelemetryFrame,
    pub overlay: Option<Overlay>,
    pub frame_number: u64,
}

/// Most recent broadcast, served over HTTP.
#[derive(Debug, Clone, Default)]
pub struct LatestOutput {
    pub jpeg: Option<Vec<u8>>,
    pub telemetry_json: Option<String>,
    pub frame_number: u64,
}

pub type SharedLatest = Arc<Mutex<LatestOutput>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_reports_closed_mouth() {
        let telemetry = TelemetryFrame::from(&TrackedState::default());
        assert_eq!(telemetry.mouth.y, -1.0);
        assert_eq!(telemetry.iris, Vec2::default());
        assert_eq!(telemetry.head_rotation, Vec3::default());
    }

    #[test]
    fn iris_and_mouth_are_remapped() {
        let state = TrackedState {
            head_rotation: [12.0, 5.0, 0.12],
            head_translation: [1.0, -2.0, 30.0],
            mouth: MouthShape {
                width: 0.25,
                open: 0.75,
            },
            left_iris: IrisRatio::new(0.5, 0.5),
            right_iris: IrisRatio::new(0.25, -0.25),
            eye_openness: [1.0, 0.5],
        };
        let telemetry = TelemetryFrame::from(&state);
        assert_eq!(telemetry.iris.x, 0.375);
        assert_eq!(telemetry.iris.y, -0.1875);
        assert_eq!(telemetry.mouth, Vec2 { x: 0.25, y: 0.5 });
        assert_eq!(telemetry.eye, EyePair {
            left: 1.0,
            right: 0.5
        });
        assert_eq!(telemetry.head_rotation.z, 0.12f32);
    }

    #[test]
    fn json_has_expected_shape() {
        let json = TelemetryFrame::from(&TrackedState::default())
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for key in ["head_rotation", "head_translation"] {
            for axis in ["x", "y", "z"] {
                assert!(value[key][axis].is_number(), "{key}.{axis}");
            }
        }
        assert!(value["iris"]["x"].is_number());
        assert!(value["iris"]["y"].is_number());
        assert!(value["eye"]["left"].is_number());
        assert!(value["eye"]["right"].is_number());
        assert_eq!(value["mouth"]["y"], serde_json::json!(-1.0));
        assert_eq!(value.as_object().unwrap().len(), 5);
    }
}
