//! Run configuration: TOML file sections with defaults, then CLI overrides.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use face_core::FusionConfig;
use serde::{Deserialize, Serialize};
use smoothing::SmootherSpec;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub smoothing: SmoothingConfig,
    pub fusion: FusionConfig,
    pub pose: PoseConfig,
    pub output: OutputConfig,
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera index or `/dev/videoN` path.
    pub camera: String,
    pub width: i32,
    pub height: i32,
    pub fps: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera: "0".to_string(),
            width: 640,
            height: 480,
            fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_queue: usize,
    pub output_queue: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_queue: 4,
            output_queue: 4,
        }
    }
}

/// Filter choice per signal group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub head_rotation: SmootherSpec,
    pub head_translation: SmootherSpec,
    pub eye: SmootherSpec,
    pub iris: SmootherSpec,
    pub mouth: SmootherSpec,
    /// Applied to capture-to-telemetry latency for diagnostics.
    pub latency: SmootherSpec,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            head_rotation: SmootherSpec::Tema { alpha: 0.1 },
            head_translation: SmootherSpec::Tema { alpha: 0.1 },
            eye: SmootherSpec::Tema { alpha: 0.1 },
            iris: SmootherSpec::Tema { alpha: 0.04 },
            mouth: SmootherSpec::Kalman,
            latency: SmootherSpec::Kalman,
        }
    }
}

impl SmoothingConfig {
    fn groups(&self) -> [(&'static str, &SmootherSpec); 6] {
        [
            ("head_rotation", &self.head_rotation),
            ("head_translation", &self.head_translation),
            ("eye", &self.eye),
            ("iris", &self.iris),
            ("mouth", &self.mouth),
            ("latency", &self.latency),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Degrees added to smoothed pitch, yaw and roll.
    pub rotation_offset: [f64; 3],
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            rotation_offset: [12.0, 5.0, 0.12],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub listen: String,
    /// `-` for stdout, `none` to discard, anything else is a file path.
    pub frames_out: String,
    pub annotate: bool,
    pub jpeg_quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:6789".to_string(),
            frames_out: "-".to_string(),
            annotate: true,
            jpeg_quality: 85,
        }
    }
}

impl OutputConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.listen))
    }

    pub fn frame_sink(&self) -> FrameSinkKind {
        match self.frames_out.as_str() {
            "-" => FrameSinkKind::Stdout,
            "none" | "" => FrameSinkKind::Discard,
            path => FrameSinkKind::File(PathBuf::from(path)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSinkKind {
    Stdout,
    Discard,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: PathBuf,
    pub input_size: i32,
    pub min_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/face_mesh.onnx"),
            input_size: 256,
            min_confidence: 0.5,
        }
    }
}

impl TrackingConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.camera.trim().is_empty() {
            bail!("capture.camera must not be empty");
        }
        if self.capture.width <= 0 || self.capture.height <= 0 {
            bail!(
                "capture size must be positive, got {}x{}",
                self.capture.width,
                self.capture.height
            );
        }
        if !(self.capture.fps > 0.0 && self.capture.fps.is_finite()) {
            bail!("capture.fps must be positive, got {}", self.capture.fps);
        }
        if self.pipeline.frame_queue == 0 || self.pipeline.output_queue == 0 {
            bail!("pipeline queue capacities must be at least 1");
        }
        for (group, spec) in self.smoothing.groups() {
            spec.validate()
                .with_context(|| format!("invalid smoothing.{group}"))?;
        }
        self.fusion.validate().context("invalid fusion settings")?;
        if self.pose.rotation_offset.iter().any(|v| !v.is_finite()) {
            bail!("pose.rotation_offset must be finite");
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            bail!(
                "output.jpeg_quality must be between 1 and 100, got {}",
                self.output.jpeg_quality
            );
        }
        self.output.listen_addr()?;
        if self.detector.input_size <= 0 {
            bail!("detector.input_size must be positive");
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            bail!("detector.min_confidence must be within [0, 1]");
        }
        Ok(())
    }
}
