use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::tracking::{TelemetryOptions, TrackingConfig};

/// Stream facial pose telemetry from a webcam to WebSocket peers.
#[derive(Parser, Debug, Default)]
#[command(name = "facecast", version, about, long_about = None)]
pub struct Args {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Camera index or device path (e.g. 0 or /dev/video2)
    #[arg(long)]
    pub camera: Option<String>,

    /// Face mesh ONNX model
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Address the WebSocket server binds
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Where to write the JPEG stream: `-` for stdout, `none`, or a file
    #[arg(long)]
    pub frames_out: Option<String>,

    /// Do not draw the pose axes and iris markers
    #[arg(long)]
    pub no_annotate: bool,

    /// JPEG quality (1-100)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// Write span timings in Chrome trace format
    #[arg(long)]
    pub chrome_trace: Option<PathBuf>,
}

impl Args {
    /// Load the config file (or defaults) and apply command-line overrides.
    pub fn load_config(&self) -> Result<TrackingConfig> {
        let mut config = match &self.config {
            Some(path) => TrackingConfig::from_file(path)?,
            None => TrackingConfig::default(),
        };
        if let Some(camera) = &self.camera {
            config.capture.camera = camera.clone();
        }
        if let Some(model) = &self.model {
            config.detector.model = model.clone();
        }
        if let Some(listen) = &self.listen {
            config.output.listen = listen.clone();
        }
        if let Some(frames_out) = &self.frames_out {
            config.output.frames_out = frames_out.clone();
        }
        if self.no_annotate {
            config.output.annotate = false;
        }
        if let Some(quality) = self.jpeg_quality {
            config.output.jpeg_quality = quality;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn telemetry_options(&self) -> TelemetryOptions {
        TelemetryOptions {
            chrome_trace_path: self.chrome_trace.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;
    use crate::tracking::FrameSinkKind;

    #[test]
    fn command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn no_flags_gives_defaults() {
        let args = Args::try_parse_from(["facecast"]).unwrap();
        assert_eq!(args.load_config().unwrap(), TrackingConfig::default());
    }

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "facecast",
            "--camera",
            "/dev/video2",
            "--listen",
            "127.0.0.1:9000",
            "--frames-out",
            "none",
            "--no-annotate",
            "--jpeg-quality",
            "60",
        ])
        .unwrap();
        let config = args.load_config().unwrap();
        assert_eq!(config.capture.camera, "/dev/video2");
        assert_eq!(config.output.listen, "127.0.0.1:9000");
        assert_eq!(config.output.frame_sink(), FrameSinkKind::Discard);
        assert!(!config.output.annotate);
        assert_eq!(config.output.jpeg_quality, 60);
    }

    #[test]
    fn config_file_is_read_and_overridden() {
        let path = std::env::temp_dir().join(format!("facecast-cli-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[output]\nlisten = \"127.0.0.1:7000\"\njpeg_quality = 70\n",
        )
        .unwrap();

        let args = Args {
            config: Some(path.clone()),
            jpeg_quality: Some(95),
            ..Args::default()
        };
        let config = args.load_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.output.listen, "127.0.0.1:7000");
        assert_eq!(config.output.jpeg_quality, 95);
        assert_eq!(config.capture.camera, "0");
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = Args {
            jpeg_quality: Some(0),
            ..Args::default()
        };
        assert!(args.load_config().is_err());
    }
}
