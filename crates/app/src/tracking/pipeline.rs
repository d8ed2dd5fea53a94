//! Wires the capture, processing and broadcast stages together with the peer
//! server and tears everything down in order.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, anyhow};
use face_core::{LandmarkDetector, PoseSolver};
use tracing::{error, info};
use video_ingest::{Frame, FrameSource};

use super::{
    broadcast::{BroadcastReport, BroadcastSettings, PeerHub, spawn_broadcast_stage},
    capture::{CaptureReport, spawn_capture_stage},
    config::{FrameSinkKind, TrackingConfig},
    data::{LatestOutput, OutputItem},
    processing::{FrameProcessor, ProcessingReport, spawn_processing_stage},
    queue::bounded_queue,
    server::{ServerState, spawn_server},
    shutdown::ShutdownToken,
};

/// External resources the pipeline drives.
pub struct PipelineParts {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn LandmarkDetector>,
    pub solver: Box<dyn PoseSolver>,
    /// Receives the concatenated JPEG stream.
    pub sink: Box<dyn Write + Send>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub capture: CaptureReport,
    pub processing: ProcessingReport,
    pub broadcast: BroadcastReport,
}

/// Run until `shutdown` is cancelled, the source runs dry or a stage fails.
///
/// Returns the first stage error after every thread has been joined and the
/// server stopped.
pub fn run(
    config: &TrackingConfig,
    parts: PipelineParts,
    shutdown: ShutdownToken,
) -> Result<PipelineReport> {
    config.validate()?;
    let listen = config.output.listen_addr()?;

    let _pipeline = tracing::info_span!(
        "facecast.pipeline",
        source = %parts.source.describe(),
        listen = %listen,
        frame_queue = config.pipeline.frame_queue,
        output_queue = config.pipeline.output_queue
    )
    .entered();

    let processor = FrameProcessor::new(parts.detector, parts.solver, config)?;
    let (frame_tx, frame_rx) = bounded_queue::<Frame>("frames", config.pipeline.frame_queue)?;
    let (output_tx, output_rx) =
        bounded_queue::<OutputItem>("output", config.pipeline.output_queue)?;

    let hub = Arc::new(Mutex::new(PeerHub::new()));
    let latest = Arc::new(Mutex::new(LatestOutput::default()));
    let server = spawn_server(
        listen,
        ServerState {
            hub: hub.clone(),
            latest: latest.clone(),
        },
    )
    .context("failed to start peer server")?;
    info!("listening on {}", server.local_addr());

    let broadcast = spawn_broadcast_stage(
        output_rx,
        hub,
        latest,
        parts.sink,
        BroadcastSettings {
            annotate: config.output.annotate,
            jpeg_quality: config.output.jpeg_quality,
        },
        shutdown.clone(),
    );
    let processing = broadcast
        .as_ref()
        .ok()
        .map(|_| spawn_processing_stage(processor, frame_rx, output_tx, shutdown.clone()));
    let capture = match &processing {
        Some(Ok(_)) => Some(spawn_capture_stage(parts.source, frame_tx, shutdown.clone())),
        _ => None,
    };

    // Joining in pipeline order lets each stage drain what the previous one
    // left behind.
    let mut first_error: Option<anyhow::Error> = None;
    let mut report = PipelineReport::default();

    match capture {
        Some(Ok(handle)) => match handle.join() {
            Ok(capture) => report.capture = capture,
            Err(_) => record(&mut first_error, anyhow!("capture thread panicked"), &shutdown),
        },
        Some(Err(err)) => record(&mut first_error, err, &shutdown),
        None => {}
    }
    match processing {
        Some(Ok(handle)) => match handle.join() {
            Ok(Ok(processing)) => report.processing = processing,
            Ok(Err(err)) => record(&mut first_error, err, &shutdown),
            Err(_) => record(
                &mut first_error,
                anyhow!("processing thread panicked"),
                &shutdown,
            ),
        },
        Some(Err(err)) => record(&mut first_error, err, &shutdown),
        None => {}
    }
    match broadcast {
        Ok(handle) => match handle.join() {
            Ok(Ok(broadcast)) => report.broadcast = broadcast,
            Ok(Err(err)) => record(&mut first_error, err, &shutdown),
            Err(_) => record(
                &mut first_error,
                anyhow!("broadcast thread panicked"),
                &shutdown,
            ),
        },
        Err(err) => record(&mut first_error, err, &shutdown),
    }

    server.stop();

    match first_error {
        Some(err) => {
            error!("pipeline stopped with error: {err:#}");
            Err(err)
        }
        None => {
            info!(
                captured = report.capture.captured,
                processed = report.processing.processed,
                faces = report.processing.faces,
                broadcast = report.broadcast.frames,
                "pipeline stopped"
            );
            Ok(report)
        }
    }
}

/// Open the destination for the concatenated JPEG stream.
pub fn open_frame_sink(kind: &FrameSinkKind) -> Result<Box<dyn Write + Send>> {
    Ok(match kind {
        FrameSinkKind::Stdout => Box::new(io::stdout()),
        FrameSinkKind::Discard => Box::new(io::sink()),
        FrameSinkKind::File(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("failed to create frame output {}", path.display()))?,
        )),
    })
}

fn record(slot: &mut Option<anyhow::Error>, err: anyhow::Error, shutdown: &ShutdownToken) {
    shutdown.cancel();
    if slot.is_none() {
        *slot = Some(err);
    } else {
        error!("additional stage error: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_sink_opens_files_and_discards() {
        let dir = std::env::temp_dir().join(format!("facecast-sink-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frames.mjpeg");

        let mut sink = open_frame_sink(&FrameSinkKind::File(path.clone())).unwrap();
        sink.write_all(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        sink.flush().unwrap();
        drop(sink);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);

        let mut discard = open_frame_sink(&FrameSinkKind::Discard).unwrap();
        discard.write_all(b"ignored").unwrap();

        let missing = dir.join("missing").join("frames.mjpeg");
        assert!(open_frame_sink(&FrameSinkKind::File(missing)).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_config_is_rejected_before_starting() {
        let mut config = TrackingConfig::default();
        config.output.listen = "not an address".to_string();
        let parts = PipelineParts {
            source: Box::new(video_ingest::ReplaySource::new("empty", Vec::<Frame>::new())),
            detector: Box::new(NoFace),
            solver: Box::new(Unused),
            sink: Box::new(io::sink()),
        };
        assert!(run(&config, parts, ShutdownToken::new()).is_err());
    }

    struct NoFace;

    impl LandmarkDetector for NoFace {
        fn detect(
            &mut self,
            _frame: &Frame,
        ) -> Result<Option<face_core::LandmarkSet>, face_core::FaceError> {
            Ok(None)
        }
    }

    struct Unused;

    impl PoseSolver for Unused {
        fn solve(
            &mut self,
            _model: &[[f64; 3]],
            _observed: &[[f64; 2]],
            _intrinsics: &face_core::CameraIntrinsics,
            _guess: &face_core::PoseVectors,
        ) -> Result<face_core::PoseVectors, face_core::FaceError> {
            Err(face_core::FaceError::PoseNotFound)
        }
    }
}
