//! Processing stage: landmarks, pose, feature ratios, smoothing and fusion.

use std::{thread, time::Instant};

use anyhow::{Context, Result};
use face_core::{
    FaceError, FusionConfig, HeadPoseEstimator, LandmarkDetector, PoseSolver, features,
    fuse_by_head_yaw,
};
use smoothing::Smoother;
use tracing::{debug, error, info};
use video_ingest::Frame;

use super::{
    config::TrackingConfig,
    data::{OutputItem, Overlay, TelemetryFrame, TrackedState},
    queue::{PushOutcome, QueueReceiver, QueueSender},
    shutdown::ShutdownToken,
    smoothers::SmootherBank,
    telemetry,
};

/// Result of processing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFrame {
    pub telemetry: TelemetryFrame,
    /// Present only when a face was found.
    pub overlay: Option<Overlay>,
}

impl ProcessedFrame {
    pub fn has_face(&self) -> bool {
        self.overlay.is_some()
    }
}

pub struct FrameProcessor<D, S> {
    detector: D,
    pose: HeadPoseEstimator<S>,
    bank: SmootherBank,
    fusion: FusionConfig,
    rotation_offset: [f64; 3],
    latency: Box<dyn Smoother>,
    latency_kind: &'static str,
    last_latency_at: Option<Instant>,
    last: TrackedState,
    last_face_ms: Option<i64>,
}

impl<D: LandmarkDetector, S: PoseSolver> FrameProcessor<D, S> {
    pub fn new(detector: D, solver: S, config: &TrackingConfig) -> Result<Self> {
        let bank = SmootherBank::new(&config.smoothing).context("invalid smoothing settings")?;
        let latency = config
            .smoothing
            .latency
            .build()
            .context("invalid smoothing.latency")?;
        Ok(Self {
            detector,
            pose: HeadPoseEstimator::new(solver),
            bank,
            fusion: config.fusion,
            rotation_offset: config.pose.rotation_offset,
            latency,
            latency_kind: config.smoothing.latency.label(),
            last_latency_at: None,
            last: TrackedState::default(),
            last_face_ms: None,
        })
    }

    /// Last emitted tracking values.
    pub fn last(&self) -> &TrackedState {
        &self.last
    }

    pub fn process(&mut self, frame: &Frame) -> Result<ProcessedFrame, FaceError> {
        let Some(landmarks) = self.detector.detect(frame)? else {
            return Ok(ProcessedFrame {
                telemetry: TelemetryFrame::from(&self.last),
                overlay: None,
            });
        };
        landmarks.validate()?;

        let pose = self.pose.estimate(&landmarks, frame.width, frame.height)?;
        let sample = features::extract(&landmarks, &self.fusion);

        let dt = match self.last_face_ms.replace(frame.timestamp_ms) {
            Some(previous) => (frame.timestamp_ms - previous).max(0) as f64 / 1000.0,
            None => 0.0,
        };
        let mut state = self.bank.update(&pose, &sample, dt);
        for (angle, offset) in state.head_rotation.iter_mut().zip(self.rotation_offset) {
            *angle += offset;
        }
        (state.left_iris, state.right_iris) = fuse_by_head_yaw(
            state.left_iris,
            state.right_iris,
            state.head_rotation[1],
            &self.fusion,
        );
        self.last = state;

        Ok(ProcessedFrame {
            telemetry: TelemetryFrame::from(&state),
            overlay: Some(Overlay {
                centroid: landmarks.pixel_centroid(),
                head_rotation: state.head_rotation,
                left_iris: state.left_iris,
                right_iris: state.right_iris,
            }),
        })
    }

    /// Smooth and record capture-to-telemetry latency for `frame`.
    fn observe_latency(&mut self, frame: &Frame) -> f64 {
        let latency_ms = frame.age_ms().max(0) as f64;
        metrics::histogram!("facecast_frame_latency_seconds").record(latency_ms / 1000.0);
        self.smooth_latency(latency_ms, Instant::now())
    }

    /// `dt` is the wall time since the previous observation, 0 for the first.
    fn smooth_latency(&mut self, latency_ms: f64, now: Instant) -> f64 {
        let dt = self
            .last_latency_at
            .replace(now)
            .map_or(0.0, |previous| now.saturating_duration_since(previous).as_secs_f64());
        self.latency.update(latency_ms, dt)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingReport {
    pub processed: u64,
    pub faces: u64,
}

/// Run the processing loop on its own thread.
///
/// Drains `frames` until every capture sender is gone. A detector or solver
/// failure cancels `shutdown` and ends the stage with that error.
pub fn spawn_processing_stage<D, S>(
    mut processor: FrameProcessor<D, S>,
    frames: QueueReceiver<Frame>,
    outputs: QueueSender<OutputItem>,
    shutdown: ShutdownToken,
) -> Result<thread::JoinHandle<Result<ProcessingReport>>>
where
    D: LandmarkDetector + 'static,
    S: PoseSolver + 'static,
{
    telemetry::spawn_thread("facecast-processing", move || {
        let _worker =
            tracing::info_span!("processing.worker", latency_filter = processor.latency_kind)
                .entered();
        let mut report = ProcessingReport::default();

        while let Some(frame) = frames.pop() {
            let frame_number = report.processed + 1;
            let _frame = tracing::debug_span!("frame", frame = frame_number).entered();
            let started = Instant::now();

            let processed = match processor.process(&frame) {
                Ok(processed) => processed,
                Err(err) => {
                    error!("processing failed on frame #{frame_number}: {err}");
                    shutdown.cancel();
                    return Err(err).context(format!("processing frame #{frame_number}"));
                }
            };
            report.processed = frame_number;
            metrics::counter!("facecast_frames_processed_total").increment(1);
            if processed.has_face() {
                report.faces += 1;
                metrics::counter!("facecast_faces_detected_total").increment(1);
            }

            let latency_ms = processor.observe_latency(&frame);
            if frame_number % 30 == 0 {
                debug!(
                    frame = frame_number,
                    faces = report.faces,
                    latency_ms,
                    "processing heartbeat"
                );
            }

            let outcome = outputs.push(OutputItem {
                frame,
                telemetry: processed.telemetry,
                overlay: processed.overlay,
                frame_number,
            });
            metrics::histogram!("facecast_stage_seconds", "stage" => "processing")
                .record(started.elapsed().as_secs_f64());
            if outcome == PushOutcome::Closed {
                info!("broadcast stage gone; stopping processing");
                break;
            }
        }

        debug!(
            processed = report.processed,
            faces = report.faces,
            "processing stage finished"
        );
        Ok(report)
    })
    .context("failed to spawn processing thread")
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, time::Duration};

    use face_core::{
        CameraIntrinsics, LandmarkSet, PoseEstimate, PoseVectors, fixtures::neutral_face,
    };
    use smoothing::SmootherSpec;

    use super::*;
    use crate::tracking::queue::bounded_queue;

    struct Scripted(VecDeque<Option<LandmarkSet>>);

    impl LandmarkDetector for Scripted {
        fn detect(&mut self, _frame: &Frame) -> Result<Option<LandmarkSet>, FaceError> {
            Ok(self.0.pop_front().flatten())
        }
    }

    /// Solver that always reports a small head turn.
    struct FixedPose;

    impl PoseSolver for FixedPose {
        fn solve(
            &mut self,
            _model: &[[f64; 3]],
            _observed: &[[f64; 2]],
            _intrinsics: &CameraIntrinsics,
            _guess: &PoseVectors,
        ) -> Result<PoseVectors, FaceError> {
            Ok(PoseVectors {
                rotation: [0.0, 0.1, 0.0],
                translation: [0.0, 0.0, 50.0],
            })
        }
    }

    fn frame(timestamp_ms: i64) -> Frame {
        Frame::bgr_at(vec![0; 4 * 4 * 3], 4, 4, timestamp_ms).unwrap()
    }

    fn processor(script: Vec<Option<LandmarkSet>>) -> FrameProcessor<Scripted, FixedPose> {
        FrameProcessor::new(
            Scripted(script.into()),
            FixedPose,
            &TrackingConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn no_face_frames_repeat_last_values() {
        let face = neutral_face();
        let mut processor = processor(vec![Some(face.clone()), Some(face), None, None]);

        let outputs: Vec<_> = (0..4)
            .map(|i| processor.process(&frame(i * 33)).unwrap())
            .collect();

        assert!(outputs[0].has_face());
        assert!(outputs[1].has_face());
        assert_ne!(outputs[0].telemetry, outputs[1].telemetry);
        assert!(!outputs[2].has_face());
        assert!(!outputs[3].has_face());
        assert_eq!(outputs[2].telemetry, outputs[1].telemetry);
        assert_eq!(outputs[3].telemetry, outputs[1].telemetry);
    }

    #[test]
    fn no_face_before_first_face_reports_rest_pose() {
        let mut processor = processor(vec![None]);
        let output = processor.process(&frame(0)).unwrap();
        assert_eq!(output.telemetry.mouth.y, -1.0);
        assert_eq!(output.telemetry.head_rotation.x, 0.0);
    }

    #[test]
    fn rotation_offsets_are_added_after_smoothing() {
        let mut processor = processor(vec![Some(neutral_face())]);
        let output = processor.process(&frame(0)).unwrap();
        let overlay = output.overlay.unwrap();

        // first TEMA step with alpha 0.1 keeps 0.271 of the raw angle
        let raw = PoseEstimate::from_vectors(&PoseVectors {
            rotation: [0.0, 0.1, 0.0],
            translation: [0.0, 0.0, 50.0],
        });
        let expected_yaw = raw.yaw * 0.271 + 5.0;
        assert!((overlay.head_rotation[1] - expected_yaw).abs() < 1e-9);
        assert_eq!(processor.last().head_rotation, overlay.head_rotation);
    }

    /// Solver reporting a pure head turn of `yaw` degrees.
    struct Turned(f64);

    impl PoseSolver for Turned {
        fn solve(
            &mut self,
            _model: &[[f64; 3]],
            _observed: &[[f64; 2]],
            _intrinsics: &CameraIntrinsics,
            _guess: &PoseVectors,
        ) -> Result<PoseVectors, FaceError> {
            // yaw is reported negated
            Ok(PoseVectors {
                rotation: [0.0, -self.0.to_radians(), 0.0],
                translation: [0.0, 0.0, 50.0],
            })
        }
    }

    /// Neutral face with the left iris pushed towards the inner corner.
    fn glancing_face() -> LandmarkSet {
        let mut face = neutral_face();
        face.normalized[468][0] = 0.43;
        face
    }

    fn turned_state(yaw: f64) -> TrackedState {
        let mut processor = FrameProcessor::new(
            Scripted(vec![Some(glancing_face())].into()),
            Turned(yaw),
            &TrackingConfig::default(),
        )
        .unwrap();
        processor.process(&frame(0)).unwrap();
        *processor.last()
    }

    #[test]
    fn head_yaw_past_threshold_copies_left_iris() {
        // smoothed yaw 45 * 0.271 = 12.2 only crosses 15 with the +5 offset
        let state = turned_state(45.0);
        assert!(state.head_rotation[1] > 15.0);
        assert!(state.head_rotation[1] - 5.0 < 15.0);
        assert!(state.left_iris.x > 0.0);
        assert_eq!(state.left_iris, state.right_iris);
    }

    #[test]
    fn small_head_yaw_keeps_irises_distinct() {
        let state = turned_state(10.0);
        assert!(state.head_rotation[1] < 15.0);
        assert_ne!(state.left_iris, state.right_iris);
    }

    #[test]
    fn latency_filter_sees_elapsed_time() {
        let mut config = TrackingConfig::default();
        config.smoothing.latency = SmootherSpec::OneEuro {
            min_cutoff: 1.0,
            beta: 0.0,
            d_cutoff: 1.0,
        };
        let mut processor =
            FrameProcessor::new(Scripted(VecDeque::new()), FixedPose, &config).unwrap();
        assert_eq!(processor.latency_kind, "one_euro");

        let start = Instant::now();
        let outputs: Vec<f64> = [10.0, 500.0, 500.0, 500.0, 500.0]
            .into_iter()
            .enumerate()
            .map(|(i, ms)| {
                processor.smooth_latency(ms, start + Duration::from_millis(33 * i as u64))
            })
            .collect();

        assert_eq!(outputs[0], 10.0);
        for pair in outputs.windows(2) {
            assert!(pair[1] > pair[0], "{outputs:?}");
        }
        assert!(outputs[4] < 500.0);
    }

    #[test]
    fn malformed_landmarks_are_an_error() {
        let truncated = LandmarkSet::new(vec![[0.0, 0.0]; 10], vec![[0.0, 0.0, 0.0]; 10]);
        let mut processor = processor(vec![Some(truncated)]);
        assert!(matches!(
            processor.process(&frame(0)),
            Err(FaceError::LandmarkCount { .. })
        ));
    }

    #[test]
    fn stage_stops_on_error_and_cancels() {
        let truncated = LandmarkSet::new(vec![[0.0, 0.0]; 10], vec![[0.0, 0.0, 0.0]; 10]);
        let processor = processor(vec![None, Some(truncated)]);
        let (frame_tx, frame_rx) = bounded_queue("frames", 4).unwrap();
        let (out_tx, out_rx) = bounded_queue("output", 4).unwrap();
        let shutdown = ShutdownToken::new();

        frame_tx.push(frame(0));
        frame_tx.push(frame(33));
        frame_tx.push(frame(66));
        drop(frame_tx);

        let handle =
            spawn_processing_stage(processor, frame_rx, out_tx, shutdown.clone()).unwrap();
        assert!(handle.join().unwrap().is_err());
        assert!(shutdown.is_cancelled());
        assert_eq!(out_rx.pop().map(|item| item.frame_number), Some(1));
        assert!(out_rx.pop().is_none());
    }

    #[test]
    fn stage_drains_queue_and_reports() {
        let face = neutral_face();
        let processor = processor(vec![Some(face), None]);
        let (frame_tx, frame_rx) = bounded_queue("frames", 4).unwrap();
        let (out_tx, out_rx) = bounded_queue("output", 4).unwrap();

        frame_tx.push(frame(0));
        frame_tx.push(frame(33));
        drop(frame_tx);

        let handle =
            spawn_processing_stage(processor, frame_rx, out_tx, ShutdownToken::new()).unwrap();
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report, ProcessingReport {
            processed: 2,
            faces: 1
        });

        let items: Vec<_> = std::iter::from_fn(|| out_rx.pop()).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].overlay.is_some());
        assert!(items[1].overlay.is_none());
        assert_eq!(items[0].telemetry, items[1].telemetry);
    }
}
