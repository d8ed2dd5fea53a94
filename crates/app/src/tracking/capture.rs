use std::{thread, time::Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};
use video_ingest::{Frame, FrameSource};

use super::{
    queue::{PushOutcome, QueueSender},
    shutdown::ShutdownToken,
    telemetry,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub captured: u64,
    pub dropped: u64,
    pub read_failures: u64,
}

/// Read frames until cancelled or the source is exhausted.
///
/// Read failures are counted and retried immediately. The source and the
/// queue sender are dropped when the loop ends, which releases the device and
/// lets the processing stage drain.
pub fn spawn_capture_stage<S>(
    mut source: S,
    frames: QueueSender<Frame>,
    shutdown: ShutdownToken,
) -> Result<thread::JoinHandle<CaptureReport>>
where
    S: FrameSource + 'static,
{
    telemetry::spawn_thread("facecast-capture", move || {
        let _worker =
            tracing::info_span!("capture.worker", source = %source.describe()).entered();
        let mut report = CaptureReport::default();
        let mut last_frame = Instant::now();

        while !shutdown.is_cancelled() {
            let frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("capture source exhausted");
                    break;
                }
                Err(err) => {
                    report.read_failures += 1;
                    metrics::counter!("facecast_capture_read_failures_total").increment(1);
                    debug!("frame read failed: {err}");
                    continue;
                }
            };

            let now = Instant::now();
            metrics::histogram!("facecast_capture_frame_interval_seconds")
                .record(now.duration_since(last_frame).as_secs_f64());
            last_frame = now;

            report.captured += 1;
            match frames.push(frame) {
                PushOutcome::Queued => {}
                PushOutcome::Dropped => report.dropped += 1,
                PushOutcome::Closed => {
                    debug!("processing stage gone; stopping capture");
                    break;
                }
            }
        }

        drop(source);
        drop(frames);
        debug!(
            captured = report.captured,
            dropped = report.dropped,
            read_failures = report.read_failures,
            "capture stage finished"
        );
        report
    })
    .context("failed to spawn capture thread")
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use video_ingest::{CaptureError, ReplaySource};

    use super::*;
    use crate::tracking::queue::bounded_queue;

    fn frame(timestamp_ms: i64) -> Frame {
        Frame::bgr_at(vec![0; 2 * 2 * 3], 2, 2, timestamp_ms).unwrap()
    }

    #[test]
    fn replay_is_forwarded_then_sender_closes() {
        let (tx, rx) = bounded_queue("frames", 8).unwrap();
        let source = ReplaySource::new("three", (0..3).map(frame));
        let report = spawn_capture_stage(source, tx, ShutdownToken::new())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(report.captured, 3);
        assert_eq!(report.dropped, 0);
        let stamps: Vec<_> = std::iter::from_fn(|| rx.pop())
            .map(|f| f.timestamp_ms)
            .collect();
        assert_eq!(stamps, vec![0, 1, 2]);
    }

    #[test]
    fn full_queue_drops_newest_frames() {
        let (tx, rx) = bounded_queue("frames", 4).unwrap();
        let source = ReplaySource::new("six", (0..6).map(frame));
        let report = spawn_capture_stage(source, tx, ShutdownToken::new())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(report.captured, 6);
        assert_eq!(report.dropped, 2);
        let stamps: Vec<_> = std::iter::from_fn(|| rx.pop())
            .map(|f| f.timestamp_ms)
            .collect();
        assert_eq!(stamps, vec![0, 1, 2, 3]);
    }

    /// Fails every other read, forever, and records when it is dropped.
    struct Flaky {
        reads: u64,
        released: Arc<AtomicBool>,
    }

    impl FrameSource for Flaky {
        fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
            self.reads += 1;
            if self.reads % 2 == 0 {
                return Err(CaptureError::Read {
                    uri: "flaky".into(),
                });
            }
            Ok(Some(frame(self.reads as i64)))
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    impl Drop for Flaky {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn read_failures_retry_until_cancelled_and_release_source() {
        let released = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded_queue("frames", 2).unwrap();
        let shutdown = ShutdownToken::new();
        let handle = spawn_capture_stage(
            Flaky {
                reads: 0,
                released: released.clone(),
            },
            tx,
            shutdown.clone(),
        )
        .unwrap();

        // reads 1 and 3 succeed, so read 2 has failed by the second pop
        assert!(rx.pop().is_some());
        assert!(rx.pop().is_some());
        shutdown.cancel();
        let report = handle.join().unwrap();

        assert!(report.read_failures >= 1);
        assert!(released.load(Ordering::SeqCst));
        while rx.pop().is_some() {}
    }
}
