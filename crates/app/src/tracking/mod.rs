//! Live facial telemetry: capture frames, track the face and stream the
//! result to WebSocket peers.
//!
//! The module is split into focused submodules:
//! - `config`: TOML settings for every stage.
//! - `pipeline`: Orchestrates the capture → process → broadcast loop.
//! - `capture`: Pulls frames from a source into the frame queue.
//! - `processing`: Landmark detection, head pose, feature extraction and smoothing.
//! - `smoothers`: Per-signal filter bank.
//! - `broadcast`: Peer registry plus telemetry and JPEG fan-out.
//! - `server`: Axum WebSocket and HTTP endpoints.
//! - `encoding` / `annotation`: JPEG output and the debug overlay.
//! - `queue` / `shutdown`: Drop-on-full stage queues and the cancellation flag.
//! - `telemetry`: Tracing and Prometheus setup.
//! - `data`: Shared structs passed between stages.

pub use backends::{Backends, open as open_backends};
pub use config::{FrameSinkKind, TrackingConfig};
pub use data::{TelemetryFrame, TrackedState};
/// Launch the tracking pipeline with a ready-made configuration.
pub use pipeline::{PipelineParts, PipelineReport, open_frame_sink, run};
pub use shutdown::ShutdownToken;
pub use telemetry::{TelemetryOptions, enter_runtime, init_metrics_recorder};

mod annotation;
mod backends;
pub mod broadcast;
pub mod capture;
pub mod config;
pub mod data;
mod encoding;
mod pipeline;
pub mod processing;
pub mod queue;
pub mod server;
mod shutdown;
pub mod smoothers;
pub mod telemetry;
