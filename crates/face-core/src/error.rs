use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaceError {
    #[error("expected {expected} {kind} landmarks, got {actual}")]
    LandmarkCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{kind} landmark {index} is not finite")]
    NonFinite { kind: &'static str, index: usize },
    #[error("model has {model} points but {observed} were observed")]
    Correspondence { model: usize, observed: usize },
    #[error("pose solver returned no usable solution")]
    PoseNotFound,
    #[error("fusion parameter {name} is out of range: {value}")]
    Fusion { name: &'static str, value: f64 },
    #[error("failed to load landmark model {path:?}")]
    Model { path: PathBuf },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
