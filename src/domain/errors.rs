use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to the calling engine.
///
/// The taxonomy is closed: every failure the bridge reports is one of these
/// four kinds, and each maps to a non-zero process exit in the binaries.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("invalid input record: {field}")]
    Schema { field: String },

    #[error("no trained model available: {reason}")]
    NotTrained { reason: String },

    #[error("insufficient data: {reason}")]
    Data { reason: String },

    #[error("artifact {}: {reason}", .path.display())]
    Artifact { path: PathBuf, reason: String },
}
