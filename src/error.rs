use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::matching::MatchMethod;

/// A specialized `Result` type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// The error type for all template location and polling operations.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("Template not found or unreadable at {path:?}")]
    TemplateNotFound { path: PathBuf },

    #[error(
        "No match within {waited:?}: best score {best_score:.3} via {}",
        method_label(method)
    )]
    Timeout {
        waited: Duration,
        best_score: f32,
        method: Option<MatchMethod>,
    },

    #[error("Frame capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("Failed to write debug snapshot: {source}")]
    SnapshotFailed {
        #[from]
        source: image::ImageError,
    },

    #[error("Debug artifact I/O failed: {source}")]
    ArtifactIo {
        #[from]
        source: std::io::Error,
    },
}

impl VisionError {
    /// True when the search itself completed but nothing passed the threshold.
    pub fn is_timeout(&self) -> bool {
        matches!(self, VisionError::Timeout { .. })
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        VisionError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_image(reason: impl Into<String>) -> Self {
        VisionError::InvalidImage {
            reason: reason.into(),
        }
    }
}

fn method_label(method: &Option<MatchMethod>) -> &'static str {
    match method {
        Some(m) => m.as_str(),
        None => "none",
    }
}
