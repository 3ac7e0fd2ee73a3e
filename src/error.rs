//! Error types for the batch pipeline.
//!
//! Per-item failures (`Decode`, `Encode`, `Timeout`) are recorded in the batch
//! report and never abort a run. `Packaging` is the only batch-level failure.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Declared MIME type is outside the accepted set. Filtered at ingestion.
    #[error("Unsupported input type '{mime}' for {filename}")]
    UnsupportedInput { filename: String, mime: String },

    /// Source bytes could not be decoded into a pixel buffer
    #[error("Failed to decode {filename}: {reason}")]
    Decode { filename: String, reason: String },

    /// Encoder failed or produced no data
    #[error("Failed to encode {format}: {reason}")]
    Encode { format: String, reason: String },

    /// Item exceeded the per-item time limit
    #[error("Processing {filename} timed out after {}s", .limit.as_secs_f32())]
    Timeout { filename: String, limit: Duration },

    /// Resampling into the draw rectangle failed
    #[error("Resize error: {0}")]
    Resize(String),

    /// Archive assembly failed
    #[error("Packaging error: {0}")]
    Packaging(String),

    /// Zero-sized source or target dimensions
    #[error("Invalid geometry: source {source_width}x{source_height}, target {target_width}x{target_height}")]
    InvalidGeometry {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;

impl ProcessingError {
    pub fn decode(filename: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            filename: filename.into(),
            reason: reason.to_string(),
        }
    }

    pub fn encode(format: impl Into<String>, reason: impl ToString) -> Self {
        Self::Encode {
            format: format.into(),
            reason: reason.to_string(),
        }
    }

    pub fn packaging(reason: impl ToString) -> Self {
        Self::Packaging(reason.to_string())
    }

    /// Short machine-friendly kind label used in reports and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedInput { .. } => "unsupported_input",
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::Timeout { .. } => "timeout",
            Self::Resize(_) => "resize",
            Self::Packaging(_) => "packaging",
            Self::InvalidGeometry { .. } => "invalid_geometry",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProcessingError::decode("a.jpg", "bad header");
        assert_eq!(err.to_string(), "Failed to decode a.jpg: bad header");
        assert_eq!(err.kind(), "decode");

        let err = ProcessingError::Timeout {
            filename: "b.png".to_string(),
            limit: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "Processing b.png timed out after 2s");
    }
}
