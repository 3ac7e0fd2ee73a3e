//! JSON output for GUI integration
//!
//! When --json-progress flag is enabled, all progress and status information
//! is emitted as JSON lines to stdout, suppressing all other output.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::image_processing::batch::BatchEvent;

/// Last progress emission timestamp (milliseconds since epoch)
/// Used for throttling progress updates to ~25 FPS (40ms between updates)
static LAST_PROGRESS_MS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonMessage {
    /// Progress update, `current` items of `total` done
    Progress {
        current: usize,
        total: usize,
        fraction: f64,
        message: String,
    },
    /// File processing completed
    FileCompleted {
        filename: String,
        output_name: String,
        size_bytes: usize,
        quality: Option<f32>,
    },
    /// File processing failed
    FileFailed {
        filename: String,
        kind: String,
        error: String,
    },
    /// Where the results went
    Delivery {
        kind: String,
        path: Option<String>,
        mime: Option<String>,
        size_bytes: usize,
    },
    /// Processing summary
    Summary {
        total: usize,
        succeeded: usize,
        failed: usize,
        cancelled: bool,
        duration_secs: f64,
    },
}

impl JsonMessage {
    /// Emit JSON message to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Create and emit progress message (throttled to ~25 FPS for smooth GUI updates)
    ///
    /// The final progress (current == total) is always emitted to ensure 100% completion.
    pub fn progress(current: usize, total: usize, message: impl Into<String>) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let last_ms = LAST_PROGRESS_MS.load(Ordering::Relaxed);

        if now_ms.saturating_sub(last_ms) >= 40 || current == total {
            LAST_PROGRESS_MS.store(now_ms, Ordering::Relaxed);
            Self::Progress {
                current,
                total,
                fraction: fraction(current, total),
                message: message.into(),
            }
            .emit();
        }
    }

    /// Translate a batch event into its JSON line, if it has one.
    /// `Finished` maps to a final 100% progress line; the summary is emitted
    /// separately once delivery is known.
    pub fn from_event(event: &BatchEvent) -> Option<Self> {
        match event {
            BatchEvent::Progress {
                completed,
                total,
                filename,
                ..
            } => Some(Self::Progress {
                current: *completed,
                total: *total,
                fraction: fraction(*completed, *total),
                message: format!("Processing {}", filename),
            }),
            BatchEvent::Completed {
                filename,
                output_name,
                size_bytes,
                quality,
                ..
            } => Some(Self::FileCompleted {
                filename: filename.clone(),
                output_name: output_name.clone(),
                size_bytes: *size_bytes,
                quality: *quality,
            }),
            BatchEvent::Failed {
                filename,
                kind,
                message,
                ..
            } => Some(Self::FileFailed {
                filename: filename.clone(),
                kind: kind.to_string(),
                error: message.clone(),
            }),
            BatchEvent::Finished { total, .. } => Some(Self::Progress {
                current: *total,
                total: *total,
                fraction: 1.0,
                message: "Complete".to_string(),
            }),
        }
    }

    /// Emit the JSON line for a batch event. Progress lines are throttled,
    /// results and the final line never are.
    pub fn emit_event(event: &BatchEvent) {
        match event {
            BatchEvent::Progress {
                completed,
                total,
                filename,
                ..
            } => Self::progress(*completed, *total, format!("Processing {}", filename)),
            other => {
                if let Some(message) = Self::from_event(other) {
                    message.emit();
                }
            }
        }
    }

    /// Create and emit summary message
    pub fn summary(total: usize, succeeded: usize, failed: usize, cancelled: bool, duration_secs: f64) {
        Self::Summary {
            total,
            succeeded,
            failed,
            cancelled,
            duration_secs,
        }
        .emit();
    }
}

fn fraction(current: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        current as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let message = JsonMessage::FileFailed {
            filename: "a.jpg".to_string(),
            kind: "decode".to_string(),
            error: "bad".to_string(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "filefailed");
        assert_eq!(json["kind"], "decode");
    }

    #[test]
    fn test_delivery_shape() {
        let message = JsonMessage::Delivery {
            kind: "archive".to_string(),
            path: None,
            mime: Some("application/zip".to_string()),
            size_bytes: 42,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "delivery");
        assert_eq!(json["mime"], "application/zip");
        assert!(json["path"].is_null());
    }

    #[test]
    fn test_progress_event_maps_to_fraction() {
        let event = BatchEvent::Progress {
            completed: 1,
            total: 4,
            filename: "b.png".to_string(),
            eta: None,
        };
        match JsonMessage::from_event(&event) {
            Some(JsonMessage::Progress {
                current, fraction, message, ..
            }) => {
                assert_eq!(current, 1);
                assert_eq!(fraction, 0.25);
                assert_eq!(message, "Processing b.png");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_finished_is_full_progress() {
        let event = BatchEvent::Finished {
            succeeded: 2,
            total: 3,
            cancelled: false,
        };
        let json = serde_json::to_value(JsonMessage::from_event(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["fraction"], 1.0);
    }
}
