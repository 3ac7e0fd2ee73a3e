// Library exports for reuse by front-ends and tests
pub mod cli;
pub mod config_file;
pub mod error;
pub mod image_processing;
pub mod json_output;
pub mod packaging;
pub mod utils;

// Re-export commonly used types
pub use cli::{Args, FitMode, OutputFormat, UsagePreset};
pub use error::{ProcessingError, ProcessingResult};
pub use image_processing::batch::{BatchEvent, BatchReport, CancellationToken, DeliveryKind};
pub use image_processing::encode::CompressionPolicy;
pub use image_processing::ingest::{SourceImage, SourceQueue};
pub use image_processing::watermark::Watermark;
pub use image_processing::{EncodedResult, ProcessingConfig, ProcessingEngine};
pub use json_output::JsonMessage;
pub use packaging::{deliver, Delivery, Packager, ZipPackager};
