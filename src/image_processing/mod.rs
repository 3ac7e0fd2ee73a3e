pub mod batch;
pub mod composite;
pub mod encode;
pub mod geometry;
pub mod ingest;
pub mod report;
pub mod resize;
pub mod watermark;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use walkdir::WalkDir;

use crate::cli::{FitMode, OutputFormat};
use crate::error::{ProcessingError, ProcessingResult};
use crate::utils::{create_output_filename, mime_from_path, verbose_println};
use encode::CompressionPolicy;
use ingest::{SourceImage, SourceQueue, ACCEPTED_MIME_TYPES};
use watermark::Watermark;

/// Everything that describes the output of one run
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub target_width: u32,
    pub target_height: u32,
    pub format: OutputFormat,
    pub fit_mode: FitMode,
    /// Appended to output filenames only
    pub suffix: Option<String>,
    pub watermark: Option<Arc<Watermark>>,
    pub policy: CompressionPolicy,
    pub parallel_jobs: usize,
    pub item_timeout: Option<Duration>,
    pub verbose: bool,
}

impl ProcessingConfig {
    pub fn new(target_width: u32, target_height: u32, format: OutputFormat, fit_mode: FitMode) -> Self {
        Self {
            target_width,
            target_height,
            format,
            fit_mode,
            suffix: None,
            watermark: None,
            policy: CompressionPolicy::default(),
            parallel_jobs: 1,
            item_timeout: None,
            verbose: false,
        }
    }

    pub fn validate(&self) -> ProcessingResult<()> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(ProcessingError::InvalidConfig(format!(
                "target size {}x{} must be positive",
                self.target_width, self.target_height
            )));
        }
        if self.parallel_jobs == 0 {
            return Err(ProcessingError::InvalidConfig(
                "parallel jobs must be at least 1".to_string(),
            ));
        }
        self.policy.validate()
    }
}

/// Outcome of one successfully processed source
#[derive(Debug, Clone)]
pub struct EncodedResult {
    pub source_id: String,
    pub source_filename: String,
    /// Unique within a batch once the orchestrator has assigned it
    pub output_name: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    /// Final quality for lossy formats (0.60-0.90 by default)
    pub quality: Option<f32>,
    pub attempts: usize,
    pub within_budget: bool,
    pub processing_time: Duration,
}

impl EncodedResult {
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingEngine {
    config: Arc<ProcessingConfig>,
    /// Timed-out item workers that are still running, shared by clones
    stalled_workers: Arc<AtomicUsize>,
}

impl ProcessingEngine {
    pub fn new(config: ProcessingConfig) -> ProcessingResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            stalled_workers: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Discover all supported image files in the input paths.
    /// Plain files are taken as-is when their extension is accepted.
    pub fn discover_images(&self, input_paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut image_files = Vec::new();

        for input_path in input_paths {
            verbose_println(
                self.config.verbose,
                &format!("Scanning: {}", input_path.display()),
            );

            let walker = WalkDir::new(input_path).follow_links(false).max_depth(10);

            for entry in walker {
                let entry = entry.context("Failed to read directory entry")?;
                let path = entry.path();

                let accepted = mime_from_path(path).is_some_and(|m| ACCEPTED_MIME_TYPES.contains(&m));
                if path.is_file() && accepted {
                    image_files.push(path.to_path_buf());
                }
            }
        }

        // Sort for consistent processing order
        image_files.sort();
        image_files.dedup();

        verbose_println(
            self.config.verbose,
            &format!("Found {} image files", image_files.len()),
        );
        Ok(image_files)
    }

    /// Read discovered files into a queue, in order
    pub fn load_sources(&self, image_files: &[PathBuf]) -> Result<SourceQueue> {
        let mut queue = SourceQueue::new();
        for path in image_files {
            queue
                .push_path(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
        }
        Ok(queue)
    }

    /// Decode, fit, watermark and encode one source
    pub fn process_single(&self, source: &SourceImage) -> ProcessingResult<EncodedResult> {
        let start = Instant::now();
        let config = &self.config;

        let decoded = source.decode()?;
        let (source_width, source_height) = decoded.dimensions();
        debug!(
            "Decoded {} ({}x{})",
            source.filename, source_width, source_height
        );

        let geometry = geometry::resolve(
            source_width,
            source_height,
            config.target_width,
            config.target_height,
            config.fit_mode,
        )?;

        let canvas = composite::composite(
            &decoded,
            &geometry,
            config.target_width,
            config.target_height,
            config.format,
            config.fit_mode,
            config.watermark.as_deref(),
        )?;
        debug_assert_eq!(canvas.dimensions(), (config.target_width, config.target_height));

        let encoded = encode::encode(&canvas, config.format, &config.policy)?;

        verbose_println(
            config.verbose,
            &format!(
                "{}: {} bytes after {} attempt(s)",
                source.filename,
                encoded.bytes.len(),
                encoded.attempts.len()
            ),
        );

        Ok(EncodedResult {
            source_id: source.id.clone(),
            source_filename: source.filename.clone(),
            output_name: create_output_filename(
                &source.filename,
                config.suffix.as_deref(),
                config.format,
            ),
            quality: encoded.quality(),
            attempts: encoded.attempts.len(),
            within_budget: encoded.within_budget(&config.policy),
            bytes: encoded.bytes,
            width: canvas.width(),
            height: canvas.height(),
            format: config.format,
            processing_time: start.elapsed(),
        })
    }
}
