use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Output encoding
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossy, opaque (white background)
    #[value(name = "jpeg", alias = "jpg")]
    Jpeg,
    /// Lossless with alpha
    #[value(name = "png")]
    Png,
    /// Lossy with alpha
    #[value(name = "webp")]
    Webp,
}

impl OutputFormat {
    /// File extension used for output names
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// Lossy formats go through the quality search
    pub fn is_lossy(&self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Webp)
    }

    pub fn supports_alpha(&self) -> bool {
        matches!(self, OutputFormat::Png | OutputFormat::Webp)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// How a source aspect ratio is mapped onto the target canvas
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Scale to fill the canvas, cropping the overflow
    #[value(name = "cover")]
    Cover,
    /// Scale to fit inside the canvas, padding the rest
    #[value(name = "contain")]
    Contain,
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMode::Cover => f.write_str("cover"),
            FitMode::Contain => f.write_str("contain"),
        }
    }
}

/// Named canvas presets
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsagePreset {
    /// 1200x1200 feed post
    #[value(name = "square")]
    Square,
    /// 1920x1080 full HD
    #[value(name = "landscape")]
    Landscape,
    /// 1080x1350 vertical post
    #[value(name = "portrait")]
    Portrait,
    /// 1080x1920 story / reel
    #[value(name = "story")]
    Story,
    /// 1200x628 link preview
    #[value(name = "banner")]
    Banner,
    /// 600x600 catalog thumbnail
    #[value(name = "thumbnail")]
    Thumbnail,
}

impl UsagePreset {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            UsagePreset::Square => (1200, 1200),
            UsagePreset::Landscape => (1920, 1080),
            UsagePreset::Portrait => (1080, 1350),
            UsagePreset::Story => (1080, 1920),
            UsagePreset::Banner => (1200, 628),
            UsagePreset::Thumbnail => (600, 600),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "photobatch-processor",
    about = "Batch image normalizer: fit, watermark and compress photos for publishing",
    long_about = "
Photo Batch Processor

Every input image is fitted onto a fixed canvas (cover crops, contain pads),
optionally stamped with a PNG watermark in the bottom-right corner, and
re-encoded. JPEG and WebP outputs are compressed by lowering quality from 0.90
down to 0.60 until the file fits the size budget (250 KB by default).

A single result is written as-is; several results are packed into a zip archive.

Example Usage:
  # Square JPEG posts from a folder
  photobatch-processor -i ~/Photos -o ~/out --usage square

  # Story-sized WebP with padding and a watermark
  photobatch-processor -i ~/Photos -o ~/out --usage story -f webp --fit contain \\
    --watermark ~/logo.png --suffix summer-sale

  # Custom size, PNG output, JSON progress for a GUI wrapper
  photobatch-processor -i a.jpg -i b.png -o ~/out -s 800x600 -f png --json-progress"
)]
pub struct Args {
    /// Input directories or single image files (can be specified multiple times)
    #[arg(short = 'i', long = "input", value_name = "DIR|FILE")]
    pub input_paths: Vec<PathBuf>,

    /// Output directory for the processed file or archive
    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Canvas preset
    #[arg(short = 'u', long = "usage", default_value = "square")]
    pub usage: UsagePreset,

    /// Explicit canvas size, overrides --usage (format: WIDTHxHEIGHT)
    #[arg(short = 's', long = "size", value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "jpeg")]
    pub format: OutputFormat,

    /// Fit mode
    #[arg(long = "fit", default_value = "cover")]
    pub fit: FitMode,

    /// Text appended to every output filename and to the archive name
    #[arg(long = "suffix", value_name = "TEXT")]
    pub suffix: Option<String>,

    /// PNG watermark placed in the bottom-right corner
    #[arg(short = 'w', long = "watermark", value_name = "FILE")]
    pub watermark: Option<PathBuf>,

    /// Size budget for lossy formats in KiB
    #[arg(long = "max-size-kb", default_value = "250", value_name = "KB")]
    pub max_size_kb: u64,

    /// Number of parallel jobs (1 = sequential, 0 = auto-detect CPU cores)
    #[arg(short = 'j', long = "jobs", default_value = "1", value_name = "N")]
    pub jobs: usize,

    /// Per-image time limit in seconds (0 = no limit)
    #[arg(long = "timeout-secs", default_value = "0", value_name = "SECS")]
    pub timeout_secs: u64,

    /// JSON configuration file; command-line flags take precedence
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Enable verbose output with detailed progress information
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Emit progress and results as JSON lines on stdout
    #[arg(long = "json-progress")]
    pub json_progress: bool,

    /// Display a table with per-image results at the end
    #[arg(long = "report")]
    pub report: bool,

    /// Process everything but write no files
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

impl Args {
    /// Parse an explicit WIDTHxHEIGHT size string
    pub fn parse_size(size: &str) -> Result<(u32, u32), String> {
        let parts: Vec<&str> = size.trim().split('x').collect();
        if parts.len() != 2 {
            return Err(format!(
                "Invalid size format '{}'. Use WIDTHxHEIGHT (e.g., 1200x1200)",
                size
            ));
        }

        let width = parts[0]
            .parse::<u32>()
            .map_err(|_| format!("Invalid width: '{}'", parts[0]))?;
        let height = parts[1]
            .parse::<u32>()
            .map_err(|_| format!("Invalid height: '{}'", parts[1]))?;

        if width == 0 || height == 0 {
            return Err("Width and height must be greater than 0".to_string());
        }

        if width > 10000 || height > 10000 {
            return Err("Width and height must be at most 10000 pixels".to_string());
        }

        Ok((width, height))
    }

    /// Canvas dimensions: explicit --size wins over --usage
    pub fn target_dimensions(&self) -> Result<(u32, u32), String> {
        match &self.size {
            Some(size) => Self::parse_size(size),
            None => Ok(self.usage.dimensions()),
        }
    }

    pub fn max_size_bytes(&self) -> usize {
        (self.max_size_kb as usize).saturating_mul(1024)
    }

    pub fn parallel_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }

    pub fn item_timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_secs > 0).then(|| std::time::Duration::from_secs(self.timeout_secs))
    }
}


// Default implementation for tests
#[cfg(test)]
impl Default for Args {
    fn default() -> Self {
        Self {
            input_paths: vec![],
            output_dir: PathBuf::new(),
            usage: UsagePreset::Square,
            size: None,
            format: OutputFormat::Jpeg,
            fit: FitMode::Cover,
            suffix: None,
            watermark: None,
            max_size_kb: 250,
            jobs: 1,
            timeout_secs: 0,
            config_file: None,
            verbose: false,
            json_progress: false,
            report: false,
            dry_run: false,
        }
    }
}
