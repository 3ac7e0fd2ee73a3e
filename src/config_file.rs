use crate::cli::{Args, FitMode, OutputFormat, UsagePreset};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Saved processing preset, as written by a front-end
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub name: Option<String>,
    pub last_modified: Option<String>,
    pub config: ProcessingConfigJson,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingConfigJson {
    pub input_paths: Option<Vec<String>>,
    pub output_path: Option<String>,
    pub usage: Option<String>,
    pub size: Option<String>,
    pub format: Option<String>,
    pub fit: Option<String>,
    pub suffix: Option<String>,
    pub watermark: Option<String>,
    pub max_size_kb: Option<u64>,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub report: Option<bool>,
    pub dry_run: Option<bool>,
}

impl Args {
    /// Load configuration from a JSON file and merge with command-line arguments
    /// Command-line arguments take precedence over config file values
    pub fn load_and_merge_config(&mut self) -> Result<()> {
        if let Some(config_path) = self.config_file.clone() {
            let contents = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let config: ConfigFile = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            let args_from_cli = std::env::args().collect::<Vec<_>>();
            self.merge_from_config(config.config, &args_from_cli);

            info!("Loaded configuration from: {:?}", config_path);
        }
        Ok(())
    }

    /// Apply config values for every option not given in `args_from_cli`
    pub fn merge_from_config(&mut self, config: ProcessingConfigJson, args_from_cli: &[String]) {
        let given = |flags: &[&str]| {
            args_from_cli
                .iter()
                .any(|a| flags.iter().any(|f| a == f || a.starts_with(&format!("{}=", f))))
        };

        if !given(&["-i", "--input"]) {
            if let Some(inputs) = config.input_paths {
                self.input_paths = inputs.into_iter().map(PathBuf::from).collect();
            }
        }

        if !given(&["-o", "--output"]) {
            if let Some(output) = config.output_path {
                self.output_dir = PathBuf::from(output);
            }
        }

        if !given(&["-u", "--usage"]) {
            if let Some(usage) = config.usage {
                self.usage = parse_choice::<UsagePreset>("usage", &usage).unwrap_or(self.usage);
            }
        }

        if !given(&["-s", "--size"]) && config.size.is_some() {
            self.size = config.size;
        }

        if !given(&["-f", "--format"]) {
            if let Some(format) = config.format {
                self.format = parse_choice::<OutputFormat>("format", &format).unwrap_or(self.format);
            }
        }

        if !given(&["--fit"]) {
            if let Some(fit) = config.fit {
                self.fit = parse_choice::<FitMode>("fit", &fit).unwrap_or(self.fit);
            }
        }

        if !given(&["--suffix"]) && config.suffix.is_some() {
            self.suffix = config.suffix;
        }

        if !given(&["-w", "--watermark"]) {
            if let Some(watermark) = config.watermark {
                self.watermark = Some(PathBuf::from(watermark));
            }
        }

        if !given(&["--max-size-kb"]) {
            if let Some(kb) = config.max_size_kb {
                self.max_size_kb = kb;
            }
        }

        if !given(&["-j", "--jobs"]) {
            if let Some(jobs) = config.jobs {
                self.jobs = jobs;
            }
        }

        if !given(&["--timeout-secs"]) {
            if let Some(secs) = config.timeout_secs {
                self.timeout_secs = secs;
            }
        }

        // Boolean flags - only apply if currently false (default)
        if !self.report {
            self.report = config.report.unwrap_or(false);
        }

        if !self.dry_run {
            self.dry_run = config.dry_run.unwrap_or(false);
        }
    }
}

fn parse_choice<T: ValueEnum>(field: &str, value: &str) -> Option<T> {
    let parsed = T::from_str(value, true).ok();
    if parsed.is_none() {
        warn!("Ignoring unknown {} '{}' in config file", field, value);
    }
    parsed
}
