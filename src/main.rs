use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use photobatch_processor::cli::Args;
use photobatch_processor::image_processing::batch::{BatchEvent, CancellationToken};
use photobatch_processor::image_processing::encode::CompressionPolicy;
use photobatch_processor::image_processing::report::ResultsReport;
use photobatch_processor::image_processing::watermark::Watermark;
use photobatch_processor::image_processing::{ProcessingConfig, ProcessingEngine};
use photobatch_processor::json_output::JsonMessage;
use photobatch_processor::packaging::{deliver, Delivery, ZipPackager};
use photobatch_processor::utils::{
    create_progress_bar, error_println, format_duration, format_size_kb, validate_inputs,
    verbose_println, warn_println,
};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let mut args = Args::parse();
    init_tracing(args.verbose);

    args.load_and_merge_config()?;
    let json_mode = args.json_progress;

    if !json_mode {
        println!("{}", style("Photo Batch Processor").bold().blue());
        println!("{}", style("Fit, watermark and compress images for publishing").dim());
        println!();
    }

    validate_inputs(&args)?;

    let (target_width, target_height) = args.target_dimensions().map_err(|e| anyhow::anyhow!(e))?;

    let watermark = match &args.watermark {
        Some(path) => {
            let loaded = Watermark::load(path)
                .with_context(|| format!("Failed to load watermark: {}", path.display()))?;
            if loaded.is_none() && !json_mode {
                warn_println(&format!(
                    "Watermark {} is not a PNG; continuing without a watermark",
                    path.display()
                ));
            }
            loaded.map(Arc::new)
        }
        None => None,
    };

    let config = ProcessingConfig {
        target_width,
        target_height,
        format: args.format,
        fit_mode: args.fit,
        suffix: args.suffix.clone(),
        watermark,
        policy: CompressionPolicy::with_max_bytes(args.max_size_bytes()),
        parallel_jobs: args.parallel_jobs(),
        item_timeout: args.item_timeout(),
        verbose: args.verbose && !json_mode,
    };

    if config.verbose {
        println!("{}", style("Configuration:").bold());
        println!("  Canvas: {}x{}", config.target_width, config.target_height);
        println!("  Format: {}", config.format);
        println!("  Fit: {}", config.fit_mode);
        println!("  Size budget: {}", format_size_kb(config.policy.max_bytes));
        println!("  Parallel jobs: {}", config.parallel_jobs);
        if let Some(watermark) = &config.watermark {
            println!("  Watermark: {}", watermark.name);
        }
        if let Some(suffix) = &config.suffix {
            println!("  Suffix: {}", suffix);
        }
        if args.dry_run {
            println!("  Dry run mode: enabled (no files will be written)");
        }
        println!();
    }

    let engine = ProcessingEngine::new(config).context("Invalid processing configuration")?;

    let image_files = engine.discover_images(&args.input_paths)?;
    if image_files.is_empty() {
        if json_mode {
            JsonMessage::summary(0, 0, 0, false, start_time.elapsed().as_secs_f64());
        } else {
            println!("{}", style("No supported images found (jpeg, png, webp)").red());
        }
        return Ok(());
    }

    let queue = engine.load_sources(&image_files)?;
    verbose_println(
        engine.config().verbose,
        &format!("Queued {} source(s)", queue.len()),
    );

    let progress = (!json_mode).then(|| create_progress_bar(queue.len() as u64));
    let cancel = CancellationToken::new();

    let report = engine.run_batch(queue.sources(), &cancel, |event| {
        if json_mode {
            JsonMessage::emit_event(&event);
            return;
        }
        let Some(pb) = &progress else {
            return;
        };
        match event {
            BatchEvent::Progress { filename, .. } => pb.set_message(filename),
            BatchEvent::Completed { .. } => pb.inc(1),
            BatchEvent::Failed {
                filename, message, ..
            } => {
                pb.println(format!("{} {}: {}", style("✗").red(), filename, message));
                pb.inc(1);
            }
            BatchEvent::Finished { .. } => pb.finish_with_message("Processing complete"),
        }
    });

    if !json_mode {
        println!();
        let header = if args.dry_run {
            style("Dry Run Results Summary:").bold().cyan()
        } else {
            style("Results Summary:").bold().green()
        };
        println!("{}", header);
        println!("  {}", style(report.summary()).bold());
        if report.failed() > 0 {
            println!("  Failed: {}", style(report.failed()).bold().red());
        }
        println!("  Time: {}", format_duration(report.duration));
        println!("  Throughput: {:.2} images/s", report.items_per_second);

        if args.report {
            ResultsReport::new(&report).print();
        }
    }

    let (total, succeeded, failed, cancelled) =
        (report.total, report.succeeded(), report.failed(), report.cancelled);

    let delivery = match deliver(report.into_results(), args.suffix.as_deref(), &ZipPackager) {
        Ok(delivery) => delivery,
        Err(e) => {
            if json_mode {
                JsonMessage::summary(
                    total,
                    succeeded,
                    failed,
                    cancelled,
                    start_time.elapsed().as_secs_f64(),
                );
            } else {
                error_println(&format!("Packaging failed: {}", e));
            }
            return Err(e).context("Failed to package results");
        }
    };

    let written = if args.dry_run || matches!(delivery, Delivery::Empty) {
        None
    } else {
        delivery
            .write_to(&args.output_dir)
            .with_context(|| format!("Failed to write output to {}", args.output_dir.display()))?
    };

    if json_mode {
        JsonMessage::Delivery {
            kind: delivery.kind().to_string(),
            path: written.as_ref().map(|p| p.display().to_string()),
            mime: delivery.mime_type().map(str::to_string),
            size_bytes: delivery.bytes().len(),
        }
        .emit();
        JsonMessage::summary(
            total,
            succeeded,
            failed,
            cancelled,
            start_time.elapsed().as_secs_f64(),
        );
        return Ok(());
    }

    match (&delivery, &written) {
        (Delivery::Empty, _) => {
            println!("{}", style("Nothing to deliver: no image was processed successfully").yellow());
        }
        (_, Some(path)) => {
            println!(
                "  Output: {} ({})",
                style(path.display()).bold(),
                format_size_kb(delivery.bytes().len())
            );
        }
        (_, None) => {
            if let Some(name) = delivery.filename() {
                println!(
                    "  Would write: {} ({})",
                    style(name).bold(),
                    format_size_kb(delivery.bytes().len())
                );
            }
        }
    }

    println!(
        "\n{} Total time: {}",
        style("✓").green().bold(),
        format_duration(start_time.elapsed())
    );

    Ok(())
}
