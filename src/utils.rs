use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use unicode_normalization::UnicodeNormalization;

use crate::cli::{Args, OutputFormat};

/// Create a styled progress bar
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.blue} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg} ({eta})",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", mins, secs)
    } else if total_secs > 0 {
        format!("{}.{:03}s", total_secs, millis)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Byte count as rounded kilobytes, e.g. "182 KB"
pub fn format_size_kb(bytes: usize) -> String {
    format!("{} KB", (bytes as f64 / 1024.0).round() as u64)
}

/// Validate command line arguments
pub fn validate_inputs(args: &Args) -> Result<()> {
    if args.input_paths.is_empty() {
        return Err(anyhow::anyhow!("No input paths given (use -i/--input)"));
    }

    for input_path in &args.input_paths {
        if !input_path.exists() {
            return Err(anyhow::anyhow!(
                "Input path does not exist: {}",
                input_path.display()
            ));
        }
        if !input_path.is_dir() && !input_path.is_file() {
            return Err(anyhow::anyhow!(
                "Input path is neither a file nor a directory: {}",
                input_path.display()
            ));
        }
    }

    args.target_dimensions().map_err(|e| anyhow::anyhow!(e))?;

    if args.max_size_kb == 0 {
        return Err(anyhow::anyhow!("Size budget must be greater than 0 KB"));
    }

    if args.jobs > 64 {
        return Err(anyhow::anyhow!(
            "Job count too high (max 64), got: {}",
            args.jobs
        ));
    }

    if let Some(watermark) = &args.watermark {
        if !watermark.is_file() {
            return Err(anyhow::anyhow!(
                "Watermark file does not exist: {}",
                watermark.display()
            ));
        }
    }

    Ok(())
}

/// Get file extension in lowercase
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Declared MIME type for a path, from its extension
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    match get_file_extension(path)?.as_str() {
        "jpg" | "jpeg" | "jpe" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// 8-character id from content and name.
/// Uses SHA256 and takes the first 8 hex characters
pub fn content_hash(data: &[u8], filename: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update((data.len() as u64).to_le_bytes());
    hasher.update(filename.as_bytes());

    let hex_hash = format!("{:x}", hasher.finalize());
    hex_hash[..8].to_string()
}

/// Lowercase ASCII slug: accents stripped, runs of anything outside
/// `[a-z0-9]` collapsed to one hyphen, no leading/trailing hyphens
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for ch in text.to_lowercase().nfd() {
        // Combining diacritical marks left over from decomposition
        if ('\u{0300}'..='\u{036f}').contains(&ch) {
            continue;
        }
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Output stem for a source: cleaned name plus optional cleaned suffix,
/// `image` when nothing survives cleaning
pub fn clean_filename(original_name: &str, suffix: Option<&str>) -> String {
    let stem = match original_name.rfind('.') {
        Some(dot) if dot > 0 => &original_name[..dot],
        _ => original_name,
    };

    let mut name = slugify(stem);

    if let Some(suffix) = suffix {
        let clean_suffix = slugify(suffix.trim());
        if !clean_suffix.is_empty() {
            if name.is_empty() {
                name = clean_suffix;
            } else {
                name = format!("{}-{}", name, clean_suffix);
            }
        }
    }

    if name.is_empty() {
        "image".to_string()
    } else {
        name
    }
}

/// Full output filename: `{clean stem}.{format extension}`
pub fn create_output_filename(original_name: &str, suffix: Option<&str>, format: OutputFormat) -> String {
    format!("{}.{}", clean_filename(original_name, suffix), format.extension())
}

/// Archive name for multi-result delivery
pub fn create_archive_name(suffix: Option<&str>) -> String {
    match suffix.map(slugify).filter(|s| !s.is_empty()) {
        Some(suffix) => format!("optimized_images_{}.zip", suffix),
        None => "optimized_images.zip".to_string(),
    }
}

/// Return `filename`, or `stem-N.ext` with the smallest N >= 2 not yet used.
/// The returned name is recorded in `used`.
pub fn unique_filename(filename: &str, used: &mut HashSet<String>) -> String {
    if used.insert(filename.to_string()) {
        return filename.to_string();
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(dot) if dot > 0 => (&filename[..dot], &filename[dot..]),
        _ => (filename, ""),
    };

    let mut counter = 2;
    loop {
        let candidate = format!("{}-{}{}", stem, counter, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Print verbose information if verbose mode is enabled
pub fn verbose_println(verbose: bool, message: &str) {
    if verbose {
        println!("{} {}", style("[VERBOSE]").dim(), message);
    }
}

/// Print warning message
pub fn warn_println(message: &str) {
    println!("{} {}", style("[WARNING]").yellow().bold(), message);
}

/// Print error message
pub fn error_println(message: &str) {
    eprintln!("{} {}", style("[ERROR]").red().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(1)), "1.000s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    }

    #[test]
    fn test_format_size_kb() {
        assert_eq!(format_size_kb(0), "0 KB");
        assert_eq!(format_size_kb(250 * 1024), "250 KB");
        assert_eq!(format_size_kb(1536), "2 KB");
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(mime_from_path(&PathBuf::from("a.JPG")), Some("image/jpeg"));
        assert_eq!(mime_from_path(&PathBuf::from("a.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_from_path(&PathBuf::from("logo.png")), Some("image/png"));
        assert_eq!(mime_from_path(&PathBuf::from("x.webp")), Some("image/webp"));
        assert_eq!(mime_from_path(&PathBuf::from("x.gif")), Some("image/gif"));
        assert_eq!(mime_from_path(&PathBuf::from("notes.txt")), None);
        assert_eq!(mime_from_path(&PathBuf::from("noext")), None);
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("My Photo.JPG", None), "my-photo");
        assert_eq!(clean_filename("Café Olé!.png", None), "cafe-ole");
        assert_eq!(clean_filename("__weird__name__.webp", None), "weird-name");
        assert_eq!(clean_filename("archive.tar.gz", None), "archive-tar");
        assert_eq!(clean_filename("noextension", None), "noextension");
        assert_eq!(clean_filename(".hidden", None), "hidden");
        assert_eq!(clean_filename("日本語.jpg", None), "image");
    }

    #[test]
    fn test_clean_filename_with_suffix() {
        assert_eq!(
            clean_filename("Beach Day.jpg", Some(" Summer Sale ")),
            "beach-day-summer-sale"
        );
        assert_eq!(clean_filename("Beach.jpg", Some("   ")), "beach");
        assert_eq!(clean_filename("日本語.jpg", Some("promo")), "promo");
    }

    #[test]
    fn test_output_and_archive_names() {
        assert_eq!(
            create_output_filename("IMG 001.jpg", Some("shop"), OutputFormat::Webp),
            "img-001-shop.webp"
        );
        assert_eq!(
            create_output_filename("IMG 001.png", None, OutputFormat::Jpeg),
            "img-001.jpeg"
        );
        assert_eq!(create_archive_name(None), "optimized_images.zip");
        assert_eq!(create_archive_name(Some("")), "optimized_images.zip");
        assert_eq!(create_archive_name(Some("Black Friday")), "optimized_images_black-friday.zip");
    }

    #[test]
    fn test_unique_filename() {
        let mut used = HashSet::new();
        assert_eq!(unique_filename("a.jpeg", &mut used), "a.jpeg");
        assert_eq!(unique_filename("a.jpeg", &mut used), "a-2.jpeg");
        assert_eq!(unique_filename("a.jpeg", &mut used), "a-3.jpeg");
        assert_eq!(unique_filename("b", &mut used), "b");
        assert_eq!(unique_filename("b", &mut used), "b-2");
    }

    #[test]
    fn test_content_hash() {
        let hash1 = content_hash(b"abc", "a.jpg");
        let hash2 = content_hash(b"abc", "a.jpg");
        let hash3 = content_hash(b"abc", "b.jpg");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }

    #[test]
    fn test_validate_inputs_requires_input() {
        let args = Args::default();
        assert!(validate_inputs(&args).is_err());
    }
}
