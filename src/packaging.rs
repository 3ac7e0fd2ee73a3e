//! Hand-over of a finished batch: one result passes through untouched, several
//! are packed into a single archive.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ProcessingError, ProcessingResult};
use crate::image_processing::EncodedResult;
use crate::utils::create_archive_name;

/// Combines several named buffers into one archive buffer
pub trait Packager {
    fn package(&self, entries: &[(&str, &[u8])]) -> ProcessingResult<Vec<u8>>;
}

/// Deflate-compressed zip archive
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

impl Packager for ZipPackager {
    fn package(&self, entries: &[(&str, &[u8])]) -> ProcessingResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, data) in entries {
            writer
                .start_file(*name, options)
                .map_err(ProcessingError::packaging)?;
            writer.write_all(data).map_err(ProcessingError::packaging)?;
            debug!("Archived {} ({} bytes)", name, data.len());
        }

        let cursor = writer.finish().map_err(ProcessingError::packaging)?;
        Ok(cursor.into_inner())
    }
}

/// What the caller receives for a finished batch
#[derive(Debug)]
pub enum Delivery {
    /// No successful results
    Empty,
    /// Exactly one result, delivered as-is
    Single(EncodedResult),
    /// More than one result, packed together
    Archive { filename: String, bytes: Vec<u8> },
}

impl Delivery {
    pub fn kind(&self) -> &'static str {
        match self {
            Delivery::Empty => "empty",
            Delivery::Single(_) => "single",
            Delivery::Archive { .. } => "archive",
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            Delivery::Empty => None,
            Delivery::Single(result) => Some(&result.output_name),
            Delivery::Archive { filename, .. } => Some(filename),
        }
    }

    /// Media type of the delivered file
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            Delivery::Empty => None,
            Delivery::Single(result) => Some(result.format.mime_type()),
            Delivery::Archive { .. } => Some("application/zip"),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Delivery::Empty => &[],
            Delivery::Single(result) => result.bytes.as_slice(),
            Delivery::Archive { bytes, .. } => bytes.as_slice(),
        }
    }

    /// Write the delivery into `output_dir`. Returns the written path.
    pub fn write_to(&self, output_dir: &Path) -> ProcessingResult<Option<PathBuf>> {
        let Some(filename) = self.filename() else {
            return Ok(None);
        };

        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(filename);
        std::fs::write(&path, self.bytes())?;
        info!("Wrote {} ({} bytes)", path.display(), self.bytes().len());
        Ok(Some(path))
    }
}

/// Decide and build the delivery for ordered results.
///
/// The packager is only invoked for two or more results; its failure is
/// the one batch-level error.
pub fn deliver(
    results: Vec<EncodedResult>,
    suffix: Option<&str>,
    packager: &dyn Packager,
) -> ProcessingResult<Delivery> {
    let mut results = results;
    match results.len() {
        0 => Ok(Delivery::Empty),
        1 => Ok(results.pop().map_or(Delivery::Empty, Delivery::Single)),
        count => {
            let entries: Vec<(&str, &[u8])> = results
                .iter()
                .map(|r| (r.output_name.as_str(), r.bytes.as_slice()))
                .collect();
            let bytes = packager.package(&entries)?;
            let filename = create_archive_name(suffix);
            info!("Packed {} results into {}", count, filename);
            Ok(Delivery::Archive { filename, bytes })
        }
    }
}
