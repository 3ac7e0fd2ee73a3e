use prettytable::{format, Cell, Row, Table};

use super::batch::{BatchReport, ItemOutcome};
use crate::utils::{format_duration, format_size_kb};

/// Per-item results of a run as a formatted table
pub struct ResultsReport<'a> {
    report: &'a BatchReport,
}

impl<'a> ResultsReport<'a> {
    pub fn new(report: &'a BatchReport) -> Self {
        Self { report }
    }

    pub fn build_table(&self) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);

        table.add_row(Row::new(vec![
            Cell::new("#"),
            Cell::new("Input"),
            Cell::new("Output"),
            Cell::new("Size"),
            Cell::new("Quality"),
            Cell::new("Tries"),
            Cell::new("Time"),
        ]));

        for outcome in &self.report.outcomes {
            match outcome {
                ItemOutcome::Success(result) => {
                    let size = if result.within_budget {
                        format_size_kb(result.size_bytes())
                    } else {
                        // Floor quality reached without meeting the budget
                        format!("{} (over)", format_size_kb(result.size_bytes()))
                    };
                    table.add_row(Row::new(vec![
                        Cell::new(""),
                        Cell::new(&truncate(&result.source_filename, 28)),
                        Cell::new(&truncate(&result.output_name, 28)),
                        Cell::new(&size),
                        Cell::new(&quality_label(result.quality)),
                        Cell::new(&result.attempts.to_string()),
                        Cell::new(&format_duration(result.processing_time)),
                    ]));
                }
                ItemOutcome::Failure(failure) => {
                    table.add_row(Row::new(vec![
                        Cell::new("✗"),
                        Cell::new(&truncate(&failure.filename, 28)),
                        Cell::new(&format!("failed: {}", failure.error.kind())),
                        Cell::new("-"),
                        Cell::new("-"),
                        Cell::new("-"),
                        Cell::new("-"),
                    ]));
                }
            }
        }

        table
    }

    pub fn print(&self) {
        println!();
        println!("RESULTS ({})", self.report.summary());
        println!();
        self.build_table().printstd();

        if self.report.cancelled {
            println!("Run was cancelled before every image was processed.");
        }
        println!();
    }
}

fn quality_label(quality: Option<f32>) -> String {
    match quality {
        Some(q) => format!("{:.2}", q),
        None => "lossless".to_string(),
    }
}

/// Truncate string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use crate::image_processing::batch::ItemFailure;
    use crate::image_processing::EncodedResult;
    use crate::cli::OutputFormat;
    use std::time::Duration;

    fn result(name: &str, size: usize, quality: Option<f32>) -> EncodedResult {
        EncodedResult {
            source_id: "abcd1234".to_string(),
            source_filename: format!("{}.jpg", name),
            output_name: format!("{}.jpeg", name),
            bytes: vec![0; size],
            width: 10,
            height: 10,
            format: OutputFormat::Jpeg,
            quality,
            attempts: 2,
            within_budget: true,
            processing_time: Duration::from_millis(12),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short.jpg", 20), "short.jpg");
        assert_eq!(truncate("a_very_long_file_name.jpeg", 10), "a_very_...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_quality_label() {
        assert_eq!(quality_label(Some(0.85)), "0.85");
        assert_eq!(quality_label(None), "lossless");
    }

    #[test]
    fn test_table_has_row_per_outcome() {
        let report = BatchReport {
            outcomes: vec![
                ItemOutcome::Success(result("a", 2048, Some(0.9))),
                ItemOutcome::Failure(ItemFailure {
                    index: 1,
                    source_id: "ffff0000".to_string(),
                    filename: "b.jpg".to_string(),
                    error: ProcessingError::decode("b.jpg", "truncated"),
                }),
            ],
            total: 2,
            cancelled: false,
            duration: Duration::from_secs(1),
            items_per_second: 2.0,
        };

        let table = ResultsReport::new(&report).build_table();
        // Header plus two items
        assert_eq!(table.len(), 3);
        let rendered = table.to_string();
        assert!(rendered.contains("a.jpeg"));
        assert!(rendered.contains("2 KB"));
        assert!(rendered.contains("failed: decode"));
    }
}
