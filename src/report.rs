/*!
 * Reporting functionality for PackFS
 *
 * Provides formatted end-of-run reports using the tabled library for
 * clean, consistent table rendering.
 */

use std::time::Duration;

use chrono::Local;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Padding, Style},
    Table, Tabled,
};

use crate::utils::format_file_size;

/// Statistics for one archive, extract, compress or decompress run
#[derive(Debug, Clone)]
pub struct OperationReport {
    /// Operation name shown in the report title
    pub operation: String,
    /// Output file path
    pub output_file: String,
    /// Time taken
    pub duration: Duration,
    /// Number of archive entries handled
    pub entries: usize,
    /// Regular files
    pub files: usize,
    /// Directories
    pub directories: usize,
    /// Symbolic links
    pub symlinks: usize,
    /// Hard links deduplicated or recreated
    pub hardlinks: usize,
    /// FIFO and device nodes
    pub special: usize,
    /// Bytes of file content handled
    pub content_bytes: u64,
    /// Bytes in the produced output
    pub output_bytes: u64,
    /// Checksum mismatches reported during extraction
    pub checksum_mismatches: usize,
}

/// Format of the report output
pub enum ReportFormat {
    /// Console table output
    ConsoleTable,
}

/// Report generator for run results
pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    /// Create a new reporter
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Format a number with human-readable units
    fn format_number(&self, num: usize) -> String {
        if num >= 1_000_000 {
            format!("{:.1}M", num as f64 / 1_000_000.0)
        } else if num >= 1_000 {
            format!("{:.1}K", num as f64 / 1_000.0)
        } else {
            num.to_string()
        }
    }

    /// Generate a report string based on run statistics
    pub fn generate_report(&self, report: &OperationReport) -> String {
        match self.format {
            ReportFormat::ConsoleTable => self.generate_console_report(report),
        }
    }

    /// Print the report to stdout
    pub fn print_report(&self, report: &OperationReport) {
        println!("\n{}", self.generate_report(report));
    }

    // Create a summary table using the tabled crate
    fn create_summary_table(&self, report: &OperationReport) -> String {
        #[derive(Tabled)]
        struct SummaryRow {
            #[tabled(rename = "Metric")]
            key: String,

            #[tabled(rename = "Value")]
            value: String,
        }

        let mut rows = Vec::new();

        rows.push(SummaryRow {
            key: "📂 Output File".to_string(),
            value: report.output_file.clone(),
        });

        rows.push(SummaryRow {
            key: "⏱️ Process Time".to_string(),
            value: format!("{:.4?}", report.duration),
        });

        rows.push(SummaryRow {
            key: "🗃️ Entries".to_string(),
            value: self.format_number(report.entries),
        });

        rows.push(SummaryRow {
            key: "📄 Files / 📁 Dirs".to_string(),
            value: format!(
                "{} / {}",
                self.format_number(report.files),
                self.format_number(report.directories)
            ),
        });

        if report.symlinks + report.hardlinks + report.special > 0 {
            rows.push(SummaryRow {
                key: "🔗 Links / Special".to_string(),
                value: format!(
                    "{} sym, {} hard, {} special",
                    report.symlinks, report.hardlinks, report.special
                ),
            });
        }

        rows.push(SummaryRow {
            key: "📦 Content Bytes".to_string(),
            value: format_file_size(report.content_bytes),
        });

        rows.push(SummaryRow {
            key: "💾 Output Size".to_string(),
            value: format_file_size(report.output_bytes),
        });

        if report.checksum_mismatches > 0 {
            rows.push(SummaryRow {
                key: "⚠️ Checksum Mismatches".to_string(),
                value: self.format_number(report.checksum_mismatches),
            });
        }

        rows.push(SummaryRow {
            key: "🕓 Finished".to_string(),
            value: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        });

        let mut table = Table::new(rows);
        table
            .with(Style::rounded())
            .with(Padding::new(1, 1, 0, 0))
            .with(Modify::new(Columns::new(..)).with(Alignment::left()));

        table.to_string()
    }

    // Generate a console table report
    fn generate_console_report(&self, report: &OperationReport) -> String {
        let summary_table = self.create_summary_table(report);
        format!("✅  {} COMPLETE\n{}", report.operation, summary_table)
    }
}
