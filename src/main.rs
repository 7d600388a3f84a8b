/*!
 * Command-line interface for PackFS
 */

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};

use packfs::config::{Args, Command, Config};
use packfs::error::Result;
use packfs::huffman;
use packfs::provider::LocalFs;
use packfs::report::{OperationReport, ReportFormat, Reporter};
use packfs::utils::count_entries;
use packfs::{Archiver, Extractor};

fn main() -> io::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Generate shell completions and exit if requested
    if let Some(shell) = args.generate {
        let mut command = Args::command();
        clap_complete::generate(shell, &mut command, "packfs", &mut io::stdout());
        return Ok(());
    }

    // Create and validate configuration
    let config = Config::from_args(args)?;
    config.validate()?;

    let report = match &config.command {
        Command::Create {
            directory,
            archive,
            compress,
        } => run_create(directory, archive, *compress)?,
        Command::Extract {
            archive,
            destination,
            compressed,
        } => run_extract(archive, destination, *compressed)?,
        Command::Compress { input, output } => run_compress(input, output)?,
        Command::Decompress { input, output } => run_decompress(input, output)?,
    };

    let reporter = Reporter::new(ReportFormat::ConsoleTable);
    reporter.print_report(&report);

    Ok(())
}

/// Progress bar with the standard styling
fn make_progress(len: u64) -> Arc<ProgressBar> {
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} {wide_msg:.dim.white} {pos}/{len} ({percent}%) ⏱️  Elapsed: {elapsed_precise}")
            .unwrap(),
    );
    progress.enable_steady_tick(std::time::Duration::from_millis(100));
    progress
        .set_prefix("📊 Processing");
    Arc::new(progress)
}

fn run_create(directory: &str, archive: &str, compress: bool) -> Result<OperationReport> {
    let root = Path::new(directory);

    // Count entries up front so the bar has a length
    let total = match count_entries(root) {
        Ok(count) => count,
        Err(e) => {
            eprintln!("Warning: failed to count entries: {}", e);
            0
        }
    };
    let progress = make_progress(total);
    progress.set_message(format!("Archiving {}", root.display()));

    let start_time = Instant::now();
    let mut archiver = Archiver::new(LocalFs, Arc::clone(&progress));

    let output_bytes = if compress {
        let mut stream = Vec::new();
        archiver.archive(root, &mut stream)?;
        progress.set_message("Compressing archive stream");
        let compressed = huffman::compress(&stream);
        fs::write(archive, &compressed)?;
        compressed.len() as u64
    } else {
        let file = File::create(archive)?;
        let mut writer = BufWriter::new(file);
        archiver.archive(root, &mut writer)?;
        writer.flush()?;
        fs::metadata(archive)?.len()
    };

    progress.finish_and_clear();
    let stats = archiver.statistics();

    Ok(OperationReport {
        operation: "ARCHIVE".to_string(),
        output_file: archive.to_string(),
        duration: start_time.elapsed(),
        entries: stats.entries,
        files: stats.files,
        directories: stats.directories,
        symlinks: stats.symlinks,
        hardlinks: stats.hardlinks,
        special: stats.special,
        content_bytes: stats.content_bytes,
        output_bytes,
        checksum_mismatches: 0,
    })
}

fn run_extract(archive: &str, destination: &str, compressed: bool) -> Result<OperationReport> {
    let progress = Arc::new(ProgressBar::new_spinner());
    progress.enable_steady_tick(std::time::Duration::from_millis(100));
    progress.set_message(format!("Extracting {}", archive));

    let start_time = Instant::now();

    let data = fs::read(archive)?;
    let data = if compressed {
        huffman::decompress(&data)?
    } else {
        data
    };

    let mut extractor = Extractor::new(LocalFs, Arc::clone(&progress));
    extractor.extract(&mut &data[..], Path::new(destination))?;

    progress.finish_and_clear();
    let stats = extractor.statistics();

    Ok(OperationReport {
        operation: "EXTRACT".to_string(),
        output_file: destination.to_string(),
        duration: start_time.elapsed(),
        entries: stats.entries,
        files: stats.files,
        directories: stats.directories,
        symlinks: stats.symlinks,
        hardlinks: stats.hardlinks,
        special: stats.special,
        content_bytes: stats.content_bytes,
        output_bytes: stats.content_bytes,
        checksum_mismatches: stats.checksum_mismatches,
    })
}

fn run_compress(input: &str, output: &str) -> Result<OperationReport> {
    let start_time = Instant::now();
    let data = fs::read(input)?;
    let compressed = huffman::compress(&data);
    fs::write(output, &compressed)?;

    Ok(OperationReport {
        operation: "COMPRESS".to_string(),
        output_file: output.to_string(),
        duration: start_time.elapsed(),
        entries: 0,
        files: 1,
        directories: 0,
        symlinks: 0,
        hardlinks: 0,
        special: 0,
        content_bytes: data.len() as u64,
        output_bytes: compressed.len() as u64,
        checksum_mismatches: 0,
    })
}

fn run_decompress(input: &str, output: &str) -> Result<OperationReport> {
    let start_time = Instant::now();
    let data = fs::read(input)?;
    let decompressed = huffman::decompress(&data)?;
    fs::write(output, &decompressed)?;

    Ok(OperationReport {
        operation: "DECOMPRESS".to_string(),
        output_file: output.to_string(),
        duration: start_time.elapsed(),
        entries: 0,
        files: 1,
        directories: 0,
        symlinks: 0,
        hardlinks: 0,
        special: 0,
        content_bytes: data.len() as u64,
        output_bytes: decompressed.len() as u64,
        checksum_mismatches: 0,
    })
}
