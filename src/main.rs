//! Main entry point for the rezip CLI application.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rezip::cli::{AddArgs, Command, ExtractArgs, SelectArgs};
use rezip::{
    AddOptions, ArchiveState, Cli, EntryHeader, EntryResult, ExtractOptions, IndexRange, Selection,
    ZipArchive,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Create(args) => {
            let (archive, paths, options) = add_request(args);
            report(&archive.create(&paths, &options)?, "adding", cli.quiet)
        }
        Command::Add(args) => {
            let (archive, paths, options) = add_request(args);
            report(&archive.add(&paths, &options)?, "adding", cli.quiet)
        }
        Command::List { archive, verbose } => list_files(&ZipArchive::new(archive), verbose),
        Command::Extract(args) => extract(args, cli.quiet),
        Command::Delete { archive, select } => {
            let removed = ZipArchive::new(archive).delete(&selection(&select)?)?;
            if !cli.quiet {
                for entry in &removed {
                    println!("    deleting: {}", entry.stored_filename);
                }
            }
            Ok(())
        }
        Command::Merge { archive, other } => Ok(ZipArchive::new(archive).merge(other)?),
        Command::Duplicate { archive, source } => Ok(ZipArchive::new(archive).duplicate(source)?),
        Command::Properties { archive } => {
            let props = ZipArchive::new(&archive).properties()?;
            if props.state == ArchiveState::Missing {
                bail!("archive '{}' does not exist", archive.display());
            }
            println!("entries: {}", props.entries);
            println!("comment: {}", props.comment);
            println!("central directory: {} bytes at offset {}", props.cd_size, props.cd_offset);
            Ok(())
        }
    }
}

fn add_request(args: AddArgs) -> (ZipArchive, Vec<PathBuf>, AddOptions) {
    let options = AddOptions {
        no_compression: args.no_compression,
        add_path: args.add_path,
        remove_path: args.remove_path,
        remove_all_path: args.remove_all_path,
        comment: args.comment,
    };
    (ZipArchive::new(args.archive), args.paths, options)
}

fn selection(args: &SelectArgs) -> Result<Selection> {
    let by_index = match args.index.as_deref() {
        Some(list) => Some(IndexRange::parse_list(list)?),
        None => None,
    };
    Ok(Selection {
        by_name: (!args.names.is_empty()).then(|| args.names.clone()),
        by_preg: args.preg.clone(),
        by_index,
    })
}

fn extract(args: ExtractArgs, quiet: bool) -> Result<()> {
    let options = ExtractOptions {
        add_path: args.extract_dir,
        remove_path: args.remove_path,
        remove_all_path: args.remove_all_path,
        selection: selection(&args.select)?,
        extract_as_string: args.pipe,
        set_chmod: args.chmod,
        replace_newer: args.replace_newer,
    };
    let results = ZipArchive::new(args.archive).extract(&options)?;

    if args.pipe {
        // Pipe mode: payloads go to stdout, with a marker when there are several
        let files: Vec<&EntryHeader> = results
            .iter()
            .map(EntryResult::header)
            .filter(|h| h.is_ok() && !h.is_folder())
            .collect();
        let mut stdout = std::io::stdout().lock();
        for header in &files {
            if files.len() > 1 {
                writeln!(stdout, "--- {} ---", header.stored_filename)?;
            }
            stdout.write_all(header.content.as_deref().unwrap_or_default())?;
        }
        stdout.flush()?;
        return report(&results, "extracting", true);
    }

    report(&results, "extracting", quiet)
}

/// Print one line per entry and fail if any entry did not succeed.
fn report(results: &[EntryResult], verb: &str, quiet: bool) -> Result<()> {
    let mut failed = 0usize;
    for result in results {
        let header = result.header();
        if result.is_ok() {
            if !quiet {
                println!("  {verb}: {}", header.stored_filename);
            }
        } else {
            failed += 1;
            let name = if header.stored_filename.is_empty() {
                header.filename.display().to_string()
            } else {
                header.stored_filename.clone()
            };
            eprintln!("  {verb}: {name} ({})", result.status());
        }
    }
    if failed > 0 {
        bail!("{failed} of {} entries failed", results.len());
    }
    Ok(())
}

/// List files in the archive.
///
/// Supports two output formats:
/// - Simple format: just file names, one per line
/// - Verbose format (`-v`): table with size, compression ratio and timestamps
fn list_files(archive: &ZipArchive, verbose: bool) -> Result<()> {
    let entries = archive.list()?;

    if !verbose {
        for entry in &entries {
            println!("{}", entry.stored_filename);
        }
        return Ok(());
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        let (year, month, day) = entry.modified.date_parts();
        let (hour, minute, _second) = entry.modified.time_parts();

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.size),
            year,
            month,
            day,
            hour,
            minute,
            entry.stored_filename
        );

        if !entry.is_folder() {
            total_uncompressed += entry.size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>21}  {} files ({})",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count,
        format_size(archive_size(archive))
    );
    Ok(())
}

/// Space saved as a right-aligned percentage. Stored entries that grew
/// report 0%.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

fn archive_size(archive: &ZipArchive) -> u64 {
    std::fs::metadata(archive.path()).map(|m| m.len()).unwrap_or(0)
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_humanized() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }

    #[test]
    fn ratio_handles_growth_and_empty() {
        assert_eq!(ratio(25, 100), "  75%");
        assert_eq!(ratio(120, 100), "  0%");
        assert_eq!(ratio(0, 0), "  0%");
    }
}
