use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rezip")]
#[command(version)]
#[command(about = "Create, inspect, extract and rewrite ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  rezip create backup.zip docs notes.txt      archive a directory and a file\n  \
  rezip extract backup.zip -d out --preg '/\\.txt$/i'   extract text files into out\n  \
  rezip extract -p backup.zip notes.txt | more         send one entry to a pager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Only log errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose_log")]
    pub quiet: bool,

    /// Log every entry processed
    #[arg(long, global = true)]
    pub verbose_log: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new archive
    Create(AddArgs),

    /// Add files to an archive, creating it if needed
    Add(AddArgs),

    /// List archive entries
    List {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Show sizes, ratio and timestamps
        #[arg(short = 'v', long)]
        verbose: bool,
    },

    /// Extract entries
    Extract(ExtractArgs),

    /// Remove entries from an archive
    Delete {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[command(flatten)]
        select: SelectArgs,
    },

    /// Append every entry of OTHER to ARCHIVE
    Merge {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[arg(value_name = "OTHER")]
        other: PathBuf,
    },

    /// Replace ARCHIVE with a copy of SOURCE
    Duplicate {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[arg(value_name = "SOURCE")]
        source: PathBuf,
    },

    /// Show entry count, archive comment and central directory location
    Properties {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Files and directories to store
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<PathBuf>,

    /// Store without compression
    #[arg(short = '0', long = "store")]
    pub no_compression: bool,

    /// Prefix for every stored name
    #[arg(long, value_name = "PATH")]
    pub add_path: Option<String>,

    /// Leading directory to strip from stored names
    #[arg(long, value_name = "PATH")]
    pub remove_path: Option<String>,

    /// Junk paths (store base names only)
    #[arg(short = 'j', long = "junk-paths")]
    pub remove_all_path: bool,

    /// Archive comment
    #[arg(short = 'z', long, value_name = "COMMENT")]
    pub comment: Option<String>,
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Entry names or directories (default: all)
    #[arg(value_name = "NAMES")]
    pub names: Vec<String>,

    /// Regular expression on stored names, optionally /delimited/flags
    #[arg(long, value_name = "RE")]
    pub preg: Option<String>,

    /// Index ranges such as 0-2,5,7-
    #[arg(long, value_name = "LIST")]
    pub index: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    #[command(flatten)]
    pub select: SelectArgs,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Leading directory to strip from entry names
    #[arg(long, value_name = "PATH")]
    pub remove_path: Option<String>,

    /// Junk paths (do not make directories)
    #[arg(short = 'j', long = "junk-paths")]
    pub remove_all_path: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Octal permission bits for extracted files
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    pub chmod: Option<u32>,

    /// Overwrite files even when they are newer than the entry
    #[arg(long)]
    pub replace_newer: bool,
}

fn parse_mode(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|_| format!("'{s}' is not an octal mode"))
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        if self.verbose_log {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extract_flags() {
        let cli = Cli::parse_from([
            "rezip", "extract", "a.zip", "x.txt", "-d", "out", "--index", "0-2", "--chmod", "644",
        ]);
        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.select.names, vec!["x.txt"]);
                assert_eq!(args.extract_dir, Some(PathBuf::from("out")));
                assert_eq!(args.select.index.as_deref(), Some("0-2"));
                assert_eq!(args.chmod, Some(0o644));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn log_level_follows_flags() {
        let cli = Cli::parse_from(["rezip", "-q", "list", "a.zip"]);
        assert_eq!(cli.log_level(), "error");
        let cli = Cli::parse_from(["rezip", "list", "a.zip", "--verbose-log"]);
        assert_eq!(cli.log_level(), "debug");
    }

    #[test]
    fn create_needs_paths() {
        assert!(Cli::try_parse_from(["rezip", "create", "a.zip"]).is_err());
    }
}
