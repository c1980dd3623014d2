//! # rezip
//!
//! A self-contained ZIP archive codec.
//!
//! Archives are handled through [`ZipArchive`], a handle on a path. Every
//! mutating operation writes a complete new archive next to the old one and
//! swaps it in only on success, so a failed call leaves the original intact.
//!
//! ## Features
//!
//! - Create, add to, delete from, merge and duplicate archives
//! - Extract to disk or to memory, with path rewriting and conflict policy
//! - Select entries by name, directory, regular expression or index range
//! - STORED and DEFLATE entries, CRC32 verified on extraction
//! - Per-entry status reporting instead of all-or-nothing failures
//!
//! ## Example
//!
//! ```no_run
//! use rezip::{AddOptions, ExtractOptions, Selection, ZipArchive};
//!
//! fn main() -> rezip::Result<()> {
//!     let archive = ZipArchive::new("backup.zip");
//!     archive.create(&["docs", "notes.txt"], &AddOptions::default())?;
//!
//!     for entry in archive.list()? {
//!         println!("{} ({} bytes)", entry.stored_filename, entry.size);
//!     }
//!
//!     let options = ExtractOptions {
//!         selection: Selection::by_name(["notes.txt"]),
//!         extract_as_string: true,
//!         ..Default::default()
//!     };
//!     for result in archive.extract(&options)? {
//!         let text = result.header().content.clone().unwrap_or_default();
//!         println!("{}", String::from_utf8_lossy(&text));
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{Result, ZipError};
pub use io::{LocalFileReader, ReadAt};
pub use zip::{
    AddHook, AddOptions, ArchiveState, EntryHeader, EntryResult, EntryStatus, ExtractHook,
    ExtractOptions, HookAction, IndexRange, Properties, Selection, ZipArchive,
};
