//! ZIP archive reading and writing.
//!
//! ## Architecture
//!
//! - [`structures`]: the fixed-layout records (local header, central
//!   directory header, end of central directory) and DOS timestamps
//! - [`parser`]: locating the EOCD and decoding the central directory
//! - [`writer`]: streaming entries and the central directory into a new file
//! - [`selector`]: by-name, by-regex and by-index entry selection
//! - [`archive`]: the public session API tying the pieces together
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Archives are read from the end: EOCD first, then the central directory.
//! Existing entries are never decoded when an archive is rewritten; their
//! bytes are copied as they are.
//!
//! ## Limitations
//!
//! - STORED and DEFLATE only
//! - No ZIP64, encryption or multi-disk archives

mod archive;
mod extractor;
mod header;
mod hooks;
mod options;
mod parser;
mod selector;
mod structures;
mod writer;

pub use archive::ZipArchive;
pub use extractor::ZipExtractor;
pub use header::{
    ArchiveState, CentralDirectory, EntryHeader, EntryResult, EntryStatus, Properties,
};
pub use hooks::{AddHook, ExtractHook, HookAction, NoHook};
pub use options::{AddOptions, ExtractOptions, reduce_path, to_slash};
pub use parser::ZipParser;
pub use selector::{IndexRange, Rule, Selection, Selector, compile_preg};
pub use structures::*;
pub use writer::EntryWriter;
