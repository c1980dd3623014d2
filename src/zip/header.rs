use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, ZipError};

use super::structures::{
    ATTR_DIRECTORY, CentralFileHeader, CompressionMethod, DosDateTime, EndOfCentralDirectory,
    FLAG_UTF8, LocalFileHeader,
};

/// Outcome of one entry inside a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Ok,
    /// A hook asked for the entry to be left out.
    Skipped,
    /// Left out by the operation itself (self-inclusion, empty name, ...).
    Filtered,
    AlreadyADirectory,
    WriteProtected,
    NewerExist,
    PathCreationFail,
    WriteError,
    ReadError,
    InvalidHeader,
    FilenameTooLong,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Ok => "ok",
            EntryStatus::Skipped => "skipped",
            EntryStatus::Filtered => "filtered",
            EntryStatus::AlreadyADirectory => "already_a_directory",
            EntryStatus::WriteProtected => "write_protected",
            EntryStatus::NewerExist => "newer_exist",
            EntryStatus::PathCreationFail => "path_creation_fail",
            EntryStatus::WriteError => "write_error",
            EntryStatus::ReadError => "read_error",
            EntryStatus::InvalidHeader => "invalid_header",
            EntryStatus::FilenameTooLong => "filename_too_long",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one archived item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Filesystem path: the source when adding, the target when extracting.
    pub filename: PathBuf,
    /// Path recorded inside the archive, `/`-separated.
    pub stored_filename: String,
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
    /// Seconds since the epoch, two-second resolution.
    pub mtime: i64,
    pub modified: DosDateTime,
    pub compression: CompressionMethod,
    pub flag: u16,
    pub internal: u16,
    pub external: u32,
    pub version: u16,
    pub version_extracted: u16,
    pub disk: u16,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
    /// Position of the local header within the archive.
    pub offset: u64,
    /// Position in the central directory, once known.
    pub index: Option<usize>,
    pub status: EntryStatus,
    /// Payload, filled only by `extract_as_string`.
    pub content: Option<Vec<u8>>,
}

impl Default for EntryHeader {
    fn default() -> Self {
        Self {
            filename: PathBuf::new(),
            stored_filename: String::new(),
            size: 0,
            compressed_size: 0,
            crc32: 0,
            mtime: DosDateTime::MIN.to_unix(),
            modified: DosDateTime::MIN,
            compression: CompressionMethod::Stored,
            flag: 0,
            internal: 0,
            external: 0,
            version: 0,
            version_extracted: 0,
            disk: 0,
            extra: Vec::new(),
            comment: Vec::new(),
            offset: 0,
            index: None,
            status: EntryStatus::Ok,
            content: None,
        }
    }
}

impl EntryHeader {
    pub fn is_folder(&self) -> bool {
        self.external & ATTR_DIRECTORY != 0
    }

    pub fn is_ok(&self) -> bool {
        self.status == EntryStatus::Ok
    }

    /// Set the modification time from seconds since the epoch.
    pub fn set_mtime(&mut self, secs: i64) {
        self.modified = DosDateTime::from_unix(secs);
        self.mtime = self.modified.to_unix();
    }

    /// Build a header from a parsed central directory record.
    ///
    /// Older encoders did not set the directory attribute on folders; a
    /// stored name ending in `/` is taken as a folder regardless.
    pub fn from_central(record: &CentralFileHeader, index: usize) -> Self {
        let stored_filename = String::from_utf8_lossy(&record.file_name).into_owned();
        let mut external = record.external_attrs;
        if stored_filename.ends_with('/') {
            external |= ATTR_DIRECTORY;
        }

        Self {
            filename: PathBuf::from(&stored_filename),
            stored_filename,
            size: record.uncompressed_size as u64,
            compressed_size: record.compressed_size as u64,
            crc32: record.crc32,
            mtime: record.modified.to_unix(),
            modified: record.modified,
            compression: CompressionMethod::from_u16(record.compression),
            flag: record.flags,
            internal: record.internal_attrs,
            external,
            version: record.version_made_by,
            version_extracted: record.version_needed,
            disk: record.disk_number_start,
            extra: record.extra.clone(),
            comment: record.comment.clone(),
            offset: record.lfh_offset as u64,
            index: Some(index),
            status: EntryStatus::Ok,
            content: None,
        }
    }

    /// Central directory record for this entry at its current `offset`.
    pub fn to_central(&self) -> Result<CentralFileHeader> {
        Ok(CentralFileHeader {
            version_made_by: self.version,
            version_needed: self.version_extracted,
            flags: self.flag,
            compression: self.compression.as_u16(),
            modified: self.modified,
            crc32: self.crc32,
            compressed_size: fit_u32(self.compressed_size, "compressed size")?,
            uncompressed_size: fit_u32(self.size, "size")?,
            disk_number_start: self.disk,
            internal_attrs: self.internal,
            external_attrs: self.external,
            lfh_offset: fit_u32(self.offset, "local header offset")?,
            file_name: self.stored_filename.as_bytes().to_vec(),
            extra: self.extra.clone(),
            comment: self.comment.clone(),
        })
    }

    /// Local header matching this entry's current sizes and checksum.
    pub fn to_local(&self) -> Result<LocalFileHeader> {
        Ok(LocalFileHeader {
            version_needed: self.version_extracted,
            flags: self.flag,
            compression: self.compression.as_u16(),
            modified: self.modified,
            crc32: self.crc32,
            compressed_size: fit_u32(self.compressed_size, "compressed size")?,
            uncompressed_size: fit_u32(self.size, "size")?,
            file_name: self.stored_filename.as_bytes().to_vec(),
            extra: self.extra.clone(),
        })
    }

    /// Set the UTF-8 name flag when the stored name is not plain ASCII.
    pub(crate) fn mark_utf8_name(&mut self) {
        if self.stored_filename.is_ascii() {
            self.flag &= !FLAG_UTF8;
        } else {
            self.flag |= FLAG_UTF8;
        }
    }
}

pub(crate) fn fit_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| ZipError::format(format!("{what} {value} needs ZIP64")))
}

/// Tagged per-entry result of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryResult {
    Ok(EntryHeader),
    Failed(EntryHeader, EntryStatus),
}

impl EntryResult {
    pub fn header(&self) -> &EntryHeader {
        match self {
            EntryResult::Ok(h) | EntryResult::Failed(h, _) => h,
        }
    }

    pub fn into_header(self) -> EntryHeader {
        match self {
            EntryResult::Ok(h) | EntryResult::Failed(h, _) => h,
        }
    }

    pub fn status(&self) -> EntryStatus {
        match self {
            EntryResult::Ok(_) => EntryStatus::Ok,
            EntryResult::Failed(_, status) => *status,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, EntryResult::Ok(_))
    }
}

impl From<EntryHeader> for EntryResult {
    fn from(header: EntryHeader) -> Self {
        match header.status {
            EntryStatus::Ok => EntryResult::Ok(header),
            status => EntryResult::Failed(header, status),
        }
    }
}

/// Location and size of the central directory, plus the archive comment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CentralDirectory {
    pub entries: usize,
    pub size: u64,
    pub offset: u64,
    pub comment: Vec<u8>,
}

impl From<&EndOfCentralDirectory> for CentralDirectory {
    fn from(eocd: &EndOfCentralDirectory) -> Self {
        Self {
            entries: eocd.total_entries as usize,
            size: eocd.cd_size as u64,
            offset: eocd.cd_offset as u64,
            comment: eocd.comment.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Ok,
    Missing,
}

/// Archive-level summary returned by `properties()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Properties {
    pub entries: usize,
    pub comment: String,
    /// Size of the central directory in bytes.
    pub cd_size: u64,
    /// Where the central directory starts; also the end of entry data.
    pub cd_offset: u64,
    pub state: ArchiveState,
}
