//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Read the Central Directory to get metadata for all files
//! 3. For extraction or raw copies, read each entry's Local File Header

use tracing::debug;

use crate::error::{Result, ZipError};
use crate::io::ReadAt;

use super::header::{CentralDirectory, EntryHeader};
use super::structures::*;

/// Low-level ZIP file parser.
///
/// Generic over the reader type; the session uses it with
/// [`LocalFileReader`](crate::io::LocalFileReader).
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: R,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: R) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Probes the common no-comment layout first, then scans backwards over
    /// the last 65,557 bytes one position at a time. A candidate is only
    /// accepted when its comment length reaches exactly to the end of the
    /// file.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let fixed = EndOfCentralDirectory::SIZE as u64;
        if self.size < fixed {
            return Err(ZipError::format("EOCD not found"));
        }

        let offset = self.size - fixed;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf)?;
        if EndOfCentralDirectory::comment_len(&buf).is_ok_and(|len| len == 0) {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        let search_size = (EndOfCentralDirectory::MAX_SIZE as u64).min(self.size);
        let search_start = self.size - search_size;
        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf)?;

        let mut mismatched = false;
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            let Ok(comment_len) = EndOfCentralDirectory::comment_len(&buf[i..]) else {
                continue;
            };
            if i + EndOfCentralDirectory::SIZE + comment_len == buf.len() {
                let eocd = EndOfCentralDirectory::from_bytes(&buf[i..])?;
                return Ok((eocd, search_start + i as u64));
            }
            mismatched = true;
        }

        if mismatched {
            Err(ZipError::format("EOCD comment size does not match file length"))
        } else {
            Err(ZipError::format("EOCD not found"))
        }
    }

    /// Read the central directory summary and every entry it lists.
    ///
    /// Entries get dense indexes in directory order.
    pub fn read_directory(&self) -> Result<(CentralDirectory, Vec<EntryHeader>)> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        if eocd.disk_number != 0 || eocd.disk_with_cd != 0 || eocd.disk_entries != eocd.total_entries {
            return Err(ZipError::format("multi-disk archives are not supported"));
        }
        let cd_offset = eocd.cd_offset as u64;
        let cd_size = eocd.cd_size as u64;
        if cd_offset + cd_size > eocd_offset {
            return Err(ZipError::format(format!(
                "central directory ({cd_size} bytes at {cd_offset}) overlaps its trailer at {eocd_offset}"
            )));
        }

        // Read the entire Central Directory in one request
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data)?;

        let total = eocd.total_entries as usize;
        let mut entries = Vec::with_capacity(total);
        let mut pos = 0usize;
        for index in 0..total {
            let (record, used) = CentralFileHeader::from_bytes(&cd_data[pos..])?;
            entries.push(EntryHeader::from_central(&record, index));
            pos += used;
        }
        debug!(entries = total, cd_offset, cd_size, "read central directory");

        Ok((CentralDirectory::from(&eocd), entries))
    }

    /// Read the Local File Header of an entry.
    pub fn read_local_header(&self, entry: &EntryHeader) -> Result<LocalFileHeader> {
        let mut fixed = vec![0u8; LocalFileHeader::SIZE];
        self.reader
            .read_exact_at(entry.offset, &mut fixed)
            .map_err(|_| ZipError::format(format!("local header of '{}' is truncated", entry.stored_filename)))?;
        let variable = LocalFileHeader::variable_len(&fixed)?;

        let mut full = fixed;
        full.resize(LocalFileHeader::SIZE + variable, 0);
        self.reader
            .read_exact_at(entry.offset + LocalFileHeader::SIZE as u64, &mut full[LocalFileHeader::SIZE..])
            .map_err(|_| ZipError::format(format!("local header of '{}' is truncated", entry.stored_filename)))?;
        LocalFileHeader::from_bytes(&full)
    }

    /// Offset where an entry's payload begins, given its local header.
    pub fn data_offset(entry: &EntryHeader, local: &LocalFileHeader) -> u64 {
        entry.offset + local.encoded_len() as u64
    }

    /// Total bytes occupied by an entry before the central directory:
    /// local header, payload and, when flagged, the data descriptor.
    pub fn entry_span(&self, entry: &EntryHeader) -> Result<u64> {
        let local = self.read_local_header(entry)?;
        let mut span = local.encoded_len() as u64 + entry.compressed_size;

        if local.flags & FLAG_DATA_DESCRIPTOR != 0 {
            let mut sig = [0u8; 4];
            self.reader.read_exact_at(entry.offset + span, &mut sig)?;
            span += if u32::from_le_bytes(sig) == DATA_DESCRIPTOR_SIGNATURE { 16 } else { 12 };
        }
        Ok(span)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Bytes(Vec<u8>);

    impl ReadAt for Bytes {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }
    }

    /// One stored entry "a.txt" = "hello", then directory and trailer.
    fn tiny_archive(comment: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let local = LocalFileHeader {
            version_needed: VERSION_STORED,
            compression: 0,
            crc32: crc32fast::hash(b"hello"),
            compressed_size: 5,
            uncompressed_size: 5,
            file_name: b"a.txt".to_vec(),
            ..Default::default()
        };
        local.write_to(&mut out).unwrap();
        out.extend_from_slice(b"hello");

        let cd_offset = out.len() as u32;
        let central = CentralFileHeader {
            version_made_by: VERSION_DEFLATE,
            version_needed: VERSION_STORED,
            crc32: local.crc32,
            compressed_size: 5,
            uncompressed_size: 5,
            file_name: b"a.txt".to_vec(),
            ..Default::default()
        };
        central.write_to(&mut out).unwrap();
        let cd_size = out.len() as u32 - cd_offset;
        EndOfCentralDirectory::new(1, cd_size, cd_offset, comment.to_vec())
            .write_to(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn finds_eocd_without_comment() {
        let data = tiny_archive(b"");
        let len = data.len() as u64;
        let parser = ZipParser::new(Bytes(data));
        let (eocd, offset) = parser.find_eocd().unwrap();
        assert_eq!(offset, len - 22);
        assert_eq!(eocd.total_entries, 1);
    }

    #[test]
    fn finds_eocd_behind_comment() {
        let parser = ZipParser::new(Bytes(tiny_archive(b"archive comment with PK\x05\x06 inside")));
        let (dir, entries) = parser.read_directory().unwrap();
        assert_eq!(dir.comment, b"archive comment with PK\x05\x06 inside");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].stored_filename, "a.txt");
        assert_eq!(entries[0].index, Some(0));
    }

    #[test]
    fn missing_eocd_is_format_error() {
        let parser = ZipParser::new(Bytes(vec![0u8; 100]));
        let err = parser.find_eocd().unwrap_err();
        assert!(matches!(err, ZipError::Format(ref m) if m == "EOCD not found"));

        let parser = ZipParser::new(Bytes(b"PK".to_vec()));
        assert!(matches!(parser.find_eocd(), Err(ZipError::Format(_))));
    }

    #[test]
    fn trailing_garbage_is_comment_mismatch() {
        let mut data = tiny_archive(b"");
        data.extend_from_slice(b"junk");
        let parser = ZipParser::new(Bytes(data));
        let err = parser.find_eocd().unwrap_err();
        assert!(matches!(err, ZipError::Format(ref m) if m.contains("comment size")));
    }

    #[test]
    fn entry_span_covers_header_and_payload() {
        let parser = ZipParser::new(Bytes(tiny_archive(b"")));
        let (dir, entries) = parser.read_directory().unwrap();
        assert_eq!(parser.entry_span(&entries[0]).unwrap(), dir.offset);
        let local = parser.read_local_header(&entries[0]).unwrap();
        assert_eq!(ZipParser::<Bytes>::data_offset(&entries[0], &local), 35);
    }

    /// Two stored entries with bit 3 set: "a.txt" trailed by a signed
    /// descriptor, "b.txt" by an unsigned one.
    fn descriptor_archive() -> Vec<u8> {
        let mut out = Vec::new();
        let mut records = Vec::new();
        for (name, data, signed) in [("a.txt", &b"hello"[..], true), ("b.txt", &b"world!"[..], false)] {
            let offset = out.len() as u32;
            let crc32 = crc32fast::hash(data);
            let len = data.len() as u32;
            LocalFileHeader {
                version_needed: VERSION_STORED,
                flags: FLAG_DATA_DESCRIPTOR,
                file_name: name.as_bytes().to_vec(),
                ..Default::default()
            }
            .write_to(&mut out)
            .unwrap();
            out.extend_from_slice(data);
            if signed {
                out.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
            }
            for field in [crc32, len, len] {
                out.extend_from_slice(&field.to_le_bytes());
            }
            records.push(CentralFileHeader {
                version_made_by: VERSION_DEFLATE,
                version_needed: VERSION_STORED,
                flags: FLAG_DATA_DESCRIPTOR,
                crc32,
                compressed_size: len,
                uncompressed_size: len,
                lfh_offset: offset,
                file_name: name.as_bytes().to_vec(),
                ..Default::default()
            });
        }
        let cd_offset = out.len() as u32;
        for record in &records {
            record.write_to(&mut out).unwrap();
        }
        let cd_size = out.len() as u32 - cd_offset;
        EndOfCentralDirectory::new(2, cd_size, cd_offset, Vec::new())
            .write_to(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn entry_span_includes_data_descriptor() {
        let parser = ZipParser::new(Bytes(descriptor_archive()));
        let (dir, entries) = parser.read_directory().unwrap();

        let signed = parser.entry_span(&entries[0]).unwrap();
        let unsigned = parser.entry_span(&entries[1]).unwrap();
        assert_eq!(signed, 30 + 5 + 5 + 16);
        assert_eq!(unsigned, 30 + 5 + 6 + 12);
        assert_eq!(entries[1].offset, signed);
        assert_eq!(signed + unsigned, dir.offset);
    }

    #[test]
    fn directory_overlapping_trailer_is_rejected() {
        let mut data = tiny_archive(b"");
        let n = data.len();
        // Inflate cd_size past the EOCD.
        data[n - 10..n - 6].copy_from_slice(&500u32.to_le_bytes());
        let parser = ZipParser::new(Bytes(data));
        assert!(matches!(parser.read_directory(), Err(ZipError::Format(_))));
    }
}
