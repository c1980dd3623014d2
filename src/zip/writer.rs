//! Serializes entries into an archive being written.
//!
//! The writer owns the output file and tracks the current offset so that
//! every entry's `offset` and the central directory position are exact.
//! Payloads are streamed in [`BLOCK_SIZE`] chunks; the local header is
//! written with placeholder sizes and patched once the payload is done.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};

use flate2::Compression;
use flate2::write::DeflateEncoder;
use tracing::{debug, warn};

use crate::error::{Result, ZipError};
use crate::io::{BLOCK_SIZE, ReadAt, copy_range};

use super::header::{EntryHeader, EntryStatus, fit_u32};
use super::structures::{
    ATTR_DIRECTORY, CompressionMethod, EndOfCentralDirectory, VERSION_DEFLATE, VERSION_STORED,
};

/// Counts bytes passing through to the inner writer.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Feed `source` into `sink` block by block, hashing the plaintext.
fn pump<W: Write>(
    source: &mut File,
    sink: &mut W,
    hasher: &mut crc32fast::Hasher,
) -> std::result::Result<u64, StreamError> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut size = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StreamError::Source(e)),
        };
        hasher.update(&buf[..n]);
        size += n as u64;
        sink.write_all(&buf[..n]).map_err(StreamError::Output)?;
    }
    Ok(size)
}

enum StreamError {
    /// The source could not be read; the entry is abandoned.
    Source(io::Error),
    /// The archive could not be written; the whole operation fails.
    Output(io::Error),
}

pub struct EntryWriter {
    out: BufWriter<File>,
    position: u64,
}

impl EntryWriter {
    /// Start writing at the current end of `file`.
    pub fn new(mut file: File) -> io::Result<Self> {
        let position = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            out: BufWriter::with_capacity(BLOCK_SIZE, file),
            position,
        })
    }

    /// Offset the next byte will be written at.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Copy `len` bytes verbatim from another archive.
    pub fn copy_raw<R: ReadAt + ?Sized>(&mut self, reader: &R, offset: u64, len: u64) -> Result<()> {
        copy_range(reader, offset, len, &mut self.out)?;
        self.position += len;
        Ok(())
    }

    /// Write one entry: a folder, or a file read from `header.filename`.
    ///
    /// Problems reading the source are recorded in the returned header's
    /// status and leave the archive as it was. Failures writing the archive
    /// are returned as errors.
    pub fn write(&mut self, mut header: EntryHeader, compress: bool) -> Result<EntryHeader> {
        if header.is_folder() {
            self.write_folder(&mut header)?;
        } else {
            self.write_file(&mut header, compress)?;
        }
        Ok(header)
    }

    fn write_folder(&mut self, header: &mut EntryHeader) -> Result<()> {
        if !header.stored_filename.ends_with('/') {
            header.stored_filename.push('/');
        }
        header.external |= ATTR_DIRECTORY;
        header.size = 0;
        header.compressed_size = 0;
        header.crc32 = 0;
        header.compression = CompressionMethod::Stored;
        header.version = VERSION_DEFLATE;
        header.version_extracted = VERSION_STORED;
        header.mark_utf8_name();
        header.offset = self.position;

        let local = header.to_local()?;
        local.write_to(&mut self.out)?;
        self.position += local.encoded_len() as u64;
        header.status = EntryStatus::Ok;
        debug!(name = %header.stored_filename, offset = header.offset, "wrote folder entry");
        Ok(())
    }

    fn write_file(&mut self, header: &mut EntryHeader, compress: bool) -> Result<()> {
        let mut source = match File::open(&header.filename) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %header.filename.display(), error = %e, "cannot open source");
                header.status = EntryStatus::ReadError;
                return Ok(());
            }
        };

        header.compression = if compress {
            CompressionMethod::Deflate
        } else {
            CompressionMethod::Stored
        };
        header.version = VERSION_DEFLATE;
        header.version_extracted = if compress { VERSION_DEFLATE } else { VERSION_STORED };
        header.crc32 = 0;
        header.size = 0;
        header.compressed_size = 0;
        header.mark_utf8_name();
        header.offset = self.position;

        let placeholder = header.to_local()?;
        placeholder.write_to(&mut self.out)?;
        let header_len = placeholder.encoded_len() as u64;

        match self.stream_payload(&mut source, compress) {
            Ok((crc32, size, compressed_size)) => {
                header.crc32 = crc32;
                header.size = size;
                header.compressed_size = compressed_size;
                fit_u32(size, "size")?;
                fit_u32(compressed_size, "compressed size")?;
            }
            Err(StreamError::Output(e)) => return Err(e.into()),
            Err(StreamError::Source(e)) => {
                warn!(path = %header.filename.display(), error = %e, "failed reading source");
                self.rewind_to(header.offset)?;
                header.status = EntryStatus::ReadError;
                return Ok(());
            }
        }

        // Patch the local header now that sizes and checksum are known.
        let end = header.offset + header_len + header.compressed_size;
        self.out.seek(SeekFrom::Start(header.offset))?;
        header.to_local()?.write_to(&mut self.out)?;
        self.out.seek(SeekFrom::Start(end))?;
        self.position = end;
        header.status = EntryStatus::Ok;

        debug!(
            name = %header.stored_filename,
            size = header.size,
            compressed = header.compressed_size,
            "wrote file entry"
        );
        Ok(())
    }

    /// Returns (crc32 of the plaintext, plaintext size, bytes written).
    fn stream_payload(
        &mut self,
        source: &mut File,
        compress: bool,
    ) -> std::result::Result<(u32, u64, u64), StreamError> {
        let mut hasher = crc32fast::Hasher::new();
        let mut counter = CountingWriter {
            inner: &mut self.out,
            count: 0,
        };

        let size = if compress {
            let mut encoder = DeflateEncoder::new(&mut counter, Compression::default());
            let size = pump(source, &mut encoder, &mut hasher)?;
            encoder.finish().map_err(StreamError::Output)?;
            size
        } else {
            pump(source, &mut counter, &mut hasher)?
        };

        Ok((hasher.finalize(), size, counter.count))
    }

    fn rewind_to(&mut self, offset: u64) -> Result<()> {
        self.out.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Emit the central directory record of an already written entry.
    pub fn write_central(&mut self, header: &EntryHeader) -> Result<()> {
        let record = header.to_central()?;
        record.write_to(&mut self.out)?;
        self.position += record.encoded_len() as u64;
        Ok(())
    }

    /// Write the trailer for a directory that started at `cd_offset` and
    /// holds `entries` records, then flush and cut the file at the end.
    pub fn finish(mut self, entries: usize, cd_offset: u64, comment: Vec<u8>) -> Result<File> {
        let entries = u16::try_from(entries)
            .map_err(|_| ZipError::format(format!("{entries} entries need ZIP64")))?;
        let cd_size = fit_u32(self.position - cd_offset, "central directory size")?;
        let cd_offset = fit_u32(cd_offset, "central directory offset")?;
        if comment.len() > u16::MAX as usize {
            return Err(ZipError::parameter("archive comment exceeds 65535 bytes"));
        }

        let eocd = EndOfCentralDirectory::new(entries, cd_size, cd_offset, comment);
        eocd.write_to(&mut self.out)?;
        self.position += eocd.encoded_len() as u64;

        let file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.set_len(self.position)?;
        file.sync_all()?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::structures::{CentralFileHeader, LocalFileHeader};
    use std::fs;
    use std::path::Path;

    fn create_output(path: &Path) -> io::Result<File> {
        File::options().read(true).write(true).create(true).truncate(true).open(path)
    }

    fn file_header(path: &Path, stored: &str) -> EntryHeader {
        EntryHeader {
            filename: path.to_path_buf(),
            stored_filename: stored.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn deflated_entry_has_plaintext_crc() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"hello").unwrap();

        let out = tempfile::tempfile().unwrap();
        let mut writer = EntryWriter::new(out).unwrap();
        let header = writer.write(file_header(&src, "a.txt"), true).unwrap();

        assert_eq!(header.status, EntryStatus::Ok);
        assert_eq!(header.crc32, crc32fast::hash(b"hello"));
        assert_eq!(header.size, 5);
        assert_eq!(header.compression, CompressionMethod::Deflate);
        assert_eq!(header.offset, 0);
        assert_eq!(writer.position(), 35 + header.compressed_size);
    }

    #[test]
    fn local_header_is_patched() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.bin");
        fs::write(&src, vec![7u8; 10_000]).unwrap();
        let archive = dir.path().join("out.zip");

        let mut writer = EntryWriter::new(create_output(&archive).unwrap()).unwrap();
        let header = writer.write(file_header(&src, "data.bin"), false).unwrap();
        let cd_offset = writer.position();
        writer.write_central(&header).unwrap();
        writer.finish(1, cd_offset, Vec::new()).unwrap();

        let bytes = fs::read(&archive).unwrap();
        let local = LocalFileHeader::from_bytes(&bytes).unwrap();
        assert_eq!(local.compressed_size, 10_000);
        assert_eq!(local.uncompressed_size, 10_000);
        assert_eq!(local.crc32, crc32fast::hash(&vec![7u8; 10_000]));
        assert_eq!(&bytes[38..38 + 10_000], &vec![7u8; 10_000][..]);

        let (central, _) = CentralFileHeader::from_bytes(&bytes[cd_offset as usize..]).unwrap();
        assert_eq!(central.lfh_offset, 0);
        assert_eq!(bytes.len() as u64, cd_offset + central.encoded_len() as u64 + 22);
    }

    #[test]
    fn folder_entry_gets_slash_and_attribute() {
        let out = tempfile::tempfile().unwrap();
        let mut writer = EntryWriter::new(out).unwrap();
        let mut header = file_header(Path::new("docs"), "docs");
        header.external = ATTR_DIRECTORY;
        let header = writer.write(header, true).unwrap();

        assert_eq!(header.stored_filename, "docs/");
        assert_eq!(header.size, 0);
        assert_eq!(header.compressed_size, 0);
        assert_eq!(header.compression, CompressionMethod::Stored);
        assert_eq!(writer.position(), 35);
    }

    #[test]
    fn unreadable_source_is_read_error() {
        let out = tempfile::tempfile().unwrap();
        let mut writer = EntryWriter::new(out).unwrap();
        let header = writer
            .write(file_header(Path::new("/definitely/not/here"), "x"), true)
            .unwrap();
        assert_eq!(header.status, EntryStatus::ReadError);
        assert_eq!(writer.position(), 0);
    }
}
