use std::fs::{self, File};
use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use tracing::{debug, warn};

use crate::error::{Result, ZipError};
use crate::io::{self as zio, BLOCK_SIZE, ReadAt, SectionReader};

use super::header::{EntryHeader, EntryStatus};
use super::hooks::{ExtractHook, HookAction};
use super::options::{ExtractOptions, TargetError};
use super::parser::ZipParser;
use super::structures::{CompressionMethod, LocalFileHeader};

enum DecodeError {
    /// Archive bytes unreadable or not a valid stream for the method.
    Read(io::Error),
    /// Destination refused the bytes.
    Write(io::Error),
    Unsupported(u16),
    Mismatch,
}

/// Writes selected entries of one archive to disk or memory.
pub struct ZipExtractor<'a, R: ReadAt> {
    parser: &'a ZipParser<R>,
    options: &'a ExtractOptions,
}

impl<'a, R: ReadAt> ZipExtractor<'a, R> {
    pub fn new(parser: &'a ZipParser<R>, options: &'a ExtractOptions) -> Self {
        Self { parser, options }
    }

    /// Extract one entry, recording the outcome in its status.
    ///
    /// Only failures to read the archive itself are returned as errors.
    pub fn extract(&self, mut header: EntryHeader, hook: &mut dyn ExtractHook) -> Result<EntryHeader> {
        if self.options.extract_as_string {
            header.filename = header.stored_filename.clone().into();
        } else {
            match self.options.target_path(&header.stored_filename, header.is_folder()) {
                Ok(target) => header.filename = target,
                Err(TargetError::Empty) => {
                    header.status = EntryStatus::Filtered;
                    return Ok(header);
                }
                Err(TargetError::Escapes) => {
                    warn!(name = %header.stored_filename, "entry escapes the destination, not extracted");
                    header.status = EntryStatus::PathCreationFail;
                    return Ok(header);
                }
            }
        }

        let view = header.clone();
        if hook.pre_extract(&view, &mut header.filename) == HookAction::Skip {
            header.status = EntryStatus::Skipped;
            return Ok(header);
        }

        let local = match self.parser.read_local_header(&header) {
            Ok(local) => local,
            Err(ZipError::Format(msg)) => {
                warn!(name = %header.stored_filename, %msg, "bad local header");
                header.status = EntryStatus::InvalidHeader;
                return Ok(header);
            }
            Err(e) => return Err(e),
        };
        if local.compression != header.compression.as_u16() {
            warn!(name = %header.stored_filename, "local and central compression method disagree");
            header.status = EntryStatus::InvalidHeader;
            return Ok(header);
        }

        if self.options.extract_as_string {
            self.extract_to_memory(&mut header, &local);
        } else if header.is_folder() {
            self.extract_folder(&mut header);
        } else {
            self.extract_to_file(&mut header, &local);
        }

        if header.status != EntryStatus::Ok {
            warn!(name = %header.stored_filename, status = %header.status, "entry not extracted");
        }
        hook.post_extract(&header);
        Ok(header)
    }

    fn extract_to_memory(&self, header: &mut EntryHeader, local: &LocalFileHeader) {
        if header.is_folder() {
            header.content = Some(Vec::new());
            return;
        }
        // The declared size is untrusted until the CRC check passes.
        let mut buf = Vec::with_capacity(header.size.min(BLOCK_SIZE as u64) as usize);
        match self.decode(header, local, &mut buf) {
            Ok(()) => {
                header.content = Some(buf);
                header.status = EntryStatus::Ok;
            }
            Err(e) => header.status = status_for(&e),
        }
    }

    fn extract_folder(&self, header: &mut EntryHeader) {
        let target = header.filename.clone();
        match fs::metadata(&target) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                header.status = EntryStatus::PathCreationFail;
                return;
            }
            Err(_) => {
                if let Err(e) = fs::create_dir_all(&target) {
                    warn!(path = %target.display(), error = %e, "cannot create directory");
                    header.status = EntryStatus::PathCreationFail;
                    return;
                }
            }
        }
        debug!(path = %target.display(), "created folder");
        header.status = EntryStatus::Ok;
    }

    fn extract_to_file(&self, header: &mut EntryHeader, local: &LocalFileHeader) {
        let target = header.filename.clone();

        if let Ok(meta) = fs::metadata(&target) {
            if meta.is_dir() {
                header.status = EntryStatus::AlreadyADirectory;
                return;
            }
            if zio::is_read_only(&meta) {
                header.status = EntryStatus::WriteProtected;
                return;
            }
            if !self.options.replace_newer
                && zio::modified_secs(&meta).is_ok_and(|secs| secs > header.mtime)
            {
                header.status = EntryStatus::NewerExist;
                return;
            }
        }

        // Create parent directories if needed
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warn!(path = %parent.display(), error = %e, "cannot create parent directory");
            header.status = EntryStatus::PathCreationFail;
            return;
        }

        let mut file = match File::create(&target) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %target.display(), error = %e, "cannot create output file");
                header.status = EntryStatus::WriteError;
                return;
            }
        };

        let decoded = self
            .decode(header, local, &mut file)
            .and_then(|()| file.flush().map_err(DecodeError::Write));
        drop(file);
        if let Err(e) = decoded {
            let _ = fs::remove_file(&target);
            header.status = status_for(&e);
            return;
        }

        if let Err(e) = zio::set_modified(&target, header.mtime) {
            warn!(path = %target.display(), error = %e, "cannot set modification time");
        }
        if let Some(mode) = self.options.set_chmod
            && let Err(e) = zio::set_mode(&target, mode)
        {
            warn!(path = %target.display(), error = %e, "cannot change permissions");
        }

        debug!(path = %target.display(), size = header.size, "extracted file");
        header.status = EntryStatus::Ok;
    }

    /// Stream the payload through the right decoder into `sink`, checking
    /// size and CRC32 of the plaintext.
    fn decode<W: Write>(
        &self,
        header: &EntryHeader,
        local: &LocalFileHeader,
        sink: &mut W,
    ) -> std::result::Result<(), DecodeError> {
        let data_offset = ZipParser::<R>::data_offset(header, local);
        let raw = SectionReader::new(self.parser.reader(), data_offset, header.compressed_size);

        let mut source: Box<dyn Read + '_> = match header.compression {
            CompressionMethod::Stored => Box::new(raw),
            CompressionMethod::Deflate => Box::new(DeflateDecoder::new(raw)),
            CompressionMethod::Unknown(method) => return Err(DecodeError::Unsupported(method)),
        };

        let mut hasher = crc32fast::Hasher::new();
        let mut size = 0u64;
        let mut buf = vec![0u8; BLOCK_SIZE];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Read(e)),
            };
            hasher.update(&buf[..n]);
            size += n as u64;
            sink.write_all(&buf[..n]).map_err(DecodeError::Write)?;
        }

        if size != header.size || hasher.finalize() != header.crc32 {
            return Err(DecodeError::Mismatch);
        }
        Ok(())
    }
}

fn status_for(err: &DecodeError) -> EntryStatus {
    match err {
        DecodeError::Read(e) => {
            warn!(error = %e, "cannot read entry payload");
            EntryStatus::ReadError
        }
        DecodeError::Unsupported(method) => {
            warn!(method, "unsupported compression method");
            EntryStatus::ReadError
        }
        DecodeError::Mismatch => {
            warn!("payload size or CRC32 mismatch");
            EntryStatus::ReadError
        }
        DecodeError::Write(e) => {
            warn!(error = %e, "cannot write extracted data");
            EntryStatus::WriteError
        }
    }
}
