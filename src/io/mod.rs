//! Filesystem abstraction used by the codec.
//!
//! Archives are never loaded whole: the parser and the session read them
//! through [`ReadAt`] and move payload bytes in [`BLOCK_SIZE`] chunks.

mod fs;
mod local;
mod section;

pub use fs::{is_read_only, modified_secs, persist, set_mode, set_modified};
pub use local::LocalFileReader;
pub use section::SectionReader;

use std::io::{self, Write};

/// Size of the buffer used for every streamed copy.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Trait for random access reading from a data source
pub trait ReadAt {
    /// Read data at the specified offset into the buffer
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely or fail with `UnexpectedEof`.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ));
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Copy `len` bytes starting at `offset` into `out`, one block at a time.
pub fn copy_range<R, W>(reader: &R, offset: u64, len: u64, out: &mut W) -> io::Result<()>
where
    R: ReadAt + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; BLOCK_SIZE.min(len as usize).max(1)];
    let mut done = 0u64;
    while done < len {
        let chunk = (len - done).min(buf.len() as u64) as usize;
        reader.read_exact_at(offset + done, &mut buf[..chunk])?;
        out.write_all(&buf[..chunk])?;
        done += chunk as u64;
    }
    Ok(())
}
