use std::io::{self, Read};

use super::ReadAt;

/// Sequential [`Read`] over a bounded window of a [`ReadAt`] source.
///
/// Used to feed an entry's payload into a decoder without copying it out
/// of the archive first.
pub struct SectionReader<'a, R: ReadAt + ?Sized> {
    inner: &'a R,
    pos: u64,
    end: u64,
}

impl<'a, R: ReadAt + ?Sized> SectionReader<'a, R> {
    pub fn new(inner: &'a R, offset: u64, len: u64) -> Self {
        Self {
            inner,
            pos: offset,
            end: offset.saturating_add(len),
        }
    }
}

impl<R: ReadAt + ?Sized> Read for SectionReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end || buf.is_empty() {
            return Ok(0);
        }
        let want = (self.end - self.pos).min(buf.len() as u64) as usize;
        let n = self.inner.read_at(self.pos, &mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ended inside an entry payload",
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}
