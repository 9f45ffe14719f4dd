use std::io::{self, Read};

/// A forward-only window over an underlying reader.
///
/// Skips `skip` bytes of the source on first read, then exposes exactly
/// `length` subsequent bytes. Reads past `length` report end-of-stream even
/// if the source has more data. The view never closes the source; ownership
/// stays with the caller (pass `&mut r` to keep using the source afterward).
#[derive(Debug)]
pub struct BoundedReader<R> {
    inner: R,
    skip: u64,
    remaining: u64,
}

impl<R: Read> BoundedReader<R> {
    pub fn new(inner: R, skip: u64, length: u64) -> BoundedReader<R> {
        BoundedReader {
            inner,
            skip,
            remaining: length,
        }
    }

    /// Bytes still exposed by this window.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for BoundedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.skip > 0 {
            skip_fully(&mut self.inner, self.skip)?;
            self.skip = 0;
        }
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(self.remaining as usize);
        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Discard exactly `count` bytes from `reader`, erroring with
/// `UnexpectedEof` if the source ends first.
pub(crate) fn skip_fully<R: Read>(reader: &mut R, count: u64) -> io::Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(count), &mut io::sink())?;
    if skipped < count {
        return Err(crate::Error::Truncated {
            expected: count,
            read: skipped,
        }
        .into());
    }
    Ok(())
}
