use std::io::{self, Read};

use crate::bounded::skip_fully;
use crate::Error;

/// A byte range within a larger file, addressed from the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    pub offset: u64,
    pub length: u64,
}

impl BlockEntry {
    pub fn new(offset: u64, length: u64) -> BlockEntry {
        BlockEntry { offset, length }
    }
}

/// Concatenates an ordered list of byte ranges of a forward-only source
/// into one logical stream.
///
/// Blocks are consumed in the order given, not sorted by offset. The source
/// is repositioned by skipping forward to each block's start; a block whose
/// start lies behind the cursor is unreachable and reads fail with a format
/// error. Callers must supply forward-reachable orderings or a source that
/// supports restart.
#[derive(Debug)]
pub struct BlockReader<R> {
    inner: R,
    blocks: std::vec::IntoIter<BlockEntry>,
    pos: u64,
    remaining: u64,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R, blocks: Vec<BlockEntry>) -> BlockReader<R> {
        BlockReader {
            inner,
            blocks: blocks.into_iter(),
            pos: 0,
            remaining: 0,
        }
    }

    fn advance(&mut self) -> io::Result<bool> {
        loop {
            let block = match self.blocks.next() {
                Some(block) => block,
                None => return Ok(false),
            };
            if block.offset < self.pos {
                return Err(Error::format(format!(
                    "block at offset {} lies behind cursor {}",
                    block.offset, self.pos
                ))
                .into());
            }
            skip_fully(&mut self.inner, block.offset - self.pos)?;
            self.pos = block.offset;
            if block.length > 0 {
                self.remaining = block.length;
                return Ok(true);
            }
        }
    }
}

impl<R: Read> Read for BlockReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 && !self.advance()? {
            return Ok(0);
        }
        let max = buf.len().min(self.remaining as usize);
        let n = self.inner.read(&mut buf[..max])?;
        self.pos += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}
