//! XAR container reading.
//!
//! A container starts with a fixed 28-byte big-endian header, followed by a
//! zlib-compressed XML table of contents and then the heap, the byte region
//! holding every entry's payload. Entry offsets are relative to the start of
//! the heap.
//!
//! The reader works over a forward-only source. It keeps one shared cursor,
//! so opening an entry first brings the cursor to where a fully drained
//! previous entry stream would have left it, and an entry at or behind the
//! cursor forces a restart: the source is reopened from byte zero and the
//! header and TOC are skipped again. The `&mut self` receiver on
//! [`XarReader::open_entry`] serializes access, and the returned stream
//! borrows the reader for as long as it lives.

mod entry;
mod toc;

use std::collections::HashMap;
use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt};
use bzip2::read::BzDecoder;
use flate2::read::{GzDecoder, ZlibDecoder};
use tracing::debug;

use crate::bounded::{skip_fully, BoundedReader};
use crate::error::{self, Error, Result};

pub use entry::{ChecksumKind, EntryChecksum, EntryCompression, XarEntry};
use entry::DigestReader;

const XAR_MAGIC: u32 = 0x7861_7221; // "xar!"
const HEADER_LEN: u64 = 28;

/// bzip2 entries carry a fixed two-byte prefix before the compressed stream.
const BZIP2_PREFIX_LEN: u64 = 2;

struct XarHeader {
    size: u16,
    toc_compressed: u64,
    toc_uncompressed: u64,
    checksum: ChecksumKind,
}

impl XarHeader {
    fn read<R: Read>(source: &mut R) -> Result<XarHeader> {
        let mut raw = [0u8; HEADER_LEN as usize];
        source.read_exact(&mut raw).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::format("file too short for a container header")
            } else {
                error::from_io(e)
            }
        })?;

        let mut raw = &raw[..];
        let magic = raw.read_u32::<BigEndian>()?;
        if magic != XAR_MAGIC {
            return Err(Error::format(format!("bad container magic {:#010x}", magic)));
        }
        let size = raw.read_u16::<BigEndian>()?;
        if (size as u64) < HEADER_LEN {
            return Err(Error::format(format!("declared header size {} too small", size)));
        }
        let version = raw.read_u16::<BigEndian>()?;
        let toc_compressed = raw.read_u64::<BigEndian>()?;
        let toc_uncompressed = raw.read_u64::<BigEndian>()?;
        let checksum = ChecksumKind::from_selector(raw.read_u32::<BigEndian>()?)?;
        debug!(
            size,
            version,
            checksum = checksum.as_str(),
            "parsed container header"
        );

        Ok(XarHeader {
            size,
            toc_compressed,
            toc_uncompressed,
            checksum,
        })
    }
}

/// Tracks how many bytes have been consumed from the underlying source, so
/// the reader always knows where the shared cursor is.
struct CountingReader<R> {
    inner: R,
    pos: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> CountingReader<R> {
        CountingReader { inner, pos: 0 }
    }

    fn position(&self) -> u64 {
        self.pos
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Reads named entries out of a XAR container.
///
/// `reopen` produces a fresh stream over the container from byte zero each
/// time it is called; the reader calls it once on construction and again
/// whenever an entry behind the cursor forces a restart.
pub struct XarReader<R, F> {
    reopen: F,
    source: CountingReader<R>,
    heap_start: u64,
    entries: HashMap<String, XarEntry>,
    /// Heap-relative end of the most recently opened entry.
    last_opened_end: Option<u64>,
}

impl<R, F> XarReader<R, F>
where
    R: Read,
    F: FnMut() -> Result<R>,
{
    pub fn new(mut reopen: F) -> Result<XarReader<R, F>> {
        let mut source = CountingReader::new(reopen()?);
        let header = XarHeader::read(&mut source)?;
        if header.size as u64 > HEADER_LEN {
            skip_fully(&mut source, header.size as u64 - HEADER_LEN).map_err(error::from_io)?;
        }

        let mut toc_region = BoundedReader::new(&mut source, 0, header.toc_compressed);
        let mut xml = Vec::new();
        ZlibDecoder::new(&mut toc_region)
            .take(header.toc_uncompressed)
            .read_to_end(&mut xml)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::InvalidData {
                    Error::format(format!("cannot inflate TOC: {}", e))
                } else {
                    error::from_io(e)
                }
            })?;
        // the inflater may stop short of the declared compressed length;
        // the cursor still has to land on the heap
        let leftover = toc_region.remaining();
        if leftover > 0 {
            skip_fully(&mut toc_region, leftover).map_err(error::from_io)?;
        }

        let entries = toc::parse(&xml, header.checksum)?;
        let heap_start = source.position();

        Ok(XarReader {
            reopen,
            source,
            heap_start,
            entries,
            last_opened_end: None,
        })
    }

    /// The name-keyed entry table, built once from the TOC.
    pub fn entries(&self) -> &HashMap<String, XarEntry> {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&XarEntry> {
        self.entries.get(name)
    }

    /// Opens the named entry as a decompressing, digest-validating stream.
    ///
    /// The stream must be read to completion for the entry's declared
    /// checksum to be validated; the mismatch surfaces at end-of-stream.
    pub fn open_entry(&mut self, name: &str) -> Result<XarEntryReader<'_, R>> {
        let entry = match self.entries.get(name) {
            Some(entry) => entry.clone(),
            None => {
                return Err(Error::EntryNotFound {
                    name: name.to_string(),
                })
            }
        };

        if let Some(end) = self.last_opened_end.take() {
            // bring the cursor to where a fully drained previous entry
            // stream would have left it
            let drained = self.heap_start + end;
            let pos = self.source.position();
            if drained > pos {
                skip_fully(&mut self.source, drained - pos).map_err(error::from_io)?;
            }
            if entry.offset <= end {
                debug!(entry = %entry.name, "restarting container stream");
                self.source = CountingReader::new((self.reopen)()?);
                skip_fully(&mut self.source, self.heap_start).map_err(error::from_io)?;
            }
        }

        let target = self.heap_start + entry.offset;
        let pos = self.source.position();
        skip_fully(&mut self.source, target - pos).map_err(error::from_io)?;
        self.last_opened_end = Some(entry.offset + entry.length);

        let mut bounded = BoundedReader::new(&mut self.source, 0, entry.length);
        let body = match entry.compression {
            EntryCompression::None => EntryBody::Stored(bounded),
            EntryCompression::Gzip => EntryBody::Gzip(GzDecoder::new(bounded)),
            EntryCompression::Bzip2 => {
                skip_fully(&mut bounded, BZIP2_PREFIX_LEN).map_err(error::from_io)?;
                EntryBody::Bzip2(BzDecoder::new(bounded))
            }
        };

        Ok(XarEntryReader {
            inner: DigestReader::new(body, &entry.name, entry.checksum.as_ref()),
        })
    }
}

enum EntryBody<'a, R> {
    Stored(BoundedReader<&'a mut CountingReader<R>>),
    Gzip(GzDecoder<BoundedReader<&'a mut CountingReader<R>>>),
    Bzip2(BzDecoder<BoundedReader<&'a mut CountingReader<R>>>),
}

impl<R: Read> Read for EntryBody<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryBody::Stored(r) => r.read(buf),
            EntryBody::Gzip(r) => r.read(buf),
            EntryBody::Bzip2(r) => r.read(buf),
        }
    }
}

/// One entry's payload stream, borrowed from the reader that produced it.
pub struct XarEntryReader<'a, R> {
    inner: DigestReader<EntryBody<'a, R>>,
}

impl<R: Read> Read for XarEntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}
