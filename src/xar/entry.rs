use std::fmt;
use std::io::{self, Read};

use md5::Md5;
use sha1::{Digest, Sha1};

use crate::Error;

/// Per-entry payload encoding inside the container heap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EntryCompression {
    #[default]
    None,
    Gzip,
    Bzip2,
}

impl EntryCompression {
    /// The TOC declares encodings as MIME-ish style strings, e.g.
    /// `application/x-gzip`. Anything unrecognized is treated as stored.
    pub(crate) fn from_style(style: &str) -> EntryCompression {
        if style.contains("gzip") {
            EntryCompression::Gzip
        } else if style.contains("bzip2") {
            EntryCompression::Bzip2
        } else {
            EntryCompression::None
        }
    }
}

impl fmt::Display for EntryCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryCompression::None => "stored",
            EntryCompression::Gzip => "gzip",
            EntryCompression::Bzip2 => "bzip2",
        };
        write!(f, "{}", s)
    }
}

/// Digest algorithm selector carried by the container header and per-entry
/// checksum declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    None,
    Sha1,
    Md5,
}

impl ChecksumKind {
    pub(crate) fn from_selector(value: u32) -> crate::Result<ChecksumKind> {
        match value {
            0 => Ok(ChecksumKind::None),
            1 => Ok(ChecksumKind::Sha1),
            2 => Ok(ChecksumKind::Md5),
            other => Err(Error::format(format!(
                "unknown checksum algorithm selector {}",
                other
            ))),
        }
    }

    pub(crate) fn from_style(style: &str) -> ChecksumKind {
        if style.eq_ignore_ascii_case("sha1") {
            ChecksumKind::Sha1
        } else if style.eq_ignore_ascii_case("md5") {
            ChecksumKind::Md5
        } else {
            ChecksumKind::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumKind::None => "none",
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Md5 => "md5",
        }
    }
}

/// Expected digest of an entry's decompressed bytes, as declared in the TOC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryChecksum {
    pub kind: ChecksumKind,
    /// Lowercase hex.
    pub value: String,
}

/// One named payload in the container heap.
///
/// Offsets are heap-relative; `length` is the stored (possibly compressed)
/// byte count. Built once from the parsed TOC and immutable afterward.
#[derive(Debug, Clone)]
pub struct XarEntry {
    pub name: String,
    pub offset: u64,
    pub length: u64,
    pub compression: EntryCompression,
    pub checksum: Option<EntryChecksum>,
}

enum Hasher {
    Sha1(Sha1),
    Md5(Md5),
}

impl Hasher {
    fn new(kind: ChecksumKind) -> Option<Hasher> {
        match kind {
            ChecksumKind::Sha1 => Some(Hasher::Sha1(Sha1::new())),
            ChecksumKind::Md5 => Some(Hasher::Md5(Md5::new())),
            ChecksumKind::None => None,
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// Read adapter that hashes bytes as they pass through and compares the
/// digest against the declared value once the stream is exhausted.
///
/// The mismatch is only detectable at end-of-stream, so consumers must read
/// the entry to completion to get the integrity guarantee.
pub(crate) struct DigestReader<R> {
    inner: R,
    name: String,
    state: Option<(Hasher, String)>,
}

impl<R: Read> DigestReader<R> {
    pub(crate) fn new(inner: R, name: &str, checksum: Option<&EntryChecksum>) -> DigestReader<R> {
        let state = checksum.and_then(|c| {
            Hasher::new(c.kind).map(|h| (h, c.value.to_ascii_lowercase()))
        });
        DigestReader {
            inner,
            name: name.to_string(),
            state,
        }
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 {
            if let Some((hasher, expected)) = self.state.take() {
                let actual = hasher.finalize_hex();
                if actual != expected {
                    return Err(Error::Checksum {
                        name: self.name.clone(),
                        expected,
                        actual,
                    }
                    .into());
                }
            }
            return Ok(0);
        }
        if let Some((hasher, _)) = &mut self.state {
            hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn checksum_of(data: &[u8]) -> EntryChecksum {
        EntryChecksum {
            kind: ChecksumKind::Sha1,
            value: hex::encode(Sha1::digest(data)),
        }
    }

    #[test]
    fn matching_digest_passes() {
        let data = b"payload bytes";
        let checksum = checksum_of(data);
        let mut reader = DigestReader::new(Cursor::new(data), "a", Some(&checksum));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn mismatched_digest_fails_at_end_of_stream() {
        let checksum = checksum_of(b"other bytes");
        let mut reader = DigestReader::new(Cursor::new(b"payload bytes"), "a", Some(&checksum));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match crate::error::from_io(err) {
            Error::Checksum { name, .. } => assert_eq!(name, "a"),
            other => panic!("expected checksum error, got {:?}", other),
        }
    }

    #[test]
    fn no_declared_checksum_skips_validation() {
        let mut reader = DigestReader::new(Cursor::new(b"anything"), "a", None);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"anything");
    }

    #[test]
    fn uppercase_declared_digest_compares_case_insensitively() {
        let data = b"payload bytes";
        let mut checksum = checksum_of(data);
        checksum.value = checksum.value.to_ascii_uppercase();
        let mut reader = DigestReader::new(Cursor::new(data), "a", Some(&checksum));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn compression_style_mapping() {
        assert_eq!(
            EntryCompression::from_style("application/x-gzip"),
            EntryCompression::Gzip
        );
        assert_eq!(
            EntryCompression::from_style("application/x-bzip2"),
            EntryCompression::Bzip2
        );
        assert_eq!(
            EntryCompression::from_style("application/octet-stream"),
            EntryCompression::None
        );
    }
}
