//! Streaming extraction of portable (odc) cpio archives.
//!
//! Headers are fixed-width octal ASCII. Records are processed in stream
//! order; symlinks are collected during the pass and only created after the
//! trailer, shortest target first, so a link's target has the best chance of
//! already existing by the time the link is made.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::bounded::{skip_fully, BoundedReader};
use crate::error::{self, Error, Result};
use crate::progress::ProgressObserver;

const MAGIC: &[u8; 6] = b"070707";
const TRAILER: &str = "TRAILER!!!";

/// Header bytes per record: the magic, seven 6-character octal fields, an
/// 11-character mtime, a 6-character name length and an 11-character file
/// size.
const HEADER_LEN: u64 = 76;

const S_IFDIR: u32 = 0o40000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

/// One decoded archive record header, valid until the next record is read.
#[derive(Debug, Clone)]
pub struct CpioRecord {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub nlink: u64,
    pub rdev: u64,
    pub mtime: u64,
    pub name: String,
    pub name_length: u64,
    pub file_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Directory,
    File,
    Symlink,
}

impl CpioRecord {
    fn read<R: Read>(source: &mut R) -> Result<CpioRecord> {
        let mut magic = [0u8; 6];
        read_fully(source, &mut magic)?;
        if &magic != MAGIC {
            return Err(Error::format(format!(
                "expected cpio magic `070707`, got `{}`",
                String::from_utf8_lossy(&magic)
            )));
        }

        let dev = read_octal(source, 6, "dev")?;
        let ino = read_octal(source, 6, "ino")?;
        let mode = read_octal(source, 6, "mode")? as u32;
        let uid = read_octal(source, 6, "uid")?;
        let gid = read_octal(source, 6, "gid")?;
        let nlink = read_octal(source, 6, "nlink")?;
        let rdev = read_octal(source, 6, "rdev")?;
        let mtime = read_octal(source, 11, "mtime")?;
        let name_length = read_octal(source, 6, "namesize")?;
        let file_size = read_octal(source, 11, "filesize")?;
        let name = read_string(source, name_length as usize)?;

        Ok(CpioRecord {
            dev,
            ino,
            mode,
            uid,
            gid,
            nlink,
            rdev,
            mtime,
            name,
            name_length,
            file_size,
        })
    }

    fn kind(&self) -> Result<EntryKind> {
        if self.mode & S_IFDIR == S_IFDIR {
            Ok(EntryKind::Directory)
        } else if self.mode & S_IFLNK == S_IFLNK {
            Ok(EntryKind::Symlink)
        } else if self.mode & S_IFREG == S_IFREG {
            Ok(EntryKind::File)
        } else {
            Err(Error::format(format!(
                "unknown mode {:o} for `{}`",
                self.mode, self.name
            )))
        }
    }
}

struct PendingLink {
    target: PathBuf,
    path: PathBuf,
}

/// Extracts a cpio stream into a destination directory.
pub struct CpioExtractor<R> {
    source: R,
    length: u64,
}

impl<R: Read> CpioExtractor<R> {
    pub fn new(source: R) -> CpioExtractor<R> {
        CpioExtractor { source, length: 0 }
    }

    /// Expected decompressed archive length, used only for progress totals.
    pub fn with_length(mut self, length: u64) -> CpioExtractor<R> {
        self.length = length;
        self
    }

    /// Streams the archive into `destination`, returning the number of
    /// records processed (the trailer excluded).
    ///
    /// Destination paths must not already exist. Any failure leaves the
    /// partially extracted state in place.
    pub fn extract_to(
        mut self,
        destination: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<u64> {
        observer.begin_task("extracting archive", self.length);

        let mut links: Vec<PendingLink> = Vec::new();
        let mut consumed = 0u64;
        let mut count = 0u64;

        loop {
            let record = CpioRecord::read(&mut self.source)?;
            if record.name == TRAILER {
                break;
            }

            let dest = map_path(destination, &record.name);
            match record.kind()? {
                EntryKind::Directory => {
                    if record.name == "." {
                        // the archive root itself, nothing to create
                    } else if dest.exists() {
                        return Err(Error::AlreadyExists { path: dest });
                    } else {
                        fs::create_dir_all(&dest)?;
                    }
                    skip_fully(&mut self.source, record.file_size).map_err(error::from_io)?;
                }
                EntryKind::Symlink => {
                    let target = read_string(&mut self.source, record.file_size as usize)?;
                    links.push(PendingLink {
                        target: PathBuf::from(target),
                        path: dest,
                    });
                }
                EntryKind::File => {
                    if dest.exists() {
                        return Err(Error::AlreadyExists { path: dest });
                    }
                    let mut body = BoundedReader::new(&mut self.source, 0, record.file_size);
                    let mut out = File::create(&dest)?;
                    let copied = io::copy(&mut body, &mut out).map_err(error::from_io)?;
                    if copied < record.file_size {
                        return Err(Error::Truncated {
                            expected: record.file_size,
                            read: copied,
                        });
                    }
                }
            }

            consumed += HEADER_LEN + record.name_length + record.file_size;
            count += 1;
            observer.worked(consumed);
            if observer.is_canceled() {
                return Err(Error::Canceled);
            }
        }
        observer.done();

        debug!(entries = count, links = links.len(), "archive pass complete");

        observer.begin_task("creating links", links.len() as u64);
        // shortest target first: the target is more likely to exist already
        links.sort_by_key(|link| link.target.as_os_str().len());
        for (i, link) in links.iter().enumerate() {
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link.target, &link.path)?;
            #[cfg(windows)]
            std::os::windows::fs::symlink_file(&link.target, &link.path)?;
            observer.worked(i as u64 + 1);
        }
        observer.done();

        Ok(count)
    }
}

/// Maps an archive member name to a destination path: a leading `./` is
/// stripped and relative names resolve under `root`; absolute names are
/// honored as given.
fn map_path(root: &Path, name: &str) -> PathBuf {
    let name = name.strip_prefix("./").unwrap_or(name);
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn read_fully<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut read = 0;
    while read < buf.len() {
        let n = source.read(&mut buf[read..]).map_err(error::from_io)?;
        if n == 0 {
            return Err(Error::Truncated {
                expected: buf.len() as u64,
                read: read as u64,
            });
        }
        read += n;
    }
    Ok(())
}

/// Reads exactly `len` bytes and returns them as a string with trailing NUL
/// padding stripped.
fn read_string<R: Read>(source: &mut R, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    read_fully(source, &mut buf)?;
    while buf.last() == Some(&0) {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|_| Error::format("non-UTF-8 name in archive"))
}

fn read_octal<R: Read>(source: &mut R, width: usize, field: &str) -> Result<u64> {
    let text = read_string(source, width)?;
    u64::from_str_radix(text.trim(), 8)
        .map_err(|_| Error::format(format!("non-octal {} field `{}`", field, text)))
}
