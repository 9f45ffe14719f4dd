mod blocks;
mod bounded;
mod cpio;
mod download;
mod error;
mod install;
mod progress;
mod release;
mod xar;

pub use blocks::{BlockEntry, BlockReader};
pub use bounded::BoundedReader;
pub use cpio::{CpioExtractor, CpioRecord};
pub use download::Downloader;
pub use error::{Error, Result};
pub use install::install;
pub use progress::{NullProgress, ProgressObserver};
pub use release::{DecodeChain, Release, DEPENDENCY_MAP, RELEASES};
pub use xar::{
    ChecksumKind, EntryChecksum, EntryCompression, XarEntry, XarEntryReader, XarReader,
};
