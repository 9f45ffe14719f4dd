//! The table of supported installer releases.
//!
//! Each release is plain config-time data: where the container comes from,
//! how to prove its integrity, which byte window of the disk image holds the
//! payload and how that payload is wrapped. The table is never mutated after
//! load.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// How a release's payload is wrapped inside the disk-image byte window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeChain {
    /// window → XAR container → gzip `Payload` entry → cpio
    XarPayload,
    /// window → gzip → cpio
    Gzip,
}

/// Immutable descriptor of one supported release.
#[derive(Debug, Clone)]
pub struct Release {
    pub version: &'static str,
    pub url: &'static str,
    /// Expected SHA-256 of the assembled container file, lowercase hex.
    pub checksum: &'static str,
    /// Decompressed cpio payload length, used for progress totals.
    pub raw_length: u64,
    /// Authoritative length of the container file.
    pub file_length: u64,
    /// Start of the payload window within the container file.
    pub entry_offset: u64,
    /// Length of the payload window.
    pub entry_length: u64,
    pub chain: DecodeChain,
}

pub const RELEASES: &[Release] = &[
    Release {
        version: "5.4.3",
        url: "https://download.info.apple.com/Mac_OS_X/061-4634.20080915.3ijd0/WebObjects543.dmg",
        checksum: "3d671b7513b12aa06dde2b14acb746c9a0a505bc8bc47340337d6ae127dfb0d8",
        raw_length: 153_786_259,
        file_length: 166_167_249,
        entry_offset: 58_556_928,
        entry_length: 107_601_091,
        chain: DecodeChain::XarPayload,
    },
    Release {
        version: "5.3.3",
        url: "https://download.info.apple.com/Mac_OS_X/061-2998.20070215.33woU/WebObjects5.3.3Update.dmg",
        checksum: "bedc14cbcb82a2a64415f2f322a9ccc6bb400aab72895c5fe9f086d085bc8698",
        raw_length: 51_252_394,
        file_length: 42_321_716,
        entry_offset: 11_608_064,
        entry_length: 29_672_581,
        chain: DecodeChain::Gzip,
    },
];

/// Framework name → prerequisite framework names. Identical across the
/// supported releases; read-only configuration for tooling that registers
/// the extracted frameworks.
pub const DEPENDENCY_MAP: &[(&str, &[&str])] = &[
    ("JavaEOControl", &["JavaFoundation"]),
    ("JavaWebObjects", &["JavaXML", "JavaEOControl"]),
    ("JavaWOExtensions", &["JavaWebObjects"]),
    ("JavaEOAccess", &["JavaFoundation", "JavaEOControl"]),
    ("JavaDTWGeneration", &["JavaWebObjects"]),
    ("JavaDirectToWeb", &["JavaEOProject", "JavaDTWGeneration"]),
    ("JavaEOProject", &["JavaWebObjects", "JavaEOAccess"]),
    ("JavaJDBCAdaptor", &["JavaEOAccess"]),
];

impl Release {
    /// Looks up a release by version string.
    pub fn for_version(version: &str) -> Result<&'static Release> {
        RELEASES
            .iter()
            .find(|release| release.version == version)
            .ok_or_else(|| Error::UnknownVersion {
                version: version.to_string(),
                available: RELEASES.iter().map(|release| release.version).collect(),
            })
    }

    /// Path of the final container file, relative to the repository root.
    pub fn installer_file_path(&self) -> String {
        format!("com/webobjects/.archive/WebObjects_{}.dmg", self.version)
    }

    pub fn installer_file(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(self.installer_file_path())
    }

    /// Path of the in-progress download file, relative to the repository
    /// root. Moved to the final path once verified.
    pub fn download_file_path(&self) -> String {
        format!("{}.download", self.installer_file_path())
    }

    pub fn download_file(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(self.download_file_path())
    }

    /// The directory this release unpacks into.
    pub fn extraction_root(&self, repo_root: &Path) -> PathBuf {
        repo_root
            .join("com/webobjects/.next_roots")
            .join(self.version)
    }

    /// Where the extracted framework jars land, for downstream tooling.
    pub fn jar_root(&self, repo_root: &Path) -> PathBuf {
        self.extraction_root(repo_root).join("Library/WebObjects/lib")
    }

    pub fn dependency_map(&self) -> &'static [(&'static str, &'static [&'static str])] {
        DEPENDENCY_MAP
    }
}
