//! Per-release installation pipeline.
//!
//! Composes download → verify → window-select → (optional XAR unwrap) →
//! gzip-decompress → cpio-extract. An already-existing extraction root short
//! circuits the whole pipeline; its content is trusted, not re-validated. A
//! failure mid-extraction leaves partial filesystem state in place for
//! inspection — there is no rollback, and a partially populated root will
//! cause the next invocation to skip rather than repair.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::blocks::{BlockEntry, BlockReader};
use crate::cpio::CpioExtractor;
use crate::download::Downloader;
use crate::error::Result;
use crate::progress::ProgressObserver;
use crate::release::{DecodeChain, Release};
use crate::xar::XarReader;

const PAYLOAD_ENTRY: &str = "Payload";

/// Downloads, verifies and unpacks `release` under `repo_root`.
pub fn install(
    release: &Release,
    repo_root: &Path,
    observer: &mut dyn ProgressObserver,
) -> Result<()> {
    let root = release.extraction_root(repo_root);
    if root.exists() {
        debug!(path = %root.display(), "extraction root exists, skipping installation");
        return Ok(());
    }
    fs::create_dir_all(&root)?;

    Downloader::new()?.fetch(release, repo_root, observer)?;

    let installer = release.installer_file(repo_root);
    let open_window = || -> Result<BlockReader<BufReader<File>>> {
        let file = File::open(&installer)?;
        Ok(BlockReader::new(
            BufReader::new(file),
            vec![BlockEntry::new(release.entry_offset, release.entry_length)],
        ))
    };

    info!(version = release.version, "unpacking installer");
    let count = match release.chain {
        DecodeChain::XarPayload => {
            let mut container = XarReader::new(open_window)?;
            let payload = container.open_entry(PAYLOAD_ENTRY)?;
            CpioExtractor::new(GzDecoder::new(payload))
                .with_length(release.raw_length)
                .extract_to(&root, observer)?
        }
        DecodeChain::Gzip => CpioExtractor::new(GzDecoder::new(open_window()?))
            .with_length(release.raw_length)
            .extract_to(&root, observer)?,
    };

    info!(entries = count, path = %root.display(), "installation complete");
    Ok(())
}
