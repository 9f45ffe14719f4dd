//! Resumable, checksum-verified installer downloads.
//!
//! Bytes are first appended to an in-progress file next to the final
//! location. A byte-range request picks up where a previous interrupted
//! attempt left off, so re-invoking after a transient failure resumes
//! instead of restarting. Only a file whose SHA-256 digest matches the
//! release descriptor is moved to the final path.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header;
use reqwest::redirect::Policy;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{self, Error, Result};
use crate::progress::ProgressObserver;
use crate::release::Release;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_REDIRECTS: usize = 10;
const COPY_BUFFER_LEN: usize = 8 * 1024;

pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> Result<Downloader> {
        // redirects are resolved by hand so the authoritative content
        // length of the final location is visible before the byte copy
        let client = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None)
            .build()
            .map_err(Error::HttpClient)?;
        Ok(Downloader { client })
    }

    /// Ensures a checksum-verified container file exists at the release's
    /// final path under `repo_root`.
    ///
    /// An already-present final file is trusted by presence and not
    /// re-verified. A checksum mismatch deletes the downloaded bytes, so
    /// the next attempt starts cold.
    pub fn fetch(
        &self,
        release: &Release,
        repo_root: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<()> {
        let installer = release.installer_file(repo_root);
        if installer.exists() {
            debug!(path = %installer.display(), "installer already present");
            return Ok(());
        }

        let download = release.download_file(repo_root);
        if download.exists() {
            info!(path = %download.display(), "resuming download");
        } else {
            info!(path = %download.display(), "starting download");
            if let Some(parent) = download.parent() {
                fs::create_dir_all(parent)?;
            }
            File::create(&download)?;
        }

        let (url, remote_length) = self.resolve(release.url)?;
        let existing = fs::metadata(&download)?.len();
        match remote_length {
            Some(remote) if existing < remote => {
                self.copy_remote(&url, &download, existing, remote, observer)?;
            }
            _ => {
                debug!(existing, "no bytes left to copy");
            }
        }

        let actual = file_sha256(&download)?;
        if actual != release.checksum {
            // corrupt bytes are not kept for resumption
            fs::remove_file(&download)?;
            return Err(Error::Checksum {
                name: release.installer_file_path(),
                expected: release.checksum.to_string(),
                actual,
            });
        }

        if fs::rename(&download, &installer).is_err() {
            fs::copy(&download, &installer)?;
            fs::remove_file(&download)?;
        }
        debug!(path = %installer.display(), "installer verified");
        Ok(())
    }

    /// Follows redirects by hand until a success response, returning the
    /// final URL and its declared content length.
    fn resolve(&self, url: &str) -> Result<(String, Option<u64>)> {
        let mut url = url.to_string();
        let mut status = 0u16;
        for _ in 0..MAX_REDIRECTS {
            let response = self
                .client
                .head(&url)
                .send()
                .map_err(|source| Error::Network {
                    url: url.clone(),
                    source,
                })?;
            status = response.status().as_u16();

            if response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| Error::Http {
                        status,
                        url: url.clone(),
                    })?;
                let next = response.url().join(location).map_err(|_| Error::Http {
                    status,
                    url: url.clone(),
                })?;
                debug!(url = %next, "following redirect");
                url = next.to_string();
                continue;
            }
            if response.status().is_success() {
                let length = response
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Ok((url, length));
            }
            return Err(Error::Http { status, url });
        }
        Err(Error::Http { status, url })
    }

    /// Appends `[existing, remote)` of the remote file to the in-progress
    /// file, polling the observer once per buffer.
    fn copy_remote(
        &self,
        url: &str,
        download: &Path,
        existing: u64,
        remote: u64,
        observer: &mut dyn ProgressObserver,
    ) -> Result<()> {
        let mut request = self.client.get(url);
        if existing > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", existing));
        }
        let mut response = request.send().map_err(|source| Error::Network {
            url: url.to_string(),
            source,
        })?;
        if !response.status().is_success() {
            return Err(Error::Http {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        info!(bytes = remote - existing, "downloading");
        observer.begin_task("downloading installer", remote - existing);

        let mut out = OpenOptions::new().append(true).open(download)?;
        let mut buffer = [0u8; COPY_BUFFER_LEN];
        let mut copied = 0u64;
        loop {
            let n = response.read(&mut buffer).map_err(error::from_io)?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n])?;
            copied += n as u64;
            observer.worked(copied);
            if observer.is_canceled() {
                return Err(Error::Canceled);
            }
        }
        observer.done();
        Ok(())
    }
}

fn file_sha256(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
