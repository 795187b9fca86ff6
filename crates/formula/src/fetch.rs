//! Fetchers for source artifacts.
//!
//! This module provides the [`Fetcher`] trait and its implementations. The
//! production implementation is [`HttpFetcher`], which downloads over
//! HTTP(S) with `ureq`, reads `file://` URLs and plain paths directly, and
//! keeps verified archives in an optional download cache.
//!
//! # Testing
//!
//! Use [`MockFetcher`] for testing without network access:
//!
//! ```
//! use formula::fetch::{Fetcher, MockFetcher};
//! use formula::ResourceDescriptor;
//!
//! let tarball = b"not really a tarball".to_vec();
//! let descriptor = ResourceDescriptor::new(
//!     "demo",
//!     "https://example.com/demo-1.0.tar.gz",
//!     "1.0",
//!     formula::checksum::sha256_hex(&tarball),
//! );
//!
//! let fetcher = MockFetcher::new();
//! fetcher.add(&descriptor.url, tarball.clone());
//! assert_eq!(fetcher.fetch(&descriptor).unwrap(), tarball);
//! ```

use crate::checksum;
use crate::error::{Error, Result};
use crate::types::ResourceDescriptor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Maximum download size (Tcl/Tk sources are well under this).
const MAX_DOWNLOAD_SIZE: u64 = 256 * 1024 * 1024;

/// Obtains the bytes of a resource's archive.
pub trait Fetcher: Send + Sync {
    /// Fetch the raw bytes, without checking them.
    ///
    /// # Errors
    ///
    /// Returns `Error::FetchFailed` if the artifact cannot be obtained.
    fn fetch_raw(&self, resource: &ResourceDescriptor) -> Result<Vec<u8>>;

    /// Fetch the bytes and verify them against the descriptor's checksum.
    ///
    /// # Errors
    ///
    /// Returns `Error::FetchFailed` or `Error::ChecksumMismatch`.
    fn fetch(&self, resource: &ResourceDescriptor) -> Result<Vec<u8>> {
        let bytes = self.fetch_raw(resource)?;
        checksum::verify(resource, &bytes)?;
        Ok(bytes)
    }
}

/// HTTP(S) and local file fetcher with an optional download cache.
pub struct HttpFetcher {
    agent: ureq::Agent,
    cache_dir: Option<PathBuf>,
}

impl HttpFetcher {
    /// Create a fetcher without a cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            cache_dir: None,
        }
    }

    /// Keep verified downloads in `dir`.
    #[must_use]
    pub fn with_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Cache directory, if any.
    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Where a resource's archive is cached.
    #[must_use]
    pub fn cache_path(&self, resource: &ResourceDescriptor) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| {
            dir.join(format!(
                "{}--{}--{}",
                resource.name,
                resource.version,
                resource.archive_name()
            ))
        })
    }

    fn download(&self, resource: &ResourceDescriptor) -> Result<Vec<u8>> {
        log::info!("downloading {} from {}", resource.name, resource.url);

        let fetch_failed = |message: String, transient: bool| Error::FetchFailed {
            resource: resource.name.clone(),
            url: resource.url.clone(),
            message,
            transient,
        };

        let mut response = self
            .agent
            .get(&resource.url)
            .header("User-Agent", "kiln")
            .call()
            .map_err(|e| match e {
                ureq::Error::StatusCode(code) => {
                    fetch_failed(format!("HTTP {code}"), code >= 500)
                }
                other => fetch_failed(other.to_string(), true),
            })?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_DOWNLOAD_SIZE)
            .read_to_vec()
            .map_err(|e| fetch_failed(e.to_string(), true))
    }

    fn read_local(resource: &ResourceDescriptor, path: &Path) -> Result<Vec<u8>> {
        log::debug!("reading {} from {}", resource.name, path.display());
        std::fs::read(path).map_err(|e| Error::FetchFailed {
            resource: resource.name.clone(),
            url: resource.url.clone(),
            message: e.to_string(),
            transient: false,
        })
    }

    fn read_cached(&self, resource: &ResourceDescriptor) -> Option<Vec<u8>> {
        let path = self.cache_path(resource)?;
        let bytes = std::fs::read(&path).ok()?;
        if checksum::verify(resource, &bytes).is_ok() {
            log::debug!("{}: using cached {}", resource.name, path.display());
            Some(bytes)
        } else {
            log::warn!("{}: discarding stale cache entry {}", resource.name, path.display());
            let _ = std::fs::remove_file(&path);
            None
        }
    }

    /// Cache verified bytes. The cache is optional, so a failed write is
    /// only logged.
    fn remember(&self, resource: &ResourceDescriptor, bytes: &[u8]) {
        if let Err(e) = self.store_cached(resource, bytes) {
            log::warn!("{}: could not cache download: {e}", resource.name);
        }
    }

    fn store_cached(&self, resource: &ResourceDescriptor, bytes: &[u8]) -> Result<()> {
        let Some(path) = self.cache_path(resource) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        // Partial writes never land under the final name.
        let partial = path.with_extension("part");
        std::fs::write(&partial, bytes).map_err(|e| Error::io(&partial, e))?;
        std::fs::rename(&partial, &path).map_err(|e| Error::io(&path, e))?;
        log::debug!("{}: cached at {}", resource.name, path.display());
        Ok(())
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_raw(&self, resource: &ResourceDescriptor) -> Result<Vec<u8>> {
        if let Some(path) = local_path(&resource.url) {
            return Self::read_local(resource, &path);
        }
        if let Some(bytes) = self.read_cached(resource) {
            return Ok(bytes);
        }
        let bytes = self.download(resource)?;
        // Only verified downloads are cached; the caller reports mismatches.
        if checksum::verify(resource, &bytes).is_ok() {
            self.remember(resource, &bytes);
        }
        Ok(bytes)
    }
}

/// Local path for `file://` URLs and plain paths, `None` for anything with
/// another scheme.
fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if url.contains("://") {
        None
    } else {
        Some(PathBuf::from(url))
    }
}

/// In-memory fetcher for tests, keyed by URL.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    artifacts: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `url`.
    pub fn add(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), bytes);
    }

    /// URLs requested so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Fetcher for MockFetcher {
    fn fetch_raw(&self, resource: &ResourceDescriptor) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resource.url.clone());

        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&resource.url)
            .cloned()
            .ok_or_else(|| Error::FetchFailed {
                resource: resource.name.clone(),
                url: resource.url.clone(),
                message: "mock artifact not configured".to_string(),
                transient: false,
            })
    }
}
