//! Staging of source trees.
//!
//! A resource is staged by fetching its archive, checking it, unpacking it
//! into a fresh private directory and applying the planned patch. The
//! returned [`StagedSource`] owns that directory and removes it when
//! dropped, on success and failure alike, unless it was asked to keep it.

use crate::checksum;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::types::ResourcePlan;
use flate2::read::GzDecoder;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Magic bytes at the start of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// An extracted source tree, ready for the build steps.
#[derive(Debug)]
pub struct StagedSource {
    resource: String,
    root: PathBuf,
    dir: Option<TempDir>,
    keep: bool,
}

impl StagedSource {
    /// Wrap an existing directory. Nothing is removed on drop.
    pub fn existing(resource: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            resource: resource.into(),
            root: root.into(),
            dir: None,
            keep: true,
        }
    }

    /// Root of the source tree; step working dirs are relative to it.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resource this tree belongs to.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for StagedSource {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if self.keep {
            let path = dir.keep();
            log::info!("{}: keeping staging directory {}", self.resource, path.display());
        } else {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!("{}: failed to remove {}: {e}", self.resource, path.display());
            } else {
                log::debug!("{}: removed staging directory {}", self.resource, path.display());
            }
        }
    }
}

/// Produces a source tree for a planned resource.
pub trait Stager {
    /// Stage one resource.
    ///
    /// # Errors
    ///
    /// Returns a staging error (`FetchFailed`, `ChecksumMismatch`,
    /// `ExtractionFailed`, `PatchApplicationFailed`) or `Io`.
    fn stage(&self, plan: &ResourcePlan) -> Result<StagedSource>;
}

/// Stages resources from verified archives.
pub struct ArchiveStager<F> {
    fetcher: F,
    staging_root: Option<PathBuf>,
    keep: bool,
    patch_program: String,
}

impl<F: Fetcher> ArchiveStager<F> {
    /// Create a stager using the system temp directory.
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            staging_root: None,
            keep: false,
            patch_program: "patch".to_string(),
        }
    }

    /// Create staging directories under `root` instead.
    #[must_use]
    pub fn staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Leave staging directories in place after use.
    #[must_use]
    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Use another program to apply patches (invoked as `patch` would be).
    #[must_use]
    pub fn patch_program(mut self, program: impl Into<String>) -> Self {
        self.patch_program = program.into();
        self
    }

    /// The underlying fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn temp_dir(&self, resource: &str) -> Result<TempDir> {
        let prefix = format!("kiln-{resource}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        match &self.staging_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| Error::io(root, e))?;
                builder.tempdir_in(root).map_err(|e| Error::io(root, e))
            }
            None => builder
                .tempdir()
                .map_err(|e| Error::io(std::env::temp_dir(), e)),
        }
    }
}

impl<F: Fetcher> Stager for ArchiveStager<F> {
    fn stage(&self, plan: &ResourcePlan) -> Result<StagedSource> {
        let name = plan.name();
        let bytes = self.fetcher.fetch_raw(&plan.resource)?;
        checksum::verify(&plan.resource, &bytes)?;

        let dir = self.temp_dir(name)?;
        log::debug!("{name}: staging into {}", dir.path().display());

        // From here on `staged` owns the directory, so every early return
        // below removes it.
        let mut staged = StagedSource {
            resource: name.to_string(),
            root: dir.path().to_path_buf(),
            dir: Some(dir),
            keep: self.keep,
        };

        extract(name, &bytes, &staged.root)?;
        staged.root = source_root(&staged.root)?;

        if let Some(patch) = &plan.patch {
            apply_patch(&self.patch_program, name, &staged.root, patch)?;
        }

        Ok(staged)
    }
}

/// Stager for trees that are already on disk, keyed by resource name.
#[derive(Debug, Clone, Default)]
pub struct DirStager {
    dirs: Vec<(String, PathBuf)>,
}

impl DirStager {
    /// Create an empty stager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `dir` for `resource`.
    #[must_use]
    pub fn with(mut self, resource: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.dirs.push((resource.into(), dir.into()));
        self
    }
}

impl Stager for DirStager {
    fn stage(&self, plan: &ResourcePlan) -> Result<StagedSource> {
        self.dirs
            .iter()
            .find(|(name, _)| name == plan.name())
            .map(|(name, dir)| StagedSource::existing(name.clone(), dir.clone()))
            .ok_or_else(|| Error::ExtractionFailed {
                resource: plan.name().to_string(),
                message: "no directory configured".to_string(),
            })
    }
}

/// Unpack a `.tar.gz` (or plain `.tar`) archive into `dest`.
///
/// # Errors
///
/// Returns `Error::ExtractionFailed` for corrupt or unsupported data.
pub fn extract(resource: &str, bytes: &[u8], dest: &Path) -> Result<()> {
    let failed = |message: String| Error::ExtractionFailed {
        resource: resource.to_string(),
        message,
    };

    let reader: Box<dyn Read> = if bytes.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(Cursor::new(bytes)))
    } else if is_plain_tar(bytes) {
        Box::new(Cursor::new(bytes))
    } else {
        return Err(failed("unsupported archive format".to_string()));
    };

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.unpack(dest).map_err(|e| failed(e.to_string()))?;

    let empty = std::fs::read_dir(dest)
        .map_err(|e| Error::io(dest, e))?
        .next()
        .is_none();
    if empty {
        return Err(failed("archive is empty".to_string()));
    }

    log::debug!("{resource}: extracted {} bytes into {}", bytes.len(), dest.display());
    Ok(())
}

/// ustar archives carry "ustar" at offset 257.
fn is_plain_tar(bytes: &[u8]) -> bool {
    bytes.get(257..262) == Some(b"ustar".as_slice())
}

/// Descend into the single top-level directory most source archives have.
fn source_root(dir: &Path) -> Result<PathBuf> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(dir, e))?;

    if entries.len() == 1 {
        let entry = entries.remove(0);
        let path = entry.path();
        if path.is_dir() {
            return Ok(path);
        }
    }
    Ok(dir.to_path_buf())
}

/// Apply a unified diff with `patch -p1`, feeding the diff on stdin.
///
/// # Errors
///
/// Returns `Error::PatchApplicationFailed` with the program's output if it
/// cannot be started or exits non-zero.
pub fn apply_patch(program: &str, resource: &str, root: &Path, diff: &str) -> Result<()> {
    log::info!("{resource}: applying patch");

    let failed = |output: String| Error::PatchApplicationFailed {
        resource: resource.to_string(),
        output,
    };

    let mut child = Command::new(program)
        .args(["-p1", "--forward", "--batch"])
        .current_dir(root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| failed(format!("could not run {program}: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        // A patcher that exits early closes the pipe; its exit status says why.
        let _ = stdin.write_all(diff.as_bytes());
    }

    let output = child
        .wait_with_output()
        .map_err(|e| failed(format!("{program} did not finish: {e}")))?;

    if output.status.success() {
        log::debug!("{resource}: patch applied");
        Ok(())
    } else {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(failed(text.trim_end().to_string()))
    }
}
