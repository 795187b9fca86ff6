//! Core types for recipe interpretation.
//!
//! This module contains the data model shared by every stage of a build:
//! resource descriptors, build steps and their environment overlays, the
//! resolved command plan, and the installation layout/record.

use crate::checksum::SHA256_HEX_LEN;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// A fetchable source artifact.
///
/// Descriptors are created when a recipe is defined and never change
/// afterwards.
///
/// # Example
///
/// ```
/// use formula::ResourceDescriptor;
///
/// let tk = ResourceDescriptor::new(
///     "tk",
///     "https://downloads.sourceforge.net/project/tcl/Tcl/8.6.4/tk8.6.4-src.tar.gz",
///     "8.6.4",
///     "08f99df85e5dc9c4271762163c6aabb962c8b297dc5c4c1af8bdd05fc2dd26c1",
/// );
/// assert!(tk.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource name (e.g., "tcl", "tk").
    pub name: String,
    /// Download URL of the source archive.
    pub url: String,
    /// Upstream version.
    pub version: String,
    /// Expected SHA-256 of the archive, hex encoded.
    #[serde(rename = "sha256")]
    pub checksum_hex: String,
    /// Unified diff applied to the extracted tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_patch: Option<String>,
}

impl ResourceDescriptor {
    /// Create a descriptor without a patch.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        version: impl Into<String>,
        checksum_hex: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            version: version.into(),
            checksum_hex: checksum_hex.into(),
            inline_patch: None,
        }
    }

    /// Return a copy of this descriptor carrying an inline patch.
    #[must_use]
    pub fn with_patch(self, patch: impl Into<String>) -> Self {
        Self {
            inline_patch: Some(patch.into()),
            ..self
        }
    }

    /// Check the descriptor invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedDescriptor` when the name, URL or version is
    /// empty, or the checksum is not 64 hex characters.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::malformed("", "name is empty"));
        }
        if self.url.trim().is_empty() {
            return Err(Error::malformed(&self.name, "url is empty"));
        }
        if self.version.trim().is_empty() {
            return Err(Error::malformed(&self.name, "version is empty"));
        }
        if self.checksum_hex.len() != SHA256_HEX_LEN {
            return Err(Error::malformed(
                &self.name,
                format!(
                    "sha256 must be {} hex characters, got {}",
                    SHA256_HEX_LEN,
                    self.checksum_hex.len()
                ),
            ));
        }
        if !self.checksum_hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::malformed(&self.name, "sha256 contains non-hex characters"));
        }
        Ok(())
    }

    /// File name of the archive, taken from the last URL segment.
    #[must_use]
    pub fn archive_name(&self) -> String {
        let trimmed = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        trimmed
            .rsplit('/')
            .find(|s| !s.is_empty())
            .map_or_else(|| format!("{}-{}.tar.gz", self.name, self.version), str::to_string)
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Environment changes applied to a single child process.
///
/// The overlay never touches the environment of the running process; it is
/// layered onto the `Command` of the step it belongs to and disappears with
/// that child.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOverlay {
    /// Variables set for the step.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,
    /// Directories prepended to `PATH`, first entry searched first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_prepend: Vec<PathBuf>,
}

impl EnvOverlay {
    /// Create an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a directory to `PATH`.
    pub fn prepend_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.path_prepend.push(dir.into());
        self
    }

    /// Set a variable.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    /// Whether the overlay changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.path_prepend.is_empty()
    }

    /// Compute the `PATH` value for a child, given the parent's `PATH`.
    #[must_use]
    pub fn path_value(&self, inherited: Option<&std::ffi::OsStr>) -> Option<std::ffi::OsString> {
        if self.path_prepend.is_empty() {
            return None;
        }
        let mut dirs: Vec<PathBuf> = self.path_prepend.clone();
        if let Some(inherited) = inherited {
            dirs.extend(std::env::split_paths(inherited));
        }
        std::env::join_paths(dirs).ok()
    }
}

/// One command of a build, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Directory relative to the staged source root.
    pub working_dir: PathBuf,
    /// Program to run (looked up in `PATH` unless it contains a slash).
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Environment overlay for this step.
    #[serde(default, skip_serializing_if = "EnvOverlay::is_empty")]
    pub env: EnvOverlay,
}

impl BuildStep {
    /// Create a step running `program` in `working_dir`.
    pub fn new(working_dir: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            program: program.into(),
            args: Vec::new(),
            env: EnvOverlay::default(),
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Attach an environment overlay.
    pub fn env(mut self, env: EnvOverlay) -> Self {
        self.env = env;
        self
    }

    /// Program and arguments joined for display.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

/// The steps for one resource, plus what it needs to be staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePlan {
    /// The resource to stage.
    pub resource: ResourceDescriptor,
    /// Patch to apply after extraction, if its gate admitted it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// Resource whose installed output this one builds against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// Steps, in execution order.
    pub steps: Vec<BuildStep>,
}

impl ResourcePlan {
    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.resource.name
    }
}

/// The ordered, fully resolved build of a recipe.
///
/// The primary resource comes first, followed by each enabled sub-resource
/// in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPlan {
    /// Per-resource plans.
    pub resources: Vec<ResourcePlan>,
}

impl CommandPlan {
    /// The primary resource's plan.
    #[must_use]
    pub fn primary(&self) -> Option<&ResourcePlan> {
        self.resources.first()
    }

    /// Find a resource plan by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourcePlan> {
        self.resources.iter().find(|r| r.name() == name)
    }

    /// Position of a resource in the plan.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.resources.iter().position(|r| r.name() == name)
    }

    /// Total number of steps across all resources.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.resources.iter().map(|r| r.steps.len()).sum()
    }

    /// Check that every dependency is planned before its dependent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Other` naming the first out-of-order dependency.
    pub fn check_order(&self) -> Result<()> {
        for (index, plan) in self.resources.iter().enumerate() {
            if let Some(dep) = &plan.depends_on {
                match self.position(dep) {
                    Some(dep_index) if dep_index < index => {}
                    Some(_) => {
                        return Err(Error::Other(format!(
                            "{} is planned before its dependency {}",
                            plan.name(),
                            dep
                        )));
                    }
                    None => {
                        return Err(Error::Other(format!(
                            "{} depends on {}, which is not in the plan",
                            plan.name(),
                            dep
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Where a recipe installs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallLayout {
    /// Installation prefix.
    pub prefix: PathBuf,
}

impl InstallLayout {
    /// Create a layout rooted at `prefix`.
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `<prefix>/bin`
    #[must_use]
    pub fn bin(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// `<prefix>/lib`
    #[must_use]
    pub fn lib(&self) -> PathBuf {
        self.prefix.join("lib")
    }

    /// `<prefix>/share/man`
    #[must_use]
    pub fn man(&self) -> PathBuf {
        self.prefix.join("share").join("man")
    }
}

/// What ended up in the prefix after a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRecord {
    /// Installation prefix.
    pub prefix: PathBuf,
    /// Executables found under `<prefix>/bin`.
    pub installed_binaries: BTreeSet<PathBuf>,
}

impl InstallationRecord {
    /// Scan `<prefix>/bin` and record what is there.
    ///
    /// A missing `bin` directory yields an empty record rather than an error.
    pub fn scan(prefix: impl Into<PathBuf>) -> Result<Self> {
        let prefix = prefix.into();
        let bin = prefix.join("bin");
        let mut installed_binaries = BTreeSet::new();

        if bin.is_dir() {
            for entry in std::fs::read_dir(&bin).map_err(|e| Error::io(&bin, e))? {
                let entry = entry.map_err(|e| Error::io(&bin, e))?;
                installed_binaries.insert(entry.path());
            }
        }

        Ok(Self {
            prefix,
            installed_binaries,
        })
    }

    /// Locate an installed binary by path relative to the prefix.
    #[must_use]
    pub fn find(&self, relative: &Path) -> Option<&PathBuf> {
        let wanted = self.prefix.join(relative);
        self.installed_binaries.iter().find(|p| **p == wanted)
    }
}
