//! Platform facts used while planning a build.
//!
//! The planner never inspects the host itself. Facts are detected once
//! (or constructed directly in tests) and passed in, and every
//! platform-dependent decision is a pure predicate over them.
//!
//! # Example
//!
//! ```
//! use formula::platform::{OsVersion, PlatformFacts};
//!
//! let tiger = PlatformFacts::new("macos", Some(OsVersion::new(10, 4)), false);
//! assert!(tiger.requires_legacy_sqlite_patch());
//!
//! let linux = PlatformFacts::new("linux", None, true);
//! assert!(!linux.requires_legacy_sqlite_patch());
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::process::Command;
use std::str::FromStr;

/// macOS 10.5 "Leopard", the first release with
/// `OSAtomicCompareAndSwapPtrBarrier`.
pub const LEOPARD: OsVersion = OsVersion::new(10, 5);

/// Optional host-provided dependency an option may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostDependency {
    /// An X11 installation (headers and libraries).
    X11,
}

impl HostDependency {
    /// Display name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::X11 => "x11",
        }
    }
}

impl fmt::Display for HostDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// `major.minor` operating system version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OsVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl OsVersion {
    /// Create a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl PartialOrd for OsVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OsVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl FromStr for OsVersion {
    type Err = String;

    /// Parse "10.11", "10.11.6" or "14" (patch level is ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| format!("invalid OS version: '{s}'"))?
            .parse()
            .map_err(|_| format!("invalid OS version: '{s}'"))?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| format!("invalid OS version: '{s}'"))?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for OsVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OsVersion> for String {
    fn from(value: OsVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Facts about the build host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFacts {
    /// Operating system (e.g., "macos", "linux").
    pub os: String,
    /// OS version, when known.
    pub os_version: Option<OsVersion>,
    /// Whether 64-bit builds are preferred.
    pub prefer_64_bit: bool,
    /// Whether an X11 installation is available.
    #[serde(default)]
    pub x11_available: bool,
}

impl PlatformFacts {
    /// Create facts without X11.
    pub fn new(os: impl Into<String>, os_version: Option<OsVersion>, prefer_64_bit: bool) -> Self {
        Self {
            os: os.into(),
            os_version,
            prefer_64_bit,
            x11_available: false,
        }
    }

    /// Mark X11 as available.
    pub fn with_x11(mut self) -> Self {
        self.x11_available = true;
        self
    }

    /// Detect facts about the running host.
    #[must_use]
    pub fn detect() -> Self {
        let os = std::env::consts::OS.to_string();
        let os_version = detect_os_version(&os);
        let facts = Self {
            prefer_64_bit: cfg!(target_pointer_width = "64"),
            x11_available: detect_x11(),
            os,
            os_version,
        };
        log::debug!(
            "platform: {} {} (64-bit preferred: {}, x11: {})",
            facts.os,
            facts
                .os_version
                .map_or_else(|| "unknown".to_string(), |v| v.to_string()),
            facts.prefer_64_bit,
            facts.x11_available
        );
        facts
    }

    /// Check if this platform is macOS.
    #[must_use]
    pub fn is_macos(&self) -> bool {
        self.os == "macos"
    }

    /// Whether the host runs `os` at a version strictly below `version`.
    ///
    /// Unknown versions never match.
    #[must_use]
    pub fn is_os_below(&self, os: &str, version: OsVersion) -> bool {
        self.os == os && self.os_version.is_some_and(|v| v < version)
    }

    /// Whether the bundled sqlite needs the pre-Leopard atomics patch.
    #[must_use]
    pub fn requires_legacy_sqlite_patch(&self) -> bool {
        self.is_os_below("macos", LEOPARD)
    }

    /// Whether a host dependency is satisfied.
    #[must_use]
    pub fn has(&self, dependency: HostDependency) -> bool {
        match dependency {
            HostDependency::X11 => self.x11_available,
        }
    }
}

/// Condition under which a resource's inline patch is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchGate {
    /// Operating system the patch targets.
    pub os: String,
    /// Apply only below this version.
    pub below: OsVersion,
}

impl PatchGate {
    /// Whether the patch should be applied on this platform.
    #[must_use]
    pub fn admits(&self, facts: &PlatformFacts) -> bool {
        facts.is_os_below(&self.os, self.below)
    }
}

fn detect_os_version(os: &str) -> Option<OsVersion> {
    if os != "macos" {
        return None;
    }
    let output = Command::new("sw_vers").arg("-productVersion").output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).parse().ok()
}

fn detect_x11() -> bool {
    which::which("xdpyinfo").is_ok()
        || std::path::Path::new("/opt/X11/include/X11/Xlib.h").exists()
        || std::path::Path::new("/usr/include/X11/Xlib.h").exists()
}
