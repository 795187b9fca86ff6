//! Centralized path resolution for kiln
//!
//! # Environment Variables
//!
//! - `KILN_CONFIG_DIR` - Override config directory
//! - `KILN_CACHE_DIR` - Override download cache directory
//! - `KILN_DATA_DIR` - Override data directory (default install prefixes)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `KILN_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/kiln` (if set)
//! 3. `~/.config/kiln`
//!
//! cache_dir() and data_dir() follow the same order with
//! `XDG_CACHE_HOME` (`~/.cache/kiln`) and `XDG_DATA_HOME`
//! (`~/.local/share/kiln`).

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "KILN_CONFIG_DIR";

/// Environment variable for cache directory override
pub const ENV_CACHE_DIR: &str = "KILN_CACHE_DIR";

/// Environment variable for data directory override
pub const ENV_DATA_DIR: &str = "KILN_DATA_DIR";

/// Name of the config file inside config_dir()
pub const CONFIG_FILE: &str = "config.toml";

/// Get the kiln config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve(ENV_CONFIG_DIR, "XDG_CONFIG_HOME", &[".config"])
}

/// Get the download cache directory path
pub fn cache_dir() -> Result<PathBuf> {
    resolve(ENV_CACHE_DIR, "XDG_CACHE_HOME", &[".cache"])
}

/// Get the data directory path (parent of default install prefixes)
pub fn data_dir() -> Result<PathBuf> {
    resolve(ENV_DATA_DIR, "XDG_DATA_HOME", &[".local", "share"])
}

/// Path of the config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

fn resolve(override_var: &str, xdg_var: &str, home_default: &[&str]) -> Result<PathBuf> {
    // 1. Explicit override
    if let Ok(dir) = std::env::var(override_var) {
        let path = expand(&dir);
        log::debug!("Using {} from env: {}", override_var, path.display());
        return Ok(path);
    }

    // 2. XDG base directory
    if let Ok(base) = std::env::var(xdg_var)
        && !base.is_empty()
    {
        let path = PathBuf::from(base).join("kiln");
        log::debug!("Using {}: {}", xdg_var, path.display());
        return Ok(path);
    }

    // 3. Home default
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home_default
        .iter()
        .fold(home, |acc, part| acc.join(part))
        .join("kiln");
    log::debug!("Using default dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as they are.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    /// Serializes tests that touch the process environment.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Run `f` with `key` set to `value` (or removed), restoring it afterwards.
    pub(crate) fn with_env<F, R>(key: &str, value: Option<&str>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: callers hold ENV_LOCK, so no other test reads the environment concurrently
        unsafe {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        let result = f();
        // SAFETY: as above
        unsafe {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        with_env(ENV_CONFIG_DIR, Some("/custom/kiln/config"), || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/kiln/config"));
            assert_eq!(
                config_file().unwrap(),
                PathBuf::from("/custom/kiln/config/config.toml")
            );
        });
    }

    #[test]
    fn test_config_dir_env_override_with_tilde() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let home = dirs::home_dir().unwrap();
        with_env(ENV_CONFIG_DIR, Some("~/dotfiles/kiln"), || {
            assert_eq!(config_dir().unwrap(), home.join("dotfiles").join("kiln"));
        });
    }

    #[test]
    fn test_xdg_cache_home() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        with_env(ENV_CACHE_DIR, None, || {
            with_env("XDG_CACHE_HOME", Some("/tmp/xdg-cache-test"), || {
                assert_eq!(cache_dir().unwrap(), PathBuf::from("/tmp/xdg-cache-test/kiln"));
            });
        });
    }

    #[cfg(unix)]
    #[test]
    fn test_default_data_dir_unix() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        with_env(ENV_DATA_DIR, None, || {
            with_env("XDG_DATA_HOME", None, || {
                let home = dirs::home_dir().unwrap();
                assert_eq!(
                    data_dir().unwrap(),
                    home.join(".local").join("share").join("kiln")
                );
            });
        });
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/opt/tcl-tk"), PathBuf::from("/opt/tcl-tk"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$KILN_NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$KILN_NONEXISTENT_VAR_12345/file"));
    }
}
