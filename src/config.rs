//! User configuration and recipe loading.

use crate::paths;
use anyhow::{Context, Result};
use formula::{Recipe, tcl_tk};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the recipe used when none is given.
pub const DEFAULT_RECIPE: &str = "tcl-tk";

/// Contents of `config.toml`. Every field is optional; CLI flags win.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Install prefix (`~` and `$VARS` expanded).
    pub prefix: Option<String>,
    /// Download cache directory.
    pub cache_dir: Option<String>,
    /// Parent directory for staging directories.
    pub staging_dir: Option<String>,
    /// Keep staging directories after the build.
    pub keep_staging: bool,
    /// Per-step timeout in seconds.
    pub step_timeout_secs: Option<u64>,
}

impl KilnConfig {
    /// Load the config file, or defaults if there is none.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load a specific config file, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config format in {}", path.display()))
    }

    /// Install prefix for a recipe: the override, the configured prefix, or
    /// `<data_dir>/cellar/<name>/<version>`.
    pub fn prefix_for(&self, recipe: &Recipe, cli_override: Option<&Path>) -> Result<PathBuf> {
        if let Some(prefix) = cli_override {
            return Ok(prefix.to_path_buf());
        }
        if let Some(prefix) = &self.prefix {
            return Ok(paths::expand(prefix));
        }
        Ok(paths::data_dir()?
            .join("cellar")
            .join(&recipe.name)
            .join(&recipe.primary.descriptor.version))
    }

    /// Download cache directory.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => Ok(paths::cache_dir()?.join("downloads")),
        }
    }

    /// Staging parent directory, `None` for the system temp dir.
    pub fn staging_dir(&self) -> Option<PathBuf> {
        self.staging_dir.as_deref().map(paths::expand)
    }

    /// Step timeout, with the CLI value taking precedence.
    pub fn step_timeout(&self, cli_secs: Option<u64>) -> Option<Duration> {
        cli_secs
            .or(self.step_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Load a recipe: the built-in `tcl-tk` by name (or when none is given),
/// otherwise a TOML file.
pub fn load_recipe(name_or_path: Option<&str>) -> Result<Recipe> {
    match name_or_path {
        None | Some(DEFAULT_RECIPE) => Ok(tcl_tk::recipe()),
        Some(path) => {
            let path = paths::expand(path);
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Could not read recipe {}", path.display()))?;
            let recipe = Recipe::from_toml(&content)
                .with_context(|| format!("Invalid recipe in {}", path.display()))?;
            log::debug!("Loaded recipe {} from {}", recipe.name, path.display());
            Ok(recipe)
        }
    }
}
