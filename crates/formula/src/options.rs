//! Build-time options.
//!
//! An [`OptionSet`] starts from the defaults a recipe declares, takes the
//! user's `--with-*` / `--without-*` flags exactly once, and is then resolved
//! into [`ResolvedOptions`] for the planner. Deprecated flag spellings are
//! mapped to their replacement with a [`Warning`]; unknown flags are errors.
//!
//! # Example
//!
//! ```
//! use formula::options::{OptionSet, OptionSpec};
//!
//! let mut options = OptionSet::new(vec![
//!     OptionSpec::new("threads", "Build with multithreading support", false),
//! ]);
//! options.deprecate("enable-threads", "with-threads");
//!
//! let warnings = options.apply(["--enable-threads"]).unwrap();
//! assert_eq!(warnings.len(), 1);
//! assert!(options.resolve().unwrap().enabled("threads"));
//! ```

use crate::error::{Error, Result};
use crate::platform::HostDependency;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declaration of one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    /// Canonical name (e.g., "threads"), used as `--with-threads`.
    pub name: String,
    /// Help text.
    #[serde(default)]
    pub description: String,
    /// Whether the option is on when the user says nothing.
    #[serde(default)]
    pub default: bool,
    /// Configure flags this option contributes when enabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configure_args: Vec<String>,
    /// Host dependency needed when the option is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<HostDependency>,
}

impl OptionSpec {
    /// Declare an option.
    pub fn new(name: impl Into<String>, description: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default,
            configure_args: Vec::new(),
            requires: None,
        }
    }

    /// Add a configure flag contributed by this option.
    pub fn configure_arg(mut self, arg: impl Into<String>) -> Self {
        self.configure_args.push(arg.into());
        self
    }

    /// Require a host dependency when enabled.
    pub fn requires(mut self, dependency: HostDependency) -> Self {
        self.requires = Some(dependency);
        self
    }

    /// The flag that flips this option away from its default.
    #[must_use]
    pub fn toggle_flag(&self) -> String {
        if self.default {
            format!("without-{}", self.name)
        } else {
            format!("with-{}", self.name)
        }
    }
}

/// Current state of one option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionState {
    /// Effective value.
    pub enabled: bool,
    /// Declared default.
    pub default: bool,
    /// What the user forced, if anything.
    pub explicit: Option<bool>,
}

/// Non-fatal notices produced while applying flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A deprecated flag was used and mapped to its replacement.
    DeprecatedOption {
        /// Flag as given (without leading dashes).
        alias: String,
        /// Flag it was mapped to.
        canonical: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeprecatedOption { alias, canonical } => {
                write!(f, "--{alias} is deprecated, use --{canonical} instead")
            }
        }
    }
}

/// Declared options, their aliases and exclusions, plus the user's choices.
#[derive(Debug, Clone, Default)]
pub struct OptionSet {
    specs: Vec<OptionSpec>,
    states: BTreeMap<String, OptionState>,
    aliases: BTreeMap<String, String>,
    exclusive: Vec<(String, String)>,
    applied: bool,
}

impl OptionSet {
    /// Create a set from declarations, every option at its default.
    #[must_use]
    pub fn new(specs: Vec<OptionSpec>) -> Self {
        let states = specs
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    OptionState {
                        enabled: s.default,
                        default: s.default,
                        explicit: None,
                    },
                )
            })
            .collect();
        Self {
            specs,
            states,
            aliases: BTreeMap::new(),
            exclusive: Vec::new(),
            applied: false,
        }
    }

    /// Register a deprecated flag spelling (e.g., `enable-threads` for
    /// `with-threads`).
    pub fn deprecate(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.aliases.insert(
            strip_dashes(&alias.into()).to_string(),
            strip_dashes(&canonical.into()).to_string(),
        );
    }

    /// Declare two options that cannot both be on.
    pub fn exclusive(&mut self, first: impl Into<String>, second: impl Into<String>) {
        self.exclusive.push((first.into(), second.into()));
    }

    /// Declared options in declaration order.
    #[must_use]
    pub fn specs(&self) -> &[OptionSpec] {
        &self.specs
    }

    /// Deprecated aliases, `alias -> canonical`.
    #[must_use]
    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    /// Mutually exclusive pairs.
    #[must_use]
    pub fn exclusive_pairs(&self) -> &[(String, String)] {
        &self.exclusive
    }

    /// Whether an option is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// State of an option.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<OptionState> {
        self.states.get(name).copied()
    }

    /// Apply user flags.
    ///
    /// Accepts `with-NAME`, `without-NAME`, `enable-NAME` and `disable-NAME`,
    /// with or without leading dashes. Deprecated aliases are resolved first.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownOption` if a flag names no declared option
    /// - `Error::ConflictingOptions` if an option is forced both on and off
    /// - `Error::Other` if flags were already applied
    pub fn apply<I, S>(&mut self, flags: I) -> Result<Vec<Warning>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.applied {
            return Err(Error::Other("options were already applied".to_string()));
        }
        self.applied = true;

        let mut warnings = Vec::new();
        for flag in flags {
            let given = strip_dashes(flag.as_ref()).to_string();

            let canonical = match self.aliases.get(&given) {
                Some(canonical) => {
                    let warning = Warning::DeprecatedOption {
                        alias: given.clone(),
                        canonical: canonical.clone(),
                    };
                    log::warn!("{warning}");
                    warnings.push(warning);
                    canonical.clone()
                }
                None => given.clone(),
            };

            let (name, value) =
                parse_flag(&canonical).ok_or_else(|| Error::UnknownOption(given.clone()))?;
            let state = self
                .states
                .get_mut(name)
                .ok_or_else(|| Error::UnknownOption(given.clone()))?;

            if state.explicit == Some(!value) {
                return Err(Error::ConflictingOptions {
                    first: format!("with-{name}"),
                    second: format!("without-{name}"),
                });
            }
            state.explicit = Some(value);
            state.enabled = value;
            log::debug!("option {name} forced {}", if value { "on" } else { "off" });
        }

        Ok(warnings)
    }

    /// Resolve exclusive pairs and freeze the result.
    ///
    /// Forcing one side of an exclusive pair turns the other side to the
    /// opposite value unless the user also forced it.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConflictingOptions` if both sides of a pair were forced
    /// to the same value, or if both end up on.
    pub fn resolve(&self) -> Result<ResolvedOptions> {
        let mut states = self.states.clone();

        for (first, second) in &self.exclusive {
            let (Some(a), Some(b)) = (states.get(first).copied(), states.get(second).copied())
            else {
                return Err(Error::Other(format!(
                    "exclusive pair {first}/{second} names an undeclared option"
                )));
            };

            let (a_on, b_on) = match (a.explicit, b.explicit) {
                (Some(x), Some(y)) if x == y => {
                    return Err(Error::ConflictingOptions {
                        first: first.clone(),
                        second: second.clone(),
                    });
                }
                (Some(x), Some(y)) => (x, y),
                (Some(x), None) => (x, !x),
                (None, Some(y)) => (!y, y),
                (None, None) => (a.enabled, b.enabled),
            };

            if a_on && b_on {
                return Err(Error::ConflictingOptions {
                    first: first.clone(),
                    second: second.clone(),
                });
            }
            if let Some(s) = states.get_mut(first) {
                s.enabled = a_on;
            }
            if let Some(s) = states.get_mut(second) {
                s.enabled = b_on;
            }
        }

        let enabled = self
            .specs
            .iter()
            .filter(|spec| states.get(&spec.name).is_some_and(|s| s.enabled))
            .map(|spec| spec.name.clone())
            .collect();

        Ok(ResolvedOptions {
            specs: self.specs.clone(),
            enabled,
        })
    }
}

/// Frozen option values, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    specs: Vec<OptionSpec>,
    enabled: Vec<String>,
}

impl ResolvedOptions {
    /// Whether an option is on.
    #[must_use]
    pub fn enabled(&self, name: &str) -> bool {
        self.enabled.iter().any(|n| n == name)
    }

    /// Names of enabled options, in declaration order.
    #[must_use]
    pub fn enabled_names(&self) -> &[String] {
        &self.enabled
    }

    /// Enabled option declarations, in declaration order.
    pub fn enabled_specs(&self) -> impl Iterator<Item = &OptionSpec> {
        self.specs.iter().filter(|s| self.enabled(&s.name))
    }

    /// Configure flags of every enabled option, in declaration order.
    #[must_use]
    pub fn configure_args(&self) -> Vec<String> {
        self.enabled_specs()
            .flat_map(|s| s.configure_args.iter().cloned())
            .collect()
    }
}

pub(crate) fn strip_dashes(flag: &str) -> &str {
    flag.trim().trim_start_matches('-')
}

/// Split `with-foo` / `without-foo` / `enable-foo` / `disable-foo`.
pub(crate) fn parse_flag(flag: &str) -> Option<(&str, bool)> {
    // "without-" must be checked before "with-"
    let parsed = if let Some(name) = flag.strip_prefix("without-") {
        (name, false)
    } else if let Some(name) = flag.strip_prefix("with-") {
        (name, true)
    } else if let Some(name) = flag.strip_prefix("disable-") {
        (name, false)
    } else if let Some(name) = flag.strip_prefix("enable-") {
        (name, true)
    } else {
        return None;
    };
    if parsed.0.is_empty() { None } else { Some(parsed) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcl_tk_options() -> OptionSet {
        let mut set = OptionSet::new(vec![
            OptionSpec::new("threads", "Build with multithreading support", false)
                .configure_arg("--enable-threads"),
            OptionSpec::new("tcllib", "Build tcllib (utility modules)", true),
            OptionSpec::new("tk", "Build the Tk (window toolkit)", true),
            OptionSpec::new("x11", "Build X11-based Tk instead of Aqua-based Tk", false)
                .requires(HostDependency::X11),
            OptionSpec::new("aqua", "Build Aqua-based Tk", true),
        ]);
        set.deprecate("enable-threads", "with-threads");
        set.exclusive("x11", "aqua");
        set
    }

    #[test]
    fn test_defaults() {
        let set = tcl_tk_options();
        let resolved = set.resolve().unwrap();
        assert!(!resolved.enabled("threads"));
        assert!(resolved.enabled("tk"));
        assert!(resolved.enabled("tcllib"));
        assert!(resolved.enabled("aqua"));
        assert!(!resolved.enabled("x11"));
        assert!(resolved.configure_args().is_empty());
    }

    #[test]
    fn test_apply_with_and_without() {
        let mut set = tcl_tk_options();
        let warnings = set.apply(["--with-threads", "--without-tk"]).unwrap();
        assert!(warnings.is_empty());

        let resolved = set.resolve().unwrap();
        assert!(resolved.enabled("threads"));
        assert!(!resolved.enabled("tk"));
        assert_eq!(resolved.configure_args(), vec!["--enable-threads"]);
        assert_eq!(set.state("tk").unwrap().explicit, Some(false));
    }

    #[test]
    fn test_unknown_option() {
        let mut set = tcl_tk_options();
        let err = set.apply(["--with-python"]).unwrap_err();
        assert!(matches!(err, Error::UnknownOption(ref name) if name == "with-python"));

        let mut set = tcl_tk_options();
        assert!(matches!(
            set.apply(["--frobnicate"]),
            Err(Error::UnknownOption(_))
        ));
    }

    #[test]
    fn test_deprecated_alias_maps_to_canonical() {
        let mut via_alias = tcl_tk_options();
        let warnings = via_alias.apply(["--enable-threads"]).unwrap();
        assert_eq!(
            warnings,
            vec![Warning::DeprecatedOption {
                alias: "enable-threads".into(),
                canonical: "with-threads".into(),
            }]
        );

        let mut via_canonical = tcl_tk_options();
        via_canonical.apply(["--with-threads"]).unwrap();

        assert_eq!(via_alias.resolve().unwrap(), via_canonical.resolve().unwrap());
    }

    #[test]
    fn test_forced_on_and_off_conflicts() {
        let mut set = tcl_tk_options();
        let err = set.apply(["--with-threads", "--without-threads"]).unwrap_err();
        assert!(matches!(err, Error::ConflictingOptions { .. }));
    }

    #[test]
    fn test_repeated_flag_is_fine() {
        let mut set = tcl_tk_options();
        set.apply(["--with-threads", "with-threads"]).unwrap();
        assert!(set.resolve().unwrap().enabled("threads"));
    }

    #[test]
    fn test_apply_only_once() {
        let mut set = tcl_tk_options();
        set.apply(["--with-threads"]).unwrap();
        assert!(set.apply(["--without-tk"]).is_err());
    }

    #[test]
    fn test_exclusive_pair_forcing_one_side_flips_other() {
        let mut set = tcl_tk_options();
        set.apply(["--with-x11"]).unwrap();
        let resolved = set.resolve().unwrap();
        assert!(resolved.enabled("x11"));
        assert!(!resolved.enabled("aqua"));

        let mut set = tcl_tk_options();
        set.apply(["--without-aqua"]).unwrap();
        let resolved = set.resolve().unwrap();
        assert!(resolved.enabled("x11"));
        assert!(!resolved.enabled("aqua"));
    }

    #[test]
    fn test_exclusive_pair_both_forced_on_conflicts() {
        let mut set = tcl_tk_options();
        set.apply(["--with-x11", "--with-aqua"]).unwrap();
        match set.resolve() {
            Err(Error::ConflictingOptions { first, second }) => {
                assert_eq!(first, "x11");
                assert_eq!(second, "aqua");
            }
            other => panic!("Expected ConflictingOptions, got {other:?}"),
        }
    }

    #[test]
    fn test_exclusive_pair_both_forced_off_conflicts() {
        let mut set = tcl_tk_options();
        set.apply(["--without-x11", "--without-aqua"]).unwrap();
        assert!(matches!(
            set.resolve(),
            Err(Error::ConflictingOptions { .. })
        ));
    }

    #[test]
    fn test_exclusive_pair_undeclared() {
        let mut set = OptionSet::new(vec![OptionSpec::new("a", "", false)]);
        set.exclusive("a", "b");
        assert!(set.resolve().is_err());
    }

    #[test]
    fn test_toggle_flag() {
        assert_eq!(OptionSpec::new("tk", "", true).toggle_flag(), "without-tk");
        assert_eq!(OptionSpec::new("x11", "", false).toggle_flag(), "with-x11");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("with-tk"), Some(("tk", true)));
        assert_eq!(parse_flag("without-tk"), Some(("tk", false)));
        assert_eq!(parse_flag("enable-threads"), Some(("threads", true)));
        assert_eq!(parse_flag("disable-threads"), Some(("threads", false)));
        assert_eq!(parse_flag("with-"), None);
        assert_eq!(parse_flag("tk"), None);
    }

    #[test]
    fn test_enabled_order_follows_declaration() {
        let mut set = tcl_tk_options();
        set.apply(["--with-x11", "--with-threads"]).unwrap();
        let resolved = set.resolve().unwrap();
        assert_eq!(
            resolved.enabled_names(),
            &["threads", "tcllib", "tk", "x11"]
        );
    }
}
