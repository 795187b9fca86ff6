//! Recipe definitions.
//!
//! A [`Recipe`] is plain data: the primary resource, optional
//! sub-resources, the options that switch them on and off, how each one is
//! configured and built, and the smoke test to run afterwards. It is what a
//! recipe TOML file deserializes into, and what [`crate::tcl_tk::recipe`]
//! builds in code.
//!
//! Arguments may use the placeholders `{prefix}`, `{bin}`, `{lib}` and
//! `{man}`; they are substituted when the plan is built, never later.

use crate::error::{Error, Result};
use crate::options::{self, OptionSet, OptionSpec, ResolvedOptions};
use crate::platform::{PatchGate, PlatformFacts};
use crate::plan;
use crate::types::{CommandPlan, InstallLayout, ResourceDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// A complete build recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe name (e.g., "tcl-tk").
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Project homepage.
    #[serde(default)]
    pub homepage: String,
    /// The resource everything else depends on.
    pub primary: ResourceSpec,
    /// Sub-resources, built after the primary in this order.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// Declared options.
    #[serde(default)]
    pub options: Vec<OptionSpec>,
    /// Deprecated flag spellings, `alias -> canonical`.
    #[serde(default)]
    pub deprecated: BTreeMap<String, String>,
    /// Option pairs that cannot both be on.
    #[serde(default)]
    pub exclusive: Vec<[String; 2]>,
    /// Post-install smoke test.
    #[serde(default)]
    pub test: Option<SmokeTest>,
}

/// A resource plus how to build it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// What to fetch.
    #[serde(flatten)]
    pub descriptor: ResourceDescriptor,
    /// Option that must be on for this resource to be built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_by: Option<String>,
    /// Resource whose installed output this one needs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// Restricts when the inline patch is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_gate: Option<PatchGate>,
    /// Build instructions.
    #[serde(default)]
    pub build: BuildScript,
}

impl ResourceSpec {
    /// Create a spec with an empty build script.
    #[must_use]
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor,
            enabled_by: None,
            depends_on: None,
            patch_gate: None,
            build: BuildScript::default(),
        }
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// How a staged resource is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildScript {
    /// Directory (relative to the source root) all steps run in.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Configure invocation, run first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configure: Option<ConfigureScript>,
    /// Steps after configure.
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
    /// Put `<prefix>/bin` first on `PATH` for this resource's steps.
    #[serde(default)]
    pub prepend_bin_to_path: bool,
}

impl Default for BuildScript {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            configure: None,
            steps: Vec::new(),
            prepend_bin_to_path: false,
        }
    }
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

/// The `./configure` call of a resource.
///
/// Arguments come out in a fixed order: `--prefix` and `--mandir`, then
/// `args`, then enabled option flags (if `option_flags`), then the word
/// width flag (if the platform prefers 64-bit), then matching `rules`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureScript {
    /// Program, usually `./configure`.
    #[serde(default = "default_configure")]
    pub program: String,
    /// Unconditional extra arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Append the configure flags of enabled options.
    #[serde(default)]
    pub option_flags: bool,
    /// Flag appended when the platform prefers 64-bit builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_width_flag: Option<String>,
    /// Option-conditional arguments.
    #[serde(default)]
    pub rules: Vec<ArgRule>,
}

impl Default for ConfigureScript {
    fn default() -> Self {
        Self {
            program: default_configure(),
            args: Vec::new(),
            option_flags: false,
            word_width_flag: None,
            rules: Vec::new(),
        }
    }
}

fn default_configure() -> String {
    "./configure".to_string()
}

/// Arguments added only when options match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgRule {
    /// Option that must be on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<String>,
    /// Option that must be off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub without: Option<String>,
    /// Arguments to add.
    pub args: Vec<String>,
}

impl ArgRule {
    /// Rule matching when `option` is on.
    pub fn with<I, S>(option: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            with: Some(option.into()),
            without: None,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the rule applies.
    #[must_use]
    pub fn matches(&self, options: &ResolvedOptions) -> bool {
        self.with.as_deref().is_none_or(|o| options.enabled(o))
            && self.without.as_deref().is_none_or(|o| !options.enabled(o))
    }
}

/// A command after configure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// Program to run.
    pub program: String,
    /// Arguments, placeholders allowed.
    #[serde(default)]
    pub args: Vec<String>,
}

impl StepTemplate {
    /// Create a step template.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Minimal check that the installed program runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeTest {
    /// Executable, relative to the prefix (e.g., `bin/tclsh`).
    pub executable: PathBuf,
    /// Text piped to stdin.
    #[serde(default)]
    pub input: String,
    /// Expected stdout, compared after removing one trailing newline.
    pub expected: String,
}

impl Recipe {
    /// Parse a recipe from TOML.
    ///
    /// Only the shape is checked here; call [`Recipe::validate`] for the
    /// cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedDescriptor` if the text is not a valid recipe.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::malformed("recipe", e.to_string()))
    }

    /// Render the recipe as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("cannot serialize recipe: {e}")))
    }

    /// Check structural invariants across the whole recipe.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedDescriptor` for invalid descriptors, duplicate
    /// resource names, references to undeclared options or resources, or
    /// deprecated aliases that do not map to a `with-`/`without-` flag.
    pub fn validate(&self) -> Result<()> {
        let option_names: HashSet<&str> = self.options.iter().map(|o| o.name.as_str()).collect();
        let known_option = |name: &str, context: &str| -> Result<()> {
            if option_names.contains(name) {
                Ok(())
            } else {
                Err(Error::malformed(
                    &self.name,
                    format!("{context} refers to undeclared option '{name}'"),
                ))
            }
        };

        let mut seen: Vec<&str> = Vec::new();
        for spec in std::iter::once(&self.primary).chain(&self.resources) {
            spec.descriptor.validate()?;
            let name = spec.name();
            if seen.contains(&name) {
                return Err(Error::malformed(name, "duplicate resource name"));
            }
            if let Some(option) = &spec.enabled_by {
                known_option(option, name)?;
            }
            if let Some(dep) = &spec.depends_on
                && !seen.contains(&dep.as_str())
            {
                return Err(Error::malformed(
                    name,
                    format!("depends on '{dep}', which is not declared before it"),
                ));
            }
            if let Some(configure) = &spec.build.configure {
                for rule in &configure.rules {
                    for option in rule.with.iter().chain(&rule.without) {
                        known_option(option, name)?;
                    }
                }
            }
            seen.push(name);
        }

        for [a, b] in &self.exclusive {
            known_option(a, "exclusive pair")?;
            known_option(b, "exclusive pair")?;
        }

        for (alias, canonical) in &self.deprecated {
            let flag = options::strip_dashes(canonical);
            let Some((option, _)) = options::parse_flag(flag) else {
                return Err(Error::malformed(
                    &self.name,
                    format!("deprecated alias '{alias}' maps to '{canonical}', not a flag"),
                ));
            };
            known_option(option, "deprecated alias")?;
        }

        Ok(())
    }

    /// Fresh option set with every option at its declared default.
    #[must_use]
    pub fn option_set(&self) -> OptionSet {
        let mut set = OptionSet::new(self.options.clone());
        for (alias, canonical) in &self.deprecated {
            set.deprecate(alias.as_str(), canonical.as_str());
        }
        for [a, b] in &self.exclusive {
            set.exclusive(a.as_str(), b.as_str());
        }
        set
    }

    /// All resources, primary first.
    pub fn all_resources(&self) -> impl Iterator<Item = &ResourceSpec> {
        std::iter::once(&self.primary).chain(&self.resources)
    }

    /// Build the command plan for these options and platform.
    pub fn plan(
        &self,
        options: &OptionSet,
        facts: &PlatformFacts,
        layout: &InstallLayout,
    ) -> Result<CommandPlan> {
        self.validate()?;
        plan::build(&self.primary, &self.resources, options, facts, layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcl_tk;

    #[test]
    fn test_builtin_recipe_is_valid() {
        tcl_tk::recipe().validate().unwrap();
    }

    #[test]
    fn test_duplicate_resource_name() {
        let mut recipe = tcl_tk::recipe();
        recipe.resources[1].descriptor.name = "tk".into();
        assert!(matches!(
            recipe.validate(),
            Err(Error::MalformedDescriptor { .. })
        ));
    }

    #[test]
    fn test_dependency_must_be_declared_earlier() {
        let mut recipe = tcl_tk::recipe();
        recipe.resources[0].depends_on = Some("tcllib".into());
        let err = recipe.validate().unwrap_err();
        assert!(err.to_string().contains("tcllib"));
    }

    #[test]
    fn test_undeclared_option_reference() {
        let mut recipe = tcl_tk::recipe();
        recipe.resources[0].enabled_by = Some("gui".into());
        assert!(recipe.validate().is_err());

        let mut recipe = tcl_tk::recipe();
        recipe.exclusive.push(["x11".into(), "wayland".into()]);
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_invalid_descriptor_propagates() {
        let mut recipe = tcl_tk::recipe();
        recipe.resources[0].descriptor.checksum_hex = "deadbeef".into();
        assert!(matches!(
            recipe.validate(),
            Err(Error::MalformedDescriptor { ref name, .. }) if name == "tk"
        ));
    }

    #[test]
    fn test_option_set_carries_aliases_and_pairs() {
        let set = tcl_tk::recipe().option_set();
        assert_eq!(
            set.aliases().get("enable-threads").map(String::as_str),
            Some("with-threads")
        );
        assert_eq!(set.exclusive_pairs().len(), 1);
    }

    const HELLO_TOML: &str = r#"
name = "hello"
description = "Greeter"
exclusive = [["gtk", "tty"]]

[primary]
name = "hello"
url = "https://example.com/hello-1.0.tar.gz"
version = "1.0"
sha256 = "9e6ed94c981c1d0c5f5fefb8112d06c6bf4d050a7327e95e71d417c416519c8d"
patch_gate = { os = "macos", below = "10.5" }
inline_patch = "--- a/x\n+++ b/x\n"

[primary.build]
working_dir = "src"
steps = [{ program = "make", args = ["install"] }]

[primary.build.configure]
option_flags = true
rules = [{ with = "gtk", args = ["--with-gtk"] }]

[[resources]]
name = "docs"
url = "https://example.com/hello-docs-1.0.tar.gz"
version = "1.0"
sha256 = "08f99df85e5dc9c4271762163c6aabb962c8b297dc5c4c1af8bdd05fc2dd26c1"
enabled_by = "docs"
depends_on = "hello"

[[options]]
name = "docs"
default = true

[[options]]
name = "gtk"
requires = "x11"

[[options]]
name = "tty"
default = true
configure_args = ["--enable-tty"]

[deprecated]
"enable-gtk" = "with-gtk"

[test]
executable = "bin/hello"
expected = "hi"
"#;

    #[test]
    fn test_from_toml() {
        let recipe = Recipe::from_toml(HELLO_TOML).unwrap();
        recipe.validate().unwrap();

        assert_eq!(recipe.name, "hello");
        assert_eq!(recipe.primary.build.working_dir, PathBuf::from("src"));
        let configure = recipe.primary.build.configure.as_ref().unwrap();
        assert_eq!(configure.program, "./configure");
        assert!(configure.option_flags);
        assert_eq!(
            recipe.primary.patch_gate.as_ref().unwrap().below,
            crate::platform::LEOPARD
        );
        assert_eq!(recipe.resources[0].build, BuildScript::default());
        assert_eq!(
            recipe.options[1].requires,
            Some(crate::platform::HostDependency::X11)
        );
        assert_eq!(recipe.test.as_ref().unwrap().input, "");
    }

    #[test]
    fn test_from_toml_plans() {
        let recipe = Recipe::from_toml(HELLO_TOML).unwrap();
        let mut options = recipe.option_set();
        options.apply(["--enable-gtk"]).unwrap();

        let facts = PlatformFacts::new("linux", None, true).with_x11();
        let plan = recipe
            .plan(&options, &facts, &InstallLayout::new("/opt/hello"))
            .unwrap();
        let configure = &plan.primary().unwrap().steps[0];
        assert_eq!(
            configure.args,
            vec!["--prefix=/opt/hello", "--mandir=/opt/hello/share/man", "--with-gtk"]
        );
        // Linux never gets the macOS-only patch.
        assert!(plan.primary().unwrap().patch.is_none());
        assert_eq!(plan.resources.len(), 2);
    }

    #[test]
    fn test_deprecated_alias_to_undeclared_option() {
        let text = HELLO_TOML.replace(
            r#""enable-gtk" = "with-gtk""#,
            r#""enable-gtk" = "with-bar""#,
        );
        let recipe = Recipe::from_toml(&text).unwrap();
        let err = recipe.validate().unwrap_err();
        assert!(matches!(err, Error::MalformedDescriptor { .. }));
        assert!(err.to_string().contains("'bar'"));
    }

    #[test]
    fn test_deprecated_alias_must_map_to_a_flag() {
        let text = HELLO_TOML.replace(r#""enable-gtk" = "with-gtk""#, r#""enable-gtk" = "gtk""#);
        let recipe = Recipe::from_toml(&text).unwrap();
        assert!(matches!(
            recipe.validate(),
            Err(Error::MalformedDescriptor { ref name, .. }) if name == "hello"
        ));

        let mut recipe = tcl_tk::recipe();
        recipe
            .deprecated
            .insert("enable-threads".into(), "threads".into());
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(matches!(
            Recipe::from_toml("name = 3"),
            Err(Error::MalformedDescriptor { .. })
        ));
    }

    #[test]
    fn test_builtin_recipe_toml_round_trip() {
        let recipe = tcl_tk::recipe();
        let text = recipe.to_toml().unwrap();
        assert_eq!(Recipe::from_toml(&text).unwrap(), recipe);
    }

    #[test]
    fn test_arg_rule_matches() {
        let mut set = tcl_tk::recipe().option_set();
        set.apply(["--with-x11"]).unwrap();
        let resolved = set.resolve().unwrap();

        assert!(ArgRule::with("x11", ["--with-x"]).matches(&resolved));
        assert!(!ArgRule::with("aqua", ["--enable-aqua=yes"]).matches(&resolved));

        let rule = ArgRule {
            with: None,
            without: Some("threads".into()),
            args: vec![],
        };
        assert!(rule.matches(&resolved));
    }
}
