//! Command plan builder.
//!
//! Turns resource specs, resolved options and platform facts into a
//! [`CommandPlan`]. This is a pure function: the same inputs always give
//! the same plan, argument for argument, and nothing here touches the
//! filesystem or the environment.

use crate::error::{Error, Result};
use crate::options::{OptionSet, ResolvedOptions};
use crate::platform::PlatformFacts;
use crate::recipe::{ConfigureScript, ResourceSpec};
use crate::types::{BuildStep, CommandPlan, EnvOverlay, InstallLayout, ResourcePlan};

/// Build the plan for a primary resource and its sub-resources.
///
/// Sub-resources whose `enabled_by` option is off are left out. The
/// primary always comes first, enabled sub-resources follow in declaration
/// order.
///
/// # Errors
///
/// - `Error::MalformedDescriptor` for invalid descriptors or unknown placeholders
/// - `Error::ConflictingOptions` from option resolution
/// - `Error::MissingDependency` when an enabled option needs an absent host dependency
pub fn build(
    primary: &ResourceSpec,
    sub_resources: &[ResourceSpec],
    options: &OptionSet,
    facts: &PlatformFacts,
    layout: &InstallLayout,
) -> Result<CommandPlan> {
    primary.descriptor.validate()?;
    for spec in sub_resources {
        spec.descriptor.validate()?;
    }

    let resolved = options.resolve()?;
    check_host_dependencies(&resolved, facts)?;

    let mut plan = CommandPlan::default();
    plan.resources
        .push(resource_plan(primary, &resolved, facts, layout)?);

    for spec in sub_resources {
        let enabled = spec
            .enabled_by
            .as_deref()
            .is_none_or(|option| resolved.enabled(option));
        if enabled {
            plan.resources
                .push(resource_plan(spec, &resolved, facts, layout)?);
        } else {
            log::debug!("{}: disabled by options, not planned", spec.name());
        }
    }

    plan.check_order()?;
    log::info!(
        "planned {} resource(s), {} step(s)",
        plan.resources.len(),
        plan.total_steps()
    );
    Ok(plan)
}

fn check_host_dependencies(resolved: &ResolvedOptions, facts: &PlatformFacts) -> Result<()> {
    for spec in resolved.enabled_specs() {
        if let Some(dependency) = spec.requires
            && !facts.has(dependency)
        {
            return Err(Error::MissingDependency {
                option: spec.name.clone(),
                dependency: dependency.to_string(),
            });
        }
    }
    Ok(())
}

fn resource_plan(
    spec: &ResourceSpec,
    resolved: &ResolvedOptions,
    facts: &PlatformFacts,
    layout: &InstallLayout,
) -> Result<ResourcePlan> {
    let name = spec.name();
    let script = &spec.build;

    let env = if script.prepend_bin_to_path {
        EnvOverlay::new().prepend_path(layout.bin())
    } else {
        EnvOverlay::new()
    };

    let mut steps = Vec::new();
    if let Some(configure) = &script.configure {
        let args = configure_args(name, configure, resolved, facts, layout)?;
        steps.push(
            BuildStep::new(&script.working_dir, &configure.program)
                .args(args)
                .env(env.clone()),
        );
    }

    for template in &script.steps {
        let args = template
            .args
            .iter()
            .map(|a| expand(name, a, layout))
            .collect::<Result<Vec<_>>>()?;
        steps.push(
            BuildStep::new(&script.working_dir, expand(name, &template.program, layout)?)
                .args(args)
                .env(env.clone()),
        );
    }

    let patch = match (&spec.descriptor.inline_patch, &spec.patch_gate) {
        (Some(patch), Some(gate)) if gate.admits(facts) => Some(patch.clone()),
        (Some(_), Some(_)) => {
            log::debug!("{name}: patch gate not met on {}, skipping patch", facts.os);
            None
        }
        (Some(patch), None) => Some(patch.clone()),
        (None, _) => None,
    };

    Ok(ResourcePlan {
        resource: spec.descriptor.clone(),
        patch,
        depends_on: spec.depends_on.clone(),
        steps,
    })
}

/// Configure arguments in their fixed order.
fn configure_args(
    name: &str,
    configure: &ConfigureScript,
    resolved: &ResolvedOptions,
    facts: &PlatformFacts,
    layout: &InstallLayout,
) -> Result<Vec<String>> {
    let mut args = vec![
        format!("--prefix={}", layout.prefix.display()),
        format!("--mandir={}", layout.man().display()),
    ];

    for arg in &configure.args {
        args.push(expand(name, arg, layout)?);
    }

    if configure.option_flags {
        args.extend(resolved.configure_args());
    }

    if facts.prefer_64_bit
        && let Some(flag) = &configure.word_width_flag
    {
        args.push(flag.clone());
    }

    for rule in configure.rules.iter().filter(|r| r.matches(resolved)) {
        for arg in &rule.args {
            args.push(expand(name, arg, layout)?);
        }
    }

    Ok(args)
}

/// Substitute `{prefix}`, `{bin}`, `{lib}` and `{man}`.
///
/// Anything still looking like `{placeholder}` afterwards is an error, so
/// no step ever reaches the executor half-resolved.
fn expand(resource: &str, template: &str, layout: &InstallLayout) -> Result<String> {
    let expanded = template
        .replace("{prefix}", &layout.prefix.display().to_string())
        .replace("{bin}", &layout.bin().display().to_string())
        .replace("{lib}", &layout.lib().display().to_string())
        .replace("{man}", &layout.man().display().to_string());

    let mut rest = expanded.as_str();
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let inner = &rest[start + 1..start + len];
        if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::malformed(
                resource,
                format!("unknown placeholder {{{inner}}} in '{template}'"),
            ));
        }
        rest = &rest[start + 1..];
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::OsVersion;
    use crate::recipe::Recipe;
    use crate::tcl_tk;

    const PREFIX: &str = "/opt/kiln/tcl-tk/8.6.4";

    fn layout() -> InstallLayout {
        InstallLayout::new(PREFIX)
    }

    fn linux_32() -> PlatformFacts {
        PlatformFacts::new("linux", None, false)
    }

    fn el_capitan() -> PlatformFacts {
        PlatformFacts::new("macos", Some(OsVersion::new(10, 11)), true)
    }

    fn plan_with(recipe: &Recipe, flags: &[&str], facts: &PlatformFacts) -> Result<CommandPlan> {
        let mut options = recipe.option_set();
        options.apply(flags)?;
        recipe.plan(&options, facts, &layout())
    }

    fn configure_of<'a>(plan: &'a CommandPlan, resource: &str) -> &'a BuildStep {
        &plan.get(resource).unwrap().steps[0]
    }

    #[test]
    fn test_no_options_gives_only_mandatory_args() {
        let recipe = tcl_tk::recipe();
        let plan = plan_with(&recipe, &[], &linux_32()).unwrap();

        let configure = configure_of(&plan, "tcl");
        assert_eq!(configure.program, "./configure");
        assert_eq!(
            configure.args,
            vec![
                format!("--prefix={PREFIX}"),
                format!("--mandir={PREFIX}/share/man"),
            ]
        );
    }

    #[test]
    fn test_primary_steps() {
        let recipe = tcl_tk::recipe();
        let plan = plan_with(&recipe, &[], &el_capitan()).unwrap();
        let tcl = plan.primary().unwrap();

        assert_eq!(tcl.name(), "tcl");
        let lines: Vec<String> = tcl.steps.iter().map(BuildStep::command_line).collect();
        assert_eq!(
            lines,
            vec![
                format!("./configure --prefix={PREFIX} --mandir={PREFIX}/share/man --enable-64bit"),
                "make".to_string(),
                "make install".to_string(),
                "make install-private-headers".to_string(),
                format!("ln -sf tclsh8.6 {PREFIX}/bin/tclsh"),
            ]
        );
        assert!(tcl.steps.iter().all(|s| s.working_dir.ends_with("unix")));
    }

    #[test]
    fn test_threads_flag_reaches_primary_and_tk() {
        let recipe = tcl_tk::recipe();
        let plan = plan_with(&recipe, &["--with-threads"], &el_capitan()).unwrap();

        let tcl = configure_of(&plan, "tcl");
        assert!(tcl.args.contains(&"--enable-threads".to_string()));

        let tk = configure_of(&plan, "tk");
        assert!(tk.args.contains(&"--enable-threads".to_string()));

        let tcllib = configure_of(&plan, "tcllib");
        assert!(!tcllib.args.contains(&"--enable-threads".to_string()));
    }

    #[test]
    fn test_tk_configure_points_back_at_primary() {
        let recipe = tcl_tk::recipe();
        let plan = plan_with(&recipe, &["--with-threads"], &el_capitan()).unwrap();

        let tk = plan.get("tk").unwrap();
        assert_eq!(tk.depends_on.as_deref(), Some("tcl"));
        assert_eq!(
            tk.steps[0].args,
            vec![
                format!("--prefix={PREFIX}"),
                format!("--mandir={PREFIX}/share/man"),
                format!("--with-tcl={PREFIX}/lib"),
                "--enable-threads".to_string(),
                "--enable-64bit".to_string(),
                "--enable-aqua=yes".to_string(),
                "--without-x".to_string(),
            ]
        );
        assert_eq!(tk.steps[1].command_line(), format!("make TK_LIBRARY={PREFIX}/lib"));
        for step in &tk.steps {
            assert_eq!(
                step.env.path_prepend,
                vec![std::path::PathBuf::from(PREFIX).join("bin")]
            );
        }
    }

    #[test]
    fn test_x11_backend() {
        let recipe = tcl_tk::recipe();
        let facts = el_capitan().with_x11();
        let plan = plan_with(&recipe, &["--with-x11"], &facts).unwrap();

        let tk = configure_of(&plan, "tk");
        assert!(tk.args.contains(&"--with-x".to_string()));
        assert!(!tk.args.contains(&"--enable-aqua=yes".to_string()));
        assert!(!tk.args.contains(&"--without-x".to_string()));
    }

    #[test]
    fn test_x11_requires_host_dependency() {
        let recipe = tcl_tk::recipe();
        let err = plan_with(&recipe, &["--with-x11"], &el_capitan()).unwrap_err();
        assert!(matches!(err, Error::MissingDependency { ref option, .. } if option == "x11"));
    }

    #[test]
    fn test_both_backends_forced_on_conflict() {
        let recipe = tcl_tk::recipe();
        let facts = el_capitan().with_x11();
        let err = plan_with(&recipe, &["--with-x11", "--with-aqua"], &facts).unwrap_err();
        assert!(matches!(err, Error::ConflictingOptions { .. }));
    }

    #[test]
    fn test_sub_resources_follow_primary_in_declaration_order() {
        let recipe = tcl_tk::recipe();
        let plan = plan_with(&recipe, &[], &el_capitan()).unwrap();
        let names: Vec<&str> = plan.resources.iter().map(ResourcePlan::name).collect();
        assert_eq!(names, vec!["tcl", "tk", "tcllib"]);
        plan.check_order().unwrap();
    }

    #[test]
    fn test_disabled_sub_resources_are_left_out() {
        let recipe = tcl_tk::recipe();
        let plan = plan_with(&recipe, &["--without-tk"], &el_capitan()).unwrap();
        let names: Vec<&str> = plan.resources.iter().map(ResourcePlan::name).collect();
        assert_eq!(names, vec!["tcl", "tcllib"]);

        let plan = plan_with(&recipe, &["--without-tk", "--without-tcllib"], &el_capitan())
            .unwrap();
        assert_eq!(plan.resources.len(), 1);
    }

    #[test]
    fn test_tcllib_steps() {
        let recipe = tcl_tk::recipe();
        let plan = plan_with(&recipe, &[], &el_capitan()).unwrap();
        let tcllib = plan.get("tcllib").unwrap();
        let lines: Vec<String> = tcllib.steps.iter().map(BuildStep::command_line).collect();
        assert_eq!(
            lines,
            vec![
                format!("./configure --prefix={PREFIX} --mandir={PREFIX}/share/man"),
                "make install".to_string(),
            ]
        );
        assert_eq!(tcllib.steps[0].working_dir, std::path::PathBuf::from("."));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let recipe = tcl_tk::recipe();
        let facts = el_capitan().with_x11();
        let flags = ["--with-threads", "--with-x11", "--without-tcllib"];

        let first = plan_with(&recipe, &flags, &facts).unwrap();
        for _ in 0..5 {
            assert_eq!(plan_with(&recipe, &flags, &facts).unwrap(), first);
        }
    }

    #[test]
    fn test_deprecated_alias_gives_same_plan() {
        let recipe = tcl_tk::recipe();
        let facts = el_capitan();

        let mut via_alias = recipe.option_set();
        let warnings = via_alias.apply(["--enable-threads"]).unwrap();
        assert_eq!(warnings.len(), 1);

        let mut via_canonical = recipe.option_set();
        assert!(via_canonical.apply(["--with-threads"]).unwrap().is_empty());

        assert_eq!(
            recipe.plan(&via_alias, &facts, &layout()).unwrap(),
            recipe.plan(&via_canonical, &facts, &layout()).unwrap()
        );
    }

    #[test]
    fn test_patch_only_on_old_macos() {
        let recipe = tcl_tk::recipe();

        let plan = plan_with(&recipe, &[], &el_capitan()).unwrap();
        assert!(plan.primary().unwrap().patch.is_none());

        let tiger = PlatformFacts::new("macos", Some(OsVersion::new(10, 4)), false);
        let plan = plan_with(&recipe, &[], &tiger).unwrap();
        assert_eq!(
            plan.primary().unwrap().patch.as_deref(),
            Some(tcl_tk::SQLITE_LEGACY_ATOMICS_PATCH)
        );
    }

    #[test]
    fn test_no_unexpanded_placeholders() {
        let recipe = tcl_tk::recipe();
        let plan = plan_with(&recipe, &["--with-threads"], &el_capitan()).unwrap();
        for resource in &plan.resources {
            for step in &resource.steps {
                for arg in std::iter::once(&step.program).chain(&step.args) {
                    assert!(!arg.contains('{'), "unexpanded: {arg}");
                }
            }
        }
    }

    #[test]
    fn test_expand_rejects_unknown_placeholder() {
        let err = expand("tk", "--with-foo={include}", &layout()).unwrap_err();
        assert!(err.to_string().contains("{include}"));

        // Braces that are not placeholders pass through.
        assert_eq!(expand("tk", "CFLAGS={ }", &layout()).unwrap(), "CFLAGS={ }");
    }

    #[test]
    fn test_malformed_descriptor_fails_before_planning() {
        let mut recipe = tcl_tk::recipe();
        recipe.primary.descriptor.url = String::new();
        let options = recipe.option_set();
        let err = build(
            &recipe.primary,
            &recipe.resources,
            &options,
            &el_capitan(),
            &layout(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedDescriptor { .. }));
    }
}
