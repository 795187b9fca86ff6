//! Show the resolved build plan.

use crate::Context;
use crate::cli::PlanArgs;
use crate::config::{self, KilnConfig};
use crate::ui;
use anyhow::{Context as _, Result};
use colored::Colorize;
use formula::{CommandPlan, ResourcePlan, install};

/// Run the plan command.
pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let config = KilnConfig::load()?;
    let recipe = config::load_recipe(Some(args.recipe.recipe.as_str()))?;
    let request = super::request(&recipe, &config, &args.options)?;
    let (plan, warnings) = install::prepare(&recipe, &request)?;

    for warning in &warnings {
        ui::warn(&warning.to_string());
    }

    if args.json {
        let json = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
        println!("{json}");
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!(
            "{} {}",
            recipe.name, recipe.primary.descriptor.version
        ));
        ui::kv("Prefix", &request.layout.prefix.display().to_string());
        ui::kv(
            "Platform",
            &request
                .facts
                .os_version
                .map_or_else(|| request.facts.os.clone(), |v| format!("{} {v}", request.facts.os)),
        );
    }
    print_plan(&plan);
    Ok(())
}

/// Print every resource and its steps.
pub fn print_plan(plan: &CommandPlan) {
    for resource in &plan.resources {
        print_resource(resource);
    }
    println!();
    ui::dim(&format!(
        "{} resource(s), {} step(s)",
        plan.resources.len(),
        plan.total_steps()
    ));
}

fn print_resource(resource: &ResourcePlan) {
    ui::section(&format!(
        "{} {}",
        resource.name(),
        resource.resource.version.dimmed()
    ));
    ui::kv("Source", &resource.resource.url);
    if let Some(dep) = &resource.depends_on {
        ui::kv("Builds against", dep);
    }
    if resource.patch.is_some() {
        ui::kv("Patch", "inline");
    }

    let total = resource.steps.len();
    for (index, step) in resource.steps.iter().enumerate() {
        let location = if step.working_dir.as_os_str() == "." {
            String::new()
        } else {
            format!(" (in {})", step.working_dir.display())
        };
        ui::step(index + 1, total, &format!("{step}{}", location.dimmed()));
        for dir in &step.env.path_prepend {
            ui::dim(&format!("PATH+={}", dir.display()));
        }
        for (key, value) in &step.env.set {
            ui::dim(&format!("{key}={value}"));
        }
    }
}
