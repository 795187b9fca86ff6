//! List a recipe's build options.

use crate::Context;
use crate::cli::RecipeArgs;
use crate::config;
use crate::ui;
use anyhow::Result;
use colored::Colorize;

/// Run the options command.
pub fn run(ctx: &Context, args: RecipeArgs) -> Result<()> {
    let recipe = config::load_recipe(Some(args.recipe.as_str()))?;
    recipe.validate()?;
    let options = recipe.option_set();

    if !ctx.quiet {
        ui::header(&format!("{} options", recipe.name));
        if !recipe.description.is_empty() {
            ui::dim(&recipe.description);
        }
    }

    if options.specs().is_empty() {
        ui::info("This recipe has no build options.");
        return Ok(());
    }

    for spec in options.specs() {
        let default = if spec.default { "on".green() } else { "off".dimmed() };
        println!(
            "  {:<24} {:<4} {}",
            format!("--{}", spec.toggle_flag()).bold(),
            default,
            spec.description
        );
        if let Some(dependency) = spec.requires {
            ui::dim(&format!("    requires {}", dependency.name()));
        }
    }

    if !options.aliases().is_empty() {
        ui::section("Deprecated");
        for (alias, canonical) in options.aliases() {
            println!("  --{alias} {} --{canonical}", "→".dimmed());
        }
    }

    if !options.exclusive_pairs().is_empty() {
        ui::section("Mutually exclusive");
        for (first, second) in options.exclusive_pairs() {
            println!("  {first} / {second}");
        }
    }

    Ok(())
}
