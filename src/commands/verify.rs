//! Run a recipe's smoke test against an existing installation.

use crate::Context;
use crate::cli::VerifyArgs;
use crate::config::{self, KilnConfig};
use crate::ui;
use anyhow::{Result, bail};
use formula::InstallationRecord;

/// Run the verify command.
pub fn run(ctx: &Context, args: VerifyArgs) -> Result<()> {
    let config = KilnConfig::load()?;
    let recipe = config::load_recipe(Some(args.recipe.recipe.as_str()))?;
    let Some(test) = &recipe.test else {
        bail!("Recipe {} has no smoke test", recipe.name);
    };

    let prefix = config.prefix_for(&recipe, args.prefix.as_deref())?;
    if !prefix.is_dir() {
        bail!("{} is not installed at {}", recipe.name, prefix.display());
    }
    let record = InstallationRecord::scan(&prefix)?;

    if !ctx.quiet {
        ui::header(&format!("Verifying {}", recipe.name));
        ui::kv("Prefix", &prefix.display().to_string());
        ui::kv("Executable", &test.executable.display().to_string());
    }

    let result = formula::verify::verify(&record, test).into_result(&recipe.name)?;
    ui::success(&format!("Smoke test passed ({:?})", result.actual));
    Ok(())
}
