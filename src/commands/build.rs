//! Fetch, build, install and verify a recipe.

use crate::Context;
use crate::cli::BuildArgs;
use crate::config::{self, KilnConfig};
use crate::progress::SpinnerProgress;
use crate::ui;
use anyhow::Result;
use formula::{ArchiveStager, HttpFetcher, InstallOutcome, Installer, install};

/// Run the build command.
pub fn run(ctx: &Context, args: BuildArgs) -> Result<()> {
    let config = KilnConfig::load()?;
    let recipe = config::load_recipe(Some(args.recipe.recipe.as_str()))?;

    let mut request = super::request(&recipe, &config, &args.options)?;
    request.execute.dry_run = args.dry_run;
    request.execute.step_timeout = config.step_timeout(args.timeout);
    request.skip_verify = args.skip_verify;

    // Surface pre-flight problems and deprecation notices before any spinner starts.
    let (plan, warnings) = install::prepare(&recipe, &request)?;
    for warning in &warnings {
        ui::warn(&warning.to_string());
    }

    if !ctx.quiet {
        ui::header(&format!(
            "Building {} {}",
            recipe.name, recipe.primary.descriptor.version
        ));
        ui::kv("Prefix", &request.layout.prefix.display().to_string());
        ui::kv(
            "Resources",
            &plan
                .resources
                .iter()
                .map(|r| r.name().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        );
        if let Some(timeout) = request.execute.step_timeout {
            ui::kv("Step timeout", &ui::format_duration(timeout));
        }
        println!();
    }

    if args.dry_run {
        super::plan::print_plan(&plan);
        return Ok(());
    }

    let fetcher = HttpFetcher::new().with_cache(config.cache_dir()?);
    let mut stager =
        ArchiveStager::new(fetcher).keep_staging(args.keep_staging || config.keep_staging);
    if let Some(dir) = config.staging_dir() {
        stager = stager.staging_root(dir);
    }
    let installer = Installer::new(stager);

    let outcome = {
        let mut progress = SpinnerProgress::new(ctx.quiet);
        installer.install_prepared(&recipe, &request, plan, warnings, &mut progress)?
    };

    if !ctx.quiet {
        print_summary(&outcome);
    }
    outcome.check()?;
    Ok(())
}

fn print_summary(outcome: &InstallOutcome) {
    ui::section("Summary");
    ui::kv(
        "Steps",
        &format!(
            "{} in {}",
            outcome.report.total_steps(),
            ui::format_duration(outcome.report.total_duration())
        ),
    );
    if let Some(record) = &outcome.record {
        ui::kv("Installed", &record.prefix.display().to_string());
        for binary in &record.installed_binaries {
            if let Some(name) = binary.file_name() {
                ui::dim(&name.to_string_lossy());
            }
        }
    }
    println!();
    match &outcome.verification {
        Some(result) if result.success => ui::success("Smoke test passed"),
        Some(result) => ui::error(&format!(
            "Smoke test failed: expected {:?}, got {:?}",
            result.expected, result.actual
        )),
        None => ui::info("Smoke test skipped"),
    }
}
