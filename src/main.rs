mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Command::Build(args) => commands::build::run(&ctx, args),
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::Options(args) => commands::options::run(&ctx, args),
        Command::Fetch(args) => commands::fetch::run(&ctx, args),
        Command::Verify(args) => commands::verify::run(&ctx, args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "kiln", &mut io::stdout());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&ctx, &err),
    }
}

/// Print an error and pick the exit code for its lifecycle phase.
fn report(ctx: &Context, err: &anyhow::Error) -> ExitCode {
    ui::error(&format!("{err:#}"));

    let Some(formula_err) = err.chain().find_map(|e| e.downcast_ref::<formula::Error>()) else {
        return ExitCode::FAILURE;
    };

    let category = formula_err.category();
    if let formula::Error::BuildStepFailed { output_tail, .. } = formula_err
        && !output_tail.is_empty()
    {
        eprintln!();
        for line in output_tail.lines() {
            ui::dim_err(line);
        }
        eprintln!();
    }
    if formula_err.is_retryable() {
        ui::dim_err("This looks transient; trying again may help.");
    }
    if !ctx.quiet || ctx.verbose > 0 {
        ui::dim_err(&format!("{}: {}", category.description(), category.advice()));
    }

    u8::try_from(category.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
}
