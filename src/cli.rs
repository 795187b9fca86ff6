use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Build and install software from declarative recipes", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch, build and install a recipe, then run its smoke test
    Build(BuildArgs),

    /// Show the resolved build plan without running it
    Plan(PlanArgs),

    /// List a recipe's build options
    Options(RecipeArgs),

    /// Download and verify every source archive of a recipe
    Fetch(RecipeArgs),

    /// Run a recipe's smoke test against an installation
    Verify(VerifyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared arguments
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct RecipeArgs {
    /// Recipe file (TOML) or built-in recipe name
    #[arg(default_value = "tcl-tk")]
    pub recipe: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct OptionArgs {
    /// Enable an option (repeatable), e.g. --with threads
    #[arg(long = "with", value_name = "OPTION")]
    pub with: Vec<String>,

    /// Disable an option (repeatable), e.g. --without tk
    #[arg(long = "without", value_name = "OPTION")]
    pub without: Vec<String>,

    /// Installation prefix
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Recipe option flags after the recipe, e.g. --with-threads --without-tk
    #[arg(
        value_name = "OPTION_FLAGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub flags: Vec<String>,
}

impl OptionArgs {
    /// All option flags in the form the option set understands.
    pub fn flags(&self) -> Vec<String> {
        self.with
            .iter()
            .map(|name| format!("with-{name}"))
            .chain(self.without.iter().map(|name| format!("without-{name}")))
            .chain(self.flags.iter().cloned())
            .collect()
    }
}

// ============================================================================
// Build / Plan / Verify
// ============================================================================

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[command(flatten)]
    pub options: OptionArgs,

    /// Show what would run without staging or building anything
    #[arg(long)]
    pub dry_run: bool,

    /// Keep staging directories after the build
    #[arg(long)]
    pub keep_staging: bool,

    /// Kill any build step running longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Do not run the smoke test
    #[arg(long)]
    pub skip_verify: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[command(flatten)]
    pub options: OptionArgs,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    /// Installation prefix to check
    #[arg(long)]
    pub prefix: Option<PathBuf>,
}
