//! # formula
//!
//! Declarative build-recipe interpreter.
//!
//! A recipe names a primary source archive (URL, version, SHA-256, optional
//! inline patch), optional sub-resources, build-time options and a smoke
//! test. This crate turns it into an installation:
//!
//! 1. Validate the recipe and apply the user's `--with-*`/`--without-*` flags
//! 2. Build a fully resolved [`CommandPlan`] (pure, deterministic)
//! 3. Stage each resource: fetch, verify, extract, patch
//! 4. Run the steps one by one, stopping at the first failure
//! 5. Record what was installed and run the smoke test
//!
//! ## Example
//!
//! ```
//! use formula::{InstallLayout, PlatformFacts, tcl_tk};
//!
//! let recipe = tcl_tk::recipe();
//! let mut options = recipe.option_set();
//! options.apply(["--with-threads"]).unwrap();
//!
//! let facts = PlatformFacts::new("linux", None, true);
//! let plan = recipe
//!     .plan(&options, &facts, &InstallLayout::new("/opt/tcl-tk"))
//!     .unwrap();
//!
//! assert_eq!(plan.primary().unwrap().name(), "tcl");
//! for resource in &plan.resources {
//!     for step in &resource.steps {
//!         println!("{}: {}", resource.name(), step);
//!     }
//! }
//! ```
//!
//! ## Testing
//!
//! [`fetch::MockFetcher`] serves archives from memory and
//! [`stage::DirStager`] serves pre-extracted trees, so the executor and
//! installer can be exercised without network access.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod install;
pub mod options;
pub mod plan;
pub mod platform;
pub mod recipe;
pub mod stage;
pub mod tcl_tk;
pub mod types;
pub mod verify;

pub use error::{Error, ErrorCategory, Result};
pub use executor::{ExecuteOptions, ExecutionObserver, ExecutionReport, Executor, NoProgress};
pub use fetch::{Fetcher, HttpFetcher, MockFetcher};
pub use install::{InstallOutcome, InstallRequest, Installer};
pub use options::{OptionSet, OptionSpec, ResolvedOptions, Warning};
pub use platform::{HostDependency, OsVersion, PatchGate, PlatformFacts};
pub use recipe::{Recipe, ResourceSpec, SmokeTest};
pub use stage::{ArchiveStager, DirStager, StagedSource, Stager};
pub use types::{
    BuildStep, CommandPlan, EnvOverlay, InstallLayout, InstallationRecord, ResourceDescriptor,
    ResourcePlan,
};
pub use verify::VerificationResult;
