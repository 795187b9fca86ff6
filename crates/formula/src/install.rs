//! End-to-end installation of a recipe.
//!
//! [`Installer::install`] drives the whole lifecycle: validate the recipe,
//! apply the user's flags, build the plan, execute it, record what landed in
//! the prefix and run the smoke test. Anything that goes wrong before the
//! first step runs leaves the prefix untouched.

use crate::error::{Error, Result};
use crate::executor::{ExecuteOptions, ExecutionObserver, ExecutionReport, Executor};
use crate::options::Warning;
use crate::platform::PlatformFacts;
use crate::recipe::Recipe;
use crate::stage::Stager;
use crate::types::{CommandPlan, InstallLayout, InstallationRecord};
use crate::verify::{self, VerificationResult};

/// What to install and how.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// User flags (`--with-threads`, `--without-tk`, ...).
    pub flags: Vec<String>,
    /// Host facts.
    pub facts: PlatformFacts,
    /// Target layout.
    pub layout: InstallLayout,
    /// Execution settings (dry run, timeout).
    pub execute: ExecuteOptions,
    /// Skip the smoke test.
    pub skip_verify: bool,
}

impl InstallRequest {
    /// Request with no flags, default execution settings and verification on.
    pub fn new(facts: PlatformFacts, layout: InstallLayout) -> Self {
        Self {
            flags: Vec::new(),
            facts,
            layout,
            execute: ExecuteOptions::default(),
            skip_verify: false,
        }
    }

    /// Add user flags.
    #[must_use]
    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }
}

/// Result of an installation that got through every build step.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// Name of the installed recipe.
    pub recipe: String,
    /// Notices from option handling.
    pub warnings: Vec<Warning>,
    /// The plan that was executed.
    pub plan: CommandPlan,
    /// What ran.
    pub report: ExecutionReport,
    /// Contents of the prefix, absent in a dry run.
    pub record: Option<InstallationRecord>,
    /// Smoke test outcome, absent when skipped, in a dry run, or when the
    /// recipe has no test.
    pub verification: Option<VerificationResult>,
}

impl InstallOutcome {
    /// Fail with `Error::VerificationFailed` if the smoke test did not pass.
    ///
    /// The installation itself is left as it is.
    pub fn check(&self) -> Result<()> {
        match &self.verification {
            Some(result) if !result.success => Err(Error::VerificationFailed {
                resource: self.recipe.clone(),
                expected_output: result.expected.clone(),
                actual_output: result.actual.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Resolve options and build the plan, without running anything.
///
/// # Errors
///
/// Returns pre-flight errors (`MalformedDescriptor`, `UnknownOption`,
/// `ConflictingOptions`, `MissingDependency`).
pub fn prepare(recipe: &Recipe, request: &InstallRequest) -> Result<(CommandPlan, Vec<Warning>)> {
    recipe.validate()?;
    let mut options = recipe.option_set();
    let warnings = options.apply(&request.flags)?;
    let plan = recipe.plan(&options, &request.facts, &request.layout)?;
    Ok((plan, warnings))
}

/// Installs recipes with a given stager.
pub struct Installer<S> {
    stager: S,
}

impl<S: Stager> Installer<S> {
    /// Create an installer.
    pub fn new(stager: S) -> Self {
        Self { stager }
    }

    /// The stager in use.
    pub fn stager(&self) -> &S {
        &self.stager
    }

    /// Install `recipe`.
    ///
    /// A failed smoke test is not an error here; see [`InstallOutcome::check`].
    ///
    /// # Errors
    ///
    /// Pre-flight errors, staging errors, `Error::BuildStepFailed`, or `Io`
    /// when the prefix cannot be read afterwards.
    pub fn install<P>(
        &self,
        recipe: &Recipe,
        request: &InstallRequest,
        progress: &mut P,
    ) -> Result<InstallOutcome>
    where
        P: ExecutionObserver + ?Sized,
    {
        let (plan, warnings) = prepare(recipe, request)?;
        self.install_prepared(recipe, request, plan, warnings, progress)
    }

    /// Install `recipe` from a plan already built by [`prepare`].
    ///
    /// Options are not resolved again, so `warnings` are the only notices the
    /// outcome carries and `request.flags` is not re-read.
    ///
    /// # Errors
    ///
    /// Staging errors, `Error::BuildStepFailed`, or `Io` when the prefix cannot
    /// be read afterwards.
    pub fn install_prepared<P>(
        &self,
        recipe: &Recipe,
        request: &InstallRequest,
        plan: CommandPlan,
        warnings: Vec<Warning>,
        progress: &mut P,
    ) -> Result<InstallOutcome>
    where
        P: ExecutionObserver + ?Sized,
    {
        log::info!(
            "installing {} into {}",
            recipe.name,
            request.layout.prefix.display()
        );

        let executor = Executor::new(request.execute.clone());
        let report = executor.run(&plan, &self.stager, progress)?;

        if report.dry_run {
            return Ok(InstallOutcome {
                recipe: recipe.name.clone(),
                warnings,
                plan,
                report,
                record: None,
                verification: None,
            });
        }

        let record = InstallationRecord::scan(&request.layout.prefix)?;
        log::debug!(
            "{} file(s) in {}",
            record.installed_binaries.len(),
            request.layout.bin().display()
        );

        let verification = match (&recipe.test, request.skip_verify) {
            (Some(test), false) => {
                let result = verify::verify(&record, test);
                if !result.success {
                    log::warn!(
                        "{}: smoke test failed, expected {:?}, got {:?}",
                        recipe.name,
                        result.expected,
                        result.actual
                    );
                }
                Some(result)
            }
            _ => None,
        };

        Ok(InstallOutcome {
            recipe: recipe.name.clone(),
            warnings,
            plan,
            report,
            record: Some(record),
            verification,
        })
    }
}
