//! Plan execution.
//!
//! Runs the steps of a [`CommandPlan`] one at a time, in order, and stops at
//! the first failure. Each resource is staged right before its first step
//! and its staging directory is released right after its last one.
//!
//! Child processes get the step's [`EnvOverlay`](crate::EnvOverlay) on top
//! of the inherited environment. The environment of this process is never
//! modified.

use crate::error::{Error, Result};
use crate::stage::Stager;
use crate::types::{BuildStep, CommandPlan};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lines of output kept for failure reports by default.
pub const DEFAULT_TAIL_LINES: usize = 30;

/// How often a running step is polled when a timeout is set.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Receives progress updates during execution.
pub trait ExecutionObserver {
    /// A resource is about to be staged.
    fn on_resource_start(&mut self, resource: &str, steps: usize);

    /// A step is about to run.
    fn on_step_start(&mut self, resource: &str, index: usize, step: &BuildStep);

    /// A step finished successfully.
    fn on_step_complete(&mut self, resource: &str, index: usize, duration: Duration);

    /// All steps of a resource succeeded.
    fn on_resource_complete(&mut self, resource: &str);
}

/// Observer that ignores everything.
pub struct NoProgress;

impl ExecutionObserver for NoProgress {
    fn on_resource_start(&mut self, _resource: &str, _steps: usize) {}
    fn on_step_start(&mut self, _resource: &str, _index: usize, _step: &BuildStep) {}
    fn on_step_complete(&mut self, _resource: &str, _index: usize, _duration: Duration) {}
    fn on_resource_complete(&mut self, _resource: &str) {}
}

/// Execution settings.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Report the steps without staging or running anything.
    pub dry_run: bool,
    /// Kill a step that runs longer than this.
    pub step_timeout: Option<Duration>,
    /// Lines of output kept in `BuildStepFailed::output_tail`.
    pub tail_lines: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            step_timeout: None,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

/// One step that ran (or would have run, in a dry run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Command line.
    pub command: String,
    /// Directory relative to the source root.
    pub working_dir: PathBuf,
    /// Wall time, zero in a dry run.
    pub duration: Duration,
}

/// Steps run for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReport {
    /// Resource name.
    pub name: String,
    /// Steps, in order.
    pub steps: Vec<StepRecord>,
}

/// Summary of a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Whether nothing was actually run.
    pub dry_run: bool,
    /// Per-resource reports, in plan order.
    pub resources: Vec<ResourceReport>,
}

impl ExecutionReport {
    /// Total steps across all resources.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.resources.iter().map(|r| r.steps.len()).sum()
    }

    /// Total wall time of all steps.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.resources
            .iter()
            .flat_map(|r| &r.steps)
            .map(|s| s.duration)
            .sum()
    }
}

/// Sequential, fail-fast plan executor.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    options: ExecuteOptions,
}

impl Executor {
    /// Create an executor.
    #[must_use]
    pub fn new(options: ExecuteOptions) -> Self {
        Self { options }
    }

    /// Execution settings.
    #[must_use]
    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    /// Run every step of the plan.
    ///
    /// # Errors
    ///
    /// - Staging errors from `stager`, for the resource being staged
    /// - `Error::BuildStepFailed` for the first step that fails; nothing
    ///   after it runs
    pub fn run<S, P>(
        &self,
        plan: &CommandPlan,
        stager: &S,
        progress: &mut P,
    ) -> Result<ExecutionReport>
    where
        S: Stager + ?Sized,
        P: ExecutionObserver + ?Sized,
    {
        plan.check_order()?;

        let mut report = ExecutionReport {
            dry_run: self.options.dry_run,
            resources: Vec::with_capacity(plan.resources.len()),
        };

        for resource in &plan.resources {
            let name = resource.name();
            progress.on_resource_start(name, resource.steps.len());

            let mut resource_report = ResourceReport {
                name: name.to_string(),
                steps: Vec::with_capacity(resource.steps.len()),
            };

            if self.options.dry_run {
                for (index, step) in resource.steps.iter().enumerate() {
                    progress.on_step_start(name, index, step);
                    log::info!("[dry-run] {name}: {}", step.command_line());
                    resource_report.steps.push(record(step, Duration::ZERO));
                    progress.on_step_complete(name, index, Duration::ZERO);
                }
            } else {
                let staged = stager.stage(resource)?;
                log::info!("{name}: building in {}", staged.root().display());

                for (index, step) in resource.steps.iter().enumerate() {
                    progress.on_step_start(name, index, step);
                    let duration = self.run_step(name, index, step, staged.root())?;
                    resource_report.steps.push(record(step, duration));
                    progress.on_step_complete(name, index, duration);
                }
                // `staged` drops here, before the next resource is staged.
            }

            progress.on_resource_complete(name);
            report.resources.push(resource_report);
        }

        Ok(report)
    }

    fn run_step(
        &self,
        resource: &str,
        index: usize,
        step: &BuildStep,
        root: &Path,
    ) -> Result<Duration> {
        let command = step.command_line();
        let cwd = root.join(&step.working_dir);
        log::debug!("{resource}: step {index}: {command} (in {})", cwd.display());

        let failed = |exit_code: Option<i32>, output_tail: String, timed_out: bool| {
            Error::BuildStepFailed {
                resource: resource.to_string(),
                step_index: index,
                command: command.clone(),
                exit_code,
                output_tail,
                timed_out,
            }
        };

        let started = Instant::now();
        let mut child = match spawn(step, &cwd) {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to start {}: {e}", step.program);
                return Err(failed(None, message, false));
            }
        };

        let output = Arc::new(Mutex::new(OutputTail::new(self.options.tail_lines)));
        let readers = [
            child.stdout.take().map(|s| read_lines(s, Arc::clone(&output))),
            child.stderr.take().map(|s| read_lines(s, Arc::clone(&output))),
        ];

        let waited = self.wait(&mut child);

        // Grandchildren of a killed step may still hold the pipes open, so
        // readers are only joined when the step ended on its own.
        if !matches!(waited, Ok(None)) {
            for reader in readers.into_iter().flatten() {
                let _ = reader.join();
            }
        }
        let tail = output.lock().unwrap_or_else(PoisonError::into_inner).render();
        let duration = started.elapsed();

        match waited {
            Ok(Some(status)) if status.success() => {
                log::debug!("{resource}: step {index} done in {:.1}s", duration.as_secs_f64());
                Ok(duration)
            }
            Ok(Some(status)) => {
                log::warn!("{resource}: step {index} ({command}) exited with {status}");
                Err(failed(status.code(), tail, false))
            }
            Ok(None) => {
                log::warn!("{resource}: step {index} ({command}) timed out");
                Err(failed(None, tail, true))
            }
            Err(e) => Err(failed(None, format!("{tail}\nfailed to wait: {e}"), false)),
        }
    }

    /// Wait for the child; `Ok(None)` means it was killed after the timeout.
    fn wait(&self, child: &mut Child) -> std::io::Result<Option<ExitStatus>> {
        let Some(timeout) = self.options.step_timeout else {
            return child.wait().map(Some);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                child.kill()?;
                child.wait()?;
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn record(step: &BuildStep, duration: Duration) -> StepRecord {
    StepRecord {
        command: step.command_line(),
        working_dir: step.working_dir.clone(),
        duration,
    }
}

fn spawn(step: &BuildStep, cwd: &Path) -> std::io::Result<Child> {
    // Relative programs such as `./configure` are looked up in the step's
    // directory, not ours.
    let program = if step.program.contains('/') && Path::new(&step.program).is_relative() {
        cwd.join(&step.program)
    } else {
        PathBuf::from(&step.program)
    };

    let mut command = Command::new(program);
    command
        .args(&step.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    for (key, value) in &step.env.set {
        command.env(key, value);
    }
    if let Some(path) = step.env.path_value(std::env::var_os("PATH").as_deref()) {
        command.env("PATH", path);
    }

    command.spawn()
}

/// The last `capacity` lines of a step's combined output.
#[derive(Debug)]
struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Drain `source` to EOF, keeping lines in `sink`.
///
/// Output is raw bytes; invalid UTF-8 is replaced rather than ending the
/// read, since a reader that stops early would leave the child writing into
/// a closed pipe.
fn read_lines<R>(source: R, sink: Arc<Mutex<OutputTail>>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("output reader stopped: {e}");
                    break;
                }
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']).to_string();
            log::trace!("  {line}");
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(line);
        }
    })
}
