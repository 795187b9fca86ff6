//! Progress indicators for kiln.

use crate::ui;
use formula::{BuildStep, ExecutionObserver};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_STRINGS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"];

/// Create a spinner with a message. Hidden when `quiet` is set.
pub fn spinner(msg: impl Into<String>, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(TICK_STRINGS)
            .template("{spinner:.cyan} {prefix:.bold} {msg:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(msg.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Finish a spinner with a success line.
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    let hidden = pb.is_hidden();
    pb.finish_and_clear();
    if !hidden {
        ui::success(msg);
    }
}

/// Clear a spinner after a failure; the caller reports the error.
pub fn finish_error(pb: &ProgressBar) {
    pb.finish_and_clear();
}

/// Spinner that follows a build, one resource at a time.
pub struct SpinnerProgress {
    quiet: bool,
    bar: Option<ProgressBar>,
    steps: usize,
}

impl SpinnerProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            bar: None,
            steps: 0,
        }
    }
}

impl ExecutionObserver for SpinnerProgress {
    fn on_resource_start(&mut self, resource: &str, steps: usize) {
        if let Some(previous) = self.bar.take() {
            previous.finish_and_clear();
        }
        self.steps = steps;
        let pb = spinner(resource, self.quiet);
        pb.set_message("staging");
        self.bar = Some(pb);
    }

    fn on_step_start(&mut self, resource: &str, index: usize, step: &BuildStep) {
        log::debug!("{resource}: step {index}: {step}");
        if let Some(pb) = &self.bar {
            pb.set_message(format!(
                "[{}/{}] {}",
                index + 1,
                self.steps,
                ui::truncate(&step.command_line(), 60)
            ));
        }
    }

    fn on_step_complete(&mut self, resource: &str, index: usize, duration: Duration) {
        log::debug!(
            "{resource}: step {index} done in {}",
            ui::format_duration(duration)
        );
    }

    fn on_resource_complete(&mut self, resource: &str) {
        if let Some(pb) = self.bar.take() {
            finish_success(&pb, &format!("Built {resource}"));
        }
    }
}

impl Drop for SpinnerProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.bar.take() {
            finish_error(&pb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_spinner_is_hidden() {
        assert!(spinner("tcl", true).is_hidden());
    }

    #[test]
    fn test_progress_tracks_resources() {
        let mut progress = SpinnerProgress::new(true);
        progress.on_resource_start("tcl", 3);
        assert_eq!(progress.steps, 3);
        progress.on_step_start("tcl", 0, &BuildStep::new(".", "make"));
        progress.on_step_complete("tcl", 0, Duration::from_millis(5));
        progress.on_resource_complete("tcl");
        assert!(progress.bar.is_none());
    }
}
