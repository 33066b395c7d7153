use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use siteflow_cloud::{Observer, StepOutcome, StepReport};
use std::sync::Mutex;
use std::time::Duration;

/// Prints step results as they happen and shows a spinner during long waits
pub struct ConsoleProgress {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
        }
    }

    fn clear_spinner(&self) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn new_spinner() -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }
}

impl Observer for ConsoleProgress {
    fn on_step(&self, report: &StepReport) {
        self.clear_spinner();
        let marker = match &report.outcome {
            StepOutcome::Executed | StepOutcome::Adopted | StepOutcome::Removed => "✓".green(),
            StepOutcome::Cached | StepOutcome::AlreadyGone => "·".dimmed(),
            StepOutcome::Pending => "…".yellow(),
            StepOutcome::Skipped => "-".dimmed(),
            StepOutcome::Failed(_) => "✗".red(),
        };
        let outcome = match &report.outcome {
            StepOutcome::Failed(_) => report.outcome.to_string().red(),
            StepOutcome::Pending => report.outcome.to_string().yellow(),
            other => other.to_string().normal(),
        };
        let mut line = format!(
            "  {} {} {} {}",
            marker,
            report.scope.cyan(),
            report.step,
            outcome
        );
        if let Some(detail) = &report.detail {
            line.push_str(&format!(" {}", format!("({})", detail).dimmed()));
        }
        println!("{}", line);
    }

    fn on_wait(&self, label: &str, attempt: u32, max_attempts: u32) {
        let Ok(mut spinner) = self.spinner.lock() else {
            return;
        };
        let pb = spinner.get_or_insert_with(Self::new_spinner);
        pb.set_message(format!(
            "Waiting for {} (check {}/{})",
            label, attempt, max_attempts
        ));
    }

    fn on_message(&self, message: &str) {
        let spinner = self.spinner.lock().ok();
        match spinner.as_ref().and_then(|s| s.as_ref()) {
            Some(pb) => pb.println(format!("    {}", message.dimmed())),
            None => println!("    {}", message.dimmed()),
        }
    }
}
