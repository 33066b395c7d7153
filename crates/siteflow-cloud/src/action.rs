//! Step outcomes and run reports

use crate::error::{Result, Severity, SiteError};
use serde::{Deserialize, Serialize};

/// What happened to a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Flag was set and the resource still exists; nothing done
    Cached,
    /// Side effect performed and flagged
    Executed,
    /// Found an existing resource and recorded it instead of creating one
    Adopted,
    /// A wait timed out; partial output kept for the next run
    Pending,
    /// Deliberately not done
    Skipped,
    /// Teardown removed the resource
    Removed,
    /// Teardown found the resource already gone
    AlreadyGone,
    /// Failed with the given severity
    Failed(Severity),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOutcome::Cached => write!(f, "already done"),
            StepOutcome::Executed => write!(f, "done"),
            StepOutcome::Adopted => write!(f, "adopted existing"),
            StepOutcome::Pending => write!(f, "pending"),
            StepOutcome::Skipped => write!(f, "skipped"),
            StepOutcome::Removed => write!(f, "removed"),
            StepOutcome::AlreadyGone => write!(f, "already gone"),
            StepOutcome::Failed(severity) => write!(f, "failed ({})", severity),
        }
    }
}

/// Result of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// `deployment` or the source domain the step ran for
    pub scope: String,

    /// Step name (e.g., "bucket_create", "dns_records")
    pub step: String,

    pub outcome: StepOutcome,

    /// Extra detail (identifier created, reason skipped, error text)
    pub detail: Option<String>,
}

/// Receives progress while a workflow runs
///
/// All methods default to no-ops.
pub trait Observer: Send + Sync {
    fn on_step(&self, _report: &StepReport) {}

    /// Called before each check of a bounded wait
    fn on_wait(&self, _label: &str, _attempt: u32, _max_attempts: u32) {}

    fn on_message(&self, _message: &str) {}
}

/// Observer that ignores everything
pub struct Silent;

impl Observer for Silent {}

/// Collected step results of one workflow run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no step failed
    pub fn is_success(&self) -> bool {
        !self.steps.iter().any(|s| s.outcome.is_failure())
    }

    pub fn push(
        &mut self,
        observer: &dyn Observer,
        scope: impl ToString,
        step: impl ToString,
        outcome: StepOutcome,
        detail: Option<String>,
    ) {
        let report = StepReport {
            scope: scope.to_string(),
            step: step.to_string(),
            outcome,
            detail,
        };
        observer.on_step(&report);
        self.steps.push(report);
    }

    /// Record a step error according to its severity
    ///
    /// Fatal errors are handed back so the caller aborts with `?`;
    /// everything else is logged, recorded and swallowed.
    pub fn absorb(
        &mut self,
        observer: &dyn Observer,
        scope: impl ToString,
        step: impl ToString,
        error: SiteError,
    ) -> Result<()> {
        let severity = error.severity();
        let scope = scope.to_string();
        let step = step.to_string();
        if severity == Severity::Fatal {
            tracing::error!("{} / {}: {}", scope, step, error);
            self.push(observer, scope, step, StepOutcome::Failed(severity), Some(error.to_string()));
            return Err(error);
        }
        tracing::warn!("{} / {}: {}", scope, step, error);
        self.push(observer, scope, step, StepOutcome::Failed(severity), Some(error.to_string()));
        Ok(())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.outcome.is_failure())
    }

    pub fn find(&self, scope: &str, step: &str) -> Option<&StepReport> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.scope == scope && s.step == step)
    }

    pub fn summary(&self) -> RunSummary {
        let count = |f: fn(&StepOutcome) -> bool| self.steps.iter().filter(|s| f(&s.outcome)).count();
        RunSummary {
            executed: count(|o| {
                matches!(
                    o,
                    StepOutcome::Executed | StepOutcome::Adopted | StepOutcome::Removed
                )
            }),
            unchanged: count(|o| matches!(o, StepOutcome::Cached | StepOutcome::AlreadyGone)),
            pending: count(|o| matches!(o, StepOutcome::Pending)),
            skipped: count(|o| matches!(o, StepOutcome::Skipped)),
            failed: count(StepOutcome::is_failure),
        }
    }
}

/// Summary of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub unchanged: usize,
    pub pending: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} changed, {} unchanged, {} pending, {} skipped, {} failed",
            self.executed, self.unchanged, self.pending, self.skipped, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_by_severity() {
        let mut report = RunReport::new();

        report
            .absorb(&Silent, "a.com", "dns_upsert", SiteError::ApiError("throttled".into()))
            .unwrap();
        report
            .absorb(&Silent, "a.com", "verify", SiteError::Verification("no answer".into()))
            .unwrap();
        let fatal = report.absorb(
            &Silent,
            "deployment",
            "hosted_zone",
            SiteError::HostedZoneNotFound("example.com".into()),
        );
        assert!(matches!(fatal, Err(SiteError::HostedZoneNotFound(_))));

        assert!(!report.is_success());
        assert_eq!(report.failures().count(), 3);
        assert_eq!(report.summary().failed, 3);
    }

    #[test]
    fn test_summary_display() {
        let mut report = RunReport::new();
        report.push(&Silent, "deployment", "bucket_create", StepOutcome::Executed, None);
        report.push(&Silent, "deployment", "hosted_zone", StepOutcome::Cached, None);
        report.push(&Silent, "deployment", "certificate_issue", StepOutcome::Pending, None);
        assert!(report.is_success());
        assert_eq!(
            report.summary().to_string(),
            "1 changed, 1 unchanged, 1 pending, 0 skipped, 0 failed"
        );
        assert_eq!(
            report.find("deployment", "hosted_zone").unwrap().outcome,
            StepOutcome::Cached
        );
    }
}
