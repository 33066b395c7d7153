//! Bounded polling for eventually-consistent AWS state

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// How long to keep asking before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of checks
    pub max_attempts: u32,

    /// Delay between checks
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Worst-case wait before timing out
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Poll policies for each long wait in the workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicies {
    /// Waiting for ACM to publish validation CNAMEs
    pub validation_records: PollPolicy,
    /// Waiting for the certificate to be issued
    pub certificate: PollPolicy,
    /// Waiting for a distribution to reach `Deployed`
    pub deployment: PollPolicy,
    /// Waiting for a disabled distribution before deleting it
    pub teardown: PollPolicy,
}

impl Default for PollPolicies {
    fn default() -> Self {
        Self {
            validation_records: PollPolicy::new(12, Duration::from_secs(10)),
            certificate: PollPolicy::new(60, Duration::from_secs(30)),
            deployment: PollPolicy::new(60, Duration::from_secs(30)),
            teardown: PollPolicy::new(60, Duration::from_secs(30)),
        }
    }
}

impl PollPolicies {
    /// No sleeping, a handful of attempts
    pub fn immediate() -> Self {
        let quick = PollPolicy::new(3, Duration::ZERO);
        Self {
            validation_records: quick,
            certificate: quick,
            deployment: quick,
            teardown: quick,
        }
    }
}

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
}

/// Call `check` until it yields a value or the policy is exhausted
///
/// Errors from `check` end the wait immediately. `on_attempt` runs
/// before every check with the 1-based attempt number.
pub async fn poll_until<T, F, Fut, A>(
    policy: &PollPolicy,
    mut on_attempt: A,
    mut check: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
    A: FnMut(u32),
{
    for attempt in 1..=policy.max_attempts {
        on_attempt(attempt);
        if let Some(value) = check().await? {
            return Ok(PollOutcome::Ready(value));
        }
        if attempt < policy.max_attempts && !policy.interval.is_zero() {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Ok(PollOutcome::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SiteError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_ready_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = PollPolicy::new(5, Duration::ZERO);
        let outcome = poll_until(&policy, |_| {}, move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(if n == 3 { Some(n) } else { None })
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Ready(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_times_out_after_max_attempts() {
        let mut seen = Vec::new();
        let policy = PollPolicy::new(4, Duration::ZERO);
        let outcome: PollOutcome<()> =
            poll_until(&policy, |a| seen.push(a), || async { Ok(None) })
                .await
                .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_error_stops_polling() {
        let policy = PollPolicy::new(4, Duration::ZERO);
        let result: Result<PollOutcome<()>> = poll_until(&policy, |_| {}, || async {
            Err(SiteError::ApiError("boom".into()))
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_attempts() {
        let policy = PollPolicy::new(3, Duration::from_secs(30));
        let start = tokio::time::Instant::now();
        let _: PollOutcome<()> = poll_until(&policy, |_| {}, || async { Ok(None) })
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(policy.budget(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(PollPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
