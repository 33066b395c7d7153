//! Site provisioning error types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// How a failure affects the run that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Abort the run; nothing after this point may execute
    Fatal,
    /// Leave the step unflagged so a re-run retries it
    Retryable,
    /// Report and carry on
    Advisory,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Fatal => write!(f, "fatal"),
            Severity::Retryable => write!(f, "retryable"),
            Severity::Advisory => write!(f, "advisory"),
        }
    }
}

/// Site provisioning errors
#[derive(Error, Debug)]
pub enum SiteError {
    #[error(
        "AWS authentication failed: {0}\n\
        Configure credentials with `aws configure`, pass --profile, or export AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY"
    )]
    AuthenticationFailed(String),

    #[error(
        "No Route53 hosted zone found for {0} (or its parent domain). Create the hosted zone first"
    )]
    HostedZoneNotFound(String),

    #[error("Status file not found: {0}. Run `siteflow site` or `siteflow redirect` first")]
    StatusFileNotFound(PathBuf),

    #[error("Status file is missing `{0}`. Has provisioning completed?")]
    MissingRecordField(String),

    #[error("Certificate {arn} failed validation: {reason}")]
    CertificateFailed { arn: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Resource still in use: {0}")]
    ResourceInUse(String),

    #[error("Timed out: {0}")]
    TimedOut(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SiteError {
    pub fn severity(&self) -> Severity {
        match self {
            SiteError::ApiError(_) | SiteError::ResourceInUse(_) | SiteError::TimedOut(_) => {
                Severity::Retryable
            }
            SiteError::Verification(_) => Severity::Advisory,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

pub type Result<T> = std::result::Result<T, SiteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            SiteError::HostedZoneNotFound("example.com".into()).severity(),
            Severity::Fatal
        );
        assert_eq!(
            SiteError::TimedOut("deploy".into()).severity(),
            Severity::Retryable
        );
        assert_eq!(
            SiteError::ApiError("throttled".into()).severity(),
            Severity::Retryable
        );
        assert_eq!(
            SiteError::Verification("dns".into()).severity(),
            Severity::Advisory
        );
        assert!(SiteError::MissingRecordField("bucket_name".into()).is_fatal());
    }
}
