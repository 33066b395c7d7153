//! AWS provider error types

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use siteflow_cloud::SiteError;
use thiserror::Error;

/// Service error codes that mean "the thing you asked about does not exist"
const NOT_FOUND_CODES: &[&str] = &[
    "NotFound",
    "NoSuchBucket",
    "NoSuchBucketPolicy",
    "NoSuchHostedZone",
    "NoSuchDistribution",
    "NoSuchOriginAccessControl",
    "ResourceNotFoundException",
];

const IN_USE_CODES: &[&str] = &[
    "BucketNotEmpty",
    "DistributionNotDisabled",
    "OriginAccessControlInUse",
    "ResourceInUseException",
    "PreconditionFailed",
];

const CREDENTIAL_CODES: &[&str] = &[
    "InvalidClientTokenId",
    "ExpiredToken",
    "ExpiredTokenException",
    "UnrecognizedClientException",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
];

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("AWS credentials rejected: {0}")]
    Credentials(String),

    #[error("{operation}: {code} {message}")]
    NotFound {
        operation: &'static str,
        code: String,
        message: String,
    },

    #[error("{operation}: {code} {message}")]
    InUse {
        operation: &'static str,
        code: String,
        message: String,
    },

    #[error("{operation} failed: {code} {message}")]
    Api {
        operation: &'static str,
        code: String,
        message: String,
    },

    #[error("{operation} returned no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl AwsError {
    /// Classify an SDK failure by its service error code
    ///
    /// Every generated SDK crate re-exports the same smithy `SdkError`, so
    /// this works for S3, CloudFront, ACM, Route53 and STS alike.
    pub fn from_sdk<E>(operation: &'static str, err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let status = err.raw_response().map(|r| r.status().as_u16());
        let code = err.code().map(str::to_string);
        let message = err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

        match code {
            Some(code) if CREDENTIAL_CODES.contains(&code.as_str()) => {
                AwsError::Credentials(format!("{}: {}", code, message))
            }
            Some(code) if NOT_FOUND_CODES.contains(&code.as_str()) => AwsError::NotFound {
                operation,
                code,
                message,
            },
            Some(code) if IN_USE_CODES.contains(&code.as_str()) => AwsError::InUse {
                operation,
                code,
                message,
            },
            Some(code) => AwsError::Api {
                operation,
                code,
                message,
            },
            // HEAD requests carry no body, so only the status is left
            None if status == Some(404) => AwsError::NotFound {
                operation,
                code: "404".to_string(),
                message,
            },
            None if message.contains("credentials") => AwsError::Credentials(message),
            None => AwsError::Api {
                operation,
                code: status.map(|s| s.to_string()).unwrap_or_default(),
                message,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Route53 reports a missing record as an invalid change batch
    pub fn is_missing_record(&self) -> bool {
        match self {
            AwsError::Api { code, message, .. } => {
                code == "InvalidChangeBatch" && message.contains("not found")
            }
            _ => false,
        }
    }
}

/// Builder failures from SDK types with required fields
pub(crate) fn build_error(err: impl std::fmt::Display) -> AwsError {
    AwsError::InvalidRequest(err.to_string())
}

/// Turn a delete result into `Ok(false)` when the resource was already gone
pub(crate) fn gone_is_false(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

impl From<AwsError> for SiteError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::Credentials(msg) => SiteError::AuthenticationFailed(msg),
            AwsError::InUse { .. } => SiteError::ResourceInUse(err.to_string()),
            AwsError::InvalidRequest(msg) => SiteError::InvalidConfig(msg),
            AwsError::Json(e) => SiteError::Json(e),
            AwsError::NotFound { .. } | AwsError::Api { .. } | AwsError::MissingField { .. } => {
                SiteError::ApiError(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteflow_cloud::Severity;

    #[test]
    fn test_gone_is_false() {
        assert!(gone_is_false(Ok(())).unwrap());
        let gone = AwsError::NotFound {
            operation: "DeleteBucket",
            code: "NoSuchBucket".into(),
            message: "gone".into(),
        };
        assert!(!gone_is_false(Err(gone)).unwrap());
        let denied = AwsError::Api {
            operation: "DeleteBucket",
            code: "AccessDenied".into(),
            message: "no".into(),
        };
        assert!(gone_is_false(Err(denied)).is_err());
    }

    #[test]
    fn test_missing_record_detection() {
        let err = AwsError::Api {
            operation: "ChangeResourceRecordSets",
            code: "InvalidChangeBatch".into(),
            message: "Tried to delete resource record set but it was not found".into(),
        };
        assert!(err.is_missing_record());
        let other = AwsError::Api {
            operation: "ChangeResourceRecordSets",
            code: "InvalidChangeBatch".into(),
            message: "RRSet of type CNAME conflicts".into(),
        };
        assert!(!other.is_missing_record());
    }

    #[test]
    fn test_site_error_severity_mapping() {
        let in_use: SiteError = AwsError::InUse {
            operation: "DeleteDistribution",
            code: "DistributionNotDisabled".into(),
            message: "still enabled".into(),
        }
        .into();
        assert!(matches!(in_use, SiteError::ResourceInUse(_)));
        assert_eq!(in_use.severity(), Severity::Retryable);

        let creds: SiteError = AwsError::Credentials("expired".into()).into();
        assert_eq!(creds.severity(), Severity::Fatal);

        let missing: SiteError = AwsError::MissingField {
            operation: "CreateDistribution",
            field: "distribution",
        }
        .into();
        assert!(missing.to_string().contains("CreateDistribution returned no distribution"));
    }
}
