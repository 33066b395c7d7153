//! Cloud provider trait definition

use crate::error::Result;
use crate::resource::{
    BucketPolicy, BucketWebsite, CertificateRequest, DistributionSpec, DnsRecord, PutObject,
    RecordType, Tag,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything the workflows need from the cloud
///
/// The AWS implementation lives in `siteflow-cloud-aws`. Deletes return
/// `Ok(false)` when the resource was already gone, so callers can treat
/// that case as success.
#[async_trait]
pub trait SiteProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Check that credentials resolve to an account
    async fn check_auth(&self) -> Result<AuthStatus>;

    // ========== DNS ==========

    /// Public hosted zone whose name is exactly `name`
    async fn find_hosted_zone(&self, name: &str) -> Result<Option<HostedZone>>;

    async fn get_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<DnsRecord>>;

    /// Create or replace the given records in one change batch
    async fn upsert_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()>;

    async fn delete_record(&self, zone_id: &str, record: &DnsRecord) -> Result<bool>;

    // ========== Object storage ==========

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str, region: &str, tags: &[Tag]) -> Result<()>;

    async fn configure_website(&self, bucket: &str, website: &BucketWebsite) -> Result<()>;

    /// Turn on all four public access block settings
    async fn block_public_access(&self, bucket: &str) -> Result<()>;

    /// Policy document attached to the bucket, if any
    async fn get_bucket_policy(&self, bucket: &str) -> Result<Option<String>>;

    async fn put_bucket_policy(&self, bucket: &str, policy: &BucketPolicy) -> Result<()>;

    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>>;

    async fn put_object(&self, bucket: &str, object: PutObject) -> Result<()>;

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> Result<bool>;

    // ========== Certificates ==========

    /// Request a DNS-validated certificate and return its ARN
    async fn request_certificate(&self, request: &CertificateRequest) -> Result<String>;

    async fn describe_certificate(&self, arn: &str) -> Result<Option<CertificateDetails>>;

    async fn delete_certificate(&self, arn: &str) -> Result<bool>;

    // ========== CDN ==========

    async fn find_origin_access_control(&self, name: &str) -> Result<Option<String>>;

    async fn origin_access_control_exists(&self, id: &str) -> Result<bool>;

    async fn create_origin_access_control(&self, name: &str, description: &str)
    -> Result<String>;

    async fn delete_origin_access_control(&self, id: &str) -> Result<bool>;

    /// Distribution that already serves `alias`, if any
    async fn find_distribution_by_alias(&self, alias: &str) -> Result<Option<DistributionInfo>>;

    async fn get_distribution(&self, id: &str) -> Result<Option<DistributionInfo>>;

    async fn create_distribution(&self, spec: &DistributionSpec) -> Result<DistributionInfo>;

    /// Submit a config update with `enabled = false`
    async fn disable_distribution(&self, id: &str) -> Result<()>;

    /// Delete a disabled, deployed distribution
    async fn delete_distribution(&self, id: &str) -> Result<bool>;

    /// Invalidate `paths` and return the invalidation id
    async fn create_invalidation(&self, distribution_id: &str, paths: &[String]) -> Result<String>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Route53 hosted zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    /// Zone id without the `/hostedzone/` prefix
    pub id: String,
    /// Zone name without the trailing dot
    pub name: String,
}

/// Object listed from a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    /// Unix seconds
    pub last_modified: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateStatus {
    PendingValidation,
    Issued,
    Failed,
    Other(String),
}

impl CertificateStatus {
    /// Expired, revoked, inactive or timed out; such a certificate never becomes usable
    pub fn is_unusable(&self) -> bool {
        matches!(self, CertificateStatus::Other(_))
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificateStatus::PendingValidation => f.write_str("PENDING_VALIDATION"),
            CertificateStatus::Issued => f.write_str("ISSUED"),
            CertificateStatus::Failed => f.write_str("FAILED"),
            CertificateStatus::Other(status) => f.write_str(status),
        }
    }
}

/// CNAME that proves control of one certificate name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub domain: String,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDetails {
    pub arn: String,
    pub status: CertificateStatus,
    pub domain: String,
    pub alternate_names: Vec<String>,
    pub validation_records: Vec<ValidationRecord>,
    pub in_use_by: Vec<String>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionInfo {
    pub id: String,
    pub arn: String,
    /// Default `*.cloudfront.net` hostname
    pub domain_name: String,
    /// `InProgress` or `Deployed`
    pub status: String,
    pub enabled: bool,
    pub aliases: Vec<String>,
}

impl DistributionInfo {
    pub fn is_deployed(&self) -> bool {
        self.status.eq_ignore_ascii_case("deployed")
    }
}
