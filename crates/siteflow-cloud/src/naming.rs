//! Resource naming and endpoint conventions

use crate::error::{Result, SiteError};
use sha2::{Digest, Sha256};

/// Hosted zone id CloudFront uses for every alias target
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// AWS managed "CachingOptimized" cache policy
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

/// CloudFront only accepts certificates from this region
pub const CERTIFICATE_REGION: &str = "us-east-1";

const MAX_BUCKET_NAME: usize = 63;

/// Regions whose website endpoints use `s3-website-<region>` instead of
/// `s3-website.<region>`
const LEGACY_WEBSITE_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-1",
    "us-west-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "eu-west-1",
    "sa-east-1",
    "us-gov-west-1",
];

/// What a bucket is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    Site,
    Redirect,
}

impl BucketKind {
    fn as_str(&self) -> &'static str {
        match self {
            BucketKind::Site => "site",
            BucketKind::Redirect => "redirect",
        }
    }
}

/// Lowercase and strip the trailing root dot
pub fn normalize_domain(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Check a domain name passed on the command line
pub fn validate_domain(name: &str) -> Result<String> {
    let domain = normalize_domain(name);
    let labels: Vec<&str> = domain.split('.').collect();

    let valid = labels.len() >= 2
        && domain.len() <= 253
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    if valid {
        Ok(domain)
    } else {
        Err(SiteError::InvalidConfig(format!(
            "'{}' is not a valid domain name",
            name
        )))
    }
}

/// Registrable parent (last two labels), if `name` has more than two
pub fn parent_domain(name: &str) -> Option<String> {
    let domain = normalize_domain(name);
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() > 2 {
        Some(labels[labels.len() - 2..].join("."))
    } else {
        None
    }
}

fn digest_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Canonical bucket name: `<domain-dashed>-<kind>-<8 hex>`
///
/// The suffix is stable for one record (it hashes the record's creation
/// time) and differs between deployments of the same domain.
pub fn bucket_name(domain: &str, kind: BucketKind, created_at: &str) -> String {
    let suffix = &digest_hex(&[domain, kind.as_str(), created_at])[..8];
    let tail = format!("-{}-{}", kind.as_str(), suffix);
    let stem: String = normalize_domain(domain).replace('.', "-");
    let room = MAX_BUCKET_NAME - tail.len();
    let stem: String = stem.chars().take(room).collect();
    format!("{}{}", stem.trim_end_matches('-'), tail)
}

/// CloudFront caller reference for a distribution
pub fn caller_reference(domain: &str, created_at: &str) -> String {
    format!("siteflow-{}-{}", normalize_domain(domain), &digest_hex(&[created_at])[..12])
}

/// ACM idempotency token (at most 32 word characters)
pub fn idempotency_token(names: &[String], created_at: &str) -> String {
    let mut parts: Vec<&str> = names.iter().map(String::as_str).collect();
    parts.push(created_at);
    digest_hex(&parts)[..32].to_string()
}

/// Static website endpoint of a bucket
pub fn website_endpoint(bucket: &str, region: &str) -> String {
    if LEGACY_WEBSITE_REGIONS.contains(&region) {
        format!("{}.s3-website-{}.amazonaws.com", bucket, region)
    } else {
        format!("{}.s3-website.{}.amazonaws.com", bucket, region)
    }
}

/// REST endpoint of a bucket, used as an origin-access-controlled origin
pub fn regional_domain(bucket: &str, region: &str) -> String {
    format!("{}.s3.{}.amazonaws.com", bucket, region)
}

/// Status file stem for a redirect deployment
pub fn redirect_status_name(target: &str) -> String {
    format!("redirect-{}", normalize_domain(target))
}
