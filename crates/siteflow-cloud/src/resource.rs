//! Typed request shapes handed to a [`SiteProvider`](crate::SiteProvider)
//!
//! Providers translate these into their own API calls; nothing here is
//! assembled by string concatenation.

use serde::{Deserialize, Serialize};

/// Key/value tag applied to buckets and distributions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Tags every resource created for `domain` carries
pub fn resource_tags(domain: &str) -> Vec<Tag> {
    vec![
        Tag::new("managed-by", "siteflow"),
        Tag::new("siteflow-domain", domain),
    ]
}

/// DNS record types this tool reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Aaaa => write!(f, "AAAA"),
            RecordType::Cname => write!(f, "CNAME"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordValue {
    /// Alias to a provider-managed endpoint
    Alias {
        dns_name: String,
        hosted_zone_id: String,
    },
    Values { ttl: i64, values: Vec<String> },
}

/// A single DNS record set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: RecordType,
    pub value: RecordValue,
}

impl DnsRecord {
    pub fn alias(
        name: impl Into<String>,
        record_type: RecordType,
        dns_name: impl Into<String>,
        hosted_zone_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            record_type,
            value: RecordValue::Alias {
                dns_name: dns_name.into(),
                hosted_zone_id: hosted_zone_id.into(),
            },
        }
    }

    pub fn cname(name: impl Into<String>, value: impl Into<String>, ttl: i64) -> Self {
        Self {
            name: name.into(),
            record_type: RecordType::Cname,
            value: RecordValue::Values {
                ttl,
                values: vec![value.into()],
            },
        }
    }

    /// Whether this record is an alias pointing at `dns_name`
    pub fn targets(&self, dns_name: &str) -> bool {
        match &self.value {
            RecordValue::Alias { dns_name: d, .. } => {
                crate::naming::normalize_domain(d) == crate::naming::normalize_domain(dns_name)
            }
            RecordValue::Values { .. } => false,
        }
    }
}

/// Certificate validation CNAME written into a hosted zone, kept for teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCname {
    pub zone_id: String,
    pub name: String,
    pub value: String,
}

impl ValidationCname {
    pub fn record(&self, ttl: i64) -> DnsRecord {
        DnsRecord::cname(&self.name, &self.value, ttl)
    }

    /// Whether `live` still carries the value this CNAME was written with
    pub fn matches(&self, live: &DnsRecord) -> bool {
        let wanted = crate::naming::normalize_domain(&self.value);
        match &live.value {
            RecordValue::Values { values, .. } => values
                .iter()
                .any(|v| crate::naming::normalize_domain(v) == wanted),
            RecordValue::Alias { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectProtocol {
    Http,
    Https,
}

impl std::fmt::Display for RedirectProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedirectProtocol::Http => write!(f, "http"),
            RedirectProtocol::Https => write!(f, "https"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectType {
    /// 301
    Permanent,
    /// 302
    Temporary,
}

impl RedirectType {
    pub fn status_code(&self) -> u16 {
        match self {
            RedirectType::Permanent => 301,
            RedirectType::Temporary => 302,
        }
    }
}

impl std::fmt::Display for RedirectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedirectType::Permanent => write!(f, "permanent"),
            RedirectType::Temporary => write!(f, "temporary"),
        }
    }
}

/// Bucket website configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketWebsite {
    Site {
        index_document: String,
        error_document: String,
    },
    /// Every request goes to `host`, keeping the path (always 301)
    RedirectAll {
        host: String,
        protocol: RedirectProtocol,
    },
    /// One unconditional routing rule
    RedirectRule {
        host: String,
        protocol: RedirectProtocol,
        status_code: u16,
        replace_key_with: Option<String>,
    },
}

impl BucketWebsite {
    pub fn site() -> Self {
        BucketWebsite::Site {
            index_document: "index.html".to_string(),
            error_document: "404.html".to_string(),
        }
    }

    /// Website configuration for a redirect bucket
    ///
    /// `path` of `None` keeps the request path; `Some` sends every
    /// request to that fixed path.
    pub fn redirect(
        host: &str,
        protocol: RedirectProtocol,
        redirect_type: RedirectType,
        path: Option<&str>,
    ) -> Self {
        match (redirect_type, path) {
            (RedirectType::Permanent, None) => BucketWebsite::RedirectAll {
                host: host.to_string(),
                protocol,
            },
            (redirect_type, path) => BucketWebsite::RedirectRule {
                host: host.to_string(),
                protocol,
                status_code: redirect_type.status_code(),
                replace_key_with: path.map(|p| p.trim_start_matches('/').to_string()),
            },
        }
    }
}

/// S3 bucket policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicy {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub sid: String,
    pub effect: String,
    pub principal: PolicyPrincipal,
    pub action: String,
    pub resource: String,
    pub condition: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyPrincipal {
    pub service: String,
}

impl BucketPolicy {
    /// Read access for one CloudFront distribution through origin access control
    pub fn cloudfront_read(bucket: &str, distribution_arn: &str) -> Self {
        Self {
            version: "2012-10-17".to_string(),
            statement: vec![PolicyStatement {
                sid: "AllowCloudFrontServicePrincipalReadOnly".to_string(),
                effect: "Allow".to_string(),
                principal: PolicyPrincipal {
                    service: "cloudfront.amazonaws.com".to_string(),
                },
                action: "s3:GetObject".to_string(),
                resource: format!("arn:aws:s3:::{}/*", bucket),
                condition: serde_json::json!({
                    "StringEquals": { "AWS:SourceArn": distribution_arn }
                }),
            }],
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// DNS-validated certificate request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub domain: String,
    pub alternate_names: Vec<String>,
    pub idempotency_token: String,
    pub tags: Vec<Tag>,
}

impl CertificateRequest {
    /// Every name the certificate covers, primary first
    pub fn names(&self) -> Vec<String> {
        std::iter::once(self.domain.clone())
            .chain(self.alternate_names.iter().cloned())
            .collect()
    }
}

/// Where a distribution fetches content from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginSpec {
    /// Bucket website endpoint over plain HTTP (redirect buckets)
    Website { endpoint: String },
    /// Bucket REST endpoint signed through origin access control
    S3 {
        regional_domain: String,
        origin_access_control_id: String,
    },
}

/// Everything needed to create one distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSpec {
    pub caller_reference: String,
    pub comment: String,
    pub aliases: Vec<String>,
    pub certificate_arn: String,
    pub origin: OriginSpec,
    pub default_root_object: Option<String>,
    /// Error page served for 403/404 responses from the origin
    pub error_page: Option<String>,
    pub ipv6: bool,
    pub tags: Vec<Tag>,
}

/// One object to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub content_encoding: Option<String>,
    pub cache_control: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_website_variants() {
        assert_eq!(
            BucketWebsite::redirect("c.com", RedirectProtocol::Https, RedirectType::Permanent, None),
            BucketWebsite::RedirectAll {
                host: "c.com".into(),
                protocol: RedirectProtocol::Https
            }
        );
        assert_eq!(
            BucketWebsite::redirect(
                "c.com",
                RedirectProtocol::Https,
                RedirectType::Temporary,
                Some("/landing")
            ),
            BucketWebsite::RedirectRule {
                host: "c.com".into(),
                protocol: RedirectProtocol::Https,
                status_code: 302,
                replace_key_with: Some("landing".into()),
            }
        );
    }

    #[test]
    fn test_bucket_policy_json_shape() {
        let policy = BucketPolicy::cloudfront_read(
            "example-com-site-1234abcd",
            "arn:aws:cloudfront::123456789012:distribution/E123",
        );
        let json: serde_json::Value = serde_json::from_str(&policy.to_json().unwrap()).unwrap();
        assert_eq!(json["Version"], "2012-10-17");
        let statement = &json["Statement"][0];
        assert_eq!(statement["Principal"]["Service"], "cloudfront.amazonaws.com");
        assert_eq!(
            statement["Resource"],
            "arn:aws:s3:::example-com-site-1234abcd/*"
        );
        assert_eq!(
            statement["Condition"]["StringEquals"]["AWS:SourceArn"],
            "arn:aws:cloudfront::123456789012:distribution/E123"
        );
    }

    #[test]
    fn test_record_targets_ignores_trailing_dot_and_case() {
        let record = DnsRecord::alias(
            "example.com",
            RecordType::A,
            "D111.CloudFront.net.",
            "Z2FDTNDATAQYW2",
        );
        assert!(record.targets("d111.cloudfront.net"));
        assert!(!record.targets("d222.cloudfront.net"));
    }
}
