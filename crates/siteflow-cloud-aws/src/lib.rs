//! AWS provider for SiteFlow
//!
//! This crate implements the `SiteProvider` trait on top of the official
//! AWS SDK, so the provisioning workflows in `siteflow-cloud` can manage
//! real S3 buckets, CloudFront distributions, ACM certificates and
//! Route53 records.
//!
//! # Requirements
//!
//! - Credentials resolvable by the default provider chain (environment,
//!   `~/.aws/credentials`, SSO, instance profile) or a named profile
//! - Public Route53 hosted zones for every served domain
//!
//! # Example
//!
//! ```ignore
//! use siteflow_cloud::SiteProvider;
//! use siteflow_cloud_aws::{AwsProvider, AwsSettings};
//!
//! let provider = AwsProvider::connect(&AwsSettings {
//!     profile: Some("prod".to_string()),
//!     region: Some("eu-west-1".to_string()),
//! })
//! .await;
//!
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//! ```

pub mod acm;
pub mod cloudfront;
pub mod error;
pub mod provider;
pub mod route53;
pub mod s3;

pub use acm::{AcmCertificates, CERTIFICATE_REGION};
pub use cloudfront::{CACHING_OPTIMIZED_POLICY_ID, CloudFrontCdn};
pub use error::{AwsError, Result};
pub use provider::{AwsProvider, AwsSettings};
pub use route53::Route53Dns;
pub use s3::S3Storage;
