//! SiteFlow provisioning core
//!
//! Resumable workflows that put a static site or a set of domain
//! redirects behind a CDN, keep the site content in sync, and tear it
//! all down again. Progress lives in a JSON status file so an
//! interrupted run picks up where it stopped.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  siteflow CLI                    │
//! │   (site / redirect / sync / teardown / status)   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                siteflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   Workflow<P: SiteProvider>              │   │
//! │  │   site · redirect · sync · teardown      │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Status Store │  │  RunReport   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────┐
//! │ siteflow-cloud-aws│
//! │ S3 · CloudFront · │
//! │ ACM · Route53     │
//! └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use siteflow_cloud::{OpenMode, SiteOptions, StatusStore, Workflow};
//!
//! let mut store = StatusStore::load(".siteflow/example.com.json", OpenMode::CreateIfMissing).await?;
//! let report = Workflow::new(&provider)
//!     .provision_site(&mut store, &SiteOptions::new("example.com", "us-east-1"))
//!     .await?;
//! println!("{}", report.summary());
//! ```

pub mod action;
pub mod error;
pub mod naming;
pub mod poll;
pub mod provider;
pub mod resource;
pub mod state;
pub mod verify;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use action::{Observer, RunReport, RunSummary, Silent, StepOutcome, StepReport};
pub use error::{Result, Severity, SiteError};
pub use poll::{PollOutcome, PollPolicies, PollPolicy};
pub use provider::{
    AuthStatus, CertificateDetails, CertificateStatus, DistributionInfo, HostedZone,
    RemoteObject, SiteProvider, ValidationRecord,
};
pub use resource::{
    BucketPolicy, BucketWebsite, CertificateRequest, DistributionSpec, DnsRecord, OriginSpec,
    PutObject, RecordType, RecordValue, RedirectProtocol, RedirectType, Tag,
};
pub use state::{
    DeploymentRecord, OpenMode, STATUS_DIR, Scope, StatusStore, Step, StepStatus,
    default_status_path, keys,
};
pub use verify::{Expectation, NetworkProber, ProbeResponse, Prober};
pub use workflow::{
    RedirectOptions, SiteOptions, SyncOptions, SyncPlan, SyncReport, UploadReason, Workflow,
};
