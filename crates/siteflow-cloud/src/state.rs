//! Status store for a single deployment
//!
//! One JSON object per deployment (by default `.siteflow/<domain>.json`)
//! records which provisioning steps finished and the identifiers AWS
//! returned for them. The file is the hand-off point between `site` /
//! `redirect`, `sync`, `teardown` and `status`, and it is meant to be
//! read and edited by hand when a run needs manual recovery.
//!
//! Every mutation rewrites the whole document atomically: the new
//! content goes to `<file>.tmp`, the previous file is copied to
//! `<file>.backup`, then the temp file is renamed over the original.
//! Only one process may use a store at a time; concurrent runs against
//! the same file race and the last writer wins.

use crate::error::{Result, SiteError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u64 = 1;
const VERSION_KEY: &str = "version";
const UPDATED_AT_KEY: &str = "updated_at";
const DOMAINS_KEY: &str = "domains";

/// Default directory for status files, relative to the working directory
pub const STATUS_DIR: &str = ".siteflow";

/// Record keys shared by the workflows and the `status` command
pub mod keys {
    pub const KIND: &str = "kind";
    pub const DOMAIN: &str = "domain";
    pub const ALTERNATE_NAMES: &str = "alternate_names";
    pub const SOURCE_DOMAINS: &str = "source_domains";
    pub const TARGET_DOMAIN: &str = "target_domain";
    pub const REGION: &str = "region";
    pub const CREATED_AT: &str = "created_at";
    pub const REDIRECT_PROTOCOL: &str = "redirect_protocol";
    pub const REDIRECT_TYPE: &str = "redirect_type";
    pub const REDIRECT_PATH: &str = "redirect_path";
    pub const IPV6: &str = "ipv6";

    pub const HOSTED_ZONE_ID: &str = "hosted_zone_id";
    pub const HOSTED_ZONE_NAME: &str = "hosted_zone_name";
    pub const TARGET_HOSTED_ZONE_ID: &str = "target_hosted_zone_id";
    pub const BUCKET_NAME: &str = "bucket_name";
    pub const CERTIFICATE_ARN: &str = "certificate_arn";
    pub const VALIDATION_RECORDS: &str = "validation_records";
    pub const ORIGIN_ACCESS_CONTROL_ID: &str = "origin_access_control_id";
    pub const DISTRIBUTION_ID: &str = "distribution_id";
    pub const DISTRIBUTION_ARN: &str = "distribution_arn";
    pub const DISTRIBUTION_DOMAIN: &str = "distribution_domain";
    pub const DNS_RECORDS: &str = "dns_records";
    pub const LAST_VERIFIED_AT: &str = "last_verified_at";
    pub const TEARDOWN_COMPLETED_AT: &str = "teardown_completed_at";

    pub const KIND_SITE: &str = "site";
    pub const KIND_REDIRECT: &str = "redirect";
}

/// A named provisioning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    HostedZone,
    BucketCreate,
    CertificateIssue,
    OriginAccessControl,
    DistributionCreate,
    BucketPolicy,
    DnsUpsert,
    DistributionDeployed,
}

impl Step {
    /// Steps of a static-site deployment, in execution order
    pub const SITE: [Step; 8] = [
        Step::HostedZone,
        Step::BucketCreate,
        Step::CertificateIssue,
        Step::OriginAccessControl,
        Step::DistributionCreate,
        Step::BucketPolicy,
        Step::DnsUpsert,
        Step::DistributionDeployed,
    ];

    /// Steps tracked per source domain in a redirect deployment
    pub const REDIRECT_DOMAIN: [Step; 4] = [
        Step::BucketCreate,
        Step::DistributionCreate,
        Step::DnsUpsert,
        Step::DistributionDeployed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::HostedZone => "hosted_zone",
            Step::BucketCreate => "bucket_create",
            Step::CertificateIssue => "certificate_issue",
            Step::OriginAccessControl => "origin_access_control",
            Step::DistributionCreate => "distribution_create",
            Step::BucketPolicy => "bucket_policy",
            Step::DnsUpsert => "dns_upsert",
            Step::DistributionDeployed => "distribution_deployed",
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.as_str(), suffix)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a step as derived from its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    /// A long wait timed out; partial output was kept for the next run
    Pending,
    Completed,
    /// Torn down; kept for the audit trail
    Removed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::NotStarted => write!(f, "not started"),
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Removed => write!(f, "removed"),
        }
    }
}

/// Where a key lives: the record root or one domain's sub-record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    Root,
    Domain(&'a str),
}

impl std::fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Root => write!(f, "deployment"),
            Scope::Domain(d) => write!(f, "{}", d),
        }
    }
}

/// Contents of a status file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentRecord {
    values: Map<String, Value>,
}

impl DeploymentRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value of a key; `None` when the key is absent or not a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// String elements of an array-valued key; empty when absent
    pub fn get_array(&self, key: &str) -> Vec<String> {
        string_array(self.get(key))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn set_array(&mut self, key: impl Into<String>, values: &[String]) {
        self.set(key, Value::from(values.to_vec()));
    }

    /// Source domains that have a sub-record, in file order
    pub fn domain_names(&self) -> Vec<String> {
        self.values
            .get(DOMAINS_KEY)
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn domain(&self, name: &str) -> Option<&Map<String, Value>> {
        self.values
            .get(DOMAINS_KEY)
            .and_then(Value::as_object)
            .and_then(|m| m.get(name))
            .and_then(Value::as_object)
    }

    fn domain_mut(&mut self, name: &str) -> &mut Map<String, Value> {
        let domains = self
            .values
            .entry(DOMAINS_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !domains.is_object() {
            *domains = Value::Object(Map::new());
        }
        let Value::Object(domains) = domains else {
            unreachable!("domains was just normalized to an object")
        };
        let entry = domains
            .entry(name)
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(sub) = entry else {
            unreachable!("domain entry was just normalized to an object")
        };
        sub
    }

    pub fn get_in(&self, scope: Scope<'_>, key: &str) -> Option<&Value> {
        match scope {
            Scope::Root => self.get(key),
            Scope::Domain(d) => self.domain(d).and_then(|m| m.get(key)),
        }
    }

    pub fn get_str_in(&self, scope: Scope<'_>, key: &str) -> Option<&str> {
        self.get_in(scope, key).and_then(Value::as_str)
    }

    pub fn get_array_in(&self, scope: Scope<'_>, key: &str) -> Vec<String> {
        string_array(self.get_in(scope, key))
    }

    pub fn set_in(&mut self, scope: Scope<'_>, key: impl Into<String>, value: impl Into<Value>) {
        match scope {
            Scope::Root => self.set(key, value),
            Scope::Domain(d) => {
                self.domain_mut(d).insert(key.into(), value.into());
            }
        }
    }

    fn flag(&self, scope: Scope<'_>, key: &str) -> bool {
        self.get_in(scope, key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn step_status(&self, scope: Scope<'_>, step: Step) -> StepStatus {
        let completed = self.flag(scope, &step.key("completed"));
        if self.flag(scope, &step.key("removed")) && !completed {
            StepStatus::Removed
        } else if completed {
            StepStatus::Completed
        } else if self.flag(scope, &step.key("pending")) {
            StepStatus::Pending
        } else {
            StepStatus::NotStarted
        }
    }

    /// Timestamp that goes with the step's current status
    pub fn step_timestamp(&self, scope: Scope<'_>, step: Step) -> Option<&str> {
        let key = match self.step_status(scope, step) {
            StepStatus::Completed => step.key("completed_at"),
            StepStatus::Removed => step.key("removed_at"),
            StepStatus::Pending => step.key("pending_at"),
            StepStatus::NotStarted => return None,
        };
        self.get_str_in(scope, &key)
    }

    pub fn is_step_completed(&self, step: Step) -> bool {
        self.is_step_completed_in(Scope::Root, step)
    }

    pub fn is_step_completed_in(&self, scope: Scope<'_>, step: Step) -> bool {
        self.step_status(scope, step) == StepStatus::Completed
    }

    pub fn mark_completed_in(&mut self, scope: Scope<'_>, step: Step) {
        self.set_in(scope, step.key("completed"), true);
        self.set_in(scope, step.key("completed_at"), now());
        self.set_in(scope, step.key("pending"), false);
        self.set_in(scope, step.key("removed"), false);
    }

    pub fn mark_pending_in(&mut self, scope: Scope<'_>, step: Step) {
        self.set_in(scope, step.key("completed"), false);
        self.set_in(scope, step.key("pending"), true);
        self.set_in(scope, step.key("pending_at"), now());
    }

    /// Clear a completion flag so the next run redoes the step
    pub fn reset_in(&mut self, scope: Scope<'_>, step: Step) {
        if self.get_in(scope, &step.key("completed")).is_some() {
            self.set_in(scope, step.key("completed"), false);
        }
    }

    pub fn mark_removed_in(&mut self, scope: Scope<'_>, step: Step) {
        self.set_in(scope, step.key("completed"), false);
        self.set_in(scope, step.key("pending"), false);
        self.set_in(scope, step.key("removed"), true);
        self.set_in(scope, step.key("removed_at"), now());
    }

    fn version(&self) -> Option<u64> {
        self.get(VERSION_KEY).and_then(Value::as_u64)
    }
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Whether a missing status file is an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Sync, teardown and status need the file provisioning produced
    Required,
    /// Provisioning starts from an empty record
    CreateIfMissing,
}

/// A deployment record bound to its file on disk
#[derive(Debug)]
pub struct StatusStore {
    path: PathBuf,
    record: DeploymentRecord,
}

impl StatusStore {
    /// Load the store at `path`
    pub async fn load(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return match mode {
                OpenMode::Required => Err(SiteError::StatusFileNotFound(path)),
                OpenMode::CreateIfMissing => {
                    tracing::debug!("Status file {} not found, starting empty", path.display());
                    Ok(Self {
                        path,
                        record: DeploymentRecord::new(),
                    })
                }
            };
        }

        let content = fs::read_to_string(&path).await?;
        let record: DeploymentRecord = serde_json::from_str(&content).map_err(|e| {
            SiteError::StateError(format!("{} is not a JSON object: {}", path.display(), e))
        })?;

        if let Some(version) = record.version() {
            if version > STATE_VERSION {
                return Err(SiteError::StateError(format!(
                    "Status file version {} is newer than supported version {}",
                    version, STATE_VERSION
                )));
            }
        }

        tracing::debug!(
            "Loaded status file {} ({} keys)",
            path.display(),
            record.values.len()
        );
        Ok(Self { path, record })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &DeploymentRecord {
        &self.record
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.get(key)
    }

    pub fn get_array(&self, key: &str) -> Vec<String> {
        self.record.get_array(key)
    }

    pub async fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.record.set(key, value);
        self.save().await
    }

    pub async fn set_array(&mut self, key: &str, values: &[String]) -> Result<()> {
        self.record.set_array(key, values);
        self.save().await
    }

    pub async fn set_in(
        &mut self,
        scope: Scope<'_>,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.record.set_in(scope, key, value);
        self.save().await
    }

    pub fn is_step_completed(&self, step: Step) -> bool {
        self.record.is_step_completed(step)
    }

    pub fn is_step_completed_in(&self, scope: Scope<'_>, step: Step) -> bool {
        self.record.is_step_completed_in(scope, step)
    }

    pub async fn mark_pending(&mut self, step: Step) -> Result<()> {
        self.mark_pending_in(Scope::Root, step).await
    }

    pub async fn mark_removed(&mut self, step: Step) -> Result<()> {
        self.mark_removed_in(Scope::Root, step).await
    }

    pub async fn mark_completed(&mut self, step: Step) -> Result<()> {
        self.mark_completed_in(Scope::Root, step).await
    }

    pub async fn mark_completed_in(&mut self, scope: Scope<'_>, step: Step) -> Result<()> {
        self.record.mark_completed_in(scope, step);
        self.save().await
    }

    pub async fn mark_pending_in(&mut self, scope: Scope<'_>, step: Step) -> Result<()> {
        self.record.mark_pending_in(scope, step);
        self.save().await
    }

    pub async fn mark_removed_in(&mut self, scope: Scope<'_>, step: Step) -> Result<()> {
        self.record.mark_removed_in(scope, step);
        self.save().await
    }

    /// Apply several changes and persist them as one write
    pub async fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut DeploymentRecord),
    {
        f(&mut self.record);
        self.save().await
    }

    async fn save(&mut self) -> Result<()> {
        if self.record.version().is_none() {
            self.record.set(VERSION_KEY, STATE_VERSION);
        }
        self.record.set(UPDATED_AT_KEY, now());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                tracing::debug!("Created status directory: {}", parent.display());
            }
        }

        let content = serde_json::to_string_pretty(&self.record)?;
        let tmp = sibling(&self.path, ".tmp");

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;
        drop(file);

        if self.path.exists() {
            fs::copy(&self.path, sibling(&self.path, ".backup")).await?;
        }
        fs::rename(&tmp, &self.path).await?;

        tracing::trace!("Saved status file {}", self.path.display());
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Default status file path for a deployment name inside `status_dir`
pub fn default_status_path(status_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    status_dir.as_ref().join(format!("{}.json", name))
}
