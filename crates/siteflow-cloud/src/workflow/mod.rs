//! Provisioning, sync and teardown workflows
//!
//! Each workflow is a fixed list of steps run in order against one
//! [`StatusStore`]. A step checks its completion flag together with the
//! live resource, performs at most one logical change, then records what
//! it did. A step that fails without being fatal (or that is left
//! pending) blocks the steps after it in the same scope; they are
//! reported as skipped and picked up by the next run.

mod redirect;
mod site;
mod steps;
mod sync;
mod teardown;

pub use redirect::RedirectOptions;
pub use site::SiteOptions;
pub use sync::{
    PlannedUpload, SyncOptions, SyncPlan, SyncReport, UploadReason, cache_control_for,
    content_type_for, is_compressible,
};

use crate::action::{Observer, RunReport, Silent, StepOutcome};
use crate::error::{Result, SiteError};
use crate::naming::{normalize_domain, parent_domain};
use crate::poll::PollPolicies;
use crate::provider::{HostedZone, SiteProvider};
use crate::state::{DeploymentRecord, Scope, StatusStore, keys, now};
use crate::verify::{Expectation, Prober, verify_name};
use std::collections::BTreeMap;
use std::time::Instant;

/// Hosted zone for each name a workflow serves or validates
pub(crate) type ZoneMap = BTreeMap<String, HostedZone>;

/// Drives the workflows against one provider
pub struct Workflow<'a, P: SiteProvider + ?Sized> {
    provider: &'a P,
    observer: &'a dyn Observer,
    prober: Option<&'a dyn Prober>,
    policies: PollPolicies,
}

impl<'a, P: SiteProvider + ?Sized> Workflow<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            observer: &Silent,
            prober: None,
            policies: PollPolicies::default(),
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn Observer) -> Self {
        self.observer = observer;
        self
    }

    /// Enable post-deploy verification
    pub fn with_prober(mut self, prober: &'a dyn Prober) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn with_policies(mut self, policies: PollPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Find the public zone for `name`, falling back to its registrable parent
    pub async fn resolve_zone(&self, name: &str) -> Result<HostedZone> {
        let name = normalize_domain(name);
        if let Some(zone) = self.provider.find_hosted_zone(&name).await? {
            return Ok(zone);
        }
        if let Some(parent) = parent_domain(&name) {
            if let Some(zone) = self.provider.find_hosted_zone(&parent).await? {
                tracing::debug!("Using parent zone {} for {}", zone.name, name);
                return Ok(zone);
            }
        }
        Err(SiteError::HostedZoneNotFound(name))
    }

    /// Resolve every name up front so nothing is created for a domain we cannot serve
    pub(crate) async fn resolve_zones(&self, names: &[String]) -> Result<ZoneMap> {
        let mut zones = ZoneMap::new();
        for name in names {
            let zone = self.resolve_zone(name).await?;
            zones.insert(name.clone(), zone);
        }
        Ok(zones)
    }

    /// Zone for `name`, using the resolved map first
    pub(crate) async fn zone_for(&self, zones: &ZoneMap, name: &str) -> Result<HostedZone> {
        let name = normalize_domain(name.trim_start_matches("*."));
        match zones.get(&name) {
            Some(zone) => Ok(zone.clone()),
            None => self.resolve_zone(&name).await,
        }
    }

    /// Probe every served name; failures are advisory
    pub(crate) async fn verify_served(
        &self,
        runner: &mut StepRunner<'_>,
        store: &mut StatusStore,
        checks: &[(String, Expectation)],
    ) -> Result<()> {
        let Some(prober) = self.prober else {
            for (name, _) in checks {
                runner.skip(Scope::Domain(name), VERIFY_STEP, "no prober configured");
            }
            return Ok(());
        };

        let mut all_ok = true;
        for (name, expectation) in checks {
            let result = verify_name(prober, name, expectation).await.map(|response| {
                StepDone::executed(format!("HTTP {}", response.status))
            });
            all_ok &= result.is_ok();
            runner.record(Scope::Domain(name), VERIFY_STEP, result)?;
        }

        if all_ok {
            store.set(keys::LAST_VERIFIED_AT, now()).await?;
        }
        Ok(())
    }
}

/// Step name used in reports for post-deploy verification
pub const VERIFY_STEP: &str = "verify";

/// Outcome of a step that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StepDone {
    pub outcome: StepOutcome,
    pub detail: Option<String>,
}

impl StepDone {
    fn new(outcome: StepOutcome, detail: Option<String>) -> Self {
        Self { outcome, detail }
    }

    pub fn cached() -> Self {
        Self::new(StepOutcome::Cached, None)
    }

    pub fn executed(detail: impl Into<String>) -> Self {
        Self::new(StepOutcome::Executed, Some(detail.into()))
    }

    pub fn adopted(detail: impl Into<String>) -> Self {
        Self::new(StepOutcome::Adopted, Some(detail.into()))
    }

    pub fn pending(detail: impl Into<String>) -> Self {
        Self::new(StepOutcome::Pending, Some(detail.into()))
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self::new(StepOutcome::Skipped, Some(detail.into()))
    }

    pub fn removed(detail: impl Into<String>) -> Self {
        Self::new(StepOutcome::Removed, Some(detail.into()))
    }

    pub fn already_gone() -> Self {
        Self::new(StepOutcome::AlreadyGone, None)
    }
}

/// Records step results and applies the failure policy
pub(crate) struct StepRunner<'o> {
    observer: &'o dyn Observer,
    report: RunReport,
    started: Instant,
}

impl<'o> StepRunner<'o> {
    pub fn new(observer: &'o dyn Observer) -> Self {
        Self {
            observer,
            report: RunReport::new(),
            started: Instant::now(),
        }
    }

    /// Record one step; `Ok(false)` when the steps after it must not run
    pub fn record(&mut self, scope: Scope<'_>, step: &str, result: Result<StepDone>) -> Result<bool> {
        match result {
            Ok(done) => {
                let proceed = done.outcome != StepOutcome::Pending;
                self.report
                    .push(self.observer, scope, step, done.outcome, done.detail);
                Ok(proceed)
            }
            Err(error) => {
                self.report.absorb(self.observer, scope, step, error)?;
                Ok(false)
            }
        }
    }

    pub fn skip(&mut self, scope: Scope<'_>, step: &str, reason: impl Into<String>) {
        self.report.push(
            self.observer,
            scope,
            step,
            StepOutcome::Skipped,
            Some(reason.into()),
        );
    }

    pub fn finish(mut self) -> RunReport {
        self.report.duration_ms = self.started.elapsed().as_millis() as u64;
        self.report
    }
}

/// Value of a key the workflow cannot continue without
pub(crate) fn required<'r>(
    record: &'r DeploymentRecord,
    scope: Scope<'_>,
    key: &str,
) -> Result<&'r str> {
    record.get_str_in(scope, key).ok_or_else(|| {
        SiteError::MissingRecordField(match scope {
            Scope::Root => key.to_string(),
            Scope::Domain(d) => format!("domains.{}.{}", d, key),
        })
    })
}

/// Stamp identity fields on a fresh record, or check them on an existing one
///
/// Returns the region the deployment's buckets live in.
pub(crate) async fn init_identity<F>(
    store: &mut StatusStore,
    kind: &str,
    region: &str,
    check: impl FnOnce(&DeploymentRecord) -> Result<()>,
    fill: F,
) -> Result<String>
where
    F: FnOnce(&mut DeploymentRecord),
{
    let record = store.record();
    if let Some(recorded) = record.get_str(keys::KIND) {
        if recorded != kind {
            return Err(SiteError::InvalidConfig(format!(
                "{} holds a {} deployment, not a {} deployment",
                store.path().display(),
                recorded,
                kind
            )));
        }
        check(record)?;
        let recorded_region = required(record, Scope::Root, keys::REGION)?.to_string();
        if recorded_region != region {
            tracing::warn!(
                "Deployment lives in {}; ignoring requested region {}",
                recorded_region,
                region
            );
        }
        return Ok(recorded_region);
    }

    let kind = kind.to_string();
    let region = region.to_string();
    let created_region = region.clone();
    store
        .update(move |r| {
            r.set(keys::KIND, kind);
            r.set(keys::REGION, created_region);
            r.set(keys::CREATED_AT, now());
            fill(r);
        })
        .await?;
    tracing::info!("Started new status file {}", store.path().display());
    Ok(region)
}

/// Validate and de-duplicate a list of domain names, keeping order
pub(crate) fn unique_domains<'n>(names: impl IntoIterator<Item = &'n String>) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = crate::naming::validate_domain(name)?;
        if !out.contains(&name) {
            out.push(name);
        }
    }
    Ok(out)
}
