//! Remove everything a status file says was provisioned, newest first
//!
//! Resources that are already gone count as removed. DNS records are only
//! deleted while they still alias the recorded distribution; a record that
//! was repointed elsewhere is reported and left alone.

use super::steps::recorded_validation_cnames;
use super::{StepDone, StepRunner, Workflow};
use crate::action::RunReport;
use crate::error::{Result, SiteError};
use crate::poll::{PollOutcome, poll_until};
use crate::provider::SiteProvider;
use crate::resource::RecordType;
use crate::state::{Scope, StatusStore, StepStatus, Step, keys, now};

/// Removal order for a static site
const SITE_ORDER: [Step; 5] = [
    Step::DnsUpsert,
    Step::DistributionCreate,
    Step::OriginAccessControl,
    Step::CertificateIssue,
    Step::BucketCreate,
];

/// Removal order inside one redirect source domain
const REDIRECT_DOMAIN_ORDER: [Step; 3] = [
    Step::DnsUpsert,
    Step::DistributionCreate,
    Step::BucketCreate,
];

impl<P: SiteProvider + ?Sized> Workflow<'_, P> {
    /// Tear down the deployment recorded in `store`
    pub async fn teardown(&self, store: &mut StatusStore) -> Result<RunReport> {
        let kind = store
            .record()
            .get_str(keys::KIND)
            .map(str::to_string)
            .ok_or_else(|| SiteError::MissingRecordField(keys::KIND.to_string()))?;

        let mut runner = StepRunner::new(self.observer);
        match kind.as_str() {
            keys::KIND_SITE => self.teardown_site(store, &mut runner).await?,
            keys::KIND_REDIRECT => self.teardown_redirect(store, &mut runner).await?,
            other => {
                return Err(SiteError::StateError(format!(
                    "unknown deployment kind '{}'",
                    other
                )));
            }
        }

        let report = runner.finish();
        let complete = report.is_success()
            && !report
                .steps
                .iter()
                .any(|s| s.outcome == crate::action::StepOutcome::Pending);
        if complete {
            store.set(keys::TEARDOWN_COMPLETED_AT, now()).await?;
        }
        Ok(report)
    }

    async fn teardown_site(&self, store: &mut StatusStore, runner: &mut StepRunner<'_>) -> Result<()> {
        let mut blocked: Option<Step> = None;
        for step in SITE_ORDER {
            if let Some(blocker) = blocked {
                runner.skip(Scope::Root, step.as_str(), format!("{} was not removed", blocker));
                continue;
            }
            let result = self.remove_step(store, Scope::Root, step).await;
            if !runner.record(Scope::Root, step.as_str(), result)? {
                blocked = Some(step);
            }
        }
        Ok(())
    }

    async fn teardown_redirect(
        &self,
        store: &mut StatusStore,
        runner: &mut StepRunner<'_>,
    ) -> Result<()> {
        let mut domains_clear = true;
        let domains = store.record().domain_names();
        for domain in domains {
            let scope = Scope::Domain(&domain);
            let mut blocked: Option<Step> = None;
            for step in REDIRECT_DOMAIN_ORDER {
                if let Some(blocker) = blocked {
                    runner.skip(scope, step.as_str(), format!("{} was not removed", blocker));
                    continue;
                }
                let result = self.remove_step(store, scope, step).await;
                if !runner.record(scope, step.as_str(), result)? {
                    blocked = Some(step);
                }
            }
            domains_clear &= blocked.is_none();
        }

        // The shared certificate stays attached until every distribution is gone.
        let step = Step::CertificateIssue;
        if domains_clear {
            let result = self.remove_step(store, Scope::Root, step).await;
            runner.record(Scope::Root, step.as_str(), result)?;
        } else {
            runner.skip(Scope::Root, step.as_str(), "distributions still exist");
        }
        Ok(())
    }

    async fn remove_step(
        &self,
        store: &mut StatusStore,
        scope: Scope<'_>,
        step: Step,
    ) -> Result<StepDone> {
        match store.record().step_status(scope, step) {
            StepStatus::Removed => return Ok(StepDone::already_gone()),
            StepStatus::NotStarted if !has_output(store, scope, step) => {
                return Ok(StepDone::skipped("nothing recorded"));
            }
            _ => {}
        }

        let done = match step {
            Step::DnsUpsert => self.remove_dns(store, scope).await?,
            Step::DistributionCreate => self.remove_distribution(store, scope).await?,
            Step::OriginAccessControl => self.remove_origin_access_control(store).await?,
            Step::CertificateIssue => self.remove_certificate(store).await?,
            Step::BucketCreate => self.remove_bucket(store, scope).await?,
            other => return Ok(StepDone::skipped(format!("{} has nothing to remove", other))),
        };

        store
            .update(|r| {
                r.mark_removed_in(scope, step);
                for companion in companions(step) {
                    r.mark_removed_in(scope, *companion);
                }
            })
            .await?;
        Ok(done)
    }

    async fn remove_dns(&self, store: &StatusStore, scope: Scope<'_>) -> Result<StepDone> {
        let record = store.record();
        let mut names = record.get_array_in(scope, keys::DNS_RECORDS);
        if names.is_empty() {
            names = match scope {
                Scope::Root => record.get_str(keys::DOMAIN).map(str::to_string).into_iter().collect(),
                Scope::Domain(d) => vec![d.to_string()],
            };
        }
        let Some(target) = record.get_str_in(scope, keys::DISTRIBUTION_DOMAIN) else {
            return Ok(StepDone::skipped("no distribution recorded; records were never ours"));
        };

        let mut deleted = Vec::new();
        let mut repointed = Vec::new();
        for name in &names {
            let zone = match self.resolve_zone(name).await {
                Ok(zone) => zone,
                Err(SiteError::HostedZoneNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            for record_type in [RecordType::A, RecordType::Aaaa] {
                let Some(live) = self.provider.get_record(&zone.id, name, record_type).await? else {
                    continue;
                };
                if live.targets(target) {
                    self.provider.delete_record(&zone.id, &live).await?;
                    deleted.push(format!("{} {}", record_type, name));
                } else {
                    tracing::warn!(
                        "{} {} no longer points at {}; leaving it in place",
                        record_type,
                        name,
                        target
                    );
                    repointed.push(format!("{} {}", record_type, name));
                }
            }
        }

        Ok(if !repointed.is_empty() {
            StepDone::skipped(format!(
                "repointed elsewhere, left in place: {}",
                repointed.join(", ")
            ))
        } else if deleted.is_empty() {
            StepDone::already_gone()
        } else {
            StepDone::removed(deleted.join(", "))
        })
    }

    async fn remove_distribution(&self, store: &StatusStore, scope: Scope<'_>) -> Result<StepDone> {
        let Some(id) = store.record().get_str_in(scope, keys::DISTRIBUTION_ID) else {
            return Ok(StepDone::skipped("no distribution recorded"));
        };
        let Some(info) = self.provider.get_distribution(id).await? else {
            return Ok(StepDone::already_gone());
        };

        if info.enabled {
            self.provider.disable_distribution(id).await?;
            self.observer.on_message(&format!("Disabled distribution {}", id));
        }

        let policy = self.policies.teardown;
        let provider = self.provider;
        let observer = self.observer;
        let label = format!("distribution {} to finish disabling", id);
        let outcome = poll_until(
            &policy,
            |attempt| observer.on_wait(&label, attempt, policy.max_attempts),
            move || async move {
                Ok(match provider.get_distribution(id).await? {
                    None => Some(false),
                    Some(info) if info.is_deployed() && !info.enabled => Some(true),
                    Some(_) => None,
                })
            },
        )
        .await?;

        match outcome {
            PollOutcome::Ready(false) => Ok(StepDone::already_gone()),
            PollOutcome::Ready(true) => {
                if self.provider.delete_distribution(id).await? {
                    Ok(StepDone::removed(id))
                } else {
                    Ok(StepDone::already_gone())
                }
            }
            PollOutcome::TimedOut => Err(SiteError::TimedOut(format!(
                "distribution {} still disabling after {}s; re-run teardown to finish",
                id,
                policy.budget().as_secs()
            ))),
        }
    }

    async fn remove_origin_access_control(&self, store: &StatusStore) -> Result<StepDone> {
        let Some(id) = store.record().get_str(keys::ORIGIN_ACCESS_CONTROL_ID) else {
            return Ok(StepDone::skipped("no origin access control recorded"));
        };
        Ok(if self.provider.delete_origin_access_control(id).await? {
            StepDone::removed(id)
        } else {
            StepDone::already_gone()
        })
    }

    /// Delete the certificate once no distribution uses it, then the
    /// validation CNAMEs written for it
    async fn remove_certificate(&self, store: &StatusStore) -> Result<StepDone> {
        let Some(arn) = store.record().get_str(keys::CERTIFICATE_ARN) else {
            return Ok(StepDone::skipped("no certificate recorded"));
        };
        let deleted = match self.provider.describe_certificate(arn).await? {
            Some(details) if !details.in_use_by.is_empty() => {
                return Err(SiteError::ResourceInUse(format!(
                    "certificate {} is still used by {}",
                    arn,
                    details.in_use_by.join(", ")
                )));
            }
            Some(_) => self.provider.delete_certificate(arn).await?,
            None => false,
        };
        let cnames = self.remove_validation_records(store).await?;

        Ok(match (deleted, cnames) {
            (false, 0) => StepDone::already_gone(),
            (true, 0) => StepDone::removed(arn),
            (true, n) => StepDone::removed(format!("{} and {} validation record(s)", arn, n)),
            (false, n) => StepDone::removed(format!("{} validation record(s)", n)),
        })
    }

    /// Returns how many records were deleted. A CNAME whose value changed
    /// since it was written is left alone.
    async fn remove_validation_records(&self, store: &StatusStore) -> Result<usize> {
        let mut deleted = 0;
        for cname in recorded_validation_cnames(store) {
            let Some(live) = self
                .provider
                .get_record(&cname.zone_id, &cname.name, RecordType::Cname)
                .await?
            else {
                continue;
            };
            if cname.matches(&live) {
                self.provider.delete_record(&cname.zone_id, &live).await?;
                deleted += 1;
            } else {
                tracing::warn!(
                    "Validation record {} no longer points at {}; leaving it in place",
                    cname.name,
                    cname.value
                );
            }
        }
        Ok(deleted)
    }

    async fn remove_bucket(&self, store: &StatusStore, scope: Scope<'_>) -> Result<StepDone> {
        let Some(bucket) = store.record().get_str_in(scope, keys::BUCKET_NAME) else {
            return Ok(StepDone::skipped("no bucket recorded"));
        };
        if !self.provider.bucket_exists(bucket).await? {
            return Ok(StepDone::already_gone());
        }

        let objects: Vec<String> = self
            .provider
            .list_objects(bucket)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();
        for batch in objects.chunks(1000) {
            self.provider.delete_objects(bucket, batch).await?;
        }
        if !objects.is_empty() {
            self.observer
                .on_message(&format!("Emptied {} ({} objects)", bucket, objects.len()));
        }

        Ok(if self.provider.delete_bucket(bucket).await? {
            StepDone::removed(bucket)
        } else {
            StepDone::already_gone()
        })
    }
}

/// Steps whose resources disappear together with `step`'s
fn companions(step: Step) -> &'static [Step] {
    match step {
        Step::DistributionCreate => &[Step::DistributionDeployed],
        Step::BucketCreate => &[Step::BucketPolicy],
        _ => &[],
    }
}

/// Whether a step left an identifier behind even though it never completed
fn has_output(store: &StatusStore, scope: Scope<'_>, step: Step) -> bool {
    let key = match step {
        Step::DnsUpsert => keys::DNS_RECORDS,
        Step::DistributionCreate => keys::DISTRIBUTION_ID,
        Step::OriginAccessControl => keys::ORIGIN_ACCESS_CONTROL_ID,
        Step::CertificateIssue => keys::CERTIFICATE_ARN,
        Step::BucketCreate => keys::BUCKET_NAME,
        _ => return false,
    };
    store.record().get_in(scope, key).is_some()
}
