//! Provisioning steps shared by the site and redirect workflows

use super::{StepDone, Workflow, ZoneMap, required};
use crate::error::{Result, SiteError};
use crate::naming::{self, BucketKind, CLOUDFRONT_HOSTED_ZONE_ID};
use crate::poll::{PollOutcome, poll_until};
use crate::provider::{CertificateStatus, SiteProvider, ValidationRecord};
use crate::resource::{
    BucketWebsite, CertificateRequest, DistributionSpec, DnsRecord, RecordType, ValidationCname,
    resource_tags,
};
use crate::state::{Scope, StatusStore, Step, keys, now};
use std::collections::BTreeMap;

/// TTL for ACM validation CNAMEs
const VALIDATION_TTL: i64 = 300;

impl<P: SiteProvider + ?Sized> Workflow<'_, P> {
    /// Create (or adopt) the bucket for `domain` and apply its website configuration
    pub(crate) async fn ensure_bucket(
        &self,
        store: &mut StatusStore,
        scope: Scope<'_>,
        domain: &str,
        kind: BucketKind,
        region: &str,
        website: &BucketWebsite,
    ) -> Result<StepDone> {
        let record = store.record();
        let bucket = match record.get_str_in(scope, keys::BUCKET_NAME) {
            Some(name) => name.to_string(),
            None => {
                let created_at = required(record, Scope::Root, keys::CREATED_AT)?;
                naming::bucket_name(domain, kind, created_at)
            }
        };
        let completed = record.is_step_completed_in(scope, Step::BucketCreate);

        let exists = self.provider.bucket_exists(&bucket).await?;
        if completed {
            if exists {
                return Ok(StepDone::cached());
            }
            tracing::warn!(
                "Bucket {} is recorded as created but no longer exists; recreating",
                bucket
            );
        }

        let done = if exists {
            StepDone::adopted(&bucket)
        } else {
            self.provider
                .create_bucket(&bucket, region, &resource_tags(domain))
                .await?;
            StepDone::executed(&bucket)
        };

        // Record the name before configuring so teardown can find a half-configured bucket
        if store.record().get_str_in(scope, keys::BUCKET_NAME) != Some(bucket.as_str()) {
            store.set_in(scope, keys::BUCKET_NAME, bucket.as_str()).await?;
        }

        self.provider.configure_website(&bucket, website).await?;
        if kind == BucketKind::Site {
            self.provider.block_public_access(&bucket).await?;
        }

        store
            .update(|r| {
                r.set_in(scope, keys::BUCKET_NAME, bucket.as_str());
                r.mark_completed_in(scope, Step::BucketCreate);
                r.reset_in(scope, Step::BucketPolicy);
            })
            .await?;
        Ok(done)
    }

    /// Request, validate and wait for the deployment's certificate
    ///
    /// The certificate always lives at the record root. A wait that runs
    /// out leaves the step pending with the ARN saved, so the next run
    /// resumes the wait instead of requesting another certificate. A
    /// recorded certificate that expired, was revoked or timed out is
    /// replaced by a fresh request.
    pub(crate) async fn ensure_certificate(
        &self,
        store: &mut StatusStore,
        names: &[String],
        zones: &ZoneMap,
    ) -> Result<StepDone> {
        let record = store.record();
        let completed = record.is_step_completed(Step::CertificateIssue);
        let recorded_arn = record.get_str(keys::CERTIFICATE_ARN).map(str::to_string);

        let existing = match &recorded_arn {
            Some(arn) => match self.provider.describe_certificate(arn).await? {
                Some(details) if details.status.is_unusable() => {
                    tracing::warn!(
                        "Certificate {} is {}; requesting a new one",
                        arn,
                        details.status
                    );
                    None
                }
                Some(details) => Some(details),
                None => {
                    tracing::warn!(
                        "Certificate {} is recorded but no longer exists; requesting a new one",
                        arn
                    );
                    None
                }
            },
            None => None,
        };

        let arn = match existing {
            Some(details) if details.status == CertificateStatus::Failed => {
                return Err(SiteError::CertificateFailed {
                    arn: details.arn,
                    reason: details
                        .failure_reason
                        .unwrap_or_else(|| "no reason given".to_string()),
                });
            }
            Some(details) if completed && details.status == CertificateStatus::Issued => {
                return Ok(StepDone::cached());
            }
            Some(details) => {
                tracing::info!("Resuming certificate {}", details.arn);
                details.arn
            }
            None => {
                // A replacement needs a token the stale request never used
                let token_seed = match &recorded_arn {
                    Some(_) => now(),
                    None => required(store.record(), Scope::Root, keys::CREATED_AT)?.to_string(),
                };
                let (domain, alternates) = match names.split_first() {
                    Some((first, rest)) => (first.clone(), rest.to_vec()),
                    None => {
                        return Err(SiteError::InvalidConfig(
                            "a certificate needs at least one name".to_string(),
                        ));
                    }
                };
                let request = CertificateRequest {
                    idempotency_token: naming::idempotency_token(names, &token_seed),
                    tags: resource_tags(&domain),
                    domain,
                    alternate_names: alternates,
                };
                let arn = self.provider.request_certificate(&request).await?;
                store.set(keys::CERTIFICATE_ARN, arn.as_str()).await?;
                self.observer
                    .on_message(&format!("Requested certificate for {}", names.join(", ")));
                arn
            }
        };

        let validation = match self.wait_validation_records(&arn, names.len()).await? {
            PollOutcome::Ready(records) => records,
            PollOutcome::TimedOut => {
                store.mark_pending(Step::CertificateIssue).await?;
                return Ok(StepDone::pending(
                    "validation records not published yet; re-run to resume",
                ));
            }
        };

        let mut cnames = recorded_validation_cnames(store);
        let mut by_zone: BTreeMap<String, Vec<DnsRecord>> = BTreeMap::new();
        for v in &validation {
            let zone = self.zone_for(zones, &v.domain).await?;
            let cname = ValidationCname {
                zone_id: zone.id,
                name: v.name.clone(),
                value: v.value.clone(),
            };
            let record = cname.record(VALIDATION_TTL);
            let batch = by_zone.entry(cname.zone_id.clone()).or_default();
            if !batch.contains(&record) {
                batch.push(record);
            }
            if !cnames.contains(&cname) {
                cnames.push(cname);
            }
        }
        for (zone_id, records) in &by_zone {
            self.provider.upsert_records(zone_id, records).await?;
        }
        store
            .set(keys::VALIDATION_RECORDS, serde_json::to_value(&cnames)?)
            .await?;

        match self.wait_issued(&arn).await? {
            PollOutcome::Ready(()) => {
                store.mark_completed(Step::CertificateIssue).await?;
                Ok(StepDone::executed(arn))
            }
            PollOutcome::TimedOut => {
                store.mark_pending(Step::CertificateIssue).await?;
                Ok(StepDone::pending(format!(
                    "{} still pending validation; re-run to resume",
                    arn
                )))
            }
        }
    }

    async fn wait_validation_records(
        &self,
        arn: &str,
        expected: usize,
    ) -> Result<PollOutcome<Vec<ValidationRecord>>> {
        let policy = self.policies.validation_records;
        let provider = self.provider;
        let observer = self.observer;
        poll_until(
            &policy,
            |attempt| observer.on_wait("certificate validation records", attempt, policy.max_attempts),
            move || async move {
                let details = provider.describe_certificate(arn).await?;
                Ok(details
                    .map(|d| d.validation_records)
                    .filter(|records| !records.is_empty() && records.len() >= expected))
            },
        )
        .await
    }

    async fn wait_issued(&self, arn: &str) -> Result<PollOutcome<()>> {
        let policy = self.policies.certificate;
        let provider = self.provider;
        let observer = self.observer;
        poll_until(
            &policy,
            |attempt| observer.on_wait("certificate issuance", attempt, policy.max_attempts),
            move || async move {
                match provider.describe_certificate(arn).await? {
                    Some(details) => match details.status {
                        CertificateStatus::Issued => Ok(Some(())),
                        CertificateStatus::Failed => Err(SiteError::CertificateFailed {
                            arn: details.arn,
                            reason: details
                                .failure_reason
                                .unwrap_or_else(|| "no reason given".to_string()),
                        }),
                        status if status.is_unusable() => Err(SiteError::CertificateFailed {
                            arn: details.arn,
                            reason: format!("certificate became {}", status),
                        }),
                        _ => Ok(None),
                    },
                    None => Err(SiteError::ApiError(format!(
                        "certificate {} disappeared while waiting for validation",
                        arn
                    ))),
                }
            },
        )
        .await
    }

    /// Create (or adopt) the distribution serving `spec.aliases`
    ///
    /// A new distribution invalidates the steps that depend on its
    /// identifiers, so they are cleared here and redone by this run.
    pub(crate) async fn ensure_distribution(
        &self,
        store: &mut StatusStore,
        scope: Scope<'_>,
        spec: DistributionSpec,
    ) -> Result<StepDone> {
        let record = store.record();
        if record.is_step_completed_in(scope, Step::DistributionCreate) {
            let id = required(record, scope, keys::DISTRIBUTION_ID)?;
            if self.provider.get_distribution(id).await?.is_some() {
                return Ok(StepDone::cached());
            }
            tracing::warn!(
                "Distribution {} is recorded as created but no longer exists; recreating",
                id
            );
        }

        let primary = spec.aliases.first().cloned().unwrap_or_default();
        let (info, done) = match self.provider.find_distribution_by_alias(&primary).await? {
            Some(info) => {
                let done = StepDone::adopted(&info.id);
                (info, done)
            }
            None => {
                let info = self.provider.create_distribution(&spec).await?;
                let done = StepDone::executed(format!("{} ({})", info.id, info.domain_name));
                (info, done)
            }
        };

        store
            .update(|r| {
                r.set_in(scope, keys::DISTRIBUTION_ID, info.id.as_str());
                r.set_in(scope, keys::DISTRIBUTION_ARN, info.arn.as_str());
                r.set_in(scope, keys::DISTRIBUTION_DOMAIN, info.domain_name.as_str());
                r.mark_completed_in(scope, Step::DistributionCreate);
                for dependent in [Step::BucketPolicy, Step::DnsUpsert, Step::DistributionDeployed] {
                    r.reset_in(scope, dependent);
                }
            })
            .await?;
        Ok(done)
    }

    /// Point A (and AAAA) alias records for `names` at the distribution
    pub(crate) async fn ensure_dns(
        &self,
        store: &mut StatusStore,
        scope: Scope<'_>,
        names: &[String],
        zones: &ZoneMap,
        ipv6: bool,
    ) -> Result<StepDone> {
        let record = store.record();
        let target = required(record, scope, keys::DISTRIBUTION_DOMAIN)?.to_string();
        let completed = record.is_step_completed_in(scope, Step::DnsUpsert);

        let mut by_zone: BTreeMap<String, Vec<DnsRecord>> = BTreeMap::new();
        for name in names {
            let zone = self.zone_for(zones, name).await?;
            let batch = by_zone.entry(zone.id).or_default();
            batch.push(DnsRecord::alias(
                name,
                RecordType::A,
                &target,
                CLOUDFRONT_HOSTED_ZONE_ID,
            ));
            if ipv6 {
                batch.push(DnsRecord::alias(
                    name,
                    RecordType::Aaaa,
                    &target,
                    CLOUDFRONT_HOSTED_ZONE_ID,
                ));
            }
        }

        if completed && self.records_in_place(&by_zone, &target).await? {
            return Ok(StepDone::cached());
        }
        if completed {
            tracing::warn!("DNS records for {} drifted; upserting again", names.join(", "));
        }

        for (zone_id, records) in &by_zone {
            self.provider.upsert_records(zone_id, records).await?;
        }

        store
            .update(|r| {
                r.set_in(scope, keys::DNS_RECORDS, names.to_vec());
                r.mark_completed_in(scope, Step::DnsUpsert);
            })
            .await?;
        Ok(StepDone::executed(format!("{} -> {}", names.join(", "), target)))
    }

    async fn records_in_place(
        &self,
        by_zone: &BTreeMap<String, Vec<DnsRecord>>,
        target: &str,
    ) -> Result<bool> {
        for (zone_id, records) in by_zone {
            for wanted in records {
                let live = self
                    .provider
                    .get_record(zone_id, &wanted.name, wanted.record_type)
                    .await?;
                if !live.is_some_and(|r| r.targets(target)) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Wait for the distribution to reach `Deployed`
    pub(crate) async fn ensure_deployed(
        &self,
        store: &mut StatusStore,
        scope: Scope<'_>,
    ) -> Result<StepDone> {
        let record = store.record();
        let id = required(record, scope, keys::DISTRIBUTION_ID)?.to_string();
        if record.is_step_completed_in(scope, Step::DistributionDeployed) {
            match self.provider.get_distribution(&id).await? {
                Some(info) if info.is_deployed() => return Ok(StepDone::cached()),
                Some(info) => tracing::warn!(
                    "Distribution {} is {} again; waiting for it to deploy",
                    id,
                    info.status
                ),
                None => tracing::warn!("Distribution {} no longer exists", id),
            }
            store
                .mark_pending_in(scope, Step::DistributionDeployed)
                .await?;
        }

        let policy = self.policies.deployment;
        let provider = self.provider;
        let observer = self.observer;
        let id_ref = id.as_str();
        let label = format!("distribution {} deployment", id);
        let outcome = poll_until(
            &policy,
            |attempt| observer.on_wait(&label, attempt, policy.max_attempts),
            move || async move {
                match provider.get_distribution(id_ref).await? {
                    Some(info) => Ok(info.is_deployed().then_some(())),
                    None => Err(SiteError::ApiError(format!(
                        "distribution {} disappeared while deploying",
                        id_ref
                    ))),
                }
            },
        )
        .await?;

        match outcome {
            PollOutcome::Ready(()) => {
                store.mark_completed_in(scope, Step::DistributionDeployed).await?;
                Ok(StepDone::executed(id))
            }
            PollOutcome::TimedOut => Err(SiteError::TimedOut(format!(
                "distribution {} still deploying after {}s; re-run to keep waiting",
                id,
                policy.budget().as_secs()
            ))),
        }
    }
}

/// Validation CNAMEs earlier runs wrote for this deployment
pub(crate) fn recorded_validation_cnames(store: &StatusStore) -> Vec<ValidationCname> {
    store
        .record()
        .get(keys::VALIDATION_RECORDS)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}
