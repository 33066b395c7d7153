//! Static site: private bucket behind a distribution with origin access control

use super::{StepDone, StepRunner, Workflow, ZoneMap, init_identity, required, unique_domains};
use crate::action::RunReport;
use crate::error::{Result, SiteError};
use crate::naming::{self, BucketKind};
use crate::provider::SiteProvider;
use crate::resource::{
    BucketPolicy, BucketWebsite, DistributionSpec, OriginSpec, resource_tags,
};
use crate::state::{Scope, StatusStore, Step, keys, now};
use crate::verify::Expectation;

/// Parameters of `siteflow site`
#[derive(Debug, Clone)]
pub struct SiteOptions {
    pub domain: String,
    pub alternate_names: Vec<String>,
    pub region: String,
    pub ipv6: bool,
    pub verify: bool,
}

impl SiteOptions {
    pub fn new(domain: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            alternate_names: Vec::new(),
            region: region.into(),
            ipv6: true,
            verify: true,
        }
    }
}

impl<P: SiteProvider + ?Sized> Workflow<'_, P> {
    /// Provision (or resume provisioning) a static site
    pub async fn provision_site(
        &self,
        store: &mut StatusStore,
        options: &SiteOptions,
    ) -> Result<RunReport> {
        let names = unique_domains(std::iter::once(&options.domain).chain(&options.alternate_names))?;
        let domain = names[0].clone();
        let alternates = names[1..].to_vec();

        let region = init_identity(
            store,
            keys::KIND_SITE,
            &options.region,
            |record| {
                let recorded = record.get_str(keys::DOMAIN);
                if recorded.is_some_and(|d| d != domain) {
                    return Err(SiteError::InvalidConfig(format!(
                        "status file belongs to {}, not {}",
                        recorded.unwrap_or_default(),
                        domain
                    )));
                }
                if record.get_array(keys::ALTERNATE_NAMES) != alternates {
                    return Err(SiteError::InvalidConfig(format!(
                        "alternate names differ from the recorded ones ({}); tear down first or use another status file",
                        record.get_array(keys::ALTERNATE_NAMES).join(", ")
                    )));
                }
                Ok(())
            },
            |record| {
                record.set(keys::DOMAIN, domain.as_str());
                record.set_array(keys::ALTERNATE_NAMES, &alternates);
                record.set(keys::IPV6, options.ipv6);
            },
        )
        .await?;

        tracing::info!("Provisioning site {} in {}", domain, region);
        let mut runner = StepRunner::new(self.observer);
        let mut zones = ZoneMap::new();
        let mut blocked: Option<Step> = None;

        for step in Step::SITE {
            if let Some(blocker) = blocked {
                runner.skip(Scope::Root, step.as_str(), format!("waiting on {}", blocker));
                continue;
            }
            let result = match step {
                Step::HostedZone => self.site_hosted_zones(store, &names, &mut zones).await,
                Step::BucketCreate => {
                    self.ensure_bucket(
                        store,
                        Scope::Root,
                        &domain,
                        BucketKind::Site,
                        &region,
                        &BucketWebsite::site(),
                    )
                    .await
                }
                Step::CertificateIssue => self.ensure_certificate(store, &names, &zones).await,
                Step::OriginAccessControl => self.site_origin_access_control(store).await,
                Step::DistributionCreate => {
                    match self.site_distribution_spec(store, &domain, &names, &region, options.ipv6) {
                        Ok(spec) => self.ensure_distribution(store, Scope::Root, spec).await,
                        Err(e) => Err(e),
                    }
                }
                Step::BucketPolicy => self.site_bucket_policy(store).await,
                Step::DnsUpsert => {
                    self.ensure_dns(store, Scope::Root, &names, &zones, options.ipv6)
                        .await
                }
                Step::DistributionDeployed => self.ensure_deployed(store, Scope::Root).await,
            };
            if !runner.record(Scope::Root, step.as_str(), result)? {
                blocked = Some(step);
            }
        }

        if !options.verify {
            tracing::debug!("Verification disabled");
        } else if let Some(blocker) = blocked {
            runner.skip(
                Scope::Root,
                super::VERIFY_STEP,
                format!("waiting on {}", blocker),
            );
        } else {
            let checks: Vec<_> = names
                .iter()
                .map(|n| (n.clone(), Expectation::Serves))
                .collect();
            self.verify_served(&mut runner, store, &checks).await?;
        }

        Ok(runner.finish())
    }

    async fn site_hosted_zones(
        &self,
        store: &mut StatusStore,
        names: &[String],
        zones: &mut ZoneMap,
    ) -> Result<StepDone> {
        *zones = self.resolve_zones(names).await?;
        let primary = names
            .first()
            .and_then(|n| zones.get(n))
            .cloned()
            .ok_or_else(|| SiteError::InvalidConfig("no domain given".to_string()))?;

        let record = store.record();
        if record.is_step_completed(Step::HostedZone)
            && record.get_str(keys::HOSTED_ZONE_ID) == Some(primary.id.as_str())
        {
            return Ok(StepDone::cached());
        }

        store
            .update(|r| {
                r.set(keys::HOSTED_ZONE_ID, primary.id.as_str());
                r.set(keys::HOSTED_ZONE_NAME, primary.name.as_str());
                r.mark_completed_in(Scope::Root, Step::HostedZone);
            })
            .await?;
        Ok(StepDone::executed(format!("{} ({})", primary.name, primary.id)))
    }

    async fn site_origin_access_control(&self, store: &mut StatusStore) -> Result<StepDone> {
        let record = store.record();
        let bucket = required(record, Scope::Root, keys::BUCKET_NAME)?.to_string();

        if record.is_step_completed(Step::OriginAccessControl) {
            if let Some(id) = record.get_str(keys::ORIGIN_ACCESS_CONTROL_ID) {
                if self.provider.origin_access_control_exists(id).await? {
                    return Ok(StepDone::cached());
                }
                tracing::warn!(
                    "Origin access control {} no longer exists; recreating",
                    id
                );
            }
        }

        let (id, done) = match self.provider.find_origin_access_control(&bucket).await? {
            Some(id) => {
                let done = StepDone::adopted(&id);
                (id, done)
            }
            None => {
                let id = self
                    .provider
                    .create_origin_access_control(
                        &bucket,
                        &format!("siteflow origin access for {}", bucket),
                    )
                    .await?;
                let done = StepDone::executed(&id);
                (id, done)
            }
        };

        store
            .update(|r| {
                r.set(keys::ORIGIN_ACCESS_CONTROL_ID, id.as_str());
                r.mark_completed_in(Scope::Root, Step::OriginAccessControl);
            })
            .await?;
        Ok(done)
    }

    fn site_distribution_spec(
        &self,
        store: &StatusStore,
        domain: &str,
        names: &[String],
        region: &str,
        ipv6: bool,
    ) -> Result<DistributionSpec> {
        let record = store.record();
        let bucket = required(record, Scope::Root, keys::BUCKET_NAME)?;
        Ok(DistributionSpec {
            caller_reference: naming::caller_reference(domain, &now()),
            comment: format!("siteflow site {}", domain),
            aliases: names.to_vec(),
            certificate_arn: required(record, Scope::Root, keys::CERTIFICATE_ARN)?.to_string(),
            origin: OriginSpec::S3 {
                regional_domain: naming::regional_domain(bucket, region),
                origin_access_control_id: required(
                    record,
                    Scope::Root,
                    keys::ORIGIN_ACCESS_CONTROL_ID,
                )?
                .to_string(),
            },
            default_root_object: Some("index.html".to_string()),
            error_page: Some("/404.html".to_string()),
            ipv6,
            tags: resource_tags(domain),
        })
    }

    async fn site_bucket_policy(&self, store: &mut StatusStore) -> Result<StepDone> {
        let record = store.record();
        let bucket = required(record, Scope::Root, keys::BUCKET_NAME)?.to_string();
        let distribution_arn = required(record, Scope::Root, keys::DISTRIBUTION_ARN)?.to_string();
        if record.is_step_completed(Step::BucketPolicy) {
            match self.provider.get_bucket_policy(&bucket).await? {
                Some(live) if live.contains(&distribution_arn) => return Ok(StepDone::cached()),
                _ => tracing::warn!(
                    "Bucket policy on {} no longer grants {}; reapplying",
                    bucket,
                    distribution_arn
                ),
            }
        }

        let policy = BucketPolicy::cloudfront_read(&bucket, &distribution_arn);
        self.provider.put_bucket_policy(&bucket, &policy).await?;
        store.mark_completed(Step::BucketPolicy).await?;
        Ok(StepDone::executed(format!("read access for {}", distribution_arn)))
    }
}
