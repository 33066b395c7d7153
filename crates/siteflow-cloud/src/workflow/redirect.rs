//! Domain redirects: one website-redirect bucket and distribution per
//! source domain, sharing a single certificate

use super::{StepDone, StepRunner, Workflow, ZoneMap, init_identity, required, unique_domains};
use crate::action::RunReport;
use crate::error::{Result, SiteError};
use crate::naming::{self, BucketKind};
use crate::provider::SiteProvider;
use crate::resource::{
    BucketWebsite, DistributionSpec, OriginSpec, RedirectProtocol, RedirectType, resource_tags,
};
use crate::state::{Scope, StatusStore, Step, keys, now};
use crate::verify::Expectation;

/// Parameters of `siteflow redirect`
#[derive(Debug, Clone)]
pub struct RedirectOptions {
    pub sources: Vec<String>,
    pub target: String,
    pub region: String,
    pub protocol: RedirectProtocol,
    pub redirect_type: RedirectType,
    /// Fixed path every request is sent to; `None` keeps the request path
    pub path: Option<String>,
    pub ipv6: bool,
    pub verify: bool,
}

impl RedirectOptions {
    pub fn new(sources: Vec<String>, target: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            sources,
            target: target.into(),
            region: region.into(),
            protocol: RedirectProtocol::Https,
            redirect_type: RedirectType::Permanent,
            path: None,
            ipv6: true,
            verify: true,
        }
    }

    fn website(&self, target: &str) -> BucketWebsite {
        BucketWebsite::redirect(target, self.protocol, self.redirect_type, self.path.as_deref())
    }
}

impl<P: SiteProvider + ?Sized> Workflow<'_, P> {
    /// Provision (or resume provisioning) redirects from every source to the target
    pub async fn provision_redirect(
        &self,
        store: &mut StatusStore,
        options: &RedirectOptions,
    ) -> Result<RunReport> {
        let target = naming::validate_domain(&options.target)?;
        let sources = unique_domains(&options.sources)?;
        if sources.is_empty() {
            return Err(SiteError::InvalidConfig(
                "at least one source domain is required".to_string(),
            ));
        }
        if sources.contains(&target) {
            return Err(SiteError::InvalidConfig(format!(
                "{} cannot redirect to itself",
                target
            )));
        }

        let region = init_identity(
            store,
            keys::KIND_REDIRECT,
            &options.region,
            |record| {
                let recorded_target = record.get_str(keys::TARGET_DOMAIN).unwrap_or_default();
                if recorded_target != target {
                    return Err(SiteError::InvalidConfig(format!(
                        "status file redirects to {}, not {}",
                        recorded_target, target
                    )));
                }
                let recorded_sources = record.get_array(keys::SOURCE_DOMAINS);
                if recorded_sources != sources {
                    return Err(SiteError::InvalidConfig(format!(
                        "source domains differ from the recorded ones ({}); tear down first or use another status file",
                        recorded_sources.join(", ")
                    )));
                }
                Ok(())
            },
            |record| {
                record.set_array(keys::SOURCE_DOMAINS, &sources);
                record.set(keys::TARGET_DOMAIN, target.as_str());
                record.set(keys::REDIRECT_PROTOCOL, options.protocol.to_string());
                record.set(keys::REDIRECT_TYPE, options.redirect_type.to_string());
                record.set(keys::REDIRECT_PATH, options.path.clone());
                record.set(keys::IPV6, options.ipv6);
            },
        )
        .await?;
        self.reapply_changed_redirect(store, &sources, options).await?;

        tracing::info!(
            "Provisioning redirect {} -> {} in {}",
            sources.join(", "),
            target,
            region
        );
        let mut runner = StepRunner::new(self.observer);

        // The certificate covers every source plus the target, so the
        // target zone has to exist too.
        let mut cert_names = sources.clone();
        cert_names.push(target.clone());

        let zones = match self.redirect_hosted_zones(store, &sources, &target).await {
            Ok((zones, done)) => {
                runner.record(Scope::Root, Step::HostedZone.as_str(), Ok(done))?;
                zones
            }
            Err(e) => {
                runner.record(Scope::Root, Step::HostedZone.as_str(), Err(e))?;
                return Ok(runner.finish());
            }
        };

        let cert = self.ensure_certificate(store, &cert_names, &zones).await;
        let cert_ready = runner.record(Scope::Root, Step::CertificateIssue.as_str(), cert)?;

        let website = options.website(&target);
        let mut verify = Vec::new();

        for source in &sources {
            let scope = Scope::Domain(source);
            if !cert_ready {
                for step in Step::REDIRECT_DOMAIN {
                    runner.skip(scope, step.as_str(), "waiting on certificate_issue");
                }
                continue;
            }

            let mut blocked: Option<Step> = None;
            for step in Step::REDIRECT_DOMAIN {
                if let Some(blocker) = blocked {
                    runner.skip(scope, step.as_str(), format!("waiting on {}", blocker));
                    continue;
                }
                let result = match step {
                    Step::BucketCreate => {
                        self.ensure_bucket(
                            store,
                            scope,
                            source,
                            BucketKind::Redirect,
                            &region,
                            &website,
                        )
                        .await
                    }
                    Step::DistributionCreate => {
                        match redirect_distribution_spec(store, source, &target, &region, options.ipv6)
                        {
                            Ok(spec) => self.ensure_distribution(store, scope, spec).await,
                            Err(e) => Err(e),
                        }
                    }
                    Step::DnsUpsert => {
                        self.ensure_dns(
                            store,
                            scope,
                            std::slice::from_ref(source),
                            &zones,
                            options.ipv6,
                        )
                        .await
                    }
                    Step::DistributionDeployed => self.ensure_deployed(store, scope).await,
                    other => Ok(StepDone::skipped(format!(
                        "{} is not a per-domain step",
                        other
                    ))),
                };
                if !runner.record(scope, step.as_str(), result)? {
                    blocked = Some(step);
                }
            }

            if blocked.is_none() {
                verify.push((source.clone(), Expectation::RedirectsTo(target.clone())));
            }
        }

        if options.verify && !verify.is_empty() {
            self.verify_served(&mut runner, store, &verify).await?;
        }

        Ok(runner.finish())
    }

    /// Resolve the target and every source zone before anything is created
    async fn redirect_hosted_zones(
        &self,
        store: &mut StatusStore,
        sources: &[String],
        target: &str,
    ) -> Result<(ZoneMap, StepDone)> {
        let mut names = sources.to_vec();
        names.push(target.to_string());
        let zones = self.resolve_zones(&names).await?;

        let target_zone = self.zone_for(&zones, target).await?;
        let record = store.record();
        let unchanged = record.is_step_completed(Step::HostedZone)
            && record.get_str(keys::TARGET_HOSTED_ZONE_ID) == Some(target_zone.id.as_str())
            && sources.iter().all(|s| {
                record.get_str_in(Scope::Domain(s), keys::HOSTED_ZONE_ID)
                    == zones.get(s).map(|z| z.id.as_str())
            });
        if unchanged {
            return Ok((zones, StepDone::cached()));
        }

        store
            .update(|r| {
                r.set(keys::TARGET_HOSTED_ZONE_ID, target_zone.id.as_str());
                for source in sources {
                    if let Some(zone) = zones.get(source) {
                        r.set_in(Scope::Domain(source), keys::HOSTED_ZONE_ID, zone.id.as_str());
                    }
                }
                r.mark_completed_in(Scope::Root, Step::HostedZone);
            })
            .await?;

        let detail = names
            .iter()
            .filter_map(|n| zones.get(n).map(|z| format!("{} in {}", n, z.name)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok((zones, StepDone::executed(detail)))
    }

    /// Reset every source bucket when the protocol, status code or path
    /// differ from the recorded ones, so the bucket step rewrites the
    /// website configuration.
    async fn reapply_changed_redirect(
        &self,
        store: &mut StatusStore,
        sources: &[String],
        options: &RedirectOptions,
    ) -> Result<()> {
        let record = store.record();
        let protocol = options.protocol.to_string();
        let redirect_type = options.redirect_type.to_string();
        let unchanged = record.get_str(keys::REDIRECT_PROTOCOL) == Some(protocol.as_str())
            && record.get_str(keys::REDIRECT_TYPE) == Some(redirect_type.as_str())
            && record.get_str(keys::REDIRECT_PATH) == options.path.as_deref();
        if unchanged {
            return Ok(());
        }

        tracing::info!(
            "Redirect settings changed to {} {} {}; reapplying to {}",
            redirect_type,
            protocol,
            options.path.as_deref().unwrap_or("(request path)"),
            sources.join(", ")
        );
        store
            .update(|record| {
                record.set(keys::REDIRECT_PROTOCOL, protocol);
                record.set(keys::REDIRECT_TYPE, redirect_type);
                record.set(keys::REDIRECT_PATH, options.path.clone());
                for source in sources {
                    record.reset_in(Scope::Domain(source), Step::BucketCreate);
                }
            })
            .await
    }
}

fn redirect_distribution_spec(
    store: &StatusStore,
    source: &str,
    target: &str,
    region: &str,
    ipv6: bool,
) -> Result<DistributionSpec> {
    let record = store.record();
    let bucket = required(record, Scope::Domain(source), keys::BUCKET_NAME)?;
    Ok(DistributionSpec {
        caller_reference: naming::caller_reference(source, &now()),
        comment: format!("siteflow redirect {} -> {}", source, target),
        aliases: vec![source.to_string()],
        certificate_arn: required(record, Scope::Root, keys::CERTIFICATE_ARN)?.to_string(),
        origin: OriginSpec::Website {
            endpoint: naming::website_endpoint(bucket, region),
        },
        default_root_object: None,
        error_page: None,
        ipv6,
        tags: resource_tags(source),
    })
}
