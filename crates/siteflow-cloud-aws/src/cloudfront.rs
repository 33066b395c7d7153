//! CloudFront distributions, origin access controls and invalidations

use crate::error::{AwsError, Result, build_error, gone_is_false};
use aws_sdk_cloudfront::Client;
use aws_sdk_cloudfront::types::{
    Aliases, AllowedMethods, CachedMethods, CustomErrorResponse, CustomErrorResponses,
    CustomOriginConfig, DefaultCacheBehavior, Distribution, DistributionConfig,
    DistributionConfigWithTags, HttpVersion, InvalidationBatch, Method, MinimumProtocolVersion,
    OriginAccessControlConfig, OriginAccessControlOriginTypes, OriginAccessControlSigningBehaviors,
    OriginAccessControlSigningProtocols, OriginProtocolPolicy, Origins, Paths, PriceClass,
    S3OriginConfig, SslSupportMethod, Tags, ViewerCertificate, ViewerProtocolPolicy,
};
use siteflow_cloud::{DistributionInfo, DistributionSpec, OriginSpec};

pub use siteflow_cloud::naming::CACHING_OPTIMIZED_POLICY_ID;

const ORIGIN_ID: &str = "siteflow-origin";

/// CloudFront client wrapper
pub struct CloudFrontCdn {
    client: Client,
}

impl CloudFrontCdn {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    // ========== Origin access control ==========

    pub async fn find_origin_access_control(&self, name: &str) -> Result<Option<String>> {
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .client
                .list_origin_access_controls()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| AwsError::from_sdk("ListOriginAccessControls", e))?;
            let Some(list) = output.origin_access_control_list() else {
                return Ok(None);
            };
            if let Some(found) = list.items().iter().find(|oac| oac.name() == name) {
                return Ok(Some(found.id().to_string()));
            }
            match (list.is_truncated(), list.next_marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => return Ok(None),
            }
        }
    }

    pub async fn origin_access_control_exists(&self, id: &str) -> Result<bool> {
        Ok(self.origin_access_control_etag(id).await?.is_some())
    }

    async fn origin_access_control_etag(&self, id: &str) -> Result<Option<String>> {
        match self.client.get_origin_access_control().id(id).send().await {
            Ok(output) => Ok(Some(output.e_tag().unwrap_or_default().to_string())),
            Err(e) => {
                let err = AwsError::from_sdk("GetOriginAccessControl", e);
                if err.is_not_found() { Ok(None) } else { Err(err) }
            }
        }
    }

    pub async fn create_origin_access_control(
        &self,
        name: &str,
        description: &str,
    ) -> Result<String> {
        let config = OriginAccessControlConfig::builder()
            .name(name)
            .description(description)
            .signing_protocol(OriginAccessControlSigningProtocols::from("sigv4"))
            .signing_behavior(OriginAccessControlSigningBehaviors::from("always"))
            .origin_access_control_origin_type(OriginAccessControlOriginTypes::from("s3"))
            .build()
            .map_err(build_error)?;
        let output = self
            .client
            .create_origin_access_control()
            .origin_access_control_config(config)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("CreateOriginAccessControl", e))?;
        let id = output
            .origin_access_control()
            .map(|oac| oac.id().to_string())
            .ok_or(AwsError::MissingField {
                operation: "CreateOriginAccessControl",
                field: "origin_access_control",
            })?;
        tracing::info!("Created origin access control {} ({})", name, id);
        Ok(id)
    }

    pub async fn delete_origin_access_control(&self, id: &str) -> Result<bool> {
        let Some(etag) = self.origin_access_control_etag(id).await? else {
            return Ok(false);
        };
        let result = self
            .client
            .delete_origin_access_control()
            .id(id)
            .if_match(etag)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| AwsError::from_sdk("DeleteOriginAccessControl", e));
        gone_is_false(result)
    }

    // ========== Distributions ==========

    pub async fn find_by_alias(&self, alias: &str) -> Result<Option<DistributionInfo>> {
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .client
                .list_distributions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| AwsError::from_sdk("ListDistributions", e))?;
            let Some(list) = output.distribution_list() else {
                return Ok(None);
            };
            let found = list.items().iter().find(|d| {
                d.aliases()
                    .map(|a| a.items().iter().any(|i| i.eq_ignore_ascii_case(alias)))
                    .unwrap_or(false)
            });
            if let Some(summary) = found {
                return Ok(Some(DistributionInfo {
                    id: summary.id().to_string(),
                    arn: summary.arn().to_string(),
                    domain_name: summary.domain_name().to_string(),
                    status: summary.status().to_string(),
                    enabled: summary.enabled(),
                    aliases: summary
                        .aliases()
                        .map(|a| a.items().to_vec())
                        .unwrap_or_default(),
                }));
            }
            match (list.is_truncated(), list.next_marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => return Ok(None),
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<DistributionInfo>> {
        Ok(self.get_with_etag(id).await?.map(|(info, _)| info))
    }

    async fn get_with_etag(&self, id: &str) -> Result<Option<(DistributionInfo, String)>> {
        let output = match self.client.get_distribution().id(id).send().await {
            Ok(output) => output,
            Err(e) => {
                let err = AwsError::from_sdk("GetDistribution", e);
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };
        let etag = output.e_tag().unwrap_or_default().to_string();
        Ok(output.distribution().map(|d| (info(d), etag)))
    }

    pub async fn create(&self, spec: &DistributionSpec) -> Result<DistributionInfo> {
        let tags = spec
            .tags
            .iter()
            .map(|t| {
                aws_sdk_cloudfront::types::Tag::builder()
                    .key(&t.key)
                    .value(&t.value)
                    .build()
                    .map_err(build_error)
            })
            .collect::<Result<Vec<_>>>()?;
        let with_tags = DistributionConfigWithTags::builder()
            .distribution_config(distribution_config(spec)?)
            .tags(Tags::builder().set_items(Some(tags)).build())
            .build();

        let output = self
            .client
            .create_distribution_with_tags()
            .distribution_config_with_tags(with_tags)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("CreateDistributionWithTags", e))?;
        let distribution = output.distribution().ok_or(AwsError::MissingField {
            operation: "CreateDistributionWithTags",
            field: "distribution",
        })?;
        tracing::info!(
            "Created distribution {} for {}",
            distribution.id(),
            spec.aliases.join(", ")
        );
        Ok(info(distribution))
    }

    pub async fn disable(&self, id: &str) -> Result<()> {
        let output = self
            .client
            .get_distribution_config()
            .id(id)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("GetDistributionConfig", e))?;
        let mut config = output
            .distribution_config()
            .cloned()
            .ok_or(AwsError::MissingField {
                operation: "GetDistributionConfig",
                field: "distribution_config",
            })?;
        if !config.enabled() {
            return Ok(());
        }
        config.enabled = false;

        self.client
            .update_distribution()
            .id(id)
            .if_match(output.e_tag().unwrap_or_default())
            .distribution_config(config)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("UpdateDistribution", e))?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let Some((_, etag)) = self.get_with_etag(id).await? else {
            return Ok(false);
        };
        let result = self
            .client
            .delete_distribution()
            .id(id)
            .if_match(etag)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| AwsError::from_sdk("DeleteDistribution", e));
        gone_is_false(result)
    }

    pub async fn invalidate(&self, distribution_id: &str, paths: &[String]) -> Result<String> {
        let batch = InvalidationBatch::builder()
            .paths(
                Paths::builder()
                    .quantity(paths.len() as i32)
                    .set_items(Some(paths.to_vec()))
                    .build()
                    .map_err(build_error)?,
            )
            .caller_reference(format!(
                "siteflow-{}",
                chrono::Utc::now().timestamp_millis()
            ))
            .build()
            .map_err(build_error)?;
        let output = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("CreateInvalidation", e))?;
        output
            .invalidation()
            .map(|i| i.id().to_string())
            .ok_or(AwsError::MissingField {
                operation: "CreateInvalidation",
                field: "invalidation",
            })
    }
}

fn info(distribution: &Distribution) -> DistributionInfo {
    let config = distribution.distribution_config();
    DistributionInfo {
        id: distribution.id().to_string(),
        arn: distribution.arn().to_string(),
        domain_name: distribution.domain_name().to_string(),
        status: distribution.status().to_string(),
        enabled: config.map(|c| c.enabled()).unwrap_or(false),
        aliases: config
            .and_then(|c| c.aliases())
            .map(|a| a.items().to_vec())
            .unwrap_or_default(),
    }
}

fn distribution_config(spec: &DistributionSpec) -> Result<DistributionConfig> {
    let origin = match &spec.origin {
        OriginSpec::S3 {
            regional_domain,
            origin_access_control_id,
        } => aws_sdk_cloudfront::types::Origin::builder()
            .id(ORIGIN_ID)
            .domain_name(regional_domain)
            .origin_access_control_id(origin_access_control_id)
            // Empty identity: access goes through the origin access control
            .s3_origin_config(
                S3OriginConfig::builder()
                    .origin_access_identity("")
                    .build(),
            ),
        OriginSpec::Website { endpoint } => aws_sdk_cloudfront::types::Origin::builder()
            .id(ORIGIN_ID)
            .domain_name(endpoint)
            .custom_origin_config(
                CustomOriginConfig::builder()
                    .http_port(80)
                    .https_port(443)
                    .origin_protocol_policy(OriginProtocolPolicy::from("http-only"))
                    .build()
                    .map_err(build_error)?,
            ),
    }
    .build()
    .map_err(build_error)?;

    let get_head = || vec![Method::from("GET"), Method::from("HEAD")];
    let cache_behavior = DefaultCacheBehavior::builder()
        .target_origin_id(ORIGIN_ID)
        .viewer_protocol_policy(ViewerProtocolPolicy::from("redirect-to-https"))
        .cache_policy_id(CACHING_OPTIMIZED_POLICY_ID)
        .compress(true)
        .allowed_methods(
            AllowedMethods::builder()
                .quantity(2)
                .set_items(Some(get_head()))
                .cached_methods(
                    CachedMethods::builder()
                        .quantity(2)
                        .set_items(Some(get_head()))
                        .build()
                        .map_err(build_error)?,
                )
                .build()
                .map_err(build_error)?,
        )
        .build()
        .map_err(build_error)?;

    let mut builder = DistributionConfig::builder()
        .caller_reference(&spec.caller_reference)
        .comment(&spec.comment)
        .enabled(true)
        .aliases(
            Aliases::builder()
                .quantity(spec.aliases.len() as i32)
                .set_items(Some(spec.aliases.clone()))
                .build()
                .map_err(build_error)?,
        )
        .origins(
            Origins::builder()
                .quantity(1)
                .items(origin)
                .build()
                .map_err(build_error)?,
        )
        .default_cache_behavior(cache_behavior)
        .viewer_certificate(
            ViewerCertificate::builder()
                .acm_certificate_arn(&spec.certificate_arn)
                .ssl_support_method(SslSupportMethod::from("sni-only"))
                .minimum_protocol_version(MinimumProtocolVersion::from("TLSv1.2_2021"))
                .build(),
        )
        .http_version(HttpVersion::from("http2and3"))
        .price_class(PriceClass::from("PriceClass_All"))
        .is_ipv6_enabled(spec.ipv6);

    if let Some(root) = &spec.default_root_object {
        builder = builder.default_root_object(root);
    }
    if let Some(page) = &spec.error_page {
        let responses = [403, 404]
            .into_iter()
            .map(|code| {
                CustomErrorResponse::builder()
                    .error_code(code)
                    .response_code("404")
                    .response_page_path(page)
                    .error_caching_min_ttl(10)
                    .build()
                    .map_err(build_error)
            })
            .collect::<Result<Vec<_>>>()?;
        builder = builder.custom_error_responses(
            CustomErrorResponses::builder()
                .quantity(responses.len() as i32)
                .set_items(Some(responses))
                .build()
                .map_err(build_error)?,
        );
    }

    builder.build().map_err(build_error)
}
