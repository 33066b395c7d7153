//! AWS provider implementation

use crate::acm::AcmCertificates;
use crate::cloudfront::CloudFrontCdn;
use crate::error::{AwsError, Result};
use crate::route53::Route53Dns;
use crate::s3::S3Storage;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use siteflow_cloud::{
    AuthStatus, BucketPolicy, BucketWebsite, CertificateDetails, CertificateRequest,
    DistributionInfo, DistributionSpec, DnsRecord, HostedZone, PutObject, RecordType,
    RemoteObject, SiteProvider, Tag,
};

/// Where the SDK should pick up credentials and its default region
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    /// Named profile from `~/.aws/config`; `None` uses the default chain
    pub profile: Option<String>,
    pub region: Option<String>,
}

/// AWS provider backed by the official SDK
pub struct AwsProvider {
    sdk_config: SdkConfig,
    sts: aws_sdk_sts::Client,
    dns: Route53Dns,
    storage: S3Storage,
    certificates: AcmCertificates,
    cdn: CloudFrontCdn,
}

impl AwsProvider {
    /// Resolve credentials and build every service client
    pub async fn connect(settings: &AwsSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &settings.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;
        Self::from_config(sdk_config)
    }

    pub fn from_config(sdk_config: SdkConfig) -> Self {
        Self {
            sts: aws_sdk_sts::Client::new(&sdk_config),
            dns: Route53Dns::new(aws_sdk_route53::Client::new(&sdk_config)),
            storage: S3Storage::new(&sdk_config),
            certificates: AcmCertificates::new(&sdk_config),
            cdn: CloudFrontCdn::new(aws_sdk_cloudfront::Client::new(&sdk_config)),
            sdk_config,
        }
    }

    /// Region the SDK resolved, if any
    pub fn region(&self) -> Option<&str> {
        self.sdk_config.region().map(|r| r.as_ref())
    }

    /// Account id and caller ARN
    pub async fn caller_identity(&self) -> Result<(String, String)> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("GetCallerIdentity", e))?;
        Ok((
            output.account().unwrap_or_default().to_string(),
            output.arn().unwrap_or_default().to_string(),
        ))
    }
}

#[async_trait]
impl SiteProvider for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    async fn check_auth(&self) -> siteflow_cloud::Result<AuthStatus> {
        match self.caller_identity().await {
            Ok((account, arn)) => Ok(AuthStatus::ok(format!("{} ({})", account, arn))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    // ========== DNS ==========

    async fn find_hosted_zone(&self, name: &str) -> siteflow_cloud::Result<Option<HostedZone>> {
        Ok(self.dns.find_zone(name).await?)
    }

    async fn get_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> siteflow_cloud::Result<Option<DnsRecord>> {
        Ok(self.dns.get_record(zone_id, name, record_type).await?)
    }

    async fn upsert_records(
        &self,
        zone_id: &str,
        records: &[DnsRecord],
    ) -> siteflow_cloud::Result<()> {
        Ok(self.dns.upsert(zone_id, records).await?)
    }

    async fn delete_record(&self, zone_id: &str, record: &DnsRecord) -> siteflow_cloud::Result<bool> {
        Ok(self.dns.delete(zone_id, record).await?)
    }

    // ========== Object storage ==========

    async fn bucket_exists(&self, bucket: &str) -> siteflow_cloud::Result<bool> {
        Ok(self.storage.exists(bucket).await?)
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        region: &str,
        tags: &[Tag],
    ) -> siteflow_cloud::Result<()> {
        Ok(self.storage.create(bucket, region, tags).await?)
    }

    async fn configure_website(
        &self,
        bucket: &str,
        website: &BucketWebsite,
    ) -> siteflow_cloud::Result<()> {
        Ok(self.storage.configure_website(bucket, website).await?)
    }

    async fn block_public_access(&self, bucket: &str) -> siteflow_cloud::Result<()> {
        Ok(self.storage.block_public_access(bucket).await?)
    }

    async fn get_bucket_policy(&self, bucket: &str) -> siteflow_cloud::Result<Option<String>> {
        Ok(self.storage.get_policy(bucket).await?)
    }

    async fn put_bucket_policy(
        &self,
        bucket: &str,
        policy: &BucketPolicy,
    ) -> siteflow_cloud::Result<()> {
        Ok(self.storage.put_policy(bucket, policy).await?)
    }

    async fn list_objects(&self, bucket: &str) -> siteflow_cloud::Result<Vec<RemoteObject>> {
        Ok(self.storage.list(bucket).await?)
    }

    async fn put_object(&self, bucket: &str, object: PutObject) -> siteflow_cloud::Result<()> {
        Ok(self.storage.put(bucket, object).await?)
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> siteflow_cloud::Result<()> {
        Ok(self.storage.delete_objects(bucket, keys).await?)
    }

    async fn delete_bucket(&self, bucket: &str) -> siteflow_cloud::Result<bool> {
        Ok(self.storage.delete(bucket).await?)
    }

    // ========== Certificates ==========

    async fn request_certificate(
        &self,
        request: &CertificateRequest,
    ) -> siteflow_cloud::Result<String> {
        Ok(self.certificates.request(request).await?)
    }

    async fn describe_certificate(
        &self,
        arn: &str,
    ) -> siteflow_cloud::Result<Option<CertificateDetails>> {
        Ok(self.certificates.describe(arn).await?)
    }

    async fn delete_certificate(&self, arn: &str) -> siteflow_cloud::Result<bool> {
        Ok(self.certificates.delete(arn).await?)
    }

    // ========== CDN ==========

    async fn find_origin_access_control(
        &self,
        name: &str,
    ) -> siteflow_cloud::Result<Option<String>> {
        Ok(self.cdn.find_origin_access_control(name).await?)
    }

    async fn origin_access_control_exists(&self, id: &str) -> siteflow_cloud::Result<bool> {
        Ok(self.cdn.origin_access_control_exists(id).await?)
    }

    async fn create_origin_access_control(
        &self,
        name: &str,
        description: &str,
    ) -> siteflow_cloud::Result<String> {
        Ok(self.cdn.create_origin_access_control(name, description).await?)
    }

    async fn delete_origin_access_control(&self, id: &str) -> siteflow_cloud::Result<bool> {
        Ok(self.cdn.delete_origin_access_control(id).await?)
    }

    async fn find_distribution_by_alias(
        &self,
        alias: &str,
    ) -> siteflow_cloud::Result<Option<DistributionInfo>> {
        Ok(self.cdn.find_by_alias(alias).await?)
    }

    async fn get_distribution(&self, id: &str) -> siteflow_cloud::Result<Option<DistributionInfo>> {
        Ok(self.cdn.get(id).await?)
    }

    async fn create_distribution(
        &self,
        spec: &DistributionSpec,
    ) -> siteflow_cloud::Result<DistributionInfo> {
        Ok(self.cdn.create(spec).await?)
    }

    async fn disable_distribution(&self, id: &str) -> siteflow_cloud::Result<()> {
        Ok(self.cdn.disable(id).await?)
    }

    async fn delete_distribution(&self, id: &str) -> siteflow_cloud::Result<bool> {
        Ok(self.cdn.delete(id).await?)
    }

    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
    ) -> siteflow_cloud::Result<String> {
        Ok(self.cdn.invalidate(distribution_id, paths).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::BehaviorVersion;

    fn offline_provider() -> AwsProvider {
        let config = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("eu-west-1"))
            .build();
        AwsProvider::from_config(config)
    }

    #[test]
    fn test_provider_name_and_region() {
        let provider = offline_provider();
        assert_eq!(provider.name(), "aws");
        assert_eq!(provider.region(), Some("eu-west-1"));
    }
}
