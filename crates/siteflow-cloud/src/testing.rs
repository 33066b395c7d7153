//! In-memory provider for workflow tests

use crate::error::{Result, SiteError};
use crate::naming::normalize_domain;
use crate::provider::{
    AuthStatus, CertificateDetails, CertificateStatus, DistributionInfo, HostedZone,
    RemoteObject, SiteProvider, ValidationRecord,
};
use crate::resource::{
    BucketPolicy, BucketWebsite, CertificateRequest, DistributionSpec, DnsRecord, PutObject,
    RecordType, Tag,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// How requested certificates behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertBehavior {
    Issue,
    StayPending,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: &'static str,
    pub mutating: bool,
}

#[derive(Default)]
struct MockState {
    zones: Vec<HostedZone>,
    records: HashMap<(String, String, RecordType), DnsRecord>,
    buckets: BTreeMap<String, BTreeMap<String, RemoteObject>>,
    bucket_tags: HashMap<String, Vec<Tag>>,
    websites: HashMap<String, BucketWebsite>,
    policies: HashMap<String, BucketPolicy>,
    public_access_blocked: Vec<String>,
    certificates: BTreeMap<String, CertificateDetails>,
    certificate_requests: Vec<CertificateRequest>,
    origin_access_controls: BTreeMap<String, String>,
    distributions: BTreeMap<String, DistributionInfo>,
    distribution_specs: Vec<DistributionSpec>,
    distribution_certificates: HashMap<String, String>,
    uploads: Vec<PutObject>,
    invalidations: Vec<(String, Vec<String>)>,
    calls: Vec<Call>,
    failures: Vec<(&'static str, String)>,
    next_id: u32,
    cert_behavior: Option<CertBehavior>,
    deploy_immediately: bool,
}

pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                deploy_immediately: true,
                ..MockState::default()
            }),
        }
    }

    pub fn with_zone(self, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = format!("Z{}", state.zones.len() + 100);
            state.zones.push(HostedZone {
                id,
                name: name.to_string(),
            });
        }
        self
    }

    pub fn set_cert_behavior(&self, behavior: CertBehavior) {
        self.state.lock().unwrap().cert_behavior = Some(behavior);
    }

    pub fn set_deploy_immediately(&self, deploy: bool) {
        self.state.lock().unwrap().deploy_immediately = deploy;
    }

    /// Move every pending certificate to `Issued`
    pub fn issue_all_certificates(&self) {
        for cert in self.state.lock().unwrap().certificates.values_mut() {
            cert.status = CertificateStatus::Issued;
        }
    }

    pub fn zone_id(&self, name: &str) -> String {
        let state = self.state.lock().unwrap();
        state
            .zones
            .iter()
            .find(|z| z.name == name)
            .map(|z| z.id.clone())
            .unwrap()
    }

    pub fn mutating_calls(&self) -> Vec<&'static str> {
        let state = self.state.lock().unwrap();
        state
            .calls
            .iter()
            .filter(|c| c.mutating)
            .map(|c| c.name)
            .collect()
    }

    pub fn call_count(&self, name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.iter().filter(|c| c.name == name).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn certificate_requests(&self) -> Vec<CertificateRequest> {
        self.state.lock().unwrap().certificate_requests.clone()
    }

    pub fn distribution_specs(&self) -> Vec<DistributionSpec> {
        self.state.lock().unwrap().distribution_specs.clone()
    }

    pub fn distribution_count(&self) -> usize {
        self.state.lock().unwrap().distributions.len()
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.state.lock().unwrap().buckets.keys().cloned().collect()
    }

    pub fn bucket_tags(&self, bucket: &str) -> Vec<Tag> {
        let state = self.state.lock().unwrap();
        state.bucket_tags.get(bucket).cloned().unwrap_or_default()
    }

    pub fn website(&self, bucket: &str) -> Option<BucketWebsite> {
        self.state.lock().unwrap().websites.get(bucket).cloned()
    }

    pub fn policy(&self, bucket: &str) -> Option<BucketPolicy> {
        self.state.lock().unwrap().policies.get(bucket).cloned()
    }

    pub fn is_public_access_blocked(&self, bucket: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.public_access_blocked.iter().any(|b| b == bucket)
    }

    pub fn uploads(&self) -> Vec<PutObject> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn invalidations(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().invalidations.clone()
    }

    pub fn record(&self, zone_id: &str, name: &str, record_type: RecordType) -> Option<DnsRecord> {
        let state = self.state.lock().unwrap();
        state
            .records
            .get(&(zone_id.to_string(), normalize_domain(name), record_type))
            .cloned()
    }

    /// Overwrite a record behind the workflow's back
    pub fn put_record(&self, zone_id: &str, record: DnsRecord) {
        let mut state = self.state.lock().unwrap();
        let key = (
            zone_id.to_string(),
            normalize_domain(&record.name),
            record.record_type,
        );
        state.records.insert(key, record);
    }

    pub fn put_remote_object(&self, bucket: &str, key: &str, size: u64, last_modified: i64) {
        let mut state = self.state.lock().unwrap();
        state.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            RemoteObject {
                key: key.to_string(),
                size,
                last_modified: Some(last_modified),
            },
        );
    }

    /// Delete a bucket without going through the provider API
    pub fn drop_bucket(&self, bucket: &str) {
        self.state.lock().unwrap().buckets.remove(bucket);
    }

    pub fn drop_bucket_policy(&self, bucket: &str) {
        self.state.lock().unwrap().policies.remove(bucket);
    }

    /// Move a certificate to `status`, e.g. `Other("EXPIRED")`
    pub fn set_certificate_status(&self, arn: &str, status: CertificateStatus) {
        if let Some(cert) = self.state.lock().unwrap().certificates.get_mut(arn) {
            cert.status = status;
        }
    }

    pub fn certificate_status(&self, arn: &str) -> Option<CertificateStatus> {
        let state = self.state.lock().unwrap();
        state.certificates.get(arn).map(|c| c.status.clone())
    }

    pub fn set_distribution_status(&self, id: &str, status: &str) {
        if let Some(info) = self.state.lock().unwrap().distributions.get_mut(id) {
            info.status = status.to_string();
        }
    }

    /// Make every `call` whose subject contains `subject` fail with a retryable API error
    pub fn fail_calls(&self, call: &'static str, subject: &str) {
        let mut state = self.state.lock().unwrap();
        state.failures.push((call, subject.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    fn call(&self, name: &'static str, mutating: bool) -> std::sync::MutexGuard<'_, MockState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call { name, mutating });
        state
    }

    /// Like `call`, but honours failures registered with `fail_calls`
    fn call_on(
        &self,
        name: &'static str,
        mutating: bool,
        subject: &str,
    ) -> Result<std::sync::MutexGuard<'_, MockState>> {
        let state = self.call(name, mutating);
        let fails = state
            .failures
            .iter()
            .any(|(call, s)| *call == name && subject.contains(s.as_str()));
        if fails {
            return Err(SiteError::ApiError(format!("{} failed for {}", name, subject)));
        }
        Ok(state)
    }
}

fn next_id(state: &mut MockState) -> u32 {
    state.next_id += 1;
    state.next_id
}

#[async_trait]
impl SiteProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        drop(self.call("check_auth", false));
        Ok(AuthStatus::ok("arn:aws:iam::123456789012:user/test"))
    }

    async fn find_hosted_zone(&self, name: &str) -> Result<Option<HostedZone>> {
        let state = self.call("find_hosted_zone", false);
        Ok(state.zones.iter().find(|z| z.name == name).cloned())
    }

    async fn get_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<DnsRecord>> {
        let state = self.call("get_record", false);
        Ok(state
            .records
            .get(&(zone_id.to_string(), normalize_domain(name), record_type))
            .cloned())
    }

    async fn upsert_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()> {
        let mut state = self.call("upsert_records", true);
        for record in records {
            let key = (
                zone_id.to_string(),
                normalize_domain(&record.name),
                record.record_type,
            );
            state.records.insert(key, record.clone());
        }
        Ok(())
    }

    async fn delete_record(&self, zone_id: &str, record: &DnsRecord) -> Result<bool> {
        let mut state = self.call("delete_record", true);
        let key = (
            zone_id.to_string(),
            normalize_domain(&record.name),
            record.record_type,
        );
        Ok(state.records.remove(&key).is_some())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let state = self.call("bucket_exists", false);
        Ok(state.buckets.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str, _region: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.call_on("create_bucket", true, bucket)?;
        state.buckets.insert(bucket.to_string(), BTreeMap::new());
        state.bucket_tags.insert(bucket.to_string(), tags.to_vec());
        Ok(())
    }

    async fn configure_website(&self, bucket: &str, website: &BucketWebsite) -> Result<()> {
        let mut state = self.call_on("configure_website", true, bucket)?;
        state.websites.insert(bucket.to_string(), website.clone());
        Ok(())
    }

    async fn block_public_access(&self, bucket: &str) -> Result<()> {
        let mut state = self.call("block_public_access", true);
        state.public_access_blocked.push(bucket.to_string());
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<Option<String>> {
        let state = self.call("get_bucket_policy", false);
        state
            .policies
            .get(bucket)
            .map(|p| p.to_json().map_err(SiteError::from))
            .transpose()
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &BucketPolicy) -> Result<()> {
        let mut state = self.call("put_bucket_policy", true);
        state.policies.insert(bucket.to_string(), policy.clone());
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>> {
        let state = self.call("list_objects", false);
        Ok(state
            .buckets
            .get(bucket)
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_object(&self, bucket: &str, object: PutObject) -> Result<()> {
        let mut state = self.call("put_object", true);
        let remote = RemoteObject {
            key: object.key.clone(),
            size: object.body.len() as u64,
            last_modified: Some(i64::MAX),
        };
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(object.key.clone(), remote);
        state.uploads.push(object);
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let mut state = self.call("delete_objects", true);
        if let Some(objects) = state.buckets.get_mut(bucket) {
            for key in keys {
                objects.remove(key);
            }
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        let mut state = self.call("delete_bucket", true);
        match state.buckets.get(bucket) {
            None => Ok(false),
            Some(objects) if !objects.is_empty() => Err(SiteError::ResourceInUse(format!(
                "bucket {} is not empty",
                bucket
            ))),
            Some(_) => {
                state.buckets.remove(bucket);
                Ok(true)
            }
        }
    }

    async fn request_certificate(&self, request: &CertificateRequest) -> Result<String> {
        let mut state = self.call("request_certificate", true);
        let id = next_id(&mut state);
        let arn = format!("arn:aws:acm:us-east-1:123456789012:certificate/cert-{}", id);
        let status = match state.cert_behavior.unwrap_or(CertBehavior::Issue) {
            CertBehavior::Issue => CertificateStatus::Issued,
            CertBehavior::StayPending => CertificateStatus::PendingValidation,
            CertBehavior::Fail => CertificateStatus::Failed,
        };
        let validation_records = request
            .names()
            .iter()
            .map(|name| ValidationRecord {
                domain: name.clone(),
                name: format!("_v{}.{}.", id, name),
                value: format!("_x{}.acm-validations.aws.", id),
            })
            .collect();
        state.certificates.insert(
            arn.clone(),
            CertificateDetails {
                arn: arn.clone(),
                status,
                domain: request.domain.clone(),
                alternate_names: request.alternate_names.clone(),
                validation_records,
                in_use_by: Vec::new(),
                failure_reason: Some("CAA_ERROR".to_string()),
            },
        );
        state.certificate_requests.push(request.clone());
        Ok(arn)
    }

    async fn describe_certificate(&self, arn: &str) -> Result<Option<CertificateDetails>> {
        let state = self.call("describe_certificate", false);
        Ok(state.certificates.get(arn).cloned().map(|mut cert| {
            cert.in_use_by = state
                .distribution_certificates
                .iter()
                .filter(|(_, c)| c.as_str() == arn)
                .filter_map(|(id, _)| state.distributions.get(id))
                .map(|d| d.arn.clone())
                .collect();
            cert
        }))
    }

    async fn delete_certificate(&self, arn: &str) -> Result<bool> {
        let mut state = self.call("delete_certificate", true);
        let in_use = state
            .distributions
            .keys()
            .any(|id| state.distribution_certificates.get(id).map(String::as_str) == Some(arn));
        if in_use {
            return Err(SiteError::ResourceInUse(arn.to_string()));
        }
        Ok(state.certificates.remove(arn).is_some())
    }

    async fn find_origin_access_control(&self, name: &str) -> Result<Option<String>> {
        let state = self.call("find_origin_access_control", false);
        Ok(state
            .origin_access_controls
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| id.clone()))
    }

    async fn origin_access_control_exists(&self, id: &str) -> Result<bool> {
        let state = self.call("origin_access_control_exists", false);
        Ok(state.origin_access_controls.contains_key(id))
    }

    async fn create_origin_access_control(&self, name: &str, _description: &str) -> Result<String> {
        let mut state = self.call("create_origin_access_control", true);
        let id = format!("OAC{}", next_id(&mut state));
        state
            .origin_access_controls
            .insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn delete_origin_access_control(&self, id: &str) -> Result<bool> {
        let mut state = self.call("delete_origin_access_control", true);
        Ok(state.origin_access_controls.remove(id).is_some())
    }

    async fn find_distribution_by_alias(&self, alias: &str) -> Result<Option<DistributionInfo>> {
        let state = self.call("find_distribution_by_alias", false);
        Ok(state
            .distributions
            .values()
            .find(|d| d.aliases.iter().any(|a| a == alias))
            .cloned())
    }

    async fn get_distribution(&self, id: &str) -> Result<Option<DistributionInfo>> {
        let state = self.call("get_distribution", false);
        Ok(state.distributions.get(id).cloned())
    }

    async fn create_distribution(&self, spec: &DistributionSpec) -> Result<DistributionInfo> {
        let mut state = self.call_on("create_distribution", true, &spec.aliases.join(","))?;
        let n = next_id(&mut state);
        let info = DistributionInfo {
            id: format!("E{}", n),
            arn: format!("arn:aws:cloudfront::123456789012:distribution/E{}", n),
            domain_name: format!("d{}.cloudfront.net", n),
            status: if state.deploy_immediately {
                "Deployed".to_string()
            } else {
                "InProgress".to_string()
            },
            enabled: true,
            aliases: spec.aliases.clone(),
        };
        state.distributions.insert(info.id.clone(), info.clone());
        state
            .distribution_certificates
            .insert(info.id.clone(), spec.certificate_arn.clone());
        state.distribution_specs.push(spec.clone());
        Ok(info)
    }

    async fn disable_distribution(&self, id: &str) -> Result<()> {
        let mut state = self.call("disable_distribution", true);
        match state.distributions.get_mut(id) {
            Some(info) => {
                info.enabled = false;
                Ok(())
            }
            None => Err(SiteError::ApiError(format!("no distribution {}", id))),
        }
    }

    async fn delete_distribution(&self, id: &str) -> Result<bool> {
        let mut state = self.call("delete_distribution", true);
        match state.distributions.get(id) {
            None => Ok(false),
            Some(info) if info.enabled => Err(SiteError::ResourceInUse(format!(
                "distribution {} is still enabled",
                id
            ))),
            Some(_) => {
                state.distributions.remove(id);
                Ok(true)
            }
        }
    }

    async fn create_invalidation(&self, distribution_id: &str, paths: &[String]) -> Result<String> {
        let mut state = self.call("create_invalidation", true);
        let id = format!("I{}", next_id(&mut state));
        state
            .invalidations
            .push((distribution_id.to_string(), paths.to_vec()));
        Ok(id)
    }
}

mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_auth_is_read_only() {
        let mock = MockProvider::new();
        let auth = mock.check_auth().await.unwrap();
        assert!(auth.authenticated);
        assert_eq!(mock.call_count("check_auth"), 1);
        assert!(mock.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_failures_match_subject() {
        let mock = MockProvider::new();
        mock.fail_calls("create_bucket", "a-com");
        let result = mock.create_bucket("a-com-site-1", "us-east-1", &[]).await;
        assert!(matches!(result, Err(SiteError::ApiError(_))));
        mock.create_bucket("b-com-site-1", "us-east-1", &[]).await.unwrap();

        mock.clear_failures();
        mock.create_bucket("a-com-site-1", "us-east-1", &[]).await.unwrap();
        assert_eq!(mock.bucket_names().len(), 2);
    }
}
