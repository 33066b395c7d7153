//! Route53 hosted zones and record sets

use crate::error::{AwsError, Result, build_error};
use aws_sdk_route53::Client;
use aws_sdk_route53::types::{
    AliasTarget, Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use siteflow_cloud::{DnsRecord, HostedZone, RecordType, RecordValue};

/// Route53 client wrapper
pub struct Route53Dns {
    client: Client,
}

impl Route53Dns {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Public zone named exactly `name`
    pub async fn find_zone(&self, name: &str) -> Result<Option<HostedZone>> {
        let wanted = fqdn(name);
        let output = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(&wanted)
            .max_items(10)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("ListHostedZonesByName", e))?;

        let zone = output.hosted_zones().iter().find(|z| {
            z.name().eq_ignore_ascii_case(&wanted)
                && !z.config().map(|c| c.private_zone()).unwrap_or(false)
        });
        Ok(zone.map(|z| HostedZone {
            id: strip_zone_prefix(z.id()),
            name: trim_dot(z.name()),
        }))
    }

    pub async fn get_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<DnsRecord>> {
        let wanted = fqdn(name);
        let output = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(zone_id)
            .start_record_name(&wanted)
            .start_record_type(rr_type(record_type))
            .max_items(1)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("ListResourceRecordSets", e))?;

        // The listing starts at the requested name but may return the next set
        let Some(set) = output.resource_record_sets().first() else {
            return Ok(None);
        };
        if !set.name().eq_ignore_ascii_case(&wanted) || set.r#type() != &rr_type(record_type) {
            return Ok(None);
        }
        Ok(Some(from_record_set(set, record_type)))
    }

    pub async fn upsert(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let changes = records
            .iter()
            .map(|r| change(ChangeAction::Upsert, r))
            .collect::<Result<Vec<_>>>()?;
        self.submit(zone_id, changes, "siteflow upsert").await?;
        tracing::info!("Upserted {} record(s) in zone {}", records.len(), zone_id);
        Ok(())
    }

    pub async fn delete(&self, zone_id: &str, record: &DnsRecord) -> Result<bool> {
        let change = change(ChangeAction::Delete, record)?;
        match self.submit(zone_id, vec![change], "siteflow teardown").await {
            Ok(()) => Ok(true),
            Err(e) if e.is_missing_record() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn submit(&self, zone_id: &str, changes: Vec<Change>, comment: &str) -> Result<()> {
        let batch = ChangeBatch::builder()
            .comment(comment)
            .set_changes(Some(changes))
            .build()
            .map_err(build_error)?;
        self.client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("ChangeResourceRecordSets", e))?;
        Ok(())
    }
}

fn change(action: ChangeAction, record: &DnsRecord) -> Result<Change> {
    Change::builder()
        .action(action)
        .resource_record_set(to_record_set(record)?)
        .build()
        .map_err(build_error)
}

fn to_record_set(record: &DnsRecord) -> Result<ResourceRecordSet> {
    let builder = ResourceRecordSet::builder()
        .name(fqdn(&record.name))
        .r#type(rr_type(record.record_type));
    let builder = match &record.value {
        RecordValue::Alias {
            dns_name,
            hosted_zone_id,
        } => builder.alias_target(
            AliasTarget::builder()
                .dns_name(dns_name)
                .hosted_zone_id(hosted_zone_id)
                .evaluate_target_health(false)
                .build()
                .map_err(build_error)?,
        ),
        RecordValue::Values { ttl, values } => {
            let records = values
                .iter()
                .map(|v| ResourceRecord::builder().value(v).build().map_err(build_error))
                .collect::<Result<Vec<_>>>()?;
            builder.ttl(*ttl).set_resource_records(Some(records))
        }
    };
    builder.build().map_err(build_error)
}

fn from_record_set(set: &ResourceRecordSet, record_type: RecordType) -> DnsRecord {
    let value = match set.alias_target() {
        Some(alias) => RecordValue::Alias {
            dns_name: trim_dot(alias.dns_name()),
            hosted_zone_id: alias.hosted_zone_id().to_string(),
        },
        None => RecordValue::Values {
            ttl: set.ttl().unwrap_or(300),
            values: set
                .resource_records()
                .iter()
                .map(|r| r.value().to_string())
                .collect(),
        },
    };
    DnsRecord {
        name: trim_dot(set.name()),
        record_type,
        value,
    }
}

fn rr_type(record_type: RecordType) -> RrType {
    match record_type {
        RecordType::A => RrType::A,
        RecordType::Aaaa => RrType::Aaaa,
        RecordType::Cname => RrType::Cname,
    }
}

fn fqdn(name: &str) -> String {
    format!("{}.", trim_dot(name))
}

fn trim_dot(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

fn strip_zone_prefix(id: &str) -> String {
    id.trim_start_matches("/hostedzone/").to_string()
}
