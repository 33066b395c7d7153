//! ACM certificates
//!
//! CloudFront only accepts certificates from us-east-1, so this client is
//! always pinned there regardless of the configured region.

use crate::error::{AwsError, Result, build_error, gone_is_false};
use aws_config::SdkConfig;
use aws_sdk_acm::Client;
use aws_sdk_acm::types::{CertificateDetail, ValidationMethod};
use siteflow_cloud::{CertificateDetails, CertificateRequest, CertificateStatus, ValidationRecord};

pub use siteflow_cloud::naming::CERTIFICATE_REGION;

/// ACM client wrapper
pub struct AcmCertificates {
    client: Client,
}

impl AcmCertificates {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        let config = aws_sdk_acm::config::Builder::from(sdk_config)
            .region(aws_config::Region::new(CERTIFICATE_REGION))
            .build();
        Self {
            client: Client::from_conf(config),
        }
    }

    pub async fn request(&self, request: &CertificateRequest) -> Result<String> {
        let tags = request
            .tags
            .iter()
            .map(|t| {
                aws_sdk_acm::types::Tag::builder()
                    .key(&t.key)
                    .value(&t.value)
                    .build()
                    .map_err(build_error)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut builder = self
            .client
            .request_certificate()
            .domain_name(&request.domain)
            .validation_method(ValidationMethod::Dns)
            .idempotency_token(&request.idempotency_token)
            .set_tags(Some(tags));
        if !request.alternate_names.is_empty() {
            builder = builder.set_subject_alternative_names(Some(request.names()));
        }

        let output = builder
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("RequestCertificate", e))?;
        let arn = output
            .certificate_arn()
            .ok_or(AwsError::MissingField {
                operation: "RequestCertificate",
                field: "certificate_arn",
            })?
            .to_string();
        tracing::info!("Requested certificate {} for {}", arn, request.domain);
        Ok(arn)
    }

    pub async fn describe(&self, arn: &str) -> Result<Option<CertificateDetails>> {
        let output = match self
            .client
            .describe_certificate()
            .certificate_arn(arn)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let err = AwsError::from_sdk("DescribeCertificate", e);
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };
        Ok(output.certificate().map(|c| details(arn, c)))
    }

    pub async fn delete(&self, arn: &str) -> Result<bool> {
        let result = self
            .client
            .delete_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| AwsError::from_sdk("DeleteCertificate", e));
        gone_is_false(result)
    }
}

fn details(arn: &str, cert: &CertificateDetail) -> CertificateDetails {
    let status = match cert.status().map(|s| s.as_str()) {
        Some("ISSUED") => CertificateStatus::Issued,
        Some("PENDING_VALIDATION") => CertificateStatus::PendingValidation,
        Some("FAILED") => CertificateStatus::Failed,
        Some(other) => CertificateStatus::Other(other.to_string()),
        None => CertificateStatus::Other("UNKNOWN".to_string()),
    };

    // Records appear a few seconds after the request; absent ones are skipped
    let validation_records = cert
        .domain_validation_options()
        .iter()
        .filter_map(|option| {
            option.resource_record().map(|record| ValidationRecord {
                domain: option.domain_name().to_string(),
                name: record.name().trim_end_matches('.').to_string(),
                value: record.value().to_string(),
            })
        })
        .collect();

    CertificateDetails {
        arn: cert.certificate_arn().unwrap_or(arn).to_string(),
        status,
        domain: cert.domain_name().unwrap_or_default().to_string(),
        alternate_names: cert.subject_alternative_names().to_vec(),
        validation_records,
        in_use_by: cert.in_use_by().to_vec(),
        failure_reason: cert.failure_reason().map(|r| r.as_str().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_acm::types::{
        CertificateStatus as AcmStatus, DomainValidation, FailureReason, RecordType,
        ResourceRecord,
    };

    fn validation(domain: &str, with_record: bool) -> DomainValidation {
        let mut builder = DomainValidation::builder().domain_name(domain);
        if with_record {
            builder = builder.resource_record(
                ResourceRecord::builder()
                    .name(format!("_abc.{}.", domain))
                    .r#type(RecordType::Cname)
                    .value("_xyz.acm-validations.aws.")
                    .build()
                    .unwrap(),
            );
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_details_skips_records_not_yet_published() {
        let cert = CertificateDetail::builder()
            .certificate_arn("arn:aws:acm:us-east-1:123:certificate/abc")
            .domain_name("a.com")
            .subject_alternative_names("a.com")
            .subject_alternative_names("b.com")
            .status(AcmStatus::PendingValidation)
            .domain_validation_options(validation("a.com", true))
            .domain_validation_options(validation("b.com", false))
            .build();

        let details = details("arn:fallback", &cert);
        assert_eq!(details.status, CertificateStatus::PendingValidation);
        assert_eq!(details.arn, "arn:aws:acm:us-east-1:123:certificate/abc");
        assert_eq!(details.alternate_names, vec!["a.com", "b.com"]);
        assert_eq!(details.validation_records.len(), 1);
        assert_eq!(details.validation_records[0].name, "_abc.a.com");
    }

    #[test]
    fn test_failed_certificate_carries_reason() {
        let cert = CertificateDetail::builder()
            .status(AcmStatus::Failed)
            .failure_reason(FailureReason::CaaError)
            .build();
        let details = details("arn:x", &cert);
        assert_eq!(details.status, CertificateStatus::Failed);
        assert_eq!(details.arn, "arn:x");
        assert_eq!(details.failure_reason.as_deref(), Some("CAA_ERROR"));
    }
}
