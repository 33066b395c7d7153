//! S3 buckets and objects

use crate::error::{AwsError, Result, build_error, gone_is_false};
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ErrorDocument, IndexDocument,
    ObjectIdentifier, Protocol, PublicAccessBlockConfiguration, Redirect, RedirectAllRequestsTo,
    RoutingRule, Tagging, WebsiteConfiguration,
};
use siteflow_cloud::{BucketPolicy, BucketWebsite, PutObject, RedirectProtocol, RemoteObject, Tag};

/// S3 client wrapper
pub struct S3Storage {
    client: Client,
    sdk_config: SdkConfig,
}

impl S3Storage {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
            sdk_config: sdk_config.clone(),
        }
    }

    /// Client pinned to `region`, reusing the shared one when they match
    fn client_for(&self, region: &str) -> Client {
        if self.sdk_config.region().map(|r| r.as_ref()) == Some(region) {
            return self.client.clone();
        }
        let config = aws_sdk_s3::config::Builder::from(&self.sdk_config)
            .region(aws_config::Region::new(region.to_string()))
            .build();
        Client::from_conf(config)
    }

    pub async fn exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = AwsError::from_sdk("HeadBucket", e);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub async fn create(&self, bucket: &str, region: &str, tags: &[Tag]) -> Result<()> {
        let client = self.client_for(region);
        let mut request = client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint
        if region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => tracing::info!("Created bucket {} in {}", bucket, region),
            Err(e) => {
                let err = AwsError::from_sdk("CreateBucket", e);
                match &err {
                    AwsError::Api { code, .. } if code == "BucketAlreadyOwnedByYou" => {
                        tracing::debug!("Bucket {} already owned by this account", bucket);
                    }
                    _ => return Err(err),
                }
            }
        }

        let tag_set = tags
            .iter()
            .map(|t| {
                aws_sdk_s3::types::Tag::builder()
                    .key(&t.key)
                    .value(&t.value)
                    .build()
                    .map_err(build_error)
            })
            .collect::<Result<Vec<_>>>()?;
        client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(
                Tagging::builder()
                    .set_tag_set(Some(tag_set))
                    .build()
                    .map_err(build_error)?,
            )
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("PutBucketTagging", e))?;
        Ok(())
    }

    pub async fn configure_website(&self, bucket: &str, website: &BucketWebsite) -> Result<()> {
        let configuration = website_configuration(website)?;
        self.client
            .put_bucket_website()
            .bucket(bucket)
            .website_configuration(configuration)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("PutBucketWebsite", e))?;
        Ok(())
    }

    pub async fn block_public_access(&self, bucket: &str) -> Result<()> {
        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(true)
                    .ignore_public_acls(true)
                    .block_public_policy(true)
                    .restrict_public_buckets(true)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("PutPublicAccessBlock", e))?;
        Ok(())
    }

    pub async fn put_policy(&self, bucket: &str, policy: &BucketPolicy) -> Result<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy.to_json()?)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("PutBucketPolicy", e))?;
        Ok(())
    }

    /// Current policy document, `None` when the bucket has none
    pub async fn get_policy(&self, bucket: &str) -> Result<Option<String>> {
        match self.client.get_bucket_policy().bucket(bucket).send().await {
            Ok(output) => Ok(output.policy().map(str::to_string)),
            Err(e) => {
                let err = AwsError::from_sdk("GetBucketPolicy", e);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub async fn list(&self, bucket: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| AwsError::from_sdk("ListObjectsV2", e))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(RemoteObject {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().map(|t| t.secs()),
                });
            }
        }
        Ok(objects)
    }

    pub async fn put(&self, bucket: &str, object: PutObject) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(&object.key)
            .content_type(&object.content_type)
            .set_content_encoding(object.content_encoding.clone())
            .cache_control(&object.cache_control)
            .body(ByteStream::from(object.body))
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("PutObject", e))?;
        Ok(())
    }

    pub async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let identifiers = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build().map_err(build_error))
            .collect::<Result<Vec<_>>>()?;
        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(
                Delete::builder()
                    .set_objects(Some(identifiers))
                    .quiet(true)
                    .build()
                    .map_err(build_error)?,
            )
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("DeleteObjects", e))?;

        if let Some(first) = output.errors().first() {
            return Err(AwsError::Api {
                operation: "DeleteObjects",
                code: first.code().unwrap_or_default().to_string(),
                message: format!(
                    "{} of {} objects not deleted; first: {} {}",
                    output.errors().len(),
                    keys.len(),
                    first.key().unwrap_or_default(),
                    first.message().unwrap_or_default()
                ),
            });
        }
        Ok(())
    }

    pub async fn delete(&self, bucket: &str) -> Result<bool> {
        let result = self
            .client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| AwsError::from_sdk("DeleteBucket", e));
        gone_is_false(result)
    }
}

fn protocol(protocol: RedirectProtocol) -> Protocol {
    match protocol {
        RedirectProtocol::Http => Protocol::Http,
        RedirectProtocol::Https => Protocol::Https,
    }
}

fn website_configuration(website: &BucketWebsite) -> Result<WebsiteConfiguration> {
    let configuration = match website {
        BucketWebsite::Site {
            index_document,
            error_document,
        } => WebsiteConfiguration::builder()
            .index_document(
                IndexDocument::builder()
                    .suffix(index_document)
                    .build()
                    .map_err(build_error)?,
            )
            .error_document(
                ErrorDocument::builder()
                    .key(error_document)
                    .build()
                    .map_err(build_error)?,
            )
            .build(),
        BucketWebsite::RedirectAll {
            host,
            protocol: scheme,
        } => WebsiteConfiguration::builder()
            .redirect_all_requests_to(
                RedirectAllRequestsTo::builder()
                    .host_name(host)
                    .protocol(protocol(*scheme))
                    .build()
                    .map_err(build_error)?,
            )
            .build(),
        BucketWebsite::RedirectRule {
            host,
            protocol: scheme,
            status_code,
            replace_key_with,
        } => {
            // A rule with no condition matches every request
            let rule = RoutingRule::builder()
                .redirect(
                    Redirect::builder()
                        .host_name(host)
                        .protocol(protocol(*scheme))
                        .http_redirect_code(status_code.to_string())
                        .set_replace_key_with(replace_key_with.clone())
                        .build(),
                )
                .build();
            WebsiteConfiguration::builder()
                .index_document(
                    IndexDocument::builder()
                        .suffix("index.html")
                        .build()
                        .map_err(build_error)?,
                )
                .routing_rules(rule)
                .build()
        }
    };
    Ok(configuration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteflow_cloud::RedirectType;

    #[test]
    fn test_site_website_configuration() {
        let config = website_configuration(&BucketWebsite::site()).unwrap();
        assert_eq!(config.index_document().map(|d| d.suffix()), Some("index.html"));
        assert_eq!(config.error_document().map(|d| d.key()), Some("404.html"));
        assert!(config.redirect_all_requests_to().is_none());
    }

    #[test]
    fn test_redirect_all_configuration() {
        let website =
            BucketWebsite::redirect("c.com", RedirectProtocol::Https, RedirectType::Permanent, None);
        let config = website_configuration(&website).unwrap();
        let redirect = config.redirect_all_requests_to().unwrap();
        assert_eq!(redirect.host_name(), "c.com");
        assert_eq!(redirect.protocol(), Some(&Protocol::Https));
        assert!(config.routing_rules().is_empty());
    }

    #[test]
    fn test_temporary_redirect_uses_routing_rule() {
        let website = BucketWebsite::redirect(
            "c.com",
            RedirectProtocol::Http,
            RedirectType::Temporary,
            Some("/landing"),
        );
        let config = website_configuration(&website).unwrap();
        assert!(config.redirect_all_requests_to().is_none());
        let rule = &config.routing_rules()[0];
        assert!(rule.condition().is_none());
        let redirect = rule.redirect().unwrap();
        assert_eq!(redirect.host_name(), Some("c.com"));
        assert_eq!(redirect.http_redirect_code(), Some("302"));
        assert_eq!(redirect.replace_key_with(), Some("landing"));
        assert_eq!(redirect.protocol(), Some(&Protocol::Http));
    }
}
