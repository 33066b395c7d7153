//! Post-deploy DNS and HTTP checks
//!
//! These run after propagation and are advisory only: a fresh
//! distribution or record can take a while to become visible.

use crate::error::{Result, SiteError};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// HTTP response seen by a probe (redirects are not followed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub location: Option<String>,
}

/// What a served name should answer with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Any non-error response
    Serves,
    /// A 3xx whose `Location` points at this host
    RedirectsTo(String),
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>>;

    async fn probe(&self, url: &str) -> Result<ProbeResponse>;
}

/// Prober backed by the system resolver and reqwest
pub struct NetworkProber {
    client: reqwest::Client,
}

impl NetworkProber {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| SiteError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 443))
            .await
            .map_err(|e| SiteError::Verification(format!("{} does not resolve: {}", host, e)))?;
        Ok(addrs.map(|a| a.ip()).collect())
    }

    async fn probe(&self, url: &str) -> Result<ProbeResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SiteError::Verification(format!("GET {} failed: {}", url, e)))?;
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ProbeResponse {
            status: response.status().as_u16(),
            location,
        })
    }
}

/// Check one served name; `Err` carries the advisory to report
pub async fn verify_name(
    prober: &dyn Prober,
    name: &str,
    expectation: &Expectation,
) -> Result<ProbeResponse> {
    let addrs = prober.resolve(name).await?;
    if addrs.is_empty() {
        return Err(SiteError::Verification(format!(
            "{} has no addresses yet (DNS may still be propagating)",
            name
        )));
    }
    tracing::debug!("{} resolves to {:?}", name, addrs);

    let url = format!("https://{}/", name);
    let response = prober.probe(&url).await?;

    match expectation {
        Expectation::Serves if response.status < 400 => Ok(response),
        Expectation::Serves => Err(SiteError::Verification(format!(
            "{} answered HTTP {} (the distribution may still be deploying)",
            url, response.status
        ))),
        Expectation::RedirectsTo(host) => {
            let redirected = (300..400).contains(&response.status)
                && response
                    .location
                    .as_deref()
                    .map(|l| location_host(l).eq_ignore_ascii_case(host))
                    .unwrap_or(false);
            if redirected {
                Ok(response)
            } else {
                Err(SiteError::Verification(format!(
                    "{} answered HTTP {} with Location {:?}, expected a redirect to {}",
                    url, response.status, response.location, host
                )))
            }
        }
    }
}

fn location_host(location: &str) -> &str {
    let rest = location
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(location);
    rest.split(['/', '?', '#', ':']).next().unwrap_or(rest)
}
