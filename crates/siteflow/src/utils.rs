use anyhow::Context as _;
use colored::Colorize;
use siteflow_cloud::{
    DeploymentRecord, RunReport, SiteError, SiteProvider, StepOutcome, default_status_path, keys,
    naming,
};
use siteflow_cloud_aws::{AwsProvider, AwsSettings};
use siteflow_config::Settings;
use std::path::{Path, PathBuf};

/// Region used for new deployments when neither flag nor settings name one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Flags merged with the settings file
pub struct Context {
    pub settings: Settings,
    pub profile: Option<String>,
    pub region: Option<String>,
    pub status_file: Option<PathBuf>,
    pub yes: bool,
}

impl Context {
    /// Flags and environment win over the settings file
    pub fn new(
        profile: Option<String>,
        region: Option<String>,
        status_file: Option<PathBuf>,
        yes: bool,
    ) -> anyhow::Result<Self> {
        let (settings, settings_path) = Settings::discover()?;
        if let Some(path) = &settings_path {
            tracing::info!("Loaded settings from {}", path.display());
        }
        Ok(Self {
            profile: profile.or_else(|| settings.profile.clone()),
            region: region.or_else(|| settings.region.clone()),
            status_file,
            yes,
            settings,
        })
    }

    /// Region for a new deployment
    pub fn region_or_default(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// `--status-file`, or `<status_dir>/<stem>.json`
    pub fn status_path_for(&self, stem: &str) -> PathBuf {
        self.status_file
            .clone()
            .unwrap_or_else(|| default_status_path(self.settings.status_dir(), stem))
    }

    /// Status file of an existing deployment, chosen by `--domain` or `--status-file`
    pub fn existing_status_path(&self, domain: Option<&str>) -> anyhow::Result<PathBuf> {
        match (&self.status_file, domain) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(domain)) => {
                let domain = naming::validate_domain(domain)?;
                Ok(default_status_path(self.settings.status_dir(), &domain))
            }
            (None, None) => Err(SiteError::InvalidConfig(
                "pass --domain <domain> or --status-file <path>".to_string(),
            )
            .into()),
        }
    }

    /// Build the AWS provider, preferring the region a record was created in
    pub async fn connect(&self, record: Option<&DeploymentRecord>) -> AwsProvider {
        let recorded = record.and_then(|r| r.get_str(keys::REGION)).map(str::to_string);
        AwsProvider::connect(&AwsSettings {
            profile: self.profile.clone(),
            region: recorded.or_else(|| self.region.clone()),
        })
        .await
    }
}

/// Abort before any API call if credentials do not resolve
pub async fn ensure_authenticated(provider: &AwsProvider) -> anyhow::Result<()> {
    let auth = provider.check_auth().await?;
    if !auth.authenticated {
        return Err(SiteError::AuthenticationFailed(auth.error.unwrap_or_default()).into());
    }
    if let Some(account) = &auth.account_info {
        println!("{} {}", "AWS account:".dimmed(), account);
    }
    Ok(())
}

/// Print the run summary and turn failed or pending steps into an error
///
/// Advisory failures (verification) are warnings and keep the exit code at 0.
pub fn finish_report(report: &RunReport, status_path: &Path) -> anyhow::Result<()> {
    let summary = report.summary();
    println!();
    println!(
        "{} {} ({:.1}s)",
        "Summary:".bold(),
        summary,
        report.duration_ms as f64 / 1000.0
    );
    println!("{} {}", "Status file:".dimmed(), status_path.display());

    let blocking = report
        .steps
        .iter()
        .filter(|s| {
            matches!(s.outcome, StepOutcome::Pending)
                || matches!(
                    s.outcome,
                    StepOutcome::Failed(severity) if severity != siteflow_cloud::Severity::Advisory
                )
        })
        .count();
    if blocking > 0 {
        return Err(anyhow::anyhow!(
            "{} step(s) did not finish; re-run the same command to resume",
            blocking
        ));
    }
    Ok(())
}

/// Read the record without touching AWS
pub async fn load_existing(path: &Path) -> anyhow::Result<siteflow_cloud::StatusStore> {
    siteflow_cloud::StatusStore::load(path, siteflow_cloud::OpenMode::Required)
        .await
        .with_context(|| format!("cannot open {}", path.display()))
}
