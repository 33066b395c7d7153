use crate::progress::ConsoleProgress;
use crate::utils::{self, Context};
use colored::Colorize;
use siteflow_cloud::{NetworkProber, OpenMode, SiteOptions, StatusStore, Workflow, naming};

pub async fn handle(
    ctx: &Context,
    domain: String,
    alternate_names: Vec<String>,
    ipv6: bool,
    verify: bool,
) -> anyhow::Result<()> {
    let domain = naming::validate_domain(&domain)?;
    let status_path = ctx.status_path_for(&domain);

    println!("{}", format!("Provisioning site {}", domain).yellow().bold());
    let mut store = StatusStore::load(&status_path, OpenMode::CreateIfMissing).await?;

    let provider = ctx.connect(Some(store.record())).await;
    utils::ensure_authenticated(&provider).await?;

    let mut options = SiteOptions::new(domain, ctx.region_or_default());
    options.alternate_names = alternate_names;
    options.ipv6 = ipv6;
    options.verify = verify;

    let progress = ConsoleProgress::new();
    let prober = NetworkProber::new()?;
    let report = Workflow::new(&provider)
        .with_observer(&progress)
        .with_prober(&prober)
        .with_policies(ctx.settings.poll_policies())
        .provision_site(&mut store, &options)
        .await?;

    if let Some(cdn) = store.record().get_str(siteflow_cloud::keys::DISTRIBUTION_DOMAIN) {
        println!("{} {}", "Distribution:".dimmed(), cdn);
    }
    utils::finish_report(&report, &status_path)
}
