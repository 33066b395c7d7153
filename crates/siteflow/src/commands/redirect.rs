use crate::progress::ConsoleProgress;
use crate::utils::{self, Context};
use colored::Colorize;
use siteflow_cloud::{
    NetworkProber, OpenMode, RedirectOptions, RedirectProtocol, RedirectType, StatusStore,
    Workflow, naming,
};

pub struct RedirectArgs {
    pub sources: Vec<String>,
    pub target: String,
    pub redirect_type: RedirectType,
    pub redirect_path: Option<String>,
    pub protocol: RedirectProtocol,
    pub ipv6: bool,
    pub verify: bool,
}

pub async fn handle(ctx: &Context, args: RedirectArgs) -> anyhow::Result<()> {
    let target = naming::validate_domain(&args.target)?;
    let status_path = ctx.status_path_for(&naming::redirect_status_name(&target));

    println!(
        "{}",
        format!("Redirecting {} -> {}", args.sources.join(", "), target)
            .yellow()
            .bold()
    );
    let mut store = StatusStore::load(&status_path, OpenMode::CreateIfMissing).await?;

    let provider = ctx.connect(Some(store.record())).await;
    utils::ensure_authenticated(&provider).await?;

    let mut options = RedirectOptions::new(args.sources, target, ctx.region_or_default());
    options.protocol = args.protocol;
    options.redirect_type = args.redirect_type;
    options.path = args.redirect_path;
    options.ipv6 = args.ipv6;
    options.verify = args.verify;

    let progress = ConsoleProgress::new();
    let prober = NetworkProber::new()?;
    let report = Workflow::new(&provider)
        .with_observer(&progress)
        .with_prober(&prober)
        .with_policies(ctx.settings.poll_policies())
        .provision_redirect(&mut store, &options)
        .await?;

    utils::finish_report(&report, &status_path)
}
