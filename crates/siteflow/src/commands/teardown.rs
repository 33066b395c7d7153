use crate::progress::ConsoleProgress;
use crate::utils::{self, Context};
use colored::Colorize;
use dialoguer::Confirm;
use siteflow_cloud::{DeploymentRecord, Scope, Workflow, keys};

pub async fn handle(ctx: &Context, domain: Option<&str>) -> anyhow::Result<()> {
    let status_path = ctx.existing_status_path(domain)?;
    let mut store = utils::load_existing(&status_path).await?;

    println!("{}", "The following resources will be deleted:".red().bold());
    print_targets(store.record());

    if !ctx.yes {
        let confirmed = Confirm::new()
            .with_prompt("Delete these resources?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let provider = ctx.connect(Some(store.record())).await;
    utils::ensure_authenticated(&provider).await?;

    let progress = ConsoleProgress::new();
    let report = Workflow::new(&provider)
        .with_observer(&progress)
        .with_policies(ctx.settings.poll_policies())
        .teardown(&mut store)
        .await?;

    utils::finish_report(&report, &status_path)
}

const TARGET_KEYS: [(&str, &str); 5] = [
    (keys::DISTRIBUTION_ID, "distribution"),
    (keys::ORIGIN_ACCESS_CONTROL_ID, "origin access control"),
    (keys::CERTIFICATE_ARN, "certificate"),
    (keys::BUCKET_NAME, "bucket"),
    (keys::DNS_RECORDS, "dns records"),
];

fn print_targets(record: &DeploymentRecord) {
    let mut scopes = vec![Scope::Root];
    let domains = record.domain_names();
    scopes.extend(domains.iter().map(|d| Scope::Domain(d)));

    for scope in scopes {
        for (key, label) in TARGET_KEYS {
            let value = match record.get_in(scope, key) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => continue,
            };
            println!("  • {} {}: {}", scope.to_string().cyan(), label, value);
        }
    }
}
