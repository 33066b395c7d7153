use crate::utils::{self, Context};
use colored::{ColoredString, Colorize};
use siteflow_cloud::{DeploymentRecord, Scope, Step, StepStatus, keys};

/// Identity fields shown first, in this order
const IDENTITY_KEYS: [&str; 8] = [
    keys::KIND,
    keys::DOMAIN,
    keys::ALTERNATE_NAMES,
    keys::SOURCE_DOMAINS,
    keys::TARGET_DOMAIN,
    keys::REGION,
    keys::CREATED_AT,
    keys::LAST_VERIFIED_AT,
];

const FLAG_SUFFIXES: [&str; 6] = [
    "_completed",
    "_completed_at",
    "_pending",
    "_pending_at",
    "_removed",
    "_removed_at",
];

pub async fn handle(ctx: &Context, domain: Option<&str>) -> anyhow::Result<()> {
    let status_path = ctx.existing_status_path(domain)?;
    let store = utils::load_existing(&status_path).await?;
    let record = store.record();

    println!("{} {}", "Status file:".bold(), status_path.display());
    println!();
    for key in IDENTITY_KEYS {
        if let Some(value) = render(record, Scope::Root, key) {
            println!("  {:<22} {}", key.dimmed(), value);
        }
    }
    if let Some(at) = record.get_str(keys::TEARDOWN_COMPLETED_AT) {
        println!("  {:<22} {}", keys::TEARDOWN_COMPLETED_AT.dimmed(), at.red());
    }

    let is_redirect = record.get_str(keys::KIND) == Some(keys::KIND_REDIRECT);
    let root_steps: &[Step] = if is_redirect {
        &[Step::HostedZone, Step::CertificateIssue]
    } else {
        &Step::SITE
    };
    print_scope(record, Scope::Root, root_steps);

    for name in record.domain_names() {
        print_scope(record, Scope::Domain(&name), &Step::REDIRECT_DOMAIN);
    }
    Ok(())
}

fn print_scope(record: &DeploymentRecord, scope: Scope<'_>, steps: &[Step]) {
    println!();
    println!("{}", scope.to_string().cyan().bold());

    for step in steps {
        let status = record.step_status(scope, *step);
        let at = record.step_timestamp(scope, *step).unwrap_or("");
        println!("  {:<24} {:<12} {}", step.as_str(), badge(status), at.dimmed());
    }

    let outputs = output_keys(record, scope);
    if !outputs.is_empty() {
        println!("  {}", "outputs".dimmed());
        for key in outputs {
            if let Some(value) = render(record, scope, &key) {
                println!("    {:<24} {}", key, value);
            }
        }
    }
}

fn badge(status: StepStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        StepStatus::Completed => text.green(),
        StepStatus::Pending => text.yellow(),
        StepStatus::Removed => text.red(),
        StepStatus::NotStarted => text.dimmed(),
    }
}

/// Captured resource identifiers: everything that is not identity or a step flag
fn output_keys(record: &DeploymentRecord, scope: Scope<'_>) -> Vec<String> {
    let names: Vec<String> = match scope {
        Scope::Root => record.keys().cloned().collect(),
        Scope::Domain(d) => record
            .domain(d)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default(),
    };
    names
        .into_iter()
        .filter(|k| !FLAG_SUFFIXES.iter().any(|s| k.ends_with(s)))
        .filter(|k| !IDENTITY_KEYS.contains(&k.as_str()))
        .filter(|k| k != "domains" && k != keys::TEARDOWN_COMPLETED_AT)
        .collect()
}

fn render(record: &DeploymentRecord, scope: Scope<'_>, key: &str) -> Option<String> {
    match record.get_in(scope, key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
