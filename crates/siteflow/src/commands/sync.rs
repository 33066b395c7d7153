use crate::progress::ConsoleProgress;
use crate::utils::{self, Context};
use colored::Colorize;
use siteflow_cloud::{SyncOptions, SyncReport, Workflow};

pub async fn handle(ctx: &Context, domain: Option<&str>, options: SyncOptions) -> anyhow::Result<()> {
    let status_path = ctx.existing_status_path(domain)?;
    let store = utils::load_existing(&status_path).await?;

    if !options.source.is_dir() {
        anyhow::bail!("source directory {} does not exist", options.source.display());
    }

    let provider = ctx.connect(Some(store.record())).await;
    utils::ensure_authenticated(&provider).await?;

    let heading = if options.dry_run { "Planning sync" } else { "Syncing" };
    println!(
        "{}",
        format!("{} {}", heading, options.source.display()).yellow().bold()
    );

    let progress = ConsoleProgress::new();
    let report = Workflow::new(&provider)
        .with_observer(&progress)
        .sync(store.record(), &options)
        .await?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    let plan = &report.plan;
    if report.dry_run {
        println!();
        println!("{}", format!("Bucket {} (dry run)", plan.bucket).bold());
        for upload in &plan.uploads {
            let encoding = if upload.gzip { ", gzip" } else { "" };
            println!(
                "  {} {} ({}, {} bytes{})",
                "upload".green(),
                upload.key,
                upload.reason,
                upload.size,
                encoding
            );
        }
        for key in &plan.deletes {
            println!("  {} {}", "delete".red(), key);
        }
        if !plan.is_empty() {
            println!(
                "  {} {} on {}",
                "invalidate".cyan(),
                plan.invalidation_paths.join(" "),
                plan.distribution_id
            );
        }
    }

    println!();
    println!(
        "{} {} uploaded, {} deleted, {} unchanged ({:.1}s)",
        if report.dry_run { "Would sync:".bold() } else { "Synced:".bold() },
        plan.uploads.len(),
        plan.deletes.len(),
        plan.unchanged,
        report.duration_ms as f64 / 1000.0
    );
    match &report.invalidation_id {
        Some(id) => println!("{} {}", "Invalidation:".dimmed(), id),
        None if plan.is_empty() => println!("{}", "Nothing changed; no invalidation issued".dimmed()),
        None => {}
    }
}
