use crate::utils::Context;
use colored::Colorize;
use siteflow_cloud::SiteError;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    let provider = ctx.connect(None).await;
    let (account, arn) = provider
        .caller_identity()
        .await
        .map_err(|e| SiteError::AuthenticationFailed(e.to_string()))?;

    println!("{} {}", "Account:".bold(), account);
    println!("{} {}", "ARN:    ".bold(), arn);
    if let Some(profile) = &ctx.profile {
        println!("{} {}", "Profile:".bold(), profile);
    }
    println!(
        "{} {}",
        "Region: ".bold(),
        provider.region().unwrap_or("(not set)")
    );
    Ok(())
}
