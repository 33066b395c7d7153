mod commands;
mod progress;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use siteflow_cloud::{RedirectProtocol, RedirectType};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "siteflow")]
#[command(about = "Static sites and domain redirects on S3 + CloudFront, resumable at every step", long_about = None)]
struct Cli {
    /// AWS profile to use
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// AWS region for buckets (certificates always live in us-east-1)
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Status file to read and write instead of the default location
    #[arg(long, global = true, env = "SITEFLOW_STATUS_FILE")]
    status_file: Option<PathBuf>,

    /// Skip confirmation prompts
    #[arg(short, long, global = true)]
    yes: bool,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a static site: bucket, certificate, distribution and DNS
    Site {
        /// Primary domain
        #[arg(long)]
        domain: String,
        /// Additional name served by the same distribution (repeatable)
        #[arg(long = "alt-name")]
        alt_names: Vec<String>,
        /// Do not create AAAA records or enable IPv6 on the distribution
        #[arg(long)]
        no_ipv6: bool,
        /// Skip the HTTPS check after deployment
        #[arg(long)]
        skip_verify: bool,
    },
    /// Redirect one or more domains to a target domain
    Redirect {
        /// Domain to redirect (repeatable)
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
        /// Domain to redirect to
        #[arg(long)]
        target: String,
        #[arg(long, value_enum, default_value_t = RedirectKind::Permanent)]
        redirect_type: RedirectKind,
        /// Send every request to this path instead of keeping the request path
        #[arg(long)]
        redirect_path: Option<String>,
        #[arg(long, value_enum, default_value_t = Scheme::Https)]
        protocol: Scheme,
        #[arg(long)]
        no_ipv6: bool,
        #[arg(long)]
        skip_verify: bool,
    },
    /// Upload a local directory to a provisioned site and invalidate the cache
    Sync {
        /// Site domain (selects `<status_dir>/<domain>.json`)
        #[arg(long)]
        domain: Option<String>,
        /// Directory to upload
        #[arg(long)]
        source: PathBuf,
        /// Path pattern to invalidate (repeatable, default `/*`)
        #[arg(long)]
        invalidate: Vec<String>,
        /// Gzip text-like files before upload
        #[arg(long)]
        gzip: bool,
        /// Glob of files to leave out (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
        /// Keep remote objects that no longer exist locally
        #[arg(long)]
        no_delete: bool,
        /// Print the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete everything a status file records
    Teardown {
        /// Site domain (selects `<status_dir>/<domain>.json`)
        #[arg(long)]
        domain: Option<String>,
    },
    /// Show what a status file records
    Status {
        /// Site domain (selects `<status_dir>/<domain>.json`)
        #[arg(long)]
        domain: Option<String>,
    },
    /// Show the AWS account and identity in use
    Whoami,
    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum RedirectKind {
    /// 301
    Permanent,
    /// 302
    Temporary,
}

impl From<RedirectKind> for RedirectType {
    fn from(kind: RedirectKind) -> Self {
        match kind {
            RedirectKind::Permanent => RedirectType::Permanent,
            RedirectKind::Temporary => RedirectType::Temporary,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Scheme {
    Https,
    Http,
}

impl From<Scheme> for RedirectProtocol {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Https => RedirectProtocol::Https,
            Scheme::Http => RedirectProtocol::Http,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Usage errors and --help both exit 1 so scripts never mistake them for a deploy
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "✗".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
        std::process::exit(1);
    }
}

fn print_version() {
    println!("siteflow {}", env!("CARGO_PKG_VERSION"));
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Version needs neither settings nor credentials
    if matches!(cli.command, Commands::Version) {
        print_version();
        return Ok(());
    }

    let ctx = utils::Context::new(cli.profile, cli.region, cli.status_file, cli.yes)?;

    match cli.command {
        Commands::Site {
            domain,
            alt_names,
            no_ipv6,
            skip_verify,
        } => commands::site::handle(&ctx, domain, alt_names, !no_ipv6, !skip_verify).await,
        Commands::Redirect {
            sources,
            target,
            redirect_type,
            redirect_path,
            protocol,
            no_ipv6,
            skip_verify,
        } => {
            let args = commands::redirect::RedirectArgs {
                sources,
                target,
                redirect_type: redirect_type.into(),
                redirect_path,
                protocol: protocol.into(),
                ipv6: !no_ipv6,
                verify: !skip_verify,
            };
            commands::redirect::handle(&ctx, args).await
        }
        Commands::Sync {
            domain,
            source,
            invalidate,
            gzip,
            exclude,
            no_delete,
            dry_run,
        } => {
            let mut options = siteflow_cloud::SyncOptions::new(source);
            options.invalidate = invalidate;
            options.gzip = gzip;
            options.exclude = exclude;
            options.delete = !no_delete;
            options.dry_run = dry_run;
            commands::sync::handle(&ctx, domain.as_deref(), options).await
        }
        Commands::Teardown { domain } => commands::teardown::handle(&ctx, domain.as_deref()).await,
        Commands::Status { domain } => commands::status::handle(&ctx, domain.as_deref()).await,
        Commands::Whoami => commands::whoami::handle(&ctx).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}
