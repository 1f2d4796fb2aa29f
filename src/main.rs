use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use cloud_migrate::assets::FsProbe;
use cloud_migrate::config::MigratorConfig;
use cloud_migrate::migrate::{migrate_logos, migrate_prompts, migrate_workspaces, RunContext};
use cloud_migrate::report::{MigrationSummary, TracingReporter};
use cloud_migrate::store::{RemoteStore, RestStore};

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    /// YAML file layered over environment configuration
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate workspaces with their projects and export profiles
    Workspaces {
        /// Normalize and preview without writing anything
        #[clap(long)]
        dry_run: bool,
        #[clap(short, long, alias = "path")]
        file: Option<PathBuf>,
    },
    /// Migrate prompt templates
    Prompts {
        #[clap(long)]
        dry_run: bool,
        #[clap(short, long, alias = "path")]
        file: Option<PathBuf>,
    },
    /// Upload PDF logos found under a directory
    Logos {
        #[clap(long)]
        dry_run: bool,
        #[clap(short, long)]
        dir: Option<PathBuf>,
    },
}

impl Commands {
    fn dry_run(&self) -> bool {
        match self {
            Commands::Workspaces { dry_run, .. }
            | Commands::Prompts { dry_run, .. }
            | Commands::Logos { dry_run, .. } => *dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    let config = MigratorConfig::load(args.config.as_deref())?;
    let dry_run = args.command.dry_run();

    // dry runs never build a client
    let store = if dry_run {
        None
    } else {
        let (url, key) = config.store_credentials()?;
        debug!("Using remote store at {}", url);
        Some(RestStore::new(url, &key, config.request_timeout)?)
    };

    let reporter = TracingReporter;
    let run = RunContext {
        config: &config,
        store: store.as_ref().map(|store| store as &dyn RemoteStore),
        reporter: &reporter,
        probe: &FsProbe,
        dry_run,
        now: Utc::now(),
    };

    let (label, summary) = match &args.command {
        Commands::Workspaces { file, .. } => {
            let path = file
                .clone()
                .or_else(|| config.workspaces_file.clone())
                .context("no workspaces file given (--file or CLOUD_MIGRATE_WORKSPACES_FILE)")?;
            ("workspaces", migrate_workspaces(&path, &run).await?)
        }
        Commands::Prompts { file, .. } => {
            let path = file
                .clone()
                .or_else(|| config.prompts_file.clone())
                .context("no prompts file given (--file or CLOUD_MIGRATE_PROMPTS_FILE)")?;
            ("prompts", migrate_prompts(&path, &run).await?)
        }
        Commands::Logos { dir, .. } => {
            let dir = dir
                .clone()
                .or_else(|| config.logos_dir.clone())
                .context("no logo directory given (--dir or CLOUD_MIGRATE_LOGOS_DIR)")?;
            ("logos", migrate_logos(&dir, &run).await?)
        }
    };

    print_summary(label, &summary);
    if summary.has_failures() {
        bail!("{} {} failed to migrate", summary.failures.len(), label);
    }
    Ok(())
}

fn print_summary(label: &str, summary: &MigrationSummary) {
    if summary.dry_run {
        println!(
            "{} {} {} normalized, nothing written",
            "dry run:".cyan().bold(),
            summary.total,
            label
        );
        return;
    }
    let line = format!("{}/{} {} committed", summary.committed, summary.total, label);
    let line = if summary.children_total > 0 {
        format!(
            "{} ({}/{} profiles)",
            line, summary.children_committed, summary.children_total
        )
    } else {
        line
    };
    if summary.has_failures() {
        println!("{}", line.red().bold());
    } else {
        println!("{}", line.green().bold());
    }
    if let Some(path) = &summary.manifest_path {
        println!("deferred assets: {}", path.display().to_string().yellow());
    }
}

/// Default filter for `--log-level`; HTTP client internals stay at `warn`.
fn default_directive(log_level: &Option<String>) -> String {
    let level = match log_level
        .as_deref()
        .unwrap_or("info")
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    format!("reqwest=warn,hyper=warn,{}", level)
}

fn setup_logging(log_level: &Option<String>) {
    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .init();
}
