use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use engine_webflow_sync::config::{self, Config};
use engine_webflow_sync::monitor::check_health;
use engine_webflow_sync::source::EngineClient;
use engine_webflow_sync::webflow::WebflowClient;
use engine_webflow_sync::{load_articles, MigrationOptions, Reconciler, RunAborted, RunSummary};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Exit non-zero when a completed run recorded per-article errors
    #[arg(long)]
    fail_on_errors: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync the most recently edited articles
    Sync {
        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u16).range(1..=100))]
        count: u16,
    },
    /// Sync every article of every category
    FullSync,
    /// Sync one article by source key
    SyncArticle {
        #[arg(long)]
        post_id: String,
    },
    /// Archive stale articles
    Archive {
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=3650))]
        days: Option<u32>,
    },
    /// Permanently delete aged articles
    Delete {
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=3650))]
        days: Option<u32>,
    },
    /// Bulk-migrate articles from a JSON export
    Migrate {
        #[arg(long, default_value = "migrate/export.json")]
        file: PathBuf,
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long)]
        progress_every: Option<usize>,
        /// Skip articles that already exist instead of updating them
        #[arg(long)]
        create_only: bool,
    },
    /// Sync a local JSON file using per-article lookups
    TestSync {
        #[arg(long, default_value = "local/test.json")]
        file: PathBuf,
    },
    /// Probe both APIs
    Health,
}

fn clients(cfg: &Config) -> Result<(Arc<EngineClient>, Arc<WebflowClient>)> {
    let source = EngineClient::from_config(cfg)?;
    let cms = WebflowClient::from_config(cfg)?;
    Ok((Arc::new(source), Arc::new(cms)))
}

fn report(outcome: Result<RunSummary, RunAborted>, fail_on_errors: bool) -> Result<ExitCode> {
    match outcome {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if fail_on_errors && summary.has_errors() {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(aborted) => {
            error!(err = %aborted, "run aborted");
            println!("{}", serde_json::to_string_pretty(&aborted.summary)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let (source, cms) = clients(&cfg)?;

    info!(command = ?args.command, "starting");
    let engine = || Reconciler::new(source.clone(), cms.clone(), &cfg);
    let outcome = match args.command {
        Command::Health => {
            let report =
                check_health(source.as_ref(), cms.as_ref(), &cfg.webflow.collections.articles)
                    .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(if report.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        Command::Sync { count } => engine().run_sync(usize::from(count)).await,
        Command::FullSync => engine().run_full_sync().await,
        Command::SyncArticle { post_id } => engine().sync_article(&post_id).await,
        Command::Archive { days } => {
            engine()
                .run_archive(days.unwrap_or(cfg.archive.days_threshold))
                .await
        }
        Command::Delete { days } => {
            engine()
                .run_delete(days.unwrap_or(cfg.delete.days_threshold))
                .await
        }
        Command::Migrate {
            file,
            delay_ms,
            progress_every,
            create_only,
        } => {
            let articles = load_articles(&file).await?;
            let mut opts = MigrationOptions::from_config(&cfg);
            if let Some(ms) = delay_ms {
                opts.delay = Duration::from_millis(ms);
            }
            if let Some(every) = progress_every {
                opts.progress_every = every;
            }
            opts.create_only = create_only;
            engine().run_migration(articles, opts).await
        }
        Command::TestSync { file } => {
            let articles = load_articles(&file).await?;
            engine().run_test_sync(articles).await
        }
    };
    report(outcome, args.fail_on_errors)
}
