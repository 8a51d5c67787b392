use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use argp::FromArgs;
use sentinel_core::{config::Config, models::ReportCategory};
use sentinel_github::GitHub;
use sentinel_jobs::{Daemon, Pipeline, Scheduler};
use sentinel_llm::{OpenAi, Synthesizer};
use sentinel_news::HackerNews;
use sentinel_store::{ArtifactStore, SubscriptionStore};
use time::{OffsetDateTime, UtcOffset};
use tokio::signal;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Periodic GitHub activity and Hacker News reports.
struct Args {
    #[argp(option, short = 'c', default = "PathBuf::from(\"config.yml\")")]
    /// configuration file
    config: PathBuf,
    #[argp(switch)]
    /// write prompts to disk instead of calling the model, and skip delivery
    dry_run: bool,
    #[argp(switch)]
    /// run every job once and exit
    once: bool,
}

fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    // Must be read before any other thread exists
    let offset = UtcOffset::current_local_offset().unwrap_or_else(|_| {
        tracing::warn!("Could not determine local UTC offset, using UTC");
        UtcOffset::UTC
    });

    let args: Args = argp::parse_args_or_exit(argp::DEFAULT);
    if let Err(e) = run(args, offset) {
        tracing::error!("{e:?}");
        std::process::exit(1);
    }
}

fn run(args: Args, offset: UtcOffset) -> Result<()> {
    let mut config = Config::load(&args.config)?;
    if args.dry_run {
        config.llm.dry_run = true;
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?;
    runtime.block_on(async {
        let pipeline = build_pipeline(&config, offset)?;
        let now = OffsetDateTime::now_utc().to_offset(offset);
        let scheduler = Scheduler::new(config.jobs.iter().cloned(), now);
        let mut daemon = Daemon::new(scheduler, pipeline, &config.scheduler, offset);
        if args.once {
            daemon.run_once().await;
        } else {
            daemon.run(shutdown_signal()).await;
        }
        tracing::info!("Shut down gracefully");
        Ok::<_, anyhow::Error>(())
    })
}

fn build_pipeline(config: &Config, offset: UtcOffset) -> Result<Pipeline> {
    let github = GitHub::new(&config.github)?;
    let news = HackerNews::new(&config.news)?;
    let backend = Arc::new(OpenAi::new(&config.openai));
    let repository_synthesizer =
        Synthesizer::from_config(ReportCategory::RepositoryActivity, &config.llm, backend.clone())?;
    let news_synthesizer =
        Synthesizer::from_config(ReportCategory::NewsDigest, &config.llm, backend)?;
    if config.llm.dry_run {
        tracing::info!("Dry run: prompts go to {}", config.llm.dry_run_path.display());
    }
    Ok(Pipeline {
        repositories: github,
        news: Arc::new(news),
        subscriptions: SubscriptionStore::open(&config.subscriptions.path),
        artifacts: ArtifactStore::new(&config.output.repository_dir, &config.output.news_dir),
        repository_synthesizer,
        news_synthesizer,
        notifier: sentinel_notify::from_config(&config.notifier)?,
        timeouts: config.timeouts,
        offset,
    })
}

async fn shutdown_signal() {
    if let Err(e) = wait_for_signal().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}
