mod cli;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tether_core::{ShortCode, ShortenParams, Shortener};
use tether_generator::{AlphabeticGenerator, Generator};
use tether_shortener::{DeletionSettings, ShortenerService};
use tether_storage::{FileRepository, MemoryRepository, MySqlRepository, Repository, TimeoutRepository};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{Command, StorageBackendArg, CLI};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_json);

    info!(storage_backend = %config.storage, "starting tether");

    let store_timeout = Duration::from_millis(config.store_timeout_ms);
    match config.storage {
        StorageBackendArg::Memory => {
            run(TimeoutRepository::new(MemoryRepository::new(), store_timeout), &config).await
        }
        StorageBackendArg::File => {
            let path = config
                .file_path
                .as_deref()
                .context("file path is required when storage backend is file")?;
            let repository = FileRepository::open(path)
                .await
                .with_context(|| format!("failed to open url log at {}", path.display()))?;
            run(TimeoutRepository::new(repository, store_timeout), &config).await
        }
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let repository = MySqlRepository::connect(mysql_dsn)
                .await
                .context("failed to connect to mysql")?;
            repository
                .ensure_schema()
                .await
                .context("failed to create short_urls table")?;
            run(TimeoutRepository::new(repository, store_timeout), &config).await
        }
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Seeds the registry, runs one command and drains pending deletions.
async fn run<R: Repository>(repository: R, config: &CLI) -> anyhow::Result<()> {
    let settings = DeletionSettings::builder()
        .batch_size(config.delete_batch_size)
        .debounce(Duration::from_millis(config.delete_debounce_ms))
        .queue_capacity(config.delete_queue_capacity)
        .build();

    let service = ShortenerService::bootstrap(repository, AlphabeticGenerator::default(), settings)
        .await
        .context("failed to seed url registry")?;

    let outcome = execute(&service, &config.command, &config.base_url).await;

    let deadline = Duration::from_secs(config.shutdown_timeout_secs);
    if !service.shutdown(deadline).await {
        warn!(
            pending = service.pending_deletions(),
            "shutdown deadline passed before deletions were flushed"
        );
    }

    outcome
}

async fn execute<R: Repository, G: Generator>(
    service: &ShortenerService<R, G>,
    command: &Command,
    base_url: &str,
) -> anyhow::Result<()> {
    match command {
        Command::Shorten { url, owner, seed } => {
            let shortened = service
                .shorten(ShortenParams {
                    original_url: url.clone(),
                    owner_id: *owner,
                    seed: *seed,
                })
                .await?;
            let status = if shortened.is_conflict() {
                "existing"
            } else {
                "created"
            };
            println!("{}\t{}", shortened.code.to_url(base_url), status);
        }
        Command::Batch { items, owner, seed } => {
            let results = service.shorten_batch(items.clone(), *owner, *seed).await?;
            for result in results {
                println!("{}\t{}", result.correlation_id, result.code.to_url(base_url));
            }
        }
        Command::Resolve { code } => {
            let code: ShortCode = code.parse()?;
            println!("{}", service.resolve(&code).await?);
        }
        Command::Delete { codes, owner } => {
            let codes = codes
                .iter()
                .map(|code| code.parse::<ShortCode>())
                .collect::<Result<Vec<_>, _>>()?;
            let count = codes.len();
            service.delete_user_urls(codes, *owner).await;
            println!("queued {count} deletion(s)");
        }
        Command::List { owner } => {
            for record in service.user_urls(*owner).await? {
                println!("{}\t{}", record.code.to_url(base_url), record.original_url);
            }
        }
        Command::Stats => {
            let stats = service.stats().await?;
            println!("urls\t{}\nowners\t{}", stats.urls, stats.owners);
        }
        Command::Ping => {
            service.ping().await?;
            println!("ok");
        }
    }

    Ok(())
}
