use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jobfeed_core::{ImportMethod, PostingStatus, RunType, SourceConfig, SystemClock};
use jobfeed_storage::{HttpFetcher, IngestionStore, PgStore};
use jobfeed_sync::{
    load_source_registry, maybe_build_scheduler, register_feed, seed_sources, FeedHealthMonitor,
    JobScheduler, ReviewWorkflow, SyncConfig, SyncOrchestrator,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "jobfeed-cli")]
#[command(about = "External job ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync one source now, by id or name.
    Sync { source: String },
    /// Sync every active source that is due.
    SyncDue,
    /// Validate every RSS feed; with --enforce, deactivate failing ones.
    Health {
        #[arg(long)]
        enforce: bool,
    },
    /// Show the newest sync logs of a source.
    Logs {
        source: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// List the import queue.
    Queue {
        #[arg(long)]
        status: Option<PostingStatus>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    Approve {
        posting_id: Uuid,
        #[arg(long, default_value_t = ImportMethod::ManualReview)]
        method: ImportMethod,
    },
    Reject {
        posting_id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    AssignEmployer { posting_id: Uuid, employer_id: Uuid },
    /// Validate a feed and register it as an RSS source.
    AddFeed { name: String, url: String },
    /// Create or update sources from a YAML registry.
    SeedSources {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    Migrate,
    /// Serve the JSON API (and the scheduler when enabled).
    Serve,
    /// Run the cron scheduler until interrupted.
    Schedule,
}

struct Services {
    config: SyncConfig,
    store: Arc<PgStore>,
    http: Arc<HttpFetcher>,
}

impl Services {
    async fn connect(config: SyncConfig) -> Result<Self> {
        let store = PgStore::connect(&config.database_url)
            .await
            .context("connecting to database")?;
        let http = HttpFetcher::new(config.http_client_config()).context("building http client")?;
        Ok(Self {
            config,
            store: Arc::new(store),
            http: Arc::new(http),
        })
    }

    fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.store.clone(),
            self.store.clone(),
            self.http.clone(),
            Arc::new(SystemClock),
            &self.config,
        )
    }

    fn review(&self) -> ReviewWorkflow {
        ReviewWorkflow::new(self.store.clone(), self.store.clone(), Arc::new(SystemClock), self.config.review)
    }

    fn health(&self) -> FeedHealthMonitor {
        FeedHealthMonitor::new(self.store.clone(), self.http.clone(), self.config.health)
    }

    async fn resolve_source(&self, key: &str) -> Result<SourceConfig> {
        let found = match key.parse::<Uuid>() {
            Ok(id) => self.store.get_source(id).await?,
            Err(_) => self.store.find_source_by_name(key).await?,
        };
        match found {
            Some(source) => Ok(source),
            None => bail!("no job source matches {key:?}"),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let services = Services::connect(SyncConfig::from_env()).await?;

    match cli.command {
        Commands::Sync { source } => {
            let source = services.resolve_source(&source).await?;
            let summary = services.orchestrator().sync_source(source.id, RunType::Manual).await?;
            print_json(&summary)?;
        }
        Commands::SyncDue => {
            let report = services.orchestrator().sync_due_sources().await?;
            print_json(&report)?;
        }
        Commands::Health { enforce } => {
            let monitor = services.health();
            let report = if enforce {
                monitor.enforce().await?
            } else {
                monitor.report().await?
            };
            print_json(&report)?;
        }
        Commands::Logs { source, limit } => {
            let source = services.resolve_source(&source).await?;
            print_json(&services.store.recent_sync_logs(source.id, limit).await?)?;
        }
        Commands::Queue { status, limit } => {
            print_json(&services.review().import_queue(status, limit).await?)?;
        }
        Commands::Approve { posting_id, method } => {
            print_json(&services.review().approve(posting_id, method).await?)?;
        }
        Commands::Reject { posting_id, reason } => {
            print_json(&services.review().reject(posting_id, reason.as_deref()).await?)?;
        }
        Commands::AssignEmployer {
            posting_id,
            employer_id,
        } => {
            print_json(&services.review().assign_employer(posting_id, employer_id).await?)?;
        }
        Commands::AddFeed { name, url } => {
            let source = register_feed(services.store.as_ref(), services.http.as_ref(), &name, &url).await?;
            print_json(&source)?;
        }
        Commands::SeedSources { file } => {
            let path = file.unwrap_or_else(|| services.config.sources_file.clone());
            let registry = load_source_registry(&path).await?;
            let report = seed_sources(services.store.as_ref(), &registry).await?;
            print_json(&report)?;
        }
        Commands::Migrate => {
            services.store.migrate().await.context("applying migrations")?;
            info!("migrations applied");
        }
        Commands::Serve => {
            let sched = start_scheduler(&services).await?;
            let state = jobfeed_web::AppState::new(
                services.store.clone(),
                services.store.clone(),
                services.http.clone(),
                Arc::new(SystemClock),
                &services.config,
            );
            let served = jobfeed_web::serve(state, services.config.web_port).await;
            if let Some(mut sched) = sched {
                sched.shutdown().await.context("stopping scheduler")?;
            }
            served?;
        }
        Commands::Schedule => {
            let Some(mut sched) = start_scheduler(&services).await? else {
                bail!("scheduler disabled; set JOBFEED_SCHEDULER_ENABLED=true");
            };
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
    }

    Ok(())
}

async fn start_scheduler(services: &Services) -> Result<Option<JobScheduler>> {
    let sched = maybe_build_scheduler(
        &services.config,
        Arc::new(services.orchestrator()),
        Arc::new(services.health()),
    )
    .await?;
    if let Some(sched) = &sched {
        sched.start().await.context("starting scheduler")?;
        info!(
            sync_cron = %services.config.sync_cron,
            health_cron = %services.config.health_cron,
            "scheduler started"
        );
    }
    Ok(sched)
}
