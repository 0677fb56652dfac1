use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use spiders_client::ReqwestFetcher;
use spiders_core::job::{JobStatus, WorkerConfig};
use spiders_core::job_queue::JobQueue;
use spiders_core::models::{SourceRecord, TaskStatus};
use spiders_core::rules::RuleSet;
use spiders_core::service::{ProcessorConfig, TaskService};
use spiders_core::traits::DEFAULT_PROXY_URL;
use spiders_core::worker::{TracingWorkerReporter, WorkerService};
use spiders_db::{
    Database, DatabaseConfig, NewSource, NotifyPublisher, SourceRepository, TaskJobRepository,
    TaskListener, TaskRepository,
};

type Service =
    TaskService<TaskRepository, SourceRepository, TaskJobRepository, ReqwestFetcher, NotifyPublisher>;

#[derive(Parser)]
#[command(name = "spiders", version, about = "Rule-driven web crawler")]
struct Cli {
    /// SOCKS5 proxy for sources with use_proxy
    #[arg(long, global = true, env = "SPIDERS_PROXY_URL", default_value = DEFAULT_PROXY_URL)]
    proxy_url: String,

    /// Leave task status untouched when the site answers with a non-2xx status
    #[arg(long, global = true, default_value_t = false)]
    keep_status_on_http_error: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,

    /// Register a source, or update the one with the same slug
    AddSource {
        /// Topic name for completion events
        #[arg(short, long)]
        slug: String,

        /// JSON file with the extraction rules
        #[arg(short, long)]
        rules: PathBuf,

        /// JSON file with request headers
        #[arg(long)]
        headers: Option<PathBuf>,

        /// JSON file with params (scroll, query)
        #[arg(long)]
        params: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        use_proxy: bool,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: i32,
    },

    /// Submit a URL for crawling
    Save {
        #[arg(short, long)]
        source_id: Uuid,

        #[arg(short, long)]
        url: String,

        #[arg(long)]
        parent_id: Option<Uuid>,
    },

    /// Process one task immediately, bypassing the queue
    Process {
        #[arg(short, long)]
        task_id: Uuid,
    },

    /// Print a task as JSON
    Get {
        #[arg(short, long)]
        task_id: Uuid,
    },

    /// List task ids in a status (pending, succeeded, failed, or 0/1/3)
    Scan {
        #[arg(short, long, default_value = "failed")]
        status: TaskStatus,
    },

    /// Re-submit every task in a status
    Retry {
        #[arg(short, long, default_value = "failed")]
        status: TaskStatus,
    },

    /// Run queue workers until Ctrl-C
    Worker {
        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,

        #[arg(long, default_value_t = 5)]
        poll_interval_secs: u64,
    },

    /// Print completion events for the given source slugs
    Listen {
        #[arg(required = true)]
        topics: Vec<String>,
    },

    /// Show job counts by status
    Stats,

    /// Run extraction rules against a local file, without the database
    Extract {
        /// JSON file with the extraction rules
        #[arg(short, long)]
        rules: PathBuf,

        /// Page body to extract from
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("spiders=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ProcessorConfig::default()
        .with_proxy_url(cli.proxy_url)
        .with_mark_failed_on_http_status(!cli.keep_status_on_http_error);

    match cli.command {
        Commands::Migrate => {
            connect_db().await?;
            tracing::info!("Migrations applied");
        }
        Commands::AddSource {
            slug,
            rules,
            headers,
            params,
            use_proxy,
            timeout,
        } => {
            let db = connect_db().await?;
            let mut source = NewSource::new(slug, read_json(&rules)?);
            if let Some(path) = headers {
                source.headers = read_json(&path)?;
            }
            if let Some(path) = params {
                source.params = read_json(&path)?;
            }
            source.use_proxy = use_proxy;
            source.timeout_secs = timeout;
            cmd_add_source(&db, &source).await?;
        }
        Commands::Save {
            source_id,
            url,
            parent_id,
        } => {
            let service = build_service(&connect_db().await?, config);
            let task = service.save(parent_id, source_id, &url).await?;
            println!("{}", task.id);
        }
        Commands::Process { task_id } => {
            let service = build_service(&connect_db().await?, config);
            let task = service.get(task_id).await?;
            let outcome = service.process(&task).await?;
            if let Some(next_url) = &outcome.next_url {
                tracing::info!(%next_url, "Next page queued");
            }
            println!("{}", serde_json::to_string_pretty(&outcome.extract_result)?);
        }
        Commands::Get { task_id } => {
            let service = build_service(&connect_db().await?, config);
            let task = service.find(task_id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Commands::Scan { status } => {
            let service = build_service(&connect_db().await?, config);
            for id in service.scan(status).await? {
                println!("{id}");
            }
        }
        Commands::Retry { status } => {
            let service = build_service(&connect_db().await?, config);
            cmd_retry(&service, status).await?;
        }
        Commands::Worker {
            concurrency,
            poll_interval_secs,
        } => {
            let service = build_service(&connect_db().await?, config);
            cmd_worker(service, concurrency, Duration::from_secs(poll_interval_secs)).await?;
        }
        Commands::Listen { topics } => {
            let db = connect_db().await?;
            cmd_listen(&db, &topics).await?;
        }
        Commands::Stats => {
            let db = connect_db().await?;
            cmd_stats(&db.job_repo()).await?;
        }
        Commands::Extract { rules, input } => {
            let rules = RuleSet::from_value(&read_json(&rules)?);
            let body = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read input file: {}", input.display()))?;
            let fields = spiders_core::extract(&rules, &body)?;
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using the `DATABASE_*` environment and migrate.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db)
}

fn build_service(db: &Database, config: ProcessorConfig) -> Service {
    TaskService::new(
        db.task_repo(),
        db.source_repo(),
        db.job_repo(),
        ReqwestFetcher::new(),
        db.publisher(),
    )
    .with_config(config)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

async fn cmd_add_source(db: &Database, source: &NewSource) -> Result<()> {
    let record: SourceRecord = db.source_repo().save(source).await?;
    let rules = RuleSet::from_value(&record.extract_rules);
    tracing::info!(source_id = %record.id, slug = %record.slug, rules = rules.len(), "Source saved");
    println!("{}", record.id);
    Ok(())
}

async fn cmd_retry(service: &Service, status: TaskStatus) -> Result<()> {
    let ids = service.scan(status).await?;
    let total = ids.len();
    let mut resubmitted = 0;

    for id in ids {
        let task = match service.get(id).await {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "Skipping task");
                continue;
            }
        };
        service.save(task.parent_id, task.source_id, &task.url).await?;
        resubmitted += 1;
    }

    tracing::info!(%status, resubmitted, total, "Retry complete");
    Ok(())
}

async fn cmd_worker(service: Service, concurrency: usize, poll_interval: Duration) -> Result<()> {
    let cancel_token = CancellationToken::new();
    let base = WorkerConfig::default().with_poll_interval(poll_interval);

    let mut handles = Vec::with_capacity(concurrency);
    for i in 0..concurrency.max(1) {
        let config = base
            .clone()
            .with_worker_id(format!("{}-{i}", base.worker_id));
        let worker = WorkerService::new(service.clone(), config);
        let token = cancel_token.clone();
        handles.push(tokio::spawn(async move {
            worker.run(token, &TracingWorkerReporter).await
        }));
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutdown signal received");
    cancel_token.cancel();

    for handle in handles {
        handle.await.context("Worker task panicked")??;
    }
    Ok(())
}

async fn cmd_listen(db: &Database, topics: &[String]) -> Result<()> {
    let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
    let mut listener = TaskListener::connect(db.pool(), &topics).await?;
    let tasks = db.task_repo();

    loop {
        tokio::select! {
            event = listener.recv() => {
                let event = event?;
                let task = spiders_core::traits::TaskStore::get(&tasks, event.task_id).await?;
                let line = serde_json::json!({
                    "topic": event.topic,
                    "task_id": event.task_id,
                    "extract_result": task.map(|t| t.extract_result),
                });
                println!("{line}");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn cmd_stats(queue: &TaskJobRepository) -> Result<()> {
    let queue_name = WorkerConfig::default().queue;
    println!("Queue '{queue_name}':");
    for status in JobStatus::ALL {
        let count = queue.count_by_status(&queue_name, status).await?;
        println!("  {:<10} {count}", status.as_str());
    }
    Ok(())
}
