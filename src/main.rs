//! rondo - a minimal cooperative job scheduler.
//!
//! Usage:
//!   rondo run       Run the bundled demo workload set until drained or interrupted
//!   rondo pending   List jobs waiting in the queue snapshot

use clap::{Parser, Subcommand};
use rondo::{
    Event, EventBus, EventHandler, Job, SchedulerConfig, Scheduler, SnapshotStore, StepHandle,
    WorkError, Workload, install_stop_handler, suspend,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// rondo - a minimal cooperative job scheduler
#[derive(Parser)]
#[command(name = "rondo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo workload set until the queue drains or Ctrl+C
    Run {
        /// Path to a YAML configuration file
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Override the snapshot file location
        #[arg(long, value_name = "PATH")]
        snapshot: Option<PathBuf>,
    },

    /// List jobs waiting in the queue snapshot
    Pending {
        /// Path to a YAML configuration file
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Override the snapshot file location
        #[arg(long, value_name = "PATH")]
        snapshot: Option<PathBuf>,
    },
}

/// Simple logging event handler that prints job transitions.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::JobStarted { job_id, .. } => {
                info!("Job '{}' started", job_id);
            }
            Event::JobCompleted {
                job_id, duration, ..
            } => {
                info!("Job '{}' completed in {:?}", job_id, duration);
            }
            Event::JobRetrying {
                job_id,
                error,
                retries_remaining,
                ..
            } => {
                warn!(
                    "Job '{}' failed ({}), {} retr{} left",
                    job_id,
                    error,
                    retries_remaining,
                    if *retries_remaining == 1 { "y" } else { "ies" }
                );
            }
            Event::JobFailed { job_id, error, .. } => {
                error!("Job '{}' failed permanently: {}", job_id, error);
            }
            Event::JobTimedOut {
                job_id,
                budget,
                elapsed,
                ..
            } => {
                warn!(
                    "Job '{}' exceeded its {:?} budget after {:?}, abandoned",
                    job_id, budget, elapsed
                );
            }
            Event::JobDeferred { job_id, .. } => {
                info!("Job '{}' deferred to the snapshot for the next run", job_id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Demo workloads
// ---------------------------------------------------------------------------

/// Creates the scratch directory the other demo jobs work in.
struct MakeWorkspace {
    dir: PathBuf,
}

impl Workload for MakeWorkspace {
    fn name(&self) -> &str {
        "make_workspace"
    }

    fn start(&self) -> StepHandle {
        let dir = self.dir.clone();
        Box::pin(async move {
            info!("creating workspace {}", dir.display());
            suspend().await;
            tokio::fs::create_dir_all(&dir).await?;
            info!("workspace ready");
            Ok(())
        })
    }
}

/// Fetches a page over HTTP and writes it into the workspace.
struct FetchPage {
    url: String,
    dest: PathBuf,
}

impl Workload for FetchPage {
    fn name(&self) -> &str {
        "fetch_page"
    }

    fn start(&self) -> StepHandle {
        let url = self.url.clone();
        let dest = self.dest.clone();
        Box::pin(async move {
            info!("fetching {}", url);
            suspend().await;
            let body = reqwest::get(&url)
                .await
                .map_err(|e| WorkError::Http(e.to_string()))?
                .text()
                .await
                .map_err(|e| WorkError::Http(e.to_string()))?;
            suspend().await;
            tokio::fs::write(&dest, body).await?;
            info!("saved response to {}", dest.display());
            Ok(())
        })
    }
}

/// Removes the workspace once the page has been saved.
struct CleanWorkspace {
    dir: PathBuf,
}

impl Workload for CleanWorkspace {
    fn name(&self) -> &str {
        "clean_workspace"
    }

    fn start(&self) -> StepHandle {
        let dir = self.dir.clone();
        Box::pin(async move {
            info!("removing workspace {}", dir.display());
            suspend().await;
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            info!("workspace removed");
            Ok(())
        })
    }
}

/// A deliberately overlong job: its first step blocks past any reasonable
/// working-time budget, so the scheduler abandons it at the next boundary.
struct SlowReport;

impl Workload for SlowReport {
    fn name(&self) -> &str {
        "slow_report"
    }

    fn start(&self) -> StepHandle {
        Box::pin(async {
            info!("compiling report");
            std::thread::sleep(Duration::from_secs(3));
            suspend().await;
            info!("still alive");
            suspend().await;
            info!("report done");
            Ok(())
        })
    }
}

/// A job whose body raises on its first step, exercising the retry path.
struct BrokenJob;

impl Workload for BrokenJob {
    fn name(&self) -> &str {
        "broken_job"
    }

    fn start(&self) -> StepHandle {
        Box::pin(async {
            info!("starting broken job");
            Err(WorkError::ExecutionFailed("invalid input".into()))
        })
    }
}

// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, snapshot } => {
            run_demo(load_config(config)?, snapshot).await?;
        }
        Commands::Pending { config, snapshot } => {
            list_pending(load_config(config)?, snapshot)?;
        }
    }

    Ok(())
}

/// Load configuration from a file, or fall back to defaults.
fn load_config(path: Option<PathBuf>) -> Result<SchedulerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(SchedulerConfig::load(&path)?),
        None => Ok(SchedulerConfig::default()),
    }
}

fn snapshot_store(config: &SchedulerConfig, path_override: Option<PathBuf>) -> SnapshotStore {
    SnapshotStore::new(path_override.unwrap_or_else(|| config.snapshot_path.clone()))
}

/// Run the demo workload set.
async fn run_demo(
    config: SchedulerConfig,
    snapshot: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = snapshot_store(&config, snapshot);
    info!("snapshot file: {}", store.path().display());

    let event_bus = EventBus::new();
    event_bus.register(Arc::new(LoggingHandler)).await;

    let mut scheduler = Scheduler::new(store).with_event_bus(event_bus);

    let workspace = PathBuf::from("tmp");
    let make_workspace = Arc::new(MakeWorkspace {
        dir: workspace.clone(),
    });
    let fetch_page = Arc::new(FetchPage {
        url: "https://example.com".to_string(),
        dest: workspace.join("response.txt"),
    });
    let clean_workspace = Arc::new(CleanWorkspace { dir: workspace });
    let slow_report = Arc::new(SlowReport);
    let broken_job = Arc::new(BrokenJob);

    scheduler.register_workload(make_workspace.clone());
    scheduler.register_workload(fetch_page.clone());
    scheduler.register_workload(clean_workspace.clone());
    scheduler.register_workload(slow_report.clone());
    scheduler.register_workload(broken_job.clone());

    // Pick up anything the previous process left behind, before new work.
    let recovered = scheduler.recover()?;
    if recovered > 0 {
        info!("recovered {} pending job(s) from snapshot", recovered);
    }

    let budget = config.default_max_working_time();

    // The job the others depend on is submitted last; they wait their turn.
    scheduler.add_job(
        Job::new(clean_workspace)
            .with_dependencies(["make_workspace", "fetch_page"])
            .with_max_working_time(budget),
    );
    scheduler.add_job(
        Job::new(fetch_page)
            .depends_on("make_workspace")
            .with_max_working_time(budget),
    );
    scheduler.add_job(
        Job::new(slow_report)
            .with_start_delay(Duration::from_secs(5))
            .with_max_working_time(budget),
    );
    scheduler.add_job(Job::new(make_workspace).with_max_working_time(budget));
    scheduler.add_job(
        Job::new(broken_job)
            .with_retries(2)
            .with_max_working_time(budget),
    );

    info!("starting scheduler, press Ctrl+C to stop");
    let stop = install_stop_handler();
    scheduler.run_until_stopped(&stop).await?;

    info!(
        "done: {} job(s) completed, {} deferred",
        scheduler.completed().len(),
        scheduler.deferred()
    );
    Ok(())
}

/// List the jobs waiting in the snapshot file.
fn list_pending(
    config: SchedulerConfig,
    snapshot: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = snapshot_store(&config, snapshot);
    let descriptors = store.load()?;

    if descriptors.is_empty() {
        println!("No pending jobs in {}", store.path().display());
        return Ok(());
    }

    println!("Pending jobs in {}:", store.path().display());
    println!();

    for descriptor in &descriptors {
        println!("ID: {}", descriptor.id);
        println!("  Workload: {}", descriptor.workload);
        if !descriptor.dependencies.is_empty() {
            let deps: Vec<&str> = descriptor
                .dependencies
                .iter()
                .map(|d| d.as_str())
                .collect();
            println!("  Depends on: {}", deps.join(", "));
        }
        println!("  Retries remaining: {}", descriptor.retries_remaining);
        println!("  Budget: {:?}", descriptor.max_working_time);
        println!("  Not before: {}", descriptor.start_at);
        println!();
    }

    Ok(())
}
