use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleetops::orchestrator::ScriptCatalog;
use fleetops::{
    BackgroundTasks, FleetConfig, FleetDb, FleetError, FleetServices, FleetStore,
    FsArtifactStore, MemoryStore, StoreBackend, SystemClock,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "fleetd")]
#[command(about = "Patch and reboot orchestration daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file (default: .fleet/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the completion monitor and the schedule driver (default)
    Run,
    /// Create tables and seed the OS type map, then exit
    InitDb,
    /// Print the resolved configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fleetd: {e:#}");
            let code = e
                .downcast_ref::<FleetError>()
                .map_or(1, FleetError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = FleetConfig::load(cli.config).await?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            print_config(&config);
            Ok(())
        }
        Commands::InitDb => {
            let store = open_store(&config).await?;
            let seeded = ScriptCatalog::new(store, Arc::new(SystemClock))
                .seed_default_os_types()
                .await?;
            println!("Schema ready, {seeded} OS type mappings seeded");
            Ok(())
        }
        Commands::Run => serve(&config).await,
    }
}

async fn serve(config: &FleetConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    tokio::fs::create_dir_all(&config.artifact_dir)
        .await
        .with_context(|| format!("creating {}", config.artifact_dir.display()))?;

    let services = FleetServices::new(
        store,
        Arc::new(SystemClock),
        Arc::new(FsArtifactStore::new(&config.artifact_dir)),
        config.default_reboot_timeout_secs,
    );
    let seeded = services.scripts.seed_default_os_types().await?;
    info!(seeded, "OS type map ready");

    let tasks = BackgroundTasks::spawn(
        &services,
        config.monitor_interval,
        config.schedule_tick_interval,
    );
    info!(
        monitor_secs = config.monitor_interval.as_secs(),
        tick_secs = config.schedule_tick_interval.as_secs(),
        "fleetd running, waiting for ctrl-c"
    );

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl-c")?;
    info!("Shutdown requested");

    if let Err(e) = tasks.shutdown(SHUTDOWN_GRACE).await {
        warn!(error = %e, "Background tasks did not stop cleanly");
    }
    info!("fleetd stopped");
    Ok(())
}

async fn open_store(config: &FleetConfig) -> anyhow::Result<Arc<dyn FleetStore>> {
    match &config.store {
        StoreBackend::Memory => {
            warn!("Using in-memory store; state is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres(url) => {
            let db = FleetDb::connect(url, config.db_max_connections).await?;
            db.initialize_schema().await?;
            Ok(Arc::new(db))
        }
    }
}

fn print_config(config: &FleetConfig) {
    let store = match &config.store {
        StoreBackend::Memory => "memory".to_string(),
        StoreBackend::Postgres(url) => redact_password(url),
    };
    println!("store                  {store}");
    println!("monitor_interval_secs  {}", config.monitor_interval.as_secs());
    println!("schedule_tick_secs     {}", config.schedule_tick_interval.as_secs());
    println!("reboot_timeout_secs    {}", config.default_reboot_timeout_secs);
    println!("artifact_dir           {}", config.artifact_dir.display());
    println!("db_max_connections     {}", config.db_max_connections);
}

fn redact_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("***")).is_ok() {
                parsed.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}
