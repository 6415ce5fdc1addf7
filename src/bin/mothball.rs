//! Command-line entry point for the mothball archival service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mothball::assignment::{ARCHIVED_STATUS_NAME, ASSIGNMENT_STATUS_MODEL};
use mothball::store::AssignmentStore;
use mothball::{
    ArchiveOps, ArchiveProcessor, ArchiveScheduler, BacklogAnalyzer, EmergencyCleanupOptions,
    MothballConfig, MothballError, Scheduler, SchedulerManager, SqlAssignmentStore, Status,
};

type PgStore = SqlAssignmentStore<sqlx::Postgres>;

#[derive(Parser)]
#[command(name = "mothball")]
#[command(about = "Archival service for stale influencer assignments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Path to a TOML configuration file")]
    config: Option<String>,

    #[arg(short = 'u', long, global = true, help = "Database connection URL")]
    database_url: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Only log errors")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the archive schedulers until interrupted")]
    Serve,
    #[command(about = "Run one regular archive sweep and print the report")]
    Run {
        #[arg(long, help = "Override the configured batch size")]
        batch_size: Option<u32>,
    },
    #[command(about = "Show how far behind the regular sweep has fallen")]
    Backlog,
    #[command(about = "Archive everything older than a cutoff, page by page")]
    Emergency {
        #[arg(long, help = "Archive records last contacted more than this many days ago")]
        max_age_days: u32,
        #[arg(long, help = "Page size for each archive pass")]
        batch_size: Option<u32>,
        #[arg(long, help = "Confirm the emergency cleanup")]
        confirm: bool,
        #[arg(long, help = "Dry run - show how many records would be archived")]
        dry_run: bool,
    },
    #[command(about = "Create tables and seed the archived status row")]
    Init,
    #[command(about = "Show current settings and candidate counts")]
    Status,
}

#[tokio::main]
async fn main() -> mothball::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let config = load_config(&cli)?;
    config.validate()?;

    if let Err(e) = execute_command(cli.command, &config).await {
        error!("❌ Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> mothball::Result<()> {
    let log_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    let env_filter = EnvFilter::from_default_env().add_directive(
        format!("mothball={}", log_level)
            .parse()
            .map_err(|e| MothballError::Config(format!("invalid log directive: {}", e)))?,
    );

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> mothball::Result<MothballConfig> {
    let mut config = match &cli.config {
        Some(path) => MothballConfig::from_file(path)?,
        None => MothballConfig::new(),
    };
    config.overlay_env();
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    Ok(config)
}

async fn connect_store(config: &MothballConfig) -> mothball::Result<Arc<PgStore>> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.pool_size)
        .acquire_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .connect(&config.database.url)
        .await?;
    Ok(Arc::new(SqlAssignmentStore::new(pool)))
}

async fn execute_command(command: Commands, config: &MothballConfig) -> mothball::Result<()> {
    let store = connect_store(config).await?;

    match command {
        Commands::Serve => serve(store, config).await,
        Commands::Run { batch_size } => run_once(store, config, batch_size).await,
        Commands::Backlog => print_backlog(store).await,
        Commands::Emergency {
            max_age_days,
            batch_size,
            confirm,
            dry_run,
        } => emergency(store, max_age_days, batch_size, confirm, dry_run).await,
        Commands::Init => init(store).await,
        Commands::Status => print_status(store, config).await,
    }
}

async fn serve(store: Arc<PgStore>, config: &MothballConfig) -> mothball::Result<()> {
    if config.database.create_tables {
        store.create_tables().await?;
        seed_archived_status(store.as_ref()).await?;
    }

    let scheduler = ArchiveScheduler::new(store, config.archive.clone())?;
    let manager = SchedulerManager::new();
    manager.add_scheduler(Arc::new(scheduler)).await;
    manager.start_all().await;

    info!("✅ Archive service started; waiting for Ctrl+C");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    manager.stop_all().await;
    Ok(())
}

async fn run_once(
    store: Arc<PgStore>,
    config: &MothballConfig,
    batch_size: Option<u32>,
) -> mothball::Result<()> {
    let scheduler = ArchiveScheduler::new(store, config.archive.clone())?;
    let report = scheduler.run_regular_now(batch_size).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.success {
        Ok(())
    } else {
        Err(MothballError::Archive {
            message: report.errors.join("; "),
        })
    }
}

async fn print_backlog(store: Arc<PgStore>) -> mothball::Result<()> {
    let analyzer = BacklogAnalyzer::new(store);
    let report = analyzer.analyze(Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn emergency(
    store: Arc<PgStore>,
    max_age_days: u32,
    batch_size: Option<u32>,
    confirm: bool,
    dry_run: bool,
) -> mothball::Result<()> {
    let processor = ArchiveProcessor::new(store);
    let now = Utc::now();

    if dry_run {
        let count = processor
            .finder()
            .count_older_than(now, max_age_days)
            .await?;
        println!(
            "DRY RUN: would archive {} records older than {} days",
            count, max_age_days
        );
        return Ok(());
    }

    if !confirm {
        return Err(MothballError::Archive {
            message: "emergency cleanup requires --confirm or --dry-run".to_string(),
        });
    }

    let mut options = EmergencyCleanupOptions {
        max_age_days,
        ..Default::default()
    };
    if let Some(batch) = batch_size {
        options.batch_size = batch;
    }

    let report = processor.emergency_cleanup(now, options).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.success {
        Ok(())
    } else {
        Err(MothballError::Archive {
            message: report.errors.join("; "),
        })
    }
}

async fn init(store: Arc<PgStore>) -> mothball::Result<()> {
    store.create_tables().await?;
    seed_archived_status(store.as_ref()).await?;
    info!("✅ Database initialized");
    Ok(())
}

async fn seed_archived_status(store: &impl AssignmentStore) -> mothball::Result<()> {
    let existing = store
        .resolve_status(ASSIGNMENT_STATUS_MODEL, ARCHIVED_STATUS_NAME)
        .await?;
    if existing.is_none() {
        let id = store.insert_status(Status::archived_assignment()).await?;
        info!(
            "Seeded '{}' status for model '{}' (id {})",
            ARCHIVED_STATUS_NAME, ASSIGNMENT_STATUS_MODEL, id
        );
    }
    Ok(())
}

async fn print_status(store: Arc<PgStore>, config: &MothballConfig) -> mothball::Result<()> {
    let scheduler = ArchiveScheduler::new(store.clone(), config.archive.clone())?;
    let ops = ArchiveOps::new(store, scheduler);

    let overview = ops.candidate_overview().await?;
    let jobs = ops.scheduler().job_definitions().await;
    let payload = serde_json::json!({
        "overview": overview,
        "jobs": jobs,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
