use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::shared::{
    Config, MemoryService, PruneReport, SyncReport, SyncStatus, connect_store, memory_store,
};

#[derive(Parser)]
#[command(name = "memory-sync")]
#[command(about = "Sync project files and conversation memory into a vector store")]
pub struct Cli {
    /// Increase log verbosity (-v warn, -vv info, -vvv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Keep everything in process memory instead of the configured store
    #[arg(long, global = true)]
    pub memory_store: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index text files under a directory
    Index {
        path: PathBuf,
        /// Tag stamped on every new or changed file
        #[arg(long)]
        tag: Option<String>,
    },
    /// Re-sync files modified since the last run
    Update { path: PathBuf },
    /// Remove records of files deleted from disk
    Prune { path: PathBuf },
    /// Show message and file counts
    Stats,
    /// Run the HTTP API until interrupted
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current file");
            token.cancel();
        }
    });
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let store = if cli.memory_store {
        memory_store()
    } else {
        connect_store(&config).await?
    };
    let service = Arc::new(MemoryService::new(&config, store));

    let result = run_command(&service, &config, cli.command).await;
    service.shutdown().await;
    result
}

async fn run_command(
    service: &Arc<MemoryService>,
    config: &Config,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Index { path, tag } => {
            let token = service.run_token();
            cancel_on_ctrl_c(token.clone());
            let report = service.projects.index_project(&path, tag, &token).await?;
            print_sync_report(&report)
        }
        Commands::Update { path } => {
            let token = service.run_token();
            cancel_on_ctrl_c(token.clone());
            let report = service.projects.update_project(&path, &token).await?;
            print_sync_report(&report)
        }
        Commands::Prune { path } => {
            let report = service.projects.prune_missing(&path).await?;
            print_prune_report(&report);
            Ok(())
        }
        Commands::Stats => {
            let stats = service.stats().await?;
            println!("Messages:      {}", stats.messages);
            println!("Project files: {}", stats.project_files);
            println!("Tagging mode:  {}", stats.mode);
            Ok(())
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.http.bind.clone());
            serve_until_ctrl_c(service.clone(), &bind).await
        }
    }
}

async fn serve_until_ctrl_c(service: Arc<MemoryService>, bind: &str) -> Result<()> {
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());
    crate::http::serve(service, bind, shutdown).await
}

fn print_sync_report(report: &SyncReport) -> Result<()> {
    println!("{}", report.project);
    println!("  scanned:   {}", report.scanned);
    println!("  new:       {}", report.new);
    println!("  updated:   {}", report.updated);
    println!("  unchanged: {}", report.unchanged);
    println!("  skipped:   {}", report.skipped);
    println!("  failed:    {}", report.failed);
    for failure in &report.failures {
        println!("    {}: {}", failure.path, failure.reason);
    }
    if !report.missing.is_empty() {
        println!(
            "  {} files no longer on disk (run `memory-sync prune {}`)",
            report.missing.len(),
            display_path(Path::new(&report.project))
        );
    }

    match report.status {
        SyncStatus::Completed => Ok(()),
        SyncStatus::Partial => {
            info!("Sync finished with {} failures", report.failed);
            Ok(())
        }
        SyncStatus::Failed => bail!("no files reached the store"),
        SyncStatus::Cancelled => bail!("sync cancelled"),
    }
}

fn print_prune_report(report: &PruneReport) {
    if report.removed.is_empty() {
        println!("Nothing to prune in {}", report.project);
        return;
    }
    println!("Pruned {} files from {}", report.removed.len(), report.project);
    for path in &report.removed {
        println!("  {path}");
    }
}

/// Shorten paths under the home directory to `~/...`.
fn display_path(path: &Path) -> String {
    dirs::home_dir()
        .and_then(|home| {
            path.strip_prefix(&home)
                .ok()
                .map(|rest| format!("~/{}", rest.display()))
        })
        .unwrap_or_else(|| path.display().to_string())
}
