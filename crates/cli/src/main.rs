use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curator::server::{self, state::AppState};
use curator_core::config::{self, AppConfig};
use curator_core::thumbnails;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use storage::Tree;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "curator")]
#[command(about = "Image/tag dataset curator", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the web API for a dataset directory
    Serve {
        /// Dataset root (the active tree)
        dir: PathBuf,
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Generate missing thumbnails for the active and rejected trees
    Thumbnails {
        /// Dataset root (the active tree)
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { dir, port } => {
            if let Some(port) = port {
                cfg.server.port = port;
            }
            run_serve(cfg, dir).await
        }
        Commands::Thumbnails { dir } => {
            let root = dataset_root(&dir)?;
            generate_thumbnails(cfg, root).await
        }
    }
}

fn dataset_root(dir: &Path) -> Result<PathBuf> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("dataset directory {} not found", dir.display()))?;
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    Ok(root)
}

async fn run_serve(cfg: AppConfig, dir: PathBuf) -> Result<()> {
    let root = dataset_root(&dir)?;
    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.server.host, cfg.server.port))?;

    if cfg.thumbnails.generate_on_start {
        let cfg = cfg.clone();
        let root = root.clone();
        tokio::spawn(async move {
            if let Err(e) = generate_thumbnails(cfg, root).await {
                warn!("thumbnail pass failed: {:#}", e);
            }
        });
    }

    let state = AppState::new(cfg, &root);
    server::start_server(state, addr).await
}

async fn generate_thumbnails(cfg: AppConfig, root: PathBuf) -> Result<()> {
    let layout = cfg.layout(&root);
    let settings = cfg.thumbnails.clone();
    let summaries = tokio::task::spawn_blocking(move || {
        [Tree::Active, Tree::Rejected]
            .into_iter()
            .map(|tree| thumbnails::generate_missing(&layout, tree, &settings))
            .collect::<Result<Vec<_>>>()
    })
    .await??;
    let created: usize = summaries.iter().map(|s| s.created).sum();
    info!(created, "thumbnail pass complete");
    Ok(())
}
