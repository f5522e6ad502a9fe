//! Node Reputation Daemon
//!
//! Serves the reputation, directory, and irreparable-segment stores over
//! HTTP, and refreshes the directory cache from the configured seed nodes
//! on a timer.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! NODE_REPUTATION_API_KEY=secret node-reputation serve
//!
//! # Custom config, port, and backend
//! node-reputation --config /etc/node-reputation.toml --http-port 7780 --backend sled serve
//!
//! # Read-only scans for operators
//! node-reputation inspect nodes --limit 20
//! node-reputation inspect segments
//! node-reputation inspect directory
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use node_reputation::services::{spawn_logging_listener, DirectoryService};
use node_reputation::{ApiKeyValidator, Backend, Config, HttpServer, Services, StaticPeers, Stores};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "node-reputation")]
#[command(about = "Node reputation, directory cache, and irreparable segment stores")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory (overrides config)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Storage engine: sqlite or sled (overrides config)
    #[arg(long)]
    backend: Option<Backend>,

    /// HTTP port (overrides config)
    #[arg(long)]
    http_port: Option<u16>,

    /// Shared API key callers must present
    #[arg(long, env = "NODE_REPUTATION_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and the directory refresh timer (default)
    Serve,
    /// Print stored records as JSON
    Inspect {
        #[command(subcommand)]
        target: InspectTarget,
    },
}

#[derive(Subcommand, Debug)]
enum InspectTarget {
    /// Reputation stats
    Nodes {
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Irreparable segments
    Segments {
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Cached node descriptors
    Directory {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("node_reputation=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("loading config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(key) = args.api_key {
        config.api_key = key;
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Inspect { target } => inspect(&config, target),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        storage_dir = %config.storage_dir.display(),
        backend = ?config.backend,
        http_port = config.http_port,
        "Starting node-reputation"
    );

    if config.api_key.is_empty() {
        warn!("No API key configured; every authenticated request will be rejected");
    }

    let stores = Stores::open(&config).context("opening stores")?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let services = Arc::new(Services::new(
        &stores,
        Arc::new(ApiKeyValidator::new(&config.api_key)),
    ));
    let listener_handle = spawn_logging_listener(services.events.clone());

    let refresh_handle = if config.refresh_interval_secs == 0 {
        info!("Directory refresh timer disabled");
        None
    } else if config.api_key.is_empty() {
        warn!("Directory refresh timer disabled: no API key to authenticate with");
        None
    } else {
        Some(spawn_refresh_task(
            services.directory.clone(),
            config.api_key.clone().into_bytes(),
            StaticPeers::new(config.seed_nodes.clone()),
            Duration::from_secs(config.refresh_interval_secs),
        ))
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(services.clone(), http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    if let Some(handle) = refresh_handle {
        handle.abort();
    }
    listener_handle.abort();

    if let Err(e) = stores.flush() {
        error!(error = %e, "Failed to flush stores");
    }

    Ok(())
}

/// Refresh the directory cache from the seed list on a fixed interval,
/// through the same authenticated service the HTTP API uses. One task owns
/// every refresh, so passes never overlap.
fn spawn_refresh_task(
    directory: Arc<DirectoryService>,
    api_key: Vec<u8>,
    peers: StaticPeers,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    let api_key: Arc<[u8]> = api_key.into();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;

            let directory = directory.clone();
            let api_key = api_key.clone();
            let peers = peers.clone();
            let pass =
                tokio::task::spawn_blocking(move || directory.refresh(Some(&api_key[..]), &peers));
            match pass.await {
                Ok(Ok(written)) => debug!(written, "Directory refresh pass complete"),
                Ok(Err(e)) => warn!(error = %e, "Directory refresh failed"),
                Err(e) => error!(error = %e, "Directory refresh task panicked"),
            }
        }
    })
}

fn inspect(config: &Config, target: InspectTarget) -> anyhow::Result<()> {
    let stores = Stores::open(config).context("opening stores")?;

    let json = match target {
        InspectTarget::Nodes { limit, offset } => {
            serde_json::to_string_pretty(&stores.reputation.list(limit, offset)?)?
        }
        InspectTarget::Segments { limit, offset } => {
            serde_json::to_string_pretty(&stores.irreparable.list(limit, offset)?)?
        }
        InspectTarget::Directory { limit } => {
            serde_json::to_string_pretty(&stores.directory.list(limit)?)?
        }
    };

    println!("{}", json);
    Ok(())
}
