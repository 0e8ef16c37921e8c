//! powchain node entry point.

use anyhow::{Context, Result};
use clap::Parser;
use powchain_chain::ConsensusResolver;
use powchain_consensus::Difficulty;
use powchain_server::{router, AppState, Backend, HttpPeerClient, NodeConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "powchain-node")]
#[command(about = "Run a powchain ledger node", long_about = None)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve the API on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Directory holding the ledger and node registry
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Leading zero hex digits required of a proof
    #[arg(long)]
    difficulty: Option<usize>,

    /// Storage backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Seconds between background consensus rounds
    #[arg(long)]
    resolve_interval: Option<u64>,

    /// Serve the privileged /new_wallet endpoint
    #[arg(long)]
    enable_mint: bool,
}

impl Cli {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(difficulty) = self.difficulty {
            config.blockchain.difficulty = Difficulty(difficulty);
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(interval) = self.resolve_interval {
            config.resolver.interval_secs = Some(interval);
        }
        if self.enable_mint {
            config.mint.enabled = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    cli.apply(&mut config);

    let blockchain = Arc::new(
        config
            .open_blockchain()
            .with_context(|| format!("cannot open node data in {}", config.data_dir.display()))?,
    );
    let stats = blockchain.stats();
    info!(
        length = stats.length,
        tip = %stats.tip_hash,
        nodes = stats.nodes,
        "ledger ready"
    );

    let client = HttpPeerClient::new().context("cannot build HTTP client")?;
    let resolver = ConsensusResolver::new(Arc::new(client), config.resolver_config());

    if let Some(secs) = config.resolver.interval_secs.filter(|secs| *secs > 0) {
        let blockchain = Arc::clone(&blockchain);
        let resolver = resolver.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            loop {
                ticker.tick().await;
                if let Err(e) = resolver.resolve(&blockchain).await {
                    warn!("background consensus round failed: {}", e);
                }
            }
        });
        info!(every_secs = secs, "background consensus enabled");
    }

    let app = router(AppState {
        blockchain,
        resolver,
        mint: config.mint.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("cannot listen on {}", config.listen))?;
    info!("powchain node listening on http://{}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
