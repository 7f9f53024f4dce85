use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use vox_stream::{Config, LogSink, ProviderFactory, SessionSupervisor};

#[derive(Parser, Debug)]
#[command(name = "vox-stream", about = "Streaming ASR session engine")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(short, long, default_value = "config/vox-stream")]
    config: String,

    /// Override the backend provider ("websocket", "relay")
    #[arg(short, long)]
    provider: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(provider) = args.provider {
        cfg.engine.provider_name = provider;
    }

    info!("vox-stream v0.1.0");
    info!("Provider: {}", cfg.engine.provider_name);
    info!(
        "Drain timeout: {}ms, max restarts: {}",
        cfg.engine.drain_timeout_ms, cfg.engine.max_restarts
    );

    let factory = Arc::new(ProviderFactory::new(cfg.clone()));
    let supervisor = SessionSupervisor::new(cfg, factory, Arc::new(LogSink));
    supervisor.start_gc();

    info!("Supervisor running, waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    supervisor.force_close_all().await;

    Ok(())
}
