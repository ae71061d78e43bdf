//! Service binary: load configuration, start the orchestrator, run until
//! interrupted.

use clap::Parser;
use sendflow_core::builder::RequestBuilder;
use sendflow_service::{init_tracing, HttpTransport, Orchestrator, OrchestratorConfig, SysinfoProbe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "sendflow-service", about = "sendflow request orchestration service")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, env = "SENDFLOW_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = OrchestratorConfig::load(args.config.as_deref())?;
    init_tracing(&config.log_level);

    let transport = Arc::new(HttpTransport::new()?);
    let probe = Arc::new(SysinfoProbe::new());
    let orchestrator =
        Orchestrator::new(config, RequestBuilder::new(), transport, probe).await;

    orchestrator.start().await;
    info!("Service running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    orchestrator.stop().await;
    Ok(())
}
