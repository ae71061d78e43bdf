//! Command-line front end for sendflow.
//!
//! Reads request descriptors from JSON or YAML files, runs them through an
//! in-process orchestrator, and prints outcomes as JSON. Intended for
//! one-shot operator use; long-running deployments use the service binary.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sendflow_core::builder::RequestBuilder;
use sendflow_core::descriptor::RequestDescriptor;
use sendflow_core::monitor::NoOpProbe;
use sendflow_core::Priority;
use sendflow_service::{HttpTransport, Orchestrator, OrchestratorConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// sendflow: priority-scheduled outbound HTTP with retry and circuit breaking
#[derive(Debug, Parser)]
#[command(name = "sendflow", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, env = "SENDFLOW_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a single request described by a JSON or YAML file
    Send {
        /// Descriptor file (.json, .yaml, or .yml)
        file: PathBuf,

        /// Scheduling priority
        #[arg(long, default_value = "normal")]
        priority: Priority,
    },

    /// Send a batch of requests described by a JSON or YAML list file
    Batch {
        /// File containing a list of descriptors
        file: PathBuf,

        /// Scheduling priority for every request in the batch
        #[arg(long, default_value = "normal")]
        priority: Priority,
    },

    /// Probe DNS, TCP, and HTTP connectivity for a URL
    Check {
        /// URL to probe
        url: String,
    },
}

/// Execute a parsed invocation
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = OrchestratorConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Send { file, priority } => send(config, &file, priority).await,
        Command::Batch { file, priority } => batch(config, &file, priority).await,
        Command::Check { url } => check(&url).await,
    }
}

async fn send(config: OrchestratorConfig, file: &Path, priority: Priority) -> anyhow::Result<()> {
    let descriptor = load_descriptor(file)?;
    let orchestrator = start_orchestrator(config).await?;

    let (tx, rx) = oneshot::channel();
    orchestrator
        .add_request(descriptor, priority, Some(tx), None)
        .await?;
    let outcome = rx.await.context("orchestrator dropped the result channel")?;

    orchestrator.stop().await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn batch(config: OrchestratorConfig, file: &Path, priority: Priority) -> anyhow::Result<()> {
    let descriptors = load_descriptors(file)?;
    anyhow::ensure!(!descriptors.is_empty(), "batch file contains no requests");

    let orchestrator = start_orchestrator(config).await?;
    let (tx, rx) = oneshot::channel();
    orchestrator
        .add_batch_requests(descriptors, priority, Some(tx))
        .await?;
    let outcomes = rx.await.context("orchestrator dropped the batch channel")?;

    orchestrator.stop().await;
    println!("{}", serde_json::to_string_pretty(&outcomes)?);
    Ok(())
}

async fn check(url: &str) -> anyhow::Result<()> {
    let transport = HttpTransport::new()?;
    let report = transport.test_connectivity(url).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn start_orchestrator(config: OrchestratorConfig) -> anyhow::Result<Arc<Orchestrator>> {
    let transport = Arc::new(HttpTransport::new()?);
    let orchestrator = Orchestrator::new(
        config,
        RequestBuilder::new(),
        transport,
        Arc::new(NoOpProbe),
    )
    .await;
    orchestrator.start().await;
    Ok(orchestrator)
}

/// Load one descriptor from a JSON or YAML file
pub fn load_descriptor(path: &Path) -> anyhow::Result<RequestDescriptor> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    parse_by_extension(path, &contents)
}

/// Load a list of descriptors from a JSON or YAML file
pub fn load_descriptors(path: &Path) -> anyhow::Result<Vec<RequestDescriptor>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    parse_by_extension(path, &contents)
}

fn parse_by_extension<T: serde::de::DeserializeOwned>(
    path: &Path,
    contents: &str,
) -> anyhow::Result<T> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(contents)
            .with_context(|| format!("invalid JSON in {}", path.display())),
        Some("yaml") | Some("yml") => serde_yaml::from_str(contents)
            .with_context(|| format!("invalid YAML in {}", path.display())),
        other => anyhow::bail!(
            "unsupported file format {:?}; expected .json, .yaml, or .yml",
            other.unwrap_or("none")
        ),
    }
}
