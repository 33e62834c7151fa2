use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use konduit_node::cli::Args;
use konduit_node::config::{NodeConfiguration, StoreSource};
use konduit_node::logs::LogFileManager;
use konduit_node::runtime::{DeploymentOutcome, Orchestrator, Runtime, UnitDeployer};
use konduit_node::server::{InferenceUnitFactory, INFERENCE_UNIT};

fn main() {
    let args = Args::parse();

    if args.help {
        if let Err(e) = Args::command().print_help() {
            eprintln!("Failed to print usage: {}", e);
            process::exit(1);
        }
        println!();
        return;
    }

    // Load .env file if specified
    if let Some(ref env_file) = args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            eprintln!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let logs = LogFileManager::new();
    init_tracing(args.verbose, &logs);

    let node = match args.to_node_configuration() {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to build node configuration: {}", e);
            process::exit(1);
        }
    };

    let code = match run(node, logs) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    process::exit(code);
}

/// Console output follows `-v`/`RUST_LOG`; the log file always receives
/// info and above once its sink is attached.
fn init_tracing(verbose: u8, logs: &LogFileManager) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .event_format(logs.line_pattern())
        .with_writer(logs.make_writer())
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(file_layer)
        .init();
}

/// Launch the node and keep it running until interrupted.
/// Returns whether the deployment succeeded.
fn run(node: NodeConfiguration, logs: LogFileManager) -> anyhow::Result<bool> {
    let tokio_runtime = node
        .runtime_options
        .build_tokio()
        .context("Failed to build the async runtime")?;

    tokio_runtime.block_on(async move {
        let runtime = Arc::new(
            Runtime::new().register(INFERENCE_UNIT, InferenceUnitFactory::new(logs.clone())),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            StoreSource::new(),
            runtime.clone(),
            logs,
        ));

        let outcome = orchestrator
            .launch(node)
            .await
            .context("Launch ended without reporting an outcome")?;

        if let DeploymentOutcome::Failed(e) = outcome {
            error!("Node failed to start: {}", e);
            return Ok(false);
        }

        info!("Node is running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for the interrupt signal")?;

        info!("Shutting down");
        runtime.shutdown().await;
        Ok(true)
    })
}
