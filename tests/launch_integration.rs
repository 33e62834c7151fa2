//! Integration tests for launching a node
//!
//! These tests run the full launch against the real runtime and serving unit
//! on localhost, with configuration coming inline, from files and over HTTP.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tempfile::TempDir;
use tokio::time::sleep;

use konduit_node::config::{
    InferenceConfiguration, NodeConfiguration, ResolveError, RetrieverOptions, StoreOptions,
    StoreSource,
};
use konduit_node::logs::LogFileManager;
use konduit_node::runtime::{
    DeployError, DeploymentOutcome, LaunchError, Orchestrator, Runtime, UnitDeployer,
};
use konduit_node::server::{InferenceUnitFactory, INFERENCE_UNIT};

type NodeOrchestrator = Orchestrator<StoreSource, Arc<Runtime>>;

/// Find an available port for testing
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to address")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

fn serving_config(port: u16, logging: bool) -> serde_json::Value {
    json!({
        "servingConfig": {
            "httpPort": port,
            "listenHost": "127.0.0.1",
            "createLoggingEndpoints": logging
        },
        "steps": []
    })
}

fn create_node(logs_dir: &TempDir) -> (Arc<Runtime>, Arc<NodeOrchestrator>) {
    let logs = LogFileManager::with_logs_dir(logs_dir.path());
    let runtime = Arc::new(
        Runtime::new().register(INFERENCE_UNIT, InferenceUnitFactory::new(logs.clone())),
    );
    let orchestrator = Arc::new(Orchestrator::new(StoreSource::new(), runtime.clone(), logs));
    (runtime, orchestrator)
}

async fn launch(orchestrator: &Arc<NodeOrchestrator>, node: NodeConfiguration) -> DeploymentOutcome {
    orchestrator
        .clone()
        .launch(node)
        .await
        .expect("Launch dropped its reply")
}

#[tokio::test]
async fn test_inline_config_with_logging_endpoints() {
    let logs_dir = TempDir::new().unwrap();
    let (runtime, orchestrator) = create_node(&logs_dir);
    let port = find_available_port();

    let config = InferenceConfiguration::from_value(serving_config(port, true)).unwrap();
    let node = NodeConfiguration::new()
        .with_inline_config(config.clone())
        .with_instances(2);

    let outcome = launch(&orchestrator, node).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.config(), Some(&config));

    // The sink was attached before the unit started
    let log_file = orchestrator.logs().active_log_file().unwrap();
    assert!(log_file.starts_with(logs_dir.path()));
    assert!(log_file.exists());

    let ids = runtime.deployment_ids();
    assert_eq!(ids.len(), 1);
    let info = runtime.deployment(&ids[0]).unwrap();
    assert_eq!(info.instances, 2);
    assert_eq!(info.addresses.len(), 1);
    assert_eq!(info.addresses[0].port(), port);

    std::fs::write(&log_file, "first\nsecond\nthird\n").unwrap();

    let client = reqwest::Client::new();
    let base_url = format!("http://127.0.0.1:{}", port);

    let status = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Failed health check")
        .status();
    assert_eq!(status, StatusCode::OK);

    let body = client
        .get(format!("{}/logs/1", base_url))
        .send()
        .await
        .expect("Failed to read logs")
        .text()
        .await
        .unwrap();
    assert_eq!(body, "third");

    let response = client
        .get(format!("{}/logs/zip", base_url))
        .send()
        .await
        .expect("Failed to export logs");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.bytes().await.unwrap();
    assert!(!bytes.is_empty());

    runtime.shutdown().await;
    assert!(runtime.deployment_ids().is_empty());
}

#[tokio::test]
async fn test_inline_config_without_logging_endpoints() {
    let logs_dir = TempDir::new().unwrap();
    let (runtime, orchestrator) = create_node(&logs_dir);
    let port = find_available_port();

    let config = InferenceConfiguration::from_value(serving_config(port, false)).unwrap();
    let outcome = launch(&orchestrator, NodeConfiguration::new().with_inline_config(config)).await;

    assert!(outcome.is_success());
    assert!(orchestrator.logs().active_log_file().is_none());

    let status = reqwest::get(format!("http://127.0.0.1:{}/logs/10", port))
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::NOT_FOUND);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_config_from_yaml_file_store() {
    let logs_dir = TempDir::new().unwrap();
    let (runtime, orchestrator) = create_node(&logs_dir);
    let port = find_available_port();

    let config_dir = TempDir::new().unwrap();
    let config_path = config_dir.path().join("node.yaml");
    std::fs::write(
        &config_path,
        format!(
            "servingConfig:\n  httpPort: {}\n  listenHost: 127.0.0.1\nsteps: []\n",
            port
        ),
    )
    .unwrap();

    let options = RetrieverOptions::empty()
        .with_store(StoreOptions::file(config_path.to_string_lossy()));
    let outcome = launch(&orchestrator, NodeConfiguration::new().with_config_source(options)).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.config().unwrap().serving_config.http_port, port);

    let status = reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::OK);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_config_from_http_store() {
    let store_port = find_available_port();
    let serving_port = find_available_port();
    let document = serving_config(serving_port, false);

    let store = Router::new().route(
        "/node",
        get(move || {
            let document = document.clone();
            async move { axum::Json(document) }
        }),
    );
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", store_port))
        .await
        .expect("Failed to bind config store");
    tokio::spawn(async move {
        axum::serve(listener, store).await.unwrap();
    });

    // Give server time to start
    sleep(Duration::from_millis(100)).await;

    let logs_dir = TempDir::new().unwrap();
    let (runtime, orchestrator) = create_node(&logs_dir);
    let options = RetrieverOptions::empty().with_store(StoreOptions::http(format!(
        "http://127.0.0.1:{}/node",
        store_port
    )));

    let outcome = launch(&orchestrator, NodeConfiguration::new().with_config_source(options)).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.config().unwrap().serving_config.http_port, serving_port);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_malformed_store_fails_and_closes_runtime() {
    let logs_dir = TempDir::new().unwrap();
    let (runtime, orchestrator) = create_node(&logs_dir);

    let config_dir = TempDir::new().unwrap();
    let config_path = config_dir.path().join("node.json");
    std::fs::write(&config_path, r#"{"servingConfig": {"httpPort": "eighty"}}"#).unwrap();

    let options = RetrieverOptions::empty()
        .with_store(StoreOptions::file(config_path.to_string_lossy()));
    let outcome = launch(&orchestrator, NodeConfiguration::new().with_config_source(options)).await;

    assert!(matches!(
        outcome,
        DeploymentOutcome::Failed(LaunchError::ConfigResolution(ResolveError::Malformed(_)))
    ));
    assert!(runtime.is_closed());
    assert!(runtime.deployment_ids().is_empty());
    assert!(orchestrator.logs().active_log_file().is_none());
}

#[tokio::test]
async fn test_missing_store_file_fails() {
    let logs_dir = TempDir::new().unwrap();
    let (runtime, orchestrator) = create_node(&logs_dir);

    let options = RetrieverOptions::empty().with_store(StoreOptions::file(
        logs_dir.path().join("absent.json").to_string_lossy(),
    ));
    let outcome = launch(&orchestrator, NodeConfiguration::new().with_config_source(options)).await;

    assert!(matches!(
        outcome,
        DeploymentOutcome::Failed(LaunchError::ConfigResolution(ResolveError::Io { .. }))
    ));
    assert!(runtime.is_closed());
}

#[tokio::test]
async fn test_unknown_worker_unit_fails() {
    let logs_dir = TempDir::new().unwrap();
    let (runtime, orchestrator) = create_node(&logs_dir);

    let config =
        InferenceConfiguration::from_value(serving_config(find_available_port(), true)).unwrap();
    let node = NodeConfiguration::new()
        .with_inline_config(config)
        .with_worker_unit("python-step");

    let outcome = launch(&orchestrator, node).await;
    assert!(matches!(
        outcome,
        DeploymentOutcome::Failed(LaunchError::DeploymentStart(DeployError::UnknownUnit(ref id)))
            if id == "python-step"
    ));

    // The sink is attached before deployment is attempted
    assert!(orchestrator.logs().active_log_file().is_some());
    assert!(runtime.is_closed());
}
