use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::config::{
    ConfigResolver, ConfigSource, InferenceConfiguration, NodeConfiguration, ResolveError,
};
use crate::logs::{LogError, LogFileManager};
use crate::runtime::deployer::{DeployError, DeploymentId, DeploymentRequest, UnitDeployer};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Unable to retrieve configuration: {0}")]
    ConfigResolution(#[from] ResolveError),

    #[error("Unable to set up the log file sink: {0}")]
    LogSinkSetup(#[from] LogError),

    #[error("Unable to deploy worker unit: {0}")]
    DeploymentStart(#[from] DeployError),

    /// Never fatal; only ever logged
    #[error("Unable to decode the deployed configuration: {0}")]
    ConfigEchoDecode(String),
}

/// Terminal result of one launch
#[derive(Debug)]
pub enum DeploymentOutcome {
    /// The unit is running. Carries the configuration read back from the
    /// deployment when it decodes as an inference configuration.
    Succeeded(Option<InferenceConfiguration>),
    Failed(LaunchError),
}

impl DeploymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeploymentOutcome::Succeeded(_))
    }

    pub fn config(&self) -> Option<&InferenceConfiguration> {
        match self {
            DeploymentOutcome::Succeeded(config) => config.as_ref(),
            DeploymentOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&LaunchError> {
        match self {
            DeploymentOutcome::Failed(e) => Some(e),
            DeploymentOutcome::Succeeded(_) => None,
        }
    }
}

/// Launches a node: resolve configuration, set up the log sink when logging
/// endpoints are requested, deploy the worker unit, report once.
pub struct Orchestrator<S: ConfigSource, D: UnitDeployer> {
    resolver: ConfigResolver<S>,
    deployer: D,
    logs: LogFileManager,
}

impl<S: ConfigSource, D: UnitDeployer> Orchestrator<S, D> {
    pub fn new(source: S, deployer: D, logs: LogFileManager) -> Self {
        Self {
            resolver: ConfigResolver::new(source),
            deployer,
            logs,
        }
    }

    pub fn deployer(&self) -> &D {
        &self.deployer
    }

    pub fn logs(&self) -> &LogFileManager {
        &self.logs
    }

    /// Run one launch and send its outcome on `reply`. The reply is sent
    /// exactly once; a dropped receiver only loses the outcome.
    pub async fn run(&self, node: NodeConfiguration, reply: oneshot::Sender<DeploymentOutcome>) {
        let outcome = self.launch_node(node).await;
        if reply.send(outcome).is_err() {
            debug!("Launch outcome discarded: receiver dropped");
        }
    }

    /// Spawn a launch on the current tokio runtime
    pub fn launch(self: Arc<Self>, node: NodeConfiguration) -> oneshot::Receiver<DeploymentOutcome>
    where
        S: 'static,
        D: 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move { self.run(node, tx).await });
        rx
    }

    async fn launch_node(&self, mut node: NodeConfiguration) -> DeploymentOutcome {
        // Clustering is not supported for this node type
        node.clustered = false;
        self.deployer.configure(&node.runtime_options);

        let config = match self.resolver.resolve(&node).await {
            Ok(config) => config,
            Err(e) => return self.fail(e.into()).await,
        };

        if config.creates_logging_endpoints() {
            if let Err(e) = self.logs.ensure_file_sink() {
                return self.fail(e.into()).await;
            }
        }

        let payload = match config.to_value() {
            Ok(payload) => payload,
            Err(e) => return self.fail(ResolveError::Malformed(e.to_string()).into()).await,
        };

        let request = DeploymentRequest {
            identifier: node.worker_unit.clone(),
            options: node.deployment_options.clone(),
            payload,
        };

        match self.deployer.deploy(request).await {
            Ok(id) => self.confirm(&node, &id),
            Err(e) => {
                error!("Unable to deploy worker unit {}", node.worker_unit);
                self.fail(e.into()).await
            }
        }
    }

    /// Read the running unit's payload back as an inference configuration.
    /// Never turns a started deployment into a failure.
    fn confirm(&self, node: &NodeConfiguration, id: &DeploymentId) -> DeploymentOutcome {
        match self.echo_config(id) {
            Ok(config) => {
                let yaml = config.to_yaml().unwrap_or_default();
                info!(
                    "{}",
                    deployment_summary(
                        node.deployment_options.instances,
                        &node.worker_unit,
                        id,
                        &yaml
                    )
                );
                DeploymentOutcome::Succeeded(Some(config))
            }
            Err(e) => {
                // Kept for compatibility: units whose payload is not an
                // inference configuration still count as deployed, and the
                // decode failure is only recorded at debug level.
                debug!(
                    "{}. This can be ignored if {} is not an inference unit.",
                    e, node.worker_unit
                );
                DeploymentOutcome::Succeeded(None)
            }
        }
    }

    fn echo_config(&self, id: &DeploymentId) -> Result<InferenceConfiguration, LaunchError> {
        let payload = self
            .deployer
            .deployed_payload(id)
            .ok_or_else(|| LaunchError::ConfigEchoDecode(format!("no payload recorded for {}", id)))?;

        InferenceConfiguration::from_value(payload)
            .map_err(|e| LaunchError::ConfigEchoDecode(e.to_string()))
    }

    async fn fail(&self, error: LaunchError) -> DeploymentOutcome {
        error!("{}", error);
        self.deployer.shutdown().await;
        DeploymentOutcome::Failed(error)
    }
}

// ============================================================================
// SBIO: Pure function for the deployment summary
// ============================================================================

/// Human-readable summary logged after a successful deployment.
/// Pure function - no I/O.
pub fn deployment_summary(instances: usize, unit: &str, id: &str, yaml: &str) -> String {
    let (plural, verb) = if instances == 1 { ("", "is") } else { ("s", "are") };
    format!(
        "{} worker instance{} of type \"{}\" {} deployed with id: \"{}\" with the following yaml configuration:\n{}---",
        instances, plural, unit, verb, id, yaml
    )
}
