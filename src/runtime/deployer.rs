use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::{DeploymentOptions, RuntimeOptions};

/// Identifier handed back for a started deployment
pub type DeploymentId = String;

/// Errors starting or managing a worker unit
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Unknown worker unit: {0}")]
    UnknownUnit(String),

    #[error("Invalid deployment options: {0}")]
    InvalidOptions(String),

    #[error("Worker unit '{identifier}' failed to start: {message}")]
    StartFailed { identifier: String, message: String },

    #[error("Runtime has been shut down")]
    RuntimeClosed,
}

/// What the orchestrator asks the runtime to start
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    pub identifier: String,
    pub options: DeploymentOptions,
    /// Startup configuration of the unit, opaque to the runtime
    pub payload: Value,
}

impl DeploymentRequest {
    pub fn instances(&self) -> usize {
        self.options.instances
    }
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

/// The runtime that hosts worker units
#[async_trait]
pub trait UnitDeployer: Send + Sync {
    /// Apply runtime sizing before any deployment
    fn configure(&self, options: &RuntimeOptions);

    /// Start all instances of a unit
    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentId, DeployError>;

    /// Startup payload recorded for a running deployment
    fn deployed_payload(&self, id: &str) -> Option<Value>;

    /// Stop every deployment and refuse new ones
    async fn shutdown(&self);
}

#[async_trait]
impl<D: UnitDeployer + ?Sized> UnitDeployer for Arc<D> {
    fn configure(&self, options: &RuntimeOptions) {
        (**self).configure(options)
    }

    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentId, DeployError> {
        (**self).deploy(request).await
    }

    fn deployed_payload(&self, id: &str) -> Option<Value> {
        (**self).deployed_payload(id)
    }

    async fn shutdown(&self) {
        (**self).shutdown().await
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================
