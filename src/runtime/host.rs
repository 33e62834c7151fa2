//! Worker unit runtime
//!
//! Hosts deployments of registered worker units: starts the requested number
//! of instances concurrently, records each deployment with its startup
//! payload, and stops everything on shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::deployer::{DeployError, DeploymentId, DeploymentRequest, UnitDeployer};
use super::unit::{bound_addresses, SharedListeners, UnitContext, UnitFactory, WorkerUnit};
use crate::config::{RuntimeOptions, DEFAULT_WORKER_POOL_SIZE};

/// A running deployment
struct Deployment {
    identifier: String,
    payload: Value,
    units: Vec<Box<dyn WorkerUnit>>,
    listeners: SharedListeners,
}

/// Summary of a running deployment
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentInfo {
    pub id: DeploymentId,
    pub identifier: String,
    pub instances: usize,
    pub addresses: Vec<SocketAddr>,
}

/// Hosts worker units
pub struct Runtime {
    /// Registered unit kinds by identifier
    factories: HashMap<String, Arc<dyn UnitFactory>>,
    /// Running deployments by id
    deployments: DashMap<DeploymentId, Deployment>,
    /// Maximum number of instances started at once
    pool_size: AtomicUsize,
    /// Shutdown signal sender
    shutdown_tx: watch::Sender<bool>,
    closed: AtomicBool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with no registered units
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            factories: HashMap::new(),
            deployments: DashMap::new(),
            pool_size: AtomicUsize::new(DEFAULT_WORKER_POOL_SIZE),
            shutdown_tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Register a unit kind under an identifier
    pub fn register(
        mut self,
        identifier: impl Into<String>,
        factory: impl UnitFactory + 'static,
    ) -> Self {
        self.factories.insert(identifier.into(), Arc::new(factory));
        self
    }

    pub fn is_registered(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size.load(Ordering::SeqCst)
    }

    /// Ids of the running deployments
    pub fn deployment_ids(&self) -> Vec<DeploymentId> {
        self.deployments.iter().map(|d| d.key().clone()).collect()
    }

    pub fn deployment(&self, id: &str) -> Option<DeploymentInfo> {
        self.deployments.get(id).map(|d| DeploymentInfo {
            id: id.to_string(),
            identifier: d.identifier.clone(),
            instances: d.units.len(),
            addresses: bound_addresses(&d.listeners),
        })
    }

    /// Stop one deployment
    pub async fn undeploy(&self, id: &str) -> bool {
        match self.deployments.remove(id) {
            Some((_, deployment)) => {
                stop_units(deployment.units).await;
                info!("Undeployed {} ({})", deployment.identifier, id);
                true
            }
            None => false,
        }
    }

    async fn start_instances(
        &self,
        id: &str,
        factory: Arc<dyn UnitFactory>,
        request: &DeploymentRequest,
        listeners: &SharedListeners,
    ) -> Vec<(Box<dyn WorkerUnit>, Result<(), String>)> {
        let instances = request.instances();
        let pool = self.pool_size().max(1);

        stream::iter(0..instances)
            .map(|instance| {
                let mut unit = factory.create();
                let ctx = UnitContext::new(
                    id.to_string(),
                    instance,
                    instances,
                    request.payload.clone(),
                    self.shutdown_tx.subscribe(),
                    listeners.clone(),
                );
                async move {
                    let result = unit.start(ctx).await.map_err(|e| e.to_string());
                    (unit, result)
                }
            })
            .buffer_unordered(pool)
            .collect()
            .await
    }
}

async fn stop_units(units: Vec<Box<dyn WorkerUnit>>) {
    for mut unit in units {
        unit.stop().await;
    }
}

#[async_trait]
impl UnitDeployer for Runtime {
    fn configure(&self, options: &RuntimeOptions) {
        let pool = options.worker_pool_size.max(1);
        self.pool_size.store(pool, Ordering::SeqCst);
        debug!(
            "Runtime configured: worker pool {}, event loop threads {}",
            pool,
            options
                .event_loop_threads
                .map(|t| t.to_string())
                .unwrap_or_else(|| "auto".to_string())
        );
    }

    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentId, DeployError> {
        if self.is_closed() {
            return Err(DeployError::RuntimeClosed);
        }
        if request.instances() == 0 {
            return Err(DeployError::InvalidOptions(
                "instances must be at least 1".to_string(),
            ));
        }

        let factory = self
            .factories
            .get(&request.identifier)
            .cloned()
            .ok_or_else(|| DeployError::UnknownUnit(request.identifier.clone()))?;

        let id = Uuid::new_v4().to_string();
        let listeners = SharedListeners::default();
        let results = self
            .start_instances(&id, factory, &request, &listeners)
            .await;

        let mut units = Vec::with_capacity(results.len());
        let mut failure = None;
        for (unit, result) in results {
            match result {
                Ok(()) => units.push(unit),
                Err(message) => {
                    error!("Instance of {} failed to start: {}", request.identifier, message);
                    failure.get_or_insert(message);
                }
            }
        }

        if let Some(message) = failure {
            warn!(
                "Stopping {} started instance(s) of {}",
                units.len(),
                request.identifier
            );
            stop_units(units).await;
            return Err(DeployError::StartFailed {
                identifier: request.identifier,
                message,
            });
        }

        debug!(
            "Started {} instance(s) of {} as {}",
            units.len(),
            request.identifier,
            id
        );
        self.deployments.insert(
            id.clone(),
            Deployment {
                identifier: request.identifier,
                payload: request.payload,
                units,
                listeners,
            },
        );

        Ok(id)
    }

    fn deployed_payload(&self, id: &str) -> Option<Value> {
        self.deployments.get(id).map(|d| d.payload.clone())
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);

        let ids = self.deployment_ids();
        for id in &ids {
            if let Some((_, deployment)) = self.deployments.remove(id) {
                stop_units(deployment.units).await;
            }
        }
        info!("Runtime shut down ({} deployment(s) stopped)", ids.len());
    }
}
