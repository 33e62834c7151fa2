use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Errors raised by a worker unit while starting
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid unit configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Failed(String),
}

/// Listening sockets shared by the instances of one deployment, keyed by the
/// requested `host:port`
pub(crate) type SharedListeners = Arc<DashMap<String, StdTcpListener>>;

/// Everything an instance receives when it is started
pub struct UnitContext {
    deployment_id: String,
    instance: usize,
    instances: usize,
    config: Value,
    shutdown: watch::Receiver<bool>,
    listeners: SharedListeners,
}

impl UnitContext {
    pub(crate) fn new(
        deployment_id: String,
        instance: usize,
        instances: usize,
        config: Value,
        shutdown: watch::Receiver<bool>,
        listeners: SharedListeners,
    ) -> Self {
        Self {
            deployment_id,
            instance,
            instances,
            config,
            shutdown,
            listeners,
        }
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Zero-based index of this instance within the deployment
    pub fn instance(&self) -> usize {
        self.instance
    }

    pub fn instances(&self) -> usize {
        self.instances
    }

    /// Startup payload of the deployment
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Flips to `true` when the runtime shuts down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Listen on `host:port`. Instances of the same deployment asking for the
    /// same address accept from one shared socket, so port 0 resolves to a
    /// single ephemeral port for the whole deployment.
    pub fn listen(&self, host: &str, port: u16) -> io::Result<TcpListener> {
        let key = format!("{}:{}", host, port);

        let socket = match self.listeners.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().try_clone()?,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let listener = StdTcpListener::bind((host, port))?;
                listener.set_nonblocking(true)?;
                let socket = listener.try_clone()?;
                entry.insert(listener);
                socket
            }
        };

        TcpListener::from_std(socket)
    }
}

/// Addresses bound through [`UnitContext::listen`]
pub(crate) fn bound_addresses(listeners: &SharedListeners) -> Vec<SocketAddr> {
    listeners
        .iter()
        .filter_map(|entry| entry.value().local_addr().ok())
        .collect()
}

/// One running instance of a worker unit
#[async_trait]
pub trait WorkerUnit: Send + Sync {
    /// Bring the instance up. Long-running work is spawned, not awaited.
    async fn start(&mut self, ctx: UnitContext) -> Result<(), UnitError>;

    /// Stop the instance and wait for its work to finish
    async fn stop(&mut self) {}
}

/// Creates instances of one kind of worker unit
pub trait UnitFactory: Send + Sync {
    fn create(&self) -> Box<dyn WorkerUnit>;
}

impl<F> UnitFactory for F
where
    F: Fn() -> Box<dyn WorkerUnit> + Send + Sync,
{
    fn create(&self) -> Box<dyn WorkerUnit> {
        (self)()
    }
}
