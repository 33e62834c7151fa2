//! Built-in HTTP serving unit
//!
//! Every instance of a deployment accepts on the same listening socket and
//! serves the node surface: health, the effective configuration and, when
//! requested, the logging endpoints.

pub mod handlers;
pub mod state;

pub use handlers::create_router;
pub use state::AppState;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{InferenceConfiguration, DEFAULT_WORKER_UNIT};
use crate::logs::LogFileManager;
use crate::runtime::unit::{UnitContext, UnitError, UnitFactory, WorkerUnit};

/// Identifier the serving unit is registered under
pub const INFERENCE_UNIT: &str = DEFAULT_WORKER_UNIT;

/// One instance of the serving unit
pub struct InferenceUnit {
    logs: LogFileManager,
    stop_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl InferenceUnit {
    pub fn new(logs: LogFileManager) -> Self {
        Self {
            logs,
            stop_tx: None,
            server: None,
        }
    }
}

#[async_trait]
impl WorkerUnit for InferenceUnit {
    async fn start(&mut self, ctx: UnitContext) -> Result<(), UnitError> {
        let config = InferenceConfiguration::from_value(ctx.config().clone())
            .map_err(|e| UnitError::Config(e.to_string()))?;
        let serving = &config.serving_config;

        let listener = ctx.listen(&serving.listen_host, serving.http_port)?;
        let addr = listener.local_addr()?;
        let logging = config.creates_logging_endpoints();
        let app = create_router(AppState::new(config, self.logs.clone()));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut runtime_shutdown = ctx.shutdown_signal();
        let instance = ctx.instance();

        let server = tokio::spawn(async move {
            let shutdown = async move {
                tokio::select! {
                    _ = stop_rx => {}
                    _ = async {
                        while runtime_shutdown.changed().await.is_ok() {
                            if *runtime_shutdown.borrow() {
                                break;
                            }
                        }
                    } => {}
                }
            };

            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Serving instance {} failed: {}", instance, e);
            }
        });

        info!(
            "Serving instance {} listening on {} (logging endpoints: {})",
            instance, addr, logging
        );
        self.stop_tx = Some(stop_tx);
        self.server = Some(server);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(server) = self.server.take() {
            let _ = server.await;
        }
    }
}

/// Creates serving unit instances bound to a log file manager
#[derive(Clone)]
pub struct InferenceUnitFactory {
    logs: LogFileManager,
}

impl InferenceUnitFactory {
    pub fn new(logs: LogFileManager) -> Self {
        Self { logs }
    }
}

impl UnitFactory for InferenceUnitFactory {
    fn create(&self) -> Box<dyn WorkerUnit> {
        Box::new(InferenceUnit::new(self.logs.clone()))
    }
}
