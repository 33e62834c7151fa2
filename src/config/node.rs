use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::inference::InferenceConfiguration;
use super::retriever::RetrieverOptions;

/// Identifier of the built-in HTTP serving unit
pub const DEFAULT_WORKER_UNIT: &str = "inference-server";

/// Default size of the pool that starts worker instances
pub const DEFAULT_WORKER_POOL_SIZE: usize = 20;

/// Sizing of the asynchronous runtime hosting the node
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// Threads driving async tasks (None = one per core)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_loop_threads: Option<usize>,

    /// Upper bound on blocking threads and on concurrent instance startup
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
}

fn default_worker_pool_size() -> usize {
    DEFAULT_WORKER_POOL_SIZE
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            event_loop_threads: None,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

impl RuntimeOptions {
    /// Build a multi-threaded tokio runtime sized by these options.
    pub fn build_tokio(&self) -> std::io::Result<tokio::runtime::Runtime> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name("konduit-worker");

        if let Some(threads) = self.event_loop_threads {
            builder.worker_threads(threads.max(1));
        }
        builder.max_blocking_threads(self.worker_pool_size.max(1));

        builder.build()
    }
}

/// How a worker unit is deployed
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOptions {
    #[serde(default = "default_instances")]
    pub instances: usize,

    /// Settings specific to the unit kind, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_instances() -> usize {
    1
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            instances: 1,
            extra: Map::new(),
        }
    }
}

impl DeploymentOptions {
    pub fn with_instances(mut self, instances: usize) -> Self {
        self.instances = instances;
        self
    }
}

/// Everything needed to launch one node, built once from arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeConfiguration {
    /// Always forced off by the orchestrator
    pub clustered: bool,
    pub inline_config: Option<InferenceConfiguration>,
    pub config_source_options: Option<RetrieverOptions>,
    pub runtime_options: RuntimeOptions,
    pub worker_unit: String,
    pub deployment_options: DeploymentOptions,
    pub help: bool,
}

impl NodeConfiguration {
    /// A node that deploys the built-in serving unit with default options
    pub fn new() -> Self {
        Self {
            worker_unit: DEFAULT_WORKER_UNIT.to_string(),
            ..Default::default()
        }
    }

    pub fn with_inline_config(mut self, config: InferenceConfiguration) -> Self {
        self.inline_config = Some(config);
        self
    }

    pub fn with_config_source(mut self, options: RetrieverOptions) -> Self {
        self.config_source_options = Some(options);
        self
    }

    pub fn with_worker_unit(mut self, identifier: impl Into<String>) -> Self {
        self.worker_unit = identifier.into();
        self
    }

    pub fn with_instances(mut self, instances: usize) -> Self {
        self.deployment_options.instances = instances;
        self
    }

    pub fn with_runtime_options(mut self, options: RuntimeOptions) -> Self {
        self.runtime_options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_defaults() {
        let node = NodeConfiguration::new();
        assert!(!node.clustered);
        assert!(!node.help);
        assert!(node.inline_config.is_none());
        assert_eq!(node.worker_unit, DEFAULT_WORKER_UNIT);
        assert_eq!(node.deployment_options.instances, 1);
        assert_eq!(node.runtime_options.worker_pool_size, DEFAULT_WORKER_POOL_SIZE);
    }

    #[test]
    fn test_builder_methods() {
        let node = NodeConfiguration::new()
            .with_worker_unit("custom-unit")
            .with_instances(4)
            .with_inline_config(InferenceConfiguration::default());

        assert_eq!(node.worker_unit, "custom-unit");
        assert_eq!(node.deployment_options.instances, 4);
        assert!(node.inline_config.is_some());
    }

    #[test]
    fn test_deployment_options_parse() {
        let options: DeploymentOptions =
            serde_json::from_str(r#"{"instances": 3, "worker": true}"#).unwrap();
        assert_eq!(options.instances, 3);
        assert_eq!(options.extra["worker"], true);

        let defaults: DeploymentOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults.instances, 1);
    }

    #[test]
    fn test_runtime_options_parse() {
        let options: RuntimeOptions =
            serde_json::from_str(r#"{"eventLoopThreads": 2}"#).unwrap();
        assert_eq!(options.event_loop_threads, Some(2));
        assert_eq!(options.worker_pool_size, DEFAULT_WORKER_POOL_SIZE);
    }

    #[test]
    fn test_build_tokio_runtime() {
        let options = RuntimeOptions {
            event_loop_threads: Some(1),
            worker_pool_size: 2,
        };
        let runtime = options.build_tokio().unwrap();
        assert_eq!(runtime.block_on(async { 40 + 2 }), 42);
    }
}
