use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::config::{
    load_inference_config_file, load_retriever_options, ConfigError, DeploymentOptions,
    NodeConfiguration, RetrieverOptions, RuntimeOptions, StoreOptions, DEFAULT_WORKER_POOL_SIZE,
    DEFAULT_WORKER_UNIT,
};

#[derive(Parser, Debug)]
#[command(name = "konduit-node")]
#[command(about = "Launch a model-serving node from inline or retrieved configuration")]
#[command(version)]
#[command(disable_help_flag = true)]
pub struct Args {
    /// Inline inference configuration (JSON, or YAML by extension)
    #[arg(long, value_name = "FILE", env = "KONDUIT_SERVING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Retriever options file listing the configuration stores to read
    #[arg(long, value_name = "FILE", conflicts_with = "config")]
    pub config_store: Option<PathBuf>,

    /// Read the configuration from this file store
    #[arg(long, value_name = "FILE", conflicts_with = "config")]
    pub config_path: Option<String>,

    /// Read the configuration from this HTTP store
    #[arg(long, value_name = "URL", conflicts_with = "config")]
    pub config_url: Option<String>,

    /// Worker unit to deploy
    #[arg(long, default_value = DEFAULT_WORKER_UNIT)]
    pub worker_unit: String,

    /// Number of worker unit instances
    #[arg(short, long, default_value = "1")]
    pub instances: usize,

    /// Threads driving async tasks (defaults to one per core)
    #[arg(long, value_name = "N")]
    pub event_loop_threads: Option<usize>,

    /// Size of the worker pool
    #[arg(long, value_name = "N", default_value_t = DEFAULT_WORKER_POOL_SIZE)]
    pub worker_pool_size: usize,

    /// Path to a .env file loaded before anything else
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print usage and exit
    #[arg(short, long)]
    pub help: bool,
}

impl Args {
    /// Retriever options assembled from the store flags, if any were given.
    /// Shorthand stores are read after the options file, so they win on merge.
    pub fn retriever_options(&self) -> Result<Option<RetrieverOptions>, ConfigError> {
        let mut options = match &self.config_store {
            Some(path) => Some(load_retriever_options(path)?),
            None => None,
        };

        for store in self.shorthand_stores() {
            options = Some(options.unwrap_or_else(RetrieverOptions::empty).with_store(store));
        }

        Ok(options)
    }

    fn shorthand_stores(&self) -> Vec<StoreOptions> {
        let mut stores = Vec::new();
        if let Some(path) = &self.config_path {
            stores.push(StoreOptions::file(path.clone()));
        }
        if let Some(url) = &self.config_url {
            stores.push(StoreOptions::http(url.clone()));
        }
        stores
    }

    /// Build the node configuration, reading the inline configuration file
    /// when one is given.
    pub fn to_node_configuration(&self) -> Result<NodeConfiguration, ConfigError> {
        let inline_config = match &self.config {
            Some(path) => Some(load_inference_config_file(path)?),
            None => None,
        };

        Ok(NodeConfiguration {
            clustered: false,
            inline_config,
            config_source_options: self.retriever_options()?,
            runtime_options: RuntimeOptions {
                event_loop_threads: self.event_loop_threads,
                worker_pool_size: self.worker_pool_size,
            },
            worker_unit: self.worker_unit.clone(),
            deployment_options: DeploymentOptions::default().with_instances(self.instances),
            help: self.help,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_clap_defaults() {
        let args = Args::parse_from(["konduit-node"]);
        assert_eq!(args.worker_unit, DEFAULT_WORKER_UNIT);
        assert_eq!(args.instances, 1);
        assert_eq!(args.worker_pool_size, DEFAULT_WORKER_POOL_SIZE);
        assert!(!args.help);

        let node = args.to_node_configuration().unwrap();
        assert!(node.inline_config.is_none());
        assert!(node.config_source_options.is_none());
        assert!(!node.clustered);
    }

    #[test]
    fn test_clap_help_is_a_flag() {
        let args = Args::parse_from(["konduit-node", "--help"]);
        assert!(args.help);
        assert!(args.to_node_configuration().unwrap().help);
    }

    #[test]
    fn test_clap_verbose() {
        let args = Args::parse_from(["konduit-node", "-vvv"]);
        assert_eq!(args.verbose, 3);
    }

    #[test]
    fn test_clap_deployment_overrides() {
        let args = Args::parse_from([
            "konduit-node",
            "--instances",
            "4",
            "--worker-unit",
            "custom",
            "--event-loop-threads",
            "2",
            "--worker-pool-size",
            "8",
        ]);

        let node = args.to_node_configuration().unwrap();
        assert_eq!(node.deployment_options.instances, 4);
        assert_eq!(node.worker_unit, "custom");
        assert_eq!(node.runtime_options.event_loop_threads, Some(2));
        assert_eq!(node.runtime_options.worker_pool_size, 8);
    }

    #[test]
    fn test_inline_config_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"servingConfig": {"createLoggingEndpoints": true}}"#)
            .unwrap();

        let args = Args::parse_from([
            "konduit-node",
            "--config",
            file.path().to_str().unwrap(),
        ]);
        let node = args.to_node_configuration().unwrap();
        assert!(node.inline_config.unwrap().creates_logging_endpoints());
    }

    #[test]
    fn test_shorthand_stores() {
        let args = Args::parse_from([
            "konduit-node",
            "--config-path",
            "conf/node.yaml",
            "--config-url",
            "http://config.local/node",
        ]);

        let options = args.retriever_options().unwrap().unwrap();
        assert_eq!(
            options.stores,
            vec![
                StoreOptions::file("conf/node.yaml"),
                StoreOptions::http("http://config.local/node"),
            ]
        );
    }

    #[test]
    fn test_store_file_then_shorthand() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"stores": [{"type": "env", "variable": "NODE_CONFIG"}]}"#)
            .unwrap();

        let args = Args::parse_from([
            "konduit-node",
            "--config-store",
            file.path().to_str().unwrap(),
            "--config-url",
            "http://config.local/node",
        ]);

        let options = args.retriever_options().unwrap().unwrap();
        assert_eq!(options.stores.len(), 2);
        assert_eq!(options.stores[1], StoreOptions::http("http://config.local/node"));
    }

    #[test]
    fn test_inline_conflicts_with_stores() {
        let result = Args::try_parse_from([
            "konduit-node",
            "--config",
            "node.json",
            "--config-url",
            "http://config.local/node",
        ]);
        assert!(result.is_err());
    }
}
