pub mod inference;
pub mod node;
pub mod resolver;
pub mod retriever;

pub use inference::{InferenceConfigError, InferenceConfiguration, ServingConfig};
pub use node::{
    DeploymentOptions, NodeConfiguration, RuntimeOptions, DEFAULT_WORKER_POOL_SIZE,
    DEFAULT_WORKER_UNIT,
};
pub use resolver::ConfigResolver;
pub use retriever::{
    merge_json, ConfigSession, ConfigSource, ResolveError, RetrieverOptions, StoreFormat,
    StoreOptions, StoreSource, DEFAULT_CONFIG_PATH,
};

use std::path::Path;
use thiserror::Error;

/// Errors for file I/O operations (separate from pure parsing errors)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Inference configuration error: {0}")]
    InferenceError(#[from] InferenceConfigError),

    #[error("Retriever options error: {0}")]
    RetrieverError(#[from] serde_json::Error),
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load an inference configuration from disk, as YAML when the extension
/// says so and as JSON otherwise.
pub fn load_inference_config_file(path: &Path) -> Result<InferenceConfiguration, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = match StoreFormat::from_path(&path.to_string_lossy()) {
        StoreFormat::Yaml => InferenceConfiguration::from_yaml(&content)?,
        StoreFormat::Json => InferenceConfiguration::from_json(&content)?,
    };
    Ok(config)
}

/// Load retriever options (a JSON document with a `stores` list) from disk.
pub fn load_retriever_options(path: &Path) -> Result<RetrieverOptions, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_json_config_file() {
        let file = create_temp_file(
            r#"{"servingConfig": {"httpPort": 8000, "createLoggingEndpoints": true}}"#,
            ".json",
        );
        let config = load_inference_config_file(file.path()).unwrap();
        assert_eq!(config.serving_config.http_port, 8000);
        assert!(config.creates_logging_endpoints());
    }

    #[test]
    fn test_load_yaml_config_file() {
        let file = create_temp_file("servingConfig:\n  httpPort: 8001\nsteps: []\n", ".yaml");
        let config = load_inference_config_file(file.path()).unwrap();
        assert_eq!(config.serving_config.http_port, 8001);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_inference_config_file(Path::new("/nonexistent/file.json"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_load_retriever_options() {
        let file = create_temp_file(
            r#"{"stores": [{"type": "http", "url": "http://localhost:1234/config"}]}"#,
            ".json",
        );
        let options = load_retriever_options(file.path()).unwrap();
        assert_eq!(
            options.stores,
            vec![StoreOptions::http("http://localhost:1234/config")]
        );
    }
}
