use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors converting between an inference configuration and its documents
#[derive(Error, Debug)]
pub enum InferenceConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Serving surface of a node. Keys unknown to the launcher are kept verbatim
/// so they reach the worker unit untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingConfig {
    #[serde(default)]
    pub http_port: u16,

    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    #[serde(default)]
    pub log_timings: bool,

    #[serde(default)]
    pub create_logging_endpoints: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploads_directory: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_listen_host() -> String {
    "localhost".to_string()
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            http_port: 0,
            listen_host: default_listen_host(),
            log_timings: false,
            create_logging_endpoints: false,
            uploads_directory: None,
            extra: Map::new(),
        }
    }
}

/// The effective configuration of one serving node.
///
/// Only `servingConfig` is read by the launcher; pipeline steps and any other
/// top-level keys are carried as opaque JSON.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfiguration {
    #[serde(default)]
    pub serving_config: ServingConfig,

    #[serde(default)]
    pub steps: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InferenceConfiguration {
    /// Decode from a JSON value. Anything that is not an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, InferenceConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json(json: &str) -> Result<Self, InferenceConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, InferenceConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Encode as the opaque payload handed to a worker unit.
    pub fn to_value(&self) -> Result<Value, InferenceConfigError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_yaml(&self) -> Result<String, InferenceConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn creates_logging_endpoints(&self) -> bool {
        self.serving_config.create_logging_endpoints
    }
}
