//! External configuration retrieval
//!
//! A retrieval session reads an ordered list of stores (files, HTTP endpoints,
//! environment variables) and deep-merges them into one JSON document. Sessions
//! are opened, used once and closed; nothing here watches for changes.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Store read when no retriever options are supplied
pub const DEFAULT_CONFIG_PATH: &str = "conf/config.json";

/// Errors raised while retrieving configuration
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to read config store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP config store error: {0}")]
    Http(String),

    #[error("Failed to parse config store {store}: {message}")]
    Parse { store: String, message: String },

    #[error("Config store {0} is not set")]
    MissingStore(String),

    #[error("Retrieved configuration is malformed: {0}")]
    Malformed(String),
}

// ============================================================================
// SBIO: Pure data structures
// ============================================================================

/// Document format of a file store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    #[default]
    Json,
    Yaml,
}

impl StoreFormat {
    /// Guess the format from a file extension, defaulting to JSON
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            StoreFormat::Yaml
        } else {
            StoreFormat::Json
        }
    }
}

/// One configuration store
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreOptions {
    File {
        path: String,
        #[serde(default)]
        format: StoreFormat,
        /// A missing optional file contributes an empty document
        #[serde(default)]
        optional: bool,
    },
    Http {
        url: String,
    },
    /// A whole JSON document held in an environment variable
    Env {
        variable: String,
    },
}

impl StoreOptions {
    pub fn file(path: impl Into<String>) -> Self {
        let path = path.into();
        StoreOptions::File {
            format: StoreFormat::from_path(&path),
            path,
            optional: false,
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        StoreOptions::Http { url: url.into() }
    }

    /// Short label used in logs and errors
    pub fn describe(&self) -> String {
        match self {
            StoreOptions::File { path, .. } => format!("file:{}", path),
            StoreOptions::Http { url } => format!("http:{}", url),
            StoreOptions::Env { variable } => format!("env:{}", variable),
        }
    }
}

/// Tuning for a retrieval session
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetrieverOptions {
    #[serde(default)]
    pub stores: Vec<StoreOptions>,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            stores: vec![StoreOptions::File {
                path: DEFAULT_CONFIG_PATH.to_string(),
                format: StoreFormat::Json,
                optional: true,
            }],
        }
    }
}

impl RetrieverOptions {
    pub fn with_store(mut self, store: StoreOptions) -> Self {
        self.stores.push(store);
        self
    }

    /// Options with no stores, to be filled with `with_store`
    pub fn empty() -> Self {
        Self { stores: Vec::new() }
    }
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// Merge `overlay` into `base`. Objects merge key by key, recursively; any
/// other value in `overlay` replaces the one in `base`.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Parse store content in the given format into JSON
pub fn parse_store_document(
    content: &str,
    format: StoreFormat,
    store: &str,
) -> Result<Value, ResolveError> {
    let parse_error = |message: String| ResolveError::Parse {
        store: store.to_string(),
        message,
    };

    match format {
        StoreFormat::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        StoreFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))
        }
    }
}

// ============================================================================
// SBIO: Traits for abstraction (allows mocking in tests)
// ============================================================================

/// An open retrieval session
#[async_trait]
pub trait ConfigSession: Send {
    /// Fetch the merged configuration document
    async fn fetch(&mut self) -> Result<Value, ResolveError>;

    /// Release the session
    async fn close(self: Box<Self>);
}

/// Opens retrieval sessions against an external configuration source
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn open(
        &self,
        options: &RetrieverOptions,
    ) -> Result<Box<dyn ConfigSession>, ResolveError>;
}

// ============================================================================
// SBIO: I/O implementation (files, HTTP, environment)
// ============================================================================

/// Reads the stores named in the retriever options
#[derive(Debug, Clone, Default)]
pub struct StoreSource;

impl StoreSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConfigSource for StoreSource {
    async fn open(
        &self,
        options: &RetrieverOptions,
    ) -> Result<Box<dyn ConfigSession>, ResolveError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ResolveError::Http(e.to_string()))?;

        Ok(Box::new(StoreSession {
            stores: options.stores.clone(),
            client,
        }))
    }
}

struct StoreSession {
    stores: Vec<StoreOptions>,
    client: reqwest::Client,
}

impl StoreSession {
    async fn read_store(&self, store: &StoreOptions) -> Result<Value, ResolveError> {
        match store {
            StoreOptions::File {
                path,
                format,
                optional,
            } => {
                let expanded = shellexpand::full(path)
                    .map_err(|e| ResolveError::Parse {
                        store: store.describe(),
                        message: e.to_string(),
                    })?
                    .into_owned();
                let path = PathBuf::from(expanded);

                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => parse_store_document(&content, *format, &store.describe()),
                    Err(e) if *optional && e.kind() == std::io::ErrorKind::NotFound => {
                        debug!("Optional config store {} not found", path.display());
                        Ok(Value::Object(Map::new()))
                    }
                    Err(source) => Err(ResolveError::Io { path, source }),
                }
            }
            StoreOptions::Http { url } => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| ResolveError::Http(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(ResolveError::Http(format!(
                        "HTTP {} for {}",
                        response.status(),
                        url
                    )));
                }

                let body = response
                    .text()
                    .await
                    .map_err(|e| ResolveError::Http(e.to_string()))?;
                parse_store_document(&body, StoreFormat::Json, &store.describe())
            }
            StoreOptions::Env { variable } => {
                let content = std::env::var(variable)
                    .map_err(|_| ResolveError::MissingStore(store.describe()))?;
                parse_store_document(&content, StoreFormat::Json, &store.describe())
            }
        }
    }
}

#[async_trait]
impl ConfigSession for StoreSession {
    async fn fetch(&mut self) -> Result<Value, ResolveError> {
        let mut merged = Value::Object(Map::new());

        for store in &self.stores {
            let document = self.read_store(store).await?;
            debug!("Read config store {}", store.describe());
            merge_json(&mut merged, document);
        }

        Ok(merged)
    }

    async fn close(self: Box<Self>) {
        debug!("Closing config retrieval session ({} stores)", self.stores.len());
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================
