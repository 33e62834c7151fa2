use tracing::{debug, error, info};

use super::inference::InferenceConfiguration;
use super::node::NodeConfiguration;
use super::retriever::{ConfigSource, ResolveError, RetrieverOptions};

/// Produces the effective configuration of a node, once per run.
pub struct ConfigResolver<S: ConfigSource> {
    source: S,
}

impl<S: ConfigSource> ConfigResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Resolve the effective configuration.
    ///
    /// An inline configuration is returned as is. Otherwise a retrieval
    /// session is opened, read once and closed before the document is
    /// converted; no further polling happens. Failures are returned without
    /// retrying.
    pub async fn resolve(
        &self,
        node: &NodeConfiguration,
    ) -> Result<InferenceConfiguration, ResolveError> {
        if let Some(config) = &node.inline_config {
            debug!("Using inline inference configuration");
            return Ok(config.clone());
        }

        let default_options;
        let options = match &node.config_source_options {
            Some(options) => options,
            None => {
                default_options = RetrieverOptions::default();
                &default_options
            }
        };

        let mut session = self.source.open(options).await?;
        let fetched = session.fetch().await;
        session.close().await;

        let document = fetched.map_err(|e| {
            error!("Unable to retrieve configuration: {}", e);
            e
        })?;
        info!("Retrieved node configuration from {} store(s)", options.stores.len());

        InferenceConfiguration::from_value(document)
            .map_err(|e| ResolveError::Malformed(e.to_string()))
    }
}
