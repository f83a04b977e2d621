//! Backend selection
//!
//! Maps per-request [`ProviderOptions`] to a ready [`StreamProducer`]. The task
//! layer only depends on [`BackendSelector`], so a new back-end plugs in here.

use std::sync::Arc;

use crate::options::{ProviderDefaults, ProviderOptions, ResolvedProvider};
use crate::tasks::TaskError;

use super::ollama::OllamaBackend;
use super::openai::OpenAiBackend;
use super::traits::StreamProducer;

/// Chooses the producer for a start request
pub trait BackendSelector: Send + Sync {
    /// Resolve `options` to a producer
    ///
    /// Runs synchronously inside `start`, before any task exists.
    ///
    /// # Errors
    ///
    /// [`TaskError::MissingCredential`] (or another synchronous rejection)
    /// when the request cannot be served.
    fn select(&self, options: &ProviderOptions) -> Result<Arc<dyn StreamProducer>, TaskError>;
}

/// The built-in OpenAI / Ollama selector
#[derive(Clone, Debug)]
pub struct DefaultBackends {
    defaults: ProviderDefaults,
    /// Shared connection pool for every request
    http_client: reqwest::Client,
}

impl DefaultBackends {
    /// Create a selector over process-level defaults
    #[must_use]
    pub fn new(defaults: ProviderDefaults) -> Self {
        Self {
            defaults,
            http_client: reqwest::Client::new(),
        }
    }

    /// The defaults options are merged over
    #[must_use]
    pub fn defaults(&self) -> &ProviderDefaults {
        &self.defaults
    }
}

impl BackendSelector for DefaultBackends {
    fn select(&self, options: &ProviderOptions) -> Result<Arc<dyn StreamProducer>, TaskError> {
        let resolved = options.resolve(&self.defaults)?;
        tracing::debug!(provider = %resolved.provider(), model = resolved.model(), "Selected backend");

        Ok(match resolved {
            ResolvedProvider::OpenAi {
                endpoint,
                api_key,
                model,
            } => Arc::new(
                OpenAiBackend::with_client(self.http_client.clone(), api_key, model)
                    .with_endpoint(endpoint),
            ),
            ResolvedProvider::Ollama { base, model } => Arc::new(OllamaBackend::with_client(
                self.http_client.clone(),
                base,
                model,
            )),
        })
    }
}
