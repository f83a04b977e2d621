//! Provider Options
//!
//! Per-request options sent by a surface, and their resolution against the
//! process-level defaults. Options win field by field; blank strings count as
//! absent.

use serde::{Deserialize, Serialize};

use crate::backend::{
    DEFAULT_OLLAMA_BASE, DEFAULT_OLLAMA_MODEL, DEFAULT_OPENAI_ENDPOINT, DEFAULT_OPENAI_MODEL,
};
use crate::tasks::TaskError;

/// Which back-end serves a request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Remote chat completions API (event-stream)
    #[serde(rename = "openai")]
    OpenAi,
    /// Local Ollama server (NDJSON)
    #[default]
    Ollama,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

/// Options supplied with a start request
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderOptions {
    /// Back-end selection (default: Ollama)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// Model identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Base URL, only used by the local provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Bearer credential, only used by the remote provider
    #[serde(alias = "openAIApiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ProviderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderOptions")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base", &self.base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProviderOptions {
    /// Empty options (everything from defaults)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the provider
    #[must_use]
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Select the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the local server base URL
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Set the remote credential
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Merge over `defaults` and validate
    ///
    /// # Errors
    ///
    /// [`TaskError::MissingCredential`] when the remote provider is selected and
    /// neither the options nor the defaults carry a credential.
    pub fn resolve(&self, defaults: &ProviderDefaults) -> Result<ResolvedProvider, TaskError> {
        match self.provider.unwrap_or_default() {
            Provider::OpenAi => {
                let api_key = non_blank(self.api_key.as_deref())
                    .or_else(|| non_blank(defaults.openai_api_key.as_deref()))
                    .ok_or(TaskError::MissingCredential {
                        provider: Provider::OpenAi,
                    })?;
                Ok(ResolvedProvider::OpenAi {
                    endpoint: defaults.openai_endpoint.clone(),
                    api_key: api_key.to_string(),
                    model: pick(&self.model, &defaults.openai_model, DEFAULT_OPENAI_MODEL),
                })
            }
            Provider::Ollama => Ok(ResolvedProvider::Ollama {
                base: pick(&self.base, &defaults.ollama_base, DEFAULT_OLLAMA_BASE),
                model: pick(&self.model, &defaults.ollama_model, DEFAULT_OLLAMA_MODEL),
            }),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Option value, else process default, else built-in default
fn pick(option: &Option<String>, default: &str, builtin: &str) -> String {
    non_blank(option.as_deref())
        .or_else(|| non_blank(Some(default)))
        .unwrap_or(builtin)
        .to_string()
}

/// Process-level defaults that options are merged over
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderDefaults {
    /// Remote credential
    pub openai_api_key: Option<String>,
    /// Remote model
    pub openai_model: String,
    /// Remote API host
    pub openai_endpoint: String,
    /// Local model
    pub ollama_model: String,
    /// Local server base URL
    pub ollama_base: String,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            ollama_base: DEFAULT_OLLAMA_BASE.to_string(),
        }
    }
}

impl std::fmt::Debug for ProviderDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDefaults")
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("openai_model", &self.openai_model)
            .field("openai_endpoint", &self.openai_endpoint)
            .field("ollama_model", &self.ollama_model)
            .field("ollama_base", &self.ollama_base)
            .finish()
    }
}

/// Fully resolved connection parameters for one request
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedProvider {
    /// Remote chat completions
    OpenAi {
        /// API host
        endpoint: String,
        /// Bearer credential
        api_key: String,
        /// Model identifier
        model: String,
    },
    /// Local Ollama server
    Ollama {
        /// Server base URL
        base: String,
        /// Model identifier
        model: String,
    },
}

impl ResolvedProvider {
    /// Which provider this is
    #[must_use]
    pub fn provider(&self) -> Provider {
        match self {
            Self::OpenAi { .. } => Provider::OpenAi,
            Self::Ollama { .. } => Provider::Ollama,
        }
    }

    /// Model identifier
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi { model, .. } | Self::Ollama { model, .. } => model,
        }
    }
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi {
                endpoint, model, ..
            } => f
                .debug_struct("OpenAi")
                .field("endpoint", endpoint)
                .field("model", model)
                .finish_non_exhaustive(),
            Self::Ollama { base, model } => f
                .debug_struct("Ollama")
                .field("base", base)
                .field("model", model)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ProviderDefaults {
        ProviderDefaults {
            openai_api_key: Some("env-key".to_string()),
            openai_model: "gpt-env".to_string(),
            openai_endpoint: "http://remote".to_string(),
            ollama_model: "local-env".to_string(),
            ollama_base: "http://local:1".to_string(),
        }
    }

    #[test]
    fn test_default_provider_is_ollama() {
        let resolved = ProviderOptions::new().resolve(&defaults()).unwrap();
        assert_eq!(
            resolved,
            ResolvedProvider::Ollama {
                base: "http://local:1".to_string(),
                model: "local-env".to_string(),
            }
        );
    }

    #[test]
    fn test_options_take_precedence() {
        let resolved = ProviderOptions::new()
            .with_model("mine")
            .with_base("http://other:2")
            .resolve(&defaults())
            .unwrap();
        assert_eq!(resolved.model(), "mine");
        assert!(matches!(resolved, ResolvedProvider::Ollama { base, .. } if base == "http://other:2"));

        let resolved = ProviderOptions::new()
            .with_provider(Provider::OpenAi)
            .with_api_key("request-key")
            .with_base("http://ignored")
            .resolve(&defaults())
            .unwrap();
        assert_eq!(
            resolved,
            ResolvedProvider::OpenAi {
                endpoint: "http://remote".to_string(),
                api_key: "request-key".to_string(),
                model: "gpt-env".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_credential() {
        let defaults = ProviderDefaults::default();
        let options = ProviderOptions::new().with_provider(Provider::OpenAi);
        assert!(matches!(
            options.resolve(&defaults),
            Err(TaskError::MissingCredential { .. })
        ));

        let blank = options.with_api_key("   ");
        assert!(blank.resolve(&defaults).is_err());
    }

    #[test]
    fn test_blank_model_falls_back() {
        let resolved = ProviderOptions::new()
            .with_model("")
            .resolve(&ProviderDefaults::default())
            .unwrap();
        assert_eq!(resolved.model(), DEFAULT_OLLAMA_MODEL);
    }

    #[test]
    fn test_options_json() {
        let options: ProviderOptions = serde_json::from_str(
            r#"{"provider":"openai","model":"gpt-4o","apiKey":"k"}"#,
        )
        .unwrap();
        assert_eq!(options.provider, Some(Provider::OpenAi));
        assert_eq!(options.api_key.as_deref(), Some("k"));

        let legacy: ProviderOptions =
            serde_json::from_str(r#"{"openAIApiKey":"k2"}"#).unwrap();
        assert_eq!(legacy.api_key.as_deref(), Some("k2"));

        let empty: ProviderOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, ProviderOptions::default());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let options = ProviderOptions::new().with_api_key("sk-live");
        assert!(!format!("{options:?}").contains("sk-live"));
        assert!(!format!("{:?}", defaults()).contains("env-key"));
    }
}
