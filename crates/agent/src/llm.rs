use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rfqbrief_core::config::GenerationConfig;
use secrecy::SecretString;

/// Text-completion backend. Implementations own transport, model choice and
/// credentials; the agent only hands over a fully rendered prompt.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Connection settings an [`LlmClient`] implementation is constructed from,
/// taken from the `[generation]` config section.
#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub model: String,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Configured base URL without a trailing slash, or the backend's default.
    pub fn endpoint<'a>(&'a self, default_base: &'a str) -> &'a str {
        self.base_url.as_deref().unwrap_or(default_base).trim_end_matches('/')
    }
}
