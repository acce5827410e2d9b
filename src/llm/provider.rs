//! The provider seam: send messages to a named model, get text back.

use crate::config::{Config, LlmConfig};
use crate::error::Result;
use crate::llm::client::{LlmClient, LlmResponse, Message};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Anything that can answer a chat request for a model id.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a conversation to `model`.
    async fn send(&self, model: &str, messages: Vec<Message>) -> Result<LlmResponse>;

    /// Convenience method: single user message with optional system prompt.
    async fn complete(&self, model: &str, system: Option<&str>, user: &str) -> Result<LlmResponse> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        self.send(model, messages).await
    }
}

/// Split `"<endpoint>/<model>"` when the prefix names a configured endpoint.
pub fn resolve_endpoint(config: &Config, model_id: &str) -> (LlmConfig, String) {
    if let Some((prefix, model)) = model_id.split_once('/') {
        if let Some(endpoint) = config.endpoints.get(prefix) {
            let llm = LlmConfig {
                api_base: endpoint.api_base.clone(),
                api_key: endpoint.api_key.clone(),
                timeout_secs: endpoint.timeout_secs.unwrap_or(config.llm.timeout_secs),
                ..config.llm.clone()
            };
            return (llm, model.to_string());
        }
    }
    (config.llm.clone(), model_id.to_string())
}

/// Routes model ids to per-endpoint clients.
///
/// Ids without a known endpoint prefix go to the default client unchanged.
#[derive(Clone)]
pub struct ProviderRouter {
    default: Arc<dyn ChatProvider>,
    endpoints: BTreeMap<String, Arc<dyn ChatProvider>>,
}

impl ProviderRouter {
    pub fn new(default: Arc<dyn ChatProvider>) -> Self {
        Self {
            default,
            endpoints: BTreeMap::new(),
        }
    }

    pub fn with_endpoint(mut self, prefix: impl Into<String>, provider: Arc<dyn ChatProvider>) -> Self {
        self.endpoints.insert(prefix.into(), provider);
        self
    }

    /// Build HTTP clients for the default endpoint and every named endpoint.
    pub fn from_config(config: &Config) -> Self {
        let mut router = Self::new(Arc::new(LlmClient::new(config.llm.clone())));
        for name in config.endpoints.keys() {
            let (llm, _) = resolve_endpoint(config, &format!("{}/", name));
            router = router.with_endpoint(name.clone(), Arc::new(LlmClient::new(llm)));
        }
        router
    }

    fn route<'a>(&self, model_id: &'a str) -> (&dyn ChatProvider, &'a str) {
        if let Some((prefix, model)) = model_id.split_once('/') {
            if let Some(provider) = self.endpoints.get(prefix) {
                return (provider.as_ref(), model);
            }
        }
        (self.default.as_ref(), model_id)
    }
}

#[async_trait]
impl ChatProvider for ProviderRouter {
    async fn send(&self, model: &str, messages: Vec<Message>) -> Result<LlmResponse> {
        let (provider, resolved) = self.route(model);
        provider.send(resolved, messages).await
    }
}
