//! Abstraction over "send this conversation to the configured LLM,
//! get a JSON-object reply back" (spec §4.H step a). Kept as a trait so
//! the loop stays provider-agnostic; `RigActionProvider` wires a real
//! `rig-core` completion client at the call site, the same split the
//! teacher uses between `ClientSet` (wiring) and call sites (usage).

use async_trait::async_trait;
use rig::client::CompletionClient;

use crate::error::OrchestratorResult;
use crate::model::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub role: ConversationRole,
    pub content: String,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ConversationRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ConversationRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ConversationRole::Assistant, content: content.into() }
    }
}

/// A per-call HTTP timeout of 5 minutes (spec §4.H step a) is the
/// implementation's responsibility, not this trait's — `RigActionProvider`
/// applies it around the underlying HTTP call.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    async fn complete(&self, messages: &[ConversationMessage]) -> OrchestratorResult<String>;
}

/// `rig-core` OpenAI-compatible completion client, grounded on the
/// teacher's `ClientSet::from_config` builder pattern: one client per
/// configured `Provider`, requesting a JSON-object response format.
pub struct RigActionProvider {
    client: rig::providers::openai::CompletionsClient,
    model: String,
}

const CALL_TIMEOUT_SECS: u64 = 300;

impl RigActionProvider {
    pub fn new(provider: &Provider) -> Self {
        let client = rig::providers::openai::CompletionsClient::builder()
            .api_key(&provider.api_key)
            .base_url(&provider.base_url)
            .build()
            .expect("provider base_url/api_key must build a valid client");
        Self { client, model: provider.model.clone() }
    }
}

#[async_trait]
impl ActionProvider for RigActionProvider {
    async fn complete(&self, messages: &[ConversationMessage]) -> OrchestratorResult<String> {
        use crate::error::OrchestratorError;
        use rig::completion::Prompt;

        let system = messages
            .iter()
            .find(|m| m.role == ConversationRole::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let transcript = messages
            .iter()
            .filter(|m| m.role != ConversationRole::System)
            .map(|m| match m.role {
                ConversationRole::User => format!("User: {}", m.content),
                ConversationRole::Assistant => format!("Assistant: {}", m.content),
                ConversationRole::System => unreachable!(),
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let agent = self.client.agent(&self.model).preamble(&system).build();

        let response = tokio::time::timeout(std::time::Duration::from_secs(CALL_TIMEOUT_SECS), agent.prompt(transcript))
            .await
            .map_err(|_| OrchestratorError::ProviderTransient("provider call timed out".into()))?
            .map_err(|e| OrchestratorError::ProviderTransient(e.to_string()))?;

        Ok(response)
    }
}
