//! Inference client: one synchronous call to the vision model.
//!
//! Deliberately thin. The call is atomic — it returns a structured reply
//! or fails, and failure surfaces as an error, never absorbed. No retry,
//! no streaming, no application-level timeout: whatever deadline the
//! provider imposes is the only one. Prompt engineering lives in
//! [`crate::prompt`]; this module only moves a built prompt across the
//! wire.
//!
//! [`InferenceService`] is the seam tests mock; [`LlmInferenceClient`] is
//! the production implementation over `edgequake-llm`.

use crate::config::ServiceConfig;
use crate::error::DoctriageError;
use crate::prompt::BuiltPrompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Structured reply from one inference call.
#[derive(Debug, Clone)]
pub struct InferenceReply {
    /// The textual completion.
    pub completion: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl InferenceReply {
    /// The raw payload persisted to the response cache: the completion as
    /// a text content block, plus token usage.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "text",
            "text": self.completion,
            "usage": {
                "inputTokens": self.input_tokens,
                "outputTokens": self.output_tokens,
            },
        })
    }
}

/// The external vision-capable classification/extraction endpoint.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Submit one prompt and wait for the reply.
    async fn infer(&self, prompt: &BuiltPrompt) -> Result<InferenceReply, DoctriageError>;
}

/// Production [`InferenceService`] backed by an `edgequake-llm` provider.
///
/// Provider resolution is deferred to the first call so that operations
/// which never touch the model (upload, listing, asset serving) work
/// without any API key configured.
pub struct LlmInferenceClient {
    provider: Option<Arc<dyn LLMProvider>>,
    provider_name: Option<String>,
    model: Option<String>,
    max_tokens: usize,
    temperature: f32,
}

impl LlmInferenceClient {
    /// Wrap an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ServiceConfig) -> Self {
        Self {
            provider: Some(provider),
            provider_name: None,
            model: None,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Take provider selection from the config; actual construction waits
    /// until the first inference call.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            provider_name: config.provider_name.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Resolve a provider, most specific first: a pre-built provider, then
    /// a named provider + model, then full auto-detection from the
    /// environment's API keys.
    fn resolve_provider(&self) -> Result<Arc<dyn LLMProvider>, DoctriageError> {
        if let Some(ref provider) = self.provider {
            return Ok(Arc::clone(provider));
        }

        if let Some(ref name) = self.provider_name {
            let model = self.model.as_deref().unwrap_or("gpt-4.1-nano");
            return ProviderFactory::create_llm_provider(name, model).map_err(|e| {
                DoctriageError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("{e}"),
                }
            });
        }

        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| DoctriageError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No inference provider could be auto-detected from the environment.\n\
                     Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or name a provider explicitly.\n\
                     Error: {e}"
                ),
            })?;
        Ok(provider)
    }
}

#[async_trait]
impl InferenceService for LlmInferenceClient {
    async fn infer(&self, prompt: &BuiltPrompt) -> Result<InferenceReply, DoctriageError> {
        let provider = self.resolve_provider()?;
        let image = ImageData::new(prompt.image.data.clone(), prompt.image.mime_type)
            .with_detail("high");
        let messages = vec![ChatMessage::user_with_images(
            prompt.instruction.clone(),
            vec![image],
        )];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| DoctriageError::InferenceFailed {
                message: format!("{e}"),
            })?;

        debug!(
            "Inference reply: {} in / {} out tokens",
            response.prompt_tokens, response.completion_tokens
        );

        Ok(InferenceReply {
            completion: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_completion_and_usage() {
        let reply = InferenceReply {
            completion: "{\"documentType\":\"payslip\"}".into(),
            input_tokens: 1200,
            output_tokens: 85,
        };
        let payload = reply.to_payload();
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["text"], reply.completion);
        assert_eq!(payload["usage"]["inputTokens"], 1200);
        assert_eq!(payload["usage"]["outputTokens"], 85);
    }
}
