//! Backend abstraction for the AI collaborator
//!
//! The orchestrator only needs one thing from a model: a text completion
//! for a prompt. The trait keeps the services testable against a scripted
//! backend.

use async_trait::async_trait;

use crate::types::UltimaError;

/// A single completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to run; the orchestrator escalates this for advanced levels
    pub model: String,
    /// System prompt framing the task
    pub system: Option<String>,
    /// The user-turn prompt
    pub prompt: String,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token budget
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Abstraction over completion providers
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Backend identifier for logs
    fn id(&self) -> &str;

    /// Generate a completion, returning the raw text content
    async fn complete(&self, request: CompletionRequest) -> Result<String, UltimaError>;
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;

    #[tokio::test]
    async fn test_scripted_backend_plays_responses_in_order() {
        let backend = ScriptedBackend::new(vec![
            Ok("first".to_string()),
            Err(UltimaError::Upstream("down".into())),
        ]);

        let request = CompletionRequest::new("gpt-4o-mini", "hello")
            .with_temperature(0.7)
            .with_max_tokens(100);

        assert_eq!(backend.complete(request.clone()).await.unwrap(), "first");
        assert!(backend.complete(request).await.is_err());
        assert_eq!(backend.calls(), 2);

        let captured = backend.last_request().unwrap();
        assert_eq!(captured.model, "gpt-4o-mini");
        assert_eq!(captured.temperature, Some(0.7));
    }

    #[test]
    fn test_temperature_is_clamped() {
        let request = CompletionRequest::new("m", "p").with_temperature(5.0);
        assert_eq!(request.temperature, Some(2.0));
    }
}
