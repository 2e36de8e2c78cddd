//! OpenAI-compatible completion backend
//!
//! Works against any OpenAI-compatible `/chat/completions` endpoint
//! (OpenAI, Azure OpenAI, vLLM, Ollama, LocalAI).

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::traits::{AiBackend, CompletionRequest};
use crate::types::UltimaError;

/// OpenAI-compatible backend
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    /// Create a new backend with a request timeout
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UltimaError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| UltimaError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[async_trait]
impl AiBackend for OpenAiBackend {
    fn id(&self) -> &str {
        &self.base_url
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, UltimaError> {
        let mut messages: Vec<ChatMessage> = Vec::new();

        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let chat_request = ChatRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        debug!(model = %request.model, "sending completion request");

        let mut http_request = self.client.post(self.chat_completions_url());
        if let Some(auth) = self.auth_header() {
            http_request = http_request.header(header::AUTHORIZATION, auth);
        }

        let response = http_request
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UltimaError::Upstream(format!("AI request timed out: {}", e))
                } else {
                    UltimaError::Upstream(format!("AI request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UltimaError::Upstream(format!(
                "AI backend returned HTTP {}: {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| UltimaError::Upstream(format!("Invalid AI response body: {}", e)))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UltimaError::Upstream("No choices in AI response".into()))?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_construction() {
        let backend = OpenAiBackend::new(
            "https://api.openai.com/v1",
            Some("sk-test".into()),
            Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(
            backend.chat_completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(backend.auth_header().as_deref(), Some("Bearer sk-test"));
    }

    #[test]
    fn test_no_auth_without_key() {
        let backend =
            OpenAiBackend::new("http://localhost:11434/v1", None, Duration::from_secs(60)).unwrap();
        assert!(backend.auth_header().is_none());
    }
}
