use std::time::Duration;

use async_trait::async_trait;
use boardsight_core::config::LlmConfig;
use boardsight_core::ModelError;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{ChatMessage, LlmClient, Prompt};

/// Client for OpenAI-compatible `/chat/completions` endpoints (Groq, OpenAI, Ollama).
#[derive(Clone, Debug)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    timeout: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ModelError::Unavailable(format!("http client: {error}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            temperature,
            timeout,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ModelError> {
        Self::new(
            &config.effective_base_url(),
            config.api_key.clone(),
            config.model.clone(),
            config.temperature,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn classify_transport(&self, error: reqwest::Error) -> ModelError {
        if error.is_timeout() {
            ModelError::Timeout(self.timeout.as_secs())
        } else {
            ModelError::Unavailable(error.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ModelError> {
        let payload = CompletionRequest {
            model: &self.model,
            messages: &prompt.messages,
            temperature: self.temperature,
            max_tokens: prompt.max_tokens,
            response_format: prompt.expect_json.then_some(ResponseFormat { kind: "json_object" }),
        };

        let mut request = self.http.post(&self.endpoint).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        let response = request.send().await.map_err(|error| self.classify_transport(error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited(body),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ModelError::Unavailable(format!("credentials rejected ({status})"))
                }
                _ => ModelError::Unavailable(format!("{status}: {body}")),
            });
        }

        let completion: CompletionResponse =
            response.json().await.map_err(|error| self.classify_transport(error))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Unavailable("completion had no content".to_string()))?;

        debug!(
            event_name = "llm.completion.received",
            model = %self.model,
            chars = content.len(),
            "chat completion received"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::ChatCompletionsClient;

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let client = ChatCompletionsClient::new(
            "https://api.groq.com/openai/v1/",
            Some(SecretString::from("gsk-test".to_string())),
            "llama-3.3-70b-versatile",
            0.1,
            Duration::from_secs(5),
        )
        .expect("client");
        assert_eq!(client.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(client.model(), "llama-3.3-70b-versatile");
        assert!(!format!("{client:?}").contains("gsk-test"));
    }
}
