//! Minimal OpenAI-compatible chat client behind the `TextGenerator` seam.
//!
//! We only call chat.completions and return the plain text of the first choice.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key; model output is treated as untrusted text and
//! parsed defensively by the callers.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::LlmConfig;
use crate::domain::{ChatTurn, Role};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
  #[error("text generation disabled (no API key)")]
  Disabled,

  #[error("text generation timed out after {0:?}")]
  Timeout(Duration),

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("model HTTP {status}: {message}")]
  Status { status: u16, message: String },

  #[error("model returned an empty response")]
  EmptyResponse,

  #[error("could not parse model output: {0}")]
  Parse(String),
}

/// Anything that can turn a system prompt plus conversation into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  async fn generate(&self, system: &str, turns: &[ChatTurn], max_tokens: u32) -> Result<String, LlmError>;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  /// Construct the client if the config carries an API key; otherwise return None.
  pub fn from_config(cfg: &LlmConfig) -> Option<Self> {
    let api_key = cfg.api_key.clone()?;
    let client = reqwest::Client::builder()
      .timeout(cfg.timeout())
      .build()
      .map_err(|e| error!(target: "llm", error = %e, "Failed to build HTTP client"))
      .ok()?;

    Some(Self {
      client,
      api_key,
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
    })
  }
}

#[async_trait]
impl TextGenerator for OpenAI {
  #[instrument(level = "info", skip(self, system, turns), fields(model = %self.model, turns = turns.len()))]
  async fn generate(&self, system: &str, turns: &[ChatTurn], max_tokens: u32) -> Result<String, LlmError> {
    let url = format!("{}/chat/completions", self.base_url);
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatMessageReq { role: "system", content: system });
    messages.extend(turns.iter().map(|t| ChatMessageReq {
      role: match t.role {
        Role::User => "user",
        Role::Assistant => "assistant",
      },
      content: &t.content,
    }));
    let req = ChatCompletionRequest { model: &self.model, messages, max_tokens, temperature: 0.7 };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "buddy-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      error!(target: "llm", status, elapsed = ?start.elapsed(), "Model call failed");
      return Err(LlmError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(target: "llm", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Model usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default().trim().to_string();

    info!(target: "llm", elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");
    if text.is_empty() {
      return Err(LlmError::EmptyResponse);
    }
    Ok(text)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessageReq<'a>>,
  max_tokens: u32,
  temperature: f32,
}
#[derive(Serialize)]
struct ChatMessageReq<'a> { role: &'static str, content: &'a str }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_partial_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer) -> OpenAI {
    OpenAI::from_config(&LlmConfig {
      api_key: Some("sk-test".into()),
      base_url: format!("{}/v1/", server.uri()),
      model: "test-model".into(),
      timeout_secs: 5,
    })
    .expect("client")
  }

  #[test]
  fn no_api_key_means_no_client() {
    assert!(OpenAI::from_config(&LlmConfig::default()).is_none());
  }

  #[tokio::test]
  async fn sends_system_and_turns_and_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/v1/chat/completions"))
      .and(header("authorization", "Bearer sk-test"))
      .and(body_partial_json(json!({
        "model": "test-model",
        "max_tokens": 250,
        "messages": [
          { "role": "system", "content": "be kind" },
          { "role": "user", "content": "hi" },
          { "role": "assistant", "content": "hello" },
          { "role": "user", "content": "I am nervous" }
        ]
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": "  You've got this.  " } }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14 }
      })))
      .expect(1)
      .mount(&server)
      .await;

    let turns = vec![
      ChatTurn::user("hi"),
      ChatTurn { role: Role::Assistant, content: "hello".into() },
      ChatTurn::user("I am nervous"),
    ];
    let text = client_for(&server).generate("be kind", &turns, 250).await.unwrap();
    assert_eq!(text, "You've got this.");
  }

  #[tokio::test]
  async fn error_status_carries_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/v1/chat/completions"))
      .respond_with(ResponseTemplate::new(429).set_body_json(json!({
        "error": { "message": "Rate limit reached" }
      })))
      .mount(&server)
      .await;

    let err = client_for(&server).generate("s", &[ChatTurn::user("x")], 10).await.unwrap_err();
    match err {
      LlmError::Status { status, message } => {
        assert_eq!(status, 429);
        assert_eq!(message, "Rate limit reached");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn empty_content_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/v1/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": null } }]
      })))
      .mount(&server)
      .await;

    let err = client_for(&server).generate("s", &[ChatTurn::user("x")], 10).await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse));
  }
}
