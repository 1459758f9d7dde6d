//! Minimal OpenAI client for the playground collaborators.
//!
//! We only call chat.completions and request either plain text (hints,
//! feedback) or a strict JSON object (distractor tokens). Calls are
//! instrumented and log model names, latencies and token usage (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::collaborators::{CollaboratorError, DistractorGenerator, FeedbackGenerator, HintGenerator};
use crate::config::Prompts;
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  async fn send(&self, req: &ChatCompletionRequest) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
    let res = self.client.post(&url)
      .header(USER_AGENT, "playground-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, trunc_for_log(&msg, 200)));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    Ok(body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default())
  }

  /// Plain-text chat completion. Used for hints and feedback.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_plain(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<String, String> {
    let req = ChatCompletionRequest::new(model, system, user, temperature, None);
    let start = Instant::now();
    let text = self.send(&req).await?;
    debug!(elapsed = ?start.elapsed(), len = text.len(), "Plain completion received");
    Ok(text.trim().to_string())
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let req = ChatCompletionRequest::new(
      model, system, user, temperature,
      Some(ResponseFormat { r#type: "json_object".into() }),
    );
    let start = Instant::now();
    let text = self.send(&req).await?;
    debug!(elapsed = ?start.elapsed(), len = text.len(), "JSON completion received");
    serde_json::from_str::<T>(&text).map_err(|e| format!("JSON parse error: {}", e))
  }
}

/// The three text collaborators backed by one client and one prompt set.
#[derive(Clone)]
pub struct OpenAiCollaborators {
  pub client: OpenAI,
  pub prompts: Prompts,
}

impl OpenAiCollaborators {
  pub fn new(client: OpenAI, prompts: Prompts) -> Self {
    Self { client, prompts }
  }
}

#[derive(Deserialize)]
struct DistractorReply {
  tokens: Vec<String>,
}

#[async_trait]
impl DistractorGenerator for OpenAiCollaborators {
  #[instrument(level = "info", skip(self, correct_tokens), fields(%language, count, model = %self.client.fast_model))]
  async fn generate(&self, language: &str, correct_tokens: &[String], count: usize)
    -> Result<Vec<String>, CollaboratorError> {
    let tokens_json = serde_json::to_string(correct_tokens)
      .map_err(|e| CollaboratorError::Malformed(e.to_string()))?;
    let count_str = count.to_string();
    let user = fill_template(
      &self.prompts.distractor_user_template,
      &[("language", language), ("tokens", &tokens_json), ("count", &count_str)],
    );
    let reply: DistractorReply = self.client
      .chat_json(&self.client.fast_model, &self.prompts.distractor_system, &user, 0.7)
      .await
      .map_err(|e| {
        error!(target: "playground", error = %e, "Distractor generation failed");
        CollaboratorError::Unavailable(e)
      })?;
    Ok(reply.tokens)
  }
}

#[async_trait]
impl HintGenerator for OpenAiCollaborators {
  #[instrument(level = "info", skip(self, objective, current_code), fields(objective_len = objective.len(), code_len = current_code.len()))]
  async fn generate(&self, objective: &str, current_code: &str) -> Result<String, CollaboratorError> {
    let user = fill_template(&self.prompts.hint_user_template, &[("objective", objective), ("code", current_code)]);
    let text = self.client
      .chat_plain(&self.client.fast_model, &self.prompts.hint_system, &user, 0.2)
      .await
      .map_err(CollaboratorError::Unavailable)?;
    if text.is_empty() {
      return Err(CollaboratorError::Malformed("empty hint".into()));
    }
    Ok(text)
  }
}

#[async_trait]
impl FeedbackGenerator for OpenAiCollaborators {
  #[instrument(level = "info", skip(self, code, canonical_solution), fields(%language, code_len = code.len(), model = %self.client.strong_model))]
  async fn generate(&self, code: &str, canonical_solution: &str, language: &str)
    -> Result<String, CollaboratorError> {
    let user = fill_template(
      &self.prompts.feedback_user_template,
      &[("language", language), ("code", code), ("solution", canonical_solution)],
    );
    let text = self.client
      .chat_plain(&self.client.strong_model, &self.prompts.feedback_system, &user, 0.2)
      .await
      .map_err(CollaboratorError::Unavailable)?;
    if text.is_empty() {
      return Err(CollaboratorError::Malformed("empty feedback".into()));
    }
    Ok(text)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
  fn new(model: &str, system: &str, user: &str, temperature: f32, response_format: Option<ResponseFormat>) -> Self {
    Self {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format,
    }
  }
}

#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

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

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
