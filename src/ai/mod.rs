//! Chat-completion client against an OpenAI-shaped `/chat/completions`
//! endpoint, plus the lenient JSON extraction helpers the planning and
//! survey flows share.

pub mod planner;
pub mod survey;

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::providers::{backoff_delay, truncate_for_log, RETRY_MAX_ATTEMPTS};
use crate::util::env::{env_opt, env_req};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("missing OPENAI_API_KEY; set it in the environment or .env before running AI commands")]
    MissingCredential,
    #[error("network error talking to the model endpoint: {0}")]
    Network(String),
    #[error("model endpoint returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("model returned an empty completion")]
    EmptyResponse,
    #[error("could not parse model output: {message} (snippet: {snippet})")]
    Parse { message: String, snippet: String },
}

impl AiError {
    pub(crate) fn parse(message: impl Into<String>, raw: &str) -> Self {
        Self::Parse {
            message: message.into(),
            snippet: truncate_for_log(raw.to_string(), 200),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

pub struct ChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    /// Fails with [`AiError::MissingCredential`] when `OPENAI_API_KEY` is
    /// absent. Base URL and model come from `AI_BASE_URL` / `AI_MODEL`.
    pub fn from_env() -> Result<Self, AiError> {
        let api_key = env_req("OPENAI_API_KEY").map_err(|_| AiError::MissingCredential)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AiError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: env_opt("AI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: env_opt("AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Runs the chat completion and returns the first choice's content.
    /// `force_json` asks the endpoint for a JSON-object response.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        force_json: bool,
    ) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            response_format: force_json
                .then(|| serde_json::json!({ "type": "json_object" })),
        };

        let mut last_err = AiError::EmptyResponse;
        for attempt in 1..=RETRY_MAX_ATTEMPTS {
            if attempt > 1 {
                let delay = backoff_delay(attempt);
                warn!(attempt, ?delay, "ai: retrying completion");
                tokio::time::sleep(delay).await;
            }
            match self.try_complete(&url, &request).await {
                Ok(content) => return Ok(content),
                Err(e) if attempt < RETRY_MAX_ATTEMPTS && is_transient(&e) => last_err = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    async fn try_complete(
        &self,
        url: &str,
        request: &ChatRequest<'_>,
    ) -> Result<String, AiError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AiError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::Network(e.without_url().to_string()))?;
        if !status.is_success() {
            return Err(AiError::Http {
                status,
                body: truncate_for_log(body, 300),
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| AiError::parse(e.to_string(), &body))?;
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if content.is_empty() {
            return Err(AiError::EmptyResponse);
        }
        debug!(chars = content.len(), "ai: completion received");
        Ok(content)
    }

    /// Completion with `force_json`, fence stripping, and typed parse.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        messages: &[ChatMessage],
    ) -> Result<T, AiError> {
        let raw = self.complete(messages, true).await?;
        let cleaned = strip_code_fences(&raw);
        serde_json::from_str(&cleaned).map_err(|e| AiError::parse(e.to_string(), &cleaned))
    }
}

fn is_transient(err: &AiError) -> bool {
    match err {
        AiError::Network(_) => true,
        AiError::Http { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        _ => false,
    }
}

/// Models wrap JSON in markdown fences often enough that every parse path
/// strips them first. Drops any line whose trimmed form starts with ```.
pub fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// A bare array passes through; an object is probed for the first of `keys`
/// holding an array. Anything else is `None`.
pub fn array_under_keys(value: &Value, keys: &[&str]) -> Option<Vec<Value>> {
    if let Some(arr) = value.as_array() {
        return Some(arr.clone());
    }
    let obj = value.as_object()?;
    for key in keys {
        if let Some(arr) = obj.get(*key).and_then(Value::as_array) {
            return Some(arr.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_plain_and_labeled_fences() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  ```json\n[]\n  ```"), "[]");
    }

    #[test]
    fn unfenced_text_is_untouched() {
        assert_eq!(strip_code_fences("[1, 2, 3]"), "[1, 2, 3]");
    }

    #[test]
    fn array_found_bare_or_under_fallback_keys() {
        let bare = json!([1, 2]);
        assert_eq!(array_under_keys(&bare, &["ideas"]).map(|v| v.len()), Some(2));

        let wrapped = json!({ "questions": [1] });
        assert_eq!(
            array_under_keys(&wrapped, &["questions", "survey"]).map(|v| v.len()),
            Some(1)
        );

        let second_key = json!({ "survey": [1, 2, 3] });
        assert_eq!(
            array_under_keys(&second_key, &["questions", "survey"]).map(|v| v.len()),
            Some(3)
        );
    }

    #[test]
    fn no_array_anywhere_is_none() {
        assert!(array_under_keys(&json!({ "x": 1 }), &["ideas"]).is_none());
        assert!(array_under_keys(&json!("text"), &["ideas"]).is_none());
    }

    #[test]
    fn transient_classification() {
        assert!(is_transient(&AiError::Network("timeout".into())));
        assert!(is_transient(&AiError::Http {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        }));
        assert!(is_transient(&AiError::Http {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        }));
        assert!(!is_transient(&AiError::Http {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        }));
        assert!(!is_transient(&AiError::EmptyResponse));
    }
}
