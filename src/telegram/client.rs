use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::core::errors::{AppError, AppResult};
use crate::core::retry::{with_retry, RetryOptions};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bot API client for pushing messages and photos to the channel. Telegram's
/// 429 responses carry `parameters.retry_after`, which feeds the retry
/// executor's hint-aware delay.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    api_base: String,
    token: String,
    retry: RetryOptions,
}

impl Client {
    pub fn new(api_base: &str, bot_token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("creating HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: bot_token.to_string(),
            retry: RetryOptions::default(),
        })
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> AppResult<i64> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "MarkdownV2",
            }),
        )
        .await
    }

    pub async fn send_photo(&self, chat_id: &str, photo: &str, caption: &str) -> AppResult<i64> {
        self.call(
            "sendPhoto",
            json!({
                "chat_id": chat_id,
                "photo": photo,
                "caption": caption,
                "parse_mode": "MarkdownV2",
            }),
        )
        .await
    }

    /// Invoke a Bot API method under the retry policy; returns the sent
    /// message id.
    async fn call(&self, method: &str, payload: Value) -> AppResult<i64> {
        let op = format!("telegram.{method}");
        with_retry(&op, &self.retry, || self.invoke(method, payload.clone())).await
    }

    async fn invoke(&self, method: &str, payload: Value) -> AppResult<i64> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AppError::Dependency("telegram request timed out".into())
                } else {
                    AppError::Dependency(format!("telegram request failed: {err}"))
                }
            })?;

        let body: Value = response
            .json()
            .await
            .map_err(|err| AppError::Dependency(format!("invalid telegram response: {err}")))?;

        if body["ok"].as_bool() == Some(true) {
            let message_id = body["result"]["message_id"].as_i64().unwrap_or_default();
            debug!(method, message_id, "telegram call succeeded");
            return Ok(message_id);
        }

        let code = body["error_code"].as_i64().unwrap_or(500);
        let description = body["description"]
            .as_str()
            .unwrap_or("telegram request failed")
            .to_string();
        Err(match code {
            429 => AppError::rate_limited(description, body["parameters"]["retry_after"].as_u64()),
            401 | 403 => AppError::Forbidden(format!("telegram: {description}")),
            400..=499 => AppError::Validation(format!("telegram: {description}")),
            _ => AppError::Dependency(format!("telegram: {description}")),
        })
    }
}
