use anyhow::{Context, Result};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::error;

use crate::core::config::NotionConfig;
use crate::core::errors::{AppError, AppResult};

const NOTION_VERSION: &str = "2022-06-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin Notion REST client. Every non-2xx response and transport failure is
/// mapped into the closed error taxonomy at this boundary; callers never see
/// raw response bodies.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl Client {
    pub fn new(config: &NotionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("creating HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub async fn query_database(&self, database_id: &str, body: Value) -> AppResult<Value> {
        let url = format!("{}/v1/databases/{database_id}/query", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    pub async fn create_page(&self, database_id: &str, properties: Value) -> AppResult<Value> {
        let url = format!("{}/v1/pages", self.base_url);
        let body = serde_json::json!({
            "parent": { "database_id": database_id },
            "properties": properties,
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    pub async fn retrieve_page(&self, page_id: &str) -> AppResult<Value> {
        let url = format!("{}/v1/pages/{page_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    pub async fn update_page(&self, page_id: &str, properties: Value) -> AppResult<Value> {
        let url = format!("{}/v1/pages/{page_id}", self.base_url);
        let body = serde_json::json!({ "properties": properties });
        let response = self
            .http
            .patch(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }
}

fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Dependency("notion request timed out".into())
    } else {
        AppError::Dependency(format!("notion request failed: {err}"))
    }
}

async fn read_json(response: Response) -> AppResult<Value> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|err| AppError::Dependency(format!("invalid notion response: {err}")));
    }

    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    error!(status = status.as_u16(), body = %body, "notion API error");

    Err(match status {
        StatusCode::UNAUTHORIZED => AppError::Unauthorized("notion: unauthorized".into()),
        StatusCode::FORBIDDEN => AppError::Forbidden("notion: forbidden".into()),
        StatusCode::NOT_FOUND => AppError::NotFound("notion: resource not found".into()),
        StatusCode::TOO_MANY_REQUESTS => {
            AppError::rate_limited("notion: rate limited", retry_after)
        }
        _ => AppError::Dependency(format!("notion request failed ({})", status.as_u16())),
    })
}
