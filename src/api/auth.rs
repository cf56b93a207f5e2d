use axum::body::{to_bytes, Body};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;
use tracing::debug;
use url::form_urlencoded;

use crate::api::server::SharedState;
use crate::core::errors::{AppError, AppResult};
use crate::security::init_data::{InitDataVerifier, TelegramUser};
use crate::security::replay::ReplayGuard;
use crate::security::session::SessionSigner;

pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

// Matches the server-wide request body limit; only JSON bodies are buffered.
const BODY_LIMIT: usize = 1024 * 1024;

/// Bundles the init-data verifier and the session signer, both keyed off the
/// bot token. Constructed once at startup and threaded through `AppState`.
#[derive(Debug, Clone)]
pub struct AuthGate {
    verifier: InitDataVerifier,
    sessions: SessionSigner,
}

impl AuthGate {
    pub fn new(bot_token: &str) -> Self {
        Self {
            verifier: InitDataVerifier::new(bot_token, ReplayGuard::new()),
            sessions: SessionSigner::new(bot_token),
        }
    }

    pub fn sessions(&self) -> &SessionSigner {
        &self.sessions
    }
}

/// Verified identity attached to the request by the auth gate. Handlers pull
/// it via the extractor and never re-verify.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: TelegramUser,
    pub auth_date: i64,
}

impl AuthenticatedUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| AppError::Forbidden("user is not authenticated".into()))
    }
}

/// Auth gate middleware. Either a session token or a fresh init-data payload
/// authenticates the request; a payload mints a new session token that is
/// attached to the response.
pub async fn require_auth(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // A presented session skips the replay bookkeeping and issues nothing.
    if let Some(token) = session_token(request.headers()) {
        let claims = state.auth.sessions.verify(&token)?;
        let mut request = request;
        request.extensions_mut().insert(AuthenticatedUser {
            user: claims.user,
            auth_date: claims.auth_date,
        });
        return Ok(next.run(request).await);
    }

    let (mut request, init_data) = extract_init_data(request).await?;
    let Some(init_data) = init_data else {
        return Err(AppError::Forbidden("auth token is missing".into()));
    };

    let auth = state.auth.verifier.verify(&init_data).await?;
    let token = state.auth.sessions.issue(&auth.user, auth.auth_date)?;
    debug!(user_id = auth.user.id, "issued session token");

    request.extensions_mut().insert(AuthenticatedUser {
        user: auth.user,
        auth_date: auth.auth_date,
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&token) {
        let headers = response.headers_mut();
        headers.insert(AUTH_TOKEN_HEADER, value);
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
    Ok(response)
}

/// Session token from `Authorization: Bearer` or `x-auth-token`.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Raw init data from the header, the query string, or a JSON body field, in
/// that priority order. The body is buffered and restored so the handler can
/// still read it.
async fn extract_init_data(request: Request) -> AppResult<(Request, Option<String>)> {
    let header_value = request
        .headers()
        .get(INIT_DATA_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    if let Some(value) = header_value {
        if !value.is_empty() {
            return Ok((request, Some(value)));
        }
    }

    if let Some(query) = request.uri().query() {
        let init_data = form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "initData")
            .map(|(_, value)| value.into_owned());
        if let Some(init_data) = init_data {
            return Ok((request, Some(init_data)));
        }
    }

    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if !is_json {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|_| AppError::Validation("request body is too large".into()))?;
    let init_data = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|body| body["initData"].as_str().map(str::to_string));
    Ok((Request::from_parts(parts, Body::from(bytes)), init_data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_wins_over_the_token_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        headers.insert(AUTH_TOKEN_HEADER, "xyz".parse().unwrap());
        assert_eq!(session_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn token_header_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_TOKEN_HEADER, "xyz".parse().unwrap());
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn empty_headers_yield_no_token() {
        let headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(session_token(&headers), None);
    }
}
