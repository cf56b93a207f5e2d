use anyhow::Result;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use tracing::info;

use crate::api::auth::{self, AuthGate};
use crate::api::routes::{listings, profile, webhook};
use crate::core::config::Config;
use crate::core::errors::AppError;
use crate::notion;
use crate::notion::listings::ListingsRepo;
use crate::notion::profiles::ProfilesRepo;
use crate::security::rate_limit::{RateLimiter, Throttle};
use crate::telegram;

pub type SharedState = Arc<AppState>;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthGate,
    pub limiter: RateLimiter,
    pub throttle: Throttle,
    pub profiles: ProfilesRepo,
    pub listings: ListingsRepo,
    pub telegram: telegram::Client,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let store = notion::Client::new(&config.notion)?;
        Ok(Self {
            auth: AuthGate::new(&config.bot_token),
            limiter: RateLimiter::new_per_minute(config.http.rate_limit_per_min),
            throttle: Throttle::new(),
            profiles: ProfilesRepo::new(store.clone(), config.notion.db_profiles.clone()),
            listings: ListingsRepo::new(store, config.notion.db_listings.clone()),
            telegram: telegram::Client::new(&config.telegram_api_base, &config.bot_token)?,
            config,
        })
    }
}

// Client address for rate-limit keys: connect info, then proxy headers.
#[derive(Debug, Clone)]
struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(ClientIp(addr.ip().to_string()));
        }

        if let Some(forwarded) = parts.headers.get("x-forwarded-for") {
            if let Ok(value) = forwarded.to_str() {
                let ip = value.split(',').next().unwrap_or(value).trim();
                if !ip.is_empty() {
                    return Ok(ClientIp(ip.to_string()));
                }
            }
        }
        if let Some(real_ip) = parts.headers.get("x-real-ip") {
            if let Ok(value) = real_ip.to_str() {
                let ip = value.trim();
                if !ip.is_empty() {
                    return Ok(ClientIp(ip.to_string()));
                }
            }
        }

        // Fallback for tests or when connect info is unavailable
        Ok(ClientIp("127.0.0.1".to_string()))
    }
}

/// Per-minute limiter in front of the auth gate: keyed by the presented
/// token when there is one, by client address otherwise.
async fn limit_requests(
    State(state): State<SharedState>,
    ClientIp(ip): ClientIp,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = match auth::session_token(request.headers()) {
        Some(token) => format!("token:{}", token.chars().take(32).collect::<String>()),
        None => format!("ip:{ip}"),
    };
    if !state.limiter.allow(&key).await {
        return Err(AppError::rate_limited(
            "Слишком много запросов. Попробуй через минуту.",
            Some(60),
        ));
    }
    Ok(next.run(request).await)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let expose = [HeaderName::from_static(auth::AUTH_TOKEN_HEADER)];
    if origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(expose)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
            .expose_headers(expose)
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Cats & Flats API",
        "status": "ok",
        "version": crate::VERSION,
    }))
}

pub fn create_router(state: SharedState) -> Router {
    let api = Router::new()
        .route(
            "/api/profile",
            get(profile::get_profile).put(profile::put_profile),
        )
        .route("/api/profile/publish", post(profile::publish_profile))
        .route("/api/listings", post(listings::create_listing))
        .route("/api/listings/preview", post(listings::preview_listing))
        .route("/api/listings/{id}", get(listings::get_listing))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        // Added last so the limiter runs before the auth gate does any work.
        .layer(middleware::from_fn_with_state(state.clone(), limit_requests));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(root))
        .route("/telegram/webhook", post(webhook::receive_update))
        .merge(api)
        .layer(cors_layer(&state.config.http.cors_origins))
        .with_state(state)
}

pub async fn serve(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(config.clone())?);

    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let addr = SocketAddr::new(config.http.host.parse()?, config.http.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
