use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::server::{AppState, SharedState};
use crate::core::errors::AppResult;
use crate::telegram::updates::{command_reply, Update};

/// Bot update intake. Always answers 200 so Telegram does not re-deliver;
/// handling failures are logged, not surfaced.
pub async fn receive_update(
    State(state): State<SharedState>,
    Json(update): Json<Update>,
) -> Json<Value> {
    if let Err(err) = handle_update(&state, update).await {
        warn!(error = %err, "failed to handle bot update");
    }
    Json(json!({ "ok": true }))
}

async fn handle_update(state: &AppState, update: Update) -> AppResult<()> {
    let Some(message) = update.message else {
        return Ok(());
    };
    let Some(from) = message.from.as_ref() else {
        return Ok(());
    };

    if !state.throttle.admit(&from.id.to_string()).await {
        // Deliberate: throttled chat callers get no reply at all.
        debug!(user_id = from.id, "dropped throttled bot update");
        return Ok(());
    }

    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };
    if let Some(reply) = command_reply(text, state.config.webapp_url.as_deref()) {
        state
            .telegram
            .send_message(&message.chat.id.to_string(), &reply)
            .await?;
    }
    Ok(())
}
