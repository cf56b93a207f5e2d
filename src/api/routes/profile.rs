use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::api::auth::AuthenticatedUser;
use crate::api::server::SharedState;
use crate::core::errors::AppResult;
use crate::domain::{self, templates, ProfileInput};

pub async fn get_profile(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Value>> {
    let Some(profile) = state.profiles.find_by_tg_id(user.id()).await? else {
        return Ok(Json(json!({ "profile": null })));
    };
    let preview = templates::profile_preview(&profile);
    Ok(Json(json!({ "profile": profile, "preview": preview })))
}

pub async fn put_profile(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Json(input): Json<ProfileInput>,
) -> AppResult<Json<Value>> {
    let draft = domain::validate_profile(user.id(), &input)?;
    let profile = state.profiles.upsert(&draft).await?;
    info!(tg_id = user.id(), "profile saved");
    let preview = templates::profile_preview(&profile);
    Ok(Json(json!({ "profile": profile, "preview": preview })))
}

pub async fn publish_profile(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Value>> {
    let profile = state.profiles.ensure(user.id()).await?;
    let preview = templates::profile_preview(&profile);

    let message_id = state
        .telegram
        .send_photo(&state.config.channel_id, &profile.cat_photo_id, &preview)
        .await?;
    state
        .profiles
        .update_channel_message(user.id(), message_id)
        .await?;
    info!(tg_id = user.id(), message_id, "profile published to channel");

    Ok(Json(json!({
        "messageId": message_id,
        "preview": preview,
        "channelInviteLink": state.config.channel_invite_link,
    })))
}
