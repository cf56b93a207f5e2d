use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::api::auth::AuthenticatedUser;
use crate::api::server::SharedState;
use crate::core::errors::{AppError, AppResult};
use crate::domain::{self, templates, ListingInput};

pub async fn preview_listing(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Json(input): Json<ListingInput>,
) -> AppResult<Json<Value>> {
    let profile = state.profiles.ensure(user.id()).await?;
    let draft = domain::build_listing_draft(&profile, &input)?;
    let preview = templates::listing_card(&profile, &draft);
    Ok(Json(json!({ "preview": preview, "listing": draft })))
}

pub async fn create_listing(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Json(input): Json<ListingInput>,
) -> AppResult<Json<Value>> {
    let profile = state.profiles.ensure(user.id()).await?;
    let draft = domain::build_listing_draft(&profile, &input)?;
    let listing = state.listings.create(&draft).await?;
    let listing_id = listing
        .id
        .clone()
        .ok_or_else(|| AppError::Dependency("notion returned a page without an id".into()))?;
    info!(tg_id = user.id(), %listing_id, "listing saved");

    let mut published = Value::Null;
    if input.publish {
        let caption = templates::listing_card(&profile, &listing);
        let message_id = state
            .telegram
            .send_photo(&state.config.channel_id, &listing.apartment_photo_id, &caption)
            .await?;
        state
            .listings
            .update_channel_message(&listing_id, message_id)
            .await?;
        info!(%listing_id, message_id, "listing published to channel");
        published = json!({ "messageId": message_id });
    }

    let channel_invite_link = input
        .publish
        .then(|| state.config.channel_invite_link.clone());
    Ok(Json(json!({
        "listingId": listing_id,
        "listing": listing,
        "published": published,
        "channelInviteLink": channel_invite_link,
    })))
}

pub async fn get_listing(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    match state.listings.get_by_id(&id).await? {
        Some(listing) if listing.owner_tg_id == user.id() => {
            Ok(Json(json!({ "listing": listing })))
        }
        // Foreign listings read as missing; ids are not probeable.
        _ => Err(AppError::NotFound("Listing not found".into())),
    }
}
