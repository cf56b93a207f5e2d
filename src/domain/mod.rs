pub mod templates;

use serde::{Deserialize, Serialize};

use crate::core::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tg_id: i64,
    pub name: String,
    pub city: String,
    pub country: String,
    pub intro: String,
    pub cat_name: String,
    pub cat_photo_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cat_photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_message_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub owner_tg_id: i64,
    pub profile_id: String,
    pub city: String,
    pub country: String,
    pub apartment_description: String,
    pub apartment_photo_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apartment_photo_url: Option<String>,
    pub dates: String,
    pub conditions: String,
    pub preferred_destinations: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_message_id: Option<i64>,
}

/// Request body for profile upserts. Missing fields arrive as empty strings
/// and fail validation with a field-specific message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileInput {
    pub name: String,
    pub location: String,
    pub intro: String,
    pub cat_name: String,
    pub cat_photo_id: String,
    pub cat_photo_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingInput {
    pub apartment_description: String,
    pub apartment_photo_id: String,
    pub apartment_photo_url: String,
    pub dates: String,
    pub conditions: String,
    pub preferred_destinations: String,
    pub publish: bool,
}

const MAX_TEXT_LENGTH: usize = 500;
const MAX_URL_LENGTH: usize = 2048;

fn clean(value: &str, field: &str, max: usize) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} не может быть пустым")));
    }
    if trimmed.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} слишком длинное (максимум {max} символов)"
        )));
    }
    Ok(trimmed.to_string())
}

fn optional_url(value: &str, field: &str) -> AppResult<Option<String>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_URL_LENGTH {
        return Err(AppError::Validation(format!(
            "{field} слишком длинная (максимум {MAX_URL_LENGTH} символов)"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// "Город, Страна" in one field; a single part doubles as both.
fn normalize_location(value: &str) -> AppResult<(String, String)> {
    let parts: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    let city = clean(parts.first().unwrap_or(&""), "Город", 120)?;
    let country = clean(parts.get(1).unwrap_or(&parts[0]), "Страна", 120)?;
    Ok((city, country))
}

pub fn validate_profile(tg_id: i64, input: &ProfileInput) -> AppResult<Profile> {
    let name = clean(&input.name, "Имя", 120)?;
    let intro = clean(&input.intro, "Интро", 600)?;
    let cat_name = clean(&input.cat_name, "Имя кота", 100)?;
    let cat_photo_id = clean(&input.cat_photo_id, "Фото кота", 512)?;
    let cat_photo_url = optional_url(&input.cat_photo_url, "Ссылка на фото кота")?;
    let (city, country) = normalize_location(&input.location)?;

    Ok(Profile {
        id: None,
        tg_id,
        name,
        city,
        country,
        intro,
        cat_name,
        cat_photo_id,
        cat_photo_url,
        channel_message_id: None,
    })
}

pub fn build_listing_draft(profile: &Profile, input: &ListingInput) -> AppResult<Listing> {
    let profile_id = profile
        .id
        .clone()
        .ok_or_else(|| AppError::NotFound("Анкета не найдена. Начни с /start".into()))?;

    Ok(Listing {
        id: None,
        owner_tg_id: profile.tg_id,
        profile_id,
        city: profile.city.clone(),
        country: profile.country.clone(),
        apartment_description: clean(
            &input.apartment_description,
            "Описание жилья",
            MAX_TEXT_LENGTH,
        )?,
        apartment_photo_id: clean(&input.apartment_photo_id, "Фото жилья", 512)?,
        apartment_photo_url: optional_url(&input.apartment_photo_url, "Ссылка на фото жилья")?,
        dates: clean(&input.dates, "Даты", MAX_TEXT_LENGTH)?,
        conditions: clean(&input.conditions, "Условия", MAX_TEXT_LENGTH)?,
        preferred_destinations: clean(
            &input.preferred_destinations,
            "Желаемые направления",
            MAX_TEXT_LENGTH,
        )?,
        channel_message_id: None,
    })
}
