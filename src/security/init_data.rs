use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::core::errors::{AppError, AppResult};
use crate::security::hmac_sha256;
use crate::security::replay::ReplayGuard;

const SECRET_KEY_SALT: &[u8] = b"WebAppData";
const DEFAULT_MAX_AGE_SECONDS: i64 = 300;

/// User object embedded in the init-data `user` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_premium: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allows_write_to_pm: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Verified identity handed to the auth gate.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: TelegramUser,
    pub auth_date: i64,
}

/// Validates a Telegram Mini App init-data payload against the bot token and
/// marks it consumed in the replay guard. Every failure surfaces as
/// `Forbidden`; parser details never reach the caller.
#[derive(Debug, Clone)]
pub struct InitDataVerifier {
    secret_key: [u8; 32],
    max_age_seconds: i64,
    replay: ReplayGuard,
}

fn forbidden(message: &str) -> AppError {
    AppError::Forbidden(message.to_string())
}

impl InitDataVerifier {
    pub fn new(bot_token: &str, replay: ReplayGuard) -> Self {
        Self {
            secret_key: hmac_sha256(SECRET_KEY_SALT, bot_token.as_bytes()),
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
            replay,
        }
    }

    /// Override the payload age limit. Zero disables the age check.
    pub fn with_max_age(mut self, max_age_seconds: i64) -> Self {
        self.max_age_seconds = max_age_seconds;
        self
    }

    pub async fn verify(&self, raw: &str) -> AppResult<AuthContext> {
        let init_data = raw.trim();
        if init_data.is_empty() {
            return Err(forbidden("init data is missing"));
        }

        let fields: Vec<(String, String)> = form_urlencoded::parse(init_data.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let hash = fields
            .iter()
            .find(|(key, _)| key == "hash")
            .map(|(_, value)| value.clone())
            .ok_or_else(|| forbidden("init data hash is missing"))?;

        let signature = hex::encode(hmac_sha256(
            &self.secret_key,
            build_data_check_string(&fields).as_bytes(),
        ));
        if signature != hash {
            return Err(forbidden("init data signature mismatch"));
        }

        let auth_date = fields
            .iter()
            .find(|(key, _)| key == "auth_date")
            .and_then(|(_, value)| value.parse::<i64>().ok())
            .unwrap_or(0);
        if auth_date <= 0 {
            return Err(forbidden("init data auth_date is invalid"));
        }
        if self.max_age_seconds > 0 {
            let age_seconds = Utc::now().timestamp() - auth_date;
            if age_seconds > self.max_age_seconds {
                return Err(forbidden("init data is too old"));
            }
        }

        let user = fields
            .iter()
            .find(|(key, _)| key == "user")
            .and_then(|(_, value)| serde_json::from_str::<TelegramUser>(value).ok())
            .ok_or_else(|| forbidden("init data user payload is invalid"))?;

        self.replay.consume(user.id, &hash).await?;

        Ok(AuthContext { user, auth_date })
    }
}

/// All fields except `hash`, sorted lexicographically by key, joined as
/// `key=value` lines.
fn build_data_check_string(fields: &[(String, String)]) -> String {
    let mut check_fields: Vec<&(String, String)> =
        fields.iter().filter(|(key, _)| key != "hash").collect();
    check_fields.sort_by(|left, right| left.0.cmp(&right.0));
    check_fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "12345:test-bot-token";

    fn signed_init_data(bot_token: &str, user_json: &str, auth_date: i64) -> String {
        let fields = vec![
            ("auth_date".to_string(), auth_date.to_string()),
            ("query_id".to_string(), "AAF0x1".to_string()),
            ("user".to_string(), user_json.to_string()),
        ];
        let secret_key = hmac_sha256(SECRET_KEY_SALT, bot_token.as_bytes());
        let hash = hex::encode(hmac_sha256(
            &secret_key,
            build_data_check_string(&fields).as_bytes(),
        ));

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &fields {
            serializer.append_pair(key, value);
        }
        serializer.append_pair("hash", &hash);
        serializer.finish()
    }

    fn verifier() -> InitDataVerifier {
        InitDataVerifier::new(BOT_TOKEN, ReplayGuard::new())
    }

    #[tokio::test]
    async fn valid_payload_verifies_and_yields_the_user() {
        let raw = signed_init_data(
            BOT_TOKEN,
            r#"{"id":7,"first_name":"Ada","username":"ada"}"#,
            Utc::now().timestamp(),
        );
        let auth = verifier().verify(&raw).await.unwrap();
        assert_eq!(auth.user.id, 7);
        assert_eq!(auth.user.username.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn a_payload_is_accepted_exactly_once() {
        let raw = signed_init_data(BOT_TOKEN, r#"{"id":7}"#, Utc::now().timestamp());
        let verifier = verifier();
        verifier.verify(&raw).await.unwrap();
        let err = verifier.verify(&raw).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn tampered_hash_is_rejected() {
        let raw = signed_init_data(BOT_TOKEN, r#"{"id":7}"#, Utc::now().timestamp());
        // Flip the last hex digit of the hash.
        let mut tampered = raw.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        let err = verifier().verify(&tampered).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn stale_auth_date_fails_despite_a_valid_signature() {
        let raw = signed_init_data(BOT_TOKEN, r#"{"id":7}"#, Utc::now().timestamp() - 3600);
        let err = verifier().verify(&raw).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn age_check_can_be_disabled() {
        let raw = signed_init_data(BOT_TOKEN, r#"{"id":7}"#, Utc::now().timestamp() - 3600);
        let verifier = verifier().with_max_age(0);
        verifier.verify(&raw).await.unwrap();
    }

    #[tokio::test]
    async fn missing_hash_and_empty_payload_are_rejected() {
        let verifier = verifier();
        assert!(verifier.verify("").await.is_err());
        assert!(verifier.verify("auth_date=1&user=%7B%7D").await.is_err());
    }

    #[tokio::test]
    async fn unparseable_user_is_rejected() {
        let raw = signed_init_data(BOT_TOKEN, r#"{"name":"no id"}"#, Utc::now().timestamp());
        let err = verifier().verify(&raw).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn wrong_bot_token_invalidates_the_signature() {
        let raw = signed_init_data("999:other-token", r#"{"id":7}"#, Utc::now().timestamp());
        let err = verifier().verify(&raw).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
