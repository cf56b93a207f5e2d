use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::core::errors::{AppError, AppResult};
use crate::security::hmac_sha256;
use crate::security::init_data::TelegramUser;

const SESSION_TOKEN_SALT: &[u8] = b"SessionToken";
const TOKEN_VERSION: &str = "v1";
const SESSION_TTL_SECONDS: i64 = 3600;

/// Claims envelope carried inside a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub ver: String,
    pub sub: i64,
    pub user: TelegramUser,
    #[serde(rename = "authDate")]
    pub auth_date: i64,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and verifies self-contained session tokens of the form
/// `base64url(claims) + "." + base64url(signature)`. The signing key is
/// derived from the bot token, so rotating the bot token invalidates every
/// outstanding session.
#[derive(Debug, Clone)]
pub struct SessionSigner {
    secret: [u8; 32],
    ttl_seconds: i64,
}

fn forbidden(message: &str) -> AppError {
    AppError::Forbidden(message.to_string())
}

impl SessionSigner {
    pub fn new(bot_token: &str) -> Self {
        Self {
            secret: hmac_sha256(SESSION_TOKEN_SALT, bot_token.as_bytes()),
            ttl_seconds: SESSION_TTL_SECONDS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    fn sign(&self, encoded: &str) -> String {
        URL_SAFE_NO_PAD.encode(hmac_sha256(&self.secret, encoded.as_bytes()))
    }

    /// Issue a token for a verified identity. Pure apart from the wall clock.
    pub fn issue(&self, user: &TelegramUser, auth_date: i64) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            ver: TOKEN_VERSION.to_string(),
            sub: user.id,
            user: user.clone(),
            auth_date,
            iat: now,
            exp: now + self.ttl_seconds,
        };
        let json = serde_json::to_vec(&claims)
            .map_err(|_| AppError::Internal("failed to encode session token".into()))?;
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let signature = self.sign(&encoded);
        Ok(format!("{encoded}.{signature}"))
    }

    /// Verify a presented token. Fails closed: any decode or parse problem
    /// maps to the same `Forbidden` as a bad signature.
    pub fn verify(&self, token: &str) -> AppResult<SessionClaims> {
        let (encoded, signature) = token
            .split_once('.')
            .ok_or_else(|| forbidden("auth token format is invalid"))?;
        if encoded.is_empty() || signature.is_empty() {
            return Err(forbidden("auth token format is invalid"));
        }

        let expected = self.sign(encoded);
        if signature.len() != expected.len()
            || signature
                .as_bytes()
                .ct_eq(expected.as_bytes())
                .unwrap_u8()
                != 1
        {
            return Err(forbidden("auth token signature mismatch"));
        }

        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| forbidden("auth token is invalid"))?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| forbidden("auth token is invalid"))?;

        if claims.ver != TOKEN_VERSION {
            return Err(forbidden("auth token version mismatch"));
        }
        if claims.sub != claims.user.id {
            return Err(forbidden("auth token payload is invalid"));
        }
        if claims.exp <= Utc::now().timestamp() {
            return Err(forbidden("auth token expired"));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "12345:test-bot-token";

    fn user() -> TelegramUser {
        TelegramUser {
            id: 7,
            first_name: Some("Ada".into()),
            last_name: None,
            username: Some("ada".into()),
            language_code: None,
            is_premium: None,
            allows_write_to_pm: None,
            photo_url: None,
        }
    }

    #[test]
    fn issue_then_verify_round_trips() {
        let signer = SessionSigner::new(BOT_TOKEN);
        let token = signer.issue(&user(), 1_700_000_000).unwrap();
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.user, user());
        assert_eq!(claims.auth_date, 1_700_000_000);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = SessionSigner::new(BOT_TOKEN).with_ttl(0);
        let token = signer.issue(&user(), 1_700_000_000).unwrap();
        let err = signer.verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn tampering_with_the_payload_segment_fails() {
        let signer = SessionSigner::new(BOT_TOKEN);
        let token = signer.issue(&user(), 1_700_000_000).unwrap();
        let (encoded, signature) = token.split_once('.').unwrap();
        let mut bytes = encoded.as_bytes().to_vec();
        bytes[0] = if bytes[0] == b'A' { b'B' } else { b'A' };
        let tampered = format!("{}.{signature}", String::from_utf8(bytes).unwrap());
        assert!(signer.verify(&tampered).is_err());
    }

    #[test]
    fn tampering_with_the_signature_segment_fails() {
        let signer = SessionSigner::new(BOT_TOKEN);
        let token = signer.issue(&user(), 1_700_000_000).unwrap();
        let (encoded, signature) = token.split_once('.').unwrap();
        let mut bytes = signature.as_bytes().to_vec();
        bytes[0] = if bytes[0] == b'A' { b'B' } else { b'A' };
        let tampered = format!("{encoded}.{}", String::from_utf8(bytes).unwrap());
        assert!(signer.verify(&tampered).is_err());
    }

    #[test]
    fn token_from_another_bot_token_is_rejected() {
        let token = SessionSigner::new("999:other")
            .issue(&user(), 1_700_000_000)
            .unwrap();
        assert!(SessionSigner::new(BOT_TOKEN).verify(&token).is_err());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let signer = SessionSigner::new(BOT_TOKEN);
        assert!(signer.verify("").is_err());
        assert!(signer.verify("no-dot").is_err());
        assert!(signer.verify(".sig").is_err());
        assert!(signer.verify("payload.").is_err());
        assert!(signer.verify("!!!.!!!").is_err());
    }

    #[test]
    fn sub_must_match_the_embedded_user_id() {
        let signer = SessionSigner::new(BOT_TOKEN);
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            ver: TOKEN_VERSION.to_string(),
            sub: 8,
            user: user(),
            auth_date: now,
            iat: now,
            exp: now + 3600,
        };
        let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{encoded}.{}", signer.sign(&encoded));
        let err = signer.verify(&forged).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
