use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use super::model::Claims;

const DEFAULT_SESSION_SECRET: &str = "drone-inspection-session-secret-change-in-production";
pub const SESSION_EXPIRY_SECONDS: i64 = 24 * 60 * 60; // 24 hours
pub const SESSION_TOKEN_TYPE: &str = "session";
const SESSION_SUBJECT: &str = "inspector";

/// Use the configured secret, or fall back to the development one.
pub fn resolve_secret(configured: Option<&str>) -> String {
    match configured {
        Some(secret) if !secret.trim().is_empty() => secret.to_string(),
        _ => {
            log::warn!("SESSION_SECRET not set, using default secret. SET THIS IN PRODUCTION!");
            DEFAULT_SESSION_SECRET.to_string()
        }
    }
}

/// Signs and verifies HS256 session tokens.
#[derive(Clone)]
pub struct SessionSigner {
    secret: String,
    expiry_seconds: i64,
}

impl SessionSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expiry_seconds: SESSION_EXPIRY_SECONDS,
        }
    }

    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_seconds
    }

    /// Generate a session token
    pub fn generate_session_token(&self) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: SESSION_SUBJECT.to_string(),
            exp: now + self.expiry_seconds as usize,
            iat: now,
            token_type: SESSION_TOKEN_TYPE.to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}
