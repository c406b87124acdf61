use bcrypt::{hash, verify, DEFAULT_COST};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};

use super::jwt::{resolve_secret, SessionSigner, SESSION_TOKEN_TYPE};
use super::model::Claims;
use crate::config::{AppConfig, ConfigError};

/// Single shared password plus the session signer.
#[derive(Clone)]
pub struct AuthService {
    password_hash: String,
    signer: SessionSigner,
}

impl AuthService {
    pub fn new(password_hash: impl Into<String>, signer: SessionSigner) -> Self {
        Self {
            password_hash: password_hash.into(),
            signer,
        }
    }

    /// Use `APP_PASSWORD_HASH` when given, otherwise hash `APP_PASSWORD`.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let password_hash = match (&config.app_password_hash, &config.app_password) {
            (Some(password_hash), _) => password_hash.clone(),
            (None, Some(password)) => hash(password, DEFAULT_COST)?,
            (None, None) => return Err(ConfigError::Missing("APP_PASSWORD or APP_PASSWORD_HASH")),
        };
        let signer = SessionSigner::new(resolve_secret(config.session_secret.as_deref()));
        Ok(Self::new(password_hash, signer))
    }

    pub fn signer(&self) -> &SessionSigner {
        &self.signer
    }

    pub fn verify_password(&self, candidate: &str) -> bool {
        verify(candidate, &self.password_hash).unwrap_or(false)
    }

    /// Decode a token and make sure it is a session token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.signer.validate_token(token)?;
        if claims.token_type != SESSION_TOKEN_TYPE {
            return Err(ErrorKind::InvalidToken.into());
        }
        Ok(claims)
    }
}
