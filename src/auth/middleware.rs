use actix_web::error::ErrorUnauthorized;
use actix_web::{Error, HttpRequest};

use super::model::Claims;
use super::service::AuthService;

pub const SESSION_COOKIE: &str = "session";

/// Extract token from the Authorization header, falling back to the
/// session cookie set at login
fn extract_token(req: &HttpRequest) -> Option<String> {
    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        req.cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Validate token from HttpRequest and return claims
pub fn validate_request_token(req: &HttpRequest, auth: &AuthService) -> Result<Claims, Error> {
    let token =
        extract_token(req).ok_or_else(|| ErrorUnauthorized("Missing session token"))?;

    let claims = auth.validate_token(&token).map_err(|e| {
        log::warn!("Session validation failed: {:?}", e);
        ErrorUnauthorized("Invalid or expired session")
    })?;

    Ok(claims)
}
