use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Login request payload
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub password: String,
}

/// Session token issued after a successful login
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    pub exp: usize,         // expiration time
    pub iat: usize,         // issued at
    pub token_type: String, // always "session"
}

/// Session status response
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStatus {
    pub authenticated: bool,
}
