use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::middleware::{validate_request_token, SESSION_COOKIE};
use super::model::{LoginRequest, SessionStatus, TokenResponse};
use crate::AppState;

fn session_cookie(token: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::seconds(max_age_seconds))
        .finish()
}

/// Login endpoint
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid password", body = crate::ErrorResponse)
    )
)]
pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    if !state.auth.verify_password(&body.password) {
        log::warn!("Rejected login attempt with an invalid password");
        return HttpResponse::Unauthorized().json(crate::ErrorResponse::new(
            "Unauthorized",
            "Invalid password",
        ));
    }

    let signer = state.auth.signer();
    let token = match signer.generate_session_token() {
        Ok(t) => t,
        Err(e) => {
            log::error!("Failed to generate session token: {:?}", e);
            return HttpResponse::InternalServerError().json(crate::ErrorResponse::internal_error(
                "Failed to generate token",
            ));
        }
    };

    log::info!("Session started");
    HttpResponse::Ok()
        .cookie(session_cookie(
            token.clone(),
            signer.expiry_seconds(),
            state.config.cookie_secure,
        ))
        .json(TokenResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: signer.expiry_seconds(),
        })
}

/// Logout endpoint, clears the session cookie
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Authentication",
    responses(
        (status = 200, description = "Session cookie cleared", body = SessionStatus)
    )
)]
pub async fn logout() -> impl Responder {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(SessionStatus {
            authenticated: false,
        })
}

/// Report whether the request carries a valid session
#[utoipa::path(
    get,
    path = "/api/auth/session",
    tag = "Authentication",
    responses(
        (status = 200, description = "Session status", body = SessionStatus)
    )
)]
pub async fn session(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    let authenticated = validate_request_token(&req, &state.auth).is_ok();
    HttpResponse::Ok().json(SessionStatus { authenticated })
}

/// Configure auth routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/session", web::get().to(session)),
    );
}
