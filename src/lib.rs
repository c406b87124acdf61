use actix_cors::Cors;
use actix_files::Files;
use actix_web::middleware::Compress;
use actix_web::{error, http::header, web, App, HttpResponse, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use serde::{Deserialize, Serialize};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod config;
pub mod inspection;
pub mod report;
pub mod state;
pub mod storage;

pub use crate::config::AppConfig;
pub use crate::state::AppState;

use crate::config::StorageBackend;
use crate::inspection::validation::{ValidationError, ValidationErrors};

/// Six base64 photos plus the form fit comfortably.
pub const JSON_LIMIT_BYTES: usize = 25 * 1024 * 1024;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationError>>,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: None,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("InternalServerError", message)
    }

    pub fn validation(errors: ValidationErrors) -> Self {
        let mut response = Self::new("ValidationError", &errors.summary());
        response.details = Some(errors.into_errors());
        response
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::logout,
        crate::auth::handlers::session,
        crate::inspection::handlers::generate_report
    ),
    components(
        schemas(
            inspection::model::InspectionRecord,
            inspection::model::InspectionNotes,
            inspection::model::BatteryRecord,
            inspection::model::DownloadLinks,
            report::GenerateReportResponse,
            auth::model::LoginRequest,
            auth::model::TokenResponse,
            auth::model::SessionStatus,
            ValidationError,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Shared-password session endpoints."),
        (name = "Reports", description = "Inspection report generation.")
    ),
    servers(
        (url = "http://127.0.0.1:8080", description = "Localhost server")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// JSON extractor settings: body limit and `ErrorResponse` for bad payloads.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT_BYTES)
        .error_handler(|err, _req| {
            let message = err.to_string();
            log::warn!("Rejected request body: {}", message);
            let response = HttpResponse::BadRequest().json(ErrorResponse::bad_request(&message));
            error::InternalError::from_response(err, response).into()
        })
}

/// Routes mounted under `/api`.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.configure(auth::handlers::config)
        .configure(inspection::handlers::config);
}

pub async fn run() -> std::io::Result<()> {
    dotenvy::dotenv().ok(); // Load .env file
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    log::debug!("Loaded {:?}", config);

    let app_state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to initialise application state: {}", e);
            std::process::exit(1);
        }
    };
    let config = app_state.config.clone();
    let app_state = web::Data::new(app_state);

    let prometheus = PrometheusMetricsBuilder::new("drone_inspection_server")
        .endpoint("/metrics")
        .build()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    log::info!("Starting server at http://{}:{}", config.host, config.port);

    let bind_address = (config.host.clone(), config.port);
    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .supports_credentials()
            .max_age(3600);
        for origin in &config.allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        let mut app = App::new()
            .wrap(Compress::default())
            .wrap(prometheus.clone())
            .wrap(cors)
            .app_data(app_state.clone())
            .app_data(json_config())
            .service(web::scope("/api").configure(configure_api))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            );

        if config.storage_backend == StorageBackend::Local {
            if let Some(mount) = config.served_output_path() {
                app = app.service(Files::new(mount, &config.output_dir));
            }
        }
        app
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind(bind_address)?
    .run()
    .await
}
