use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::model::InspectionRecord;
use super::validation::validate_record;
use crate::auth::validate_request_token;
use crate::report::{GenerateReportResponse, ReportError};
use crate::{AppState, ErrorResponse, JSON_LIMIT_BYTES};

/// Generate the Word report and the Excel service sheet for one inspection
#[utoipa::path(
    post,
    path = "/api/reports",
    tag = "Reports",
    request_body = InspectionRecord,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Both documents generated", body = GenerateReportResponse),
        (status = 400, description = "Form failed validation", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 422, description = "A required field was missing at merge time", body = GenerateReportResponse),
        (status = 500, description = "Generation or publishing failed", body = GenerateReportResponse)
    )
)]
pub async fn generate_report(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> impl Responder {
    if let Err(e) = validate_request_token(&req, &state.auth) {
        return e.error_response();
    }

    // Decoded after the session check: an anonymous caller always gets 401.
    let record: InspectionRecord = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(e) => {
            log::warn!("Rejected request body: {}", e);
            return HttpResponse::BadRequest()
                .json(ErrorResponse::bad_request(&format!("Json deserialize error: {}", e)));
        }
    };
    if let Err(errors) = validate_record(&record) {
        log::warn!("Rejected inspection form: {}", errors.summary());
        return HttpResponse::BadRequest().json(ErrorResponse::validation(errors));
    }

    log::info!(
        "Report requested for drone {} ({} images, batteries: {})",
        record.drone_name,
        record.images.len(),
        record.reported_batteries().len()
    );

    let result = state
        .generator
        .generate_report(Arc::new(record), state.storage.as_ref())
        .await;
    let response = GenerateReportResponse::from(&result);

    match result {
        Ok(_) => HttpResponse::Ok().json(response),
        Err(e @ ReportError::ValidationGap { .. }) => {
            log::warn!("Report generation stopped: {}", e);
            HttpResponse::UnprocessableEntity().json(response)
        }
        Err(e) => {
            log::error!("Report generation failed: {}", e);
            HttpResponse::InternalServerError().json(response)
        }
    }
}

/// Configure report routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/reports")
            .app_data(web::PayloadConfig::new(JSON_LIMIT_BYTES))
            .route(web::post().to(generate_report)),
    );
}
