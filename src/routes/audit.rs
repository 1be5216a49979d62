//! Audit routes: run an audit and return the report as a download.

use axum::{
    extract::{rejection::FormRejection, rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Form, Json,
};

use crate::errors::AppError;
use crate::models::request::AuditRequest;
use crate::services::audit as audit_service;
use crate::services::report::Document;
use crate::AppState;

/// POST /audit, POST /audit_database (with or without a trailing slash):
/// form-encoded audit request.
#[axum::debug_handler]
pub async fn submit_form(
    State(state): State<AppState>,
    form: Result<Form<AuditRequest>, FormRejection>,
) -> Result<Response, AppError> {
    let Form(request) = form.map_err(|e| AppError::Validation(e.body_text()))?;
    let document = audit_service::execute(&state, request).await?;
    Ok(attachment(document))
}

/// POST /api/v1/audits: JSON audit request.
#[axum::debug_handler]
pub async fn submit_json(
    State(state): State<AppState>,
    body: Result<Json<AuditRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let document = audit_service::execute(&state, request).await?;
    Ok(attachment(document))
}

fn attachment(document: Document) -> Response {
    (
        [
            (header::CONTENT_TYPE, document.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.filename),
            ),
        ],
        document.bytes,
    )
        .into_response()
}
