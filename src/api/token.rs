use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::engine::AttendanceEngine;
use crate::engine::token::IssuedToken;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IssueTokenRequest {
    /// Room or gate the QR code is displayed at
    #[schema(example = "Hall A", nullable = true)]
    #[serde(default)]
    pub venue: Option<String>,
}

/// Mint a single-use QR token
#[utoipa::path(
    post,
    path = "/api/admin/tokens",
    request_body(content = IssueTokenRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Token issued", body = IssuedToken),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn issue_token(
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<IssueTokenRequest>,
) -> actix_web::Result<impl Responder> {
    let issued = engine
        .issue_token(Utc::now(), payload.into_inner().venue)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to sign attendance token");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(HttpResponse::Ok().json(issued))
}
