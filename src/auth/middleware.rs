use actix_web::middleware::Next;
use actix_web::{
    Error, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::config::Config;

/// Admin routes require `Authorization: Bearer <ADMIN_API_KEY>`.
pub async fn admin_guard(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let header_value = match req.headers().get("Authorization") {
        Some(h) => h.to_str().map_err(|_| {
            actix_web::error::ErrorUnauthorized(
                json!({"error": "Invalid Authorization header encoding"}),
            )
        })?,
        None => {
            let resp =
                HttpResponse::Unauthorized().json(json!({"error": "Missing Authorization header"}));
            return Ok(req.into_response(resp.map_into_boxed_body()));
        }
    };

    let key = match header_value.strip_prefix("Bearer ") {
        Some(k) => k.trim(),
        None => {
            let resp = HttpResponse::Unauthorized()
                .json(json!({"error": "Authorization header must start with Bearer"}));
            return Ok(req.into_response(resp.map_into_boxed_body()));
        }
    };

    if !keys_match(key, &config.admin_api_key) {
        tracing::warn!(path = %req.path(), "Rejected admin request with wrong API key");
        let resp = HttpResponse::Unauthorized().json(json!({"error": "Invalid API key"}));
        return Ok(req.into_response(resp.map_into_boxed_body()));
    }

    next.call(req).await
}

fn keys_match(given: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(given.as_bytes().ct_eq(expected.as_bytes()))
}
