use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error_response;
use crate::engine::AttendanceEngine;
use crate::engine::leave::LeaveAdjustment;
use crate::model::leave_request::{
    LeaveApplication, LeaveFilter, LeaveStatus, LeaveStatusChange, NewLeaveApplication,
};
use crate::model::student::AttendanceTotals;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewLeave {
    /// `approved` or `rejected`
    #[schema(example = "approved")]
    pub status: LeaveStatus,
    #[schema(example = "registrar")]
    pub reviewed_by: String,
    /// Defaults to the time the request is received
    #[schema(example = "2026-03-06T15:00:00Z", nullable = true)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeaveReviewResponse {
    pub application: LeaveApplication,
    pub adjustment: LeaveAdjustment,
    /// Student totals after the decision was applied
    pub totals: AttendanceTotals,
}

/* =========================
Create leave request
========================= */
/// Submit a leave application
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = NewLeaveApplication,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave request submitted", body = LeaveApplication),
        (status = 400, description = "Invalid date range or empty reason", body = Object, example = json!({
            "message": "invalid leave application: start_date cannot be after end_date"
        })),
        (status = 404, description = "Student not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<NewLeaveApplication>,
) -> actix_web::Result<impl Responder> {
    match engine.submit_leave(payload.into_inner(), Utc::now()).await {
        Ok(application) => Ok(HttpResponse::Ok().json(application)),
        Err(e) => Ok(error_response(e)),
    }
}

/* =========================
Get leave by id
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/{id}",
    params(
        ("id" = String, Path, description = "Leave application ID")
    ),
    responses(
        (status = 200, description = "Leave application", body = LeaveApplication),
        (status = 404, description = "Leave application not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    match engine.get_leave(&path.into_inner()).await {
        Ok(application) => Ok(HttpResponse::Ok().json(application)),
        Err(e) => Ok(error_response(e)),
    }
}

/* =========================
List leave requests
========================= */
/// List leave applications, newest first
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Leave applications", body = [LeaveApplication]),
        (status = 500, description = "Internal server error")
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    engine: web::Data<AttendanceEngine>,
    query: web::Query<LeaveFilter>,
) -> actix_web::Result<impl Responder> {
    match engine.list_leaves(&query.into_inner()).await {
        Ok(applications) => Ok(HttpResponse::Ok().json(applications)),
        Err(e) => Ok(error_response(e)),
    }
}

/* =========================
Review leave (Admin)
========================= */
/// Approve or reject a pending leave application
#[utoipa::path(
    put,
    path = "/api/admin/leave/{id}/status",
    params(
        ("id" = String, Path, description = "Leave application ID")
    ),
    request_body(content = ReviewLeave, content_type = "application/json"),
    responses(
        (status = 200, description = "Decision applied", body = LeaveReviewResponse),
        (status = 400, description = "Status must be approved or rejected"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Leave application not found"),
        (status = 409, description = "Already reviewed", body = Object, example = json!({
            "message": "leave application 0b7c5e0e-8d0e-4c55-a4a6-3f1f3b2f9a10 has already been reviewed"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn review_leave(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
    payload: web::Json<ReviewLeave>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let change = LeaveStatusChange {
        application_id: path.into_inner(),
        new_status: payload.status,
        reviewed_by: payload.reviewed_by,
        reviewed_at: payload.reviewed_at.unwrap_or_else(Utc::now),
    };

    match engine.review_leave(change).await {
        Ok(review) => Ok(HttpResponse::Ok().json(LeaveReviewResponse {
            totals: review.student.totals(),
            application: review.application,
            adjustment: review.adjustment,
        })),
        Err(e) => Ok(error_response(e)),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use serde_json::{Value, json};

    use crate::api::testing::{self, ADMIN_KEY, app, peer};
    use crate::model::student::NewStudent;

    #[actix_web::test]
    async fn submit_review_and_list() {
        let state = testing::state();
        state
            .engine
            .register_student(
                NewStudent {
                    student_id: "S1".into(),
                    name: "Ada".into(),
                    email: "ada@college.edu".into(),
                    department: "CS".into(),
                    year: 1,
                    phone_number: None,
                    scheduled_days: Some(10),
                },
                chrono::Utc::now(),
            )
            .await
            .unwrap();
        let app = app!(state);

        let bad = test::TestRequest::post()
            .uri("/api/leave")
            .peer_addr(peer())
            .set_json(json!({
                "student_id": "S1",
                "start_date": "2026-03-10",
                "end_date": "2026-03-09",
                "reason": "Medical"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, bad).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .peer_addr(peer())
            .set_json(json!({
                "student_id": "S1",
                "start_date": "2026-03-09",
                "end_date": "2026-03-11",
                "reason": "Medical"
            }))
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(created["status"], "pending");
        let id = created["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/leave?status=pending&student_id=S1")
            .peer_addr(peer())
            .to_request();
        let pending: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(pending.len(), 1);

        let review = |status: &str| {
            test::TestRequest::put()
                .uri(&format!("/api/admin/leave/{id}/status"))
                .peer_addr(peer())
                .insert_header(("Authorization", format!("Bearer {ADMIN_KEY}")))
                .set_json(json!({ "status": status, "reviewed_by": "registrar" }))
                .to_request()
        };

        let resp = test::call_service(&app, review("pending")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, review("approved")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["application"]["status"], "approved");
        assert_eq!(body["adjustment"]["recorded"], 3);
        assert_eq!(body["totals"]["total_days"], 7);

        let resp = test::call_service(&app, review("rejected")).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri(&format!("/api/leave/{id}"))
            .peer_addr(peer())
            .to_request();
        let stored: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stored["status"], "approved");
        assert_eq!(stored["reviewed_by"], "registrar");

        let req = test::TestRequest::get()
            .uri("/api/leave/missing")
            .peer_addr(peer())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
