use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;
use serde_json::json;

use super::error_response;
use crate::engine::AttendanceEngine;
use crate::engine::aggregator::{AggregateSnapshot, CohortSummary};
use crate::model::student::{NewStudent, Student, StudentFilter};

/* =========================
Register student (Admin)
========================= */
#[utoipa::path(
    post,
    path = "/api/admin/students",
    request_body(content = NewStudent, content_type = "application/json"),
    responses(
        (status = 200, description = "Student registered", body = Student),
        (status = 400, description = "Missing student_id or name"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Student already registered"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn create_student(
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<NewStudent>,
) -> actix_web::Result<impl Responder> {
    match engine.register_student(payload.into_inner(), Utc::now()).await {
        Ok(student) => Ok(HttpResponse::Ok().json(student)),
        Err(e) => Ok(error_response(e)),
    }
}

/* =========================
List students (Admin)
========================= */
#[utoipa::path(
    get,
    path = "/api/admin/students",
    params(StudentFilter),
    responses(
        (status = 200, description = "Registered students", body = [Student]),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn list_students(
    engine: web::Data<AttendanceEngine>,
    query: web::Query<StudentFilter>,
) -> actix_web::Result<impl Responder> {
    match engine.list_students(&query.into_inner()).await {
        Ok(students) => Ok(HttpResponse::Ok().json(students)),
        Err(e) => Ok(error_response(e)),
    }
}

/* =========================
Get student by id
========================= */
#[utoipa::path(
    get,
    path = "/api/students/{id}",
    params(
        ("id" = String, Path, description = "Student ID")
    ),
    responses(
        (status = 200, description = "Student with stored totals", body = Student),
        (status = 404, description = "Student not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Students"
)]
pub async fn get_student(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    match engine.get_student(&path.into_inner()).await {
        Ok(student) => Ok(HttpResponse::Ok().json(student)),
        Err(e) => Ok(error_response(e)),
    }
}

/* =========================
Snapshot
========================= */
/// Totals derived fresh from records and approved leave
#[utoipa::path(
    get,
    path = "/api/students/{id}/snapshot",
    params(
        ("id" = String, Path, description = "Student ID")
    ),
    responses(
        (status = 200, description = "Current standing", body = AggregateSnapshot),
        (status = 404, description = "Student not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Students"
)]
pub async fn snapshot(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    match engine.snapshot(&path.into_inner(), Utc::now()).await {
        Ok(snapshot) => Ok(HttpResponse::Ok().json(snapshot)),
        Err(e) => Ok(error_response(e)),
    }
}

/* =========================
Analytics (Admin)
========================= */
/// Cohort averages and the last seven days of record counts
#[utoipa::path(
    get,
    path = "/api/admin/analytics",
    params(StudentFilter),
    responses(
        (status = 200, description = "Dashboard figures", body = CohortSummary),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn analytics(
    engine: web::Data<AttendanceEngine>,
    query: web::Query<StudentFilter>,
) -> actix_web::Result<impl Responder> {
    match engine.cohort(query.into_inner().department, Utc::now()).await {
        Ok(summary) => Ok(HttpResponse::Ok().json(summary)),
        Err(e) => Ok(error_response(e)),
    }
}

/* =========================
Recompute (Admin)
========================= */
#[utoipa::path(
    post,
    path = "/api/admin/students/{id}/recompute",
    params(
        ("id" = String, Path, description = "Student ID")
    ),
    responses(
        (status = 200, description = "Stored totals rebuilt", body = Student),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Student not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn recompute_student(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    match engine.recompute_student(&path.into_inner()).await {
        Ok(student) => Ok(HttpResponse::Ok().json(student)),
        Err(e) => Ok(error_response(e)),
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/recompute",
    responses(
        (status = 200, description = "Totals rebuilt for every student", body = Object, example = json!({
            "recomputed": 120
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn recompute_all(engine: web::Data<AttendanceEngine>) -> actix_web::Result<impl Responder> {
    match engine.recompute_all().await {
        Ok(count) => Ok(HttpResponse::Ok().json(json!({ "recomputed": count }))),
        Err(e) => Ok(error_response(e)),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use serde_json::{Value, json};

    use crate::api::testing::{self, ADMIN_KEY, app, peer};

    fn admin(req: test::TestRequest) -> test::TestRequest {
        req.peer_addr(peer())
            .insert_header(("Authorization", format!("Bearer {ADMIN_KEY}")))
    }

    #[actix_web::test]
    async fn register_fetch_and_snapshot() {
        let state = testing::state();
        let app = app!(state);

        let profile = json!({
            "student_id": "CS-1",
            "name": "Ada Lovelace",
            "email": "Ada@College.edu",
            "department": "CS",
            "year": 2
        });

        let req = admin(test::TestRequest::post().uri("/api/admin/students"))
            .set_json(&profile)
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(created["email"], "ada@college.edu");
        assert_eq!(created["scheduled_days"], 20);
        assert_eq!(created["total_days"], 20);

        let req = admin(test::TestRequest::post().uri("/api/admin/students"))
            .set_json(&profile)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri("/api/students/CS-1")
            .peer_addr(peer())
            .to_request();
        let student: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(student["name"], "Ada Lovelace");

        let req = test::TestRequest::get()
            .uri("/api/students/CS-1/snapshot")
            .peer_addr(peer())
            .to_request();
        let snapshot: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(snapshot["total_attendance"], 0);
        assert_eq!(snapshot["standing"], "danger");
        assert_eq!(snapshot["records"], json!([]));
        assert_eq!(snapshot["days_to_threshold"], 15);
        assert_eq!(snapshot["days_attended_last_7"], 0);

        let req = admin(test::TestRequest::get().uri("/api/admin/analytics")).to_request();
        let summary: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary["total_students"], 1);
        assert_eq!(summary["average_attendance"], 0);
        assert_eq!(summary["below_threshold"], 1);
        assert_eq!(summary["daily_records"].as_array().map(Vec::len), Some(7));

        let req = admin(test::TestRequest::get().uri("/api/admin/analytics?department=EE")).to_request();
        let summary: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary["total_students"], 0);

        let req = admin(test::TestRequest::get().uri("/api/admin/students?department=EE")).to_request();
        let none: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert!(none.is_empty());

        let req = admin(test::TestRequest::post().uri("/api/admin/recompute")).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["recomputed"], 1);

        let req = admin(test::TestRequest::post().uri("/api/admin/students/ghost/recompute")).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn admin_routes_need_the_api_key() {
        let state = testing::state();
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/api/admin/students")
            .peer_addr(peer())
            .insert_header(("Authorization", "Bearer wrong"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/admin/students")
            .peer_addr(peer())
            .insert_header(("Authorization", ADMIN_KEY))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }
}
