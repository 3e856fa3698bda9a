use actix_web::{HttpRequest, HttpResponse, Responder, http::header, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::{error_response, reject_status};
use crate::engine::network::TrustedAccessPoints;
use crate::engine::{AttendanceEngine, ReportFilter};
use crate::model::attendance::{AttendanceRecord, Coordinates, SessionLeg};
use crate::model::scan::{ScanEvent, ScanResult};

/// Drift between device and server clocks worth a log line.
const CLOCK_SKEW_WARN_SECS: i64 = 120;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScanRequest {
    #[schema(example = "CS-2024-001")]
    pub student_id: String,
    /// QR token shown at the venue
    pub token: String,
    #[schema(example = 40.7128)]
    pub latitude: f64,
    #[schema(example = -74.006)]
    pub longitude: f64,
    /// Device's own claim of being on the campus network
    #[schema(example = true, nullable = true)]
    pub trusted_network: Option<bool>,
    /// SSID or BSSID the device is connected to; decides trust when present
    #[schema(example = "CampusNet", nullable = true)]
    pub access_point: Option<String>,
    /// Requested leg; the only legal one is taken when omitted
    #[schema(example = "check-in", nullable = true)]
    pub session_type: Option<SessionLeg>,
    #[schema(nullable = true)]
    pub device_info: Option<String>,
    /// Device clock; informational, the server clock is authoritative
    #[schema(example = "2026-03-02T09:00:05Z", nullable = true)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// First date, inclusive
    #[schema(example = "2026-03-01", value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    /// Last date, inclusive
    #[schema(example = "2026-03-31", value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct RecordQuery {
    /// Filter by student ID
    #[schema(example = "CS-2024-001")]
    pub student_id: Option<String>,
    /// Filter by department
    #[schema(example = "Computer Science")]
    pub department: Option<String>,
    #[schema(example = "2026-03-01", value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[schema(example = "2026-03-31", value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

/* =========================
Scan
========================= */
/// Verify a QR scan and record a check-in or check-out
#[utoipa::path(
    post,
    path = "/api/attendance/scan",
    request_body(content = ScanRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Scan accepted", body = ScanResult),
        (status = 403, description = "Token, location or network check failed", body = ScanResult, example = json!({
            "accepted": false,
            "session_type": null,
            "attendance_percentage": 0,
            "reason": "GeofenceViolation"
        })),
        (status = 404, description = "Unknown student", body = ScanResult),
        (status = 409, description = "Session state conflict", body = ScanResult, example = json!({
            "accepted": false,
            "session_type": null,
            "attendance_percentage": 100,
            "reason": "SessionComplete"
        })),
        (status = 429, description = "Too many requests"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn scan(
    req: HttpRequest,
    engine: web::Data<AttendanceEngine>,
    access_points: web::Data<TrustedAccessPoints>,
    payload: web::Json<ScanRequest>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let received_at = Utc::now();

    if let Some(device_time) = payload.timestamp {
        let skew = (received_at - device_time).num_seconds();
        if skew.abs() > CLOCK_SKEW_WARN_SECS {
            tracing::debug!(student_id = %payload.student_id, skew, "Device clock drift");
        }
    }

    let device_info = payload.device_info.or_else(|| {
        req.headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let event = ScanEvent {
        trusted_network: access_points
            .signal(payload.access_point.as_deref(), payload.trusted_network),
        student_id: payload.student_id,
        token: payload.token,
        coordinates: Coordinates::new(payload.latitude, payload.longitude),
        timestamp: received_at,
        intent: payload.session_type,
        device_info,
    };

    let result = match engine.process_scan(event).await {
        Ok(result) => result,
        Err(e) => return Ok(error_response(e)),
    };

    Ok(scan_response(result))
}

fn scan_response(result: ScanResult) -> HttpResponse {
    match result.reason {
        Some(reason) if !result.accepted => HttpResponse::build(reject_status(reason)).json(result),
        _ => HttpResponse::Ok().json(result),
    }
}

/* =========================
History
========================= */
/// List one student's attendance records
#[utoipa::path(
    get,
    path = "/api/attendance/{student_id}",
    params(
        ("student_id" = String, Path, description = "Student ID"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "Records ordered by date", body = [AttendanceRecord]),
        (status = 404, description = "Student not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn history(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> actix_web::Result<impl Responder> {
    let student_id = path.into_inner();
    if let Err(e) = engine.get_student(&student_id).await {
        return Ok(error_response(e));
    }

    let query = query.into_inner();
    let filter = ReportFilter {
        student_id: Some(student_id),
        department: None,
        from: query.from,
        to: query.to,
    };

    match engine.report(&filter).await {
        Ok(records) => Ok(HttpResponse::Ok().json(records)),
        Err(e) => Ok(error_response(e)),
    }
}

/* =========================
Report (Admin)
========================= */
/// Attendance records across students
#[utoipa::path(
    get,
    path = "/api/admin/records",
    params(RecordQuery),
    responses(
        (status = 200, description = "Records ordered by date then student", body = [AttendanceRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn records(
    engine: web::Data<AttendanceEngine>,
    query: web::Query<RecordQuery>,
) -> actix_web::Result<impl Responder> {
    let query = query.into_inner();
    let filter = ReportFilter {
        student_id: query.student_id,
        department: query.department,
        from: query.from,
        to: query.to,
    };

    match engine.report(&filter).await {
        Ok(records) => Ok(HttpResponse::Ok().json(records)),
        Err(e) => Ok(error_response(e)),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use serde_json::{Value, json};

    use crate::api::testing::{self, ADMIN_KEY, app, peer};
    use crate::model::student::NewStudent;

    async fn seed_student(state: &testing::TestState, id: &str, department: &str) {
        state
            .engine
            .register_student(
                NewStudent {
                    student_id: id.into(),
                    name: "Ada".into(),
                    email: format!("{id}@college.edu"),
                    department: department.into(),
                    year: 1,
                    phone_number: None,
                    scheduled_days: None,
                },
                chrono::Utc::now(),
            )
            .await
            .unwrap();
    }

    fn fresh_token(state: &testing::TestState) -> String {
        state.engine.issue_token(chrono::Utc::now(), None).unwrap().token
    }

    fn scan_body(student_id: &str, token: &str, latitude: f64) -> Value {
        json!({
            "student_id": student_id,
            "token": token,
            "latitude": latitude,
            "longitude": -74.006,
            "access_point": "campusnet"
        })
    }

    #[actix_web::test]
    async fn scan_flow_maps_outcomes_to_status_codes() {
        let state = testing::state();
        seed_student(&state, "S1", "CS").await;
        let app = app!(state);

        let first = test::TestRequest::post()
            .uri("/api/attendance/scan")
            .peer_addr(peer())
            .set_json(scan_body("S1", &fresh_token(&state), 40.7128))
            .to_request();
        let resp = test::call_service(&app, first).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["accepted"], true);
        assert_eq!(body["session_type"], "check-in");
        assert_eq!(body["attendance_percentage"], 50);

        let wrong_leg = test::TestRequest::post()
            .uri("/api/attendance/scan")
            .peer_addr(peer())
            .set_json({
                let mut body = scan_body("S1", &fresh_token(&state), 40.7128);
                body["session_type"] = json!("check-in");
                body
            })
            .to_request();
        let resp = test::call_service(&app, wrong_leg).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["reason"], "AlreadyCheckedIn");
        assert_eq!(body["attendance_percentage"], 50);

        // ~0.5 km north
        let far = test::TestRequest::post()
            .uri("/api/attendance/scan")
            .peer_addr(peer())
            .set_json(scan_body("S1", &fresh_token(&state), 40.7173))
            .to_request();
        let resp = test::call_service(&app, far).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["reason"], "GeofenceViolation");

        let unknown = test::TestRequest::post()
            .uri("/api/attendance/scan")
            .peer_addr(peer())
            .set_json(scan_body("nobody", &fresh_token(&state), 40.7128))
            .to_request();
        let resp = test::call_service(&app, unknown).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn foreign_access_point_is_untrusted_even_if_device_claims_otherwise() {
        let state = testing::state();
        seed_student(&state, "S1", "CS").await;
        let app = app!(state);

        let mut body = scan_body("S1", &fresh_token(&state), 40.7128);
        body["access_point"] = json!("CoffeeShopWiFi");
        body["trusted_network"] = json!(true);

        let req = test::TestRequest::post()
            .uri("/api/attendance/scan")
            .peer_addr(peer())
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["reason"], "NetworkUntrusted");
    }

    #[actix_web::test]
    async fn history_and_admin_report() {
        let state = testing::state();
        seed_student(&state, "S1", "CS").await;
        seed_student(&state, "E1", "EE").await;
        let app = app!(state);

        for id in ["S1", "E1"] {
            let req = test::TestRequest::post()
                .uri("/api/attendance/scan")
                .peer_addr(peer())
                .set_json(scan_body(id, &fresh_token(&state), 40.7128))
                .to_request();
            assert!(test::call_service(&app, req).await.status().is_success());
        }

        let req = test::TestRequest::get()
            .uri("/api/attendance/S1")
            .peer_addr(peer())
            .to_request();
        let history: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["student_id"], "S1");

        let req = test::TestRequest::get()
            .uri("/api/attendance/ghost")
            .peer_addr(peer())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/admin/records?department=EE")
            .peer_addr(peer())
            .insert_header(("Authorization", format!("Bearer {ADMIN_KEY}")))
            .to_request();
        let report: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report.len(), 1);
        assert_eq!(report[0]["student_id"], "E1");

        let req = test::TestRequest::get()
            .uri("/api/admin/records")
            .peer_addr(peer())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }
}
