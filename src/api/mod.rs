pub mod attendance;
pub mod leave_request;
pub mod student;
pub mod token;

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde_json::json;

use crate::engine::error::{EngineError, Reject};

/// Status code for a refused scan.
pub(crate) fn reject_status(reason: Reject) -> StatusCode {
    match reason {
        Reject::StudentNotFound => StatusCode::NOT_FOUND,
        r if r.is_conflict() => StatusCode::CONFLICT,
        _ => StatusCode::FORBIDDEN,
    }
}

/// Turns an engine failure into the response the client sees. Repository
/// failures are logged here and never leak details.
pub(crate) fn error_response(e: EngineError) -> HttpResponse {
    let status = match &e {
        EngineError::Rejected(reason) => reject_status(*reason),
        EngineError::StudentNotFound(_) | EngineError::LeaveNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::StudentExists(_) | EngineError::LeaveAlreadyReviewed(_) => StatusCode::CONFLICT,
        EngineError::InvalidStudent(_)
        | EngineError::InvalidLeaveRange(_)
        | EngineError::InvalidLeaveStatus => StatusCode::BAD_REQUEST,
        EngineError::Repository(err) => {
            tracing::error!(error = %err, "Repository failure");
            return HttpResponse::InternalServerError().json(json!({
                "message": "Internal Server Error"
            }));
        }
    };

    HttpResponse::build(status).json(json!({ "message": e.to_string() }))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use actix_web::web::Data;

    use crate::config::Config;
    use crate::engine::AttendanceEngine;
    use crate::engine::network::TrustedAccessPoints;
    use crate::repository::MemoryRepository;
    use crate::routes::Limiters;

    pub const ADMIN_KEY: &str = "admin-test-key";

    pub fn config() -> Config {
        Config {
            server_addr: "127.0.0.1:0".into(),
            database_url: None,
            token_secret: "test-secret".into(),
            token_ttl_secs: 60,
            campus_latitude: 40.7128,
            campus_longitude: -74.006,
            campus_radius_meters: 100.0,
            campus_utc_offset_minutes: 0,
            trusted_access_points: vec!["CampusNet".into()],
            default_scheduled_days: 20,
            admin_api_key: ADMIN_KEY.into(),
            rate_scan_per_min: 1000,
            rate_public_per_min: 1000,
            rate_admin_per_min: 1000,
            recompute_interval_secs: 0,
            api_prefix: "/api".into(),
            log_level: tracing::Level::DEBUG,
        }
    }

    pub struct TestState {
        pub config: Data<Config>,
        pub engine: Data<AttendanceEngine>,
        pub access_points: Data<TrustedAccessPoints>,
        pub limiters: Limiters,
    }

    pub fn state() -> TestState {
        let config = config();
        let engine = AttendanceEngine::new(
            Arc::new(MemoryRepository::new()),
            config.engine_settings().unwrap(),
        );
        TestState {
            access_points: Data::new(config.access_points()),
            limiters: Limiters::from_config(&config).unwrap(),
            engine: Data::new(engine),
            config: Data::new(config),
        }
    }

    /// Builds the full app the way `main` does, against the in-memory repository.
    macro_rules! app {
        ($state:expr) => {{
            let state = &$state;
            let config = state.config.get_ref().clone();
            let limiters = state.limiters.clone();
            actix_web::test::init_service(
                actix_web::App::new()
                    .app_data(state.config.clone())
                    .app_data(state.engine.clone())
                    .app_data(state.access_points.clone())
                    .configure(move |cfg| crate::routes::configure(cfg, &config, &limiters)),
            )
            .await
        }};
    }
    pub(crate) use app;

    pub fn peer() -> std::net::SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }
}
