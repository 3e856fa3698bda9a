use crate::{
    api::{attendance, leave_request, student, token},
    auth::middleware::admin_guard,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Built once and shared by every worker so quotas are process-wide.
#[derive(Clone)]
pub struct Limiters {
    scan: Limiter,
    public: Limiter,
    admin: Limiter,
}

impl Limiters {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            scan: Arc::new(build_limiter(config.rate_scan_per_min)?),
            public: Arc::new(build_limiter(config.rate_public_per_min)?),
            admin: Arc::new(build_limiter(config.rate_admin_per_min)?),
        })
    }
}

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> anyhow::Result<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {requests_per_min} per minute"))?;
    Ok(Governor::new(&cfg))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    // Admin routes; registered first so the public scope never shadows them
    cfg.service(
        web::scope(&format!("{}/admin", config.api_prefix))
            .wrap(from_fn(admin_guard))
            .wrap(limiters.admin.clone())
            .service(
                web::scope("/students")
                    // /admin/students
                    .service(
                        web::resource("")
                            .route(web::post().to(student::create_student))
                            .route(web::get().to(student::list_students)),
                    )
                    // /admin/students/{id}/recompute
                    .service(
                        web::resource("/{id}/recompute")
                            .route(web::post().to(student::recompute_student)),
                    ),
            )
            .service(web::resource("/records").route(web::get().to(attendance::records)))
            .service(web::resource("/analytics").route(web::get().to(student::analytics)))
            .service(
                web::resource("/leave/{id}/status")
                    .route(web::put().to(leave_request::review_leave)),
            )
            .service(web::resource("/tokens").route(web::post().to(token::issue_token)))
            .service(web::resource("/recompute").route(web::post().to(student::recompute_all))),
    );

    // Public routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(limiters.public.clone())
            .service(
                web::scope("/attendance")
                    // /attendance/scan
                    .service(
                        web::resource("/scan")
                            .wrap(limiters.scan.clone())
                            .route(web::post().to(attendance::scan)),
                    )
                    // /attendance/{student_id}
                    .service(web::resource("/{student_id}").route(web::get().to(attendance::history))),
            )
            .service(
                web::scope("/students")
                    // /students/{id}
                    .service(web::resource("/{id}").route(web::get().to(student::get_student)))
                    // /students/{id}/snapshot
                    .service(
                        web::resource("/{id}/snapshot").route(web::get().to(student::snapshot)),
                    ),
            )
            .service(
                web::scope("/leave")
                    // /leave
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::leave_list))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    // /leave/{id}
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave))),
            ),
    );
}
