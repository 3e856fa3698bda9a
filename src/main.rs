use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod engine;
mod model;
mod repository;
mod routes;

use config::Config;
use db::init_db;
use engine::AttendanceEngine;
use repository::{MemoryRepository, MySqlRepository, Repository};
use routes::Limiters;

use crate::docs::ApiDoc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Smart Attendance"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "attendance.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!("Server starting...");

    let repo: Arc<dyn Repository> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = init_db(url).await?;
            info!("Using MySQL repository");
            Arc::new(MySqlRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, attendance is kept in memory only");
            Arc::new(MemoryRepository::new())
        }
    };

    let engine = Data::new(AttendanceEngine::new(repo, config.engine_settings()?));
    let access_points = Data::new(config.access_points());
    let limiters = Limiters::from_config(&config)?;

    info!(
        campus_lat = config.campus_latitude,
        campus_lon = config.campus_longitude,
        radius_m = config.campus_radius_meters,
        token_ttl_secs = config.token_ttl_secs,
        "Attendance engine ready"
    );

    if config.recompute_interval_secs > 0 {
        let engine = engine.clone();
        let every = Duration::from_secs(config.recompute_interval_secs);
        actix_web::rt::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = engine.recompute_all().await {
                    error!(error = %e, "Periodic recompute failed");
                }
            }
        });
    }

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    HttpServer::new(move || {
        let config = config_data.get_ref().clone();
        let limiters = limiters.clone();
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config_data.clone())
            .app_data(engine.clone())
            .app_data(access_points.clone())
            .service(index)
            .configure(move |cfg| routes::configure(cfg, &config, &limiters))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
