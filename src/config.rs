use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::FixedOffset;
use dotenvy::dotenv;

use crate::engine::EngineSettings;
use crate::engine::geofence::Geofence;
use crate::engine::network::TrustedAccessPoints;
use crate::model::attendance::Coordinates;

/// Longest QR token lifetime accepted from the environment.
pub const MAX_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct Config {
    pub server_addr: String,
    /// Absent means the in-memory repository.
    pub database_url: Option<String>,
    pub token_secret: String,
    pub token_ttl_secs: u64,

    pub campus_latitude: f64,
    pub campus_longitude: f64,
    pub campus_radius_meters: f64,
    pub campus_utc_offset_minutes: i32,
    pub trusted_access_points: Vec<String>,
    pub default_scheduled_days: u32,

    pub admin_api_key: String,

    // Rate limiting
    pub rate_scan_per_min: u32,
    pub rate_public_per_min: u32,
    pub rate_admin_per_min: u32,

    /// 0 disables the periodic recompute.
    pub recompute_interval_secs: u64,
    pub api_prefix: String,
    pub log_level: tracing::Level,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            token_secret: required("ATTENDANCE_TOKEN_SECRET")?,
            token_ttl_secs: parse_or("ATTENDANCE_TOKEN_TTL_SECS", 60)?,

            campus_latitude: parse_required("CAMPUS_LATITUDE")?,
            campus_longitude: parse_required("CAMPUS_LONGITUDE")?,
            campus_radius_meters: parse_or("CAMPUS_RADIUS_METERS", 100.0)?,
            campus_utc_offset_minutes: parse_or("CAMPUS_UTC_OFFSET_MINUTES", 0)?,
            trusted_access_points: env::var("TRUSTED_ACCESS_POINTS")
                .map(|list| list.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            default_scheduled_days: parse_or("DEFAULT_SCHEDULED_DAYS", 20)?,

            admin_api_key: required("ADMIN_API_KEY")?,

            rate_scan_per_min: parse_or("RATE_SCAN_PER_MIN", 120)?,
            rate_public_per_min: parse_or("RATE_PUBLIC_PER_MIN", 600)?,
            rate_admin_per_min: parse_or("RATE_ADMIN_PER_MIN", 300)?,

            recompute_interval_secs: parse_or("RECOMPUTE_INTERVAL_SECS", 3600)?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_level: parse_or("LOG_LEVEL", tracing::Level::DEBUG)?,
        })
    }

    pub fn engine_settings(&self) -> anyhow::Result<EngineSettings> {
        if !(self.campus_radius_meters.is_finite() && self.campus_radius_meters >= 0.0) {
            return Err(anyhow!("CAMPUS_RADIUS_METERS must be a non-negative number"));
        }
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&self.token_ttl_secs) {
            return Err(anyhow!(
                "ATTENDANCE_TOKEN_TTL_SECS must be between 1 and {MAX_TOKEN_TTL_SECS}"
            ));
        }
        let utc_offset = self
            .campus_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| anyhow!("CAMPUS_UTC_OFFSET_MINUTES is out of range"))?;

        Ok(EngineSettings {
            campus: Geofence::new(
                Coordinates::new(self.campus_latitude, self.campus_longitude),
                self.campus_radius_meters,
            ),
            utc_offset,
            default_scheduled_days: self.default_scheduled_days,
            token_secret: self.token_secret.clone(),
            token_ttl: Duration::from_secs(self.token_ttl_secs),
        })
    }

    pub fn access_points(&self) -> TrustedAccessPoints {
        TrustedAccessPoints::new(&self.trusted_access_points)
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("{name} must be set"))
}

fn parse_required<T>(name: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(name)?;
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("{name}={raw:?} is invalid: {e}"))
}

fn parse_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{name}={raw:?} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}
