//! Signed, time-boxed, single-use attendance tokens (the QR payload).

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::Reject;

const TOKEN_SUBJECT: &str = "attendance";

/// Extra time a consumed nonce is remembered past the token lifetime.
const REPLAY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceClaims {
    pub sub: String,
    /// Single-use nonce.
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssuedToken {
    pub token: String,
    #[schema(example = "2026-03-02T09:01:00Z")]
    pub expires_at: DateTime<Utc>,
}

pub struct TokenValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    /// jti -> () for every redeemed token.
    consumed: Cache<String, ()>,
}

impl TokenValidator {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        // No capacity bound: a consumed nonce must outlive its token.
        let consumed = Cache::builder()
            .time_to_live(ttl.saturating_mul(2).saturating_add(REPLAY_MARGIN))
            .build();

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            consumed,
        }
    }

    /// Mints a fresh token valid from `now` for the configured ttl.
    pub fn issue(
        &self,
        now: DateTime<Utc>,
        venue: Option<String>,
    ) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
        let iat = now.timestamp();
        let exp = iat + self.ttl.as_secs() as i64;
        let claims = AttendanceClaims {
            sub: TOKEN_SUBJECT.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat,
            nbf: iat,
            exp,
            venue,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        let expires_at = DateTime::<Utc>::from_timestamp(exp, 0).unwrap_or(now);

        Ok(IssuedToken { token, expires_at })
    }

    /// Checks shape, signature and window, then redeems the nonce.
    ///
    /// The nonce is consumed as soon as these checks pass, whatever happens to
    /// the scan afterwards. Concurrent redemptions race on a single cache
    /// entry; only the one that inserted it wins.
    pub async fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AttendanceClaims, Reject> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Reject::TokenMalformed);
        }

        let claims = self.decode(token)?;

        let now = now.timestamp();
        if now < claims.nbf || now >= claims.exp {
            debug!(jti = %claims.jti, nbf = claims.nbf, exp = claims.exp, now, "Token outside validity window");
            return Err(Reject::TokenExpired);
        }

        let entry = self.consumed.entry(claims.jti.clone()).or_insert(()).await;
        if !entry.is_fresh() {
            return Err(Reject::TokenReplayed);
        }

        Ok(claims)
    }

    fn decode(&self, token: &str) -> Result<AttendanceClaims, Reject> {
        // Expiry is judged against the scan time, not the wall clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);
        validation.sub = Some(TOKEN_SUBJECT.to_string());

        decode::<AttendanceClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Rejected undecodable token");
                Reject::TokenMalformed
            })
    }
}
