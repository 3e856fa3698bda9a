//! Error types for the verification engine.

use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use thiserror::Error;
use utoipa::ToSchema;

use crate::repository::RepositoryError;

/// Why a scan was refused. Serialized by variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize, ToSchema, IntoStaticStr)]
pub enum Reject {
    /// Token is outside its validity window.
    #[error("attendance token has expired or is not yet valid")]
    TokenExpired,

    /// Token nonce was already redeemed.
    #[error("attendance token has already been used")]
    TokenReplayed,

    /// Empty, undecodable or wrongly signed token.
    #[error("attendance token is malformed")]
    TokenMalformed,

    #[error("scan location is outside the campus geofence")]
    GeofenceViolation,

    #[error("device is not on a trusted campus network")]
    NetworkUntrusted,

    #[error("already checked in today")]
    AlreadyCheckedIn,

    #[error("must check in before checking out")]
    CheckoutBeforeCheckin,

    #[error("both legs are already recorded for today")]
    SessionComplete,

    #[error("student not found")]
    StudentNotFound,
}

impl Reject {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Session-state conflicts, as opposed to failed trust signals.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Reject::AlreadyCheckedIn | Reject::CheckoutBeforeCheckin | Reject::SessionComplete
        )
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("scan rejected: {0}")]
    Rejected(#[from] Reject),

    #[error("student not found: {0}")]
    StudentNotFound(String),

    #[error("student already registered: {0}")]
    StudentExists(String),

    #[error("invalid student profile: {0}")]
    InvalidStudent(String),

    #[error("leave application not found: {0}")]
    LeaveNotFound(String),

    #[error("leave application {0} has already been reviewed")]
    LeaveAlreadyReviewed(String),

    #[error("invalid leave application: {0}")]
    InvalidLeaveRange(String),

    #[error("leave status can only change to approved or rejected")]
    InvalidLeaveStatus,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
