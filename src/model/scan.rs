use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::error::Reject;
use crate::model::attendance::{Coordinates, SessionLeg};

/// A single verification attempt, built by the boundary and consumed once.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub student_id: String,
    pub token: String,
    pub coordinates: Coordinates,
    /// `None` means the boundary could not tell; treated as untrusted.
    pub trusted_network: Option<bool>,
    pub timestamp: DateTime<Utc>,
    /// Requested leg. When absent the engine takes the only legal one.
    pub intent: Option<SessionLeg>,
    pub device_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[schema(example = json!({
    "accepted": true,
    "session_type": "check-in",
    "attendance_percentage": 50,
    "reason": null
}))]
pub struct ScanResult {
    pub accepted: bool,
    pub session_type: Option<SessionLeg>,
    /// Day percentage after this scan; for a rejection, whatever was already
    /// stored for the day (0 when nothing was read).
    pub attendance_percentage: u8,
    pub reason: Option<Reject>,
}

impl ScanResult {
    pub fn accepted(leg: SessionLeg, attendance_percentage: u8) -> Self {
        Self {
            accepted: true,
            session_type: Some(leg),
            attendance_percentage,
            reason: None,
        }
    }

    pub fn rejected(reason: Reject, attendance_percentage: u8) -> Self {
        Self {
            accepted: false,
            session_type: None,
            attendance_percentage,
            reason: Some(reason),
        }
    }
}
