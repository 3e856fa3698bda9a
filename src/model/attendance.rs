use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// A WGS84 position claimed by the scanning device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    #[schema(example = 40.7128)]
    pub latitude: f64,
    #[schema(example = -74.006)]
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// What the device told us when a leg was recorded. Kept for audit only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VerificationContext {
    pub coordinates: Coordinates,
    #[schema(example = "Mozilla/5.0 (Linux; Android 14)", nullable = true)]
    pub device_info: Option<String>,
    pub trusted_network: bool,
}

/// One half of a day's attendance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SessionLeg {
    CheckIn,
    CheckOut,
}

/// Per (student, date) session progression. `CheckedOut` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    None,
    CheckedIn,
    CheckedOut,
}

impl SessionState {
    pub fn of(record: Option<&AttendanceRecord>) -> Self {
        match record {
            None => SessionState::None,
            Some(r) => r.state(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "student_id": "CS-2024-001",
    "date": "2026-03-02",
    "check_in": "2026-03-02T08:55:10Z",
    "check_out": null,
    "attendance_percentage": 50,
    "check_in_context": {
        "coordinates": { "latitude": 40.7132, "longitude": -74.006 },
        "device_info": null,
        "trusted_network": true
    },
    "check_out_context": null
}))]
pub struct AttendanceRecord {
    pub student_id: String,
    pub date: NaiveDate,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    /// 50 after check-in, 100 after check-out.
    pub attendance_percentage: u8,
    pub check_in_context: Option<VerificationContext>,
    pub check_out_context: Option<VerificationContext>,
}

impl AttendanceRecord {
    pub fn state(&self) -> SessionState {
        match (self.check_in, self.check_out) {
            (_, Some(_)) => SessionState::CheckedOut,
            (Some(_), None) => SessionState::CheckedIn,
            (None, None) => SessionState::None,
        }
    }

    /// Number of legs recorded on this day (0..=2).
    pub fn legs(&self) -> u32 {
        u32::from(self.check_in.is_some()) + u32::from(self.check_out.is_some())
    }
}
