use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "0b7c5e0e-8d0e-4c55-a4a6-3f1f3b2f9a10",
    "student_id": "CS-2024-001",
    "start_date": "2026-03-09",
    "end_date": "2026-03-11",
    "reason": "Family emergency",
    "status": "pending",
    "applied_at": "2026-03-06T12:00:00Z",
    "reviewed_at": null,
    "reviewed_by": null
}))]
pub struct LeaveApplication {
    pub id: String,
    pub student_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub status: LeaveStatus,
    pub applied_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

impl LeaveApplication {
    /// Every calendar date in the inclusive range.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |d| *d <= self.end_date)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewLeaveApplication {
    #[schema(example = "CS-2024-001")]
    pub student_id: String,
    #[schema(example = "2026-03-09")]
    pub start_date: NaiveDate,
    #[schema(example = "2026-03-11")]
    pub end_date: NaiveDate,
    #[schema(example = "Family emergency")]
    pub reason: String,
}

/// Inbound review decision for a pending application.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LeaveStatusChange {
    pub application_id: String,
    pub new_status: LeaveStatus,
    pub reviewed_by: String,
    pub reviewed_at: DateTime<Utc>,
}

/// A date excluded from a student's denominator by approved leave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveDelta {
    pub student_id: String,
    pub date: NaiveDate,
    pub application_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LeaveFilter {
    /// Filter by student ID
    #[schema(example = "CS-2024-001")]
    pub student_id: Option<String>,
    /// Filter by leave status
    #[schema(example = "pending")]
    pub status: Option<LeaveStatus>,
}
