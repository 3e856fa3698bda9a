use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Rolling totals derived from a student's records and approved leave.
///
/// Only the aggregator produces these; nothing else writes them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct AttendanceTotals {
    /// Half-day units: every recorded leg contributes 0.5.
    #[schema(example = 7.5)]
    pub present_days: f64,
    #[schema(example = 18)]
    pub total_days: u32,
    /// `round(present_days / total_days * 100)`, clamped to 0..=100.
    #[schema(example = 42)]
    pub total_attendance: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "student_id": "CS-2024-001",
    "name": "Ada Lovelace",
    "email": "ada@college.edu",
    "department": "Computer Science",
    "year": 2,
    "phone_number": "+15550100",
    "scheduled_days": 20,
    "present_days": 7.5,
    "total_days": 18,
    "total_attendance": 42,
    "created_at": "2026-01-05T10:00:00Z"
}))]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub year: u8,
    pub phone_number: Option<String>,
    /// Institutional attendance-days before any leave adjustment.
    pub scheduled_days: u32,
    pub present_days: f64,
    pub total_days: u32,
    pub total_attendance: u8,
    pub created_at: DateTime<Utc>,
}

/// Registration payload; totals always start from zero.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewStudent {
    #[schema(example = "CS-2024-001")]
    pub student_id: String,
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@college.edu", format = "email")]
    pub email: String,
    #[schema(example = "Computer Science")]
    pub department: String,
    #[schema(example = 2)]
    pub year: u8,
    #[schema(example = "+15550100", nullable = true)]
    pub phone_number: Option<String>,
    /// Falls back to the configured institutional default.
    #[schema(example = 20, nullable = true)]
    pub scheduled_days: Option<u32>,
}

impl Student {
    pub fn register(profile: NewStudent, default_scheduled_days: u32, now: DateTime<Utc>) -> Self {
        let scheduled_days = profile.scheduled_days.unwrap_or(default_scheduled_days);
        Self {
            student_id: profile.student_id.trim().to_string(),
            name: profile.name.trim().to_string(),
            email: profile.email.trim().to_lowercase(),
            department: profile.department.trim().to_string(),
            year: profile.year,
            phone_number: profile.phone_number,
            scheduled_days,
            present_days: 0.0,
            total_days: scheduled_days,
            total_attendance: 0,
            created_at: now,
        }
    }

    pub fn totals(&self) -> AttendanceTotals {
        AttendanceTotals {
            present_days: self.present_days,
            total_days: self.total_days,
            total_attendance: self.total_attendance,
        }
    }

    pub fn apply_totals(&mut self, totals: AttendanceTotals) {
        self.present_days = totals.present_days;
        self.total_days = totals.total_days;
        self.total_attendance = totals.total_attendance;
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct StudentFilter {
    /// Filter by department
    #[schema(example = "Computer Science")]
    pub department: Option<String>,
}
