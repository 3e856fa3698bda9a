//! Rolling attendance totals.
//!
//! Approved leave removes days from the denominator; it never counts as
//! presence. A date with a genuine record ignores any leave delta for it.

use std::collections::{BTreeSet, HashSet};

use chrono::{Days, NaiveDate};
use serde::Serialize;
use strum_macros::Display;
use utoipa::ToSchema;

use crate::model::attendance::AttendanceRecord;
use crate::model::leave_request::LeaveDelta;
use crate::model::student::{AttendanceTotals, Student};

pub const DANGER_BELOW: u8 = 75;
pub const WARNING_BELOW: u8 = 85;
/// Length of the trailing window used by the weekly figures, today included.
pub const TREND_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStanding {
    Safe,
    Warning,
    Danger,
}

impl AttendanceStanding {
    pub fn from_percentage(total_attendance: u8) -> Self {
        if total_attendance < DANGER_BELOW {
            AttendanceStanding::Danger
        } else if total_attendance < WARNING_BELOW {
            AttendanceStanding::Warning
        } else {
            AttendanceStanding::Safe
        }
    }
}

/// Read-only view handed to reporting.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AggregateSnapshot {
    pub student_id: String,
    pub present_days: f64,
    pub total_days: u32,
    pub total_attendance: u8,
    pub standing: AttendanceStanding,
    /// Further full days needed to reach the danger threshold; 0 at or above it.
    #[schema(example = 3)]
    pub days_to_threshold: u32,
    /// Dates with at least one leg in the trailing week.
    #[schema(example = 4)]
    pub days_attended_last_7: u32,
    pub records: Vec<AttendanceRecord>,
}

impl AggregateSnapshot {
    pub fn new(
        student_id: String,
        totals: AttendanceTotals,
        records: Vec<AttendanceRecord>,
        today: NaiveDate,
    ) -> Self {
        let since = trend_start(today);
        let days_attended_last_7 = records
            .iter()
            .filter(|r| r.legs() > 0 && r.date >= since && r.date <= today)
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .len();

        Self {
            student_id,
            present_days: totals.present_days,
            total_days: totals.total_days,
            total_attendance: totals.total_attendance,
            standing: AttendanceStanding::from_percentage(totals.total_attendance),
            days_to_threshold: days_to_threshold(totals.total_attendance, totals.total_days),
            days_attended_last_7: u32::try_from(days_attended_last_7).unwrap_or(u32::MAX),
            records,
        }
    }
}

/// Per-date count of records in the trend window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DailyRecordCount {
    pub date: NaiveDate,
    pub records: u32,
}

/// Cohort figures for the admin dashboard, built from stored totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CohortSummary {
    #[schema(example = 120)]
    pub total_students: u32,
    /// Rounded mean of `total_attendance`; 0 for an empty cohort.
    #[schema(example = 82)]
    pub average_attendance: u8,
    /// Students under the danger threshold.
    #[schema(example = 14)]
    pub below_threshold: u32,
    /// Oldest first, one entry per day of the window.
    pub daily_records: Vec<DailyRecordCount>,
}

/// First date of the trailing window ending on `today`.
pub fn trend_start(today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(TREND_DAYS - 1)))
        .unwrap_or(NaiveDate::MIN)
}

/// `ceil((DANGER_BELOW - total_attendance) / 100 * total_days)`.
pub fn days_to_threshold(total_attendance: u8, total_days: u32) -> u32 {
    let gap = u64::from(DANGER_BELOW.saturating_sub(total_attendance));
    let days = (gap * u64::from(total_days)).div_ceil(100);
    u32::try_from(days).unwrap_or(u32::MAX)
}

pub fn cohort_summary(
    students: &[Student],
    records: &[AttendanceRecord],
    today: NaiveDate,
) -> CohortSummary {
    let count = students.len() as u64;
    let sum: u64 = students.iter().map(|s| u64::from(s.total_attendance)).sum();
    let average_attendance = if count == 0 {
        0
    } else {
        ((2 * sum + count) / (2 * count)).min(100) as u8
    };
    let below_threshold = students
        .iter()
        .filter(|s| s.total_attendance < DANGER_BELOW)
        .count();

    let members: HashSet<&str> = students.iter().map(|s| s.student_id.as_str()).collect();
    let since = trend_start(today);
    let daily_records = since
        .iter_days()
        .take_while(|date| *date <= today)
        .map(|date| DailyRecordCount {
            date,
            records: records
                .iter()
                .filter(|r| r.date == date && members.contains(r.student_id.as_str()))
                .count() as u32,
        })
        .collect();

    CohortSummary {
        total_students: u32::try_from(students.len()).unwrap_or(u32::MAX),
        average_attendance,
        below_threshold: u32::try_from(below_threshold).unwrap_or(u32::MAX),
        daily_records,
    }
}

/// Round-half-up of `legs / 2 / total_days * 100`, clamped to 0..=100.
///
/// Integer only: `round(a / b) = (2a + b) / 2b` with `a = 50 * legs`.
pub fn percentage(legs: u32, total_days: u32) -> u8 {
    if total_days == 0 {
        return 0;
    }
    let numerator = 100 * u64::from(legs) + u64::from(total_days);
    let denominator = 2 * u64::from(total_days);
    (numerator / denominator).min(100) as u8
}

/// Pure and idempotent: same inputs, same totals.
pub fn recompute(
    student: &Student,
    records: &[AttendanceRecord],
    leave_deltas: &[LeaveDelta],
) -> AttendanceTotals {
    let own_records = records
        .iter()
        .filter(|r| r.student_id == student.student_id);

    let mut genuine_dates = BTreeSet::new();
    let mut legs = 0u32;
    for record in own_records {
        if record.legs() > 0 {
            genuine_dates.insert(record.date);
        }
        legs += record.legs();
    }

    let leave_dates: BTreeSet<NaiveDate> = leave_deltas
        .iter()
        .filter(|d| d.student_id == student.student_id)
        .map(|d| d.date)
        .filter(|date| !genuine_dates.contains(date))
        .collect();

    let total_days = student
        .scheduled_days
        .saturating_sub(u32::try_from(leave_dates.len()).unwrap_or(u32::MAX));

    AttendanceTotals {
        present_days: f64::from(legs) / 2.0,
        total_days,
        total_attendance: percentage(legs, total_days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn student(scheduled_days: u32) -> Student {
        Student {
            student_id: "S1".into(),
            name: "Ada".into(),
            email: "ada@college.edu".into(),
            department: "CS".into(),
            year: 1,
            phone_number: None,
            scheduled_days,
            present_days: 0.0,
            total_days: scheduled_days,
            total_attendance: 0,
            created_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn record(student_id: &str, d: u32, full: bool) -> AttendanceRecord {
        let at = Utc.with_ymd_and_hms(2026, 3, d, 9, 0, 0).unwrap();
        AttendanceRecord {
            student_id: student_id.into(),
            date: day(d),
            check_in: Some(at),
            check_out: full.then_some(at),
            attendance_percentage: if full { 100 } else { 50 },
            check_in_context: None,
            check_out_context: None,
        }
    }

    fn delta(d: u32, application: &str) -> LeaveDelta {
        LeaveDelta {
            student_id: "S1".into(),
            date: day(d),
            application_id: application.into(),
        }
    }

    #[test]
    fn percentage_rounds_half_up_and_clamps() {
        assert_eq!(percentage(0, 20), 0);
        assert_eq!(percentage(1, 20), 3); // 2.5 -> 3
        assert_eq!(percentage(3, 8), 19); // 18.75 -> 19
        assert_eq!(percentage(1, 3), 17); // 16.67 -> 17
        assert_eq!(percentage(40, 20), 100);
        assert_eq!(percentage(90, 20), 100);
        assert_eq!(percentage(5, 0), 0);
    }

    #[test]
    fn counts_half_day_per_leg() {
        let records = vec![record("S1", 2, true), record("S1", 3, false), record("S2", 3, true)];
        let totals = recompute(&student(20), &records, &[]);

        assert_eq!(totals.present_days, 1.5);
        assert_eq!(totals.total_days, 20);
        assert_eq!(totals.total_attendance, 8); // 7.5 -> 8
    }

    #[test]
    fn leave_shrinks_denominator_unless_day_was_attended() {
        let records = vec![record("S1", 2, true)];
        let deltas = vec![delta(2, "L1"), delta(3, "L1"), delta(4, "L1"), delta(4, "L2")];

        let totals = recompute(&student(10), &records, &deltas);

        // day 2 has a genuine record; days 3 and 4 count once each
        assert_eq!(totals.total_days, 8);
        assert_eq!(totals.present_days, 1.0);
        assert_eq!(totals.total_attendance, 13); // 12.5 -> 13
    }

    #[test]
    fn leave_beyond_schedule_saturates() {
        let deltas: Vec<_> = (1..=5).map(|d| delta(d, "L1")).collect();
        let totals = recompute(&student(3), &[], &deltas);
        assert_eq!(totals.total_days, 0);
        assert_eq!(totals.total_attendance, 0);
    }

    #[test]
    fn recompute_is_idempotent() {
        let s = student(20);
        let records = vec![record("S1", 2, true), record("S1", 5, false)];
        let deltas = vec![delta(9, "L1")];

        let first = recompute(&s, &records, &deltas);
        let second = recompute(&s, &records, &deltas);
        assert_eq!(first, second);

        let mut updated = s.clone();
        updated.apply_totals(first);
        assert_eq!(recompute(&updated, &records, &deltas), first);
    }

    #[test]
    fn days_to_threshold_rounds_up() {
        assert_eq!(days_to_threshold(50, 20), 5);
        assert_eq!(days_to_threshold(70, 30), 2); // 1.5 -> 2
        assert_eq!(days_to_threshold(0, 0), 0);
        assert_eq!(days_to_threshold(75, 20), 0);
        assert_eq!(days_to_threshold(100, 20), 0);
    }

    #[test]
    fn snapshot_counts_the_trailing_week() {
        let records = vec![
            record("S1", 1, true),
            record("S1", 2, true),
            record("S1", 6, false),
            record("S1", 8, true),
            record("S1", 9, true),
        ];
        let totals = recompute(&student(10), &records, &[]);

        let snapshot = AggregateSnapshot::new("S1".into(), totals, records, day(8));
        // window is the 2nd through the 8th
        assert_eq!(snapshot.days_attended_last_7, 3);
        assert_eq!(snapshot.total_attendance, 45);
        assert_eq!(snapshot.days_to_threshold, 3);
        assert_eq!(snapshot.standing, AttendanceStanding::Danger);
    }

    #[test]
    fn cohort_summary_averages_stored_totals() {
        let with_total = |id: &str, total: u8| Student {
            student_id: id.into(),
            total_attendance: total,
            ..student(20)
        };
        let students = vec![with_total("S1", 90), with_total("S2", 74), with_total("S3", 75)];
        let records = vec![
            record("S1", 3, true),
            record("S2", 3, false),
            record("S3", 9, true),
            record("X9", 9, true),
            record("S1", 1, true),
        ];

        let summary = cohort_summary(&students, &records, day(9));
        assert_eq!(summary.total_students, 3);
        assert_eq!(summary.average_attendance, 80); // 79.67 -> 80
        assert_eq!(summary.below_threshold, 1);

        let counts: Vec<_> = summary.daily_records.iter().map(|d| (d.date, d.records)).collect();
        assert_eq!(counts.len(), 7);
        assert_eq!(counts[0], (day(3), 2));
        assert_eq!(counts[6], (day(9), 1));
        assert_eq!(counts.iter().map(|c| c.1).sum::<u32>(), 3);
    }

    #[test]
    fn empty_cohort_is_all_zero() {
        let summary = cohort_summary(&[], &[], day(9));
        assert_eq!(summary.total_students, 0);
        assert_eq!(summary.average_attendance, 0);
        assert_eq!(summary.below_threshold, 0);
        assert!(summary.daily_records.iter().all(|d| d.records == 0));
    }

    #[test]
    fn standing_thresholds() {
        assert_eq!(AttendanceStanding::from_percentage(74), AttendanceStanding::Danger);
        assert_eq!(AttendanceStanding::from_percentage(75), AttendanceStanding::Warning);
        assert_eq!(AttendanceStanding::from_percentage(84), AttendanceStanding::Warning);
        assert_eq!(AttendanceStanding::from_percentage(85), AttendanceStanding::Safe);
        assert_eq!(AttendanceStanding::from_percentage(100), AttendanceStanding::Safe);
    }
}
