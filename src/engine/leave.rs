//! Leave application lifecycle and its effect on attendance.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::error::EngineError;
use crate::model::leave_request::{
    LeaveApplication, LeaveDelta, LeaveStatus, LeaveStatusChange, NewLeaveApplication,
};
use crate::repository::{RecordFilter, Repository, RepositoryError};

/// Longest range a single application may cover, in days.
pub const MAX_LEAVE_DAYS: i64 = 366;

/// Outcome of applying one approved application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaveAdjustment {
    /// Dates newly excluded from the denominator.
    pub recorded: u32,
    /// Dates skipped because a genuine record already exists.
    pub skipped_attended: u32,
    /// Dates already covered by another approved application.
    pub skipped_overlap: u32,
    /// Dates this application had already recorded on an earlier run.
    pub already_recorded: u32,
}

pub fn validate_application(application: &NewLeaveApplication) -> Result<(), EngineError> {
    if application.start_date > application.end_date {
        return Err(EngineError::InvalidLeaveRange(
            "start_date cannot be after end_date".into(),
        ));
    }
    let span = (application.end_date - application.start_date).num_days() + 1;
    if span > MAX_LEAVE_DAYS {
        return Err(EngineError::InvalidLeaveRange(format!(
            "range covers {span} days, at most {MAX_LEAVE_DAYS} allowed"
        )));
    }
    if application.reason.trim().is_empty() {
        return Err(EngineError::InvalidLeaveRange("reason must not be empty".into()));
    }
    Ok(())
}

/// Applies a review decision in place. `pending` is the only non-terminal
/// status and the only one a decision can leave.
pub fn review(application: &mut LeaveApplication, change: &LeaveStatusChange) -> Result<(), EngineError> {
    if change.new_status == LeaveStatus::Pending {
        return Err(EngineError::InvalidLeaveStatus);
    }
    if application.status != LeaveStatus::Pending {
        return Err(EngineError::LeaveAlreadyReviewed(application.id.clone()));
    }

    application.status = change.new_status;
    application.reviewed_at = Some(change.reviewed_at);
    application.reviewed_by = Some(change.reviewed_by.trim().to_string());
    Ok(())
}

/// Writes one leave delta per date of an approved application.
///
/// No-op for any other status. Dates with a genuine record are skipped, and
/// dates another approval already covers keep that approval. Safe to run
/// again after a partial failure: dates this application already holds are
/// left alone and only the missing ones are written.
pub async fn on_leave_status_change(
    repo: &dyn Repository,
    application: &LeaveApplication,
) -> Result<LeaveAdjustment, RepositoryError> {
    let mut adjustment = LeaveAdjustment::default();
    if application.status != LeaveStatus::Approved {
        return Ok(adjustment);
    }

    let attended: Vec<_> = repo
        .list_records(&RecordFilter {
            student_id: Some(application.student_id.clone()),
            from: Some(application.start_date),
            to: Some(application.end_date),
        })
        .await?
        .into_iter()
        .filter(|r| r.legs() > 0)
        .map(|r| r.date)
        .collect();

    let held: HashMap<NaiveDate, String> = repo
        .list_leave_deltas(&application.student_id)
        .await?
        .into_iter()
        .map(|d| (d.date, d.application_id))
        .collect();

    for date in application.dates() {
        match held.get(&date) {
            Some(owner) if *owner == application.id => {
                adjustment.already_recorded += 1;
                continue;
            }
            Some(owner) => {
                debug!(application_id = %application.id, %date, held_by = %owner, "Date already on leave");
                adjustment.skipped_overlap += 1;
                continue;
            }
            None => {}
        }
        if attended.contains(&date) {
            debug!(application_id = %application.id, %date, "Genuine record wins over leave");
            adjustment.skipped_attended += 1;
            continue;
        }

        let delta = LeaveDelta {
            student_id: application.student_id.clone(),
            date,
            application_id: application.id.clone(),
        };
        if repo.put_leave_delta(&delta).await? {
            adjustment.recorded += 1;
        } else {
            warn!(
                application_id = %application.id,
                student_id = %application.student_id,
                %date,
                "Leave date taken concurrently, keeping the stored approval"
            );
            adjustment.skipped_overlap += 1;
        }
    }

    Ok(adjustment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::{AttendanceRecord, SessionState};
    use crate::repository::MemoryRepository;
    use chrono::{Datelike, NaiveDate, TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn application(id: &str, from: u32, to: u32, status: LeaveStatus) -> LeaveApplication {
        LeaveApplication {
            id: id.into(),
            student_id: "S1".into(),
            start_date: day(from),
            end_date: day(to),
            reason: "illness".into(),
            status,
            applied_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        }
    }

    fn change(status: LeaveStatus) -> LeaveStatusChange {
        LeaveStatusChange {
            application_id: "L1".into(),
            new_status: status,
            reviewed_by: " registrar ".into(),
            reviewed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn validates_new_applications() {
        let new = |from: NaiveDate, to: NaiveDate, reason: &str| NewLeaveApplication {
            student_id: "S1".into(),
            start_date: from,
            end_date: to,
            reason: reason.into(),
        };

        assert!(validate_application(&new(day(2), day(2), "sick")).is_ok());
        assert!(matches!(
            validate_application(&new(day(3), day(2), "sick")),
            Err(EngineError::InvalidLeaveRange(_))
        ));
        assert!(matches!(
            validate_application(&new(day(2), day(4), "  ")),
            Err(EngineError::InvalidLeaveRange(_))
        ));
        let far = NaiveDate::from_ymd_opt(2027, 3, 3).unwrap();
        assert!(matches!(
            validate_application(&new(day(2), far, "sabbatical")),
            Err(EngineError::InvalidLeaveRange(_))
        ));
    }

    #[test]
    fn review_is_one_shot() {
        let mut app = application("L1", 2, 3, LeaveStatus::Pending);

        assert!(matches!(
            review(&mut app, &change(LeaveStatus::Pending)),
            Err(EngineError::InvalidLeaveStatus)
        ));

        review(&mut app, &change(LeaveStatus::Approved)).unwrap();
        assert_eq!(app.status, LeaveStatus::Approved);
        assert_eq!(app.reviewed_by.as_deref(), Some("registrar"));

        assert!(matches!(
            review(&mut app, &change(LeaveStatus::Rejected)),
            Err(EngineError::LeaveAlreadyReviewed(id)) if id == "L1"
        ));
    }

    #[tokio::test]
    async fn only_approved_leave_writes_deltas() {
        let repo = MemoryRepository::new();
        for status in [LeaveStatus::Pending, LeaveStatus::Rejected] {
            let adj = on_leave_status_change(&repo, &application("L1", 2, 4, status))
                .await
                .unwrap();
            assert_eq!(adj, LeaveAdjustment::default());
        }
        assert!(repo.list_leave_deltas("S1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skips_attended_and_overlapping_dates() {
        let repo = MemoryRepository::new();
        let at = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        let attended = AttendanceRecord {
            student_id: "S1".into(),
            date: day(3),
            check_in: Some(at),
            check_out: None,
            attendance_percentage: 50,
            check_in_context: None,
            check_out_context: None,
        };
        repo.put_record(&attended, SessionState::None).await.unwrap();

        let first = on_leave_status_change(&repo, &application("L1", 2, 4, LeaveStatus::Approved))
            .await
            .unwrap();
        assert_eq!(first, LeaveAdjustment {
            recorded: 2,
            skipped_attended: 1,
            skipped_overlap: 0,
            already_recorded: 0,
        });

        let second = on_leave_status_change(&repo, &application("L2", 4, 5, LeaveStatus::Approved))
            .await
            .unwrap();
        assert_eq!(second, LeaveAdjustment {
            recorded: 1,
            skipped_attended: 0,
            skipped_overlap: 1,
            already_recorded: 0,
        });

        let deltas = repo.list_leave_deltas("S1").await.unwrap();
        let summary: Vec<_> = deltas
            .iter()
            .map(|d| (d.date.day(), d.application_id.as_str()))
            .collect();
        assert_eq!(summary, vec![(2, "L1"), (4, "L1"), (5, "L2")]);
    }

    #[tokio::test]
    async fn rerun_fills_only_missing_dates() {
        let repo = MemoryRepository::new();
        let approved = application("L1", 2, 4, LeaveStatus::Approved);

        // an earlier run stopped after the first date
        repo.put_leave_delta(&LeaveDelta {
            student_id: "S1".into(),
            date: day(2),
            application_id: "L1".into(),
        })
        .await
        .unwrap();

        let rerun = on_leave_status_change(&repo, &approved).await.unwrap();
        assert_eq!(rerun, LeaveAdjustment {
            recorded: 2,
            skipped_attended: 0,
            skipped_overlap: 0,
            already_recorded: 1,
        });

        let again = on_leave_status_change(&repo, &approved).await.unwrap();
        assert_eq!(again.recorded, 0);
        assert_eq!(again.already_recorded, 3);
        assert_eq!(again.skipped_overlap, 0);
        assert_eq!(repo.list_leave_deltas("S1").await.unwrap().len(), 3);
    }
}
