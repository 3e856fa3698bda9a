//! Attendance verification and recording.
//!
//! A scan goes: student lookup, token, geofence, network, then the session
//! state machine. Nothing is written to the repository unless every step
//! passes. Accepted scans and leave decisions recompute the student's totals
//! under that student's lock.

pub mod aggregator;
pub mod error;
pub mod geofence;
pub mod leave;
pub mod locks;
pub mod network;
pub mod session;
pub mod token;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::model::attendance::{AttendanceRecord, SessionLeg, SessionState, VerificationContext};
use crate::model::leave_request::{
    LeaveApplication, LeaveFilter, LeaveStatus, LeaveStatusChange, NewLeaveApplication,
};
use crate::model::scan::{ScanEvent, ScanResult};
use crate::model::student::{NewStudent, Student, StudentFilter};
use crate::repository::{RecordFilter, Repository, RepositoryError};

use aggregator::{AggregateSnapshot, CohortSummary};
use error::{EngineError, Reject};
use geofence::Geofence;
use leave::LeaveAdjustment;
use locks::StudentLocks;
use token::{IssuedToken, TokenValidator};

/// How many students `recompute_all` works on at once.
const RECOMPUTE_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub campus: Geofence,
    /// Offset used to turn scan timestamps into calendar dates.
    pub utc_offset: FixedOffset,
    pub default_scheduled_days: u32,
    pub token_secret: String,
    pub token_ttl: Duration,
}

/// Report query; `department` is resolved through the student list.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub student_id: Option<String>,
    pub department: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct LeaveReview {
    pub application: LeaveApplication,
    pub adjustment: LeaveAdjustment,
    pub student: Student,
}

pub struct AttendanceEngine {
    repo: Arc<dyn Repository>,
    tokens: TokenValidator,
    campus: Geofence,
    utc_offset: FixedOffset,
    default_scheduled_days: u32,
    locks: StudentLocks,
}

impl AttendanceEngine {
    pub fn new(repo: Arc<dyn Repository>, settings: EngineSettings) -> Self {
        Self {
            repo,
            tokens: TokenValidator::new(&settings.token_secret, settings.token_ttl),
            campus: settings.campus,
            utc_offset: settings.utc_offset,
            default_scheduled_days: settings.default_scheduled_days,
            locks: StudentLocks::new(),
        }
    }

    /// Calendar date of `at` on campus.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.utc_offset).date_naive()
    }

    pub fn issue_token(
        &self,
        now: DateTime<Utc>,
        venue: Option<String>,
    ) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
        self.tokens.issue(now, venue)
    }

    /* =========================
    Students
    ========================= */

    #[instrument(name = "register_student", skip(self, profile), fields(student_id = %profile.student_id))]
    pub async fn register_student(
        &self,
        profile: NewStudent,
        now: DateTime<Utc>,
    ) -> Result<Student, EngineError> {
        if profile.student_id.trim().is_empty() || profile.name.trim().is_empty() {
            return Err(EngineError::InvalidStudent(
                "student_id and name must not be empty".into(),
            ));
        }

        let student = Student::register(profile, self.default_scheduled_days, now);
        if !self.repo.insert_student(&student).await? {
            return Err(EngineError::StudentExists(student.student_id));
        }

        info!(department = %student.department, scheduled_days = student.scheduled_days, "Student registered");
        Ok(student)
    }

    pub async fn get_student(&self, student_id: &str) -> Result<Student, EngineError> {
        self.repo
            .get_student(student_id)
            .await?
            .ok_or_else(|| EngineError::StudentNotFound(student_id.to_string()))
    }

    pub async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, EngineError> {
        Ok(self.repo.list_students(filter).await?)
    }

    /* =========================
    Scanning
    ========================= */

    /// Verifies and records one scan.
    ///
    /// Rejections come back as `Ok(ScanResult { accepted: false, .. })`; only
    /// repository failures are `Err`.
    #[instrument(name = "process_scan", skip(self, event), fields(student_id = %event.student_id))]
    pub async fn process_scan(&self, event: ScanEvent) -> Result<ScanResult, EngineError> {
        match self.try_scan(&event).await {
            Ok(record) => {
                let leg = match record.state() {
                    SessionState::CheckedOut => SessionLeg::CheckOut,
                    _ => SessionLeg::CheckIn,
                };
                info!(%leg, date = %record.date, percentage = record.attendance_percentage, "Scan accepted");
                Ok(ScanResult::accepted(leg, record.attendance_percentage))
            }
            Err(ScanFailure::Rejected(reason, current_percentage)) => {
                warn!(reason = reason.as_str(), "Scan rejected");
                Ok(ScanResult::rejected(reason, current_percentage))
            }
            Err(ScanFailure::Engine(e)) => Err(e),
        }
    }

    async fn try_scan(&self, event: &ScanEvent) -> Result<AttendanceRecord, ScanFailure> {
        let student = self
            .repo
            .get_student(&event.student_id)
            .await?
            .ok_or(ScanFailure::Rejected(Reject::StudentNotFound, 0))?;

        self.tokens
            .validate(&event.token, event.timestamp)
            .await
            .map_err(|r| ScanFailure::Rejected(r, 0))?;

        if !self.campus.contains(event.coordinates) {
            return Err(ScanFailure::Rejected(Reject::GeofenceViolation, 0));
        }

        if !network::is_trusted_network(event.trusted_network) {
            return Err(ScanFailure::Rejected(Reject::NetworkUntrusted, 0));
        }

        let date = self.local_date(event.timestamp);
        let _guard = self.locks.acquire(&student.student_id).await;

        let current = self.repo.get_record(&student.student_id, date).await?;
        let state = SessionState::of(current.as_ref());
        let stored_percentage = current.as_ref().map_or(0, |r| r.attendance_percentage);

        let leg = session::next_transition(state, event.intent)
            .map_err(|r| ScanFailure::Rejected(r, stored_percentage))?;

        let context = VerificationContext {
            coordinates: event.coordinates,
            device_info: event.device_info.clone(),
            trusted_network: true,
        };
        let record = session::apply_leg(
            current,
            leg,
            &student.student_id,
            date,
            event.timestamp,
            context,
        );

        if !self.repo.put_record(&record, state).await? {
            let latest = self.repo.get_record(&student.student_id, date).await?;
            let latest_percentage = latest.map_or(0, |r| r.attendance_percentage);
            return Err(ScanFailure::Rejected(session::lost_race(leg), latest_percentage));
        }

        // the record is committed; stale totals are healed by the next recompute
        if let Err(e) = self.refresh_totals(&student.student_id).await {
            error!(error = %e, date = %date, "Totals refresh failed after recorded scan");
        }
        Ok(record)
    }

    /* =========================
    Aggregation
    ========================= */

    /// Recomputes and stores totals. Caller must hold the student's lock.
    async fn refresh_totals(&self, student_id: &str) -> Result<Student, EngineError> {
        let mut student = self.get_student(student_id).await?;
        let records = self
            .repo
            .list_records(&RecordFilter::for_student(&student.student_id))
            .await?;
        let deltas = self.repo.list_leave_deltas(&student.student_id).await?;

        let totals = aggregator::recompute(&student, &records, &deltas);
        if student.totals() != totals {
            student.apply_totals(totals);
            self.repo.put_student(&student).await?;
        }
        Ok(student)
    }

    /// Re-applies approved leave, then rebuilds the stored totals.
    pub async fn recompute_student(&self, student_id: &str) -> Result<Student, EngineError> {
        let _guard = self.locks.acquire(student_id).await;
        self.reconcile_leave(student_id).await?;
        self.refresh_totals(student_id).await
    }

    /// Writes any leave delta an approved application is still missing,
    /// earliest approval first. Caller must hold the student's lock.
    async fn reconcile_leave(&self, student_id: &str) -> Result<(), EngineError> {
        let mut approved = self
            .repo
            .list_leave_applications(&LeaveFilter {
                student_id: Some(student_id.to_string()),
                status: Some(LeaveStatus::Approved),
            })
            .await?;
        approved.sort_by_key(|a| (a.reviewed_at.unwrap_or(a.applied_at), a.applied_at));

        for application in &approved {
            let adjustment = leave::on_leave_status_change(self.repo.as_ref(), application).await?;
            if adjustment.recorded > 0 {
                warn!(
                    application_id = %application.id,
                    recorded = adjustment.recorded,
                    "Restored missing leave deltas"
                );
            }
        }
        Ok(())
    }

    /// Recomputes every student; returns how many were processed.
    #[instrument(name = "recompute_all", skip(self))]
    pub async fn recompute_all(&self) -> Result<usize, EngineError> {
        let students = self.repo.list_students(&StudentFilter::default()).await?;
        let count = students.len();

        stream::iter(students)
            .map(|s| async move { self.recompute_student(&s.student_id).await })
            .buffer_unordered(RECOMPUTE_CONCURRENCY)
            .try_collect::<Vec<_>>()
            .await?;

        let pruned = self.locks.prune();
        info!(count, pruned, "Recomputed attendance totals");
        Ok(count)
    }

    /// Totals derived fresh from records and leave, never from stored fields.
    pub async fn snapshot(
        &self,
        student_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AggregateSnapshot, EngineError> {
        let student = self.get_student(student_id).await?;
        let records = self
            .repo
            .list_records(&RecordFilter::for_student(student_id))
            .await?;
        let deltas = self.repo.list_leave_deltas(student_id).await?;

        let totals = aggregator::recompute(&student, &records, &deltas);
        Ok(AggregateSnapshot::new(
            student.student_id,
            totals,
            records,
            self.local_date(now),
        ))
    }

    /// Dashboard figures for every student, or one department.
    pub async fn cohort(
        &self,
        department: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<CohortSummary, EngineError> {
        let today = self.local_date(now);
        let students = self.repo.list_students(&StudentFilter { department }).await?;
        let records = self
            .repo
            .list_records(&RecordFilter {
                student_id: None,
                from: Some(aggregator::trend_start(today)),
                to: Some(today),
            })
            .await?;

        Ok(aggregator::cohort_summary(&students, &records, today))
    }

    pub async fn report(&self, filter: &ReportFilter) -> Result<Vec<AttendanceRecord>, EngineError> {
        let mut records = self
            .repo
            .list_records(&RecordFilter {
                student_id: filter.student_id.clone(),
                from: filter.from,
                to: filter.to,
            })
            .await?;

        if let Some(department) = filter.department.as_ref() {
            let members: HashSet<String> = self
                .repo
                .list_students(&StudentFilter {
                    department: Some(department.clone()),
                })
                .await?
                .into_iter()
                .map(|s| s.student_id)
                .collect();
            records.retain(|r| members.contains(&r.student_id));
        }

        Ok(records)
    }

    /* =========================
    Leave
    ========================= */

    #[instrument(name = "submit_leave", skip(self, request), fields(student_id = %request.student_id))]
    pub async fn submit_leave(
        &self,
        request: NewLeaveApplication,
        now: DateTime<Utc>,
    ) -> Result<LeaveApplication, EngineError> {
        leave::validate_application(&request)?;
        let student = self.get_student(&request.student_id).await?;

        let application = LeaveApplication {
            id: Uuid::new_v4().to_string(),
            student_id: student.student_id,
            start_date: request.start_date,
            end_date: request.end_date,
            reason: request.reason.trim().to_string(),
            status: LeaveStatus::Pending,
            applied_at: now,
            reviewed_at: None,
            reviewed_by: None,
        };
        self.repo.put_leave_application(&application, None).await?;

        info!(application_id = %application.id, "Leave request submitted");
        Ok(application)
    }

    pub async fn get_leave(&self, application_id: &str) -> Result<LeaveApplication, EngineError> {
        self.repo
            .get_leave_application(application_id)
            .await?
            .ok_or_else(|| EngineError::LeaveNotFound(application_id.to_string()))
    }

    pub async fn list_leaves(&self, filter: &LeaveFilter) -> Result<Vec<LeaveApplication>, EngineError> {
        Ok(self.repo.list_leave_applications(filter).await?)
    }

    /// Moves a pending application to approved or rejected, then lets the
    /// leave processor adjust attendance.
    #[instrument(name = "review_leave", skip(self, change), fields(application_id = %change.application_id))]
    pub async fn review_leave(&self, change: LeaveStatusChange) -> Result<LeaveReview, EngineError> {
        let student_id = self.get_leave(&change.application_id).await?.student_id;
        let _guard = self.locks.acquire(&student_id).await;

        // re-read under the lock; a concurrent review may have won
        let mut application = self.get_leave(&change.application_id).await?;
        leave::review(&mut application, &change)?;

        if !self
            .repo
            .put_leave_application(&application, Some(LeaveStatus::Pending))
            .await?
        {
            return Err(EngineError::LeaveAlreadyReviewed(application.id));
        }

        let adjustment = leave::on_leave_status_change(self.repo.as_ref(), &application).await?;
        if adjustment.skipped_overlap > 0 {
            warn!(
                skipped_overlap = adjustment.skipped_overlap,
                "Approved leave overlaps an earlier approval"
            );
        }
        let student = self.refresh_totals(&student_id).await?;

        info!(
            status = %application.status,
            reviewed_by = application.reviewed_by.as_deref().unwrap_or_default(),
            recorded = adjustment.recorded,
            "Leave reviewed"
        );

        Ok(LeaveReview {
            application,
            adjustment,
            student,
        })
    }
}

/// Internal split between a typed rejection and a real failure.
enum ScanFailure {
    /// Reason plus the day's stored percentage, if it was read.
    Rejected(Reject, u8),
    Engine(EngineError),
}

impl From<RepositoryError> for ScanFailure {
    fn from(e: RepositoryError) -> Self {
        ScanFailure::Engine(e.into())
    }
}
