//! Persistence seam for the engine.
//!
//! The engine only ever talks to [`Repository`]; it never assumes a storage
//! technology. Writes that guard an invariant are compare-and-swap: they
//! report `false` instead of overwriting state someone else changed first.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::model::attendance::{AttendanceRecord, SessionState};
use crate::model::leave_request::{LeaveApplication, LeaveDelta, LeaveFilter, LeaveStatus};
use crate::model::student::{Student, StudentFilter};

pub use memory::MemoryRepository;
pub use mysql::MySqlRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored row could not be decoded: {0}")]
    Corrupt(String),
}

/// Record query used by history and report listings.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub student_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn for_student(student_id: &str) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.student_id
            .as_deref()
            .is_none_or(|id| record.student_id == id)
            && self.from.is_none_or(|from| record.date >= from)
            && self.to.is_none_or(|to| record.date <= to)
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_student(&self, student_id: &str) -> Result<Option<Student>, RepositoryError>;

    /// Inserts a new student; `false` when the id is already taken.
    async fn insert_student(&self, student: &Student) -> Result<bool, RepositoryError>;

    /// Overwrites an existing student.
    async fn put_student(&self, student: &Student) -> Result<(), RepositoryError>;

    async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, RepositoryError>;

    async fn get_record(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, RepositoryError>;

    /// Writes `record` only if the stored state for its (student, date) is
    /// still `expected` (`SessionState::None` meaning no row yet).
    async fn put_record(
        &self,
        record: &AttendanceRecord,
        expected: SessionState,
    ) -> Result<bool, RepositoryError>;

    /// Sorted by date, then student id.
    async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError>;

    async fn get_leave_application(
        &self,
        id: &str,
    ) -> Result<Option<LeaveApplication>, RepositoryError>;

    /// Inserts when `expected` is `None`, otherwise updates only if the stored
    /// status still equals `expected`.
    async fn put_leave_application(
        &self,
        application: &LeaveApplication,
        expected: Option<LeaveStatus>,
    ) -> Result<bool, RepositoryError>;

    /// Newest first.
    async fn list_leave_applications(
        &self,
        filter: &LeaveFilter,
    ) -> Result<Vec<LeaveApplication>, RepositoryError>;

    /// Insert-if-absent on (student, date).
    async fn put_leave_delta(&self, delta: &LeaveDelta) -> Result<bool, RepositoryError>;

    async fn list_leave_deltas(&self, student_id: &str) -> Result<Vec<LeaveDelta>, RepositoryError>;
}
