use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{RecordFilter, Repository, RepositoryError};
use crate::model::attendance::{AttendanceRecord, SessionState};
use crate::model::leave_request::{LeaveApplication, LeaveDelta, LeaveFilter, LeaveStatus};
use crate::model::student::{Student, StudentFilter};

type DayKey = (String, NaiveDate);

/// Process-local store. Used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    students: DashMap<String, Student>,
    records: DashMap<DayKey, AttendanceRecord>,
    leaves: DashMap<String, LeaveApplication>,
    deltas: DashMap<DayKey, LeaveDelta>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_student(&self, student_id: &str) -> Result<Option<Student>, RepositoryError> {
        Ok(self.students.get(student_id).map(|s| s.value().clone()))
    }

    async fn insert_student(&self, student: &Student) -> Result<bool, RepositoryError> {
        match self.students.entry(student.student_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(student.clone());
                Ok(true)
            }
        }
    }

    async fn put_student(&self, student: &Student) -> Result<(), RepositoryError> {
        self.students
            .insert(student.student_id.clone(), student.clone());
        Ok(())
    }

    async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, RepositoryError> {
        let mut students: Vec<Student> = self
            .students
            .iter()
            .filter(|s| {
                filter
                    .department
                    .as_deref()
                    .is_none_or(|d| s.department == d)
            })
            .map(|s| s.value().clone())
            .collect();
        students.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok(students)
    }

    async fn get_record(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, RepositoryError> {
        Ok(self
            .records
            .get(&(student_id.to_string(), date))
            .map(|r| r.value().clone()))
    }

    async fn put_record(
        &self,
        record: &AttendanceRecord,
        expected: SessionState,
    ) -> Result<bool, RepositoryError> {
        let key = (record.student_id.clone(), record.date);
        // The entry guard holds the shard lock, so check and write are atomic.
        match self.records.entry(key) {
            Entry::Vacant(slot) if expected == SessionState::None => {
                slot.insert(record.clone());
                Ok(true)
            }
            Entry::Occupied(mut slot)
                if expected != SessionState::None && slot.get().state() == expected =>
            {
                slot.insert(record.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        let mut records: Vec<AttendanceRecord> = self
            .records
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.student_id.cmp(&b.student_id))
        });
        Ok(records)
    }

    async fn get_leave_application(
        &self,
        id: &str,
    ) -> Result<Option<LeaveApplication>, RepositoryError> {
        Ok(self.leaves.get(id).map(|a| a.value().clone()))
    }

    async fn put_leave_application(
        &self,
        application: &LeaveApplication,
        expected: Option<LeaveStatus>,
    ) -> Result<bool, RepositoryError> {
        match (self.leaves.entry(application.id.clone()), expected) {
            (Entry::Vacant(slot), None) => {
                slot.insert(application.clone());
                Ok(true)
            }
            (Entry::Occupied(mut slot), Some(status)) if slot.get().status == status => {
                slot.insert(application.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_leave_applications(
        &self,
        filter: &LeaveFilter,
    ) -> Result<Vec<LeaveApplication>, RepositoryError> {
        let mut applications: Vec<LeaveApplication> = self
            .leaves
            .iter()
            .filter(|a| {
                filter
                    .student_id
                    .as_deref()
                    .is_none_or(|id| a.student_id == id)
                    && filter.status.is_none_or(|status| a.status == status)
            })
            .map(|a| a.value().clone())
            .collect();
        applications.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        Ok(applications)
    }

    async fn put_leave_delta(&self, delta: &LeaveDelta) -> Result<bool, RepositoryError> {
        match self.deltas.entry((delta.student_id.clone(), delta.date)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(delta.clone());
                Ok(true)
            }
        }
    }

    async fn list_leave_deltas(&self, student_id: &str) -> Result<Vec<LeaveDelta>, RepositoryError> {
        let mut deltas: Vec<LeaveDelta> = self
            .deltas
            .iter()
            .filter(|d| d.student_id == student_id)
            .map(|d| d.value().clone())
            .collect();
        deltas.sort_by_key(|d| d.date);
        Ok(deltas)
    }
}
