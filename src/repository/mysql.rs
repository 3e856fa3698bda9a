use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, MySqlPool};
use tracing::debug;

use super::{RecordFilter, Repository, RepositoryError};
use crate::model::attendance::{AttendanceRecord, SessionState, VerificationContext};
use crate::model::leave_request::{LeaveApplication, LeaveDelta, LeaveFilter, LeaveStatus};
use crate::model::student::{Student, StudentFilter};

const STUDENT_COLUMNS: &str = "student_id, name, email, department, year, phone_number, \
     scheduled_days, present_days, total_days, total_attendance, created_at";

const RECORD_COLUMNS: &str = "student_id, date, check_in, check_out, attendance_percentage, \
     check_in_context, check_out_context";

const LEAVE_COLUMNS: &str = "id, student_id, start_date, end_date, reason, status, applied_at, \
     reviewed_at, reviewed_by";

/// Schema lives in `migrations/`. Uniqueness of (student_id, date) on both
/// `attendance_records` and `leave_deltas` is what makes inserts CAS-safe
/// across processes.
#[derive(Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    Str(&'a str),
    Date(NaiveDate),
}

#[derive(FromRow)]
struct AttendanceRow {
    student_id: String,
    date: NaiveDate,
    check_in: Option<DateTime<Utc>>,
    check_out: Option<DateTime<Utc>>,
    attendance_percentage: u8,
    check_in_context: Option<String>,
    check_out_context: Option<String>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = RepositoryError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(AttendanceRecord {
            student_id: row.student_id,
            date: row.date,
            check_in: row.check_in,
            check_out: row.check_out,
            attendance_percentage: row.attendance_percentage,
            check_in_context: decode_context(row.check_in_context)?,
            check_out_context: decode_context(row.check_out_context)?,
        })
    }
}

#[derive(FromRow)]
struct LeaveRow {
    id: String,
    student_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: String,
    status: String,
    applied_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
    reviewed_by: Option<String>,
}

impl TryFrom<LeaveRow> for LeaveApplication {
    type Error = RepositoryError;

    fn try_from(row: LeaveRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<LeaveStatus>()
            .map_err(|_| RepositoryError::Corrupt(format!("unknown leave status {:?}", row.status)))?;

        Ok(LeaveApplication {
            id: row.id,
            student_id: row.student_id,
            start_date: row.start_date,
            end_date: row.end_date,
            reason: row.reason,
            status,
            applied_at: row.applied_at,
            reviewed_at: row.reviewed_at,
            reviewed_by: row.reviewed_by,
        })
    }
}

#[derive(FromRow)]
struct LeaveDeltaRow {
    student_id: String,
    date: NaiveDate,
    application_id: String,
}

fn decode_context(raw: Option<String>) -> Result<Option<VerificationContext>, RepositoryError> {
    raw.map(|json| {
        serde_json::from_str(&json)
            .map_err(|e| RepositoryError::Corrupt(format!("verification context: {e}")))
    })
    .transpose()
}

fn encode_context(ctx: &Option<VerificationContext>) -> Result<Option<String>, RepositoryError> {
    ctx.as_ref()
        .map(|c| {
            serde_json::to_string(c)
                .map_err(|e| RepositoryError::Corrupt(format!("verification context: {e}")))
        })
        .transpose()
}

/// MySQL reports unique-key violations as SQLSTATE 23000.
fn is_duplicate(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000"))
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn get_student(&self, student_id: &str) -> Result<Option<Student>, RepositoryError> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE student_id = ?");
        let student = sqlx::query_as::<_, Student>(&sql)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    async fn insert_student(&self, student: &Student) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO students
                (student_id, name, email, department, year, phone_number,
                 scheduled_days, present_days, total_days, total_attendance, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&student.student_id)
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.department)
        .bind(student.year)
        .bind(&student.phone_number)
        .bind(student.scheduled_days)
        .bind(student.present_days)
        .bind(student.total_days)
        .bind(student.total_attendance)
        .bind(student.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_student(&self, student: &Student) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE students
            SET name = ?, email = ?, department = ?, year = ?, phone_number = ?,
                scheduled_days = ?, present_days = ?, total_days = ?, total_attendance = ?
            WHERE student_id = ?
            "#,
        )
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.department)
        .bind(student.year)
        .bind(&student.phone_number)
        .bind(student.scheduled_days)
        .bind(student.present_days)
        .bind(student.total_days)
        .bind(student.total_attendance)
        .bind(&student.student_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, RepositoryError> {
        let mut sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE 1=1");
        if filter.department.is_some() {
            sql.push_str(" AND department = ?");
        }
        sql.push_str(" ORDER BY student_id");

        let mut query = sqlx::query_as::<_, Student>(&sql);
        if let Some(department) = filter.department.as_deref() {
            query = query.bind(department);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn get_record(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE student_id = ? AND date = ?"
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(student_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn put_record(
        &self,
        record: &AttendanceRecord,
        expected: SessionState,
    ) -> Result<bool, RepositoryError> {
        let check_in_context = encode_context(&record.check_in_context)?;
        let check_out_context = encode_context(&record.check_out_context)?;

        let guard = match expected {
            SessionState::None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO attendance_records
                        (student_id, date, check_in, check_out, attendance_percentage,
                         check_in_context, check_out_context)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.student_id)
                .bind(record.date)
                .bind(record.check_in)
                .bind(record.check_out)
                .bind(record.attendance_percentage)
                .bind(check_in_context)
                .bind(check_out_context)
                .execute(&self.pool)
                .await;

                return match result {
                    Ok(_) => Ok(true),
                    Err(e) if is_duplicate(&e) => {
                        debug!(student_id = %record.student_id, date = %record.date, "Record already exists");
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                };
            }
            SessionState::CheckedIn => "check_in IS NOT NULL AND check_out IS NULL",
            SessionState::CheckedOut => "check_out IS NOT NULL",
        };

        let sql = format!(
            r#"
            UPDATE attendance_records
            SET check_in = ?, check_out = ?, attendance_percentage = ?,
                check_in_context = ?, check_out_context = ?
            WHERE student_id = ? AND date = ? AND {guard}
            "#
        );

        let result = sqlx::query(&sql)
            .bind(record.check_in)
            .bind(record.check_out)
            .bind(record.attendance_percentage)
            .bind(check_in_context)
            .bind(check_out_context)
            .bind(&record.student_id)
            .bind(record.date)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(student_id) = filter.student_id.as_deref() {
            where_sql.push_str(" AND student_id = ?");
            args.push(FilterValue::Str(student_id));
        }
        if let Some(from) = filter.from {
            where_sql.push_str(" AND date >= ?");
            args.push(FilterValue::Date(from));
        }
        if let Some(to) = filter.to {
            where_sql.push_str(" AND date <= ?");
            args.push(FilterValue::Date(to));
        }

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records{where_sql} ORDER BY date, student_id"
        );
        debug!(sql = %sql, "Listing attendance records");

        let mut query = sqlx::query_as::<_, AttendanceRow>(&sql);
        for arg in args {
            query = match arg {
                FilterValue::Str(s) => query.bind(s),
                FilterValue::Date(d) => query.bind(d),
            };
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AttendanceRecord::try_from)
            .collect()
    }

    async fn get_leave_application(
        &self,
        id: &str,
    ) -> Result<Option<LeaveApplication>, RepositoryError> {
        let sql = format!("SELECT {LEAVE_COLUMNS} FROM leave_applications WHERE id = ?");
        sqlx::query_as::<_, LeaveRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(LeaveApplication::try_from)
            .transpose()
    }

    async fn put_leave_application(
        &self,
        application: &LeaveApplication,
        expected: Option<LeaveStatus>,
    ) -> Result<bool, RepositoryError> {
        let Some(expected) = expected else {
            let result = sqlx::query(
                r#"
                INSERT INTO leave_applications
                    (id, student_id, start_date, end_date, reason, status, applied_at,
                     reviewed_at, reviewed_by)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&application.id)
            .bind(&application.student_id)
            .bind(application.start_date)
            .bind(application.end_date)
            .bind(&application.reason)
            .bind(application.status.to_string())
            .bind(application.applied_at)
            .bind(application.reviewed_at)
            .bind(&application.reviewed_by)
            .execute(&self.pool)
            .await;

            return match result {
                Ok(_) => Ok(true),
                Err(e) if is_duplicate(&e) => Ok(false),
                Err(e) => Err(e.into()),
            };
        };

        let result = sqlx::query(
            r#"
            UPDATE leave_applications
            SET status = ?, reviewed_at = ?, reviewed_by = ?
            WHERE id = ?
            AND status = ?
            "#,
        )
        .bind(application.status.to_string())
        .bind(application.reviewed_at)
        .bind(&application.reviewed_by)
        .bind(&application.id)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_leave_applications(
        &self,
        filter: &LeaveFilter,
    ) -> Result<Vec<LeaveApplication>, RepositoryError> {
        let mut where_sql = String::from(" WHERE 1=1");
        let status = filter.status.map(|s| s.to_string());

        if filter.student_id.is_some() {
            where_sql.push_str(" AND student_id = ?");
        }
        if status.is_some() {
            where_sql.push_str(" AND status = ?");
        }

        let sql = format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_applications{where_sql} ORDER BY applied_at DESC"
        );

        let mut query = sqlx::query_as::<_, LeaveRow>(&sql);
        if let Some(student_id) = filter.student_id.as_deref() {
            query = query.bind(student_id);
        }
        if let Some(status) = status.as_deref() {
            query = query.bind(status);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(LeaveApplication::try_from)
            .collect()
    }

    async fn put_leave_delta(&self, delta: &LeaveDelta) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO leave_deltas (student_id, date, application_id) VALUES (?, ?, ?)",
        )
        .bind(&delta.student_id)
        .bind(delta.date)
        .bind(&delta.application_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_leave_deltas(&self, student_id: &str) -> Result<Vec<LeaveDelta>, RepositoryError> {
        let rows = sqlx::query_as::<_, LeaveDeltaRow>(
            "SELECT student_id, date, application_id FROM leave_deltas WHERE student_id = ? ORDER BY date",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LeaveDelta {
                student_id: row.student_id,
                date: row.date,
                application_id: row.application_id,
            })
            .collect())
    }
}
