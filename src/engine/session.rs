//! Per (student, date) session progression: `None -> CheckedIn -> CheckedOut`.

use chrono::{DateTime, NaiveDate, Utc};

use super::error::Reject;
use crate::model::attendance::{AttendanceRecord, SessionLeg, SessionState, VerificationContext};

pub const HALF_DAY_PERCENTAGE: u8 = 50;
pub const FULL_DAY_PERCENTAGE: u8 = 100;

/// Decides which leg a scan records, or why it cannot record one.
pub fn next_transition(state: SessionState, intent: Option<SessionLeg>) -> Result<SessionLeg, Reject> {
    match (state, intent) {
        (SessionState::CheckedOut, _) => Err(Reject::SessionComplete),
        (SessionState::None, None | Some(SessionLeg::CheckIn)) => Ok(SessionLeg::CheckIn),
        (SessionState::None, Some(SessionLeg::CheckOut)) => Err(Reject::CheckoutBeforeCheckin),
        (SessionState::CheckedIn, None | Some(SessionLeg::CheckOut)) => Ok(SessionLeg::CheckOut),
        (SessionState::CheckedIn, Some(SessionLeg::CheckIn)) => Err(Reject::AlreadyCheckedIn),
    }
}

/// What to report when the compare-and-swap write for `leg` lost to a
/// concurrent writer.
pub fn lost_race(leg: SessionLeg) -> Reject {
    match leg {
        SessionLeg::CheckIn => Reject::AlreadyCheckedIn,
        SessionLeg::CheckOut => Reject::SessionComplete,
    }
}

/// Builds the record as it should look after `leg`.
///
/// A check-in starts a fresh record; a check-out completes `current`, which
/// [`next_transition`] guarantees is present and checked in.
pub fn apply_leg(
    current: Option<AttendanceRecord>,
    leg: SessionLeg,
    student_id: &str,
    date: NaiveDate,
    at: DateTime<Utc>,
    context: VerificationContext,
) -> AttendanceRecord {
    match (leg, current) {
        (SessionLeg::CheckOut, Some(mut record)) => {
            record.check_out = Some(at);
            record.check_out_context = Some(context);
            record.attendance_percentage = FULL_DAY_PERCENTAGE;
            record
        }
        _ => AttendanceRecord {
            student_id: student_id.to_string(),
            date,
            check_in: Some(at),
            check_out: None,
            attendance_percentage: HALF_DAY_PERCENTAGE,
            check_in_context: Some(context),
            check_out_context: None,
        },
    }
}
