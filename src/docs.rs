use crate::api::attendance::{HistoryQuery, RecordQuery, ScanRequest};
use crate::api::leave_request::{LeaveReviewResponse, ReviewLeave};
use crate::api::token::IssueTokenRequest;
use crate::engine::aggregator::{
    AggregateSnapshot, AttendanceStanding, CohortSummary, DailyRecordCount,
};
use crate::engine::error::Reject;
use crate::engine::leave::LeaveAdjustment;
use crate::engine::token::IssuedToken;
use crate::model::attendance::{AttendanceRecord, Coordinates, SessionLeg, VerificationContext};
use crate::model::leave_request::{LeaveApplication, LeaveFilter, LeaveStatus, NewLeaveApplication};
use crate::model::scan::ScanResult;
use crate::model::student::{AttendanceTotals, NewStudent, Student, StudentFilter};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Smart Attendance API",
        version = "0.1.0",
        description = r#"
## Smart Attendance Verification & Recording

Students scan a short-lived QR token at the venue. A scan is accepted only when

- the token is authentic, unexpired and has never been redeemed,
- the device is inside the campus geofence,
- the device is on a trusted campus network.

The first accepted scan of a day is the **check-in** (50%), the second the
**check-out** (100%). Approved leave removes days from a student's
denominator; it never counts as presence.

### Security
Routes under `/api/admin` require `Authorization: Bearer <ADMIN_API_KEY>`.
"#,
    ),
    paths(
        crate::api::attendance::scan,
        crate::api::attendance::history,
        crate::api::attendance::records,

        crate::api::student::create_student,
        crate::api::student::list_students,
        crate::api::student::get_student,
        crate::api::student::snapshot,
        crate::api::student::analytics,
        crate::api::student::recompute_student,
        crate::api::student::recompute_all,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::review_leave,

        crate::api::token::issue_token
    ),
    components(
        schemas(
            ScanRequest,
            ScanResult,
            Reject,
            SessionLeg,
            Coordinates,
            VerificationContext,
            AttendanceRecord,
            HistoryQuery,
            RecordQuery,
            Student,
            NewStudent,
            StudentFilter,
            AttendanceTotals,
            AggregateSnapshot,
            AttendanceStanding,
            CohortSummary,
            DailyRecordCount,
            LeaveApplication,
            NewLeaveApplication,
            LeaveStatus,
            LeaveFilter,
            ReviewLeave,
            LeaveReviewResponse,
            LeaveAdjustment,
            IssueTokenRequest,
            IssuedToken
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "QR scan verification and attendance history"),
        (name = "Students", description = "Student profiles and attendance standing"),
        (name = "Leave", description = "Leave applications"),
        (name = "Admin", description = "Registration, reporting, leave review and token issuing"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some("Admin API key"))
                    .build(),
            ),
        );
    }
}
