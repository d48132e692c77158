//! Store trait definitions

use chrono::{DateTime, Local, NaiveDate};
use rollcall_api::{
    Attendance, AttendanceRecord, Capture, ClassSession, EnrollmentRequest, EnrollmentStatus,
    HistoryEntry, SessionRegistration, Student, TrainingClass,
};
use rollcall_util::{AdminId, ClassId, DateRange, RequestId, SessionId, StudentId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
///
/// Every method that guards an invariant does so in a single statement, so
/// callers never need a read-then-write sequence to stay correct under
/// concurrent use.
pub trait Store: Send + Sync {
    // Class catalog

    /// Insert a class; `Conflict` if the code is taken
    fn insert_class(&self, class: &TrainingClass) -> StoreResult<()>;

    /// Overwrite the descriptive fields of a class. Returns false if absent.
    fn update_class(&self, class: &TrainingClass) -> StoreResult<bool>;

    /// Delete a class. Returns false if absent; `Conflict` if anything references it.
    fn delete_class(&self, id: &ClassId) -> StoreResult<bool>;

    fn get_class(&self, id: &ClassId) -> StoreResult<Option<TrainingClass>>;

    fn get_class_by_code(&self, code: &str) -> StoreResult<Option<TrainingClass>>;

    /// All classes ordered by code
    fn list_classes(&self) -> StoreResult<Vec<TrainingClass>>;

    // Student directory

    /// Insert a student; `Conflict` if the code is taken
    fn insert_student(&self, student: &Student) -> StoreResult<()>;

    /// Set the reference face image. Returns false if the student is absent.
    fn set_face_ref(&self, id: &StudentId, face_ref: &str) -> StoreResult<bool>;

    fn get_student(&self, id: &StudentId) -> StoreResult<Option<Student>>;

    /// All students ordered by code
    fn list_students(&self) -> StoreResult<Vec<Student>>;

    // Sessions

    /// Insert a session only while fewer than `max_per_day` live sessions
    /// exist for its class and date. Returns false when the cap is reached.
    fn insert_session_capped(&self, session: &ClassSession, max_per_day: usize)
    -> StoreResult<bool>;

    /// Overwrite a live session and carry its new date onto its registrations,
    /// atomically. Returns false if absent or deleted; `Conflict` if the move
    /// would give a registered student two sessions on the new date.
    fn update_session(&self, session: &ClassSession) -> StoreResult<bool>;

    /// Mark a live session deleted. Returns false if absent or already deleted.
    fn soft_delete_session(&self, id: &SessionId) -> StoreResult<bool>;

    /// Get a session, deleted or not
    fn get_session(&self, id: &SessionId) -> StoreResult<Option<ClassSession>>;

    /// Live sessions on a date ordered by start time then name.
    /// An empty `class_ids` means every class.
    fn list_sessions_by_date(
        &self,
        date: NaiveDate,
        class_ids: &[ClassId],
    ) -> StoreResult<Vec<ClassSession>>;

    /// Live sessions within a range ordered by date, start time, then name
    fn list_sessions_in_range(
        &self,
        range: &DateRange,
        class_id: Option<&ClassId>,
    ) -> StoreResult<Vec<ClassSession>>;

    /// Number of sessions (deleted included) and enrollment requests referencing a class
    fn count_class_dependents(&self, id: &ClassId) -> StoreResult<usize>;

    // Enrollment

    /// Insert a request; `Conflict` if a pending or approved one exists for the pair
    fn insert_request(&self, request: &EnrollmentRequest) -> StoreResult<()>;

    fn get_request(&self, id: &RequestId) -> StoreResult<Option<EnrollmentRequest>>;

    /// The pending or approved request for a (student, class) pair, if any
    fn find_active_request(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
    ) -> StoreResult<Option<EnrollmentRequest>>;

    /// Move a pending request to `decision`. Returns false if it was not pending.
    fn review_request(&self, review: &ReviewUpdate) -> StoreResult<bool>;

    /// Requests matching the filter, newest first
    fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<EnrollmentRequest>>;

    /// Pending request count per class, ordered by class id; classes with none are omitted
    fn count_pending_by_class(&self) -> StoreResult<Vec<(ClassId, usize)>>;

    // Registrations

    /// Insert a registration; `Conflict` on a duplicate session or date for the student
    fn insert_registration(&self, registration: &SessionRegistration) -> StoreResult<()>;

    fn find_registration(
        &self,
        student_id: &StudentId,
        session_id: &SessionId,
    ) -> StoreResult<Option<SessionRegistration>>;

    fn find_registration_on_date(
        &self,
        student_id: &StudentId,
        date: NaiveDate,
    ) -> StoreResult<Option<SessionRegistration>>;

    /// A student's registrations, newest session date first
    fn list_registrations_for_student(
        &self,
        student_id: &StudentId,
    ) -> StoreResult<Vec<SessionRegistration>>;

    /// A session's registrations in registration order
    fn list_registrations_for_session(
        &self,
        session_id: &SessionId,
    ) -> StoreResult<Vec<SessionRegistration>>;

    // Attendance

    /// Insert the check-in, or overwrite the check-in fields of an existing
    /// row that has not been checked out.
    fn upsert_check_in(&self, attendance: &Attendance) -> StoreResult<CheckInWrite>;

    /// Record the check-out on a row still open. Returns false if there is
    /// no row or it was already checked out.
    fn record_check_out(
        &self,
        student_id: &StudentId,
        session_id: &SessionId,
        capture: &Capture,
    ) -> StoreResult<bool>;

    fn get_attendance(
        &self,
        student_id: &StudentId,
        session_id: &SessionId,
    ) -> StoreResult<Option<Attendance>>;

    /// Attendance joined with student and session, newest check-in first
    fn list_attendance(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>>;

    /// A student's attendance with full sessions, newest check-in first
    fn list_history(&self, student_id: &StudentId) -> StoreResult<Vec<HistoryEntry>>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Outcome of a check-in write
#[derive(Debug, Clone, PartialEq)]
pub enum CheckInWrite {
    Created(Attendance),
    /// An earlier check-in was overwritten
    Replaced(Attendance),
    /// The pair is checked out; nothing was written
    AlreadyCheckedOut,
}

/// Terminal transition of a pending enrollment request
#[derive(Debug, Clone)]
pub struct ReviewUpdate {
    pub request_id: RequestId,
    pub decision: EnrollmentStatus,
    pub reviewer: AdminId,
    pub reviewed_at: DateTime<Local>,
    pub reject_reason: Option<String>,
}

/// Enrollment request query; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub student_id: Option<StudentId>,
    pub class_id: Option<ClassId>,
    pub status: Option<EnrollmentStatus>,
}

/// Attendance query; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    /// Session dates to include
    pub range: Option<DateRange>,
    pub session_id: Option<SessionId>,
    pub class_id: Option<ClassId>,
    pub student_id: Option<StudentId>,
    /// Skip rows whose session was soft-deleted
    pub live_sessions_only: bool,
}
