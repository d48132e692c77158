//! Audit event types

use chrono::{DateTime, Local, NaiveDate};
use rollcall_api::{AttendanceStatus, EnrollmentStatus};
use rollcall_util::{AdminId, ClassId, RequestId, SessionId, StudentId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Configured classes were seeded into the catalog
    ConfigLoaded { seeded_classes: usize },

    ClassCreated { class_id: ClassId, code: String },

    ClassUpdated { class_id: ClassId },

    ClassDeleted { class_id: ClassId, code: String },

    StudentAdded { student_id: StudentId, code: String },

    FaceReferenceSet { student_id: StudentId },

    SessionCreated {
        session_id: SessionId,
        class_id: ClassId,
        date: NaiveDate,
    },

    SessionUpdated {
        session_id: SessionId,
        registration_deadline: DateTime<Local>,
    },

    /// Soft delete; registrations and attendance stay untouched
    SessionDeleted { session_id: SessionId },

    EnrollmentRequested {
        request_id: RequestId,
        student_id: StudentId,
        class_id: ClassId,
    },

    EnrollmentReviewed {
        request_id: RequestId,
        reviewer: AdminId,
        decision: EnrollmentStatus,
        reason: Option<String>,
    },

    Registered {
        student_id: StudentId,
        session_id: SessionId,
    },

    CheckedIn {
        student_id: StudentId,
        session_id: SessionId,
        status: AttendanceStatus,
        face_score: f64,
        location_note: Option<String>,
        /// False when an earlier check-in was overwritten
        first: bool,
    },

    /// The capture was refused; nothing was recorded
    CheckInRejected {
        student_id: StudentId,
        session_id: SessionId,
        reason: String,
    },

    CheckedOut {
        student_id: StudentId,
        session_id: SessionId,
        face_score: f64,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType, timestamp: DateTime<Local>) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }
}
