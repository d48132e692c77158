//! Attendance recorder
//!
//! Per (student, session) pair:
//! None -> CheckedIn (check-in may be repeated, each one overwrites) -> CheckedOut (terminal)
//!
//! Every capture is verified against the student's reference face before
//! anything is written. Status is derived from the check-in time against
//! the session start and never recomputed at check-out.

use chrono::NaiveDate;
use rollcall_api::{
    Attendance, AttendanceRecord, AttendanceStatus, Capture, GeoPoint, HistoryEntry, Student,
};
use rollcall_store::{AttendanceFilter, AuditEventType, CheckInWrite};
use rollcall_util::{
    AttendanceId, ClassId, DateRange, Punctuality, Result, RollcallError, SessionId, StudentId,
    punctuality,
};
use rollcall_verify::{FaceMatcher, LocationAssessor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::Context;

/// One capture submitted for check-in or check-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub student_id: StudentId,
    pub session_id: SessionId,
    /// Durable reference to the already stored image
    pub image_ref: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CaptureRequest {
    fn location(&self) -> Result<Option<GeoPoint>> {
        match (self.latitude, self.longitude) {
            (None, None) => Ok(None),
            (Some(_), None) | (None, Some(_)) => Err(RollcallError::validation(
                "latitude and longitude must be given together",
            )),
            (Some(lat), Some(lng)) => {
                let point = GeoPoint::new(lat, lng);
                if !point.is_valid() {
                    return Err(RollcallError::validation(format!(
                        "coordinates ({}, {}) out of range",
                        lat, lng
                    )));
                }
                Ok(Some(point))
            }
        }
    }
}

/// Filters for [`AttendanceRecorder::get_records`]; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordQuery {
    pub date: Option<NaiveDate>,
    pub session_id: Option<SessionId>,
    pub class_id: Option<ClassId>,
}

pub struct AttendanceRecorder {
    ctx: Arc<Context>,
    face_matcher: Arc<dyn FaceMatcher>,
    location: Arc<dyn LocationAssessor>,
}

impl AttendanceRecorder {
    pub(crate) fn new(
        ctx: Arc<Context>,
        face_matcher: Arc<dyn FaceMatcher>,
        location: Arc<dyn LocationAssessor>,
    ) -> Self {
        Self {
            ctx,
            face_matcher,
            location,
        }
    }

    pub async fn check_in(&self, request: CaptureRequest) -> Result<Attendance> {
        let student = self.ctx.student(&request.student_id)?;
        let session = self.ctx.live_session(&request.session_id)?;
        let point = request.location()?;

        if self.ctx.rules.check_in_requires_registration
            && self
                .ctx
                .store
                .find_registration(&student.id, &session.id)?
                .is_none()
        {
            return Err(self.rejected(
                &request,
                RollcallError::invalid_state("not registered for this session"),
            ));
        }

        let score = match self.verify_face(&student, &request.image_ref).await {
            Ok(score) => score,
            Err(e) => return Err(self.rejected(&request, e)),
        };

        let at = self.ctx.clock.now();
        let status = match punctuality(at, session.start_instant(), self.ctx.rules.late_window) {
            Punctuality::OnTime => AttendanceStatus::Present,
            Punctuality::Late => AttendanceStatus::Late,
            Punctuality::TooLate => AttendanceStatus::Absent,
        };

        let class = self.ctx.class(&session.class_id)?;
        let location_note = self.location.assess(class.reference_point, point);

        let attendance = Attendance {
            id: AttendanceId::new(),
            student_id: student.id,
            session_id: session.id,
            check_in: Some(Capture {
                at,
                location: point,
                face_score: score,
                image_ref: request.image_ref.clone(),
            }),
            check_out: None,
            status,
            location_note,
        };

        let (stored, first) = match self.ctx.store.upsert_check_in(&attendance)? {
            CheckInWrite::Created(stored) => (stored, true),
            CheckInWrite::Replaced(stored) => (stored, false),
            CheckInWrite::AlreadyCheckedOut => {
                return Err(RollcallError::already_checked_out(
                    "attendance for this session is already closed",
                ));
            }
        };

        info!(
            student_id = %stored.student_id,
            session_id = %stored.session_id,
            status = %stored.status,
            score,
            first,
            note = stored.location_note.as_deref().unwrap_or(""),
            "Checked in"
        );
        self.ctx.audit(AuditEventType::CheckedIn {
            student_id: stored.student_id,
            session_id: stored.session_id,
            status: stored.status,
            face_score: score,
            location_note: stored.location_note.clone(),
            first,
        });

        Ok(stored)
    }

    pub async fn check_out(&self, request: CaptureRequest) -> Result<Attendance> {
        let student = self.ctx.student(&request.student_id)?;
        let point = request.location()?;
        let score = self.verify_face(&student, &request.image_ref).await?;

        let existing = self
            .ctx
            .store
            .get_attendance(&student.id, &request.session_id)?
            .filter(|a| a.check_in.is_some())
            .ok_or_else(|| RollcallError::not_found("no check-in for this session"))?;
        if existing.is_checked_out() {
            return Err(RollcallError::already_checked_out("already checked out"));
        }

        let capture = Capture {
            at: self.ctx.clock.now(),
            location: point,
            face_score: score,
            image_ref: request.image_ref.clone(),
        };

        if !self
            .ctx
            .store
            .record_check_out(&student.id, &request.session_id, &capture)?
        {
            return Err(RollcallError::already_checked_out("already checked out"));
        }

        info!(
            student_id = %student.id,
            session_id = %request.session_id,
            score,
            "Checked out"
        );
        self.ctx.audit(AuditEventType::CheckedOut {
            student_id: student.id,
            session_id: request.session_id,
            face_score: score,
        });

        Ok(Attendance {
            check_out: Some(capture),
            ..existing
        })
    }

    /// Check-ins joined with who and which session, newest first
    pub fn get_records(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>> {
        Ok(self.ctx.store.list_attendance(&AttendanceFilter {
            range: query.date.map(DateRange::single),
            session_id: query.session_id,
            class_id: query.class_id,
            ..Default::default()
        })?)
    }

    /// A student's own attendance, newest first
    pub fn get_my_history(&self, student_id: &StudentId) -> Result<Vec<HistoryEntry>> {
        Ok(self.ctx.store.list_history(student_id)?)
    }

    pub fn get_attendance(
        &self,
        student_id: &StudentId,
        session_id: &SessionId,
    ) -> Result<Attendance> {
        self.ctx
            .store
            .get_attendance(student_id, session_id)?
            .ok_or_else(|| RollcallError::not_found("no attendance for this session"))
    }

    /// Compare a capture with the student's reference face; returns the score
    async fn verify_face(&self, student: &Student, image_ref: &str) -> Result<f64> {
        let reference = student.face_ref.as_deref().ok_or_else(|| {
            RollcallError::face_not_registered(format!(
                "student {} has no reference face",
                student.code
            ))
        })?;
        if image_ref.trim().is_empty() {
            return Err(RollcallError::validation("capture image is required"));
        }

        let verdict = self
            .face_matcher
            .compare(reference, image_ref)
            .await
            .map_err(|e| {
                warn!(student_id = %student.id, error = %e, "Face matcher failed");
                RollcallError::from(e)
            })?;

        let threshold = self.ctx.rules.face_match_threshold;
        if !verdict.matched || verdict.score < threshold {
            warn!(
                student_id = %student.id,
                score = verdict.score,
                threshold,
                "Face mismatch"
            );
            return Err(RollcallError::face_mismatch(format!(
                "face does not match (similarity {:.1}%), please take a new photo",
                verdict.score * 100.0
            )));
        }

        Ok(verdict.score)
    }

    /// Log a refused check-in to the audit trail and hand the error back
    fn rejected(&self, request: &CaptureRequest, err: RollcallError) -> RollcallError {
        self.ctx.audit(AuditEventType::CheckInRejected {
            student_id: request.student_id,
            session_id: request.session_id,
            reason: err.to_string(),
        });
        err
    }
}
