//! State shared by every engine component

use rollcall_api::{ClassSession, Student, TrainingClass};
use rollcall_config::Rules;
use rollcall_store::{AuditEvent, AuditEventType, Store};
use rollcall_util::{ClassId, Clock, Result, RollcallError, SessionId, StudentId};
use std::sync::Arc;
use tracing::warn;

pub(crate) struct Context {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub rules: Rules,
}

impl Context {
    /// Append to the audit log; a failed append never fails the operation
    pub fn audit(&self, event: AuditEventType) {
        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(event, self.clock.now()))
        {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    pub fn class(&self, id: &ClassId) -> Result<TrainingClass> {
        self.store
            .get_class(id)?
            .ok_or_else(|| RollcallError::not_found(format!("class {}", id)))
    }

    pub fn student(&self, id: &StudentId) -> Result<Student> {
        self.store
            .get_student(id)?
            .ok_or_else(|| RollcallError::not_found(format!("student {}", id)))
    }

    /// A session that exists and is not soft-deleted
    pub fn live_session(&self, id: &SessionId) -> Result<ClassSession> {
        match self.store.get_session(id)? {
            Some(session) if !session.is_deleted => Ok(session),
            _ => Err(RollcallError::not_found(format!("session {}", id))),
        }
    }
}
