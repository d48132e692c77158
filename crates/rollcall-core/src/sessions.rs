//! Session registry
//!
//! Sessions are scheduled per class and day, capped at
//! `Rules::max_sessions_per_day` live sessions. Deleting a session only
//! hides it: registrations and attendance recorded against it are kept.

use chrono::NaiveDate;
use rollcall_api::{ClassSession, SessionDraft};
use rollcall_store::{AuditEventType, StoreError};
use rollcall_util::{
    ClassId, DateRange, Result, RollcallError, SessionId, format_date, registration_deadline,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::Context;

pub struct SessionRegistry {
    ctx: Arc<Context>,
}

impl SessionRegistry {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub fn create_session(&self, draft: SessionDraft) -> Result<ClassSession> {
        self.ctx.class(&draft.class_id)?;
        let draft = validate_draft(draft)?;

        let session = ClassSession {
            id: SessionId::new(),
            class_id: draft.class_id,
            date: draft.date,
            registration_deadline: registration_deadline(
                draft.date,
                draft.start_time,
                self.ctx.rules.registration_lead,
            ),
            name: draft.name,
            start_time: draft.start_time,
            end_time: draft.end_time,
            is_deleted: false,
            created_at: self.ctx.clock.now(),
        };

        let max = self.ctx.rules.max_sessions_per_day;
        if !self.ctx.store.insert_session_capped(&session, max)? {
            warn!(
                class_id = %session.class_id,
                date = %format_date(session.date),
                max,
                "Session cap reached"
            );
            return Err(RollcallError::capacity(format!(
                "class already has {} sessions on {}",
                max,
                format_date(session.date)
            )));
        }

        info!(
            session_id = %session.id,
            class_id = %session.class_id,
            date = %format_date(session.date),
            "Session created"
        );
        self.ctx.audit(AuditEventType::SessionCreated {
            session_id: session.id,
            class_id: session.class_id,
            date: session.date,
        });

        Ok(session)
    }

    /// Replace a live session's schedule and recompute its deadline.
    /// The per-day cap is not re-checked when moving a session, but a move
    /// that would leave a registered student with two sessions on the new
    /// date is refused with `Conflict`.
    pub fn update_session(&self, id: &SessionId, draft: SessionDraft) -> Result<ClassSession> {
        let current = self.ctx.live_session(id)?;
        self.ctx.class(&draft.class_id)?;
        let draft = validate_draft(draft)?;

        let session = ClassSession {
            class_id: draft.class_id,
            date: draft.date,
            registration_deadline: registration_deadline(
                draft.date,
                draft.start_time,
                self.ctx.rules.registration_lead,
            ),
            name: draft.name,
            start_time: draft.start_time,
            end_time: draft.end_time,
            ..current
        };

        let updated = self.ctx.store.update_session(&session).map_err(|e| match e {
            StoreError::Conflict(_) => {
                warn!(
                    session_id = %id,
                    date = %format_date(session.date),
                    "Session move clashes with a registration"
                );
                RollcallError::conflict(format!(
                    "one session per day: a registered student already has a session on {}",
                    format_date(session.date)
                ))
            }
            other => other.into(),
        })?;
        if !updated {
            return Err(RollcallError::not_found(format!("session {}", id)));
        }

        info!(session_id = %id, "Session updated");
        self.ctx.audit(AuditEventType::SessionUpdated {
            session_id: session.id,
            registration_deadline: session.registration_deadline,
        });

        Ok(session)
    }

    /// Hide a session from listings and free its slot in the daily cap
    pub fn soft_delete_session(&self, id: &SessionId) -> Result<()> {
        if !self.ctx.store.soft_delete_session(id)? {
            return Err(RollcallError::not_found(format!("session {}", id)));
        }

        info!(session_id = %id, "Session deleted");
        self.ctx.audit(AuditEventType::SessionDeleted { session_id: *id });
        Ok(())
    }

    pub fn get_session(&self, id: &SessionId) -> Result<ClassSession> {
        self.ctx.live_session(id)
    }

    /// Live sessions on `date` ordered by start time; empty `class_ids` means all classes
    pub fn list_by_date(&self, date: NaiveDate, class_ids: &[ClassId]) -> Result<Vec<ClassSession>> {
        Ok(self.ctx.store.list_sessions_by_date(date, class_ids)?)
    }

    pub fn list_today(&self, class_ids: &[ClassId]) -> Result<Vec<ClassSession>> {
        self.list_by_date(self.ctx.clock.today(), class_ids)
    }

    pub fn list_in_range(
        &self,
        range: &DateRange,
        class_id: Option<&ClassId>,
    ) -> Result<Vec<ClassSession>> {
        Ok(self.ctx.store.list_sessions_in_range(range, class_id)?)
    }
}

fn validate_draft(mut draft: SessionDraft) -> Result<SessionDraft> {
    draft.name = draft.name.trim().to_string();
    if draft.name.is_empty() {
        return Err(RollcallError::validation("session name cannot be empty"));
    }
    if draft.end_time <= draft.start_time {
        return Err(RollcallError::validation(format!(
            "session must end after it starts ({} - {})",
            rollcall_util::format_time_of_day(draft.start_time),
            rollcall_util::format_time_of_day(draft.end_time)
        )));
    }
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use crate::testing::{Harness, day, hm};
    use rollcall_api::SessionDraft;
    use rollcall_util::{ClassId, DateRange, SessionId, local_instant};

    fn draft(class_id: ClassId, start: (u32, u32), end: (u32, u32)) -> SessionDraft {
        SessionDraft {
            class_id,
            date: day(10),
            name: "Lab".into(),
            start_time: hm(start.0, start.1),
            end_time: hm(end.0, end.1),
        }
    }

    #[test]
    fn fourth_session_of_the_day_is_refused() {
        let h = Harness::new();
        let class = h.class("CS101");

        h.session(class.id, day(10), hm(7, 0));
        h.session(class.id, day(10), hm(9, 0));
        let third = h.session(class.id, day(10), hm(13, 0));

        let err = h
            .engine
            .sessions()
            .create_session(draft(class.id, (15, 0), (17, 0)))
            .unwrap_err();
        assert_eq!(err.kind(), "capacity_exceeded");

        // Deleting one frees a slot
        h.engine.sessions().soft_delete_session(&third.id).unwrap();
        h.engine
            .sessions()
            .create_session(draft(class.id, (15, 0), (17, 0)))
            .unwrap();
    }

    #[test]
    fn deadline_is_start_minus_lead() {
        let h = Harness::new();
        let class = h.class("CS101");

        let session = h.session(class.id, day(10), hm(9, 0));
        assert_eq!(session.registration_deadline, local_instant(day(10), hm(7, 0)));

        let mut moved = draft(class.id, (14, 30), (16, 0));
        moved.date = day(11);
        let updated = h.engine.sessions().update_session(&session.id, moved).unwrap();
        assert_eq!(updated.id, session.id);
        assert_eq!(updated.registration_deadline, local_instant(day(11), hm(12, 30)));
        assert_eq!(updated.created_at, session.created_at);
    }

    #[test]
    fn drafts_are_validated() {
        let h = Harness::new();
        let class = h.class("CS101");
        let sessions = h.engine.sessions();

        let err = sessions.create_session(draft(class.id, (9, 0), (9, 0))).unwrap_err();
        assert_eq!(err.kind(), "validation");

        let mut unnamed = draft(class.id, (9, 0), (10, 0));
        unnamed.name = " ".into();
        assert_eq!(sessions.create_session(unnamed).unwrap_err().kind(), "validation");

        let err = sessions.create_session(draft(ClassId::new(), (9, 0), (10, 0))).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn deleted_sessions_are_gone() {
        let h = Harness::new();
        let class = h.class("CS101");
        let session = h.session(class.id, day(10), hm(9, 0));
        let sessions = h.engine.sessions();

        sessions.soft_delete_session(&session.id).unwrap();
        assert_eq!(sessions.soft_delete_session(&session.id).unwrap_err().kind(), "not_found");
        assert_eq!(sessions.get_session(&session.id).unwrap_err().kind(), "not_found");
        assert!(sessions.list_by_date(day(10), &[]).unwrap().is_empty());

        let err = sessions
            .update_session(&session.id, draft(class.id, (9, 0), (10, 0)))
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(
            sessions
                .update_session(&SessionId::new(), draft(class.id, (9, 0), (10, 0)))
                .unwrap_err()
                .kind(),
            "not_found"
        );
    }

    #[test]
    fn listings_are_ordered_and_filtered() {
        let h = Harness::new();
        let a = h.class("A");
        let b = h.class("B");
        h.session(a.id, day(1), hm(13, 0));
        h.session(b.id, day(1), hm(9, 0));
        h.session(a.id, day(1), hm(7, 0));
        h.session(a.id, day(2), hm(7, 0));

        let sessions = h.engine.sessions();
        let today: Vec<_> = sessions
            .list_today(&[])
            .unwrap()
            .into_iter()
            .map(|s| s.start_time)
            .collect();
        assert_eq!(today, vec![hm(7, 0), hm(9, 0), hm(13, 0)]);

        assert_eq!(sessions.list_today(&[a.id]).unwrap().len(), 2);
        assert_eq!(sessions.list_today(&[a.id, b.id]).unwrap().len(), 3);

        let range = DateRange::new(day(1), day(2)).unwrap();
        assert_eq!(sessions.list_in_range(&range, Some(&a.id)).unwrap().len(), 3);
        assert_eq!(sessions.list_in_range(&range, None).unwrap().len(), 4);
    }
}
