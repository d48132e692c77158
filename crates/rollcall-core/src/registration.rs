//! Registration ledger

use rollcall_api::SessionRegistration;
use rollcall_store::{AuditEventType, StoreError};
use rollcall_util::{RegistrationId, Result, RollcallError, SessionId, StudentId, format_date};
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::Context;

/// A student's commitments to attend sessions, at most one per day
pub struct RegistrationLedger {
    ctx: Arc<Context>,
}

impl RegistrationLedger {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Register for a session. Registration closes at the session's
    /// deadline; registering exactly at the deadline is accepted.
    pub fn register(
        &self,
        student_id: &StudentId,
        session_id: &SessionId,
    ) -> Result<SessionRegistration> {
        let session = self.ctx.live_session(session_id)?;
        self.ctx.student(student_id)?;

        let now = self.ctx.clock.now();
        if now > session.registration_deadline {
            warn!(
                student_id = %student_id,
                session_id = %session_id,
                deadline = %session.registration_deadline,
                "Registration after deadline"
            );
            return Err(RollcallError::deadline_passed(format!(
                "registration for '{}' closed at {}",
                session.name,
                session.registration_deadline.format("%Y-%m-%d %H:%M")
            )));
        }

        if self.ctx.rules.registration_requires_enrollment {
            let enrolled = self
                .ctx
                .store
                .find_active_request(student_id, &session.class_id)?
                .is_some_and(|r| r.status == rollcall_api::EnrollmentStatus::Approved);
            if !enrolled {
                return Err(RollcallError::invalid_state(
                    "not enrolled in this session's class",
                ));
            }
        }

        if self.ctx.store.find_registration(student_id, session_id)?.is_some() {
            return Err(RollcallError::conflict("already registered for this session"));
        }
        if self
            .ctx
            .store
            .find_registration_on_date(student_id, session.date)?
            .is_some()
        {
            return Err(one_per_day(session.date));
        }

        let registration = SessionRegistration {
            id: RegistrationId::new(),
            student_id: *student_id,
            session_id: *session_id,
            session_date: session.date,
            registered_at: now,
        };

        self.ctx
            .store
            .insert_registration(&registration)
            .map_err(|e| match e {
                StoreError::Conflict(_) => one_per_day(session.date),
                other => other.into(),
            })?;

        info!(
            student_id = %student_id,
            session_id = %session_id,
            date = %format_date(session.date),
            "Registered for session"
        );
        self.ctx.audit(AuditEventType::Registered {
            student_id: *student_id,
            session_id: *session_id,
        });

        Ok(registration)
    }

    /// A student's registrations, latest session day first
    pub fn registrations_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<SessionRegistration>> {
        Ok(self.ctx.store.list_registrations_for_student(student_id)?)
    }

    /// Who registered for a session, in registration order
    pub fn registrations_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<SessionRegistration>> {
        Ok(self.ctx.store.list_registrations_for_session(session_id)?)
    }
}

fn one_per_day(date: chrono::NaiveDate) -> RollcallError {
    RollcallError::conflict(format!(
        "one session per day: already registered on {}",
        format_date(date)
    ))
}

#[cfg(test)]
mod tests {
    use crate::testing::{Harness, day, hm};
    use rollcall_api::SessionDraft;
    use rollcall_config::Rules;
    use rollcall_util::{SessionId, local_instant};
    use std::sync::Barrier;

    #[test]
    fn one_session_per_day() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        h.enroll(&student, &class);
        let a = h.session(class.id, day(10), hm(9, 0));
        let b = h.session(class.id, day(10), hm(14, 0));
        let next_day = h.session(class.id, day(11), hm(9, 0));
        let ledger = h.engine.registration();

        ledger.register(&student.id, &a.id).unwrap();

        let err = ledger.register(&student.id, &a.id).unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let err = ledger.register(&student.id, &b.id).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(err.message().contains("one session per day"));

        ledger.register(&student.id, &next_day.id).unwrap();
        assert_eq!(ledger.registrations_for_student(&student.id).unwrap().len(), 2);
        assert_eq!(ledger.registrations_for_session(&a.id).unwrap().len(), 1);
    }

    #[test]
    fn deadline_is_inclusive() {
        let h = Harness::new();
        let class = h.class("CS101");
        let early = h.student("S1");
        let late = h.student("S2");
        h.enroll(&early, &class);
        h.enroll(&late, &class);
        let session = h.session(class.id, day(10), hm(9, 0));
        let ledger = h.engine.registration();

        h.clock.set(local_instant(day(10), hm(7, 0)));
        ledger.register(&early.id, &session.id).unwrap();

        h.clock.advance(chrono::Duration::seconds(1));
        let err = ledger.register(&late.id, &session.id).unwrap_err();
        assert_eq!(err.kind(), "deadline_passed");
    }

    #[test]
    fn enrollment_gates_registration() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        let session = h.session(class.id, day(10), hm(9, 0));

        let err = h.engine.registration().register(&student.id, &session.id).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");

        h.engine.enrollment().create_request(&student.id, &class.id).unwrap();
        let err = h.engine.registration().register(&student.id, &session.id).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");

        let open = Harness::with_rules(Rules {
            registration_requires_enrollment: false,
            ..Rules::default()
        });
        let class = open.class("CS101");
        let student = open.student("S1");
        let session = open.session(class.id, day(10), hm(9, 0));
        open.engine.registration().register(&student.id, &session.id).unwrap();
    }

    #[test]
    fn missing_or_deleted_sessions() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        h.enroll(&student, &class);
        let session = h.session(class.id, day(10), hm(9, 0));
        h.engine.sessions().soft_delete_session(&session.id).unwrap();

        let ledger = h.engine.registration();
        assert_eq!(ledger.register(&student.id, &session.id).unwrap_err().kind(), "not_found");
        assert_eq!(
            ledger.register(&student.id, &SessionId::new()).unwrap_err().kind(),
            "not_found"
        );
    }

    #[test]
    fn moving_a_session_moves_the_registered_day() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        h.enroll(&student, &class);
        let moved = h.session(class.id, day(10), hm(9, 0));
        let afternoon = h.session(class.id, day(10), hm(14, 0));
        let next_day = h.session(class.id, day(11), hm(9, 0));
        let ledger = h.engine.registration();

        ledger.register(&student.id, &moved.id).unwrap();
        h.engine
            .sessions()
            .update_session(
                &moved.id,
                SessionDraft {
                    class_id: class.id,
                    date: day(11),
                    name: "Moved".into(),
                    start_time: hm(13, 0),
                    end_time: hm(15, 0),
                },
            )
            .unwrap();

        let err = ledger.register(&student.id, &next_day.id).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(err.message().contains("one session per day"));
        ledger.register(&student.id, &afternoon.id).unwrap();

        let days: Vec<_> = ledger
            .registrations_for_student(&student.id)
            .unwrap()
            .into_iter()
            .map(|r| (r.session_id, r.session_date))
            .collect();
        assert_eq!(days, vec![(moved.id, day(11)), (afternoon.id, day(10))]);

        // Moving the afternoon session onto day 11 would double up the student
        let err = h
            .engine
            .sessions()
            .update_session(
                &afternoon.id,
                SessionDraft {
                    class_id: class.id,
                    date: day(11),
                    name: "Clash".into(),
                    start_time: hm(16, 0),
                    end_time: hm(17, 0),
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let kept = h.engine.sessions().get_session(&afternoon.id).unwrap();
        assert_eq!(kept.date, day(10));
        assert_eq!(kept.start_time, hm(14, 0));
        let registration = ledger
            .registrations_for_session(&afternoon.id)
            .unwrap()
            .remove(0);
        assert_eq!(registration.session_date, day(10));
    }

    #[test]
    fn registration_on_deleted_session_still_holds_the_day() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        h.enroll(&student, &class);
        let cancelled = h.session(class.id, day(10), hm(9, 0));
        let ledger = h.engine.registration();

        ledger.register(&student.id, &cancelled.id).unwrap();
        h.engine.sessions().soft_delete_session(&cancelled.id).unwrap();
        let replacement = h.session(class.id, day(10), hm(9, 0));

        let err = ledger.register(&student.id, &replacement.id).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(err.message().contains("one session per day"));
        assert_eq!(ledger.registrations_for_session(&cancelled.id).unwrap().len(), 1);
    }

    #[test]
    fn racing_registrations_keep_one_per_day() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        h.enroll(&student, &class);
        let sessions = [
            h.session(class.id, day(10), hm(7, 0)),
            h.session(class.id, day(10), hm(9, 0)),
            h.session(class.id, day(10), hm(13, 0)),
        ];
        let targets: Vec<SessionId> = sessions.iter().chain(&sessions).map(|s| s.id).collect();
        let barrier = Barrier::new(targets.len());

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = targets
                .iter()
                .map(|session_id| {
                    let (h, barrier, student) = (&h, &barrier, &student);
                    scope.spawn(move || {
                        barrier.wait();
                        h.engine.registration().register(&student.id, session_id)
                    })
                })
                .collect();
            handles.into_iter().map(|t| t.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), "conflict");
        }
        assert_eq!(
            h.engine.registration().registrations_for_student(&student.id).unwrap().len(),
            1
        );
    }
}
