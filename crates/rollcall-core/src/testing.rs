//! Fixtures shared by the engine's unit tests

use chrono::{NaiveDate, NaiveTime};
use rollcall_api::{ClassSession, NewClass, NewStudent, SessionDraft, Student, TrainingClass};
use rollcall_config::Rules;
use rollcall_store::SqliteStore;
use rollcall_util::{AdminId, ClassId, FixedClock};
use rollcall_verify::{MockFaceMatcher, MockLocationAssessor};
use std::sync::Arc;

use crate::{Collaborators, RollcallEngine};

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub struct Harness {
    pub engine: Arc<RollcallEngine>,
    pub clock: Arc<FixedClock>,
    pub faces: Arc<MockFaceMatcher>,
    pub location: Arc<MockLocationAssessor>,
}

impl Harness {
    /// Engine over an in-memory store, clock at 2025-03-01 08:00
    pub fn new() -> Self {
        Self::with_rules(Rules::default())
    }

    pub fn with_rules(rules: Rules) -> Self {
        let clock = Arc::new(FixedClock::at(day(1), hm(8, 0)));
        let faces = Arc::new(MockFaceMatcher::with_score(0.9));
        let location = Arc::new(MockLocationAssessor::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());

        let engine = Arc::new(RollcallEngine::new(
            rules,
            store,
            clock.clone(),
            Collaborators {
                face_matcher: faces.clone(),
                location: location.clone(),
            },
        ));

        Self {
            engine,
            clock,
            faces,
            location,
        }
    }

    pub fn set_now(&self, date: NaiveDate, time: NaiveTime) {
        self.clock.set(rollcall_util::local_instant(date, time));
    }

    pub fn class(&self, code: &str) -> TrainingClass {
        self.engine
            .catalog()
            .create_class(NewClass {
                code: code.into(),
                name: format!("Class {}", code),
                ..Default::default()
            })
            .unwrap()
    }

    /// Student with a registered reference face
    pub fn student(&self, code: &str) -> Student {
        let student = self
            .engine
            .catalog()
            .add_student(NewStudent {
                code: code.into(),
                full_name: format!("Student {}", code),
                email: None,
            })
            .unwrap();
        self.engine
            .catalog()
            .set_face_reference(&student.id, &format!("mock://faces/{}.jpg", code))
            .unwrap()
    }

    pub fn session(&self, class_id: ClassId, date: NaiveDate, start: NaiveTime) -> ClassSession {
        self.engine
            .sessions()
            .create_session(SessionDraft {
                class_id,
                date,
                name: format!("Session {}", rollcall_util::format_time_of_day(start)),
                start_time: start,
                end_time: start + chrono::Duration::hours(2),
            })
            .unwrap()
    }

    /// Request and approve enrollment at the current clock time
    pub fn enroll(&self, student: &Student, class: &TrainingClass) {
        let request = self
            .engine
            .enrollment()
            .create_request(&student.id, &class.id)
            .unwrap();
        self.engine
            .enrollment()
            .review(
                &request.id,
                &AdminId::new("admin"),
                rollcall_api::EnrollmentStatus::Approved,
                None,
            )
            .unwrap();
    }
}
