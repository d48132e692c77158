//! Enrollment workflow
//!
//! A request starts Pending and is reviewed exactly once, into Approved or
//! Rejected. Only Approved requests let a student register for the class's
//! sessions. A Rejected request does not block asking again.

use rollcall_api::{EnrollmentRequest, EnrollmentStatus, TrainingClass};
use rollcall_store::{AuditEventType, RequestFilter, ReviewUpdate, StoreError};
use rollcall_util::{AdminId, ClassId, RequestId, Result, RollcallError, StudentId};
use std::sync::Arc;
use tracing::info;

use crate::context::Context;

pub struct EnrollmentWorkflow {
    ctx: Arc<Context>,
}

impl EnrollmentWorkflow {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub fn create_request(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
    ) -> Result<EnrollmentRequest> {
        let class = self.ctx.class(class_id)?;
        self.ctx.student(student_id)?;

        if let Some(existing) = self.ctx.store.find_active_request(student_id, class_id)? {
            return Err(active_request_conflict(existing.status, &class));
        }

        let request = EnrollmentRequest {
            id: RequestId::new(),
            student_id: *student_id,
            class_id: *class_id,
            status: EnrollmentStatus::Pending,
            requested_at: self.ctx.clock.now(),
            reviewed_by: None,
            reviewed_at: None,
            reject_reason: None,
        };

        match self.ctx.store.insert_request(&request) {
            Ok(()) => {}
            // Lost a race with a concurrent request for the same pair
            Err(StoreError::Conflict(_)) => {
                let status = self
                    .ctx
                    .store
                    .find_active_request(student_id, class_id)?
                    .map(|r| r.status)
                    .unwrap_or(EnrollmentStatus::Pending);
                return Err(active_request_conflict(status, &class));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            request_id = %request.id,
            student_id = %student_id,
            class_id = %class_id,
            "Enrollment requested"
        );
        self.ctx.audit(AuditEventType::EnrollmentRequested {
            request_id: request.id,
            student_id: *student_id,
            class_id: *class_id,
        });

        Ok(request)
    }

    /// Approve or reject a pending request.
    ///
    /// A rejection must carry a reason, though it may be empty. An approval
    /// drops whatever reason was given.
    pub fn review(
        &self,
        request_id: &RequestId,
        reviewer: &AdminId,
        decision: EnrollmentStatus,
        reason: Option<String>,
    ) -> Result<EnrollmentRequest> {
        let reject_reason = match decision {
            EnrollmentStatus::Approved => None,
            EnrollmentStatus::Rejected => Some(reason.ok_or_else(|| {
                RollcallError::validation("a rejection requires a reason")
            })?),
            EnrollmentStatus::Pending => {
                return Err(RollcallError::validation(
                    "decision must be APPROVED or REJECTED",
                ));
            }
        };

        let request = self
            .ctx
            .store
            .get_request(request_id)?
            .ok_or_else(|| RollcallError::not_found(format!("enrollment request {}", request_id)))?;
        if request.status != EnrollmentStatus::Pending {
            return Err(already_reviewed(request.status));
        }

        let update = ReviewUpdate {
            request_id: *request_id,
            decision,
            reviewer: reviewer.clone(),
            reviewed_at: self.ctx.clock.now(),
            reject_reason,
        };
        if !self.ctx.store.review_request(&update)? {
            let status = self
                .ctx
                .store
                .get_request(request_id)?
                .map(|r| r.status)
                .unwrap_or(decision);
            return Err(already_reviewed(status));
        }

        info!(
            request_id = %request_id,
            reviewer = %reviewer,
            decision = %decision,
            "Enrollment reviewed"
        );
        self.ctx.audit(AuditEventType::EnrollmentReviewed {
            request_id: *request_id,
            reviewer: reviewer.clone(),
            decision,
            reason: update.reject_reason.clone(),
        });

        Ok(EnrollmentRequest {
            status: decision,
            reviewed_by: Some(update.reviewer),
            reviewed_at: Some(update.reviewed_at),
            reject_reason: update.reject_reason,
            ..request
        })
    }

    /// Classes the student is approved for, ordered by code
    pub fn my_enrolled_classes(&self, student_id: &StudentId) -> Result<Vec<TrainingClass>> {
        let approved = self.ctx.store.list_requests(&RequestFilter {
            student_id: Some(*student_id),
            status: Some(EnrollmentStatus::Approved),
            ..Default::default()
        })?;

        let mut classes = Vec::with_capacity(approved.len());
        for request in approved {
            if let Some(class) = self.ctx.store.get_class(&request.class_id)? {
                classes.push(class);
            }
        }
        classes.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(classes)
    }

    /// A student's requests, newest first
    pub fn my_requests(&self, student_id: &StudentId) -> Result<Vec<EnrollmentRequest>> {
        Ok(self.ctx.store.list_requests(&RequestFilter {
            student_id: Some(*student_id),
            ..Default::default()
        })?)
    }

    /// Every request, optionally narrowed to a class and status, newest first
    pub fn all_requests(
        &self,
        class_id: Option<&ClassId>,
        status: Option<EnrollmentStatus>,
    ) -> Result<Vec<EnrollmentRequest>> {
        Ok(self.ctx.store.list_requests(&RequestFilter {
            class_id: class_id.copied(),
            status,
            ..Default::default()
        })?)
    }

    pub fn pending_count(&self, class_id: &ClassId) -> Result<usize> {
        Ok(self
            .ctx
            .store
            .count_pending_by_class()?
            .into_iter()
            .find(|(id, _)| id == class_id)
            .map(|(_, count)| count)
            .unwrap_or(0))
    }

    /// Pending requests per class; classes with none are left out
    pub fn pending_counts(&self) -> Result<Vec<(ClassId, usize)>> {
        Ok(self.ctx.store.count_pending_by_class()?)
    }

    pub fn is_enrolled(&self, student_id: &StudentId, class_id: &ClassId) -> Result<bool> {
        Ok(self
            .ctx
            .store
            .find_active_request(student_id, class_id)?
            .is_some_and(|r| r.status == EnrollmentStatus::Approved))
    }
}

fn active_request_conflict(status: EnrollmentStatus, class: &TrainingClass) -> RollcallError {
    match status {
        EnrollmentStatus::Approved => {
            RollcallError::conflict(format!("already enrolled in {}", class.code))
        }
        _ => RollcallError::conflict(format!(
            "already pending enrollment in {}",
            class.code
        )),
    }
}

fn already_reviewed(status: EnrollmentStatus) -> RollcallError {
    RollcallError::invalid_state(format!("request is already {}", status))
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;
    use rollcall_api::EnrollmentStatus;
    use rollcall_util::{AdminId, ClassId, RequestId};
    use std::sync::Barrier;

    fn admin() -> AdminId {
        AdminId::new("admin-1")
    }

    #[test]
    fn one_live_request_per_class() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        let workflow = h.engine.enrollment();

        let request = workflow.create_request(&student.id, &class.id).unwrap();
        assert_eq!(request.status, EnrollmentStatus::Pending);

        let err = workflow.create_request(&student.id, &class.id).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(err.message().contains("pending"));

        workflow
            .review(&request.id, &admin(), EnrollmentStatus::Approved, None)
            .unwrap();
        let err = workflow.create_request(&student.id, &class.id).unwrap_err();
        assert!(err.message().contains("already enrolled"));
    }

    #[test]
    fn rejection_allows_asking_again() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        let workflow = h.engine.enrollment();

        let request = workflow.create_request(&student.id, &class.id).unwrap();
        let rejected = workflow
            .review(&request.id, &admin(), EnrollmentStatus::Rejected, Some(String::new()))
            .unwrap();
        assert_eq!(rejected.status, EnrollmentStatus::Rejected);
        assert_eq!(rejected.reject_reason.as_deref(), Some(""));
        assert_eq!(rejected.reviewed_by, Some(admin()));

        workflow.create_request(&student.id, &class.id).unwrap();
        assert_eq!(workflow.my_requests(&student.id).unwrap().len(), 2);
    }

    #[test]
    fn review_happens_once() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        let workflow = h.engine.enrollment();
        let request = workflow.create_request(&student.id, &class.id).unwrap();

        let approved = workflow
            .review(&request.id, &admin(), EnrollmentStatus::Approved, Some("ok".into()))
            .unwrap();
        assert_eq!(approved.reject_reason, None);

        let err = workflow
            .review(&request.id, &admin(), EnrollmentStatus::Rejected, Some("late".into()))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn review_input_is_validated() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        let workflow = h.engine.enrollment();
        let request = workflow.create_request(&student.id, &class.id).unwrap();

        let err = workflow
            .review(&request.id, &admin(), EnrollmentStatus::Rejected, None)
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = workflow
            .review(&request.id, &admin(), EnrollmentStatus::Pending, None)
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = workflow
            .review(&RequestId::new(), &admin(), EnrollmentStatus::Approved, None)
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn unknown_class_or_student() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        let workflow = h.engine.enrollment();

        assert_eq!(
            workflow.create_request(&student.id, &ClassId::new()).unwrap_err().kind(),
            "not_found"
        );
        assert_eq!(
            workflow
                .create_request(&rollcall_util::StudentId::new(), &class.id)
                .unwrap_err()
                .kind(),
            "not_found"
        );
    }

    #[test]
    fn listings_and_counts() {
        let h = Harness::new();
        let a = h.class("A");
        let b = h.class("B");
        let s1 = h.student("S1");
        let s2 = h.student("S2");
        let workflow = h.engine.enrollment();

        h.enroll(&s1, &b);
        h.clock.advance(chrono::Duration::minutes(1));
        workflow.create_request(&s1.id, &a.id).unwrap();
        h.clock.advance(chrono::Duration::minutes(1));
        workflow.create_request(&s2.id, &a.id).unwrap();

        assert_eq!(workflow.pending_count(&a.id).unwrap(), 2);
        assert_eq!(workflow.pending_count(&b.id).unwrap(), 0);
        assert_eq!(workflow.pending_counts().unwrap(), vec![(a.id, 2)]);

        let newest_first = workflow.all_requests(Some(&a.id), None).unwrap();
        assert_eq!(newest_first[0].student_id, s2.id);
        assert_eq!(
            workflow
                .all_requests(None, Some(EnrollmentStatus::Approved))
                .unwrap()
                .len(),
            1
        );

        assert!(workflow.is_enrolled(&s1.id, &b.id).unwrap());
        assert!(!workflow.is_enrolled(&s1.id, &a.id).unwrap());

        let classes = workflow.my_enrolled_classes(&s1.id).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].code, "B");
    }

    #[test]
    fn racing_requests_leave_one_pending() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        let racers = 8;
        let barrier = Barrier::new(racers);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..racers)
                .map(|_| {
                    let (h, barrier, student, class) = (&h, &barrier, &student, &class);
                    scope.spawn(move || {
                        barrier.wait();
                        h.engine.enrollment().create_request(&student.id, &class.id)
                    })
                })
                .collect();
            handles.into_iter().map(|t| t.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), "conflict");
            assert!(err.message().contains("pending"), "{}", err);
        }
        let requests = h.engine.enrollment().all_requests(Some(&class.id), None).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].status, EnrollmentStatus::Pending);
    }
}
