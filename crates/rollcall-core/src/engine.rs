//! Engine facade wiring every component to one store and clock

use rollcall_config::Rules;
use rollcall_store::{AuditEvent, Store};
use rollcall_util::{Clock, Result};
use rollcall_verify::{FaceMatcher, LocationAssessor};
use std::sync::Arc;
use tracing::info;

use crate::context::Context;
use crate::{
    AttendanceRecorder, Catalog, EnrollmentWorkflow, RegistrationLedger, SessionRegistry,
    StatisticsAggregator,
};

/// External services the attendance recorder depends on
#[derive(Clone)]
pub struct Collaborators {
    pub face_matcher: Arc<dyn FaceMatcher>,
    pub location: Arc<dyn LocationAssessor>,
}

/// The rollcall engine
pub struct RollcallEngine {
    ctx: Arc<Context>,
    catalog: Catalog,
    sessions: SessionRegistry,
    enrollment: EnrollmentWorkflow,
    registration: RegistrationLedger,
    attendance: AttendanceRecorder,
    statistics: StatisticsAggregator,
}

impl RollcallEngine {
    pub fn new(
        rules: Rules,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Self {
        info!(
            max_sessions_per_day = rules.max_sessions_per_day,
            late_window_minutes = rules.late_window.num_minutes(),
            face_match_threshold = rules.face_match_threshold,
            "Rollcall engine initialized"
        );

        let ctx = Arc::new(Context { store, clock, rules });

        Self {
            catalog: Catalog::new(ctx.clone()),
            sessions: SessionRegistry::new(ctx.clone()),
            enrollment: EnrollmentWorkflow::new(ctx.clone()),
            registration: RegistrationLedger::new(ctx.clone()),
            attendance: AttendanceRecorder::new(
                ctx.clone(),
                collaborators.face_matcher,
                collaborators.location,
            ),
            statistics: StatisticsAggregator::new(ctx.clone()),
            ctx,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn enrollment(&self) -> &EnrollmentWorkflow {
        &self.enrollment
    }

    pub fn registration(&self) -> &RegistrationLedger {
        &self.registration
    }

    pub fn attendance(&self) -> &AttendanceRecorder {
        &self.attendance
    }

    pub fn statistics(&self) -> &StatisticsAggregator {
        &self.statistics
    }

    pub fn rules(&self) -> &Rules {
        &self.ctx.rules
    }

    /// Most recent audit events, newest first
    pub fn recent_audits(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        Ok(self.ctx.store.get_recent_audits(limit)?)
    }

    pub fn is_healthy(&self) -> bool {
        self.ctx.store.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;
    use rollcall_store::AuditEventType;

    #[test]
    fn operations_are_audited() {
        let h = Harness::new();
        let class = h.class("CS101");
        h.student("S1");

        assert!(h.engine.is_healthy());
        assert_eq!(h.engine.rules().max_sessions_per_day, 3);

        let audits = h.engine.recent_audits(10).unwrap();
        assert_eq!(audits.len(), 3);
        assert!(matches!(
            audits[0].event,
            AuditEventType::FaceReferenceSet { .. }
        ));
        assert!(matches!(
            &audits[2].event,
            AuditEventType::ClassCreated { class_id, .. } if *class_id == class.id
        ));
    }
}
