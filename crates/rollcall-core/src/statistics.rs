//! Statistics aggregator
//!
//! Read-only reports over recorded attendance. Check-ins on soft-deleted
//! sessions are left out of every report.

use chrono::NaiveDate;
use rollcall_api::{
    AttendanceMatrix, AttendanceRecord, AttendanceStatus, EnrollmentStatus, FarCheckInReport,
    FarOccurrence, FarStudentSummary, MatrixCell, MatrixDay, MatrixRow, NoGpsCheckIn, Overview,
    StudentSummary, rate, round1,
};
use rollcall_store::{AttendanceFilter, RequestFilter};
use rollcall_util::{ClassId, DateRange, Result, StudentId};
use rollcall_verify::note_distance_meters;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::context::Context;

pub struct StatisticsAggregator {
    ctx: Arc<Context>,
}

impl StatisticsAggregator {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Session and check-in totals over `range`, with rates as percentages
    /// of all check-ins
    pub fn overview(&self, range: &DateRange, class_id: Option<&ClassId>) -> Result<Overview> {
        let total_sessions = self
            .ctx
            .store
            .list_sessions_in_range(range, class_id)?
            .len();
        let records = self.check_ins(range, class_id)?;

        let mut present_count = 0;
        let mut late_count = 0;
        let mut absent_count = 0;
        let mut far_count = 0;
        let mut no_gps_count = 0;
        for record in &records {
            match record.attendance.status {
                AttendanceStatus::Present => present_count += 1,
                AttendanceStatus::Late => late_count += 1,
                AttendanceStatus::Absent => absent_count += 1,
            }
            if self.is_far(record) {
                far_count += 1;
            }
            if record.attendance.is_missing_gps() {
                no_gps_count += 1;
            }
        }

        let total_check_ins = records.len();
        Ok(Overview {
            range: *range,
            class_id: class_id.copied(),
            total_sessions,
            total_check_ins,
            present_count,
            late_count,
            absent_count,
            far_count,
            no_gps_count,
            present_rate: rate(present_count, total_check_ins),
            late_rate: rate(late_count, total_check_ins),
            absent_rate: rate(absent_count, total_check_ins),
            far_rate: rate(far_count, total_check_ins),
        })
    }

    /// Student × day presence grid for one class.
    ///
    /// Every day of the range gets a column. A day before the student's
    /// enrollment or after today is `NoSession`; any other day shows the
    /// best outcome among that day's check-ins, or `Absent` without one.
    pub fn attendance_matrix(
        &self,
        range: &DateRange,
        class_id: &ClassId,
    ) -> Result<AttendanceMatrix> {
        self.ctx.class(class_id)?;
        let today = self.ctx.clock.today();

        let mut sessions_per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for session in self.ctx.store.list_sessions_in_range(range, Some(class_id))? {
            *sessions_per_day.entry(session.date).or_default() += 1;
        }
        let days: Vec<MatrixDay> = range
            .days()
            .map(|date| MatrixDay {
                date,
                session_count: sessions_per_day.get(&date).copied().unwrap_or(0),
            })
            .collect();

        let mut best: HashMap<(StudentId, NaiveDate), AttendanceStatus> = HashMap::new();
        for record in self.check_ins(range, Some(class_id))? {
            let key = (record.student.id, record.session.date);
            let status = record.attendance.status;
            best.entry(key)
                .and_modify(|current| {
                    if status.rank() > current.rank() {
                        *current = status;
                    }
                })
                .or_insert(status);
        }

        let enrollments = self.ctx.store.list_requests(&RequestFilter {
            class_id: Some(*class_id),
            status: Some(EnrollmentStatus::Approved),
            ..Default::default()
        })?;

        let mut rows = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            let Some(student) = self.ctx.store.get_student(&enrollment.student_id)? else {
                continue;
            };
            let enrolled_on = enrollment.enrolled_on();

            let cells: Vec<MatrixCell> = days
                .iter()
                .map(|day| {
                    if day.date < enrolled_on || day.date > today {
                        return MatrixCell::NoSession;
                    }
                    match best.get(&(student.id, day.date)) {
                        Some(AttendanceStatus::Present) => MatrixCell::Present,
                        Some(AttendanceStatus::Late) => MatrixCell::Late,
                        Some(AttendanceStatus::Absent) | None => MatrixCell::Absent,
                    }
                })
                .collect();

            rows.push(self.matrix_row(StudentSummary::from(&student), enrolled_on, cells));
        }
        rows.sort_by(|a, b| a.student.code.cmp(&b.student.code));

        debug!(
            class_id = %class_id,
            days = days.len(),
            students = rows.len(),
            "Built attendance matrix"
        );

        Ok(AttendanceMatrix {
            class_id: *class_id,
            range: *range,
            days,
            rows,
        })
    }

    /// Check-ins flagged as far from the class, grouped by student, plus
    /// check-ins that carried no coordinates at all
    pub fn far_check_in_details(
        &self,
        range: &DateRange,
        class_id: Option<&ClassId>,
    ) -> Result<FarCheckInReport> {
        let mut by_student: HashMap<StudentId, (StudentSummary, Vec<FarOccurrence>)> =
            HashMap::new();
        let mut no_gps = Vec::new();

        for record in self.check_ins(range, class_id)? {
            let Some(checked_in_at) = record.attendance.checked_in_at() else {
                continue;
            };

            if record.attendance.is_missing_gps() {
                no_gps.push(NoGpsCheckIn {
                    student: record.student.clone(),
                    session: record.session.clone(),
                    checked_in_at,
                });
            }

            if !self.is_far(&record) {
                continue;
            }
            let note = record.attendance.location_note.clone().unwrap_or_default();
            let occurrence = FarOccurrence {
                session: record.session,
                checked_in_at,
                distance_meters: note_distance_meters(&note),
                note,
            };
            by_student
                .entry(record.student.id)
                .or_insert_with(|| (record.student, Vec::new()))
                .1
                .push(occurrence);
        }

        let mut students: Vec<FarStudentSummary> = by_student
            .into_values()
            .map(|(student, occurrences)| {
                let distances: Vec<f64> = occurrences
                    .iter()
                    .filter_map(|o| o.distance_meters)
                    .collect();
                let max_distance_meters = distances.iter().copied().reduce(f64::max);
                let avg_distance_meters = (!distances.is_empty())
                    .then(|| round1(distances.iter().sum::<f64>() / distances.len() as f64));
                FarStudentSummary {
                    student,
                    count: occurrences.len(),
                    max_distance_meters,
                    avg_distance_meters,
                    occurrences,
                }
            })
            .collect();
        students.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.student.code.cmp(&b.student.code))
        });

        Ok(FarCheckInReport {
            range: *range,
            class_id: class_id.copied(),
            students,
            no_gps,
        })
    }

    fn check_ins(
        &self,
        range: &DateRange,
        class_id: Option<&ClassId>,
    ) -> Result<Vec<AttendanceRecord>> {
        Ok(self.ctx.store.list_attendance(&AttendanceFilter {
            range: Some(*range),
            class_id: class_id.copied(),
            live_sessions_only: true,
            ..Default::default()
        })?)
    }

    fn is_far(&self, record: &AttendanceRecord) -> bool {
        record
            .attendance
            .location_note
            .as_deref()
            .is_some_and(|note| self.ctx.rules.is_far_note(note))
    }

    fn matrix_row(
        &self,
        student: StudentSummary,
        enrolled_on: NaiveDate,
        cells: Vec<MatrixCell>,
    ) -> MatrixRow {
        let count = |cell: MatrixCell| cells.iter().filter(|c| **c == cell).count();
        let present_count = count(MatrixCell::Present);
        let late_count = count(MatrixCell::Late);
        let absent_count = count(MatrixCell::Absent);
        let total_days = present_count + late_count + absent_count;

        let attended = if self.ctx.rules.late_counts_as_present {
            present_count + late_count
        } else {
            present_count
        };

        MatrixRow {
            student,
            enrolled_on,
            present_count,
            late_count,
            absent_count,
            total_days,
            attendance_rate: rate(attended, total_days),
            cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{Harness, day, hm};
    use crate::CaptureRequest;
    use rollcall_api::{ClassSession, MatrixCell, Student};
    use rollcall_config::Rules;
    use rollcall_util::{ClassId, DateRange};

    async fn check_in(h: &Harness, student: &Student, session: &ClassSession, at: (u32, u32)) {
        h.set_now(session.date, hm(at.0, at.1));
        h.engine
            .attendance()
            .check_in(CaptureRequest {
                student_id: student.id,
                session_id: session.id,
                image_ref: "mock://captures/x.jpg".into(),
                latitude: Some(10.0),
                longitude: Some(106.0),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn matrix_fills_missing_days_with_absent() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        h.enroll(&student, &class);
        let first = h.session(class.id, day(10), hm(9, 0));
        h.session(class.id, day(11), hm(9, 0));
        h.session(class.id, day(12), hm(9, 0));

        check_in(&h, &student, &first, (8, 55)).await;
        h.set_now(day(12), hm(18, 0));

        let range = DateRange::new(day(10), day(12)).unwrap();
        let matrix = h.engine.statistics().attendance_matrix(&range, &class.id).unwrap();
        let row = &matrix.rows[0];
        assert_eq!(
            row.cells,
            vec![MatrixCell::Present, MatrixCell::Absent, MatrixCell::Absent]
        );
        assert_eq!(row.present_count, 1);
        assert_eq!(row.total_days, 3);
        assert_eq!(row.attendance_rate, 33.3);
        assert!(matrix.days.iter().all(|d| d.session_count == 1));
    }

    #[tokio::test]
    async fn matrix_boundaries_and_best_outcome() {
        let h = Harness::new();
        let class = h.class("CS101");
        let early = h.student("S1");
        let late_joiner = h.student("S2");
        h.enroll(&early, &class);

        let morning = h.session(class.id, day(2), hm(9, 0));
        let afternoon = h.session(class.id, day(2), hm(14, 0));

        h.set_now(day(3), hm(8, 0));
        h.enroll(&late_joiner, &class);

        check_in(&h, &early, &morning, (9, 30)).await;
        check_in(&h, &early, &afternoon, (14, 5)).await;
        h.set_now(day(3), hm(12, 0));

        let range = DateRange::new(day(1), day(4)).unwrap();
        let matrix = h.engine.statistics().attendance_matrix(&range, &class.id).unwrap();
        assert_eq!(matrix.days.len(), 4);
        assert_eq!(matrix.days[1].session_count, 2);

        let codes: Vec<_> = matrix.rows.iter().map(|r| r.student.code.as_str()).collect();
        assert_eq!(codes, vec!["S1", "S2"]);

        // Absent at 09:30, late at 14:05: late wins; today counts, tomorrow does not
        assert_eq!(
            matrix.rows[0].cells,
            vec![
                MatrixCell::Absent,
                MatrixCell::Late,
                MatrixCell::Absent,
                MatrixCell::NoSession
            ]
        );
        assert_eq!(matrix.rows[0].attendance_rate, 0.0);
        assert_eq!(
            matrix.rows[1].cells,
            vec![
                MatrixCell::NoSession,
                MatrixCell::NoSession,
                MatrixCell::Absent,
                MatrixCell::NoSession
            ]
        );
    }

    #[tokio::test]
    async fn late_can_count_as_present() {
        let h = Harness::with_rules(Rules {
            late_counts_as_present: true,
            ..Rules::default()
        });
        let class = h.class("CS101");
        let student = h.student("S1");
        h.enroll(&student, &class);
        let a = h.session(class.id, day(10), hm(9, 0));
        let b = h.session(class.id, day(11), hm(9, 0));

        check_in(&h, &student, &a, (9, 0)).await;
        check_in(&h, &student, &b, (9, 10)).await;

        let range = DateRange::new(day(10), day(11)).unwrap();
        let matrix = h.engine.statistics().attendance_matrix(&range, &class.id).unwrap();
        assert_eq!(matrix.rows[0].late_count, 1);
        assert_eq!(matrix.rows[0].attendance_rate, 100.0);
    }

    #[tokio::test]
    async fn deleted_sessions_leave_the_matrix() {
        let h = Harness::new();
        let class = h.class("CS101");
        let student = h.student("S1");
        h.enroll(&student, &class);
        let session = h.session(class.id, day(10), hm(9, 0));
        check_in(&h, &student, &session, (9, 0)).await;
        h.engine.sessions().soft_delete_session(&session.id).unwrap();

        let range = DateRange::single(day(10));
        let stats = h.engine.statistics();
        let matrix = stats.attendance_matrix(&range, &class.id).unwrap();
        assert_eq!(matrix.days[0].session_count, 0);
        assert_eq!(matrix.rows[0].cells, vec![MatrixCell::Absent]);
        assert_eq!(stats.overview(&range, None).unwrap().total_check_ins, 0);

        let err = stats.attendance_matrix(&range, &ClassId::new()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn empty_overview_has_zero_rates() {
        let h = Harness::new();
        let class = h.class("CS101");
        h.session(class.id, day(10), hm(9, 0));

        let range = DateRange::new(day(1), day(31)).unwrap();
        let overview = h.engine.statistics().overview(&range, Some(&class.id)).unwrap();
        assert_eq!(overview.total_sessions, 1);
        assert_eq!(overview.total_check_ins, 0);
        assert_eq!(overview.present_rate, 0.0);
        assert_eq!(overview.late_rate, 0.0);
        assert_eq!(overview.absent_rate, 0.0);
        assert_eq!(overview.far_rate, 0.0);
    }

    #[tokio::test]
    async fn overview_counts_outcomes() {
        let h = Harness::new();
        let class = h.class("CS101");
        let session = h.session(class.id, day(10), hm(9, 0));
        let students: Vec<_> = ["S1", "S2", "S3"].iter().map(|c| h.student(c)).collect();

        h.location.set_note(Some("Far From Class (350m)"));
        check_in(&h, &students[0], &session, (8, 50)).await;
        h.location.set_note(None);
        check_in(&h, &students[1], &session, (9, 5)).await;
        check_in(&h, &students[2], &session, (9, 30)).await;

        let overview = h
            .engine
            .statistics()
            .overview(&DateRange::single(day(10)), None)
            .unwrap();
        assert_eq!(overview.total_check_ins, 3);
        assert_eq!(
            (overview.present_count, overview.late_count, overview.absent_count),
            (1, 1, 1)
        );
        assert_eq!(overview.present_rate, 33.3);
        assert_eq!(overview.far_count, 1);
        assert_eq!(overview.far_rate, 33.3);
        assert_eq!(overview.no_gps_count, 0);
    }

    #[tokio::test]
    async fn far_report_groups_by_student() {
        let h = Harness::new();
        let class = h.class("CS101");
        let s1 = h.student("S1");
        let s2 = h.student("S2");
        let s3 = h.student("S3");
        let a = h.session(class.id, day(10), hm(9, 0));
        let b = h.session(class.id, day(11), hm(9, 0));

        h.location.set_note(Some("far from class (300m)"));
        check_in(&h, &s2, &a, (9, 0)).await;
        h.location.set_note(Some("far from class (500m)"));
        check_in(&h, &s2, &b, (9, 0)).await;
        h.location.set_note(Some("far from class"));
        check_in(&h, &s1, &a, (9, 0)).await;
        h.location.set_note(None);

        h.set_now(day(11), hm(9, 0));
        h.engine
            .attendance()
            .check_in(CaptureRequest {
                student_id: s3.id,
                session_id: b.id,
                image_ref: "mock://captures/y.jpg".into(),
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap();

        let range = DateRange::new(day(10), day(11)).unwrap();
        let report = h
            .engine
            .statistics()
            .far_check_in_details(&range, Some(&class.id))
            .unwrap();

        assert_eq!(report.students.len(), 2);
        let top = &report.students[0];
        assert_eq!(top.student.code, "S2");
        assert_eq!(top.count, 2);
        assert_eq!(top.max_distance_meters, Some(500.0));
        assert_eq!(top.avg_distance_meters, Some(400.0));

        let other = &report.students[1];
        assert_eq!(other.student.code, "S1");
        assert_eq!(other.occurrences[0].distance_meters, None);
        assert_eq!(other.avg_distance_meters, None);

        assert_eq!(report.no_gps.len(), 1);
        assert_eq!(report.no_gps[0].student.code, "S3");
    }
}
