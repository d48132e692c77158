//! End-to-end scenarios driving the full engine

use chrono::{NaiveDate, NaiveTime};
use rollcall_api::{
    AttendanceStatus, EnrollmentStatus, MatrixCell, NewClass, NewStudent, SessionDraft,
};
use rollcall_config::{Rules, parse_config};
use rollcall_core::{CaptureRequest, Collaborators, RollcallEngine};
use rollcall_store::{SqliteStore, Store};
use rollcall_util::{AdminId, DateRange, FixedClock, local_instant};
use rollcall_verify::{
    FsImageStore, GreatCircleAssessor, ImageStore, MockFaceMatcher, MockLocationAssessor,
};
use std::sync::Arc;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn engine_with(
    rules: Rules,
    store: Arc<dyn Store>,
    clock: Arc<FixedClock>,
    collaborators: Collaborators,
) -> RollcallEngine {
    RollcallEngine::new(rules, store, clock, collaborators)
}

#[tokio::test]
async fn three_day_course() {
    let clock = Arc::new(FixedClock::at(day(1), hm(8, 0)));
    let faces = Arc::new(MockFaceMatcher::with_score(0.92));
    let engine = engine_with(
        Rules::default(),
        Arc::new(SqliteStore::in_memory().unwrap()),
        clock.clone(),
        Collaborators {
            face_matcher: faces.clone(),
            location: Arc::new(MockLocationAssessor::new()),
        },
    );

    let class = engine
        .catalog()
        .create_class(NewClass {
            code: "SAFE-01".into(),
            name: "Workplace safety".into(),
            ..Default::default()
        })
        .unwrap();
    let student = engine
        .catalog()
        .add_student(NewStudent {
            code: "ST-001".into(),
            full_name: "Le Thi Minh".into(),
            email: Some("minh@example.org".into()),
        })
        .unwrap();
    engine
        .catalog()
        .set_face_reference(&student.id, "mock://faces/st-001.jpg")
        .unwrap();

    let request = engine
        .enrollment()
        .create_request(&student.id, &class.id)
        .unwrap();
    engine
        .enrollment()
        .review(
            &request.id,
            &AdminId::new("coordinator"),
            EnrollmentStatus::Approved,
            None,
        )
        .unwrap();

    let sessions: Vec<_> = [2, 3, 4]
        .into_iter()
        .map(|d| {
            engine
                .sessions()
                .create_session(SessionDraft {
                    class_id: class.id,
                    date: day(d),
                    name: format!("Day {}", d - 1),
                    start_time: hm(9, 0),
                    end_time: hm(11, 0),
                })
                .unwrap()
        })
        .collect();

    for session in &sessions {
        engine
            .registration()
            .register(&student.id, &session.id)
            .unwrap();
    }

    // Day 1 on time, day 2 missed, day 3 ten minutes late
    let capture = |session_id| CaptureRequest {
        student_id: student.id,
        session_id,
        image_ref: "mock://captures/st-001.jpg".into(),
        latitude: Some(10.7769),
        longitude: Some(106.7009),
    };

    clock.set(local_instant(day(2), hm(8, 58)));
    let first = engine.attendance().check_in(capture(sessions[0].id)).await.unwrap();
    assert_eq!(first.status, AttendanceStatus::Present);
    clock.set(local_instant(day(2), hm(11, 2)));
    engine.attendance().check_out(capture(sessions[0].id)).await.unwrap();

    clock.set(local_instant(day(4), hm(9, 10)));
    let third = engine.attendance().check_in(capture(sessions[2].id)).await.unwrap();
    assert_eq!(third.status, AttendanceStatus::Late);

    clock.set(local_instant(day(4), hm(17, 0)));
    let range = DateRange::new(day(2), day(4)).unwrap();
    let matrix = engine
        .statistics()
        .attendance_matrix(&range, &class.id)
        .unwrap();

    assert_eq!(matrix.rows.len(), 1);
    let row = &matrix.rows[0];
    assert_eq!(
        row.cells,
        vec![MatrixCell::Present, MatrixCell::Absent, MatrixCell::Late]
    );
    assert_eq!(row.present_count, 1);
    assert_eq!(row.total_days, 3);
    assert_eq!(row.attendance_rate, 33.3);

    let overview = engine.statistics().overview(&range, Some(&class.id)).unwrap();
    assert_eq!(overview.total_sessions, 3);
    assert_eq!(overview.total_check_ins, 2);
    assert_eq!(overview.present_rate, 50.0);
    assert_eq!(overview.late_rate, 50.0);

    let history = engine.attendance().get_my_history(&student.id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].session.id, sessions[2].id);
    assert!(history[1].attendance.is_checked_out());

    assert_eq!(faces.calls().len(), 3);
}

#[tokio::test]
async fn configured_engine_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = parse_config(&format!(
        r#"
        config_version = 1

        [service]
        data_dir = "{}"

        [rules]
        far_radius_meters = 100.0

        [[classes]]
        code = "GEO-1"
        name = "Field survey"
        latitude = 10.0
        longitude = 106.0
        "#,
        dir.path().display()
    ))
    .unwrap();

    let clock = Arc::new(FixedClock::at(day(1), hm(8, 0)));
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(rollcall_util::database_path(&config.service.data_dir)).unwrap(),
    );
    let engine = engine_with(
        config.rules.clone(),
        store,
        clock.clone(),
        Collaborators {
            face_matcher: Arc::new(MockFaceMatcher::default()),
            location: Arc::new(GreatCircleAssessor::new(
                config.rules.far_radius_meters,
                config.rules.far_note_marker.clone(),
            )),
        },
    );

    assert_eq!(engine.catalog().seed_classes(&config.classes).unwrap(), 1);
    let class = engine.catalog().list_classes().unwrap().remove(0);

    let images = FsImageStore::new(&config.service.image_dir);
    let face_ref = images.store(b"reference", "jpg").await.unwrap();
    let capture_ref = images.store(b"capture", "jpg").await.unwrap();
    assert!(face_ref.starts_with("file://"));

    let student = engine
        .catalog()
        .add_student(NewStudent {
            code: "ST-9".into(),
            full_name: "Tran Van B".into(),
            email: None,
        })
        .unwrap();
    engine.catalog().set_face_reference(&student.id, &face_ref).unwrap();

    let session = engine
        .sessions()
        .create_session(SessionDraft {
            class_id: class.id,
            date: day(5),
            name: "Survey".into(),
            start_time: hm(7, 30),
            end_time: hm(9, 30),
        })
        .unwrap();

    // Roughly 0.005 degrees of latitude, well beyond 100m
    clock.set(local_instant(day(5), hm(7, 25)));
    let attendance = engine
        .attendance()
        .check_in(CaptureRequest {
            student_id: student.id,
            session_id: session.id,
            image_ref: capture_ref,
            latitude: Some(10.005),
            longitude: Some(106.0),
        })
        .await
        .unwrap();
    let note = attendance.location_note.clone().unwrap();
    assert!(note.starts_with("far from class ("), "{}", note);

    let report = engine
        .statistics()
        .far_check_in_details(&DateRange::single(day(5)), None)
        .unwrap();
    assert_eq!(report.students.len(), 1);
    let distance = report.students[0].max_distance_meters.unwrap();
    assert!((500.0..600.0).contains(&distance), "{}", distance);

    // Reopening the database sees the same records
    drop(engine);
    let reopened = SqliteStore::open(rollcall_util::database_path(&config.service.data_dir))
        .unwrap();
    assert!(reopened.is_healthy());
    assert_eq!(
        reopened
            .get_attendance(&student.id, &session.id)
            .unwrap()
            .unwrap(),
        attendance
    );
}
