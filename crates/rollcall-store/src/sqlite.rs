//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rollcall_api::{
    Attendance, AttendanceRecord, Capture, ClassSession, EnrollmentRequest, EnrollmentStatus,
    GeoPoint, HistoryEntry, SessionRegistration, SessionSummary, Student, StudentSummary,
    TrainingClass,
};
use rollcall_util::{ClassId, DateRange, RequestId, SessionId, StudentId, format_date};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    AttendanceFilter, AuditEvent, CheckInWrite, RequestFilter, ReviewUpdate, Store, StoreError,
    StoreResult,
};

const CLASS_COLUMNS: &[&str] = &[
    "id",
    "code",
    "name",
    "class_type",
    "location",
    "latitude",
    "longitude",
    "academic_year",
    "created_at",
];

const STUDENT_COLUMNS: &[&str] = &["id", "code", "full_name", "email", "face_ref", "created_at"];

const SESSION_COLUMNS: &[&str] = &[
    "id",
    "class_id",
    "date",
    "name",
    "start_time",
    "end_time",
    "registration_deadline",
    "is_deleted",
    "created_at",
];

const REQUEST_COLUMNS: &[&str] = &[
    "id",
    "student_id",
    "class_id",
    "status",
    "requested_at",
    "reviewed_by",
    "reviewed_at",
    "reject_reason",
];

const REGISTRATION_COLUMNS: &[&str] =
    &["id", "student_id", "session_id", "session_date", "registered_at"];

const ATTENDANCE_COLUMNS: &[&str] = &[
    "id",
    "student_id",
    "session_id",
    "check_in_at",
    "check_in_lat",
    "check_in_lng",
    "check_in_score",
    "check_in_image",
    "check_out_at",
    "check_out_lat",
    "check_out_lng",
    "check_out_score",
    "check_out_image",
    "status",
    "location_note",
];

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS classes (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                class_type TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                latitude REAL,
                longitude REAL,
                academic_year TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                email TEXT,
                face_ref TEXT,
                created_at TEXT NOT NULL
            );

            -- Sessions are never hard-deleted
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                class_id TEXT NOT NULL REFERENCES classes(id),
                date TEXT NOT NULL,
                name TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                registration_deadline TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS enrollment_requests (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL REFERENCES students(id),
                class_id TEXT NOT NULL REFERENCES classes(id),
                status TEXT NOT NULL,
                requested_at TEXT NOT NULL,
                reviewed_by TEXT,
                reviewed_at TEXT,
                reject_reason TEXT
            );

            CREATE TABLE IF NOT EXISTS registrations (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL REFERENCES students(id),
                session_id TEXT NOT NULL REFERENCES sessions(id),
                session_date TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                UNIQUE (student_id, session_id),
                UNIQUE (student_id, session_date)
            );

            CREATE TABLE IF NOT EXISTS attendance (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL REFERENCES students(id),
                session_id TEXT NOT NULL REFERENCES sessions(id),
                check_in_at TEXT,
                check_in_lat REAL,
                check_in_lng REAL,
                check_in_score REAL,
                check_in_image TEXT,
                check_out_at TEXT,
                check_out_lat REAL,
                check_out_lng REAL,
                check_out_score REAL,
                check_out_image TEXT,
                status TEXT NOT NULL,
                location_note TEXT,
                UNIQUE (student_id, session_id)
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- At most one live request per (student, class)
            CREATE UNIQUE INDEX IF NOT EXISTS idx_enrollment_active
                ON enrollment_requests(student_id, class_id)
                WHERE status IN ('pending', 'approved');

            CREATE INDEX IF NOT EXISTS idx_sessions_class_date ON sessions(class_id, date);
            CREATE INDEX IF NOT EXISTS idx_sessions_date ON sessions(date);
            CREATE INDEX IF NOT EXISTS idx_enrollment_status ON enrollment_requests(status);
            CREATE INDEX IF NOT EXISTS idx_attendance_session ON attendance(session_id);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn insert_class(&self, class: &TrainingClass) -> StoreResult<()> {
        let conn = self.conn()?;
        let (lat, lng) = split_point(class.reference_point);

        conn.execute(
            r#"
            INSERT INTO classes (id, code, name, class_type, location, latitude, longitude,
                                 academic_year, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                class.id.to_string(),
                class.code,
                class.name,
                class.class_type,
                class.location,
                lat,
                lng,
                class.academic_year,
                instant_text(class.created_at),
            ],
        )?;

        debug!(class_id = %class.id, code = %class.code, "Class inserted");
        Ok(())
    }

    fn update_class(&self, class: &TrainingClass) -> StoreResult<bool> {
        let conn = self.conn()?;
        let (lat, lng) = split_point(class.reference_point);

        let changed = conn.execute(
            r#"
            UPDATE classes
            SET name = ?2, class_type = ?3, location = ?4, latitude = ?5, longitude = ?6,
                academic_year = ?7
            WHERE id = ?1
            "#,
            params![
                class.id.to_string(),
                class.name,
                class.class_type,
                class.location,
                lat,
                lng,
                class.academic_year,
            ],
        )?;

        Ok(changed == 1)
    }

    fn delete_class(&self, id: &ClassId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM classes WHERE id = ?", [id.to_string()])?;
        Ok(changed == 1)
    }

    fn get_class(&self, id: &ClassId) -> StoreResult<Option<TrainingClass>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM classes WHERE id = ?", columns("", CLASS_COLUMNS));

        let class = conn
            .query_row(&sql, [id.to_string()], |row| class_from_row(row, 0))
            .optional()?;
        Ok(class)
    }

    fn get_class_by_code(&self, code: &str) -> StoreResult<Option<TrainingClass>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM classes WHERE code = ?", columns("", CLASS_COLUMNS));

        let class = conn
            .query_row(&sql, [code], |row| class_from_row(row, 0))
            .optional()?;
        Ok(class)
    }

    fn list_classes(&self) -> StoreResult<Vec<TrainingClass>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM classes ORDER BY code", columns("", CLASS_COLUMNS));

        let mut stmt = conn.prepare(&sql)?;
        let classes = stmt
            .query_map([], |row| class_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    fn insert_student(&self, student: &Student) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO students (id, code, full_name, email, face_ref, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                student.id.to_string(),
                student.code,
                student.full_name,
                student.email,
                student.face_ref,
                instant_text(student.created_at),
            ],
        )?;

        debug!(student_id = %student.id, code = %student.code, "Student inserted");
        Ok(())
    }

    fn set_face_ref(&self, id: &StudentId, face_ref: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE students SET face_ref = ?2 WHERE id = ?1",
            params![id.to_string(), face_ref],
        )?;
        Ok(changed == 1)
    }

    fn get_student(&self, id: &StudentId) -> StoreResult<Option<Student>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM students WHERE id = ?", columns("", STUDENT_COLUMNS));

        let student = conn
            .query_row(&sql, [id.to_string()], |row| student_from_row(row, 0))
            .optional()?;
        Ok(student)
    }

    fn list_students(&self) -> StoreResult<Vec<Student>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM students ORDER BY code", columns("", STUDENT_COLUMNS));

        let mut stmt = conn.prepare(&sql)?;
        let students = stmt
            .query_map([], |row| student_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    fn insert_session_capped(
        &self,
        session: &ClassSession,
        max_per_day: usize,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;

        let changed = conn.execute(
            r#"
            INSERT INTO sessions (id, class_id, date, name, start_time, end_time,
                                  registration_deadline, is_deleted, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8
            WHERE (
                SELECT COUNT(*) FROM sessions
                WHERE class_id = ?2 AND date = ?3 AND is_deleted = 0
            ) < ?9
            "#,
            params![
                session.id.to_string(),
                session.class_id.to_string(),
                format_date(session.date),
                session.name,
                time_text(session.start_time),
                time_text(session.end_time),
                instant_text(session.registration_deadline),
                instant_text(session.created_at),
                max_per_day as i64,
            ],
        )?;

        debug!(session_id = %session.id, inserted = changed == 1, "Capped session insert");
        Ok(changed == 1)
    }

    fn update_session(&self, session: &ClassSession) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            r#"
            UPDATE sessions
            SET class_id = ?2, date = ?3, name = ?4, start_time = ?5, end_time = ?6,
                registration_deadline = ?7
            WHERE id = ?1 AND is_deleted = 0
            "#,
            params![
                session.id.to_string(),
                session.class_id.to_string(),
                format_date(session.date),
                session.name,
                time_text(session.start_time),
                time_text(session.end_time),
                instant_text(session.registration_deadline),
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        // UNIQUE (student_id, session_date) refuses a move that doubles up a day
        let moved = tx.execute(
            "UPDATE registrations SET session_date = ?2 WHERE session_id = ?1 AND session_date <> ?2",
            params![session.id.to_string(), format_date(session.date)],
        )?;
        tx.commit()?;

        debug!(session_id = %session.id, registrations_moved = moved, "Session updated");
        Ok(true)
    }

    fn soft_delete_session(&self, id: &SessionId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sessions SET is_deleted = 1 WHERE id = ? AND is_deleted = 0",
            [id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<ClassSession>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM sessions WHERE id = ?", columns("", SESSION_COLUMNS));

        let session = conn
            .query_row(&sql, [id.to_string()], |row| session_from_row(row, 0))
            .optional()?;
        Ok(session)
    }

    fn list_sessions_by_date(
        &self,
        date: NaiveDate,
        class_ids: &[ClassId],
    ) -> StoreResult<Vec<ClassSession>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM sessions WHERE is_deleted = 0 AND date = ?",
            columns("", SESSION_COLUMNS)
        );
        let mut args = vec![format_date(date)];
        if !class_ids.is_empty() {
            let placeholders = vec!["?"; class_ids.len()].join(", ");
            sql.push_str(&format!(" AND class_id IN ({})", placeholders));
            args.extend(class_ids.iter().map(|id| id.to_string()));
        }
        sql.push_str(" ORDER BY start_time, name, id");

        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(params_from_iter(args.iter()), |row| session_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn list_sessions_in_range(
        &self,
        range: &DateRange,
        class_id: Option<&ClassId>,
    ) -> StoreResult<Vec<ClassSession>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM sessions WHERE is_deleted = 0 AND date >= ? AND date <= ?",
            columns("", SESSION_COLUMNS)
        );
        let mut args = vec![format_date(range.start), format_date(range.end)];
        if let Some(class_id) = class_id {
            sql.push_str(" AND class_id = ?");
            args.push(class_id.to_string());
        }
        sql.push_str(" ORDER BY date, start_time, name, id");

        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(params_from_iter(args.iter()), |row| session_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn count_class_dependents(&self, id: &ClassId) -> StoreResult<usize> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            r#"
            SELECT (SELECT COUNT(*) FROM sessions WHERE class_id = ?1)
                 + (SELECT COUNT(*) FROM enrollment_requests WHERE class_id = ?1)
            "#,
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert_request(&self, request: &EnrollmentRequest) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO enrollment_requests (id, student_id, class_id, status, requested_at,
                                             reviewed_by, reviewed_at, reject_reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                request.id.to_string(),
                request.student_id.to_string(),
                request.class_id.to_string(),
                request.status.as_str(),
                instant_text(request.requested_at),
                request.reviewed_by.as_ref().map(|r| r.as_str().to_string()),
                request.reviewed_at.map(instant_text),
                request.reject_reason,
            ],
        )?;

        debug!(request_id = %request.id, "Enrollment request inserted");
        Ok(())
    }

    fn get_request(&self, id: &RequestId) -> StoreResult<Option<EnrollmentRequest>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM enrollment_requests WHERE id = ?",
            columns("", REQUEST_COLUMNS)
        );

        let request = conn
            .query_row(&sql, [id.to_string()], |row| request_from_row(row, 0))
            .optional()?;
        Ok(request)
    }

    fn find_active_request(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
    ) -> StoreResult<Option<EnrollmentRequest>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM enrollment_requests
             WHERE student_id = ? AND class_id = ? AND status IN ('pending', 'approved')",
            columns("", REQUEST_COLUMNS)
        );

        let request = conn
            .query_row(
                &sql,
                params![student_id.to_string(), class_id.to_string()],
                |row| request_from_row(row, 0),
            )
            .optional()?;
        Ok(request)
    }

    fn review_request(&self, review: &ReviewUpdate) -> StoreResult<bool> {
        let conn = self.conn()?;

        let changed = conn.execute(
            r#"
            UPDATE enrollment_requests
            SET status = ?2, reviewed_by = ?3, reviewed_at = ?4, reject_reason = ?5
            WHERE id = ?1 AND status = 'pending'
            "#,
            params![
                review.request_id.to_string(),
                review.decision.as_str(),
                review.reviewer.as_str(),
                instant_text(review.reviewed_at),
                review.reject_reason,
            ],
        )?;

        debug!(request_id = %review.request_id, applied = changed == 1, "Review update");
        Ok(changed == 1)
    }

    fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<EnrollmentRequest>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM enrollment_requests WHERE 1 = 1",
            columns("", REQUEST_COLUMNS)
        );
        let mut args: Vec<String> = Vec::new();
        if let Some(student_id) = &filter.student_id {
            sql.push_str(" AND student_id = ?");
            args.push(student_id.to_string());
        }
        if let Some(class_id) = &filter.class_id {
            sql.push_str(" AND class_id = ?");
            args.push(class_id.to_string());
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        sql.push_str(" ORDER BY requested_at DESC, id DESC");

        let mut stmt = conn.prepare(&sql)?;
        let requests = stmt
            .query_map(params_from_iter(args.iter()), |row| request_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    fn count_pending_by_class(&self) -> StoreResult<Vec<(ClassId, usize)>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT class_id, COUNT(*) FROM enrollment_requests
            WHERE status = 'pending'
            GROUP BY class_id
            ORDER BY class_id
            "#,
        )?;
        let counts = stmt
            .query_map([], |row| {
                let class_id: ClassId = parse_at(row, 0)?;
                let count: i64 = row.get(1)?;
                Ok((class_id, count as usize))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    fn insert_registration(&self, registration: &SessionRegistration) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO registrations (id, student_id, session_id, session_date, registered_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                registration.id.to_string(),
                registration.student_id.to_string(),
                registration.session_id.to_string(),
                format_date(registration.session_date),
                instant_text(registration.registered_at),
            ],
        )?;

        debug!(registration_id = %registration.id, "Registration inserted");
        Ok(())
    }

    fn find_registration(
        &self,
        student_id: &StudentId,
        session_id: &SessionId,
    ) -> StoreResult<Option<SessionRegistration>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM registrations WHERE student_id = ? AND session_id = ?",
            columns("", REGISTRATION_COLUMNS)
        );

        let registration = conn
            .query_row(
                &sql,
                params![student_id.to_string(), session_id.to_string()],
                |row| registration_from_row(row, 0),
            )
            .optional()?;
        Ok(registration)
    }

    fn find_registration_on_date(
        &self,
        student_id: &StudentId,
        date: NaiveDate,
    ) -> StoreResult<Option<SessionRegistration>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM registrations r
             JOIN sessions s ON s.id = r.session_id
             WHERE r.student_id = ? AND s.date = ?",
            columns("r", REGISTRATION_COLUMNS)
        );

        let registration = conn
            .query_row(
                &sql,
                params![student_id.to_string(), format_date(date)],
                |row| registration_from_row(row, 0),
            )
            .optional()?;
        Ok(registration)
    }

    fn list_registrations_for_student(
        &self,
        student_id: &StudentId,
    ) -> StoreResult<Vec<SessionRegistration>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM registrations WHERE student_id = ?
             ORDER BY session_date DESC, registered_at DESC",
            columns("", REGISTRATION_COLUMNS)
        );

        let mut stmt = conn.prepare(&sql)?;
        let registrations = stmt
            .query_map([student_id.to_string()], |row| registration_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(registrations)
    }

    fn list_registrations_for_session(
        &self,
        session_id: &SessionId,
    ) -> StoreResult<Vec<SessionRegistration>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM registrations WHERE session_id = ? ORDER BY registered_at, id",
            columns("", REGISTRATION_COLUMNS)
        );

        let mut stmt = conn.prepare(&sql)?;
        let registrations = stmt
            .query_map([session_id.to_string()], |row| registration_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(registrations)
    }

    fn upsert_check_in(&self, attendance: &Attendance) -> StoreResult<CheckInWrite> {
        let conn = self.conn()?;
        let capture = attendance
            .check_in
            .as_ref()
            .ok_or_else(|| StoreError::Database("check-in write without a capture".into()))?;
        let (lat, lng) = split_point(capture.location);

        let changed = conn.execute(
            r#"
            INSERT INTO attendance (id, student_id, session_id, check_in_at, check_in_lat,
                                    check_in_lng, check_in_score, check_in_image, status,
                                    location_note)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(student_id, session_id) DO UPDATE SET
                check_in_at = excluded.check_in_at,
                check_in_lat = excluded.check_in_lat,
                check_in_lng = excluded.check_in_lng,
                check_in_score = excluded.check_in_score,
                check_in_image = excluded.check_in_image,
                status = excluded.status,
                location_note = excluded.location_note
            WHERE attendance.check_out_at IS NULL
            "#,
            params![
                attendance.id.to_string(),
                attendance.student_id.to_string(),
                attendance.session_id.to_string(),
                instant_text(capture.at),
                lat,
                lng,
                capture.face_score,
                capture.image_ref,
                attendance.status.as_str(),
                attendance.location_note,
            ],
        )?;

        if changed == 0 {
            debug!(
                student_id = %attendance.student_id,
                session_id = %attendance.session_id,
                "Check-in refused on checked-out row"
            );
            return Ok(CheckInWrite::AlreadyCheckedOut);
        }

        let stored = query_attendance(&conn, &attendance.student_id, &attendance.session_id)?
            .ok_or_else(|| StoreError::NotFound("attendance row vanished after write".into()))?;

        if stored.id == attendance.id {
            debug!(attendance_id = %stored.id, "Attendance row created");
            Ok(CheckInWrite::Created(stored))
        } else {
            debug!(attendance_id = %stored.id, "Attendance check-in replaced");
            Ok(CheckInWrite::Replaced(stored))
        }
    }

    fn record_check_out(
        &self,
        student_id: &StudentId,
        session_id: &SessionId,
        capture: &Capture,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let (lat, lng) = split_point(capture.location);

        let changed = conn.execute(
            r#"
            UPDATE attendance
            SET check_out_at = ?3, check_out_lat = ?4, check_out_lng = ?5,
                check_out_score = ?6, check_out_image = ?7
            WHERE student_id = ?1 AND session_id = ?2
              AND check_in_at IS NOT NULL AND check_out_at IS NULL
            "#,
            params![
                student_id.to_string(),
                session_id.to_string(),
                instant_text(capture.at),
                lat,
                lng,
                capture.face_score,
                capture.image_ref,
            ],
        )?;

        Ok(changed == 1)
    }

    fn get_attendance(
        &self,
        student_id: &StudentId,
        session_id: &SessionId,
    ) -> StoreResult<Option<Attendance>> {
        let conn = self.conn()?;
        query_attendance(&conn, student_id, session_id)
    }

    fn list_attendance(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {}, st.id, st.code, st.full_name, {}
             FROM attendance a
             JOIN students st ON st.id = a.student_id
             JOIN sessions s ON s.id = a.session_id
             WHERE a.check_in_at IS NOT NULL",
            columns("a", ATTENDANCE_COLUMNS),
            columns("s", SESSION_COLUMNS)
        );
        let mut args: Vec<String> = Vec::new();
        if let Some(range) = &filter.range {
            sql.push_str(" AND s.date >= ? AND s.date <= ?");
            args.push(format_date(range.start));
            args.push(format_date(range.end));
        }
        if let Some(session_id) = &filter.session_id {
            sql.push_str(" AND a.session_id = ?");
            args.push(session_id.to_string());
        }
        if let Some(class_id) = &filter.class_id {
            sql.push_str(" AND s.class_id = ?");
            args.push(class_id.to_string());
        }
        if let Some(student_id) = &filter.student_id {
            sql.push_str(" AND a.student_id = ?");
            args.push(student_id.to_string());
        }
        if filter.live_sessions_only {
            sql.push_str(" AND s.is_deleted = 0");
        }
        sql.push_str(" ORDER BY a.check_in_at DESC, a.id");

        let student_base = ATTENDANCE_COLUMNS.len();
        let session_base = student_base + 3;

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                let attendance = attendance_from_row(row, 0)?;
                let student = StudentSummary {
                    id: parse_at(row, student_base)?,
                    code: row.get(student_base + 1)?,
                    full_name: row.get(student_base + 2)?,
                };
                let session = session_from_row(row, session_base)?;
                Ok(AttendanceRecord {
                    attendance,
                    student,
                    session: SessionSummary::from(&session),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn list_history(&self, student_id: &StudentId) -> StoreResult<Vec<HistoryEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {}, {}
             FROM attendance a
             JOIN sessions s ON s.id = a.session_id
             WHERE a.student_id = ? AND a.check_in_at IS NOT NULL
             ORDER BY a.check_in_at DESC, a.id",
            columns("a", ATTENDANCE_COLUMNS),
            columns("s", SESSION_COLUMNS)
        );
        let session_base = ATTENDANCE_COLUMNS.len();

        let mut stmt = conn.prepare(&sql)?;
        let history = stmt
            .query_map([student_id.to_string()], |row| {
                Ok(HistoryEntry {
                    attendance: attendance_from_row(row, 0)?,
                    session: session_from_row(row, session_base)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(history)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![instant_text(event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| rollcall_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

fn query_attendance(
    conn: &Connection,
    student_id: &StudentId,
    session_id: &SessionId,
) -> StoreResult<Option<Attendance>> {
    let sql = format!(
        "SELECT {} FROM attendance WHERE student_id = ? AND session_id = ?",
        columns("", ATTENDANCE_COLUMNS)
    );

    let attendance = conn
        .query_row(
            &sql,
            params![student_id.to_string(), session_id.to_string()],
            |row| attendance_from_row(row, 0),
        )
        .optional()?;
    Ok(attendance)
}

/// Comma-separated column list, optionally qualified by a table alias
fn columns(alias: &str, names: &[&str]) -> String {
    names
        .iter()
        .map(|name| {
            if alias.is_empty() {
                (*name).to_string()
            } else {
                format!("{}.{}", alias, name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn split_point(point: Option<GeoPoint>) -> (Option<f64>, Option<f64>) {
    match point {
        Some(p) => (Some(p.latitude), Some(p.longitude)),
        None => (None, None),
    }
}

/// Fixed-width UTC text, so `ORDER BY` on the column is chronological
fn instant_text(at: DateTime<Local>) -> String {
    at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn time_text(time: NaiveTime) -> String {
    rollcall_util::format_time_of_day(time)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn instant_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_instant_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Local>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Local))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    rollcall_util::parse_date(&raw).map_err(|e| conversion_error(idx, e))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    rollcall_util::parse_time_of_day(&raw).map_err(|e| conversion_error(idx, e))
}

fn point_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<GeoPoint>> {
    Ok(GeoPoint::from_parts(row.get(idx)?, row.get(idx + 1)?))
}

fn class_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<TrainingClass> {
    Ok(TrainingClass {
        id: parse_at(row, base)?,
        code: row.get(base + 1)?,
        name: row.get(base + 2)?,
        class_type: row.get(base + 3)?,
        location: row.get(base + 4)?,
        reference_point: point_at(row, base + 5)?,
        academic_year: row.get(base + 7)?,
        created_at: instant_at(row, base + 8)?,
    })
}

fn student_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Student> {
    Ok(Student {
        id: parse_at(row, base)?,
        code: row.get(base + 1)?,
        full_name: row.get(base + 2)?,
        email: row.get(base + 3)?,
        face_ref: row.get(base + 4)?,
        created_at: instant_at(row, base + 5)?,
    })
}

fn session_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<ClassSession> {
    Ok(ClassSession {
        id: parse_at(row, base)?,
        class_id: parse_at(row, base + 1)?,
        date: date_at(row, base + 2)?,
        name: row.get(base + 3)?,
        start_time: time_at(row, base + 4)?,
        end_time: time_at(row, base + 5)?,
        registration_deadline: instant_at(row, base + 6)?,
        is_deleted: row.get(base + 7)?,
        created_at: instant_at(row, base + 8)?,
    })
}

fn request_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<EnrollmentRequest> {
    let status: EnrollmentStatus = parse_at(row, base + 3)?;
    let reviewed_by: Option<String> = row.get(base + 5)?;

    Ok(EnrollmentRequest {
        id: parse_at(row, base)?,
        student_id: parse_at(row, base + 1)?,
        class_id: parse_at(row, base + 2)?,
        status,
        requested_at: instant_at(row, base + 4)?,
        reviewed_by: reviewed_by.map(Into::into),
        reviewed_at: opt_instant_at(row, base + 6)?,
        reject_reason: row.get(base + 7)?,
    })
}

fn registration_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<SessionRegistration> {
    Ok(SessionRegistration {
        id: parse_at(row, base)?,
        student_id: parse_at(row, base + 1)?,
        session_id: parse_at(row, base + 2)?,
        session_date: date_at(row, base + 3)?,
        registered_at: instant_at(row, base + 4)?,
    })
}

/// Capture columns laid out as at, lat, lng, score, image
fn capture_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Option<Capture>> {
    let Some(at) = opt_instant_at(row, base)? else {
        return Ok(None);
    };
    let score: Option<f64> = row.get(base + 3)?;
    let image_ref: Option<String> = row.get(base + 4)?;

    Ok(Some(Capture {
        at,
        location: point_at(row, base + 1)?,
        face_score: score.unwrap_or_default(),
        image_ref: image_ref.unwrap_or_default(),
    }))
}

fn attendance_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Attendance> {
    Ok(Attendance {
        id: parse_at(row, base)?,
        student_id: parse_at(row, base + 1)?,
        session_id: parse_at(row, base + 2)?,
        check_in: capture_at(row, base + 3)?,
        check_out: capture_at(row, base + 8)?,
        status: parse_at(row, base + 13)?,
        location_note: row.get(base + 14)?,
    })
}
