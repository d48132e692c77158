//! Shared types for the rollcall engine

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use rollcall_util::{
    AdminId, AttendanceId, ClassId, RegistrationId, RequestId, SessionId, StudentId,
    local_instant,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serde adapter writing times of day as `HH:MM`
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&rollcall_util::format_time_of_day(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        rollcall_util::parse_time_of_day(&raw).map_err(serde::de::Error::custom)
    }
}

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// A point only exists when both halves were captured
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self { latitude, longitude }),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A training class students enroll into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingClass {
    pub id: ClassId,
    /// Stable, unique and immutable
    pub code: String,
    pub name: String,
    pub class_type: String,
    pub location: String,
    /// Where check-ins are expected to happen
    pub reference_point: Option<GeoPoint>,
    pub academic_year: String,
    pub created_at: DateTime<Local>,
}

/// Fields for a new class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewClass {
    pub code: String,
    pub name: String,
    pub class_type: String,
    pub location: String,
    pub reference_point: Option<GeoPoint>,
    pub academic_year: String,
}

/// Partial update of a class's descriptive fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassUpdate {
    pub name: Option<String>,
    pub class_type: Option<String>,
    pub location: Option<String>,
    pub reference_point: Option<GeoPoint>,
    pub academic_year: Option<String>,
}

/// A student known to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub code: String,
    pub full_name: String,
    pub email: Option<String>,
    /// Reference image used for face verification
    pub face_ref: Option<String>,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStudent {
    pub code: String,
    pub full_name: String,
    pub email: Option<String>,
}

/// One scheduled teaching slot of a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: SessionId,
    pub class_id: ClassId,
    pub date: NaiveDate,
    pub name: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    /// Last instant at which students may register
    pub registration_deadline: DateTime<Local>,
    pub is_deleted: bool,
    pub created_at: DateTime<Local>,
}

impl ClassSession {
    pub fn start_instant(&self) -> DateTime<Local> {
        local_instant(self.date, self.start_time)
    }
}

/// Caller-supplied fields of a session, for create and update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDraft {
    pub class_id: ClassId,
    pub date: NaiveDate,
    pub name: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

/// Enrollment request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Rejected,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Pending and approved requests block a new request for the same class
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown enrollment status: {}", s)),
        }
    }
}

/// A student's request to join a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub id: RequestId,
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub status: EnrollmentStatus,
    pub requested_at: DateTime<Local>,
    pub reviewed_by: Option<AdminId>,
    pub reviewed_at: Option<DateTime<Local>>,
    pub reject_reason: Option<String>,
}

impl EnrollmentRequest {
    /// Day from which the student counts as enrolled
    pub fn enrolled_on(&self) -> NaiveDate {
        self.reviewed_at
            .unwrap_or(self.requested_at)
            .date_naive()
    }
}

/// A student's commitment to attend one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRegistration {
    pub id: RegistrationId,
    pub student_id: StudentId,
    pub session_id: SessionId,
    pub session_date: NaiveDate,
    pub registered_at: DateTime<Local>,
}

/// Recorded presence outcome of a check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
        }
    }

    /// Ordering used when several check-ins compete: present beats late beats absent
    pub fn rank(&self) -> u8 {
        match self {
            Self::Present => 2,
            Self::Late => 1,
            Self::Absent => 0,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "late" => Ok(Self::Late),
            "absent" => Ok(Self::Absent),
            _ => Err(format!("Unknown attendance status: {}", s)),
        }
    }
}

/// One verified capture (check-in or check-out)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub at: DateTime<Local>,
    pub location: Option<GeoPoint>,
    pub face_score: f64,
    pub image_ref: String,
}

/// Attendance of one student at one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: AttendanceId,
    pub student_id: StudentId,
    pub session_id: SessionId,
    pub check_in: Option<Capture>,
    pub check_out: Option<Capture>,
    pub status: AttendanceStatus,
    /// Free-text note from the location assessment, e.g. "far from class (523m)"
    pub location_note: Option<String>,
}

impl Attendance {
    pub fn checked_in_at(&self) -> Option<DateTime<Local>> {
        self.check_in.as_ref().map(|c| c.at)
    }

    pub fn is_checked_out(&self) -> bool {
        self.check_out.is_some()
    }

    /// Checked in without any captured coordinates
    pub fn is_missing_gps(&self) -> bool {
        self.check_in
            .as_ref()
            .is_some_and(|c| c.location.is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub id: StudentId,
    pub code: String,
    pub full_name: String,
}

impl From<&Student> for StudentSummary {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id,
            code: s.code.clone(),
            full_name: s.full_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub class_id: ClassId,
    pub name: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

impl From<&ClassSession> for SessionSummary {
    fn from(s: &ClassSession) -> Self {
        Self {
            id: s.id,
            class_id: s.class_id,
            name: s.name.clone(),
            date: s.date,
            start_time: s.start_time,
            end_time: s.end_time,
        }
    }
}

/// Attendance row joined with who and which session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub attendance: Attendance,
    pub student: StudentSummary,
    pub session: SessionSummary,
}

/// A student's own attendance row with the full session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub attendance: Attendance,
    pub session: ClassSession,
}
