//! Statistics report types

use chrono::{DateTime, Local, NaiveDate};
use rollcall_util::{ClassId, DateRange};
use serde::{Deserialize, Serialize};

use crate::{SessionSummary, StudentSummary};

/// Percentage of `part` in `total`, one decimal, 0 when `total` is 0
pub fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(part as f64 * 100.0 / total as f64)
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Totals and rates over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub range: DateRange,
    pub class_id: Option<ClassId>,
    pub total_sessions: usize,
    pub total_check_ins: usize,
    pub present_count: usize,
    pub late_count: usize,
    pub absent_count: usize,
    pub far_count: usize,
    pub no_gps_count: usize,
    pub present_rate: f64,
    pub late_rate: f64,
    pub absent_rate: f64,
    pub far_rate: f64,
}

/// One student × day cell of the attendance matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatrixCell {
    Present,
    Late,
    Absent,
    /// Before enrollment or in the future
    NoSession,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixDay {
    pub date: NaiveDate,
    pub session_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub student: StudentSummary,
    pub enrolled_on: NaiveDate,
    /// One cell per day of the range, in order
    pub cells: Vec<MatrixCell>,
    pub present_count: usize,
    pub late_count: usize,
    pub absent_count: usize,
    /// Cells other than `NoSession`
    pub total_days: usize,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceMatrix {
    pub class_id: ClassId,
    pub range: DateRange,
    pub days: Vec<MatrixDay>,
    pub rows: Vec<MatrixRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarOccurrence {
    pub session: SessionSummary,
    pub checked_in_at: DateTime<Local>,
    /// Parsed from the note; absent when the note carries no distance
    pub distance_meters: Option<f64>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarStudentSummary {
    pub student: StudentSummary,
    pub count: usize,
    pub max_distance_meters: Option<f64>,
    pub avg_distance_meters: Option<f64>,
    pub occurrences: Vec<FarOccurrence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoGpsCheckIn {
    pub student: StudentSummary,
    pub session: SessionSummary,
    pub checked_in_at: DateTime<Local>,
}

/// Location anomalies over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarCheckInReport {
    pub range: DateRange,
    pub class_id: Option<ClassId>,
    pub students: Vec<FarStudentSummary>,
    pub no_gps: Vec<NoGpsCheckIn>,
}
