//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service paths
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Attendance rules
    #[serde(default)]
    pub rules: RawRules,

    /// Remote face comparison service
    pub face_matcher: Option<RawFaceMatcher>,

    /// Classes to seed into the catalog
    #[serde(default)]
    pub classes: Vec<RawClass>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory holding the database
    pub data_dir: Option<PathBuf>,

    /// Where captured images are stored (default: <data_dir>/images)
    pub image_dir: Option<PathBuf>,
}

/// Attendance rules; every field falls back to its built-in default
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRules {
    /// Maximum live sessions per class per day
    pub max_sessions_per_day: Option<usize>,

    /// Registration closes this many minutes before a session starts
    pub registration_lead_minutes: Option<i64>,

    /// Check-ins up to this many minutes after the start count as late
    pub late_window_minutes: Option<i64>,

    /// Minimum similarity score for a face match, in [0, 1]
    pub face_match_threshold: Option<f64>,

    /// Text marking a check-in as far from the class location
    pub far_note_marker: Option<String>,

    /// Distance beyond which a check-in is flagged as far
    pub far_radius_meters: Option<f64>,

    /// Count late cells as present in the attendance matrix
    pub late_counts_as_present: Option<bool>,

    /// Only approved students may register for a class's sessions
    pub registration_requires_enrollment: Option<bool>,

    /// Only registered students may check in
    pub check_in_requires_registration: Option<bool>,
}

/// Face matcher endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawFaceMatcher {
    /// URL accepting a JSON comparison request
    pub endpoint: String,

    /// Request timeout in seconds
    pub timeout_seconds: Option<u64>,
}

/// Seed class definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawClass {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub class_type: String,
    #[serde(default)]
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub academic_year: String,
}
