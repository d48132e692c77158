//! Validated configuration structures

use crate::schema::{RawClass, RawConfig, RawFaceMatcher, RawRules, RawServiceConfig};
use rollcall_api::{GeoPoint, NewClass};
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on live sessions per class per day
pub const DEFAULT_MAX_SESSIONS_PER_DAY: usize = 3;

/// Default minimum face similarity
pub const DEFAULT_FACE_MATCH_THRESHOLD: f64 = 0.70;

/// Default text identifying a far-from-class check-in
pub const DEFAULT_FAR_NOTE_MARKER: &str = "far from class";

/// Default face matcher request timeout
pub const DEFAULT_FACE_MATCHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Validated configuration ready for use by the engine
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub rules: Rules,
    /// None means no remote matcher is configured
    pub face_matcher: Option<FaceMatcherConfig>,
    /// Classes to create on startup if their code is not yet known
    pub classes: Vec<NewClass>,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let rules = Rules::from_raw(&raw.rules);
        let classes = raw.classes.into_iter().map(convert_class).collect();

        tracing::debug!(?rules, "Rules loaded");

        Self {
            service: ServiceConfig::from_raw(raw.service),
            rules,
            face_matcher: raw.face_matcher.map(FaceMatcherConfig::from_raw),
            classes,
        }
    }

    /// Defaults used when no config file exists
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            service: ServiceConfig {
                image_dir: data_dir.join("images"),
                data_dir,
            },
            rules: Rules::default(),
            face_matcher: None,
            classes: Vec::new(),
        }
    }
}

/// Service paths
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub image_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let data_dir = raw
            .data_dir
            .unwrap_or_else(rollcall_util::data_dir_without_env);
        let image_dir = raw.image_dir.unwrap_or_else(|| data_dir.join("images"));

        Self {
            data_dir,
            image_dir,
        }
    }
}

/// Attendance rules consulted by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Rules {
    pub max_sessions_per_day: usize,
    /// Registration closes this long before the session start
    pub registration_lead: chrono::Duration,
    /// Check-ins later than this after the start are recorded as absent
    pub late_window: chrono::Duration,
    pub face_match_threshold: f64,
    pub far_note_marker: String,
    pub far_radius_meters: f64,
    pub late_counts_as_present: bool,
    pub registration_requires_enrollment: bool,
    pub check_in_requires_registration: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            max_sessions_per_day: DEFAULT_MAX_SESSIONS_PER_DAY,
            registration_lead: chrono::Duration::hours(2),
            late_window: chrono::Duration::minutes(15),
            face_match_threshold: DEFAULT_FACE_MATCH_THRESHOLD,
            far_note_marker: DEFAULT_FAR_NOTE_MARKER.to_string(),
            far_radius_meters: 200.0,
            late_counts_as_present: false,
            registration_requires_enrollment: true,
            check_in_requires_registration: false,
        }
    }
}

impl Rules {
    fn from_raw(raw: &RawRules) -> Self {
        let defaults = Self::default();

        Self {
            max_sessions_per_day: raw
                .max_sessions_per_day
                .unwrap_or(defaults.max_sessions_per_day),
            registration_lead: raw
                .registration_lead_minutes
                .map(chrono::Duration::minutes)
                .unwrap_or(defaults.registration_lead),
            late_window: raw
                .late_window_minutes
                .map(chrono::Duration::minutes)
                .unwrap_or(defaults.late_window),
            face_match_threshold: raw
                .face_match_threshold
                .unwrap_or(defaults.face_match_threshold),
            far_note_marker: raw
                .far_note_marker
                .clone()
                .unwrap_or(defaults.far_note_marker),
            far_radius_meters: raw.far_radius_meters.unwrap_or(defaults.far_radius_meters),
            late_counts_as_present: raw
                .late_counts_as_present
                .unwrap_or(defaults.late_counts_as_present),
            registration_requires_enrollment: raw
                .registration_requires_enrollment
                .unwrap_or(defaults.registration_requires_enrollment),
            check_in_requires_registration: raw
                .check_in_requires_registration
                .unwrap_or(defaults.check_in_requires_registration),
        }
    }

    /// Whether a location note flags the check-in as far from the class
    pub fn is_far_note(&self, note: &str) -> bool {
        note.to_lowercase()
            .contains(&self.far_note_marker.to_lowercase())
    }
}

/// Remote face matcher settings
#[derive(Debug, Clone)]
pub struct FaceMatcherConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl FaceMatcherConfig {
    fn from_raw(raw: RawFaceMatcher) -> Self {
        Self {
            endpoint: raw.endpoint,
            timeout: raw
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_FACE_MATCHER_TIMEOUT),
        }
    }
}

fn convert_class(raw: RawClass) -> NewClass {
    NewClass {
        reference_point: GeoPoint::from_parts(raw.latitude, raw.longitude),
        code: raw.code.trim().to_string(),
        name: raw.name,
        class_type: raw.class_type,
        location: raw.location,
        academic_year: raw.academic_year,
    }
}
