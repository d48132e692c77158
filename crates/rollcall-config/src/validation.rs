//! Configuration validation

use crate::schema::{RawClass, RawConfig, RawRules};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Class '{code}': {message}")]
    ClassError { code: String, message: String },

    #[error("Duplicate class code: {0}")]
    DuplicateClassCode(String),

    #[error("Rule '{rule}': {message}")]
    InvalidRule { rule: &'static str, message: String },

    #[error("Face matcher: {0}")]
    FaceMatcherError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_rules(&config.rules);

    if let Some(matcher) = &config.face_matcher {
        if !(matcher.endpoint.starts_with("http://") || matcher.endpoint.starts_with("https://")) {
            errors.push(ValidationError::FaceMatcherError(format!(
                "endpoint '{}' must be an http(s) URL",
                matcher.endpoint
            )));
        }
        if matcher.timeout_seconds == Some(0) {
            errors.push(ValidationError::FaceMatcherError(
                "timeout_seconds must be positive".into(),
            ));
        }
    }

    let mut seen_codes = HashSet::new();
    for class in &config.classes {
        if !seen_codes.insert(class.code.trim()) {
            errors.push(ValidationError::DuplicateClassCode(class.code.clone()));
        }
    }

    for class in &config.classes {
        errors.extend(validate_class(class));
    }

    errors
}

fn validate_rules(rules: &RawRules) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if rules.max_sessions_per_day == Some(0) {
        errors.push(ValidationError::InvalidRule {
            rule: "max_sessions_per_day",
            message: "must be at least 1".into(),
        });
    }

    if let Some(lead) = rules.registration_lead_minutes
        && lead < 0
    {
        errors.push(ValidationError::InvalidRule {
            rule: "registration_lead_minutes",
            message: format!("must not be negative, got {}", lead),
        });
    }

    if let Some(window) = rules.late_window_minutes
        && window < 0
    {
        errors.push(ValidationError::InvalidRule {
            rule: "late_window_minutes",
            message: format!("must not be negative, got {}", window),
        });
    }

    if let Some(threshold) = rules.face_match_threshold
        && !(0.0..=1.0).contains(&threshold)
    {
        errors.push(ValidationError::InvalidRule {
            rule: "face_match_threshold",
            message: format!("must be within [0, 1], got {}", threshold),
        });
    }

    if let Some(marker) = &rules.far_note_marker
        && marker.trim().is_empty()
    {
        errors.push(ValidationError::InvalidRule {
            rule: "far_note_marker",
            message: "cannot be empty".into(),
        });
    }

    if let Some(radius) = rules.far_radius_meters
        && radius <= 0.0
    {
        errors.push(ValidationError::InvalidRule {
            rule: "far_radius_meters",
            message: format!("must be positive, got {}", radius),
        });
    }

    errors
}

fn validate_class(class: &RawClass) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if class.code.trim().is_empty() {
        errors.push(ValidationError::ClassError {
            code: class.code.clone(),
            message: "code cannot be empty".into(),
        });
    }

    if class.name.trim().is_empty() {
        errors.push(ValidationError::ClassError {
            code: class.code.clone(),
            message: "name cannot be empty".into(),
        });
    }

    match (class.latitude, class.longitude) {
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                errors.push(ValidationError::ClassError {
                    code: class.code.clone(),
                    message: format!("coordinates ({}, {}) out of range", lat, lng),
                });
            }
        }
        (None, None) => {}
        _ => errors.push(ValidationError::ClassError {
            code: class.code.clone(),
            message: "latitude and longitude must be given together".into(),
        }),
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_class(code: &str) -> RawClass {
        RawClass {
            code: code.into(),
            name: "Class".into(),
            class_type: String::new(),
            location: String::new(),
            latitude: None,
            longitude: None,
            academic_year: String::new(),
        }
    }

    fn raw_config(classes: Vec<RawClass>) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: Default::default(),
            rules: Default::default(),
            face_matcher: None,
            classes,
        }
    }

    #[test]
    fn test_duplicate_code_detection() {
        let config = raw_config(vec![raw_class("CS101"), raw_class("CS101")]);

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateClassCode(_))));
    }

    #[test]
    fn test_partial_coordinates_rejected() {
        let mut class = raw_class("CS101");
        class.latitude = Some(10.0);

        let errors = validate_config(&raw_config(vec![class]));
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ValidationError::ClassError { .. }));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&raw_config(vec![raw_class("CS101")])).is_empty());
    }

    #[test]
    fn test_face_matcher_endpoint_scheme() {
        let mut config = raw_config(vec![]);
        config.face_matcher = Some(crate::RawFaceMatcher {
            endpoint: "ftp://faces".into(),
            timeout_seconds: Some(0),
        });

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
    }
}
