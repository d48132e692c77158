//! Error types for rollcall

use thiserror::Error;

/// Core error type for rollcall operations.
///
/// Every variant carries a human-readable message that is safe to show to
/// the caller as-is.
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Deadline passed: {0}")]
    DeadlinePassed(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Face not registered: {0}")]
    FaceNotRegistered(String),

    #[error("Face mismatch: {0}")]
    FaceMismatch(String),

    #[error("Already checked out: {0}")]
    AlreadyCheckedOut(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RollcallError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn deadline_passed(msg: impl Into<String>) -> Self {
        Self::DeadlinePassed(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::CapacityExceeded(msg.into())
    }

    pub fn face_not_registered(msg: impl Into<String>) -> Self {
        Self::FaceNotRegistered(msg.into())
    }

    pub fn face_mismatch(msg: impl Into<String>) -> Self {
        Self::FaceMismatch(msg.into())
    }

    pub fn already_checked_out(msg: impl Into<String>) -> Self {
        Self::AlreadyCheckedOut(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for this error
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidState(_) => "invalid_state",
            Self::DeadlinePassed(_) => "deadline_passed",
            Self::CapacityExceeded(_) => "capacity_exceeded",
            Self::FaceNotRegistered(_) => "face_not_registered",
            Self::FaceMismatch(_) => "face_mismatch",
            Self::AlreadyCheckedOut(_) => "already_checked_out",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Validation(_) => "validation",
            Self::Store(_) => "store",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// The message without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m)
            | Self::Conflict(m)
            | Self::InvalidState(m)
            | Self::DeadlinePassed(m)
            | Self::CapacityExceeded(m)
            | Self::FaceNotRegistered(m)
            | Self::FaceMismatch(m)
            | Self::AlreadyCheckedOut(m)
            | Self::ServiceUnavailable(m)
            | Self::Validation(m)
            | Self::Store(m)
            | Self::Config(m)
            | Self::Internal(m) => m,
        }
    }
}

pub type Result<T> = std::result::Result<T, RollcallError>;
