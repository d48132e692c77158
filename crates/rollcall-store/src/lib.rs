//! Persistence layer for rollcall
//!
//! Provides:
//! - Class catalog and student directory
//! - Sessions with a per-day cap enforced at insert time
//! - Enrollment requests with single-transition review
//! - Session registrations (one per student per day)
//! - Attendance with conditional check-in/check-out writes
//! - Audit log (append-only)

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use rollcall_util::RollcallError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness or reference constraint rejected the write
    #[error("Constraint violated: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for RollcallError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => RollcallError::not_found(msg),
            StoreError::Conflict(msg) => RollcallError::conflict(msg),
            other => RollcallError::store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
