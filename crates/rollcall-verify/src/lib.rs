//! Check-in verification collaborators for rollcall
//!
//! The engine never compares faces, stores images or measures distances
//! itself. It talks to these traits, which have:
//! - Remote/filesystem/geodesic adapters for real deployments
//! - Mock implementations for tests

mod face;
mod image;
mod location;
mod mock;

pub use face::*;
pub use image::*;
pub use location::*;
pub use mock::*;

use rollcall_util::RollcallError;
use thiserror::Error;

/// Errors from verification collaborators
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VerifyError> for RollcallError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::InvalidInput(msg) => RollcallError::validation(msg),
            other => RollcallError::unavailable(other.to_string()),
        }
    }
}

pub type VerifyResult<T> = Result<T, VerifyError>;
