//! Shared data model for rollcall
//!
//! This crate defines the records the engine owns and returns:
//! - Classes, students and sessions
//! - Enrollment requests, registrations and attendance
//! - Read-side views and statistics reports

mod reports;
mod types;

pub use reports::*;
pub use types::*;
