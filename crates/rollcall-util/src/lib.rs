//! Shared utilities for rollcall
//!
//! This crate provides:
//! - ID types (ClassId, SessionId, StudentId, RequestId, ...)
//! - Clock abstraction and time-window helpers (deadlines, lateness, date ranges)
//! - The engine-wide error taxonomy
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
