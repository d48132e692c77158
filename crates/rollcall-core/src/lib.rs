//! Session, enrollment, registration and attendance engine for rollcall
//!
//! This crate is the heart of rollcall, containing:
//! - Class catalog and student directory
//! - Session registry (per-day cap, registration deadlines, soft delete)
//! - Enrollment workflow (Pending -> Approved | Rejected, exactly once)
//! - Registration ledger (one session per student per day)
//! - Attendance recorder (face-verified check-in/check-out, derived status)
//! - Statistics aggregator (overview, presence matrix, location anomalies)

mod attendance;
mod catalog;
mod context;
mod engine;
mod enrollment;
mod registration;
mod sessions;
mod statistics;

#[cfg(test)]
mod testing;

pub use attendance::*;
pub use catalog::*;
pub use engine::*;
pub use enrollment::*;
pub use registration::*;
pub use sessions::*;
pub use statistics::*;
