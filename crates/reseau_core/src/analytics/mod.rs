//! Derived views over membership history.
//!
//! # Responsibility
//! - Project current rosters ("now" views) from a `HistorySnapshot`.
//! - Replay intervals to answer point-in-time and longitudinal questions.
//! - Classify members as isolated or retired.
//!
//! # Invariants
//! - Every function here is pure: it reads only its arguments and never
//!   touches storage or process-wide state.
//! - Deleted groups contribute history but never current members.

pub mod classifier;
pub mod evolution;
pub mod point_in_time;
pub mod roster;
