//! Domain model for networks, groups, and membership history.
//!
//! # Responsibility
//! - Define canonical data structures used by the membership core.
//! - Keep identity, qualification, and time-interval rules in one place.
//!
//! # Invariants
//! - Every member, network, and group is identified by a stable UUID.
//! - History intervals are never deleted; leaving closes an interval.
//! - All instants are UTC epoch milliseconds.

pub mod history;
pub mod member;
pub mod network;
pub mod period;
