//! Membership history intervals and the read snapshot built from them.
//!
//! # Responsibility
//! - Define one join/leave interval of a member in a group.
//! - Hold a consistent, immutable copy of groups, rosters, and intervals that
//!   analytic functions read from.
//!
//! # Invariants
//! - `joined_at <= left_at` whenever `left_at` is set.
//! - Activity is half-open: active on `[joined_at, left_at)`.
//! - Within one group, intervals are ordered by `joined_at` then insertion.

use crate::model::member::MemberId;
use crate::model::network::{Group, GroupId, NetworkId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One membership interval of a member inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipInterval {
    pub member: MemberId,
    /// Epoch ms when the member joined.
    pub joined_at: i64,
    /// Epoch ms when the member left. `None` means the interval is open.
    pub left_at: Option<i64>,
}

/// Interval whose bounds are out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidInterval {
    pub joined_at: i64,
    pub left_at: i64,
}

impl Display for InvalidInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "interval leaves at {} before joining at {}",
            self.left_at, self.joined_at
        )
    }
}

impl Error for InvalidInterval {}

impl MembershipInterval {
    pub fn open(member: MemberId, joined_at: i64) -> Self {
        Self {
            member,
            joined_at,
            left_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.left_at.is_none()
    }

    /// Returns whether the member counts as present at `instant`.
    ///
    /// A member who left exactly at `instant` is not active at `instant`.
    pub fn is_active_at(&self, instant: i64) -> bool {
        self.joined_at <= instant && self.left_at.map_or(true, |left_at| left_at > instant)
    }

    pub fn validate(&self) -> Result<(), InvalidInterval> {
        match self.left_at {
            Some(left_at) if left_at < self.joined_at => Err(InvalidInterval {
                joined_at: self.joined_at,
                left_at,
            }),
            _ => Ok(()),
        }
    }
}

/// One group with its current roster and complete interval log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHistory {
    pub group: Group,
    /// Denormalized current roster as persisted.
    pub roster: BTreeSet<MemberId>,
    pub intervals: Vec<MembershipInterval>,
}

impl GroupHistory {
    pub fn new(group: Group) -> Self {
        Self {
            group,
            roster: BTreeSet::new(),
            intervals: Vec::new(),
        }
    }

    /// Members with an open interval, derived from history alone.
    pub fn open_members(&self) -> BTreeSet<MemberId> {
        self.intervals
            .iter()
            .filter(|interval| interval.is_open())
            .map(|interval| interval.member)
            .collect()
    }

    pub fn network(&self) -> NetworkId {
        self.group.network
    }
}

/// Consistent read-only view over a set of groups.
///
/// Built inside one read transaction, so rosters and intervals never
/// disagree within a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySnapshot {
    groups: Vec<GroupHistory>,
}

impl HistorySnapshot {
    pub fn new(groups: Vec<GroupHistory>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[GroupHistory] {
        &self.groups
    }

    pub fn group(&self, group_id: GroupId) -> Option<&GroupHistory> {
        self.groups.iter().find(|entry| entry.group.uuid == group_id)
    }

    pub fn groups_in_network(&self, network: NetworkId) -> impl Iterator<Item = &GroupHistory> {
        self.groups
            .iter()
            .filter(move |entry| entry.group.network == network)
    }
}
