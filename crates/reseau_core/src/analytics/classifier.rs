//! Isolation, retirement, and qualification-composition classification.
//!
//! # Invariants
//! - `isolated_members` and `non_isolated_members` partition their input.
//! - A retired member has at least one closed interval and no current group.

use crate::analytics::roster::all_current_group_member_ids;
use crate::model::history::HistorySnapshot;
use crate::model::member::{Member, MemberId, Qualification};
use crate::model::network::{GroupId, NetworkId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Member who left every group and currently belongs to none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredMember {
    pub member: MemberId,
    /// Most recent departure across all groups.
    pub left_at: i64,
    /// Group of the most recent departure.
    pub group: GroupId,
    pub network: NetworkId,
}

/// Qualification mix of the current members of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkComposition {
    pub network: NetworkId,
    pub total: usize,
    pub by_qualification: BTreeMap<Qualification, usize>,
}

fn is_isolated(member: &Member, in_groups: &BTreeSet<MemberId>) -> bool {
    !in_groups.contains(&member.uuid) && !member.is_privileged()
}

/// Members of `members` in no current group and without a privileged
/// qualification.
pub fn isolated_members(snapshot: &HistorySnapshot, members: &[Member]) -> BTreeSet<MemberId> {
    let in_groups = all_current_group_member_ids(snapshot, None);
    members
        .iter()
        .filter(|member| is_isolated(member, &in_groups))
        .map(|member| member.uuid)
        .collect()
}

/// Members of `members` in some current group or holding a privileged
/// qualification.
pub fn non_isolated_members(
    snapshot: &HistorySnapshot,
    members: &[Member],
) -> BTreeSet<MemberId> {
    let in_groups = all_current_group_member_ids(snapshot, None);
    members
        .iter()
        .filter(|member| !is_isolated(member, &in_groups))
        .map(|member| member.uuid)
        .collect()
}

/// Members with a past departure who are currently in no group.
///
/// Only a strictly later `left_at` replaces the departure kept for a member,
/// so on equal timestamps the first one in snapshot order wins. Sorted by
/// `left_at` descending, then member id.
pub fn retired_members(snapshot: &HistorySnapshot) -> Vec<RetiredMember> {
    let mut latest: BTreeMap<MemberId, RetiredMember> = BTreeMap::new();
    for entry in snapshot.groups() {
        for interval in &entry.intervals {
            let Some(left_at) = interval.left_at else {
                continue;
            };
            let replace = latest
                .get(&interval.member)
                .map_or(true, |kept| left_at > kept.left_at);
            if replace {
                latest.insert(
                    interval.member,
                    RetiredMember {
                        member: interval.member,
                        left_at,
                        group: entry.group.uuid,
                        network: entry.network(),
                    },
                );
            }
        }
    }

    let current = all_current_group_member_ids(snapshot, None);
    let mut retired: Vec<RetiredMember> = latest
        .into_values()
        .filter(|candidate| !current.contains(&candidate.member))
        .collect();
    retired.sort_by(|a, b| b.left_at.cmp(&a.left_at).then(a.member.cmp(&b.member)));
    retired
}

/// Qualification counts of current members per network.
///
/// A member in several groups of one network counts once for it. Members
/// missing from `qualifications` are left out.
pub fn qualification_breakdown(
    snapshot: &HistorySnapshot,
    networks: &[NetworkId],
    qualifications: &BTreeMap<MemberId, Qualification>,
) -> Vec<NetworkComposition> {
    networks
        .iter()
        .map(|network| {
            let scope = std::slice::from_ref(network);
            let members = all_current_group_member_ids(snapshot, Some(scope));
            let mut by_qualification = BTreeMap::new();
            let mut total = 0;
            for qualification in members.iter().filter_map(|id| qualifications.get(id)) {
                *by_qualification.entry(*qualification).or_insert(0) += 1;
                total += 1;
            }
            NetworkComposition {
                network: *network,
                total,
                by_qualification,
            }
        })
        .collect()
}
