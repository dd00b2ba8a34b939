//! "Now" projections read from the denormalized group rosters.

use crate::model::history::HistorySnapshot;
use crate::model::member::MemberId;
use crate::model::network::{GroupId, NetworkId};
use std::collections::BTreeSet;

fn in_scope(network: NetworkId, networks: Option<&[NetworkId]>) -> bool {
    networks.map_or(true, |networks| networks.contains(&network))
}

/// Union of the rosters of all active groups, optionally limited to
/// groups under `networks`.
pub fn all_current_group_member_ids(
    snapshot: &HistorySnapshot,
    networks: Option<&[NetworkId]>,
) -> BTreeSet<MemberId> {
    snapshot
        .groups()
        .iter()
        .filter(|entry| entry.group.is_active() && in_scope(entry.network(), networks))
        .flat_map(|entry| entry.roster.iter().copied())
        .collect()
}

/// Union of `responsable1`/`responsable2` of all active groups in scope.
pub fn responsibles_of_groups(
    snapshot: &HistorySnapshot,
    networks: Option<&[NetworkId]>,
) -> BTreeSet<MemberId> {
    snapshot
        .groups()
        .iter()
        .filter(|entry| entry.group.is_active() && in_scope(entry.network(), networks))
        .flat_map(|entry| entry.group.responsables())
        .collect()
}

/// Active groups whose roster currently contains `member`, in snapshot order.
pub fn groups_of_member(snapshot: &HistorySnapshot, member: MemberId) -> Vec<GroupId> {
    snapshot
        .groups()
        .iter()
        .filter(|entry| entry.group.is_active() && entry.roster.contains(&member))
        .map(|entry| entry.group.uuid)
        .collect()
}

/// Groups whose persisted roster disagrees with their open intervals.
///
/// Always empty for data written through the group repository.
pub fn roster_drift(snapshot: &HistorySnapshot) -> Vec<GroupId> {
    snapshot
        .groups()
        .iter()
        .filter(|entry| entry.roster != entry.open_members())
        .map(|entry| entry.group.uuid)
        .collect()
}
