//! Point-in-time membership by replaying history intervals.
//!
//! A member is active in network N at instant T iff some group of N holds an
//! interval with `joined_at <= T` and (`left_at` absent or `left_at > T`).
//! Deleted groups still count for instants before their deletion.

use crate::model::history::HistorySnapshot;
use crate::model::member::MemberId;
use crate::model::network::NetworkId;
use std::collections::{BTreeMap, BTreeSet};

/// Members active in `network` at `instant`.
pub fn active_members_at(
    snapshot: &HistorySnapshot,
    network: NetworkId,
    instant: i64,
) -> BTreeSet<MemberId> {
    snapshot
        .groups_in_network(network)
        .flat_map(|entry| entry.intervals.iter())
        .filter(|interval| interval.is_active_at(instant))
        .map(|interval| interval.member)
        .collect()
}

/// Active member count for each of `networks` at `instant`.
///
/// Every requested network is present in the result, zero when empty.
pub fn active_counts_at(
    snapshot: &HistorySnapshot,
    networks: &[NetworkId],
    instant: i64,
) -> BTreeMap<NetworkId, usize> {
    networks
        .iter()
        .map(|network| (*network, active_members_at(snapshot, *network, instant).len()))
        .collect()
}

/// Whether `member` is active in `network` at `instant`.
pub fn is_active_in_network_at(
    snapshot: &HistorySnapshot,
    network: NetworkId,
    member: MemberId,
    instant: i64,
) -> bool {
    snapshot
        .groups_in_network(network)
        .flat_map(|entry| entry.intervals.iter())
        .any(|interval| interval.member == member && interval.is_active_at(instant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::history::{GroupHistory, MembershipInterval};
    use crate::model::network::Group;
    use uuid::Uuid;

    #[test]
    fn member_in_two_groups_of_one_network_counts_once() {
        let network = Uuid::new_v4();
        let member = Uuid::new_v4();
        let groups = (0..2)
            .map(|_| {
                let mut entry = GroupHistory::new(Group {
                    uuid: Uuid::new_v4(),
                    network,
                    responsable1: Uuid::new_v4(),
                    responsable2: None,
                    is_deleted: false,
                });
                entry.intervals.push(MembershipInterval::open(member, 5));
                entry
            })
            .collect();
        let snapshot = HistorySnapshot::new(groups);

        assert_eq!(active_members_at(&snapshot, network, 10).len(), 1);
        assert!(active_members_at(&snapshot, network, 4).is_empty());

        let other = Uuid::new_v4();
        let counts = active_counts_at(&snapshot, &[network, other], 10);
        assert_eq!(counts[&network], 1);
        assert_eq!(counts[&other], 0);
    }
}
