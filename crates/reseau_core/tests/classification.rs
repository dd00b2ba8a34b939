mod common;

use common::{ms, Fixture};
use reseau_core::{
    AnalyticsError, DirectoryError, EntityRef, MemberDirectory, NetworkDirectory, NewGroup,
    NewNetwork, Qualification,
};
use std::collections::BTreeSet;
use uuid::Uuid;

#[test]
fn members_without_group_are_isolated_unless_privileged() {
    let fx = Fixture::new();
    let regular = fx.member(Qualification::Regulier);
    let governance = fx.member(Qualification::Gouvernance);
    let ecodim = fx.member(Qualification::Ecodim);

    let analytics = fx.analytics();
    let isolated = analytics.isolated_members(None).unwrap();
    assert!(isolated.contains(&regular));
    assert!(!isolated.contains(&governance));
    assert!(!isolated.contains(&ecodim));

    let network = fx.network("Nord");
    fx.join(fx.group(network), regular, ms(2024, 1, 1));
    assert!(!fx.analytics().isolated_members(None).unwrap().contains(&regular));
}

#[test]
fn isolated_and_non_isolated_partition_each_scope() {
    let fx = Fixture::new();
    let church = fx.church("Église A");
    let network = fx.network_in("Réseau A", Some(church));
    let group = fx.group(network);
    let in_group = fx.member_in(Qualification::Regulier, Some(church));
    fx.join(group, in_group, ms(2024, 1, 1));
    fx.member_in(Qualification::Irregulier, Some(church));
    fx.member_in(Qualification::ResponsableEcodim, Some(church));
    fx.member(Qualification::EnAttente);

    let analytics = fx.analytics();
    let directory = fx.directory();
    for scope in [None, Some(church)] {
        let everyone = directory.list_by_scope(scope).unwrap();
        let isolated = analytics.isolated_members(scope).unwrap();
        let others = analytics.non_isolated_members(scope).unwrap();
        assert!(isolated.is_disjoint(&others));
        let union: BTreeSet<_> = isolated.union(&others).copied().collect();
        assert_eq!(union, everyone);
    }
    assert_eq!(analytics.isolated_members(Some(church)).unwrap().len(), 1);
}

#[test]
fn network_creation_marks_responsibles_as_privileged() {
    let fx = Fixture::new();
    let first = fx.member(Qualification::Regulier);
    let second = fx.member(Qualification::Leader);
    let directory = fx.directory();
    directory
        .create_network(&NewNetwork {
            name: "Réseau Centre".to_string(),
            responsable1: first,
            responsable2: Some(second),
            church: None,
        })
        .unwrap();

    for member in [first, second] {
        assert_eq!(
            directory.get_qualification(member).unwrap(),
            Qualification::ResponsableReseau
        );
    }
    let isolated = fx.analytics().isolated_members(None).unwrap();
    assert!(!isolated.contains(&first));
    assert!(!isolated.contains(&second));
}

#[test]
fn retired_member_appears_until_joining_another_group() {
    let fx = Fixture::new();
    let network = fx.network("Retraite");
    let first = fx.group(network);
    let second = fx.group(network);
    let member = fx.member(Qualification::Regulier);
    fx.join(first, member, ms(2024, 1, 1));
    fx.leave(first, member, ms(2024, 5, 1));

    let retired = fx.analytics().retired_members().unwrap();
    assert_eq!(retired.len(), 1);
    assert_eq!(retired[0].member, member);
    assert_eq!(retired[0].left_at, ms(2024, 5, 1));
    assert_eq!(retired[0].group, first);
    assert_eq!(retired[0].network, network);

    fx.join(second, member, ms(2024, 8, 1));
    assert!(fx.analytics().retired_members().unwrap().is_empty());
}

#[test]
fn leaving_one_group_while_in_another_is_not_retirement() {
    let fx = Fixture::new();
    let network = fx.network("Double");
    let first = fx.group(network);
    let second = fx.group(network);
    let member = fx.member(Qualification::Regulier);
    fx.join(first, member, ms(2024, 1, 1));
    fx.join(second, member, ms(2024, 2, 1));
    fx.leave(first, member, ms(2024, 3, 1));

    assert!(fx.analytics().retired_members().unwrap().is_empty());
}

#[test]
fn retired_uses_the_most_recent_departure_and_skips_deleted_members() {
    let fx = Fixture::new();
    let north = fx.network("Nord");
    let south = fx.network("Sud");
    let north_group = fx.group(north);
    let south_group = fx.group(south);
    let member = fx.member(Qualification::Regulier);
    fx.join(north_group, member, ms(2023, 1, 1));
    fx.leave(north_group, member, ms(2023, 6, 1));
    fx.join(south_group, member, ms(2023, 7, 1));
    fx.leave(south_group, member, ms(2024, 2, 1));

    let removed = fx.member(Qualification::Regulier);
    fx.join(north_group, removed, ms(2023, 1, 1));
    fx.directory().delete_member(removed, ms(2023, 9, 1)).unwrap();

    let retired = fx.analytics().retired_members().unwrap();
    assert_eq!(retired.len(), 1);
    assert_eq!(retired[0].member, member);
    assert_eq!(retired[0].left_at, ms(2024, 2, 1));
    assert_eq!(retired[0].group, south_group);
    assert_eq!(retired[0].network, south);
}

#[test]
fn qualification_breakdown_counts_current_members_per_network() {
    let fx = Fixture::new();
    let network = fx.network("Composition");
    let empty = fx.network("Sans groupe");
    let first = fx.group(network);
    let second = fx.group(network);
    let leader = fx.member(Qualification::Leader);
    fx.join(first, leader, ms(2024, 1, 1));
    fx.join(second, leader, ms(2024, 1, 1));
    for _ in 0..2 {
        fx.join(first, fx.member(Qualification::Regulier), ms(2024, 1, 1));
    }
    let gone = fx.member(Qualification::Irregulier);
    fx.join(second, gone, ms(2024, 1, 1));
    fx.leave(second, gone, ms(2024, 2, 1));

    let breakdown = fx.analytics().qualification_breakdown(None).unwrap();
    let row = breakdown.iter().find(|c| c.network == network).unwrap();
    assert_eq!(row.total, 3);
    assert_eq!(row.by_qualification[&Qualification::Leader], 1);
    assert_eq!(row.by_qualification[&Qualification::Regulier], 2);
    assert!(!row.by_qualification.contains_key(&Qualification::Irregulier));

    let row = breakdown.iter().find(|c| c.network == empty).unwrap();
    assert_eq!(row.total, 0);
}

#[test]
fn roster_projections_report_groups_and_responsibles() {
    let fx = Fixture::new();
    let north = fx.network("Nord");
    let south = fx.network("Sud");
    let member = fx.member(Qualification::Regulier);
    let north_group = fx.group(north);
    let south_group = fx.group(south);
    fx.join(north_group, member, ms(2024, 1, 1));
    fx.join(south_group, member, ms(2024, 1, 1));

    let co_lead = fx.member(Qualification::Leader);
    let lead = fx.member(Qualification::Leader);
    let led_group = fx
        .membership()
        .create_group(&NewGroup {
            network: north,
            responsable1: lead,
            responsable2: Some(co_lead),
        })
        .unwrap();

    let analytics = fx.analytics();
    let groups: BTreeSet<_> = analytics.groups_of_member(member).unwrap().into_iter().collect();
    assert_eq!(groups, BTreeSet::from([north_group, south_group]));
    assert_eq!(
        analytics.all_current_group_member_ids(Some(&[south][..])).unwrap(),
        BTreeSet::from([member])
    );

    let north_responsibles = analytics.responsibles_of_groups(Some(&[north][..])).unwrap();
    assert!(north_responsibles.contains(&lead));
    assert!(north_responsibles.contains(&co_lead));
    assert!(analytics.is_group_responsible(co_lead).unwrap());
    assert!(!analytics.is_group_responsible(member).unwrap());
    assert_eq!(led_group.responsable2, Some(co_lead));

    let missing = Uuid::new_v4();
    let err = analytics.groups_of_member(missing).unwrap_err();
    assert!(matches!(err, AnalyticsError::NotFound(EntityRef::Member(id)) if id == missing));
}

#[test]
fn roster_drift_flags_rosters_edited_outside_the_history_store() {
    let fx = Fixture::new();
    let network = fx.network("Intégrité");
    let group = fx.group(network);
    let member = fx.member(Qualification::Regulier);
    fx.join(group, member, ms(2024, 1, 1));
    assert!(fx.analytics().roster_drift().unwrap().is_empty());

    fx.conn
        .execute("DELETE FROM group_members WHERE group_uuid = ?1;", [group.to_string()])
        .unwrap();
    assert_eq!(fx.analytics().roster_drift().unwrap(), vec![group]);
}

#[test]
fn promoting_a_member_takes_them_out_of_isolation() {
    let fx = Fixture::new();
    let member = fx.member(Qualification::EnAttente);
    assert!(fx.analytics().isolated_members(None).unwrap().contains(&member));

    fx.directory()
        .set_qualification(member, Qualification::Gouvernance)
        .unwrap();
    assert!(fx
        .analytics()
        .non_isolated_members(None)
        .unwrap()
        .contains(&member));

    let missing = Uuid::new_v4();
    let err = fx
        .directory()
        .set_qualification(missing, Qualification::Leader)
        .unwrap_err();
    assert!(matches!(err, DirectoryError::MemberNotFound(id) if id == missing));
}

#[test]
fn marking_a_responsible_privileges_active_members_only() {
    let fx = Fixture::new();
    let directory = fx.directory();
    let member = fx.member(Qualification::Irregulier);
    assert!(fx.analytics().isolated_members(None).unwrap().contains(&member));

    directory.mark_responsable(member).unwrap();
    assert_eq!(
        directory.get_qualification(member).unwrap(),
        Qualification::ResponsableReseau
    );
    assert!(!fx.analytics().isolated_members(None).unwrap().contains(&member));

    let removed = fx.member(Qualification::Regulier);
    directory.delete_member(removed, ms(2024, 1, 1)).unwrap();
    let err = directory.mark_responsable(removed).unwrap_err();
    assert!(matches!(err, DirectoryError::MemberNotFound(id) if id == removed));
}

#[test]
fn network_creation_with_a_deleted_responsible_marks_nobody() {
    let fx = Fixture::new();
    let directory = fx.directory();
    let kept = fx.member(Qualification::Leader);
    let removed = fx.member(Qualification::Leader);
    directory.delete_member(removed, ms(2024, 1, 1)).unwrap();

    let err = directory
        .create_network(&NewNetwork {
            name: "Réseau Ouest".to_string(),
            responsable1: kept,
            responsable2: Some(removed),
            church: None,
        })
        .unwrap_err();
    assert!(matches!(err, DirectoryError::MemberNotFound(id) if id == removed));
    assert_eq!(
        directory.get_qualification(kept).unwrap(),
        Qualification::Leader
    );
    assert!(directory.list_networks(None).unwrap().is_empty());
}
