#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use reseau_core::db::open_db_in_memory;
use reseau_core::{
    AnalyticsService, ChurchId, GroupId, MemberId, MembershipService, NetworkId, NewGroup,
    NewMember, NewNetwork, Qualification, SqliteDirectoryRepository, SqliteGroupRepository,
};
use rusqlite::Connection;

pub fn ms(year: i32, month: u32, day: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .unwrap()
        .timestamp_millis()
}

/// In-memory database with helpers for building networks and groups.
pub struct Fixture {
    pub conn: Connection,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            conn: open_db_in_memory().unwrap(),
        }
    }

    pub fn directory(&self) -> SqliteDirectoryRepository<'_> {
        SqliteDirectoryRepository::try_new(&self.conn).unwrap()
    }

    pub fn membership(&self) -> MembershipService<SqliteGroupRepository<'_>> {
        MembershipService::new(SqliteGroupRepository::try_new(&self.conn).unwrap())
    }

    pub fn analytics(
        &self,
    ) -> AnalyticsService<SqliteGroupRepository<'_>, SqliteDirectoryRepository<'_>> {
        AnalyticsService::new(
            SqliteGroupRepository::try_new(&self.conn).unwrap(),
            self.directory(),
        )
    }

    pub fn church(&self, name: &str) -> ChurchId {
        self.directory().create_church(name).unwrap()
    }

    pub fn member(&self, qualification: Qualification) -> MemberId {
        self.member_in(qualification, None)
    }

    pub fn member_in(&self, qualification: Qualification, church: Option<ChurchId>) -> MemberId {
        self.directory()
            .create_member(&NewMember {
                display_name: "Membre".to_string(),
                qualification,
                church,
            })
            .unwrap()
            .uuid
    }

    pub fn network(&self, name: &str) -> NetworkId {
        self.network_in(name, None)
    }

    pub fn network_in(&self, name: &str, church: Option<ChurchId>) -> NetworkId {
        let responsable = self.member_in(Qualification::Leader, church);
        self.directory()
            .create_network(&NewNetwork {
                name: name.to_string(),
                responsable1: responsable,
                responsable2: None,
                church,
            })
            .unwrap()
            .uuid
    }

    pub fn group(&self, network: NetworkId) -> GroupId {
        let responsable = self.member(Qualification::Leader);
        self.membership()
            .create_group(&NewGroup {
                network,
                responsable1: responsable,
                responsable2: None,
            })
            .unwrap()
            .uuid
    }

    pub fn join(&self, group: GroupId, member: MemberId, at: i64) {
        self.membership().add_member(group, member, Some(at)).unwrap();
    }

    pub fn leave(&self, group: GroupId, member: MemberId, at: i64) {
        self.membership()
            .remove_member(group, member, Some(at))
            .unwrap();
    }
}
