//! Group storage and membership history store.
//!
//! # Responsibility
//! - Persist groups and their denormalized current roster.
//! - Append and close membership history intervals.
//! - Load consistent `HistorySnapshot`s for analytics.
//!
//! # Invariants
//! - `open_interval`/`close_interval` touch roster and history in the same
//!   IMMEDIATE transaction; no reader sees one without the other.
//! - At most one open interval per (group, member); backed by a partial
//!   unique index so a racing writer fails instead of duplicating.
//! - Intervals are closed, never deleted. Deleting a group force-closes them.

use crate::db::DbError;
use crate::model::history::{GroupHistory, HistorySnapshot, MembershipInterval};
use crate::model::member::MemberId;
use crate::model::network::{Group, GroupId, NetworkId};
use crate::repo::{
    check_schema, parse_bool_column, parse_uuid_column, uuid_in_clause, SchemaProblem,
};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const GROUP_SELECT_SQL: &str = "SELECT
    uuid,
    network_uuid,
    responsable1_uuid,
    responsable2_uuid,
    is_deleted
FROM groups";

/// Result type used by group repository operations.
pub type GroupRepoResult<T> = Result<T, GroupRepoError>;

/// Errors from group and membership history persistence.
#[derive(Debug)]
pub enum GroupRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Group does not exist or is deleted.
    GroupNotFound(GroupId),
    NetworkNotFound(NetworkId),
    /// Member does not exist or is deleted.
    MemberNotFound(MemberId),
    /// An open interval already exists for this pair.
    AlreadyMember { group: GroupId, member: MemberId },
    /// No open interval exists for this pair.
    NotAMember { group: GroupId, member: MemberId },
    /// Requested instant precedes the bound it must follow.
    InstantBeforeBound {
        group: GroupId,
        member: MemberId,
        at: i64,
        bound: i64,
    },
    Schema(SchemaProblem),
    /// Persisted data cannot be converted to valid read model.
    InvalidData(String),
}

impl Display for GroupRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::GroupNotFound(id) => write!(f, "group not found: {id}"),
            Self::NetworkNotFound(id) => write!(f, "network not found: {id}"),
            Self::MemberNotFound(id) => write!(f, "member not found: {id}"),
            Self::AlreadyMember { group, member } => {
                write!(f, "member {member} is already in group {group}")
            }
            Self::NotAMember { group, member } => {
                write!(f, "member {member} is not in group {group}")
            }
            Self::InstantBeforeBound {
                group,
                member,
                at,
                bound,
            } => write!(
                f,
                "instant {at} precedes {bound} for member {member} in group {group}"
            ),
            Self::Schema(problem) => write!(f, "group schema not ready: {problem:?}"),
            Self::InvalidData(message) => write!(f, "invalid group data: {message}"),
        }
    }
}

impl Error for GroupRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for GroupRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GroupRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Input for creating a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub network: NetworkId,
    pub responsable1: MemberId,
    pub responsable2: Option<MemberId>,
}

/// Repository interface for groups and their membership history.
pub trait GroupRepository {
    fn create_group(&self, new_group: &NewGroup) -> GroupRepoResult<Group>;
    fn get_group(&self, id: GroupId, include_deleted: bool) -> GroupRepoResult<Option<Group>>;
    /// Active groups, optionally restricted to some networks.
    fn list_groups(&self, networks: Option<&[NetworkId]>) -> GroupRepoResult<Vec<Group>>;
    /// Soft-deletes a group, closing its open intervals at `at`.
    fn delete_group(&self, id: GroupId, at: i64) -> GroupRepoResult<usize>;
    /// Opens an interval for `member` in `group` and adds it to the roster.
    fn open_interval(&self, group: GroupId, member: MemberId, at: i64) -> GroupRepoResult<()>;
    /// Closes the open interval for `member` and removes it from the roster.
    fn close_interval(
        &self,
        group: GroupId,
        member: MemberId,
        at: i64,
    ) -> GroupRepoResult<MembershipInterval>;
    /// Current roster of an active group.
    fn roster(&self, group: GroupId) -> GroupRepoResult<BTreeSet<MemberId>>;
    /// Full interval log of a group (deleted groups included).
    fn history(&self, group: GroupId) -> GroupRepoResult<Vec<MembershipInterval>>;
    /// Loads groups (deleted included) with rosters and history.
    fn load_snapshot(&self, networks: Option<&[NetworkId]>) -> GroupRepoResult<HistorySnapshot>;
}

/// SQLite-backed group repository.
pub struct SqliteGroupRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGroupRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> GroupRepoResult<Self> {
        if let Some(problem) =
            check_schema(conn, &["groups", "group_members", "group_member_history"])?
        {
            return Err(GroupRepoError::Schema(problem));
        }
        Ok(Self { conn })
    }
}

impl GroupRepository for SqliteGroupRepository<'_> {
    fn create_group(&self, new_group: &NewGroup) -> GroupRepoResult<Group> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let network_exists: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM networks WHERE uuid = ?1);",
            [new_group.network.to_string()],
            |row| row.get(0),
        )?;
        if network_exists != 1 {
            return Err(GroupRepoError::NetworkNotFound(new_group.network));
        }

        let group = Group {
            uuid: Uuid::new_v4(),
            network: new_group.network,
            responsable1: new_group.responsable1,
            responsable2: new_group.responsable2,
            is_deleted: false,
        };
        for member in group.responsables() {
            ensure_active_member(&tx, member)?;
        }

        tx.execute(
            "INSERT INTO groups (uuid, network_uuid, responsable1_uuid, responsable2_uuid, is_deleted)
             VALUES (?1, ?2, ?3, ?4, 0);",
            params![
                group.uuid.to_string(),
                group.network.to_string(),
                group.responsable1.to_string(),
                group.responsable2.map(|value| value.to_string()),
            ],
        )?;
        tx.commit()?;
        Ok(group)
    }

    fn get_group(&self, id: GroupId, include_deleted: bool) -> GroupRepoResult<Option<Group>> {
        let mut stmt = self.conn.prepare(&format!(
            "{GROUP_SELECT_SQL}
             WHERE uuid = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), i64::from(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_group_row(row)?));
        }
        Ok(None)
    }

    fn list_groups(&self, networks: Option<&[NetworkId]>) -> GroupRepoResult<Vec<Group>> {
        let mut sql = format!("{GROUP_SELECT_SQL} WHERE is_deleted = 0");
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(networks) = networks {
            if networks.is_empty() {
                return Ok(Vec::new());
            }
            let (placeholders, values) = uuid_in_clause(networks);
            sql.push_str(&format!(" AND network_uuid IN ({placeholders})"));
            bind_values.extend(values);
        }
        sql.push_str(" ORDER BY created_at ASC, uuid ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            groups.push(parse_group_row(row)?);
        }
        Ok(groups)
    }

    fn delete_group(&self, id: GroupId, at: i64) -> GroupRepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_active_group(&tx, id)?;

        // An interval joined after `at` is closed at its own join instant.
        let closed = tx.execute(
            "UPDATE group_member_history
             SET left_at = MAX(joined_at, ?2)
             WHERE group_uuid = ?1
               AND left_at IS NULL;",
            params![id.to_string(), at],
        )?;
        tx.execute(
            "DELETE FROM group_members WHERE group_uuid = ?1;",
            [id.to_string()],
        )?;
        tx.execute(
            "UPDATE groups
             SET is_deleted = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            [id.to_string()],
        )?;
        tx.commit()?;
        Ok(closed)
    }

    fn open_interval(&self, group: GroupId, member: MemberId, at: i64) -> GroupRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_active_group(&tx, group)?;
        ensure_active_member(&tx, member)?;

        if find_open_interval(&tx, group, member)?.is_some() {
            return Err(GroupRepoError::AlreadyMember { group, member });
        }

        let last_left_at: Option<i64> = tx.query_row(
            "SELECT MAX(left_at)
             FROM group_member_history
             WHERE group_uuid = ?1
               AND member_uuid = ?2;",
            params![group.to_string(), member.to_string()],
            |row| row.get(0),
        )?;
        if let Some(bound) = last_left_at.filter(|bound| at < *bound) {
            return Err(GroupRepoError::InstantBeforeBound {
                group,
                member,
                at,
                bound,
            });
        }

        let inserted = tx.execute(
            "INSERT INTO group_member_history (group_uuid, member_uuid, joined_at, left_at)
             VALUES (?1, ?2, ?3, NULL);",
            params![group.to_string(), member.to_string(), at],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_constraint_violation(&err) => {
                return Err(GroupRepoError::AlreadyMember { group, member });
            }
            Err(err) => return Err(err.into()),
        }
        tx.execute(
            "INSERT INTO group_members (group_uuid, member_uuid) VALUES (?1, ?2);",
            params![group.to_string(), member.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn close_interval(
        &self,
        group: GroupId,
        member: MemberId,
        at: i64,
    ) -> GroupRepoResult<MembershipInterval> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_active_group(&tx, group)?;

        let (history_id, joined_at) = find_open_interval(&tx, group, member)?
            .ok_or(GroupRepoError::NotAMember { group, member })?;
        if at < joined_at {
            return Err(GroupRepoError::InstantBeforeBound {
                group,
                member,
                at,
                bound: joined_at,
            });
        }

        let changed = tx.execute(
            "UPDATE group_member_history
             SET left_at = ?2
             WHERE id = ?1
               AND left_at IS NULL;",
            params![history_id, at],
        )?;
        if changed == 0 {
            return Err(GroupRepoError::NotAMember { group, member });
        }
        tx.execute(
            "DELETE FROM group_members WHERE group_uuid = ?1 AND member_uuid = ?2;",
            params![group.to_string(), member.to_string()],
        )?;
        tx.commit()?;

        Ok(MembershipInterval {
            member,
            joined_at,
            left_at: Some(at),
        })
    }

    fn roster(&self, group: GroupId) -> GroupRepoResult<BTreeSet<MemberId>> {
        ensure_active_group(self.conn, group)?;
        let mut stmt = self.conn.prepare(
            "SELECT member_uuid
             FROM group_members
             WHERE group_uuid = ?1
             ORDER BY member_uuid ASC;",
        )?;
        let mut rows = stmt.query([group.to_string()])?;
        let mut members = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            members.insert(parse_uuid(&value, "group_members.member_uuid")?);
        }
        Ok(members)
    }

    fn history(&self, group: GroupId) -> GroupRepoResult<Vec<MembershipInterval>> {
        if self.get_group(group, true)?.is_none() {
            return Err(GroupRepoError::GroupNotFound(group));
        }
        let mut stmt = self.conn.prepare(
            "SELECT group_uuid, member_uuid, joined_at, left_at
             FROM group_member_history
             WHERE group_uuid = ?1
             ORDER BY joined_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([group.to_string()])?;
        let mut intervals = Vec::new();
        while let Some(row) = rows.next()? {
            intervals.push(parse_history_row(row)?.1);
        }
        Ok(intervals)
    }

    fn load_snapshot(&self, networks: Option<&[NetworkId]>) -> GroupRepoResult<HistorySnapshot> {
        if networks.is_some_and(|networks| networks.is_empty()) {
            return Ok(HistorySnapshot::default());
        }

        let (filter, bind_values) = match networks {
            Some(networks) => {
                let (placeholders, values) = uuid_in_clause(networks);
                (format!("WHERE g.network_uuid IN ({placeholders})"), values)
            }
            None => (String::new(), Vec::new()),
        };

        // One read transaction so rosters and intervals come from the same state.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;

        let mut order = Vec::new();
        let mut by_group: BTreeMap<GroupId, GroupHistory> = BTreeMap::new();
        {
            let mut stmt = tx.prepare(&format!(
                "SELECT g.uuid AS uuid,
                        g.network_uuid AS network_uuid,
                        g.responsable1_uuid AS responsable1_uuid,
                        g.responsable2_uuid AS responsable2_uuid,
                        g.is_deleted AS is_deleted
                 FROM groups g
                 {filter}
                 ORDER BY g.created_at ASC, g.uuid ASC;"
            ))?;
            let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
            while let Some(row) = rows.next()? {
                let group = parse_group_row(row)?;
                order.push(group.uuid);
                by_group.insert(group.uuid, GroupHistory::new(group));
            }
        }

        {
            let mut stmt = tx.prepare(&format!(
                "SELECT m.group_uuid, m.member_uuid
                 FROM group_members m
                 INNER JOIN groups g ON g.uuid = m.group_uuid
                 {filter};"
            ))?;
            let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
            while let Some(row) = rows.next()? {
                let group_text: String = row.get(0)?;
                let member_text: String = row.get(1)?;
                let group = parse_uuid(&group_text, "group_members.group_uuid")?;
                let member = parse_uuid(&member_text, "group_members.member_uuid")?;
                if let Some(entry) = by_group.get_mut(&group) {
                    entry.roster.insert(member);
                }
            }
        }

        {
            let mut stmt = tx.prepare(&format!(
                "SELECT h.group_uuid AS group_uuid,
                        h.member_uuid AS member_uuid,
                        h.joined_at AS joined_at,
                        h.left_at AS left_at
                 FROM group_member_history h
                 INNER JOIN groups g ON g.uuid = h.group_uuid
                 {filter}
                 ORDER BY h.joined_at ASC, h.id ASC;"
            ))?;
            let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
            while let Some(row) = rows.next()? {
                let (group, interval) = parse_history_row(row)?;
                if let Some(entry) = by_group.get_mut(&group) {
                    entry.intervals.push(interval);
                }
            }
        }
        tx.commit()?;

        let groups = order
            .into_iter()
            .filter_map(|id| by_group.remove(&id))
            .collect();
        Ok(HistorySnapshot::new(groups))
    }
}

fn find_open_interval(
    conn: &Connection,
    group: GroupId,
    member: MemberId,
) -> GroupRepoResult<Option<(i64, i64)>> {
    let found = conn
        .query_row(
            "SELECT id, joined_at
             FROM group_member_history
             WHERE group_uuid = ?1
               AND member_uuid = ?2
               AND left_at IS NULL;",
            params![group.to_string(), member.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(found)
}

fn ensure_active_group(conn: &Connection, id: GroupId) -> GroupRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM groups WHERE uuid = ?1 AND is_deleted = 0);",
        [id.to_string()],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(GroupRepoError::GroupNotFound(id));
    }
    Ok(())
}

fn ensure_active_member(conn: &Connection, id: MemberId) -> GroupRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM members WHERE uuid = ?1 AND is_deleted = 0);",
        [id.to_string()],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(GroupRepoError::MemberNotFound(id));
    }
    Ok(())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

fn parse_group_row(row: &Row<'_>) -> GroupRepoResult<Group> {
    let uuid_text: String = row.get("uuid")?;
    let network_text: String = row.get("network_uuid")?;
    let responsable1_text: String = row.get("responsable1_uuid")?;
    let responsable2 = row
        .get::<_, Option<String>>("responsable2_uuid")?
        .map(|value| parse_uuid(&value, "groups.responsable2_uuid"))
        .transpose()?;
    let is_deleted = parse_bool_column(row.get("is_deleted")?, "groups.is_deleted")
        .map_err(GroupRepoError::InvalidData)?;

    Ok(Group {
        uuid: parse_uuid(&uuid_text, "groups.uuid")?,
        network: parse_uuid(&network_text, "groups.network_uuid")?,
        responsable1: parse_uuid(&responsable1_text, "groups.responsable1_uuid")?,
        responsable2,
        is_deleted,
    })
}

fn parse_history_row(row: &Row<'_>) -> GroupRepoResult<(GroupId, MembershipInterval)> {
    let group_text: String = row.get("group_uuid")?;
    let member_text: String = row.get("member_uuid")?;
    let interval = MembershipInterval {
        member: parse_uuid(&member_text, "group_member_history.member_uuid")?,
        joined_at: row.get("joined_at")?,
        left_at: row.get("left_at")?,
    };
    interval
        .validate()
        .map_err(|err| GroupRepoError::InvalidData(err.to_string()))?;
    Ok((
        parse_uuid(&group_text, "group_member_history.group_uuid")?,
        interval,
    ))
}

fn parse_uuid(value: &str, column: &'static str) -> GroupRepoResult<Uuid> {
    parse_uuid_column(value, column).map_err(GroupRepoError::InvalidData)
}
