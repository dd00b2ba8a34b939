//! Member and network directory contracts with SQLite implementation.
//!
//! # Responsibility
//! - Expose the member directory (qualification lookup, scoped listing).
//! - Expose the network directory and its `mark_responsable` hook.
//! - Provide the minimal CRUD writes the membership core depends on.
//!
//! # Invariants
//! - Creating a network marks each responsible member `Responsable réseau`
//!   in the same transaction as the insert.
//! - Deleting a member tombstones it and force-closes its open intervals;
//!   history rows are never removed.

use crate::db::DbError;
use crate::model::member::{ChurchId, Member, MemberId, Qualification};
use crate::model::network::{Network, NetworkId};
use crate::repo::{check_schema, parse_bool_column, parse_uuid_column, SchemaProblem};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const MEMBER_SELECT_SQL: &str = "SELECT
    uuid,
    display_name,
    qualification,
    church_uuid,
    is_deleted
FROM members";

const NETWORK_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    responsable1_uuid,
    responsable2_uuid,
    church_uuid
FROM networks";

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors from directory reads and writes.
#[derive(Debug)]
pub enum DirectoryError {
    Db(DbError),
    MemberNotFound(MemberId),
    NetworkNotFound(NetworkId),
    ChurchNotFound(ChurchId),
    /// Another network already uses this name.
    DuplicateNetworkName(String),
    /// Name is blank after trim.
    InvalidName,
    Schema(SchemaProblem),
    InvalidData(String),
}

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::MemberNotFound(id) => write!(f, "member not found: {id}"),
            Self::NetworkNotFound(id) => write!(f, "network not found: {id}"),
            Self::ChurchNotFound(id) => write!(f, "church not found: {id}"),
            Self::DuplicateNetworkName(name) => write!(f, "network name already used: `{name}`"),
            Self::InvalidName => write!(f, "name must not be blank"),
            Self::Schema(problem) => write!(f, "directory schema not ready: {problem:?}"),
            Self::InvalidData(message) => write!(f, "invalid directory data: {message}"),
        }
    }
}

impl Error for DirectoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for DirectoryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for DirectoryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Input for creating a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
    pub display_name: String,
    pub qualification: Qualification,
    pub church: Option<ChurchId>,
}

/// Input for creating a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNetwork {
    pub name: String,
    pub responsable1: MemberId,
    pub responsable2: Option<MemberId>,
    pub church: Option<ChurchId>,
}

/// Read side of the member directory consumed by the analytics core.
pub trait MemberDirectory {
    /// Loads one member, including tombstoned ones.
    fn get_member(&self, id: MemberId) -> DirectoryResult<Option<Member>>;
    /// Returns the qualification of an active member.
    fn get_qualification(&self, id: MemberId) -> DirectoryResult<Qualification>;
    /// Active member ids, restricted to `scope` when given.
    fn list_by_scope(&self, scope: Option<ChurchId>) -> DirectoryResult<BTreeSet<MemberId>>;
    /// Active members, restricted to `scope` when given.
    fn list_members(&self, scope: Option<ChurchId>) -> DirectoryResult<Vec<Member>>;
}

/// Network directory consumed by the analytics core.
pub trait NetworkDirectory {
    fn get_network(&self, id: NetworkId) -> DirectoryResult<Option<Network>>;
    /// Networks ordered by name, restricted to `scope` when given.
    fn list_networks(&self, scope: Option<ChurchId>) -> DirectoryResult<Vec<Network>>;
    /// Marks a member `Responsable réseau`.
    fn mark_responsable(&self, member: MemberId) -> DirectoryResult<()>;
}

/// SQLite-backed member and network directory.
pub struct SqliteDirectoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDirectoryRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> DirectoryResult<Self> {
        if let Some(problem) = check_schema(conn, &["churches", "members", "networks"])? {
            return Err(DirectoryError::Schema(problem));
        }
        Ok(Self { conn })
    }

    pub fn create_church(&self, name: &str) -> DirectoryResult<ChurchId> {
        let name = normalize_name(name)?;
        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO churches (uuid, name) VALUES (?1, ?2);",
            params![uuid.to_string(), name],
        )?;
        Ok(uuid)
    }

    pub fn create_member(&self, new_member: &NewMember) -> DirectoryResult<Member> {
        let display_name = normalize_name(&new_member.display_name)?;
        if let Some(church) = new_member.church {
            ensure_church_exists(self.conn, church)?;
        }

        let member = Member {
            uuid: Uuid::new_v4(),
            display_name,
            qualification: new_member.qualification,
            church: new_member.church,
            is_deleted: false,
        };
        self.conn.execute(
            "INSERT INTO members (uuid, display_name, qualification, church_uuid, is_deleted)
             VALUES (?1, ?2, ?3, ?4, 0);",
            params![
                member.uuid.to_string(),
                member.display_name.as_str(),
                member.qualification.label(),
                member.church.map(|value| value.to_string()),
            ],
        )?;
        Ok(member)
    }

    pub fn set_qualification(
        &self,
        id: MemberId,
        qualification: Qualification,
    ) -> DirectoryResult<()> {
        update_qualification(self.conn, id, qualification)
    }

    /// Tombstones a member and closes every open interval it holds at `at`.
    ///
    /// Returns the number of intervals that were closed.
    pub fn delete_member(&self, id: MemberId, at: i64) -> DirectoryResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE members
             SET is_deleted = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(DirectoryError::MemberNotFound(id));
        }

        // An interval joined after `at` is closed at its own join instant.
        let closed = tx.execute(
            "UPDATE group_member_history
             SET left_at = MAX(joined_at, ?2)
             WHERE member_uuid = ?1
               AND left_at IS NULL;",
            params![id.to_string(), at],
        )?;
        tx.execute(
            "DELETE FROM group_members WHERE member_uuid = ?1;",
            [id.to_string()],
        )?;
        tx.commit()?;

        info!(
            "event=member_delete module=directory status=ok member_id={} closed_intervals={}",
            id, closed
        );
        Ok(closed)
    }

    /// Creates a network and marks its responsibles in one transaction.
    pub fn create_network(&self, new_network: &NewNetwork) -> DirectoryResult<Network> {
        let name = normalize_name(&new_network.name)?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let taken: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM networks WHERE name = ?1);",
            [name.as_str()],
            |row| row.get(0),
        )?;
        if taken == 1 {
            return Err(DirectoryError::DuplicateNetworkName(name));
        }
        if let Some(church) = new_network.church {
            ensure_church_exists(&tx, church)?;
        }

        let network = Network {
            uuid: Uuid::new_v4(),
            name,
            responsable1: new_network.responsable1,
            responsable2: new_network.responsable2,
            church: new_network.church,
        };
        for member in network.responsables() {
            ensure_active_member(&tx, member)?;
        }

        tx.execute(
            "INSERT INTO networks (uuid, name, responsable1_uuid, responsable2_uuid, church_uuid)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                network.uuid.to_string(),
                network.name.as_str(),
                network.responsable1.to_string(),
                network.responsable2.map(|value| value.to_string()),
                network.church.map(|value| value.to_string()),
            ],
        )?;
        // The hook writes through the creating transaction, so the marks
        // commit or roll back together with the insert.
        let hook = SqliteDirectoryRepository { conn: &tx };
        for member in network.responsables() {
            hook.mark_responsable(member)?;
        }
        tx.commit()?;

        info!(
            "event=network_create module=directory status=ok network_id={} responsables={}",
            network.uuid,
            network.responsables().count()
        );
        Ok(network)
    }
}

impl MemberDirectory for SqliteDirectoryRepository<'_> {
    fn get_member(&self, id: MemberId) -> DirectoryResult<Option<Member>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MEMBER_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_member_row(row)?));
        }
        Ok(None)
    }

    fn get_qualification(&self, id: MemberId) -> DirectoryResult<Qualification> {
        match self.get_member(id)? {
            Some(member) if !member.is_deleted => Ok(member.qualification),
            _ => Err(DirectoryError::MemberNotFound(id)),
        }
    }

    fn list_by_scope(&self, scope: Option<ChurchId>) -> DirectoryResult<BTreeSet<MemberId>> {
        Ok(self
            .list_members(scope)?
            .into_iter()
            .map(|member| member.uuid)
            .collect())
    }

    fn list_members(&self, scope: Option<ChurchId>) -> DirectoryResult<Vec<Member>> {
        let mut members = Vec::new();
        match scope {
            Some(church) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{MEMBER_SELECT_SQL}
                     WHERE is_deleted = 0
                       AND church_uuid = ?1
                     ORDER BY uuid ASC;"
                ))?;
                let mut rows = stmt.query([church.to_string()])?;
                while let Some(row) = rows.next()? {
                    members.push(parse_member_row(row)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{MEMBER_SELECT_SQL}
                     WHERE is_deleted = 0
                     ORDER BY uuid ASC;"
                ))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    members.push(parse_member_row(row)?);
                }
            }
        }
        Ok(members)
    }
}

impl NetworkDirectory for SqliteDirectoryRepository<'_> {
    fn get_network(&self, id: NetworkId) -> DirectoryResult<Option<Network>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NETWORK_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_network_row(row)?));
        }
        Ok(None)
    }

    fn list_networks(&self, scope: Option<ChurchId>) -> DirectoryResult<Vec<Network>> {
        let mut networks = Vec::new();
        let (sql, bind) = match scope {
            Some(church) => (
                format!("{NETWORK_SELECT_SQL} WHERE church_uuid = ?1 ORDER BY name ASC;"),
                Some(church.to_string()),
            ),
            None => (format!("{NETWORK_SELECT_SQL} ORDER BY name ASC;"), None),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = match bind {
            Some(church) => stmt.query([church])?,
            None => stmt.query([])?,
        };
        while let Some(row) = rows.next()? {
            networks.push(parse_network_row(row)?);
        }
        Ok(networks)
    }

    fn mark_responsable(&self, member: MemberId) -> DirectoryResult<()> {
        update_qualification(self.conn, member, Qualification::ResponsableReseau)?;
        debug!(
            "event=mark_responsable module=directory status=ok member_id={}",
            member
        );
        Ok(())
    }
}

fn update_qualification(
    conn: &Connection,
    id: MemberId,
    qualification: Qualification,
) -> DirectoryResult<()> {
    let changed = conn.execute(
        "UPDATE members
         SET qualification = ?2,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?1
           AND is_deleted = 0;",
        params![id.to_string(), qualification.label()],
    )?;
    if changed == 0 {
        return Err(DirectoryError::MemberNotFound(id));
    }
    Ok(())
}

fn ensure_active_member(conn: &Connection, id: MemberId) -> DirectoryResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM members WHERE uuid = ?1 AND is_deleted = 0);",
        [id.to_string()],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(DirectoryError::MemberNotFound(id));
    }
    Ok(())
}

fn ensure_church_exists(conn: &Connection, id: ChurchId) -> DirectoryResult<()> {
    let found: Option<String> = conn
        .query_row(
            "SELECT uuid FROM churches WHERE uuid = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    found.map(|_| ()).ok_or(DirectoryError::ChurchNotFound(id))
}

fn normalize_name(value: &str) -> DirectoryResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DirectoryError::InvalidName);
    }
    Ok(trimmed.to_string())
}

fn parse_member_row(row: &Row<'_>) -> DirectoryResult<Member> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid_column(&uuid_text, "members.uuid").map_err(DirectoryError::InvalidData)?;

    let qualification_text: String = row.get("qualification")?;
    let qualification = Qualification::from_label(&qualification_text).ok_or_else(|| {
        DirectoryError::InvalidData(format!(
            "invalid qualification `{qualification_text}` in members.qualification"
        ))
    })?;

    let church = row
        .get::<_, Option<String>>("church_uuid")?
        .map(|value| parse_uuid_column(&value, "members.church_uuid"))
        .transpose()
        .map_err(DirectoryError::InvalidData)?;

    let is_deleted = parse_bool_column(row.get("is_deleted")?, "members.is_deleted")
        .map_err(DirectoryError::InvalidData)?;

    Ok(Member {
        uuid,
        display_name: row.get("display_name")?,
        qualification,
        church,
        is_deleted,
    })
}

fn parse_network_row(row: &Row<'_>) -> DirectoryResult<Network> {
    let parse = |column: &'static str, value: String| {
        parse_uuid_column(&value, column).map_err(DirectoryError::InvalidData)
    };

    let uuid = parse("networks.uuid", row.get("uuid")?)?;
    let responsable1 = parse("networks.responsable1_uuid", row.get("responsable1_uuid")?)?;
    let responsable2 = row
        .get::<_, Option<String>>("responsable2_uuid")?
        .map(|value| parse("networks.responsable2_uuid", value))
        .transpose()?;
    let church = row
        .get::<_, Option<String>>("church_uuid")?
        .map(|value| parse("networks.church_uuid", value))
        .transpose()?;

    Ok(Network {
        uuid,
        name: row.get("name")?,
        responsable1,
        responsable2,
        church,
    })
}
