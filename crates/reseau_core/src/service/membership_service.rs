//! Membership write path and group roster reads.
//!
//! # Responsibility
//! - Add members to and remove members from groups, defaulting the instant
//!   to now.
//! - Expose the current roster and full history of one group.
//! - Create and delete groups without ever erasing history.
//!
//! # Invariants
//! - `add_member` on an active membership fails with `Conflict`.
//! - `remove_member` without an active membership fails with `NotFound`.
//! - The service never retries; callers decide how to surface failures.

use crate::model::history::MembershipInterval;
use crate::model::member::MemberId;
use crate::model::network::{Group, GroupId};
use crate::model::period::{now_epoch_ms, validate_instant, PeriodError};
use crate::repo::group_repo::{GroupRepoError, GroupRepository, NewGroup};
use crate::service::EntityRef;
use log::{info, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type MembershipResult<T> = Result<T, MembershipError>;

/// Errors from membership use-cases.
#[derive(Debug)]
pub enum MembershipError {
    /// The member already has an open interval in the group.
    Conflict { group: GroupId, member: MemberId },
    /// Referenced group, network, member, or open membership does not exist.
    NotFound(EntityRef),
    /// Instant is malformed or out of order with existing history.
    Validation(String),
    /// Persistence-layer failure.
    Storage(GroupRepoError),
}

impl MembershipError {
    /// Stable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
        }
    }
}

impl Display for MembershipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict { group, member } => {
                write!(f, "member {member} is already in group {group}")
            }
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::Validation(message) => write!(f, "invalid request: {message}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MembershipError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GroupRepoError> for MembershipError {
    fn from(value: GroupRepoError) -> Self {
        match value {
            GroupRepoError::GroupNotFound(id) => Self::NotFound(EntityRef::Group(id)),
            GroupRepoError::NetworkNotFound(id) => Self::NotFound(EntityRef::Network(id)),
            GroupRepoError::MemberNotFound(id) => Self::NotFound(EntityRef::Member(id)),
            GroupRepoError::AlreadyMember { group, member } => Self::Conflict { group, member },
            GroupRepoError::NotAMember { group, member } => {
                Self::NotFound(EntityRef::Membership { group, member })
            }
            err @ GroupRepoError::InstantBeforeBound { .. } => Self::Validation(err.to_string()),
            other => Self::Storage(other),
        }
    }
}

impl From<PeriodError> for MembershipError {
    fn from(value: PeriodError) -> Self {
        Self::Validation(value.to_string())
    }
}

/// Membership service facade over a group repository.
pub struct MembershipService<R: GroupRepository> {
    repo: R,
}

impl<R: GroupRepository> MembershipService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Opens a membership of `member` in `group` at `at` (default: now).
    pub fn add_member(
        &self,
        group: GroupId,
        member: MemberId,
        at: Option<i64>,
    ) -> MembershipResult<()> {
        let started_at = Instant::now();
        let result = resolve_instant(at)
            .and_then(|at| self.repo.open_interval(group, member, at).map_err(Into::into));
        log_mutation("member_add", group, member, started_at, &result);
        result
    }

    /// Closes the open membership of `member` in `group` at `at` (default: now).
    ///
    /// Returns the closed interval.
    pub fn remove_member(
        &self,
        group: GroupId,
        member: MemberId,
        at: Option<i64>,
    ) -> MembershipResult<MembershipInterval> {
        let started_at = Instant::now();
        let result = resolve_instant(at)
            .and_then(|at| self.repo.close_interval(group, member, at).map_err(Into::into));
        log_mutation("member_remove", group, member, started_at, &result);
        result
    }

    /// Current roster of an active group.
    pub fn current_members_of_group(&self, group: GroupId) -> MembershipResult<BTreeSet<MemberId>> {
        self.repo.roster(group).map_err(Into::into)
    }

    /// Ordered interval log of a group, deleted groups included.
    pub fn membership_history(&self, group: GroupId) -> MembershipResult<Vec<MembershipInterval>> {
        self.repo.history(group).map_err(Into::into)
    }

    pub fn create_group(&self, new_group: &NewGroup) -> MembershipResult<Group> {
        let group = self.repo.create_group(new_group)?;
        info!(
            "event=group_create module=membership status=ok group_id={} network_id={}",
            group.uuid, group.network
        );
        Ok(group)
    }

    /// Deletes a group, closing its open intervals at `at` (default: now).
    ///
    /// Returns the number of intervals closed.
    pub fn delete_group(&self, group: GroupId, at: Option<i64>) -> MembershipResult<usize> {
        let at = resolve_instant(at)?;
        let closed = self.repo.delete_group(group, at)?;
        info!(
            "event=group_delete module=membership status=ok group_id={} closed_intervals={}",
            group, closed
        );
        Ok(closed)
    }
}

fn resolve_instant(at: Option<i64>) -> MembershipResult<i64> {
    match at {
        Some(at) => Ok(validate_instant(at)?),
        None => Ok(now_epoch_ms()),
    }
}

fn log_mutation<T>(
    event: &str,
    group: GroupId,
    member: MemberId,
    started_at: Instant,
    result: &MembershipResult<T>,
) {
    match result {
        Ok(_) => info!(
            "event={} module=membership status=ok group_id={} member_id={} duration_ms={}",
            event,
            group,
            member,
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={} module=membership status=error group_id={} member_id={} duration_ms={} error_code={}",
            event,
            group,
            member,
            started_at.elapsed().as_millis(),
            err.code()
        ),
    }
}
