//! Read-side use-cases: rosters, point-in-time, evolution, classification.
//!
//! # Responsibility
//! - Load one consistent `HistorySnapshot` per call and hand it to the pure
//!   functions in `crate::analytics`.
//! - Resolve organization scope to networks through the network directory.
//! - Validate periods and instants before any computation.
//!
//! # Invariants
//! - Reports never lock writers; a concurrent mutation may or may not be
//!   visible, but a single report never mixes two states.
//! - Evolution series cover every scoped network in every period.

use crate::analytics::classifier::{self, NetworkComposition, RetiredMember};
use crate::analytics::evolution::{self, EvolutionPoint, YearComparison};
use crate::analytics::{point_in_time, roster};
use crate::model::history::HistorySnapshot;
use crate::model::member::{ChurchId, MemberId, Qualification};
use crate::model::network::{GroupId, NetworkId};
use crate::model::period::{
    now_epoch_ms, validate_instant, year_containing, PeriodError, YearMonth, SUPPORTED_YEARS,
};
use crate::repo::directory_repo::{DirectoryError, MemberDirectory, NetworkDirectory};
use crate::repo::group_repo::{GroupRepoError, GroupRepository};
use crate::service::EntityRef;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Months covered by a monthly evolution when not specified.
pub const DEFAULT_EVOLUTION_MONTHS: u32 = 12;
/// Years covered by a yearly evolution when not specified.
pub const DEFAULT_EVOLUTION_YEARS: u32 = 5;

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Errors from analytics use-cases.
#[derive(Debug)]
pub enum AnalyticsError {
    NotFound(EntityRef),
    /// Malformed instant or non-existent period range.
    Validation(String),
    Directory(DirectoryError),
    Groups(GroupRepoError),
}

impl Display for AnalyticsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::Validation(message) => write!(f, "invalid request: {message}"),
            Self::Directory(err) => write!(f, "{err}"),
            Self::Groups(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AnalyticsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Directory(err) => Some(err),
            Self::Groups(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DirectoryError> for AnalyticsError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::MemberNotFound(id) => Self::NotFound(EntityRef::Member(id)),
            DirectoryError::NetworkNotFound(id) => Self::NotFound(EntityRef::Network(id)),
            other => Self::Directory(other),
        }
    }
}

impl From<GroupRepoError> for AnalyticsError {
    fn from(value: GroupRepoError) -> Self {
        match value {
            GroupRepoError::GroupNotFound(id) => Self::NotFound(EntityRef::Group(id)),
            GroupRepoError::NetworkNotFound(id) => Self::NotFound(EntityRef::Network(id)),
            GroupRepoError::MemberNotFound(id) => Self::NotFound(EntityRef::Member(id)),
            other => Self::Groups(other),
        }
    }
}

impl From<PeriodError> for AnalyticsError {
    fn from(value: PeriodError) -> Self {
        Self::Validation(value.to_string())
    }
}

/// Options for a monthly evolution report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvolutionQuery {
    /// Restrict networks to one organization.
    pub org_scope: Option<ChurchId>,
    /// Number of months including the current one. Must be positive.
    pub months_back: u32,
}

impl Default for EvolutionQuery {
    fn default() -> Self {
        Self {
            org_scope: None,
            months_back: DEFAULT_EVOLUTION_MONTHS,
        }
    }
}

/// Options for a yearly evolution report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearlyEvolutionQuery {
    pub org_scope: Option<ChurchId>,
    /// Number of years including the current one. Must be positive.
    pub years_back: u32,
}

impl Default for YearlyEvolutionQuery {
    fn default() -> Self {
        Self {
            org_scope: None,
            years_back: DEFAULT_EVOLUTION_YEARS,
        }
    }
}

/// Analytics facade over group storage and the directories.
pub struct AnalyticsService<G, D>
where
    G: GroupRepository,
    D: MemberDirectory + NetworkDirectory,
{
    groups: G,
    directory: D,
}

impl<G, D> AnalyticsService<G, D>
where
    G: GroupRepository,
    D: MemberDirectory + NetworkDirectory,
{
    pub fn new(groups: G, directory: D) -> Self {
        Self { groups, directory }
    }

    /// Union of current rosters, optionally limited to some networks.
    pub fn all_current_group_member_ids(
        &self,
        networks: Option<&[NetworkId]>,
    ) -> AnalyticsResult<BTreeSet<MemberId>> {
        let snapshot = self.groups.load_snapshot(networks)?;
        Ok(roster::all_current_group_member_ids(&snapshot, networks))
    }

    /// Union of group responsibles, optionally limited to some networks.
    pub fn responsibles_of_groups(
        &self,
        networks: Option<&[NetworkId]>,
    ) -> AnalyticsResult<BTreeSet<MemberId>> {
        let snapshot = self.groups.load_snapshot(networks)?;
        Ok(roster::responsibles_of_groups(&snapshot, networks))
    }

    pub fn is_group_responsible(&self, member: MemberId) -> AnalyticsResult<bool> {
        Ok(self.responsibles_of_groups(None)?.contains(&member))
    }

    /// Active groups the member currently belongs to.
    pub fn groups_of_member(&self, member: MemberId) -> AnalyticsResult<Vec<GroupId>> {
        if self.directory.get_member(member)?.is_none() {
            return Err(AnalyticsError::NotFound(EntityRef::Member(member)));
        }
        let snapshot = self.groups.load_snapshot(None)?;
        Ok(roster::groups_of_member(&snapshot, member))
    }

    /// Groups whose stored roster disagrees with their open intervals.
    pub fn roster_drift(&self) -> AnalyticsResult<Vec<GroupId>> {
        let snapshot = self.groups.load_snapshot(None)?;
        let drifted = roster::roster_drift(&snapshot);
        if !drifted.is_empty() {
            warn!(
                "event=roster_drift module=analytics status=error groups={}",
                drifted.len()
            );
        }
        Ok(drifted)
    }

    /// Members active in `network` at `instant`.
    pub fn active_members_at(
        &self,
        network: NetworkId,
        instant: i64,
    ) -> AnalyticsResult<BTreeSet<MemberId>> {
        let instant = validate_instant(instant)?;
        self.require_network(network)?;
        let snapshot = self
            .groups
            .load_snapshot(Some(std::slice::from_ref(&network)))?;
        Ok(point_in_time::active_members_at(&snapshot, network, instant))
    }

    /// Whether `member` is active in `network` at `instant`.
    pub fn is_member_active_at(
        &self,
        network: NetworkId,
        member: MemberId,
        instant: i64,
    ) -> AnalyticsResult<bool> {
        let instant = validate_instant(instant)?;
        self.require_network(network)?;
        let snapshot = self
            .groups
            .load_snapshot(Some(std::slice::from_ref(&network)))?;
        Ok(point_in_time::is_active_in_network_at(
            &snapshot, network, member, instant,
        ))
    }

    /// Monthly evolution ending with the current month.
    pub fn monthly_evolution(
        &self,
        query: &EvolutionQuery,
    ) -> AnalyticsResult<Vec<EvolutionPoint<YearMonth>>> {
        self.monthly_evolution_as_of(query, now_epoch_ms())
    }

    /// Monthly evolution ending with the month containing `as_of`.
    pub fn monthly_evolution_as_of(
        &self,
        query: &EvolutionQuery,
        as_of: i64,
    ) -> AnalyticsResult<Vec<EvolutionPoint<YearMonth>>> {
        if query.months_back == 0 {
            return Err(AnalyticsError::Validation(
                "months_back must be positive".to_string(),
            ));
        }
        let current = YearMonth::containing(as_of)?;
        let span = i64::from(current.year() - *SUPPORTED_YEARS.start()) * 12
            + i64::from(current.month());
        if i64::from(query.months_back) > span {
            return Err(AnalyticsError::Validation(format!(
                "months_back {} reaches before year {}",
                query.months_back,
                SUPPORTED_YEARS.start()
            )));
        }
        let started_at = Instant::now();
        let (networks, snapshot) = self.scoped_snapshot(query.org_scope)?;
        let series =
            evolution::monthly_evolution(&snapshot, &networks, current, query.months_back)?;
        debug!(
            "event=monthly_evolution module=analytics status=ok months={} networks={} duration_ms={}",
            series.len(),
            networks.len(),
            started_at.elapsed().as_millis()
        );
        Ok(series)
    }

    /// Yearly evolution ending with the current year.
    pub fn yearly_evolution(
        &self,
        query: &YearlyEvolutionQuery,
    ) -> AnalyticsResult<Vec<EvolutionPoint<i32>>> {
        self.yearly_evolution_as_of(query, now_epoch_ms())
    }

    /// Yearly evolution ending with the year containing `as_of`.
    pub fn yearly_evolution_as_of(
        &self,
        query: &YearlyEvolutionQuery,
        as_of: i64,
    ) -> AnalyticsResult<Vec<EvolutionPoint<i32>>> {
        if query.years_back == 0 {
            return Err(AnalyticsError::Validation(
                "years_back must be positive".to_string(),
            ));
        }
        let current_year = year_containing(as_of)?;
        let span = i64::from(current_year) - i64::from(*SUPPORTED_YEARS.start()) + 1;
        if i64::from(query.years_back) > span {
            return Err(AnalyticsError::Validation(format!(
                "years_back {} reaches before year {}",
                query.years_back,
                SUPPORTED_YEARS.start()
            )));
        }
        let started_at = Instant::now();
        let (networks, snapshot) = self.scoped_snapshot(query.org_scope)?;
        let series =
            evolution::yearly_evolution(&snapshot, &networks, current_year, query.years_back)?;
        debug!(
            "event=yearly_evolution module=analytics status=ok years={} networks={} duration_ms={}",
            series.len(),
            networks.len(),
            started_at.elapsed().as_millis()
        );
        Ok(series)
    }

    /// End-of-year counts of every scoped network for two years.
    pub fn year_over_year_comparison(
        &self,
        year1: i32,
        year2: i32,
        org_scope: Option<ChurchId>,
    ) -> AnalyticsResult<Vec<YearComparison>> {
        self.year_over_year_comparison_as_of(year1, year2, org_scope, now_epoch_ms())
    }

    /// Like `year_over_year_comparison`, with years after `as_of` rejected.
    pub fn year_over_year_comparison_as_of(
        &self,
        year1: i32,
        year2: i32,
        org_scope: Option<ChurchId>,
        as_of: i64,
    ) -> AnalyticsResult<Vec<YearComparison>> {
        let current_year = year_containing(as_of)?;
        for year in [year1, year2] {
            if !SUPPORTED_YEARS.contains(&year) {
                return Err(PeriodError::YearOutOfRange(year).into());
            }
            if year > current_year {
                return Err(AnalyticsError::Validation(format!(
                    "year {year} is after current year {current_year}"
                )));
            }
        }
        let (networks, snapshot) = self.scoped_snapshot(org_scope)?;
        Ok(evolution::year_over_year(&snapshot, &networks, year1, year2)?)
    }

    /// Members in no group and without a privileged qualification.
    pub fn isolated_members(
        &self,
        org_scope: Option<ChurchId>,
    ) -> AnalyticsResult<BTreeSet<MemberId>> {
        let members = self.directory.list_members(org_scope)?;
        let snapshot = self.groups.load_snapshot(None)?;
        Ok(classifier::isolated_members(&snapshot, &members))
    }

    /// Members in some group or holding a privileged qualification.
    pub fn non_isolated_members(
        &self,
        org_scope: Option<ChurchId>,
    ) -> AnalyticsResult<BTreeSet<MemberId>> {
        let members = self.directory.list_members(org_scope)?;
        let snapshot = self.groups.load_snapshot(None)?;
        Ok(classifier::non_isolated_members(&snapshot, &members))
    }

    /// Active directory members who left every group they were in.
    pub fn retired_members(&self) -> AnalyticsResult<Vec<RetiredMember>> {
        let known = self.directory.list_by_scope(None)?;
        let snapshot = self.groups.load_snapshot(None)?;
        Ok(classifier::retired_members(&snapshot)
            .into_iter()
            .filter(|retired| known.contains(&retired.member))
            .collect())
    }

    /// Qualification mix of current members for each scoped network.
    pub fn qualification_breakdown(
        &self,
        org_scope: Option<ChurchId>,
    ) -> AnalyticsResult<Vec<NetworkComposition>> {
        let qualifications: BTreeMap<MemberId, Qualification> = self
            .directory
            .list_members(None)?
            .into_iter()
            .map(|member| (member.uuid, member.qualification))
            .collect();
        let (networks, snapshot) = self.scoped_snapshot(org_scope)?;
        Ok(classifier::qualification_breakdown(
            &snapshot,
            &networks,
            &qualifications,
        ))
    }

    fn require_network(&self, network: NetworkId) -> AnalyticsResult<()> {
        self.directory
            .get_network(network)?
            .map(|_| ())
            .ok_or(AnalyticsError::NotFound(EntityRef::Network(network)))
    }

    fn scoped_snapshot(
        &self,
        org_scope: Option<ChurchId>,
    ) -> AnalyticsResult<(Vec<NetworkId>, HistorySnapshot)> {
        let networks: Vec<NetworkId> = self
            .directory
            .list_networks(org_scope)?
            .into_iter()
            .map(|network| network.uuid)
            .collect();
        let snapshot = self.groups.load_snapshot(Some(&networks))?;
        Ok((networks, snapshot))
    }
}
