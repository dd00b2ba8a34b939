//! Membership history and network analytics core.
//! This crate is the single source of truth for group membership invariants.

pub mod analytics;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use analytics::classifier::{NetworkComposition, RetiredMember};
pub use analytics::evolution::{
    growth_rate, growth_series, EvolutionPoint, GrowthRate, GrowthStep, YearComparison,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::history::{GroupHistory, HistorySnapshot, MembershipInterval};
pub use model::member::{ChurchId, Member, MemberId, Qualification};
pub use model::network::{Group, GroupId, Network, NetworkId};
pub use model::period::{PeriodError, YearMonth};
pub use repo::directory_repo::{
    DirectoryError, DirectoryResult, MemberDirectory, NetworkDirectory, NewMember, NewNetwork,
    SqliteDirectoryRepository,
};
pub use repo::group_repo::{
    GroupRepoError, GroupRepoResult, GroupRepository, NewGroup, SqliteGroupRepository,
};
pub use service::analytics_service::{
    AnalyticsError, AnalyticsResult, AnalyticsService, EvolutionQuery, YearlyEvolutionQuery,
};
pub use service::membership_service::{MembershipError, MembershipResult, MembershipService};
pub use service::EntityRef;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
