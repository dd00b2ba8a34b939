//! Monthly and yearly series of per-network membership counts.
//!
//! # Invariants
//! - Series are contiguous, oldest first, one entry per calendar period.
//! - Every requested network appears in every entry (zero-filled).
//! - Growth from zero to a positive count is `GrowthRate::New`, never a number.

use crate::analytics::point_in_time::active_counts_at;
use crate::model::history::HistorySnapshot;
use crate::model::network::NetworkId;
use crate::model::period::{year_last_instant_ms, PeriodError, YearMonth, SUPPORTED_YEARS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-network active member counts for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionPoint<P> {
    pub period: P,
    pub per_network: BTreeMap<NetworkId, usize>,
}

/// Counts of one network at the end of two compared years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearComparison {
    pub network: NetworkId,
    pub count_year1: usize,
    pub count_year2: usize,
}

/// Change between two adjacent periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GrowthRate {
    /// Rounded percentage change.
    Percent(i64),
    /// Previous count was zero and current count is positive.
    New,
}

/// Per-network growth between two adjacent periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthStep<P> {
    pub from: P,
    pub to: P,
    pub per_network: BTreeMap<NetworkId, GrowthRate>,
}

/// Classifies the change from `previous` to `current`.
///
/// `0 -> 0` is stable (`Percent(0)`), `0 -> n` is `New`, anything else is
/// `round((current - previous) / previous * 100)`.
pub fn growth_rate(previous: usize, current: usize) -> GrowthRate {
    if previous == 0 {
        return if current == 0 {
            GrowthRate::Percent(0)
        } else {
            GrowthRate::New
        };
    }
    let delta = current as f64 - previous as f64;
    GrowthRate::Percent((delta / previous as f64 * 100.0).round() as i64)
}

/// Monthly series for the `months_back` months ending with `current`.
///
/// Each month is sampled at its last millisecond.
pub fn monthly_evolution(
    snapshot: &HistorySnapshot,
    networks: &[NetworkId],
    current: YearMonth,
    months_back: u32,
) -> Result<Vec<EvolutionPoint<YearMonth>>, PeriodError> {
    current
        .window_ending_at(months_back)?
        .into_iter()
        .map(|period| {
            let instant = period.last_instant_ms()?;
            Ok(EvolutionPoint {
                period,
                per_network: active_counts_at(snapshot, networks, instant),
            })
        })
        .collect()
}

/// Yearly series for the `years_back` years ending with `current_year`.
///
/// Each year is sampled at Dec 31 23:59:59.999 UTC. Fails when the first
/// year falls outside `SUPPORTED_YEARS`.
pub fn yearly_evolution(
    snapshot: &HistorySnapshot,
    networks: &[NetworkId],
    current_year: i32,
    years_back: u32,
) -> Result<Vec<EvolutionPoint<i32>>, PeriodError> {
    if years_back == 0 {
        return Ok(Vec::new());
    }
    let first_year = i32::try_from(years_back - 1)
        .ok()
        .and_then(|back| current_year.checked_sub(back))
        .ok_or(PeriodError::YearOutOfRange(i32::MIN))?;
    if !SUPPORTED_YEARS.contains(&first_year) {
        return Err(PeriodError::YearOutOfRange(first_year));
    }
    (first_year..=current_year)
        .map(|year| {
            let instant = year_last_instant_ms(year)?;
            Ok(EvolutionPoint {
                period: year,
                per_network: active_counts_at(snapshot, networks, instant),
            })
        })
        .collect()
}

/// Pairs each network's end-of-year counts for `year1` and `year2`.
pub fn year_over_year(
    snapshot: &HistorySnapshot,
    networks: &[NetworkId],
    year1: i32,
    year2: i32,
) -> Result<Vec<YearComparison>, PeriodError> {
    let first = active_counts_at(snapshot, networks, year_last_instant_ms(year1)?);
    let second = active_counts_at(snapshot, networks, year_last_instant_ms(year2)?);
    Ok(networks
        .iter()
        .map(|network| YearComparison {
            network: *network,
            count_year1: first.get(network).copied().unwrap_or(0),
            count_year2: second.get(network).copied().unwrap_or(0),
        })
        .collect())
}

/// Growth between each pair of adjacent points of `series`.
///
/// A network missing from one side of a pair counts as zero there.
pub fn growth_series<P: Clone>(series: &[EvolutionPoint<P>]) -> Vec<GrowthStep<P>> {
    series
        .windows(2)
        .map(|pair| {
            let (previous, current) = (&pair[0], &pair[1]);
            let per_network = previous
                .per_network
                .keys()
                .chain(current.per_network.keys())
                .map(|network| {
                    let before = previous.per_network.get(network).copied().unwrap_or(0);
                    let after = current.per_network.get(network).copied().unwrap_or(0);
                    (*network, growth_rate(before, after))
                })
                .collect();
            GrowthStep {
                from: previous.period.clone(),
                to: current.period.clone(),
                per_network,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn growth_rate_boundaries() {
        assert_eq!(growth_rate(0, 5), GrowthRate::New);
        assert_eq!(growth_rate(0, 0), GrowthRate::Percent(0));
        assert_eq!(growth_rate(10, 15), GrowthRate::Percent(50));
        assert_eq!(growth_rate(10, 5), GrowthRate::Percent(-50));
        assert_eq!(growth_rate(3, 0), GrowthRate::Percent(-100));
    }

    #[test]
    fn growth_rate_rounds_to_nearest_percent() {
        assert_eq!(growth_rate(3, 4), GrowthRate::Percent(33));
        assert_eq!(growth_rate(3, 5), GrowthRate::Percent(67));
    }

    #[test]
    fn growth_rate_serializes_new_without_a_number() {
        let new = serde_json::to_value(GrowthRate::New).unwrap();
        assert_eq!(new, serde_json::json!({ "kind": "new" }));
        let percent = serde_json::to_value(GrowthRate::Percent(-50)).unwrap();
        assert_eq!(percent, serde_json::json!({ "kind": "percent", "value": -50 }));
    }

    #[test]
    fn growth_series_zero_fills_missing_networks() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let series = vec![
            EvolutionPoint {
                period: 2023,
                per_network: BTreeMap::from([(a, 10)]),
            },
            EvolutionPoint {
                period: 2024,
                per_network: BTreeMap::from([(a, 15), (b, 2)]),
            },
        ];
        let steps = growth_series(&series);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].from, 2023);
        assert_eq!(steps[0].to, 2024);
        assert_eq!(steps[0].per_network[&a], GrowthRate::Percent(50));
        assert_eq!(steps[0].per_network[&b], GrowthRate::New);
    }

    #[test]
    fn empty_snapshot_still_yields_contiguous_zero_filled_months() {
        let network = Uuid::new_v4();
        let current = YearMonth::new(2025, 3).unwrap();
        let series =
            monthly_evolution(&HistorySnapshot::default(), &[network], current, 4).unwrap();
        let periods: Vec<String> = series.iter().map(|p| p.period.to_string()).collect();
        assert_eq!(periods, vec!["2024-12", "2025-01", "2025-02", "2025-03"]);
        assert!(series.iter().all(|p| p.per_network[&network] == 0));
    }

    #[test]
    fn yearly_evolution_with_zero_years_is_empty() {
        let series = yearly_evolution(&HistorySnapshot::default(), &[], 2025, 0).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn yearly_evolution_rejects_windows_before_supported_years() {
        let snapshot = HistorySnapshot::default();
        assert!(matches!(
            yearly_evolution(&snapshot, &[], 2025, 1 << 31),
            Err(PeriodError::YearOutOfRange(year)) if year < 1900
        ));
        assert_eq!(
            yearly_evolution(&snapshot, &[], 2025, u32::MAX).unwrap_err(),
            PeriodError::YearOutOfRange(i32::MIN)
        );
        assert_eq!(
            yearly_evolution(&snapshot, &[], 1901, 3).unwrap_err(),
            PeriodError::YearOutOfRange(1899)
        );
        assert_eq!(yearly_evolution(&snapshot, &[], 1901, 2).unwrap().len(), 2);
    }

    #[test]
    fn monthly_evolution_rejects_oversized_windows() {
        let current = YearMonth::new(2025, 3).unwrap();
        let err = monthly_evolution(&HistorySnapshot::default(), &[], current, u32::MAX)
            .unwrap_err();
        assert!(matches!(err, PeriodError::YearOutOfRange(year) if year < 1900));
    }
}
