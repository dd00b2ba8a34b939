//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `reseau_core` linkage.
//! - With a database path argument, print the monthly evolution report.
//! - Keep output deterministic for quick local sanity checks.

use reseau_core::db::open_db;
use reseau_core::{
    AnalyticsService, EvolutionQuery, GrowthRate, SqliteDirectoryRepository,
    SqliteGroupRepository,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("reseau_core ping={}", reseau_core::ping());
    println!("reseau_core version={}", reseau_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match print_monthly_evolution(&db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_monthly_evolution(db_path: &str) -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("RESEAU_LOG_DIR") {
        reseau_core::init_logging(reseau_core::default_log_level(), &log_dir)?;
    }

    let conn = open_db(db_path)?;
    let groups = SqliteGroupRepository::try_new(&conn)?;
    let directory = SqliteDirectoryRepository::try_new(&conn)?;
    let service = AnalyticsService::new(groups, directory);

    let series = service.monthly_evolution(&EvolutionQuery::default())?;
    for point in &series {
        let total: usize = point.per_network.values().sum();
        println!(
            "period={} networks={} active_members={}",
            point.period,
            point.per_network.len(),
            total
        );
    }
    for step in reseau_core::growth_series(&series) {
        let new_networks = step
            .per_network
            .values()
            .filter(|rate| **rate == GrowthRate::New)
            .count();
        println!(
            "growth from={} to={} new_networks={}",
            step.from, step.to, new_networks
        );
    }

    let drifted = service.roster_drift()?;
    println!("roster_drift groups={}", drifted.len());
    log::info!(
        "event=cli_report module=cli status=ok periods={} drifted_groups={}",
        series.len(),
        drifted.len()
    );
    Ok(())
}
