//! A hard glacial period stresses the seed world without wiping it out.

mod common;

use common::{engine_with_seed_world, pressure, run_rounds};
use deeptime_data::PressureKind;

#[tokio::test]
async fn test_glacial_period_hurts_but_does_not_exterminate() {
    let engine = engine_with_seed_world();
    let before: Vec<(String, u64)> = common::alive(&engine)
        .iter()
        .map(|s| (s.lineage_code.clone(), s.population))
        .collect();

    let reports = run_rounds(&engine, 1, vec![pressure(PressureKind::GlacialPeriod, 8.0)]).await;
    let report = &reports[0];

    assert!(
        report.narrative.contains("glacial"),
        "narrative should reference the cold: {}",
        report.narrative
    );

    // Someone takes serious losses.
    let max_death = report
        .species
        .iter()
        .map(|s| s.death_rate)
        .fold(0.0f64, f64::max);
    assert!(max_death > 0.3, "max death rate {max_death:.2} too mild");

    // Everyone loses ground, nobody disappears in a single turn.
    for (code, population_before) in before {
        let after = engine
            .db
            .species()
            .get(&code)
            .unwrap()
            .expect("still addressable");
        assert_eq!(after.status, deeptime_data::SpeciesStatus::Alive, "{code} went extinct");
        assert!(
            after.population < population_before,
            "{code} grew during a glacial shock"
        );
    }
}
