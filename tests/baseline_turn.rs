//! A calm first turn on the three-producer seed world.

mod common;

use common::{engine_with_seed_world, natural, run_rounds};

#[tokio::test]
async fn test_baseline_turn_keeps_all_producers() {
    let engine = engine_with_seed_world();
    let initial: Vec<(String, u64)> = common::alive(&engine)
        .iter()
        .map(|s| (s.lineage_code.clone(), s.population))
        .collect();

    let reports = run_rounds(&engine, 1, vec![natural()]).await;
    assert_eq!(reports.len(), 1);
    let report = &reports[0];

    assert_eq!(report.species.len(), 3);
    assert!(report.branching_events.is_empty());
    assert!(report
        .species
        .iter()
        .all(|s| s.status == deeptime_data::SpeciesStatus::Alive));

    // Populations drift, but stay within a factor of 3 either way.
    for (code, before) in initial {
        let after = engine
            .db
            .species()
            .get(&code)
            .unwrap()
            .expect("species survives")
            .population;
        assert!(after > 0, "{code} died out on a calm turn");
        let ratio = after as f64 / before as f64;
        assert!(
            (0.5..=3.0).contains(&ratio),
            "{code} moved {before} -> {after} (x{ratio:.2})"
        );
    }
}

#[tokio::test]
async fn test_zero_rounds_is_rejected_but_empty_pressures_ok() {
    let engine = engine_with_seed_world();
    // rounds are clamped into [1, 32] by the engine; empty pressure list is
    // a legal natural turn.
    let reports = run_rounds(&engine, 1, vec![]).await;
    assert_eq!(reports[0].species.len(), 3);
}
