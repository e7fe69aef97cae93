//! A maximal volcanic eruption: mass extinction with lottery survivors.

mod common;

use common::{engine_with_seed_world, insert_species, natural, pressure, refill_energy, run_rounds, SpeciesSpec};
use deeptime_data::{DietType, HabitatType, PressureKind, SpeciesStatus};

#[tokio::test]
async fn test_volcanic_catastrophe_mass_extinction() {
    let engine = engine_with_seed_world();
    // Grow the world to 20 distributed lineages with varied tolerances.
    for i in 0u8..17 {
        let code = format!("{}1", char::from(b'D' + i));
        let species = insert_species(
            &engine,
            SpeciesSpec {
                code: &code,
                trophic_level: 1.0 + (i % 3) as f64 * 0.5,
                diet: if i % 3 == 0 {
                    DietType::Autotroph
                } else {
                    DietType::Detritivore
                },
                habitat: if i % 2 == 0 {
                    HabitatType::Marine
                } else {
                    HabitatType::Coastal
                },
                population: 50_000 + i as u64 * 40_000,
                body_length_cm: 0.001 + i as f64 * 0.002,
                body_weight_g: 1e-6,
                prey: &[],
            },
        );
        // A spread of environmental tolerances feeds the lottery odds.
        let mut sp = species;
        let tolerance = 1.0 + (i % 10) as f64;
        for name in ["cold_resistance", "heat_resistance", "drought_resistance", "salinity_resistance"] {
            sp.abstract_traits.insert(name.to_string(), tolerance.min(9.0));
        }
        engine.db.species().upsert(&mut sp).unwrap();
    }
    assert_eq!(common::alive(&engine).len(), 20);

    // One settling turn so every lineage holds habitat, then the blast.
    let _ = run_rounds(&engine, 1, vec![natural()]).await;
    refill_energy(&engine);
    let reports = run_rounds(&engine, 1, vec![pressure(PressureKind::VolcanicEruption, 10.0)]).await;
    let blast = &reports[0];

    // Settle the aftermath.
    refill_energy(&engine);
    let _ = run_rounds(&engine, 2, vec![natural()]).await;

    let all = engine.db.species().list_all().unwrap();
    let original: Vec<_> = all.iter().filter(|s| s.created_turn == 0).collect();
    let extinct = original
        .iter()
        .filter(|s| s.status == SpeciesStatus::Extinct)
        .count();
    assert!(
        extinct * 2 >= original.len(),
        "only {extinct} of {} lineages went extinct",
        original.len()
    );

    // The lottery and youth advantages leave at least one lineage standing.
    let survivors = all
        .iter()
        .filter(|s| s.status == SpeciesStatus::Alive)
        .count();
    assert!(survivors >= 1, "the eruption sterilized the whole world");

    // During the blast itself, nobody both survived and exceeded the
    // extinction threshold.
    for snapshot in &blast.species {
        if snapshot.status == SpeciesStatus::Alive {
            assert!(snapshot.death_rate < 0.95);
        }
    }
}
