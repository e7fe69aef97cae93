//! Removing the base of a food chain starves the chain above it.

mod common;

use common::{engine_with_seed_world, insert_species, natural, refill_energy, run_rounds, SpeciesSpec};
use deeptime_data::{DietType, HabitatType};

#[tokio::test]
async fn test_prey_removal_starves_the_chain() {
    let engine = engine_with_seed_world();
    insert_species(
        &engine,
        SpeciesSpec {
            code: "P1",
            trophic_level: 2.0,
            diet: DietType::Herbivore,
            habitat: HabitatType::Marine,
            population: 500_000,
            body_length_cm: 0.5,
            body_weight_g: 0.1,
            prey: &[("A1", 1.0)],
        },
    );
    insert_species(
        &engine,
        SpeciesSpec {
            code: "Q1",
            trophic_level: 3.0,
            diet: DietType::Carnivore,
            habitat: HabitatType::Marine,
            population: 20_000,
            body_length_cm: 5.0,
            body_weight_g: 50.0,
            prey: &[("P1", 1.0)],
        },
    );

    // Baseline turn with the full chain intact.
    let baseline = run_rounds(&engine, 1, vec![natural()]).await;
    let q1_baseline_death = baseline[0]
        .species
        .iter()
        .find(|s| s.lineage_code == "Q1")
        .map(|s| s.death_rate)
        .unwrap_or(0.0);

    // Pull the producer out from under the chain.
    assert!(engine.db.species().remove("A1").unwrap());

    let mut p1_peak_death = 0.0f64;
    let mut q1_final_death = 0.0f64;
    for _ in 0..3 {
        refill_energy(&engine);
        let reports = run_rounds(&engine, 1, vec![natural()]).await;
        for snapshot in &reports[0].species {
            if snapshot.lineage_code == "P1" {
                p1_peak_death = p1_peak_death.max(snapshot.death_rate);
            }
            if snapshot.lineage_code == "Q1" {
                q1_final_death = q1_final_death.max(snapshot.death_rate);
            }
        }
    }

    // P1's entire preference mass points at a ghost.
    let p1 = engine.db.species().get("P1").unwrap().unwrap();
    let alive_codes: std::collections::BTreeMap<String, bool> = engine
        .db
        .species()
        .list_alive()
        .unwrap()
        .iter()
        .map(|s| (s.lineage_code.clone(), true))
        .collect();
    let dependency = deeptime_core::predation::PredationService::food_dependency(&p1, &alive_codes);
    assert!(dependency.abs() < 1e-9, "dependency {dependency} should be 0");

    assert!(
        p1_peak_death > 0.6,
        "P1 peak death rate {p1_peak_death:.2} despite losing all prey"
    );
    assert!(
        q1_final_death > q1_baseline_death + 0.05,
        "Q1 death did not rise: {q1_baseline_death:.2} -> {q1_final_death:.2}"
    );
}
