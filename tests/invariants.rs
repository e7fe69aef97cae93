//! Universal invariants that must hold after every turn, whatever happens.

mod common;

use common::{engine_with_seed_world, natural, pressure, refill_energy, run_rounds};
use deeptime_data::{PressureKind, SpeciesStatus, TraitValidator, MAX_POPULATION};

fn check_invariants(engine: &deeptime_core::SimulationEngine) {
    let species = engine.db.species().list_all().unwrap();
    let habitats = engine.db.environment().latest_habitats().unwrap();

    for sp in &species {
        // Population bounds.
        assert!(sp.population <= MAX_POPULATION);

        // Extinct means empty and tombstoned, forever addressable.
        if sp.status == SpeciesStatus::Extinct {
            assert_eq!(sp.population, 0, "{} reanimated", sp.lineage_code);
            assert!(sp.extinction_turn.is_some());
        }

        // Trait envelope.
        assert!(
            TraitValidator::check(&sp.abstract_traits, sp.trophic_level),
            "{} violates trait constraints: {:?}",
            sp.lineage_code,
            sp.abstract_traits
        );

        // Plants are autotrophs or detritivores.
        if sp.trophic_level < 2.0 {
            assert!(
                matches!(
                    sp.diet_type,
                    deeptime_data::DietType::Autotroph | deeptime_data::DietType::Detritivore
                ),
                "{} is a low-trophic consumer",
                sp.lineage_code
            );
        }

        // Habitat sum equals population for the living.
        if sp.is_alive() {
            let total: u64 = habitats
                .iter()
                .filter(|h| h.species_id == sp.id)
                .map(|h| h.population)
                .sum();
            assert_eq!(
                total, sp.population,
                "{} tile populations do not sum to total",
                sp.lineage_code
            );
        }

        // Dormant genes never shadow expressed traits or organs.
        for key in sp.dormant_genes.traits.keys() {
            assert!(
                !sp.abstract_traits.contains_key(key),
                "{} has dormant key {key} also expressed",
                sp.lineage_code
            );
        }
        for key in sp.dormant_genes.organs.keys() {
            assert!(!sp.organs.contains_key(key));
        }

        assert!(sp.gene_diversity_radius >= 0.15 - 1e-9);
    }

    // At most one habitat record per (tile, species) per turn.
    let mut seen = std::collections::BTreeSet::new();
    for h in &habitats {
        assert!(
            seen.insert((h.tile_id, h.species_id, h.turn_index)),
            "duplicate habitat record for tile {} species {}",
            h.tile_id,
            h.species_id
        );
    }
}

#[tokio::test]
async fn test_invariants_hold_across_varied_turns() {
    let engine = engine_with_seed_world();
    let schedule = [
        vec![natural()],
        vec![pressure(PressureKind::DroughtPeriod, 4.0)],
        vec![natural()],
        vec![pressure(PressureKind::GreenhouseEarth, 6.0)],
        vec![pressure(PressureKind::ResourceAbundance, 5.0)],
        vec![natural()],
    ];
    for pressures in schedule {
        refill_energy(&engine);
        let reports = run_rounds(&engine, 1, pressures).await;
        // Per-report identity: deaths + survivors = initial population.
        for snapshot in &reports[0].species {
            assert!(snapshot.death_rate >= 0.0 && snapshot.death_rate <= 1.0);
        }
        check_invariants(&engine);
    }
}

#[tokio::test]
async fn test_extinct_species_stay_extinct() {
    let engine = engine_with_seed_world();
    // Drive C1 to zero by hand, then keep simulating.
    {
        let store = engine.db.species();
        let mut c1 = store.get("C1").unwrap().unwrap();
        c1.tombstone(1, "scenario");
        store.upsert(&mut c1).unwrap();
    }
    for _ in 0..4 {
        refill_energy(&engine);
        let _ = run_rounds(&engine, 1, vec![natural()]).await;
        let c1 = engine.db.species().get("C1").unwrap().unwrap();
        assert_eq!(c1.status, SpeciesStatus::Extinct);
        assert_eq!(c1.population, 0);
    }
}

#[tokio::test]
async fn test_speciation_records_consistent_lineage() {
    let engine = engine_with_seed_world();
    {
        let store = engine.db.species();
        let mut a1 = store.get("A1").unwrap().unwrap();
        a1.set_population(9_000_000);
        a1.hidden_traits.insert("evolution_potential".into(), 0.9);
        store.upsert(&mut a1).unwrap();
    }
    for _ in 0..4 {
        refill_energy(&engine);
        let reports = run_rounds(&engine, 1, vec![pressure(PressureKind::MonsoonShift, 5.0)]).await;
        for event in &reports[0].branching_events {
            let parent = engine.db.species().get(&event.parent_code).unwrap();
            let child = engine.db.species().get(&event.child_code).unwrap();
            assert!(parent.is_some(), "parent {} missing", event.parent_code);
            let child = child.expect("child persisted");
            assert_eq!(child.created_turn, event.turn_index);
            assert_eq!(child.parent_code.as_deref(), Some(event.parent_code.as_str()));
        }
    }
}
