//! Two ecologically identical species cannot share a niche indefinitely.

mod common;

use common::{engine_with_seed_world, natural, refill_energy, run_rounds};
use deeptime_data::SpeciesStatus;

#[tokio::test]
async fn test_identical_niches_resolve_by_exclusion() {
    let engine = engine_with_seed_world();
    {
        let store = engine.db.species();
        // Make B1 a near-clone of A1 in the same niche, at a disadvantage
        // only in numbers.
        let a1 = store.get("A1").unwrap().unwrap();
        let mut b1 = store.get("B1").unwrap().unwrap();
        b1.description = a1.description.clone();
        b1.abstract_traits = a1.abstract_traits.clone();
        b1.trophic_level = a1.trophic_level;
        b1.habitat_type = a1.habitat_type;
        b1.morphology = a1.morphology.clone();
        b1.set_population(10_000);
        store.upsert(&mut b1).unwrap();

        let mut a1 = a1;
        a1.set_population(2_000_000);
        store.upsert(&mut a1).unwrap();
    }

    let mut loser_extinct_turn = None;
    for turn in 1..=10 {
        refill_energy(&engine);
        let _ = run_rounds(&engine, 1, vec![natural()]).await;
        let b1 = engine.db.species().get("B1").unwrap().unwrap();
        if b1.status == SpeciesStatus::Extinct {
            loser_extinct_turn = Some(turn);
            break;
        }
    }

    assert!(
        loser_extinct_turn.is_some(),
        "competitive exclusion failed: B1 still alive after 10 turns at {}",
        engine.db.species().get("B1").unwrap().unwrap().population
    );
    let a1 = engine.db.species().get("A1").unwrap().unwrap();
    assert_eq!(a1.status, SpeciesStatus::Alive, "the dominant twin died too");
}
