//! Moderate environmental pressure on a large, evolutionarily primed
//! population yields a branching event within a few turns.

mod common;

use common::{engine_with_seed_world, pressure, refill_energy, run_rounds};
use deeptime_data::PressureKind;

#[tokio::test]
async fn test_primed_lineage_branches_under_monsoon() {
    let engine = engine_with_seed_world();
    {
        let store = engine.db.species();
        let mut a1 = store.get("A1").unwrap().unwrap();
        a1.set_population(8_000_000);
        a1.hidden_traits
            .insert("evolution_potential".to_string(), 0.8);
        store.upsert(&mut a1).unwrap();
    }

    let mut children = Vec::new();
    for _ in 0..3 {
        refill_energy(&engine);
        let reports = run_rounds(&engine, 1, vec![pressure(PressureKind::MonsoonShift, 5.0)]).await;
        children.extend(reports[0].branching_events.clone());
        if !children.is_empty() {
            break;
        }
    }

    assert!(
        !children.is_empty(),
        "no branching events within three turns of monsoon pressure"
    );
    let event = children
        .iter()
        .find(|e| e.parent_code == "A1")
        .expect("A1 should be the branching parent");
    assert!(event.child_code.starts_with("A1"));
    assert!(event.turn_index <= 3);

    let child = engine
        .db
        .species()
        .get(&event.child_code)
        .unwrap()
        .expect("child persisted");
    assert_eq!(child.parent_code.as_deref(), Some("A1"));
    assert_eq!(child.created_turn, event.turn_index);
    let parent = engine.db.species().get("A1").unwrap().unwrap();
    assert_ne!(child.latin_name, parent.latin_name);
    assert!(child.population >= 1);
}
