//! Save, wipe, load: the world comes back byte-equivalent where it matters.

mod common;

use common::{engine_with_seed_world, natural, run_rounds};

#[tokio::test]
async fn test_save_drop_load_roundtrip() {
    let engine = engine_with_seed_world();
    let _ = run_rounds(&engine, 2, vec![natural()]).await;

    let saves_root = std::env::temp_dir().join(format!("deeptime-it-{}", std::process::id()));
    let before_species = engine.db.species().list_all().unwrap();
    let before_state = engine.db.environment().map_state().unwrap();
    let before_reports = engine.db.history().recent_reports(100).unwrap();

    deeptime_io::create_save(&engine.db, &saves_root, "roundtrip", "test").unwrap();
    engine.db.truncate_all().unwrap();
    assert_eq!(engine.db.species().list_all().unwrap().len(), 0);

    let meta = deeptime_io::load_save(&engine.db, &saves_root, "roundtrip").unwrap();
    assert_eq!(meta.turn_index, before_state.turn_index);

    let after_species = engine.db.species().list_all().unwrap();
    assert_eq!(after_species.len(), before_species.len());
    for (a, b) in before_species.iter().zip(&after_species) {
        assert_eq!(a.lineage_code, b.lineage_code);
        assert_eq!(a.population, b.population);
        assert_eq!(a.status, b.status);
        assert_eq!(a.abstract_traits, b.abstract_traits);
    }

    let after_state = engine.db.environment().map_state().unwrap();
    assert_eq!(after_state.turn_index, before_state.turn_index);
    assert_eq!(after_state.map_seed, before_state.map_seed);

    let after_reports = engine.db.history().recent_reports(100).unwrap();
    assert_eq!(after_reports.len(), before_reports.len());
    for (a, b) in before_reports.iter().zip(&after_reports) {
        assert_eq!(a.turn_index, b.turn_index);
        assert_eq!(a.narrative, b.narrative);
    }

    // Habitat view intact: canonical distribution still sums to populations.
    let habitats = engine.db.environment().latest_habitats().unwrap();
    for species in after_species.iter().filter(|s| s.is_alive()) {
        let total: u64 = habitats
            .iter()
            .filter(|h| h.species_id == species.id)
            .map(|h| h.population)
            .sum();
        assert_eq!(total, species.population, "{} habitat sum", species.lineage_code);
    }

    let _ = std::fs::remove_dir_all(&saves_root);
}

#[tokio::test]
async fn test_load_then_resume_simulation() {
    let engine = engine_with_seed_world();
    let _ = run_rounds(&engine, 1, vec![natural()]).await;
    let saves_root = std::env::temp_dir().join(format!("deeptime-it2-{}", std::process::id()));
    deeptime_io::create_save(&engine.db, &saves_root, "resume", "test").unwrap();
    deeptime_io::load_save(&engine.db, &saves_root, "resume").unwrap();

    // The world keeps ticking from where the save left off.
    let reports = run_rounds(&engine, 1, vec![natural()]).await;
    assert_eq!(reports[0].turn_index, 2);
    let _ = std::fs::remove_dir_all(&saves_root);
}
