//! Shared fixtures for the integration suite.

use std::sync::Arc;

use deeptime_core::{SimConfig, SimulationEngine, TurnCommand};
use deeptime_data::{PressureKind, PressureSpec, Species, TurnReport};
use deeptime_io::Database;
use deeptime_net::EmbeddingService;

pub const TEST_SEED: u64 = 7;
pub const TEST_WIDTH: u32 = 20;
pub const TEST_HEIGHT: u32 = 12;

pub fn engine_with_seed_world() -> SimulationEngine {
    let db = Database::open_in_memory().expect("in-memory db");
    deeptime_io::seed_world(&db, TEST_SEED, TEST_WIDTH, TEST_HEIGHT).expect("seed world");
    engine_over(db)
}

pub fn engine_over(db: Database) -> SimulationEngine {
    SimulationEngine::new(
        db,
        None,
        Arc::new(EmbeddingService::local()),
        SimConfig {
            autosave_every_rounds: 0,
            map_seed: TEST_SEED,
            map_width: TEST_WIDTH,
            map_height: TEST_HEIGHT,
            ..SimConfig::default()
        },
    )
}

pub fn natural() -> PressureSpec {
    pressure(PressureKind::NaturalEvolution, 0.0)
}

pub fn pressure(kind: PressureKind, intensity: f64) -> PressureSpec {
    PressureSpec {
        kind,
        intensity,
        region: None,
        narrative: None,
    }
}

pub async fn run_rounds(
    engine: &SimulationEngine,
    rounds: u32,
    pressures: Vec<PressureSpec>,
) -> Vec<TurnReport> {
    engine
        .run_turn(TurnCommand { rounds, pressures })
        .await
        .expect("turn should succeed")
}

/// Tops the energy pool back up so long scenarios never starve on upkeep.
pub fn refill_energy(engine: &SimulationEngine) {
    for _ in 0..64 {
        engine.energy.regenerate();
    }
}

pub fn alive(engine: &SimulationEngine) -> Vec<Species> {
    engine.db.species().list_alive().expect("list alive")
}

/// A custom lineage for scenario setups, derived from the seed template.
pub struct SpeciesSpec<'a> {
    pub code: &'a str,
    pub trophic_level: f64,
    pub diet: deeptime_data::DietType,
    pub habitat: deeptime_data::HabitatType,
    pub population: u64,
    pub body_length_cm: f64,
    pub body_weight_g: f64,
    pub prey: &'a [(&'a str, f64)],
}

pub fn insert_species(engine: &SimulationEngine, spec: SpeciesSpec<'_>) -> Species {
    let mut species = deeptime_io::seed_species().remove(0);
    species.id = 0;
    species.lineage_code = spec.code.to_string();
    species.genus_code = spec.code.chars().next().unwrap_or('X').to_string();
    species.latin_name = format!("Testudo {}", spec.code.to_lowercase());
    species.common_name = format!("test {}", spec.code.to_lowercase());
    species.description = format!(
        "A {} organism of trophic level {:.1} used by the scenario suite.",
        spec.code, spec.trophic_level
    );
    species.trophic_level = spec.trophic_level;
    species.diet_type = spec.diet;
    species.habitat_type = spec.habitat;
    species.set_population(spec.population);
    species
        .morphology
        .insert("body_length_cm".to_string(), spec.body_length_cm);
    species
        .morphology
        .insert("body_weight_g".to_string(), spec.body_weight_g);
    species
        .morphology
        .insert("generation_time_days".to_string(), 30.0);
    species.prey_species = spec.prey.iter().map(|(code, _)| code.to_string()).collect();
    species.prey_preferences = spec
        .prey
        .iter()
        .map(|(code, weight)| (code.to_string(), *weight))
        .collect();
    engine
        .db
        .species()
        .upsert(&mut species)
        .expect("insert species");
    species
}
