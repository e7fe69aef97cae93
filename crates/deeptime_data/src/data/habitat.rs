use serde::{Deserialize, Serialize};

/// One (tile, species, turn) occupancy record. Append-only: each turn writes
/// a fresh batch and the latest-turn-per-species view is canonical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitatRecord {
    pub tile_id: i64,
    pub species_id: i64,
    pub population: u64,
    pub suitability: f64,
    pub turn_index: u64,
}

impl HabitatRecord {
    pub fn new(tile_id: i64, species_id: i64, population: u64, suitability: f64, turn_index: u64) -> Self {
        Self {
            tile_id,
            species_id,
            population,
            suitability: suitability.clamp(0.0, 1.0),
            turn_index,
        }
    }
}
