//! Initial world construction: deterministic map generation from a seed and
//! the three-producer microbial starting ecosystem.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};

use deeptime_data::{
    Biome, DietType, DormantGenes, HabitatType, MapState, MapTile, Species, SpeciesStatus,
};

use crate::error::Result;
use crate::store::Database;

pub const DEFAULT_MAP_WIDTH: u32 = 48;
pub const DEFAULT_MAP_HEIGHT: u32 = 24;

/// Generates the hex tile grid. Deterministic for a given seed.
pub fn generate_map(map_seed: u64, width: u32, height: u32) -> Vec<MapTile> {
    let mut rng = ChaCha8Rng::seed_from_u64(map_seed);
    let mut tiles = Vec::with_capacity((width * height) as usize);
    let mut id: i64 = 1;

    for y in 0..height as i32 {
        // Latitude from equator (0.0) to pole (1.0).
        let latitude = ((y as f64 / (height.max(2) - 1) as f64) - 0.5).abs() * 2.0;
        for x in 0..width as i32 {
            let elevation: f64 = rng.gen_range(-4000.0..4000.0);
            let is_water = elevation < 0.0;
            let temperature = 30.0 - latitude * 42.0 - (elevation.max(0.0) / 1000.0) * 6.0
                + rng.gen_range(-2.0..2.0);
            let humidity = if is_water {
                0.9
            } else {
                (0.75 - latitude * 0.3 + rng.gen_range(-0.2..0.2)).clamp(0.05, 1.0)
            };
            let is_lake = !is_water && rng.gen_bool(0.03);
            let biome = classify_biome(elevation, temperature, humidity, is_lake, &mut rng);
            let salinity = match biome {
                Biome::Ocean | Biome::Coast => 35.0,
                Biome::DeepOcean | Biome::HydrothermalVent => 36.0,
                Biome::Lake => 0.5,
                _ => 0.0,
            };
            let resources = base_resources(biome, &mut rng);

            tiles.push(MapTile {
                id,
                x,
                y,
                // Offset rows to axial coordinates.
                q: x - y / 2,
                r: y,
                biome,
                elevation,
                temperature,
                humidity,
                salinity,
                resources,
                plate_id: (x as u32 / 12) + (y as u32 / 8) * 4,
                is_lake,
            });
            id += 1;
        }
    }
    tiles
}

fn classify_biome(
    elevation: f64,
    temperature: f64,
    humidity: f64,
    is_lake: bool,
    rng: &mut ChaCha8Rng,
) -> Biome {
    if is_lake {
        return Biome::Lake;
    }
    if elevation < -2500.0 {
        return if rng.gen_bool(0.04) {
            Biome::HydrothermalVent
        } else {
            Biome::DeepOcean
        };
    }
    if elevation < -200.0 {
        return Biome::Ocean;
    }
    if elevation < 0.0 {
        return Biome::Coast;
    }
    if temperature < -8.0 {
        return Biome::IceSheet;
    }
    if temperature < 2.0 {
        return Biome::Tundra;
    }
    if elevation > 2500.0 {
        return if rng.gen_bool(0.05) {
            Biome::Volcanic
        } else {
            Biome::Mountain
        };
    }
    if humidity < 0.2 {
        Biome::Desert
    } else if humidity > 0.6 && temperature > 8.0 {
        Biome::Forest
    } else {
        Biome::Plains
    }
}

fn base_resources(biome: Biome, rng: &mut ChaCha8Rng) -> f64 {
    let base = match biome {
        Biome::Forest => 700.0,
        Biome::Plains | Biome::Coast => 500.0,
        Biome::Ocean | Biome::Lake => 420.0,
        Biome::HydrothermalVent => 380.0,
        Biome::DeepOcean => 150.0,
        Biome::Mountain | Biome::Tundra => 180.0,
        Biome::Volcanic => 120.0,
        Biome::Desert => 80.0,
        Biome::IceSheet => 30.0,
    };
    base * rng.gen_range(0.7..1.3)
}

fn producer(code: &str, latin: &str, common: &str, description: &str, population: u64) -> Species {
    let abstract_traits: BTreeMap<String, f64> = [
        ("cold_resistance", 3.0),
        ("heat_resistance", 4.0),
        ("drought_resistance", 1.0),
        ("salinity_resistance", 5.0),
        ("reproductive_speed", 7.0),
        ("mobility", 0.5),
        ("defense", 1.0),
        ("photosynthetic_efficiency", 6.0),
        ("light_demand", 6.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let hidden_traits: BTreeMap<String, f64> = [
        ("gene_diversity", 0.6),
        ("environment_sensitivity", 0.4),
        ("evolution_potential", 0.7),
        ("mutation_rate", 0.5),
        ("adaptation_speed", 0.6),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let morphology: BTreeMap<String, f64> = [
        ("body_length_cm", 0.0002),
        ("body_weight_g", 1e-9),
        ("lifespan_days", 2.0),
        ("generation_time_days", 0.5),
        ("metabolic_rate", 1.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    Species {
        id: 0,
        lineage_code: code.to_string(),
        latin_name: latin.to_string(),
        common_name: common.to_string(),
        description: description.to_string(),
        genus_code: code.chars().next().unwrap_or('A').to_string(),
        taxonomic_rank: "species".to_string(),
        parent_code: None,
        hybrid_parent_codes: vec![],
        hybrid_fertility: 1.0,
        status: SpeciesStatus::Alive,
        created_turn: 0,
        extinction_turn: None,
        extinction_cause: None,
        population,
        morphology,
        abstract_traits,
        hidden_traits,
        habitat_type: HabitatType::Marine,
        trophic_level: 1.0,
        diet_type: DietType::Autotroph,
        prey_species: BTreeSet::new(),
        prey_preferences: BTreeMap::new(),
        symbiotic_dependencies: vec![],
        dependency_strength: 0.0,
        symbiosis_type: "none".to_string(),
        organs: BTreeMap::new(),
        capabilities: ["photosynthesis".to_string()].into_iter().collect(),
        dormant_genes: DormantGenes::default(),
        stress_exposure: BTreeMap::new(),
        gene_diversity_radius: 0.35,
        explored_directions: vec![],
        gene_stability: 0.5,
        ecological_vector: None,
        history_highlights: vec![],
        accumulated_adaptation_score: 0.0,
        last_description_update_turn: 0,
        plasticity_buffer: 1.0,
        speciation_pressure: 0.0,
        is_protected: false,
        protection_turns: 0,
        is_suppressed: false,
        suppression_turns: 0,
    }
}

/// The canonical three-producer microbial seed ecosystem.
pub fn seed_species() -> Vec<Species> {
    vec![
        producer(
            "A1",
            "Primogenitus photovorans",
            "glimmer mat",
            "A photosynthetic microbial mat drifting in shallow sunlit water, \
             forming green films across warm coastal shelves.",
            5_000_000,
        ),
        producer(
            "B1",
            "Thermophilus abyssi",
            "vent dust",
            "A chemosynthetic micro-organism clustered around mineral seeps, \
             tolerating heat and darkness where light never reaches.",
            500_000,
        ),
        producer(
            "C1",
            "Halobius tenax",
            "brine speck",
            "A salt-loving single-celled drifter thriving in evaporating \
             lagoons and hypersaline pools along the young coastline.",
            250_000,
        ),
    ]
}

/// Populates an empty database with a generated map, the seed species and a
/// fresh map state. Idempotent: refuses to reseed a non-empty world.
pub fn seed_world(db: &Database, map_seed: u64, width: u32, height: u32) -> Result<usize> {
    if db.environment().tile_count()? > 0 {
        return Ok(0);
    }
    let tiles = generate_map(map_seed, width, height);
    db.environment().replace_tiles(&tiles)?;
    db.environment().set_map_state(&MapState {
        map_seed,
        ..MapState::default()
    })?;
    let mut species = seed_species();
    db.species().upsert_many(&mut species)?;
    tracing::info!(tiles = tiles.len(), species = species.len(), "world seeded");
    Ok(species.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_generation_deterministic() {
        let a = generate_map(42, 16, 8);
        let b = generate_map(42, 16, 8);
        assert_eq!(a.len(), b.len());
        for (ta, tb) in a.iter().zip(&b) {
            assert_eq!(ta.biome, tb.biome);
            assert!((ta.elevation - tb.elevation).abs() < 1e-12);
        }
    }

    #[test]
    fn test_axial_coords_unique() {
        let tiles = generate_map(7, 20, 10);
        let coords: std::collections::BTreeSet<(i32, i32)> =
            tiles.iter().map(|t| (t.q, t.r)).collect();
        assert_eq!(coords.len(), tiles.len());
    }

    #[test]
    fn test_seed_world_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let created = seed_world(&db, 1, 16, 8).unwrap();
        assert_eq!(created, 3);
        let again = seed_world(&db, 1, 16, 8).unwrap();
        assert_eq!(again, 0);
        assert_eq!(db.species().count_alive().unwrap(), 3);
    }
}
