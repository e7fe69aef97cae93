//! Habitat assignment, per-turn snapshots, and dispersal smoothing.

use std::collections::BTreeMap;

use deeptime_data::{HabitatRecord, MapTile, Species};
use deeptime_io::{EnvironmentStore, Result};

use crate::index::TileIndex;

#[derive(Debug, Clone)]
pub struct HabitatConfig {
    /// New species keep their best N tiles.
    pub initial_tile_count: usize,
    /// Habitat history window, in turns.
    pub retention_turns: u64,
    /// Base neighbor-diffusion strength at mobility 10.
    pub dispersal_beta: f64,
}

impl Default for HabitatConfig {
    fn default() -> Self {
        Self {
            initial_tile_count: 10,
            retention_turns: 10,
            dispersal_beta: 0.3,
        }
    }
}

pub struct HabitatManager {
    store: EnvironmentStore,
    config: HabitatConfig,
}

impl HabitatManager {
    pub fn new(store: EnvironmentStore) -> Self {
        Self {
            store,
            config: HabitatConfig::default(),
        }
    }

    pub fn with_config(store: EnvironmentStore, config: HabitatConfig) -> Self {
        Self { store, config }
    }

    /// Canonical suitability in [0, 1]. Habitat-type gating is binary before
    /// any scoring.
    pub fn suitability_for(species: &Species, tile: &MapTile) -> f64 {
        if !tile.biome.supports(species.habitat_type) {
            return 0.0;
        }
        let temp_score = if tile.temperature > 20.0 {
            species.trait_value("heat_resistance") / 10.0
        } else if tile.temperature < 5.0 {
            species.trait_value("cold_resistance") / 10.0
        } else {
            0.8
        };
        let preferred_humidity = 1.0 - species.trait_value("drought_resistance") / 10.0;
        let hum_score = 1.0 - (tile.humidity - preferred_humidity).abs();
        let resource_score = (tile.resources / 500.0).min(1.0);
        (0.4 * temp_score + 0.3 * hum_score + 0.3 * resource_score).max(0.0)
    }

    /// Scores every compatible tile and keeps the best N, normalized so the
    /// best tile sits at 1.0.
    pub fn assign_initial_habitat(
        &self,
        species: &Species,
        tiles: &TileIndex,
        turn_index: u64,
    ) -> Vec<HabitatRecord> {
        let mut scored: Vec<(i64, f64)> = tiles
            .tiles
            .iter()
            .map(|tile| (tile.id, Self::suitability_for(species, tile)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.config.initial_tile_count);

        let best = scored.first().map(|(_, s)| *s).unwrap_or(1.0).max(1e-9);
        scored
            .into_iter()
            .map(|(tile_id, score)| {
                HabitatRecord::new(tile_id, species.id, 0, score / best, turn_index)
            })
            .collect()
    }

    /// Neighbor-average smoothing: each tile moves toward the mean of its
    /// hex neighbors, scaled by mobility and dampened where the neighbor's
    /// biome cannot host the species.
    pub fn dispersal_smooth(
        &self,
        species: &Species,
        tile_pops: &mut BTreeMap<i64, f64>,
        tiles: &TileIndex,
    ) {
        if tile_pops.len() < 2 {
            return;
        }
        let beta = self.config.dispersal_beta * (species.trait_value("mobility") / 10.0).min(1.0);
        if beta <= 0.0 {
            return;
        }
        let snapshot = tile_pops.clone();
        for (tile_id, pop) in tile_pops.iter_mut() {
            let neighbors = tiles.neighbors(*tile_id);
            if neighbors.is_empty() {
                continue;
            }
            let mut mean = 0.0;
            let mut compat = 0.0;
            for neighbor in neighbors {
                mean += snapshot.get(neighbor).copied().unwrap_or(0.0);
                let hospitable = tiles
                    .get(*neighbor)
                    .map(|t| t.biome.supports(species.habitat_type))
                    .unwrap_or(false);
                if hospitable {
                    compat += 1.0;
                }
            }
            mean /= neighbors.len() as f64;
            let boundary_damping = compat / neighbors.len() as f64;
            *pop = (*pop + beta * boundary_damping * (mean - *pop)).max(0.0);
        }
    }

    /// Persists the post-reproduction distribution. Integer populations are
    /// allocated with largest-remainder so the tile sum equals the species
    /// total exactly. `force_recalculate` rescores suitability from the map
    /// for every species instead of only the listed ones.
    pub fn snapshot_habitats(
        &self,
        species_list: &[Species],
        tile_populations: &BTreeMap<String, BTreeMap<i64, f64>>,
        tiles: &TileIndex,
        turn_index: u64,
        force_recalculate: bool,
    ) -> Result<Vec<HabitatRecord>> {
        let mut records = Vec::new();
        for species in species_list {
            if !species.is_alive() {
                continue;
            }
            let mut weights: BTreeMap<i64, f64> = tile_populations
                .get(&species.lineage_code)
                .cloned()
                .unwrap_or_default();
            if weights.is_empty() || force_recalculate {
                // Rescored placement: previous distribution is stale or gone.
                for record in self.assign_initial_habitat(species, tiles, turn_index) {
                    let share = record.suitability.max(0.01);
                    weights.insert(record.tile_id, share);
                }
            }
            if weights.is_empty() {
                continue;
            }
            let allocation = allocate_exact(species.population, &weights);
            for (tile_id, population) in allocation {
                let suitability = tiles
                    .get(tile_id)
                    .map(|tile| Self::suitability_for(species, tile))
                    .unwrap_or(0.0);
                records.push(HabitatRecord::new(
                    tile_id,
                    species.id,
                    population,
                    suitability,
                    turn_index,
                ));
            }
        }
        self.store.write_habitats_bulk(&records)?;
        if turn_index > self.config.retention_turns {
            self.store
                .prune_habitats_before(turn_index - self.config.retention_turns)?;
        }
        Ok(records)
    }
}

/// Largest-remainder allocation of `total` over weighted tiles; the result
/// sums to `total` exactly.
pub fn allocate_exact(total: u64, weights: &BTreeMap<i64, f64>) -> BTreeMap<i64, u64> {
    let weight_sum: f64 = weights.values().filter(|w| **w > 0.0).sum();
    let mut out = BTreeMap::new();
    if weight_sum <= 0.0 || total == 0 {
        if let Some(first) = weights.keys().next() {
            out.insert(*first, total);
        }
        return out;
    }
    let mut remainders: Vec<(i64, f64)> = Vec::new();
    let mut allocated = 0u64;
    for (tile_id, weight) in weights {
        if *weight <= 0.0 {
            continue;
        }
        let exact = total as f64 * weight / weight_sum;
        let floor = exact.floor() as u64;
        allocated += floor;
        out.insert(*tile_id, floor);
        remainders.push((*tile_id, exact - exact.floor()));
    }
    let mut leftover = total - allocated.min(total);
    remainders.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    for (tile_id, _) in remainders {
        if leftover == 0 {
            break;
        }
        *out.entry(tile_id).or_insert(0) += 1;
        leftover -= 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_io::seed::{generate_map, seed_species};
    use deeptime_io::Database;

    #[test]
    fn test_allocate_exact_sums() {
        let weights: BTreeMap<i64, f64> =
            [(1, 0.31), (2, 0.47), (3, 0.22)].into_iter().collect();
        for total in [0u64, 1, 7, 999, 5_000_003] {
            let allocation = allocate_exact(total, &weights);
            let sum: u64 = allocation.values().sum();
            assert_eq!(sum, total);
        }
    }

    #[test]
    fn test_initial_habitat_capped_and_normalized() {
        let db = Database::open_in_memory().unwrap();
        let manager = HabitatManager::new(db.environment());
        let mut species = seed_species().remove(0);
        species.id = 1;
        let tiles = TileIndex::new(generate_map(9, 20, 12));
        let records = manager.assign_initial_habitat(&species, &tiles, 0);
        assert!(!records.is_empty());
        assert!(records.len() <= 10);
        let best = records
            .iter()
            .map(|r| r.suitability)
            .fold(f64::MIN, f64::max);
        assert!((best - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible_biome_scores_zero() {
        let species = seed_species().remove(0);
        let tiles = generate_map(9, 20, 12);
        let desert = tiles
            .iter()
            .find(|t| t.biome == deeptime_data::Biome::Desert);
        if let Some(desert) = desert {
            assert_eq!(HabitatManager::suitability_for(&species, desert), 0.0);
        }
    }

    #[test]
    fn test_dispersal_moves_mass_toward_empty_neighbors() {
        let db = Database::open_in_memory().unwrap();
        let manager = HabitatManager::new(db.environment());
        let mut species = seed_species().remove(0);
        species.abstract_traits.insert("mobility".into(), 8.0);
        species.habitat_type = deeptime_data::HabitatType::Marine;
        let tiles = TileIndex::new(generate_map(9, 20, 12));
        // Two adjacent ocean tiles, all mass on one.
        let ocean: Vec<&MapTile> = tiles
            .tiles
            .iter()
            .filter(|t| t.biome == deeptime_data::Biome::Ocean)
            .collect();
        let pair = ocean.iter().find_map(|a| {
            tiles
                .neighbors(a.id)
                .iter()
                .find(|n| tiles.get(**n).map(|t| t.biome == deeptime_data::Biome::Ocean).unwrap_or(false))
                .map(|n| (a.id, *n))
        });
        if let Some((a, b)) = pair {
            let mut pops: BTreeMap<i64, f64> = [(a, 1000.0), (b, 0.0)].into_iter().collect();
            manager.dispersal_smooth(&species, &mut pops, &tiles);
            assert!(pops[&b] > 0.0);
            assert!(pops[&a] < 1000.0);
        }
    }

    #[test]
    fn test_snapshot_tile_sum_matches_population() {
        let db = Database::open_in_memory().unwrap();
        let manager = HabitatManager::new(db.environment());
        let mut species = seed_species();
        for (i, s) in species.iter_mut().enumerate() {
            s.id = i as i64 + 1;
        }
        species[0].population = 1_234_567;
        let tiles = TileIndex::new(generate_map(9, 20, 12));
        let records = manager
            .snapshot_habitats(&species, &BTreeMap::new(), &tiles, 1, false)
            .unwrap();
        let a1_sum: u64 = records
            .iter()
            .filter(|r| r.species_id == species[0].id)
            .map(|r| r.population)
            .sum();
        assert_eq!(a1_sum, 1_234_567);
    }
}
