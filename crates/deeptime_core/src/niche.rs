//! Niche analysis: per-species overlap against the living population and
//! saturation of the local resource base.

use std::collections::BTreeMap;

use deeptime_data::{NicheMetrics, PressureModifiers, Species};

use crate::index::{HabitatIndex, TileIndex};
use crate::matrix::Matrix;

/// Energy extracted per unit of tile resources, calibrated so a band at its
/// carrying capacity saturates its resource base (saturation near 1).
const RESOURCE_CONVERSION: f64 = 6.0;
const METABOLIC_COEF: f64 = 0.02;

pub struct NicheAnalyzer;

impl NicheAnalyzer {
    /// `sim` is the combined similarity matrix over `species` order.
    pub fn analyze(
        species: &[Species],
        sim: &Matrix,
        habitats: &HabitatIndex,
        tiles: &TileIndex,
        modifiers: &PressureModifiers,
    ) -> BTreeMap<String, NicheMetrics> {
        let mut out = BTreeMap::new();
        let productivity = 1.0 + modifiers.get(deeptime_data::Modifier::Productivity);

        for (i, focal) in species.iter().enumerate() {
            let overlap = Self::overlap_of(i, focal, species, sim, habitats);
            let saturation = Self::saturation_of(focal, species, habitats, tiles, productivity);
            out.insert(
                focal.lineage_code.clone(),
                NicheMetrics {
                    overlap,
                    saturation,
                },
            );
        }
        out
    }

    fn overlap_of(
        i: usize,
        focal: &Species,
        species: &[Species],
        sim: &Matrix,
        habitats: &HabitatIndex,
    ) -> f64 {
        let mut weighted = 0.0;
        let mut weight_total = 0.0;
        for (j, other) in species.iter().enumerate() {
            if i == j || !other.is_alive() {
                continue;
            }
            let trophic_gap = (focal.trophic_level - other.trophic_level).abs();
            if trophic_gap >= 1.0 {
                continue;
            }
            let spatial = habitats.tile_overlap(focal.id, other.id);
            let weight = 1.0 - trophic_gap;
            weighted += sim.get(i, j) * spatial * weight;
            weight_total += weight;
        }
        if weight_total > 0.0 {
            (weighted / weight_total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Demand of the focal band on the focal tiles over their supply.
    fn saturation_of(
        focal: &Species,
        species: &[Species],
        habitats: &HabitatIndex,
        tiles: &TileIndex,
        productivity: f64,
    ) -> f64 {
        let own_tiles: Vec<i64> = habitats
            .for_species(focal.id)
            .iter()
            .map(|h| h.tile_id)
            .collect();
        if own_tiles.is_empty() {
            return 0.0;
        }
        let band = focal.trophic_band();
        let mut demand = 0.0;
        for other in species {
            if !other.is_alive() || (other.trophic_band() - band).abs() > 0.25 {
                continue;
            }
            let per_unit = METABOLIC_COEF * other.body_weight_g().max(1.0).powf(0.75);
            for record in habitats.for_species(other.id) {
                if own_tiles.contains(&record.tile_id) {
                    demand += record.population as f64 * per_unit;
                }
            }
        }
        let supply: f64 = own_tiles
            .iter()
            .filter_map(|id| tiles.get(*id))
            .map(|t| t.resources * RESOURCE_CONVERSION * productivity)
            .sum();
        if supply > 0.0 {
            demand / supply
        } else if demand > 0.0 {
            10.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::combined_similarity_matrix;
    use deeptime_data::HabitatRecord;
    use deeptime_io::seed::{generate_map, seed_species};

    #[test]
    fn test_cohabiting_identical_species_overlap() {
        let mut species = seed_species();
        for (i, s) in species.iter_mut().enumerate() {
            s.id = i as i64 + 1;
        }
        // Make B1 a clone of A1 sharing its tile.
        species[1].description = species[0].description.clone();
        species[1].trophic_level = species[0].trophic_level;
        let tiles = TileIndex::new(generate_map(3, 8, 6));
        let tile_id = tiles.tiles[0].id;
        let habitats = HabitatIndex::new(vec![
            HabitatRecord::new(tile_id, 1, 100, 0.6, 0),
            HabitatRecord::new(tile_id, 2, 100, 0.6, 0),
        ]);
        let embedding = vec![vec![1.0; 3]; 3];
        let sim = combined_similarity_matrix(&species, &embedding);
        let metrics = NicheAnalyzer::analyze(
            &species,
            &sim,
            &habitats,
            &tiles,
            &PressureModifiers::default(),
        );
        let a1 = metrics.get("A1").unwrap();
        let c1 = metrics.get("C1").unwrap();
        assert!(a1.overlap > c1.overlap);
    }
}
