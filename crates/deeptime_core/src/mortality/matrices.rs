//! Construction of the suitability and population matrices.

use std::collections::BTreeMap;

use crate::matrix::Matrix;

use super::MortalityContext;

pub struct BaseMatrices {
    pub suitability: Matrix,
    pub population: Matrix,
    /// Species that lost all suitability and were redistributed uniformly
    /// over compatible tiles.
    pub recovered: Vec<String>,
}

/// SUIT[t,s] from the latest habitat records; POP[t,s] distributes each
/// species' population proportional to its suitability column. A species
/// with no positive suitability anywhere is spread uniformly across
/// biome-compatible tiles at a stamped default of 0.5 — the recovery path
/// from suitability collapse.
pub fn build_base_matrices(ctx: &MortalityContext) -> BaseMatrices {
    let t = ctx.tiles.len();
    let s = ctx.species.len();
    let mut suitability = Matrix::zeros(t, s);
    let mut population = Matrix::zeros(t, s);
    let mut recovered = Vec::new();

    for (j, species) in ctx.species.iter().enumerate() {
        if !species.is_alive() || species.population == 0 {
            continue;
        }
        let records = ctx.habitats.for_species(species.id);
        let mut col_sum = 0.0;
        for record in records {
            if let Some(row) = ctx.tiles.idx_of(record.tile_id) {
                if record.suitability > 0.0 {
                    suitability.set(row, j, record.suitability);
                    col_sum += record.suitability;
                }
            }
        }

        if col_sum <= 0.0 {
            let mut compatible: Vec<usize> = ctx
                .tiles
                .tiles
                .iter()
                .enumerate()
                .filter(|(_, tile)| tile.biome.supports(species.habitat_type))
                .map(|(row, _)| row)
                .collect();
            if compatible.is_empty() {
                // Its entire biome class is gone; strand it everywhere rather
                // than erase it.
                compatible = (0..t).collect();
            }
            for &row in &compatible {
                suitability.set(row, j, 0.5);
            }
            col_sum = 0.5 * compatible.len() as f64;
            recovered.push(species.lineage_code.clone());
        }

        let total = species.population as f64;
        for row in 0..t {
            let share = suitability.get(row, j) / col_sum;
            if share > 0.0 {
                population.set(row, j, total * share);
            }
        }
    }

    BaseMatrices {
        suitability,
        population,
        recovered,
    }
}

/// Per-tile population map for one species column.
pub fn column_populations(ctx: &MortalityContext, population: &Matrix, j: usize) -> BTreeMap<i64, f64> {
    let mut out = BTreeMap::new();
    for (row, tile) in ctx.tiles.tiles.iter().enumerate() {
        let pop = population.get(row, j);
        if pop > 0.0 {
            out.insert(tile.id, pop);
        }
    }
    out
}
