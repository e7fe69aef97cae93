//! Tile-based mortality engine.
//!
//! Builds the (tile x species) matrices, computes six pressure components in
//! parallel, combines them with the hybrid additive/multiplicative model,
//! and aggregates per-species outcomes with tile-distribution statistics.

pub mod aggregate;
pub mod candidates;
pub mod combine;
pub mod competition;
pub mod consts;
pub mod environment;
pub mod matrices;
pub mod trophic;

use std::collections::BTreeMap;

use deeptime_data::{MortalityResult, NicheMetrics, PressureModifiers, Species, Tier};

use crate::index::{HabitatIndex, TileIndex};
use crate::kin::KinModifiers;
use crate::matrix::Matrix;

pub use candidates::{speciation_candidates, CandidateParams, SpeciationCandidate};
use combine::Components;

pub struct MortalityContext<'a> {
    pub species: &'a [Species],
    pub tier: Tier,
    pub tiles: &'a TileIndex,
    pub habitats: &'a HabitatIndex,
    pub modifiers: &'a PressureModifiers,
    pub niche: &'a BTreeMap<String, NicheMetrics>,
    pub trophic_interactions: &'a BTreeMap<String, f64>,
    /// Combined similarity over the batch order.
    pub sim: &'a Matrix,
    /// Predation preference over the batch order.
    pub predation: &'a Matrix,
    pub kin: &'a BTreeMap<String, KinModifiers>,
    /// Ages of each species' living children, keyed by parent code.
    pub children_ages: &'a BTreeMap<String, Vec<u64>>,
    pub ecosystem_population: u64,
    pub turn_index: u64,
    pub map_seed: u64,
}

pub struct TileMortalityEngine;

impl TileMortalityEngine {
    pub fn evaluate(ctx: &MortalityContext) -> Vec<MortalityResult> {
        let base = matrices::build_base_matrices(ctx);
        let population = &base.population;

        // The six components are independent of each other; fan out.
        let ((env, (comp, plant)), ((troph, res), pred)) = rayon::join(
            || {
                rayon::join(
                    || environment::environmental_pressure(ctx, population),
                    || {
                        rayon::join(
                            || competition::competition_pressure(ctx, population),
                            || competition::plant_competition_pressure(ctx, population),
                        )
                    },
                )
            },
            || {
                rayon::join(
                    || {
                        rayon::join(
                            || trophic::trophic_pressure(ctx, population),
                            || trophic::resource_pressure(ctx, population),
                        )
                    },
                    || trophic::predation_network_pressure(ctx, population),
                )
            },
        );

        let components = Components {
            environment: env,
            competition: comp,
            trophic: troph,
            resources: res.pressure.clone(),
            predation: pred,
            plants: plant,
        };

        let mortality = combine::combine(ctx, population, &components);

        let component_means: BTreeMap<String, Vec<f64>> = [
            ("environment", &components.environment),
            ("competition", &components.competition),
            ("trophic", &components.trophic),
            ("resources", &components.resources),
            ("predation", &components.predation),
            ("plant_competition", &components.plants),
        ]
        .into_iter()
        .map(|(name, matrix)| (name.to_string(), weighted_col_means(population, matrix)))
        .collect();

        let mut results = aggregate::aggregate(ctx, population, &mortality, &res, component_means);

        for code in &base.recovered {
            if let Some(result) = results.iter_mut().find(|r| &r.lineage_code == code) {
                result
                    .notes
                    .push("suitability collapse: redistributed over compatible biomes".to_string());
            }
        }
        results
    }
}

/// Population-weighted mean of each species column.
fn weighted_col_means(population: &Matrix, matrix: &Matrix) -> Vec<f64> {
    let mut out = vec![0.0; matrix.cols()];
    for j in 0..matrix.cols() {
        let mut weighted = 0.0;
        let mut weight = 0.0;
        for row in 0..matrix.rows() {
            let pop = population.get(row, j);
            if pop > 0.0 {
                weighted += matrix.get(row, j) * pop;
                weight += pop;
            }
        }
        if weight > 0.0 {
            out[j] = weighted / weight;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predation::PredationService;
    use crate::similarity::combined_similarity_matrix;
    use deeptime_data::HabitatRecord;
    use deeptime_io::seed::{generate_map, seed_species};

    fn context_fixture() -> (
        Vec<Species>,
        TileIndex,
        HabitatIndex,
        Matrix,
        Matrix,
        BTreeMap<String, NicheMetrics>,
    ) {
        let mut species = seed_species();
        for (i, s) in species.iter_mut().enumerate() {
            s.id = i as i64 + 1;
        }
        let tiles = TileIndex::new(generate_map(11, 12, 8));
        let marine: Vec<i64> = tiles
            .tiles
            .iter()
            .filter(|t| t.biome.supports(deeptime_data::HabitatType::Marine))
            .map(|t| t.id)
            .take(4)
            .collect();
        let mut records = Vec::new();
        for s in &species {
            for tile_id in &marine {
                records.push(HabitatRecord::new(*tile_id, s.id, 0, 0.6, 0));
            }
        }
        let habitats = HabitatIndex::new(records);
        let embedding = vec![vec![0.5; 3]; 3];
        let sim = combined_similarity_matrix(&species, &embedding);
        let predation = PredationService::build_matrix(&species).preference;
        let niche: BTreeMap<String, NicheMetrics> = species
            .iter()
            .map(|s| (s.lineage_code.clone(), NicheMetrics::default()))
            .collect();
        (species, tiles, habitats, sim, predation, niche)
    }

    #[test]
    fn test_evaluate_conserves_population_identity() {
        let (species, tiles, habitats, sim, predation, niche) = context_fixture();
        let modifiers = PressureModifiers::default();
        let interactions = BTreeMap::new();
        let kin = BTreeMap::new();
        let children = BTreeMap::new();
        let ctx = MortalityContext {
            species: &species,
            tier: Tier::Focus,
            tiles: &tiles,
            habitats: &habitats,
            modifiers: &modifiers,
            niche: &niche,
            trophic_interactions: &interactions,
            sim: &sim,
            predation: &predation,
            kin: &kin,
            children_ages: &children,
            ecosystem_population: species.iter().map(|s| s.population).sum(),
            turn_index: 1,
            map_seed: 11,
        };
        let results = TileMortalityEngine::evaluate(&ctx);
        assert_eq!(results.len(), 3);
        for result in &results {
            assert_eq!(result.deaths + result.survivors, result.initial_population);
            assert!(result.death_rate >= 0.0 && result.death_rate <= 1.0);
            assert!(!result.tile_mortality.is_empty());
        }
    }

    #[test]
    fn test_glacial_pressure_raises_mortality() {
        let (species, tiles, habitats, sim, predation, niche) = context_fixture();
        let interactions = BTreeMap::new();
        let kin = BTreeMap::new();
        let children = BTreeMap::new();

        let baseline_mods = PressureModifiers::default();
        let glacial = deeptime_data::PressureSpec {
            kind: deeptime_data::PressureKind::GlacialPeriod,
            intensity: 8.0,
            region: None,
            narrative: None,
        }
        .modifiers();

        let make_ctx = |modifiers: &PressureModifiers| MortalityContext {
            species: &species,
            tier: Tier::Focus,
            tiles: &tiles,
            habitats: &habitats,
            modifiers,
            niche: &niche,
            trophic_interactions: &interactions,
            sim: &sim,
            predation: &predation,
            kin: &kin,
            children_ages: &children,
            ecosystem_population: species.iter().map(|s| s.population).sum(),
            turn_index: 1,
            map_seed: 11,
        };

        let calm: f64 = TileMortalityEngine::evaluate(&make_ctx(&baseline_mods))
            .iter()
            .map(|r| r.death_rate)
            .sum();
        let cold: f64 = TileMortalityEngine::evaluate(&make_ctx(&glacial))
            .iter()
            .map(|r| r.death_rate)
            .sum();
        assert!(cold > calm);
    }
}
