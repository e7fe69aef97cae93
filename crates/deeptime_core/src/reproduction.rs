//! Logistic reproduction against trophic-pyramid carrying capacities.
//!
//! Growth multipliers come from life history; carrying capacity comes from a
//! per-tile energy pyramid anchored at tile resources; cross-tile pressure
//! nudges crowded tiles down and empty ones up before the logistic step.

use std::collections::BTreeMap;

use deeptime_data::{MortalityResult, NicheMetrics, Species, MAX_POPULATION};

use crate::index::{HabitatIndex, TileIndex};
use crate::kin::KinModifiers;

/// Producer capacity anchor: a well-resourced tile (roughly 400 resource
/// units) supports on the order of 1e5 biomass units at the base of the
/// pyramid.
const PRODUCER_K_PER_RESOURCE: f64 = 250.0;
const BAND_EFFICIENCY: f64 = 0.15;
const DECOMPOSER_EFFICIENCY: f64 = 0.40;
const BROKEN_CHAIN_FACTOR: f64 = 0.05;

#[derive(Debug, Clone, Default)]
pub struct EnvShocks {
    /// Change of global average temperature this turn, degrees C.
    pub temperature_delta: f64,
    /// Change of sea level this turn, meters.
    pub sea_level_delta: f64,
}

#[derive(Debug, Clone)]
pub struct ReproductionConfig {
    pub overshoot_decay: f64,
    pub suitability_alpha: f64,
    pub suitability_floor: f64,
    pub multiplier_min: f64,
    pub multiplier_max: f64,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            overshoot_decay: 0.25,
            suitability_alpha: 1.5,
            suitability_floor: 0.25,
            multiplier_min: 0.6,
            multiplier_max: 15.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReproductionOutcome {
    pub totals: BTreeMap<String, u64>,
    /// Per-species per-tile populations after growth, pre-dispersal.
    pub tile_populations: BTreeMap<String, BTreeMap<i64, f64>>,
    /// Species whose suitability collapsed; habitats need recomputation.
    pub rehabitation: Vec<String>,
    pub notes: Vec<String>,
}

pub struct ReproductionEngine {
    config: ReproductionConfig,
}

impl Default for ReproductionEngine {
    fn default() -> Self {
        Self {
            config: ReproductionConfig::default(),
        }
    }
}

impl ReproductionEngine {
    pub fn new(config: ReproductionConfig) -> Self {
        Self { config }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        species: &[Species],
        niche: &BTreeMap<String, NicheMetrics>,
        results: &[MortalityResult],
        habitats: &HabitatIndex,
        tiles: &TileIndex,
        kin: &BTreeMap<String, KinModifiers>,
        shocks: &EnvShocks,
    ) -> ReproductionOutcome {
        let mut outcome = ReproductionOutcome::default();
        let by_code: BTreeMap<&str, &MortalityResult> = results
            .iter()
            .map(|r| (r.lineage_code.as_str(), r))
            .collect();

        // Post-mortality per-tile survivors per species, for pyramid biomass.
        let survivors_by_tile = surviving_tile_populations(species, &by_code);

        for sp in species {
            if !sp.is_alive() {
                continue;
            }
            let Some(result) = by_code.get(sp.lineage_code.as_str()) else {
                continue;
            };
            let survivors = result.survivors;
            if survivors == 0 {
                outcome.totals.insert(sp.lineage_code.clone(), 0);
                continue;
            }

            let metrics = niche.get(&sp.lineage_code).copied().unwrap_or_default();
            let kin_mod = kin.get(&sp.lineage_code).copied().unwrap_or_default();
            let multiplier = self.growth_multiplier(sp, result, &metrics, &kin_mod);

            let total_suitability = habitats.total_suitability(sp.id);
            let (new_total, tile_pops) = if total_suitability < 0.01 {
                outcome.rehabitation.push(sp.lineage_code.clone());
                outcome.notes.push(format!(
                    "{}: suitability collapse, global growth mode",
                    sp.lineage_code
                ));
                (
                    self.global_growth(sp, survivors, multiplier, &metrics, shocks),
                    BTreeMap::new(),
                )
            } else {
                self.regional_growth(
                    sp,
                    survivors,
                    multiplier,
                    habitats,
                    tiles,
                    species,
                    &survivors_by_tile,
                    shocks,
                )
            };

            let clamped = if new_total.is_finite() {
                (new_total.max(0.0) as u64).min(MAX_POPULATION)
            } else {
                // Numerical blowup: keep the current population.
                outcome
                    .notes
                    .push(format!("{}: non-finite growth result reverted", sp.lineage_code));
                survivors
            };
            outcome.totals.insert(sp.lineage_code.clone(), clamped);
            if !tile_pops.is_empty() {
                outcome
                    .tile_populations
                    .insert(sp.lineage_code.clone(), tile_pops);
            }
        }
        outcome
    }

    fn growth_multiplier(
        &self,
        species: &Species,
        result: &MortalityResult,
        metrics: &NicheMetrics,
        kin: &KinModifiers,
    ) -> f64 {
        let mut multiplier = 1.0 + species.trait_value("reproductive_speed") * 0.4;

        let length = species.body_length_cm();
        let size_bonus: f64 = if length < 0.01 {
            2.0
        } else if length < 0.1 {
            1.5
        } else if length < 1.0 {
            1.2
        } else {
            1.0
        };
        let gen_days = species.generation_time_days();
        let repro_bonus = if gen_days < 7.0 {
            1.8
        } else if gen_days < 30.0 {
            1.4
        } else if gen_days < 180.0 {
            1.2
        } else {
            1.0
        };
        multiplier *= size_bonus.max(repro_bonus);

        // Energy lost climbing the pyramid.
        let trophic = species.trophic_level;
        multiplier *= if trophic >= 4.0 {
            0.5
        } else if trophic >= 3.0 {
            0.7
        } else if trophic >= 2.0 {
            0.9
        } else {
            1.0
        };

        let survival_rate = 1.0 - result.death_rate;
        multiplier *= 0.4 + 1.2 * survival_rate;

        let death = result.death_rate;
        if death > 0.7 {
            multiplier *= 0.5;
        } else if death > 0.4 {
            multiplier *= (1.0 - (death - 0.4) * 3.0).max(0.3);
            if death > 0.5 {
                // Survival-instinct push in the middle band.
                multiplier *= 1.0 + (death - 0.5) * 0.4;
            }
        }

        let saturation = metrics.saturation;
        multiplier *= if saturation <= 1.0 {
            1.0
        } else if saturation <= 2.0 {
            1.0 - (saturation - 1.0) * 0.4
        } else {
            (0.6 - (saturation - 2.0) * 0.15).max(0.2)
        };

        multiplier *= (1.0 + kin.reproduction).max(0.1);
        multiplier.clamp(self.config.multiplier_min, self.config.multiplier_max)
    }

    #[allow(clippy::too_many_arguments)]
    fn regional_growth(
        &self,
        species: &Species,
        survivors: u64,
        multiplier: f64,
        habitats: &HabitatIndex,
        tiles: &TileIndex,
        all_species: &[Species],
        survivors_by_tile: &BTreeMap<i64, Vec<(usize, f64)>>,
        shocks: &EnvShocks,
    ) -> (f64, BTreeMap<i64, f64>) {
        let records = habitats.for_species(species.id);
        let alpha = self.config.suitability_alpha;
        let weights: Vec<(i64, f64, f64)> = records
            .iter()
            .filter(|h| h.suitability >= self.config.suitability_floor)
            .map(|h| (h.tile_id, h.suitability, h.suitability.powf(alpha)))
            .collect();
        let weight_sum: f64 = weights.iter().map(|(_, _, w)| w).sum();
        if weights.is_empty() || weight_sum <= 0.0 {
            return (
                self.global_growth(species, survivors, multiplier, &NicheMetrics::default(), shocks),
                BTreeMap::new(),
            );
        }

        // Cross-tile pressure from the current tile densities.
        let tile_pops: Vec<f64> = weights
            .iter()
            .map(|(_, _, w)| survivors as f64 * w / weight_sum)
            .collect();
        let avg_density = tile_pops.iter().sum::<f64>() / tile_pops.len() as f64;
        let dispersal_bonus = if species.is_plant() {
            (1.0 + (species.trait_value("mobility") - 5.0) * 0.1).clamp(0.5, 1.5)
        } else {
            1.0
        };

        let mut total = 0.0;
        let mut per_tile = BTreeMap::new();
        for ((tile_id, suitability, _), p0) in weights.iter().zip(&tile_pops) {
            let mut k = self.tile_capacity(
                species,
                *tile_id,
                *suitability,
                tiles,
                all_species,
                survivors_by_tile,
                shocks,
            );
            if avg_density > 0.0 {
                let rel = p0 / avg_density;
                if rel > 1.5 {
                    k *= 1.0 - ((rel - 1.5) * 0.1 / dispersal_bonus).min(0.2);
                } else if rel < 0.5 {
                    k *= 1.0 + ((0.5 - rel) * 0.2 * dispersal_bonus).min(0.2);
                }
            }
            let k = k.max(1.0);

            let new_pop = if *p0 >= k {
                k + (p0 - k) * (1.0 - self.config.overshoot_decay)
            } else {
                let efficiency = 0.20 + 0.80 * (1.0 - (p0 / k).powf(0.7));
                (p0 * (1.0 + (multiplier - 1.0) * efficiency)).min(1.1 * k)
            };
            per_tile.insert(*tile_id, new_pop);
            total += new_pop;
        }
        (total, per_tile)
    }

    /// Trophic-pyramid carrying capacity of one tile for one species.
    #[allow(clippy::too_many_arguments)]
    fn tile_capacity(
        &self,
        species: &Species,
        tile_id: i64,
        suitability: f64,
        tiles: &TileIndex,
        all_species: &[Species],
        survivors_by_tile: &BTreeMap<i64, Vec<(usize, f64)>>,
        shocks: &EnvShocks,
    ) -> f64 {
        let Some(tile) = tiles.get(tile_id) else {
            return 1.0;
        };
        let shock_damping = (1.0
            - shocks.temperature_delta.abs() * 0.05
            - shocks.sea_level_delta.abs() * 0.02)
            .clamp(0.3, 1.0);
        let mut k_band = tile.resources * PRODUCER_K_PER_RESOURCE * shock_damping;

        let band = species.trophic_band();
        let present = survivors_by_tile.get(&tile_id);
        let mut level = 1.0;
        while level < band {
            let next = level + 0.5;
            let efficiency = if (next - 1.5).abs() < 0.01 {
                DECOMPOSER_EFFICIENCY
            } else {
                BAND_EFFICIENCY
            };
            // Broken food chain: nothing to eat in the band below.
            let prey_present = present
                .map(|list| {
                    list.iter().any(|(idx, pop)| {
                        *pop > 0.0 && (all_species[*idx].trophic_band() - level).abs() < 0.26
                    })
                })
                .unwrap_or(false);
            let chain_factor = if next <= 1.5 || prey_present {
                efficiency
            } else {
                efficiency * BROKEN_CHAIN_FACTOR
            };
            k_band *= chain_factor;
            level = next;
        }

        // Share of the band capacity by suitability among band members here.
        let band_suit_total: f64 = present
            .map(|list| {
                list.iter()
                    .filter(|(idx, _)| (all_species[*idx].trophic_band() - band).abs() < 0.01)
                    .map(|(_, pop)| pop.max(1.0))
                    .sum()
            })
            .unwrap_or(1.0);
        let own_share = present
            .and_then(|list| {
                list.iter()
                    .find(|(idx, _)| all_species[*idx].lineage_code == species.lineage_code)
                    .map(|(_, pop)| pop.max(1.0))
            })
            .unwrap_or(1.0);
        let share = (own_share / band_suit_total.max(1.0)).clamp(0.05, 1.0);

        let size_modifier = if species.is_microbe() {
            2.0
        } else if species.body_weight_g() > 1e6 {
            0.3
        } else {
            1.0
        };

        (k_band * share * suitability.clamp(0.05, 1.0) * size_modifier).max(1.0)
    }

    /// Body-size-anchored fallback when the habitat signal is gone.
    fn global_growth(
        &self,
        species: &Species,
        survivors: u64,
        multiplier: f64,
        metrics: &NicheMetrics,
        shocks: &EnvShocks,
    ) -> f64 {
        let weight = species.body_weight_g().max(1e-9);
        let mut k = 5e11 / (weight.powf(0.75) + 1.0);
        if metrics.overlap > 0.5 {
            k *= 0.7;
        }
        if metrics.saturation > 0.8 {
            k *= 0.7;
        }
        k *= (1.0 - shocks.temperature_delta.abs() * 0.05 - shocks.sea_level_delta.abs() * 0.02)
            .clamp(0.5, 1.0);
        let k = k.max(1.0);

        let p0 = survivors as f64;
        if p0 >= k {
            k + (p0 - k) * (1.0 - self.config.overshoot_decay)
        } else {
            let efficiency = 0.20 + 0.80 * (1.0 - (p0 / k).powf(0.7));
            (p0 * (1.0 + (multiplier - 1.0) * efficiency)).min(1.1 * k)
        }
    }
}

/// Per-tile surviving populations: (species index, survivors) lists.
fn surviving_tile_populations(
    species: &[Species],
    by_code: &BTreeMap<&str, &MortalityResult>,
) -> BTreeMap<i64, Vec<(usize, f64)>> {
    let mut out: BTreeMap<i64, Vec<(usize, f64)>> = BTreeMap::new();
    for (idx, sp) in species.iter().enumerate() {
        let Some(result) = by_code.get(sp.lineage_code.as_str()) else {
            continue;
        };
        for (tile_id, pop) in &result.tile_population {
            let rate = result.tile_mortality.get(tile_id).copied().unwrap_or(0.0);
            let surviving = pop * (1.0 - rate);
            if surviving > 0.0 {
                out.entry(*tile_id).or_default().push((idx, surviving));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_data::{HabitatRecord, Tier, TileDistribution};
    use deeptime_io::seed::{generate_map, seed_species};

    fn result_for(sp: &Species, death_rate: f64, tiles: &[i64]) -> MortalityResult {
        let initial = sp.population;
        let deaths = (initial as f64 * death_rate) as u64;
        let per_tile = initial as f64 / tiles.len() as f64;
        MortalityResult {
            lineage_code: sp.lineage_code.clone(),
            initial_population: initial,
            deaths,
            survivors: initial - deaths,
            death_rate,
            notes: vec![],
            niche_overlap: 0.0,
            resource_pressure: 0.0,
            tier: Tier::Focus,
            tile_stats: TileDistribution::default(),
            tile_mortality: tiles.iter().map(|t| (*t, death_rate)).collect(),
            tile_population: tiles.iter().map(|t| (*t, per_tile)).collect(),
            pressure_breakdown: BTreeMap::new(),
        }
    }

    fn fixture() -> (Vec<Species>, TileIndex, HabitatIndex, Vec<i64>) {
        let mut species = seed_species();
        for (i, s) in species.iter_mut().enumerate() {
            s.id = i as i64 + 1;
        }
        let tiles = TileIndex::new(generate_map(5, 12, 8));
        let occupied: Vec<i64> = tiles
            .tiles
            .iter()
            .filter(|t| t.biome.supports(deeptime_data::HabitatType::Marine))
            .map(|t| t.id)
            .take(3)
            .collect();
        let mut records = Vec::new();
        for s in &species {
            for tile in &occupied {
                records.push(HabitatRecord::new(*tile, s.id, 0, 0.6, 0));
            }
        }
        (species, tiles, HabitatIndex::new(records), occupied)
    }

    #[test]
    fn test_healthy_producer_grows() {
        let (species, tiles, habitats, occupied) = fixture();
        let engine = ReproductionEngine::default();
        let results: Vec<MortalityResult> = species
            .iter()
            .map(|s| result_for(s, 0.05, &occupied))
            .collect();
        let niche: BTreeMap<String, NicheMetrics> = species
            .iter()
            .map(|s| (s.lineage_code.clone(), NicheMetrics::default()))
            .collect();
        let outcome = engine.apply(
            &species,
            &niche,
            &results,
            &habitats,
            &tiles,
            &BTreeMap::new(),
            &EnvShocks::default(),
        );
        let a1_new = outcome.totals["A1"];
        let a1_survivors = results[0].survivors;
        assert!(a1_new > a1_survivors, "{a1_new} <= {a1_survivors}");
    }

    #[test]
    fn test_heavy_mortality_suppresses_growth() {
        let (species, tiles, habitats, occupied) = fixture();
        let engine = ReproductionEngine::default();
        let calm: Vec<MortalityResult> = species
            .iter()
            .map(|s| result_for(s, 0.05, &occupied))
            .collect();
        let harsh: Vec<MortalityResult> = species
            .iter()
            .map(|s| result_for(s, 0.75, &occupied))
            .collect();
        let niche: BTreeMap<String, NicheMetrics> = species
            .iter()
            .map(|s| (s.lineage_code.clone(), NicheMetrics::default()))
            .collect();
        let grow = |results: &Vec<MortalityResult>| {
            engine
                .apply(
                    &species,
                    &niche,
                    results,
                    &habitats,
                    &tiles,
                    &BTreeMap::new(),
                    &EnvShocks::default(),
                )
                .totals["A1"] as f64
                / results[0].survivors.max(1) as f64
        };
        assert!(grow(&calm) > grow(&harsh));
    }

    #[test]
    fn test_suitability_collapse_falls_back_to_global() {
        let (species, tiles, _habitats, occupied) = fixture();
        // Empty habitat index: zero suitability everywhere.
        let habitats = HabitatIndex::new(vec![]);
        let engine = ReproductionEngine::default();
        let results: Vec<MortalityResult> = species
            .iter()
            .map(|s| result_for(s, 0.1, &occupied))
            .collect();
        let niche = BTreeMap::new();
        let outcome = engine.apply(
            &species,
            &niche,
            &results,
            &habitats,
            &tiles,
            &BTreeMap::new(),
            &EnvShocks::default(),
        );
        assert!(outcome.rehabitation.contains(&"A1".to_string()));
        assert!(outcome.totals["A1"] > 0);
    }

    #[test]
    fn test_population_never_exceeds_cap() {
        let (mut species, tiles, habitats, occupied) = fixture();
        species[0].population = MAX_POPULATION - 5;
        let engine = ReproductionEngine::default();
        let results: Vec<MortalityResult> = species
            .iter()
            .map(|s| result_for(s, 0.01, &occupied))
            .collect();
        let outcome = engine.apply(
            &species,
            &BTreeMap::new(),
            &results,
            &habitats,
            &tiles,
            &BTreeMap::new(),
            &EnvShocks::default(),
        );
        assert!(outcome.totals["A1"] <= MAX_POPULATION);
    }
}
