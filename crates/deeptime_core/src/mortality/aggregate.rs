//! Per-species aggregation: survivors, intervention modifiers, the
//! evolutionary filters, and tile-distribution statistics.

use std::collections::BTreeMap;

use deeptime_data::{Modifier, MortalityResult, TileDistribution};

use crate::matrix::Matrix;

use super::combine::{catastrophe_target, lottery_survivors};
use super::consts::*;
use super::trophic::ResourceOutcome;
use super::MortalityContext;

pub fn aggregate(
    ctx: &MortalityContext,
    population: &Matrix,
    mortality: &Matrix,
    resources: &ResourceOutcome,
    component_means: BTreeMap<String, Vec<f64>>,
) -> Vec<MortalityResult> {
    let t = ctx.tiles.len();
    let mut results = Vec::with_capacity(ctx.species.len());
    let spike = ctx.modifiers.get(Modifier::MortalitySpike);
    let catastrophic = spike > LOTTERY_SPIKE_THRESHOLD;
    let lottery = lottery_survivors(ctx);

    for (j, species) in ctx.species.iter().enumerate() {
        let initial = species.population;
        if !species.is_alive() || initial == 0 {
            results.push(empty_result(ctx, species, j, resources, &component_means));
            continue;
        }

        let mut notes = Vec::new();
        let mut tile_mortality: BTreeMap<i64, f64> = BTreeMap::new();
        let mut tile_population: BTreeMap<i64, f64> = BTreeMap::new();
        let mut survivors_f = 0.0;
        for row in 0..t {
            let pop = population.get(row, j);
            if pop <= 0.0 {
                continue;
            }
            let rate = mortality.get(row, j);
            let tile_id = ctx.tiles.tiles[row].id;
            tile_mortality.insert(tile_id, rate);
            tile_population.insert(tile_id, pop);
            survivors_f += pop * (1.0 - rate);
        }

        let initial_f = initial as f64;
        let mut deaths_f = (initial_f - survivors_f).max(0.0);

        // Intervention modifiers.
        if species.is_protected {
            deaths_f *= 0.5;
            notes.push("protected: half of deaths averted".to_string());
        }
        if species.is_suppressed {
            let extra = 0.3 * (initial_f - deaths_f).max(0.0);
            deaths_f += extra;
            notes.push("suppressed: 30% extra losses".to_string());
        }
        deaths_f = deaths_f.clamp(0.0, initial_f);
        let base_rate = if initial_f > 0.0 { deaths_f / initial_f } else { 0.0 };

        let adjustment = evolutionary_adjustment(ctx, species, j, base_rate, &mut notes);
        let mut final_rate = (base_rate + adjustment).clamp(0.0, 1.0);
        if catastrophic {
            // The lottery cap and the catastrophe floor both outrank the
            // evolutionary filters.
            if lottery.contains(&j) {
                final_rate = final_rate.min(LOTTERY_MORTALITY_CAP);
                notes.push("survivor lottery: mortality capped".to_string());
            } else {
                final_rate = final_rate.max(catastrophe_target(spike));
            }
        }
        if initial_f > 0.0 {
            final_rate = final_rate.max(MIN_MORTALITY);
        }

        // Re-derive per-tile rates with the global adjustment folded in.
        let tile_shift = final_rate - base_rate;
        for rate in tile_mortality.values_mut() {
            *rate = (*rate + tile_shift).clamp(0.0, 1.0);
        }
        let tile_stats = TileDistribution::from_rates(&tile_mortality);

        let deaths = (initial_f * final_rate).round().min(initial_f) as u64;
        let survivors = initial - deaths;

        let niche = ctx
            .niche
            .get(&species.lineage_code)
            .copied()
            .unwrap_or_default();
        let breakdown = component_means
            .iter()
            .map(|(name, means)| (name.clone(), means.get(j).copied().unwrap_or(0.0)))
            .collect();

        results.push(MortalityResult {
            lineage_code: species.lineage_code.clone(),
            initial_population: initial,
            deaths,
            survivors,
            death_rate: final_rate,
            notes,
            niche_overlap: niche.overlap,
            resource_pressure: resources.mean_by_species.get(j).copied().unwrap_or(0.0),
            tier: ctx.tier,
            tile_stats,
            tile_mortality,
            tile_population,
            pressure_breakdown: breakdown,
        });
    }
    results
}

fn empty_result(
    ctx: &MortalityContext,
    species: &deeptime_data::Species,
    j: usize,
    resources: &ResourceOutcome,
    component_means: &BTreeMap<String, Vec<f64>>,
) -> MortalityResult {
    MortalityResult {
        lineage_code: species.lineage_code.clone(),
        initial_population: species.population,
        deaths: 0,
        survivors: species.population,
        death_rate: 0.0,
        notes: vec![],
        niche_overlap: 0.0,
        resource_pressure: resources.mean_by_species.get(j).copied().unwrap_or(0.0),
        tier: ctx.tier,
        tile_stats: TileDistribution::default(),
        tile_mortality: BTreeMap::new(),
        tile_population: BTreeMap::new(),
        pressure_breakdown: component_means
            .iter()
            .map(|(name, means)| (name.clone(), means.get(j).copied().unwrap_or(0.0)))
            .collect(),
    }
}

/// Additive death-rate adjustments applied after tile aggregation.
fn evolutionary_adjustment(
    ctx: &MortalityContext,
    species: &deeptime_data::Species,
    _j: usize,
    _base_rate: f64,
    notes: &mut Vec<String>,
) -> f64 {
    let mut adjustment = 0.0;
    let age = species.age(ctx.turn_index);
    let children = ctx
        .children_ages
        .get(&species.lineage_code)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    // Genetic decay of old lineages.
    if age > GENETIC_DECAY_AGE {
        let decay = (GENETIC_DECAY_RATE * (age - GENETIC_DECAY_AGE) as f64).min(GENETIC_DECAY_CAP);
        adjustment += decay;
        notes.push(format!("genetic decay +{decay:.2}"));
    }

    // Parental obsolescence, or stagnation without descendants.
    if !children.is_empty() {
        adjustment += PARENT_OBSOLESCENCE_PENALTY;
        notes.push("superseded by descendants".to_string());
    } else if age > 10 {
        adjustment += CHILDLESS_AGE_PENALTY;
        notes.push("lineage stagnation".to_string());
    }

    // Allee effect at small populations.
    let pop = species.population as f64;
    if pop < ALLEE_POPULATION {
        let allee = 0.5 * (1.0 - pop / ALLEE_POPULATION);
        adjustment += allee;
        notes.push(format!("Allee effect +{allee:.2}"));
    }

    // Frequency dependence.
    if ctx.ecosystem_population > 0 {
        let f = pop / ctx.ecosystem_population as f64;
        if f > COMMON_THRESHOLD {
            let penalty =
                COMMON_MAX_PENALTY * ((f - COMMON_THRESHOLD) / (1.0 - COMMON_THRESHOLD)).min(1.0);
            adjustment += penalty;
            notes.push(format!("over-dominant +{penalty:.2}"));
        } else if f < RARE_THRESHOLD && f > 0.0 {
            let advantage = RARE_MAX_ADVANTAGE * (1.0 - f / RARE_THRESHOLD);
            adjustment -= advantage;
            notes.push(format!("rare advantage -{advantage:.2}"));
        }
    }

    // Fresh lineages get a head start.
    if age <= 2 {
        adjustment -= NEW_SPECIES_ADVANTAGE[age as usize];
    }

    // Parents lag while their children establish.
    if let Some(min_child_age) = children.iter().min() {
        if *min_child_age <= 2 {
            adjustment += PARENT_LAG_PENALTY[*min_child_age as usize];
        }
    }

    // Competitive exclusion under crowding.
    let niche = ctx
        .niche
        .get(&species.lineage_code)
        .copied()
        .unwrap_or_default();
    if niche.overlap > EXCLUSION_OVERLAP && niche.saturation > EXCLUSION_SATURATION {
        adjustment += EXCLUSION_PENALTY;
        notes.push("niche exclusion".to_string());
    }

    // Food-web feedback signals.
    let feedback_key = format!("food_web_mortality_{}", species.lineage_code);
    adjustment += ctx.trophic_interactions.get(&feedback_key).copied().unwrap_or(0.0);
    adjustment += ctx
        .trophic_interactions
        .get("food_web_global_penalty")
        .copied()
        .unwrap_or(0.0);

    // Kin competition outcome.
    if let Some(kin) = ctx.kin.get(&species.lineage_code) {
        adjustment += kin.mortality;
    }

    adjustment
}
