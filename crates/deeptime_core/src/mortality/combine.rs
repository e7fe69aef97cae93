//! Hybrid combination of the pressure components into the mortality matrix,
//! the generational-adaptation discount, and the survivor lottery.

use deeptime_data::Modifier;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::matrix::Matrix;

use super::consts::*;
use super::MortalityContext;

pub struct Components {
    pub environment: Matrix,
    pub competition: Matrix,
    pub trophic: Matrix,
    pub resources: Matrix,
    pub predation: Matrix,
    pub plants: Matrix,
}

impl Components {
    fn capped(&self) -> [(f64, &Matrix); 6] {
        [
            (ENV_CAP, &self.environment),
            (COMP_CAP, &self.competition),
            (TROPHIC_CAP, &self.trophic),
            (RES_CAP, &self.resources),
            (PRED_CAP, &self.predation),
            (PLANT_CAP, &self.plants),
        ]
    }
}

/// Combines the capped components cell-wise:
/// raw = alpha * sum_model + (1 - alpha) * mult_model, then applies the
/// generational resistance discount and the mortality-spike lottery. No
/// uniform upper cap is imposed outside the lottery; only the floor and the
/// physical ceiling of 1.0.
pub fn combine(ctx: &MortalityContext, population: &Matrix, components: &Components) -> Matrix {
    let t = ctx.tiles.len();
    let s = ctx.species.len();
    let mut mortality = Matrix::zeros(t, s);
    let capped = components.capped();

    for row in 0..t {
        for j in 0..s {
            if population.get(row, j) <= 0.0 {
                continue;
            }
            let mut sum_model = 0.0;
            let mut mult_survival = 1.0;
            for (k, (cap, matrix)) in capped.iter().enumerate() {
                // The trophic component may carry a negative abundance bonus.
                let value = matrix.get(row, j).clamp(-ABUNDANCE_BONUS_CAP, *cap);
                sum_model += SUM_WEIGHTS[k] * value;
                mult_survival *= 1.0 - MULT_COEFS[k] * value;
            }
            let mult_model = 1.0 - mult_survival;
            let raw = COMBINE_ALPHA * sum_model + (1.0 - COMBINE_ALPHA) * mult_model;
            mortality.set(row, j, raw);
        }
    }

    apply_generational_resistance(ctx, population, &mut mortality);
    apply_survivor_lottery(ctx, population, &mut mortality);

    for row in 0..t {
        for j in 0..s {
            if population.get(row, j) > 0.0 {
                let v = mortality.get(row, j);
                mortality.set(row, j, v.clamp(MIN_MORTALITY, 1.0));
            }
        }
    }
    mortality
}

/// Long-generation-count lineages shrug off a slice of pressure. The
/// discount decays under severe tile mortality and never lowers a hard hit
/// below 70% of its raw value.
fn apply_generational_resistance(ctx: &MortalityContext, population: &Matrix, mortality: &mut Matrix) {
    let t = ctx.tiles.len();
    for (j, species) in ctx.species.iter().enumerate() {
        let generations = species.generations_per_turn(500_000, 8.0)
            * (ctx.turn_index.saturating_sub(species.created_turn) + 1) as f64;
        let gen_bonus = 0.03 * generations.max(1.0).log10();
        let size_bonus = if species.body_length_cm() < 0.1 { 0.02 } else { 0.0 };
        let pop_bonus = if species.population > 10_000_000 {
            0.02
        } else if species.population > 100_000 {
            0.01
        } else {
            0.0
        };
        let resistance = (gen_bonus + size_bonus + pop_bonus).min(GENERATIONAL_RESISTANCE_CAP);
        if resistance <= 0.0 {
            continue;
        }

        // Mean mortality across this species' occupied tiles.
        let mut sum = 0.0;
        let mut count = 0usize;
        for row in 0..t {
            if population.get(row, j) > 0.0 {
                sum += mortality.get(row, j);
                count += 1;
            }
        }
        if count == 0 {
            continue;
        }
        let mean = sum / count as f64;
        let decay = if mean > 0.5 {
            1.0 - 0.9 * ((mean - 0.5) / 0.4).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let effective = resistance * decay;

        for row in 0..t {
            if population.get(row, j) <= 0.0 {
                continue;
            }
            let raw = mortality.get(row, j);
            let mut adjusted = raw * (1.0 - effective);
            if raw > 0.6 {
                adjusted = adjusted.max(GENERATIONAL_FLOOR_FACTOR * raw);
            }
            mortality.set(row, j, adjusted);
        }
    }
}

/// Survivor lottery. Spikes below the threshold act only through the
/// environmental component's global term; no extra fold happens here. Above
/// it, mortality saturates: every species is floored at the spike target,
/// except the lottery survivors whose rate is soft-capped at 0.80.
fn apply_survivor_lottery(ctx: &MortalityContext, population: &Matrix, mortality: &mut Matrix) {
    let spike = ctx.modifiers.get(Modifier::MortalitySpike);
    if spike <= LOTTERY_SPIKE_THRESHOLD {
        return;
    }
    let t = ctx.tiles.len();

    let survivors = lottery_survivors(ctx);
    let target = catastrophe_target(spike);
    for j in 0..ctx.species.len() {
        let survivor = survivors.contains(&j);
        for row in 0..t {
            if population.get(row, j) <= 0.0 {
                continue;
            }
            let v = mortality.get(row, j);
            if survivor {
                mortality.set(row, j, v.min(LOTTERY_MORTALITY_CAP));
            } else {
                mortality.set(row, j, v.max(target));
            }
        }
    }
}

pub fn catastrophe_target(spike: f64) -> f64 {
    (0.85 * sigmoid(0.03 * spike - 3.0) + 0.3).min(0.99)
}

/// Deterministic survivor draw: each species rolls against a chance raised
/// by environmental tolerance (roughly 5-30%); the set is never empty, the
/// closest miss is pulled in when every roll fails.
pub fn lottery_survivors(ctx: &MortalityContext) -> std::collections::BTreeSet<usize> {
    let spike = ctx.modifiers.get(Modifier::MortalitySpike);
    let mut survivors = std::collections::BTreeSet::new();
    if spike <= LOTTERY_SPIKE_THRESHOLD || ctx.species.is_empty() {
        return survivors;
    }
    let mut best_miss: Option<(usize, f64)> = None;
    for (j, species) in ctx.species.iter().enumerate() {
        if !species.is_alive() {
            continue;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(
            (j as u64 + 1)
                .wrapping_mul(spike.to_bits())
                .wrapping_add(ctx.map_seed),
        );
        let chance = 0.05 + 0.25 * species.environmental_tolerance();
        let margin = rng.gen::<f64>() - chance;
        if margin < 0.0 {
            survivors.insert(j);
        } else if best_miss.map(|(_, m)| margin < m).unwrap_or(true) {
            best_miss = Some((j, margin));
        }
    }
    if survivors.is_empty() {
        if let Some((j, _)) = best_miss {
            survivors.insert(j);
        }
    }
    survivors
}
