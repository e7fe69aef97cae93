//! Food-web pressures: trophic-pyramid scarcity, metabolic resource
//! shortage, and the predation-network starvation/hunting terms.

use deeptime_data::Modifier;

use crate::matrix::Matrix;

use super::consts::*;
use super::MortalityContext;

/// Kleiber-indexed biomass of one cell: population times weight^0.75, with
/// weight floored at one gram so microbial populations still register as
/// food for the level above.
fn kleiber_biomass(ctx: &MortalityContext, population: &Matrix, row: usize, j: usize) -> f64 {
    population.get(row, j) * ctx.species[j].body_weight_g().max(1.0).powf(0.75)
}

fn integer_level(trophic: f64) -> usize {
    (trophic.floor() as usize).clamp(1, 5)
}

pub fn trophic_pressure(ctx: &MortalityContext, population: &Matrix) -> Matrix {
    let t = ctx.tiles.len();
    let s = ctx.species.len();
    let mut out = Matrix::zeros(t, s);

    for row in 0..t {
        // Biomass per integer trophic level on this tile.
        let mut biomass = [0.0f64; 6];
        for j in 0..s {
            if population.get(row, j) > 0.0 {
                biomass[integer_level(ctx.species[j].trophic_level)] +=
                    kleiber_biomass(ctx, population, row, j);
            }
        }

        for j in 0..s {
            if population.get(row, j) <= 0.0 {
                continue;
            }
            let level = integer_level(ctx.species[j].trophic_level);
            let mut pressure = 0.0f64;

            if level >= 2 {
                // This species needs the level below.
                let own = biomass[level];
                let below = biomass[level - 1];
                let requirement = own / TRANSFER_EFFICIENCY;
                if below <= 1e-9 {
                    pressure += SEVERE_STARVATION_PENALTY;
                } else {
                    let scarcity = ((requirement / below) - 1.0).clamp(0.0, 1.0) * SCARCITY_WEIGHT;
                    pressure += scarcity;
                    if below > 1.5 * requirement {
                        let bonus = 0.05 * (below / requirement - 1.5);
                        pressure -= bonus.min(ABUNDANCE_BONUS_CAP);
                    }
                }
            }

            if level < 5 {
                // Grazing load from the level above.
                let above = biomass[level + 1];
                let own = biomass[level];
                if above > 0.0 && own > 1e-9 {
                    let requirement = above / TRANSFER_EFFICIENCY;
                    pressure += (0.5 * requirement / own).min(0.8);
                }
            }

            out.set(row, j, pressure.clamp(-ABUNDANCE_BONUS_CAP, TROPHIC_CAP));
        }
    }
    out
}

pub struct ResourceOutcome {
    pub pressure: Matrix,
    /// Population-weighted mean per species, reported on the result.
    pub mean_by_species: Vec<f64>,
}

pub fn resource_pressure(ctx: &MortalityContext, population: &Matrix) -> ResourceOutcome {
    let t = ctx.tiles.len();
    let s = ctx.species.len();
    let mut out = Matrix::zeros(t, s);

    let boost = 1.0
        + ctx.modifiers.get(Modifier::ResourceBoost)
        + ctx.modifiers.get(Modifier::Productivity);

    let demand_per_unit: Vec<f64> = ctx
        .species
        .iter()
        .map(|sp| METABOLIC_COEF * sp.body_weight_g().max(1.0).powf(0.75) * sp.metabolic_rate())
        .collect();

    for (row, tile) in ctx.tiles.tiles.iter().enumerate() {
        let mut demand_total = 0.0;
        let mut demand: Vec<f64> = vec![0.0; s];
        for j in 0..s {
            let d = population.get(row, j) * demand_per_unit[j];
            demand[j] = d;
            demand_total += d;
        }
        if demand_total <= 0.0 {
            continue;
        }
        let supply = tile.resources * RESOURCE_CONVERSION * HARVESTABLE_FRACTION * boost.max(0.1);
        let shortage = ((demand_total - supply) / demand_total).max(0.0);
        if shortage <= 0.0 {
            continue;
        }
        let escalation = if shortage > 0.8 { 1.5 } else { 1.0 };
        for j in 0..s {
            if demand[j] <= 0.0 {
                continue;
            }
            let share = (2.0 * demand[j] / demand_total).min(1.0);
            out.set(row, j, (shortage * share * escalation).clamp(0.0, RES_CAP));
        }
    }

    let mut mean_by_species = vec![0.0; s];
    for j in 0..s {
        let mut weighted = 0.0;
        let mut weight = 0.0;
        for row in 0..t {
            let pop = population.get(row, j);
            if pop > 0.0 {
                weighted += out.get(row, j) * pop;
                weight += pop;
            }
        }
        if weight > 0.0 {
            mean_by_species[j] = weighted / weight;
        }
    }

    ResourceOutcome {
        pressure: out,
        mean_by_species,
    }
}

/// Predator starvation from missing prey biomass plus hunting pressure on
/// prey. Producers skip starvation.
pub fn predation_network_pressure(ctx: &MortalityContext, population: &Matrix) -> Matrix {
    let t = ctx.tiles.len();
    let s = ctx.species.len();
    let mut out = Matrix::zeros(t, s);

    for row in 0..t {
        let biomass: Vec<f64> = (0..s)
            .map(|j| kleiber_biomass(ctx, population, row, j))
            .collect();

        for i in 0..s {
            if biomass[i] <= 0.0 {
                continue;
            }
            let mut pressure = 0.0f64;

            // Starvation: preference-weighted available prey against need.
            if ctx.species[i].trophic_level >= 2.0 {
                let available: f64 = (0..s)
                    .map(|j| ctx.predation.get(i, j) * biomass[j])
                    .sum();
                let need = 0.1 * biomass[i];
                if need > 0.0 {
                    let deficit = ((need - available) / need).max(0.0);
                    pressure += deficit.powf(1.5) * 0.5;
                }
            }

            // Hunting load from everything that prefers this species.
            let hunted: f64 = (0..s)
                .map(|j| ctx.predation.get(j, i) * 0.1 * biomass[j])
                .sum();
            if hunted > 0.0 {
                let ratio = hunted / biomass[i].max(1e-9);
                pressure += (2.0 * sigmoid(ratio) - 1.0) * 0.3;
            }

            out.set(row, i, pressure.clamp(0.0, PRED_CAP));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_level_clamps() {
        assert_eq!(integer_level(1.0), 1);
        assert_eq!(integer_level(3.4), 3);
        assert_eq!(integer_level(5.5), 5);
        assert_eq!(integer_level(0.5), 1);
    }
}
