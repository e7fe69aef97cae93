//! Interference competition and plant-specific light/nutrient competition.

use crate::matrix::Matrix;

use super::consts::*;
use super::MortalityContext;

/// Trophic proximity coefficient: full competition inside half a level,
/// weak beyond a full level.
fn trophic_coef(a: f64, b: f64) -> f64 {
    let gap = (a - b).abs();
    if gap < 0.5 {
        1.0
    } else if gap < 1.0 {
        0.6
    } else {
        0.2
    }
}

pub fn competition_pressure(ctx: &MortalityContext, population: &Matrix) -> Matrix {
    let t = ctx.tiles.len();
    let s = ctx.species.len();
    let mut out = Matrix::zeros(t, s);

    for row in 0..t {
        for i in 0..s {
            let own = population.get(row, i);
            if own <= 0.0 {
                continue;
            }
            let mut total = 0.0;
            for j in 0..s {
                if i == j {
                    continue;
                }
                let other = population.get(row, j);
                if other <= 0.0 {
                    continue;
                }
                let ratio = (other / own.max(1.0)).min(3.0);
                let pair = ctx.sim.get(i, j)
                    * trophic_coef(ctx.species[i].trophic_level, ctx.species[j].trophic_level)
                    * COMP_BASE_COEF
                    * ratio;
                total += pair.min(COMP_PAIR_CAP);
                if total >= COMP_CAP {
                    total = COMP_CAP;
                    break;
                }
            }
            out.set(row, i, total);
        }
    }
    out
}

/// Light and nutrient competition among co-tile plants. Taller plants shade
/// shorter ones; nutrient pressure scales with plant density against the
/// tile's resources; embedding similarity amplifies both.
pub fn plant_competition_pressure(ctx: &MortalityContext, population: &Matrix) -> Matrix {
    let t = ctx.tiles.len();
    let s = ctx.species.len();
    let mut out = Matrix::zeros(t, s);

    let plants: Vec<usize> = (0..s).filter(|&i| ctx.species[i].is_plant()).collect();
    if plants.len() < 2 {
        return out;
    }

    for (row, tile) in ctx.tiles.tiles.iter().enumerate() {
        let present: Vec<usize> = plants
            .iter()
            .copied()
            .filter(|&i| population.get(row, i) > 0.0)
            .collect();
        if present.len() < 2 {
            continue;
        }

        let supply = (tile.resources * RESOURCE_CONVERSION).max(1.0);
        let total_demand: f64 = present
            .iter()
            .map(|&i| {
                population.get(row, i)
                    * METABOLIC_COEF
                    * ctx.species[i].body_weight_g().max(1.0).powf(0.75)
            })
            .sum();
        let density = (total_demand / supply).min(1.0);

        for &i in &present {
            let height_i = ctx.species[i].body_length_cm().max(1e-6);
            let light_demand = ctx.species[i].trait_value("light_demand") / 10.0;
            let mut light = 0.0;
            for &j in &present {
                if i == j {
                    continue;
                }
                let height_j = ctx.species[j].body_length_cm().max(1e-6);
                if height_j > height_i {
                    let shading = 0.1 * (height_j / height_i).log10().min(2.0).max(0.0);
                    light += shading * light_demand * (0.5 + 0.5 * ctx.sim.get(i, j));
                }
            }
            let nutrient = 0.25 * density * (0.5 + 0.5 * avg_sim(ctx, i, &present));
            out.set(row, i, (light + nutrient).clamp(0.0, PLANT_CAP));
        }
    }
    out
}

fn avg_sim(ctx: &MortalityContext, i: usize, present: &[usize]) -> f64 {
    let others: Vec<f64> = present
        .iter()
        .filter(|&&j| j != i)
        .map(|&j| ctx.sim.get(i, j))
        .collect();
    if others.is_empty() {
        0.0
    } else {
        others.iter().sum::<f64>() / others.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trophic_coef_bands() {
        assert_eq!(trophic_coef(2.0, 2.2), 1.0);
        assert_eq!(trophic_coef(2.0, 2.7), 0.6);
        assert_eq!(trophic_coef(2.0, 4.0), 0.2);
    }
}
