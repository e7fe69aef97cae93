//! Environmental pressure: temperature band deviation, drought, flood,
//! special events, the mortality-spike catastrophe term, and synergies.

use deeptime_data::Modifier;

use crate::matrix::Matrix;

use super::consts::*;
use super::MortalityContext;

/// Weights over (temp, drought, flood, special, global, synergy).
const WEIGHTS_EXTREME: [f64; 6] = [0.50, 0.12, 0.08, 0.20, 0.10, 0.00];
const WEIGHTS_NORMAL: [f64; 6] = [0.30, 0.15, 0.10, 0.28, 0.17, 0.25];

pub fn environmental_pressure(ctx: &MortalityContext, population: &Matrix) -> Matrix {
    let t = ctx.tiles.len();
    let s = ctx.species.len();

    let temp_mod = ctx.modifiers.get(Modifier::Temperature);
    let drought_mod = ctx.modifiers.get(Modifier::Drought);
    let flood_mod = ctx.modifiers.get(Modifier::Flood);
    let disease_mod = ctx.modifiers.get(Modifier::Disease);
    let wildfire_mod = ctx.modifiers.get(Modifier::Wildfire);
    let uv_mod = ctx.modifiers.get(Modifier::UvRadiation);
    let sulfide_mod = ctx.modifiers.get(Modifier::Sulfide);
    let salinity_mod = ctx.modifiers.get(Modifier::SalinityChange);
    let spike = ctx.modifiers.get(Modifier::MortalitySpike);

    let boost = ctx.modifiers.get(Modifier::ResourceBoost)
        + ctx.modifiers.get(Modifier::Productivity).max(0.0)
        + ctx.modifiers.get(Modifier::Oxygen).max(0.0)
        + ctx.modifiers.get(Modifier::HabitatExpansion);
    let positive_discount = (0.25 * boost).min(0.30).max(0.0);

    // Saturating catastrophe term shared by every occupied cell.
    let global_term = if spike > 0.0 {
        0.85 * sigmoid(0.03 * spike - 3.0)
    } else {
        0.0
    };

    // First pass: raw temperature pressure decides the weighting regime.
    let mut temp_terms = Matrix::zeros(t, s);
    for (row, tile) in ctx.tiles.tiles.iter().enumerate() {
        let in_region = region_contains(ctx, tile.id);
        let shift = if in_region { 5.0 * temp_mod } else { 0.0 };
        let effective = tile.temperature + shift;
        for (j, species) in ctx.species.iter().enumerate() {
            if population.get(row, j) <= 0.0 {
                continue;
            }
            let (deviation, cold_side) = band_deviation(effective);
            let raw = 2.0 * (sigmoid(deviation / 15.0) - 0.5);
            let extra = if effective < TEMP_OUTER_LOW {
                (TEMP_OUTER_LOW - effective) * 0.01
            } else if effective > TEMP_OUTER_HIGH {
                (effective - TEMP_OUTER_HIGH) * 0.01
            } else {
                0.0
            };
            let tolerance = if cold_side {
                species.trait_value("cold_resistance")
            } else {
                species.trait_value("heat_resistance")
            };
            let factor = MIN_PRESSURE_FACTOR + 0.70 * (1.0 - tolerance / 10.0);
            temp_terms.set(row, j, ((raw + extra) * factor).clamp(0.0, 1.0));
        }
    }

    let occupied: Vec<f64> = temp_terms
        .values()
        .iter()
        .zip(population.values())
        .filter(|(_, pop)| **pop > 0.0)
        .map(|(v, _)| *v)
        .collect();
    let avg_temp_pressure = if occupied.is_empty() {
        0.0
    } else {
        occupied.iter().sum::<f64>() / occupied.len() as f64
    };
    let extreme_climate = avg_temp_pressure > 0.3;
    let weights = normalized_weights(extreme_climate);

    let mut out = Matrix::zeros(t, s);
    for (row, tile) in ctx.tiles.tiles.iter().enumerate() {
        let in_region = region_contains(ctx, tile.id);
        let shift = if in_region { 5.0 * temp_mod } else { 0.0 };
        let effective = tile.temperature + shift;

        for (j, species) in ctx.species.iter().enumerate() {
            if population.get(row, j) <= 0.0 {
                continue;
            }
            let temp_term = temp_terms.get(row, j);

            // Drought reduces effective humidity; aquatic life is immune.
            let drought_term = if species.habitat_type.is_aquatic() || !in_region {
                drought_base(tile.humidity, 0.0, species)
            } else {
                drought_base(tile.humidity, drought_mod, species)
            };

            let flood_term = if species.habitat_type.is_land_bound() && in_region {
                (0.08 * flood_mod * (1.0 - species.trait_value("mobility") / 10.0)).clamp(0.0, 1.0)
            } else {
                0.0
            };

            let special_term = if in_region {
                special_events(
                    species,
                    disease_mod,
                    wildfire_mod,
                    uv_mod,
                    sulfide_mod,
                    salinity_mod,
                )
            } else {
                0.0
            };

            let synergy_term = synergies(species, effective, tile.humidity, tile.elevation, uv_mod);

            let combined = weights[0] * temp_term
                + weights[1] * drought_term
                + weights[2] * flood_term
                + weights[3] * special_term
                + weights[4] * global_term
                + weights[5] * synergy_term;

            out.set(row, j, (combined * (1.0 - positive_discount)).clamp(0.0, ENV_CAP));
        }
    }
    out
}

fn region_contains(ctx: &MortalityContext, tile_id: i64) -> bool {
    match &ctx.modifiers.region {
        Some(region) => region.contains(&tile_id),
        None => true,
    }
}

/// Distance outside the optimal band, and whether the cold side binds.
fn band_deviation(temperature: f64) -> (f64, bool) {
    if temperature < TEMP_BAND_LOW {
        (TEMP_BAND_LOW - temperature, true)
    } else if temperature > TEMP_BAND_HIGH {
        (temperature - TEMP_BAND_HIGH, false)
    } else {
        (0.0, false)
    }
}

fn drought_base(humidity: f64, drought_mod: f64, species: &deeptime_data::Species) -> f64 {
    let effective_humidity = humidity - 0.1 * drought_mod;
    let shortfall = (0.5 - effective_humidity).max(0.0);
    let tolerance = species.trait_value("drought_resistance") / 10.0;
    (shortfall * 2.0 * (1.0 - tolerance)).clamp(0.0, 1.0)
}

fn special_events(
    species: &deeptime_data::Species,
    disease: f64,
    wildfire: f64,
    uv: f64,
    sulfide: f64,
    salinity: f64,
) -> f64 {
    let mut total = 0.0;
    if disease > 0.0 {
        // Contagion scales with sociality; immunity discounts.
        let sociality = species.trait_value("sociality") / 10.0;
        let immunity = species.trait_value("immunity") / 10.0;
        total += disease * (0.4 + 0.6 * sociality) * (1.0 - immunity) * 0.12;
    }
    if wildfire > 0.0 && species.habitat_type.is_land_bound() {
        let shelter = species
            .trait_value("fire_resistance")
            .max(species.trait_value("defense"))
            / 10.0;
        total += wildfire * (1.0 - shelter) * 0.10;
    }
    if uv > 0.0 {
        let shield = species.trait_value("uv_resistance") / 10.0;
        total += uv * (1.0 - shield) * 0.08;
    }
    if sulfide > 0.0 {
        let detox = species.trait_value("toxin_resistance") / 10.0;
        total += sulfide * (1.0 - detox) * 0.10;
    }
    if salinity.abs() > 0.0 && species.habitat_type.is_aquatic() {
        let tolerance = species.trait_value("salinity_resistance") / 10.0;
        total += salinity.abs() * (1.0 - tolerance) * 0.08;
    }
    total.clamp(0.0, 1.0)
}

fn synergies(
    species: &deeptime_data::Species,
    temperature: f64,
    humidity: f64,
    elevation: f64,
    uv_mod: f64,
) -> f64 {
    let mut total = 0.0;
    // Wet-bulb: heat is far deadlier when humid.
    if temperature > 28.0 && humidity > 0.6 {
        total += 0.3 * ((temperature - 28.0) / 10.0).min(1.0) * humidity;
    }
    // Hypoxia at altitude, scaled by body size.
    if elevation > 2500.0 {
        let size_factor = 0.3 + 0.7 * (species.body_weight_g() / 1e6).min(1.0);
        total += ((elevation - 2500.0) / 3000.0).min(1.0) * size_factor * 0.4;
    }
    // Thin dry air amplifies UV.
    if elevation > 1500.0 && humidity < 0.3 && uv_mod > 0.0 {
        total += 0.1 * uv_mod.min(1.0);
    }
    // Cold-humid chill.
    if temperature < 0.0 && humidity > 0.7 {
        total += 0.15 * (1.0 - species.trait_value("cold_resistance") / 10.0);
    }
    total.clamp(0.0, 1.0)
}

fn normalized_weights(extreme: bool) -> [f64; 6] {
    let raw = if extreme { WEIGHTS_EXTREME } else { WEIGHTS_NORMAL };
    let sum: f64 = raw.iter().sum();
    let mut out = raw;
    for w in &mut out {
        *w /= sum;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_deviation() {
        assert_eq!(band_deviation(15.0).0, 0.0);
        assert_eq!(band_deviation(-5.0), (10.0, true));
        assert_eq!(band_deviation(30.0), (5.0, false));
    }

    #[test]
    fn test_weights_normalized() {
        for extreme in [false, true] {
            let w = normalized_weights(extreme);
            assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
    }
}
