//! Kin competition and niche-overlap resolution.
//!
//! Species are grouped by trophic band; within each group, pairwise fitness
//! and kinship decide whether a pair fights (kin competition), coexists
//! under proportional pressure, or ignores each other. The output modifiers
//! are added to mortality and reproduction downstream.

use std::collections::BTreeMap;

use deeptime_data::data::species::kin_generations;
use deeptime_data::{NicheMetrics, Species};

#[derive(Debug, Clone, Copy, Default)]
pub struct KinModifiers {
    /// Added to the species death rate; negative means relief.
    pub mortality: f64,
    /// Multiplied into the reproduction rate as (1 + value).
    pub reproduction: f64,
}

#[derive(Debug, Clone)]
pub struct KinConfig {
    pub weight_population: f64,
    pub weight_reproduction: f64,
    pub weight_resistance: f64,
    pub weight_specialization: f64,
    pub kin_generation_limit: u32,
    pub disadvantage_threshold: f64,
    pub competition_multiplier: f64,
    pub contested_coef: f64,
    pub winner_reduction_cap: f64,
    pub non_kin_multiplier: f64,
}

impl Default for KinConfig {
    fn default() -> Self {
        Self {
            weight_population: 0.30,
            weight_reproduction: 0.25,
            weight_resistance: 0.15,
            weight_specialization: 0.10,
            kin_generation_limit: 4,
            disadvantage_threshold: 0.08,
            competition_multiplier: 0.25,
            contested_coef: 0.4,
            winner_reduction_cap: 0.12,
            non_kin_multiplier: 0.8,
        }
    }
}

pub struct KinCompetitionCalculator {
    config: KinConfig,
}

impl Default for KinCompetitionCalculator {
    fn default() -> Self {
        Self {
            config: KinConfig::default(),
        }
    }
}

impl KinCompetitionCalculator {
    pub fn new(config: KinConfig) -> Self {
        Self { config }
    }

    pub fn calculate(
        &self,
        species: &[Species],
        niche: &BTreeMap<String, NicheMetrics>,
        recent_death_rates: &BTreeMap<String, f64>,
        turn_index: u64,
    ) -> BTreeMap<String, KinModifiers> {
        let mut out: BTreeMap<String, KinModifiers> = BTreeMap::new();

        // Group by trophic band.
        let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, s) in species.iter().enumerate() {
            if s.is_alive() {
                groups
                    .entry((s.trophic_band() * 2.0) as i64)
                    .or_default()
                    .push(i);
            }
        }

        for members in groups.values() {
            if members.len() < 2 {
                continue;
            }
            let group_mean_pop = members
                .iter()
                .map(|&i| species[i].population as f64)
                .sum::<f64>()
                / members.len() as f64;
            let fitness: Vec<f64> = members
                .iter()
                .map(|&i| {
                    self.fitness_of(
                        &species[i],
                        group_mean_pop,
                        recent_death_rates
                            .get(&species[i].lineage_code)
                            .copied()
                            .unwrap_or(0.0),
                        turn_index,
                    )
                })
                .collect();
            let total_fitness: f64 = fitness.iter().sum();

            for a in 0..members.len() {
                for b in (a + 1)..members.len() {
                    let (ia, ib) = (members[a], members[b]);
                    let sa = &species[ia];
                    let sb = &species[ib];
                    let overlap_a = niche.get(&sa.lineage_code).map(|m| m.overlap).unwrap_or(0.0);
                    let overlap_b = niche.get(&sb.lineage_code).map(|m| m.overlap).unwrap_or(0.0);
                    let avg_overlap = (overlap_a + overlap_b) / 2.0;

                    let generations = kin_generations(&sa.lineage_code, &sb.lineage_code);
                    let is_kin = generations
                        .map(|g| g <= self.config.kin_generation_limit)
                        .unwrap_or(false);

                    if avg_overlap > 0.6 || (avg_overlap > 0.3 && is_kin) {
                        let kin_bonus = if is_kin { 1.3 } else { 1.0 };
                        self.apply_kin_competition(
                            &mut out,
                            sa,
                            sb,
                            fitness[a],
                            fitness[b],
                            avg_overlap,
                            kin_bonus,
                        );
                    } else if avg_overlap > 0.3 {
                        // Non-kin moderate overlap: proportional coexistence.
                        let base = avg_overlap * self.config.non_kin_multiplier * 0.1;
                        if total_fitness > 0.0 {
                            out.entry(sa.lineage_code.clone()).or_default().mortality +=
                                base * (1.0 - fitness[a] / total_fitness);
                            out.entry(sb.lineage_code.clone()).or_default().mortality +=
                                base * (1.0 - fitness[b] / total_fitness);
                        }
                    }
                }
            }
        }
        out
    }

    fn fitness_of(
        &self,
        species: &Species,
        group_mean_pop: f64,
        recent_death_rate: f64,
        turn_index: u64,
    ) -> f64 {
        let c = &self.config;
        let pop_factor = if group_mean_pop > 0.0 {
            (species.population as f64 / group_mean_pop).min(2.0) / 2.0
        } else {
            0.5
        };
        let repro = species.trait_value("reproductive_speed") / 10.0;
        let resist = species.environmental_tolerance();
        let specialization = 1.0 - species.evolution_potential();
        let trend = (1.0 - 1.5 * recent_death_rate).max(0.0);
        let age = species.age(turn_index);
        let age_factor = if age <= 3 {
            0.7
        } else if age <= 10 {
            0.5
        } else {
            0.3
        };

        (pop_factor * c.weight_population * 0.8
            + repro * c.weight_reproduction * 0.8
            + resist * c.weight_resistance
            + specialization * c.weight_specialization
            + trend * 0.15
            + age_factor * 0.05)
            .clamp(0.0, 1.0)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_kin_competition(
        &self,
        out: &mut BTreeMap<String, KinModifiers>,
        sa: &Species,
        sb: &Species,
        fit_a: f64,
        fit_b: f64,
        overlap: f64,
        kin_bonus: f64,
    ) {
        let c = &self.config;
        let diff = fit_a - fit_b;
        let avg_repro =
            (sa.trait_value("reproductive_speed") + sb.trait_value("reproductive_speed")) / 2.0;
        let generation_speed = (0.6 + 0.08 * avg_repro).clamp(0.68, 1.4);

        if diff.abs() < c.disadvantage_threshold {
            // Contested: both pay.
            let cost = overlap * c.competition_multiplier * kin_bonus * c.contested_coef;
            out.entry(sa.lineage_code.clone()).or_default().mortality += cost;
            out.entry(sb.lineage_code.clone()).or_default().mortality += cost;
            return;
        }

        let (winner, loser) = if diff > 0.0 { (sa, sb) } else { (sb, sa) };
        let magnitude = overlap * c.competition_multiplier * kin_bonus * diff.abs()
            * generation_speed
            * 0.5;
        let winner_gain = magnitude.min(c.winner_reduction_cap);
        // Losers squeezed harder when the niches barely differ.
        let refuge_factor = 1.0 - (1.0 - overlap) * 0.5;

        {
            let w = out.entry(winner.lineage_code.clone()).or_default();
            w.mortality -= winner_gain;
            w.reproduction += 0.5;
        }
        {
            let l = out.entry(loser.lineage_code.clone()).or_default();
            l.mortality += magnitude * refuge_factor;
            l.reproduction -= 0.2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_io::seed::seed_species;

    fn metrics(overlap: f64) -> NicheMetrics {
        NicheMetrics {
            overlap,
            saturation: 1.0,
        }
    }

    #[test]
    fn test_high_overlap_produces_winner_and_loser() {
        let mut species = seed_species();
        // Same band, one far larger.
        species[0].population = 10_000_000;
        species[1].population = 10_000;
        let niche: BTreeMap<String, NicheMetrics> = [
            ("A1".to_string(), metrics(0.8)),
            ("B1".to_string(), metrics(0.8)),
            ("C1".to_string(), metrics(0.0)),
        ]
        .into_iter()
        .collect();
        let calc = KinCompetitionCalculator::default();
        let result = calc.calculate(&species, &niche, &BTreeMap::new(), 5);
        let a1 = result.get("A1").copied().unwrap_or_default();
        let b1 = result.get("B1").copied().unwrap_or_default();
        assert!(a1.mortality < b1.mortality);
    }

    #[test]
    fn test_low_overlap_no_competition() {
        let species = seed_species();
        let niche: BTreeMap<String, NicheMetrics> = species
            .iter()
            .map(|s| (s.lineage_code.clone(), metrics(0.1)))
            .collect();
        let calc = KinCompetitionCalculator::default();
        let result = calc.calculate(&species, &niche, &BTreeMap::new(), 1);
        assert!(result.values().all(|m| m.mortality.abs() < 1e-12));
    }

    #[test]
    fn test_different_bands_never_compete() {
        let mut species = seed_species();
        species[1].trophic_level = 3.0;
        let niche: BTreeMap<String, NicheMetrics> = species
            .iter()
            .map(|s| (s.lineage_code.clone(), metrics(0.9)))
            .collect();
        let calc = KinCompetitionCalculator::default();
        let result = calc.calculate(&species, &niche, &BTreeMap::new(), 1);
        // B1 sits alone in its band; no modifiers for it.
        assert!(result.get("B1").map(|m| m.mortality).unwrap_or(0.0).abs() < 1e-9
            || result.get("B1").is_none());
    }
}
