//! Predation relations: prey inference for species without explicit prey
//! lists, and the pairwise preference matrix the mortality engine consumes.

use std::collections::BTreeMap;

use deeptime_data::{DietType, Species};

use crate::index::HabitatIndex;
use crate::matrix::Matrix;

/// Trophic gap a predator can reach down.
const PREY_RANGE_MIN: f64 = 0.5;
const PREY_RANGE_MAX: f64 = 1.5;

pub struct PredationState {
    /// pred[i][j] = preference of predator i for prey j; 0 for non-prey.
    pub preference: Matrix,
    /// Inferred or declared prey codes per predator code.
    pub prey_of: BTreeMap<String, Vec<String>>,
}

pub struct PredationService;

impl PredationService {
    /// Fills in `prey_species`/`prey_preferences` for consumers that have
    /// none: candidates in trophic reach, habitat-compatible, weighted by
    /// similarity and tile overlap, normalized to sum at most 1.
    pub fn infer_prey(species: &mut [Species], sim: &Matrix, habitats: &HabitatIndex) {
        let snapshot: Vec<(usize, String, i64, f64, bool)> = species
            .iter()
            .enumerate()
            .map(|(i, s)| {
                (
                    i,
                    s.lineage_code.clone(),
                    s.id,
                    s.trophic_level,
                    s.is_alive(),
                )
            })
            .collect();

        for i in 0..species.len() {
            let predator = &species[i];
            if !predator.is_alive()
                || matches!(predator.diet_type, DietType::Autotroph | DietType::Detritivore)
                || !predator.prey_species.is_empty()
            {
                continue;
            }
            let own_level = predator.trophic_level;
            let own_id = predator.id;
            let mut weights: Vec<(String, f64)> = Vec::new();
            for (j, code, id, level, alive) in &snapshot {
                if *j == i || !alive {
                    continue;
                }
                let gap = own_level - level;
                if !(PREY_RANGE_MIN..=PREY_RANGE_MAX).contains(&gap) {
                    continue;
                }
                let spatial = habitats.tile_overlap(own_id, *id);
                if spatial <= 0.0 {
                    continue;
                }
                // Moderate similarity means catchable but distinct.
                let affinity = 1.0 - (sim.get(i, *j) - 0.4).abs();
                weights.push((code.clone(), (spatial * affinity).max(0.0)));
            }
            if weights.is_empty() {
                continue;
            }
            let total: f64 = weights.iter().map(|(_, w)| w).sum();
            if total <= 0.0 {
                continue;
            }
            let predator = &mut species[i];
            for (code, w) in weights {
                predator.prey_species.insert(code.clone());
                predator.prey_preferences.insert(code, w / total);
            }
        }
    }

    /// Builds the preference matrix over the given species order.
    pub fn build_matrix(species: &[Species]) -> PredationState {
        let n = species.len();
        let index: BTreeMap<&str, usize> = species
            .iter()
            .enumerate()
            .map(|(i, s)| (s.lineage_code.as_str(), i))
            .collect();
        let mut preference = Matrix::zeros(n, n);
        let mut prey_of = BTreeMap::new();
        for (i, predator) in species.iter().enumerate() {
            let mut prey_codes = Vec::new();
            for (code, weight) in &predator.prey_preferences {
                if let Some(&j) = index.get(code.as_str()) {
                    if species[j].is_alive() {
                        preference.set(i, j, *weight);
                        prey_codes.push(code.clone());
                    }
                }
            }
            prey_of.insert(predator.lineage_code.clone(), prey_codes);
        }
        PredationState { preference, prey_of }
    }

    /// Fraction of a predator's preference mass still backed by living prey.
    pub fn food_dependency(species: &Species, alive_codes: &BTreeMap<String, bool>) -> f64 {
        species
            .prey_preferences
            .iter()
            .filter(|(code, _)| alive_codes.get(*code).copied().unwrap_or(false))
            .map(|(_, w)| w)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HabitatIndex;
    use deeptime_data::HabitatRecord;
    use deeptime_io::seed::seed_species;

    #[test]
    fn test_infer_prey_for_grazer() {
        let mut species = seed_species();
        for (i, s) in species.iter_mut().enumerate() {
            s.id = i as i64 + 1;
        }
        species[1].trophic_level = 2.0;
        species[1].diet_type = DietType::Herbivore;
        species[1].prey_species.clear();
        let habitats = HabitatIndex::new(vec![
            HabitatRecord::new(1, 1, 100, 0.5, 0),
            HabitatRecord::new(1, 2, 100, 0.5, 0),
            HabitatRecord::new(1, 3, 100, 0.5, 0),
        ]);
        let sim = Matrix::zeros(3, 3);
        PredationService::infer_prey(&mut species, &sim, &habitats);
        assert!(species[1].prey_species.contains("A1"));
        let total: f64 = species[1].prey_preferences.values().sum();
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn test_build_matrix_respects_order() {
        let mut species = seed_species();
        species[2].trophic_level = 2.0;
        species[2].prey_species.insert("A1".into());
        species[2].prey_preferences.insert("A1".into(), 0.8);
        let state = PredationService::build_matrix(&species);
        assert!((state.preference.get(2, 0) - 0.8).abs() < 1e-12);
        assert_eq!(state.preference.get(0, 2), 0.0);
    }
}
