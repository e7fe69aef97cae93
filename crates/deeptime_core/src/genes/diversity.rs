//! Gene-diversity radius dynamics.
//!
//! Each species carries a reachability radius in embedding space. The radius
//! grows slowly toward an equilibrium set by population and mutation rate,
//! shrinks when activations spend it, and gates which adaptations are
//! reachable at all.

use deeptime_data::Species;
use deeptime_net::cosine;

#[derive(Debug, Clone)]
pub struct GeneDiversityService {
    pub r_min: f64,
    pub r_max: f64,
    pub growth_rate: f64,
    pub activation_cost: f64,
    pub discovery_bonus: f64,
}

impl Default for GeneDiversityService {
    fn default() -> Self {
        Self {
            r_min: 0.15,
            r_max: 1.0,
            growth_rate: 0.02,
            activation_cost: 0.05,
            discovery_bonus: 0.03,
        }
    }
}

impl GeneDiversityService {
    /// Equilibrium radius: bigger populations and faster mutators hold more
    /// standing variation.
    fn equilibrium(&self, species: &Species) -> f64 {
        let pop_term = ((species.population.max(1) as f64).log10() / 9.0).clamp(0.0, 1.0);
        let mutation = species.hidden("mutation_rate");
        (self.r_min + (self.r_max - self.r_min) * (0.4 * pop_term + 0.6 * mutation))
            .clamp(self.r_min, self.r_max)
    }

    /// Per-turn drift toward equilibrium, dampened by gene stability.
    pub fn per_turn_update(&self, species: &mut Species) {
        let target = self.equilibrium(species);
        let rate = self.growth_rate * (1.0 - 0.5 * species.gene_stability);
        let current = species.gene_diversity_radius;
        species.gene_diversity_radius =
            (current + (target - current) * rate).clamp(self.r_min, self.r_max);
    }

    /// A child starts near the parent with a small novelty kick.
    pub fn inherit(&self, parent: &Species) -> f64 {
        (parent.gene_diversity_radius * 0.9 + 0.1 * self.r_max).clamp(self.r_min, self.r_max)
    }

    /// Activating a dormant gene spends diversity.
    pub fn consume_on_activation(&self, species: &mut Species) {
        species.gene_diversity_radius =
            (species.gene_diversity_radius - self.activation_cost).max(self.r_min);
    }

    /// Discovering a new organ line widens the pool slightly.
    pub fn grant_discovery_bonus(&self, species: &mut Species) {
        species.gene_diversity_radius =
            (species.gene_diversity_radius + self.discovery_bonus).min(self.r_max);
    }

    /// Whether a target direction in embedding space lies inside the
    /// diversity ball of radius `r` around the species vector.
    pub fn is_reachable(&self, species_vec: &[f32], target_vec: &[f32], r: f64) -> bool {
        if species_vec.is_empty() || target_vec.is_empty() {
            // No vector yet: treat as reachable and let validation gate it.
            return true;
        }
        let distance = 1.0 - cosine(species_vec, target_vec);
        distance <= r * 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_io::seed::seed_species;
    use deeptime_net::local_embedding;

    #[test]
    fn test_radius_never_below_min() {
        let service = GeneDiversityService::default();
        let mut species = seed_species().remove(0);
        species.gene_diversity_radius = 0.16;
        for _ in 0..10 {
            service.consume_on_activation(&mut species);
        }
        assert!((species.gene_diversity_radius - service.r_min).abs() < 1e-12);
    }

    #[test]
    fn test_update_moves_toward_equilibrium() {
        let service = GeneDiversityService::default();
        let mut species = seed_species().remove(0);
        species.population = 1_000_000_000;
        species.hidden_traits.insert("mutation_rate".into(), 0.9);
        species.gene_diversity_radius = 0.2;
        let before = species.gene_diversity_radius;
        service.per_turn_update(&mut species);
        assert!(species.gene_diversity_radius > before);
    }

    #[test]
    fn test_reachability_wide_radius() {
        let service = GeneDiversityService::default();
        let a = local_embedding("cold tolerant mat");
        let b = local_embedding("heat loving vent organism");
        assert!(service.is_reachable(&a, &b, 1.0));
        assert!(service.is_reachable(&a, &a, 0.15));
    }

    #[test]
    fn test_inherit_stays_in_bounds() {
        let service = GeneDiversityService::default();
        let parent = seed_species().remove(0);
        let r = service.inherit(&parent);
        assert!(r >= service.r_min && r <= service.r_max);
    }
}
