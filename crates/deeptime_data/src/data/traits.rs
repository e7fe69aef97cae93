use std::collections::BTreeMap;

/// Canonical abstract trait keys. Free-form keys are allowed; these are the
/// ones the engines read directly.
pub const COLD_RESISTANCE: &str = "cold_resistance";
pub const HEAT_RESISTANCE: &str = "heat_resistance";
pub const DROUGHT_RESISTANCE: &str = "drought_resistance";
pub const SALINITY_RESISTANCE: &str = "salinity_resistance";
pub const REPRODUCTIVE_SPEED: &str = "reproductive_speed";
pub const MOBILITY: &str = "mobility";
pub const AGGRESSION: &str = "aggression";
pub const DEFENSE: &str = "defense";
pub const SOCIALITY: &str = "sociality";
pub const PHOTOSYNTHETIC_EFFICIENCY: &str = "photosynthetic_efficiency";
pub const LIGHT_DEMAND: &str = "light_demand";
pub const IMMUNITY: &str = "immunity";
pub const TOXIN_RESISTANCE: &str = "toxin_resistance";
pub const UV_RESISTANCE: &str = "uv_resistance";

pub const TRAIT_MIN: f64 = 0.0;
pub const TRAIT_MAX: f64 = 10.0;

/// Value above which a trait counts as "specialized" for the count cap.
pub const BASE_CAP: f64 = 7.0;
/// Hard ceiling applied before proportional scaling.
pub const SPECIALIZED_CAP: f64 = 9.5;
/// At most this many traits may exceed BASE_CAP.
pub const MAX_SPECIALIZED: usize = 2;

/// Enforces per-trait range, a trophic-level-dependent cap on the trait sum,
/// and a cap on the number of specialized traits. Violations are projected
/// back onto the constraint set, never rejected outright.
pub struct TraitValidator;

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub clipped: Vec<String>,
    pub scaled: bool,
    pub despecialized: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.clipped.is_empty() && !self.scaled && self.despecialized.is_empty()
    }
}

impl TraitValidator {
    /// Sum budget grows with trophic level: low-level generalists get less
    /// room than apex specialists.
    pub fn sum_cap(trophic_level: f64) -> f64 {
        let band = trophic_level.clamp(1.0, 5.5);
        30.0 + band * 6.0
    }

    pub fn check(traits: &BTreeMap<String, f64>, trophic_level: f64) -> bool {
        let sum: f64 = traits.values().sum();
        let specialized = traits.values().filter(|v| **v > BASE_CAP).count();
        traits
            .values()
            .all(|v| (TRAIT_MIN..=TRAIT_MAX).contains(v))
            && sum <= Self::sum_cap(trophic_level) + 1e-9
            && specialized <= MAX_SPECIALIZED
    }

    /// Projects `traits` onto the constraint set in place:
    /// (a) clip each value to [0, SPECIALIZED_CAP],
    /// (b) scale overage proportionally among traits that exceed their value
    ///     in `before` (or among all traits when no baseline is given),
    /// (c) force surplus specialized traits down to BASE_CAP, largest-overage
    ///     kept.
    pub fn project(
        traits: &mut BTreeMap<String, f64>,
        trophic_level: f64,
        before: Option<&BTreeMap<String, f64>>,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        for (name, v) in traits.iter_mut() {
            let clipped = v.clamp(TRAIT_MIN, SPECIALIZED_CAP);
            if (clipped - *v).abs() > 1e-12 {
                report.clipped.push(name.clone());
            }
            *v = clipped;
        }

        let cap = Self::sum_cap(trophic_level);
        let sum: f64 = traits.values().sum();
        if sum > cap {
            let overage = sum - cap;
            // Shrink only the traits that increased relative to the baseline.
            let increased: Vec<String> = match before {
                Some(prev) => traits
                    .iter()
                    .filter(|(k, v)| **v > prev.get(*k).copied().unwrap_or(0.0) + 1e-12)
                    .map(|(k, _)| k.clone())
                    .collect(),
                None => traits.keys().cloned().collect(),
            };
            let pool: f64 = increased
                .iter()
                .map(|k| traits.get(k).copied().unwrap_or(0.0))
                .sum();
            if pool > 1e-9 {
                let shrink = (overage / pool).min(1.0);
                for k in &increased {
                    if let Some(v) = traits.get_mut(k) {
                        *v = (*v * (1.0 - shrink)).max(TRAIT_MIN);
                    }
                }
                report.scaled = true;
            }
            // Residual overage (baseline traits already at the cap): scale all.
            let sum_after: f64 = traits.values().sum();
            if sum_after > cap {
                let factor = cap / sum_after;
                for v in traits.values_mut() {
                    *v *= factor;
                }
                report.scaled = true;
            }
        }

        let mut specialized: Vec<(String, f64)> = traits
            .iter()
            .filter(|(_, v)| **v > BASE_CAP)
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        if specialized.len() > MAX_SPECIALIZED {
            specialized.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            for (name, _) in specialized.iter().skip(MAX_SPECIALIZED) {
                if let Some(v) = traits.get_mut(name) {
                    *v = BASE_CAP;
                }
                report.despecialized.push(name.clone());
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn traits_of(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_check_passes_reasonable_traits() {
        let t = traits_of(&[(COLD_RESISTANCE, 5.0), (MOBILITY, 3.0), (DEFENSE, 2.0)]);
        assert!(TraitValidator::check(&t, 2.0));
    }

    #[test]
    fn test_project_clips_out_of_range() {
        let mut t = traits_of(&[(HEAT_RESISTANCE, 14.0)]);
        let report = TraitValidator::project(&mut t, 1.0, None);
        assert!(t[HEAT_RESISTANCE] <= SPECIALIZED_CAP);
        assert_eq!(report.clipped, vec![HEAT_RESISTANCE.to_string()]);
    }

    #[test]
    fn test_project_shrinks_only_increased_traits() {
        let before = traits_of(&[(COLD_RESISTANCE, 9.0), (MOBILITY, 9.0)]);
        let mut t = traits_of(&[
            (COLD_RESISTANCE, 9.0),
            (MOBILITY, 9.0),
            (AGGRESSION, 9.0),
            (DEFENSE, 9.0),
            (SOCIALITY, 9.0),
        ]);
        TraitValidator::project(&mut t, 1.0, Some(&before));
        // Baseline traits keep their values; the new ones absorbed the cut.
        assert!((t[COLD_RESISTANCE] - 9.0).abs() < 1e-6);
        assert!(t[AGGRESSION] < 9.0);
    }

    #[test]
    fn test_project_limits_specialized_count() {
        let mut t = traits_of(&[
            (COLD_RESISTANCE, 8.0),
            (HEAT_RESISTANCE, 8.5),
            (DROUGHT_RESISTANCE, 9.0),
        ]);
        let report = TraitValidator::project(&mut t, 5.5, None);
        let specialized = t.values().filter(|v| **v > BASE_CAP).count();
        assert!(specialized <= MAX_SPECIALIZED);
        assert_eq!(report.despecialized, vec![COLD_RESISTANCE.to_string()]);
    }

    proptest! {
        #[test]
        fn prop_projection_always_satisfies_constraints(
            values in proptest::collection::vec(-5.0f64..20.0, 1..12),
            trophic in 1.0f64..5.5,
        ) {
            let mut t: BTreeMap<String, f64> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("trait_{i}"), *v))
                .collect();
            TraitValidator::project(&mut t, trophic, None);
            prop_assert!(TraitValidator::check(&t, trophic));
        }
    }
}
