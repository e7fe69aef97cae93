//! Trait trade-off enforcement and differentiation noise for offspring.

use rand::Rng;
use std::collections::BTreeMap;

use crate::rng::lineage_rng;

/// Five divergence directions; the child's last code letter picks one.
/// Each favors two traits and disfavors two.
const DIRECTION_PATTERNS: [([&str; 2], [&str; 2]); 5] = [
    (["heat_resistance", "mobility"], ["cold_resistance", "defense"]),
    (["cold_resistance", "defense"], ["heat_resistance", "reproductive_speed"]),
    (["reproductive_speed", "sociality"], ["defense", "aggression"]),
    (["defense", "aggression"], ["mobility", "sociality"]),
    (
        ["drought_resistance", "salinity_resistance"],
        ["light_demand", "aggression"],
    ),
];

/// Net-positive proposals pay for themselves: when increases outweigh
/// decreases by more than 30%, 1-3 untouched traits above 3.0 are shaved
/// proportionally. Deterministic per lineage code.
pub fn enforce_tradeoffs(
    changes: &mut BTreeMap<String, f64>,
    current: &BTreeMap<String, f64>,
    child_code: &str,
    turn_index: u64,
) {
    let increases: f64 = changes.values().filter(|v| **v > 0.0).sum();
    let decreases: f64 = changes.values().filter(|v| **v < 0.0).map(|v| -v).sum();
    let net: f64 = increases - decreases;
    if net <= 0.0 || decreases >= 0.3 * increases {
        return;
    }

    let mut eligible: Vec<(String, f64)> = current
        .iter()
        .filter(|(name, value)| **value > 3.0 && !changes.contains_key(*name))
        .map(|(name, value)| (name.clone(), *value))
        .collect();
    if eligible.is_empty() {
        return;
    }
    eligible.sort_by(|a, b| a.0.cmp(&b.0));

    let mut rng = lineage_rng(child_code, turn_index);
    let count = rng.gen_range(1..=3.min(eligible.len()));
    // Rotate deterministically so different children shave different traits.
    let start = rng.gen_range(0..eligible.len());
    let chosen: Vec<(String, f64)> = (0..count)
        .map(|k| eligible[(start + k) % eligible.len()].clone())
        .collect();

    let pool: f64 = chosen.iter().map(|(_, v)| v).sum();
    let owed = net * 0.5;
    for (name, value) in chosen {
        let cut = owed * value / pool;
        changes.insert(name, -cut.min(value - 0.5));
    }
}

/// Deterministic divergence flavor plus jitter on every changed trait.
pub fn differentiation_noise(
    changes: &mut BTreeMap<String, f64>,
    child_code: &str,
    turn_index: u64,
) {
    let last = child_code.chars().last().unwrap_or('a');
    let pattern_idx = if last.is_ascii_lowercase() {
        (last as usize - 'a' as usize) % DIRECTION_PATTERNS.len()
    } else {
        (last as usize) % DIRECTION_PATTERNS.len()
    };
    let (favored, disfavored) = DIRECTION_PATTERNS[pattern_idx];

    for name in favored {
        *changes.entry(name.to_string()).or_insert(0.0) += 0.6;
    }
    for name in disfavored {
        *changes.entry(name.to_string()).or_insert(0.0) -= 0.4;
    }

    let mut rng = lineage_rng(child_code, turn_index.wrapping_add(1));
    for value in changes.values_mut() {
        *value += rng.gen_range(-0.3..0.3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_net_positive_changes_pay() {
        let current = map(&[("defense", 6.0), ("sociality", 5.0), ("mobility", 2.0)]);
        let mut changes = map(&[("heat_resistance", 3.0)]);
        enforce_tradeoffs(&mut changes, &current, "A1a", 4);
        let decreases: f64 = changes.values().filter(|v| **v < 0.0).map(|v| -v).sum();
        assert!(decreases > 0.0, "no compensating decrease applied");
        // Mobility is too low to be shaved below its floor of 0.5.
        assert!(changes.values().all(|v| v.is_finite()));
    }

    #[test]
    fn test_balanced_changes_untouched() {
        let current = map(&[("defense", 6.0)]);
        let mut changes = map(&[("heat_resistance", 2.0), ("cold_resistance", -1.5)]);
        let before = changes.clone();
        enforce_tradeoffs(&mut changes, &current, "A1a", 4);
        assert_eq!(changes, before);
    }

    #[test]
    fn test_noise_deterministic_per_code() {
        let mut a = map(&[("heat_resistance", 1.0)]);
        let mut b = map(&[("heat_resistance", 1.0)]);
        differentiation_noise(&mut a, "A1b", 7);
        differentiation_noise(&mut b, "A1b", 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_differs_between_siblings() {
        let mut a = map(&[]);
        let mut b = map(&[]);
        differentiation_noise(&mut a, "A1a", 7);
        differentiation_noise(&mut b, "A1b", 7);
        assert_ne!(a, b);
    }
}
