//! Rule-based naming fallback and uniqueness enforcement.
//!
//! When the model router is unavailable or returns garbage, offspring still
//! need plausible names. Epithets are derived from the innovation or stress
//! keyword; collisions get roman numerals, then a subspecies marker.

use rand::Rng;
use std::collections::BTreeSet;

use crate::rng::lineage_rng;

const EPITHETS: [(&str, &str); 10] = [
    ("cold", "glacialis"),
    ("heat", "thermalis"),
    ("drought", "aridus"),
    ("salinity", "salinus"),
    ("predation", "venatrix"),
    ("starvation", "vorax"),
    ("competition", "certans"),
    ("radiation", "luminaris"),
    ("resource_scarcity", "parcus"),
    ("stress", "mutabilis"),
];

const GENERIC_EPITHETS: [&str; 8] = [
    "novus", "divergens", "insularis", "profundus", "littoralis", "velox", "minutus", "robustus",
];

const COMMON_PREFIXES: [(&str, &str); 10] = [
    ("cold", "frost"),
    ("heat", "ember"),
    ("drought", "dust"),
    ("salinity", "brine"),
    ("predation", "shadow"),
    ("starvation", "lean"),
    ("competition", "rival"),
    ("radiation", "glow"),
    ("resource_scarcity", "sparse"),
    ("stress", "shifting"),
];

/// Genus word of a latin binomial.
fn genus_of(latin_name: &str) -> &str {
    latin_name.split_whitespace().next().unwrap_or("Incertus")
}

/// Rule-based binomial for a child lineage.
pub fn fallback_latin_name(
    parent_latin: &str,
    child_code: &str,
    innovation_keyword: &str,
    turn_index: u64,
) -> String {
    let genus = genus_of(parent_latin);
    let epithet = EPITHETS
        .iter()
        .find(|(k, _)| innovation_keyword.contains(k))
        .map(|(_, e)| (*e).to_string())
        .unwrap_or_else(|| {
            let mut rng = lineage_rng(child_code, turn_index);
            GENERIC_EPITHETS[rng.gen_range(0..GENERIC_EPITHETS.len())].to_string()
        });
    format!("{genus} {epithet}")
}

pub fn fallback_common_name(parent_common: &str, innovation_keyword: &str) -> String {
    let prefix = COMMON_PREFIXES
        .iter()
        .find(|(k, _)| innovation_keyword.contains(k))
        .map(|(_, p)| *p)
        .unwrap_or("lesser");
    let base = parent_common.split_whitespace().last().unwrap_or(parent_common);
    format!("{prefix} {base}")
}

pub fn fallback_description(parent_description: &str, innovation_keyword: &str) -> String {
    format!(
        "A diverging lineage shaped by {} stress. {} Its isolated \
         populations have begun accumulating their own adaptations.",
        innovation_keyword.replace('_', " "),
        parent_description
            .split('.')
            .next()
            .map(|s| format!("{s}."))
            .unwrap_or_default(),
    )
}

/// Appends roman numerals II..V, then a subspecies marker, until unique.
pub fn enforce_unique(name: &str, taken: &BTreeSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    for numeral in ["II", "III", "IV", "V"] {
        let candidate = format!("{name} {numeral}");
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
    let mut n = 1;
    loop {
        let candidate = format!("{name} subsp. {n}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epithet_from_keyword() {
        let name = fallback_latin_name("Primogenitus photovorans", "A1a", "cold", 3);
        assert_eq!(name, "Primogenitus glacialis");
    }

    #[test]
    fn test_generic_epithet_deterministic() {
        let a = fallback_latin_name("Primogenitus photovorans", "A1a", "unknown", 3);
        let b = fallback_latin_name("Primogenitus photovorans", "A1a", "unknown", 3);
        assert_eq!(a, b);
        assert!(a.starts_with("Primogenitus "));
    }

    #[test]
    fn test_enforce_unique_progression() {
        let mut taken = BTreeSet::new();
        taken.insert("Primogenitus glacialis".to_string());
        taken.insert("Primogenitus glacialis II".to_string());
        let name = enforce_unique("Primogenitus glacialis", &taken);
        assert_eq!(name, "Primogenitus glacialis III");
    }

    #[test]
    fn test_common_name_prefix() {
        assert_eq!(fallback_common_name("glimmer mat", "drought"), "dust mat");
    }
}
