use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Closed set of environmental pressure templates an operator can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureKind {
    GlacialPeriod,
    GreenhouseEarth,
    DroughtPeriod,
    VolcanicEruption,
    Orogeny,
    OceanAcidification,
    AnoxicEvent,
    PredatorRise,
    SpeciesInvasion,
    ProductivityDecline,
    MonsoonShift,
    FogPeriod,
    ResourceAbundance,
    MeteorImpact,
    SeaLevelRise,
    HypersalineEvent,
    RadiationBurst,
    WildfireSeason,
    PlagueOutbreak,
    NutrientUpwelling,
    NaturalEvolution,
}

impl PressureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureKind::GlacialPeriod => "glacial_period",
            PressureKind::GreenhouseEarth => "greenhouse_earth",
            PressureKind::DroughtPeriod => "drought_period",
            PressureKind::VolcanicEruption => "volcanic_eruption",
            PressureKind::Orogeny => "orogeny",
            PressureKind::OceanAcidification => "ocean_acidification",
            PressureKind::AnoxicEvent => "anoxic_event",
            PressureKind::PredatorRise => "predator_rise",
            PressureKind::SpeciesInvasion => "species_invasion",
            PressureKind::ProductivityDecline => "productivity_decline",
            PressureKind::MonsoonShift => "monsoon_shift",
            PressureKind::FogPeriod => "fog_period",
            PressureKind::ResourceAbundance => "resource_abundance",
            PressureKind::MeteorImpact => "meteor_impact",
            PressureKind::SeaLevelRise => "sea_level_rise",
            PressureKind::HypersalineEvent => "hypersaline_event",
            PressureKind::RadiationBurst => "radiation_burst",
            PressureKind::WildfireSeason => "wildfire_season",
            PressureKind::PlagueOutbreak => "plague_outbreak",
            PressureKind::NutrientUpwelling => "nutrient_upwelling",
            PressureKind::NaturalEvolution => "natural_evolution",
        }
    }

    /// Metagame energy debited per round. Natural evolution is free.
    pub fn energy_cost(&self, intensity: f64) -> f64 {
        match self {
            PressureKind::NaturalEvolution => 0.0,
            PressureKind::MeteorImpact | PressureKind::VolcanicEruption => 8.0 + intensity * 4.0,
            PressureKind::ResourceAbundance | PressureKind::NutrientUpwelling => {
                5.0 + intensity * 2.0
            }
            _ => 3.0 + intensity * 3.0,
        }
    }
}

/// Closed key set for the per-turn pressure modifier dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Temperature,
    Drought,
    Flood,
    Disease,
    Wildfire,
    UvRadiation,
    Sulfide,
    MortalitySpike,
    SalinityChange,
    ResourceBoost,
    Productivity,
    Oxygen,
    HabitatExpansion,
    Predation,
    Invasion,
}

impl Modifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::Temperature => "temperature",
            Modifier::Drought => "drought",
            Modifier::Flood => "flood",
            Modifier::Disease => "disease",
            Modifier::Wildfire => "wildfire",
            Modifier::UvRadiation => "uv_radiation",
            Modifier::Sulfide => "sulfide",
            Modifier::MortalitySpike => "mortality_spike",
            Modifier::SalinityChange => "salinity_change",
            Modifier::ResourceBoost => "resource_boost",
            Modifier::Productivity => "productivity",
            Modifier::Oxygen => "oxygen",
            Modifier::HabitatExpansion => "habitat_expansion",
            Modifier::Predation => "predation",
            Modifier::Invasion => "invasion",
        }
    }

    /// Modifiers that discount combined pressure instead of adding to it.
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Modifier::ResourceBoost
                | Modifier::Productivity
                | Modifier::Oxygen
                | Modifier::HabitatExpansion
        )
    }
}

/// An operator-chosen pressure for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureSpec {
    pub kind: PressureKind,
    /// Intensity in [0, 10].
    pub intensity: f64,
    #[serde(default)]
    pub region: Option<BTreeSet<i64>>,
    #[serde(default)]
    pub narrative: Option<String>,
}

/// The merged modifier dictionary fed into the mortality engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PressureModifiers {
    pub values: BTreeMap<Modifier, f64>,
    /// Union of all regional restrictions; None means global.
    pub region: Option<BTreeSet<i64>>,
}

impl PressureModifiers {
    pub fn get(&self, key: Modifier) -> f64 {
        self.values.get(&key).copied().unwrap_or(0.0)
    }

    pub fn merge(&mut self, other: PressureModifiers) {
        for (k, v) in other.values {
            *self.values.entry(k).or_insert(0.0) += v;
        }
        self.region = match (self.region.take(), other.region) {
            (Some(mut a), Some(b)) => {
                a.extend(b);
                Some(a)
            }
            // Any global pressure makes the merged set global.
            _ => None,
        };
    }

    /// Average magnitude over the negative modifiers, used by the speciation
    /// stress window.
    pub fn average_pressure(&self) -> f64 {
        let negatives: Vec<f64> = self
            .values
            .iter()
            .filter(|(k, _)| !k.is_positive())
            .map(|(_, v)| v.abs())
            .collect();
        if negatives.is_empty() {
            0.0
        } else {
            negatives.iter().sum::<f64>() / negatives.len() as f64
        }
    }
}

impl PressureSpec {
    /// A pressure template is a deterministic function of kind and intensity.
    pub fn modifiers(&self) -> PressureModifiers {
        let i = self.intensity.clamp(0.0, 10.0);
        let mut values = BTreeMap::new();
        let mut put = |m: Modifier, v: f64| {
            if v.abs() > 1e-12 {
                values.insert(m, v);
            }
        };

        match self.kind {
            PressureKind::GlacialPeriod => {
                put(Modifier::Temperature, -0.50 * i);
                put(Modifier::Drought, 0.2 * i);
                put(Modifier::SalinityChange, 0.05 * i);
                put(Modifier::MortalitySpike, 10.0 * i);
            }
            PressureKind::GreenhouseEarth => {
                put(Modifier::Temperature, 0.25 * i);
                put(Modifier::Flood, 0.3 * i);
                put(Modifier::Oxygen, -0.03 * i);
            }
            PressureKind::DroughtPeriod => {
                put(Modifier::Drought, 0.9 * i);
                put(Modifier::Temperature, 0.06 * i);
                put(Modifier::Wildfire, 0.2 * i);
            }
            PressureKind::VolcanicEruption => {
                put(Modifier::Temperature, -0.10 * i);
                put(Modifier::Sulfide, 0.7 * i);
                put(Modifier::Wildfire, 0.4 * i);
                put(Modifier::MortalitySpike, 15.0 * i);
            }
            PressureKind::Orogeny => {
                put(Modifier::HabitatExpansion, 0.2 * i);
                put(Modifier::Temperature, -0.04 * i);
            }
            PressureKind::OceanAcidification => {
                put(Modifier::SalinityChange, 0.5 * i);
                put(Modifier::Productivity, -0.04 * i);
            }
            PressureKind::AnoxicEvent => {
                put(Modifier::Oxygen, -0.09 * i);
                put(Modifier::Sulfide, 0.5 * i);
                put(Modifier::MortalitySpike, 6.0 * i);
            }
            PressureKind::PredatorRise => {
                put(Modifier::Predation, 0.6 * i);
            }
            PressureKind::SpeciesInvasion => {
                put(Modifier::Invasion, 0.6 * i);
                put(Modifier::Disease, 0.15 * i);
            }
            PressureKind::ProductivityDecline => {
                put(Modifier::Productivity, -0.08 * i);
            }
            PressureKind::MonsoonShift => {
                put(Modifier::Flood, 0.5 * i);
                put(Modifier::Drought, 0.3 * i);
                // Freshwater runoff swings coastal salinity.
                put(Modifier::SalinityChange, 0.3 * i);
            }
            PressureKind::FogPeriod => {
                put(Modifier::UvRadiation, -0.2 * i);
                put(Modifier::Temperature, -0.05 * i);
                put(Modifier::Productivity, -0.02 * i);
            }
            PressureKind::ResourceAbundance => {
                put(Modifier::ResourceBoost, 0.08 * i);
                put(Modifier::Productivity, 0.05 * i);
            }
            PressureKind::MeteorImpact => {
                put(Modifier::Temperature, -0.20 * i);
                put(Modifier::Wildfire, 0.6 * i);
                put(Modifier::UvRadiation, 0.3 * i);
                put(Modifier::MortalitySpike, 20.0 * i);
            }
            PressureKind::SeaLevelRise => {
                put(Modifier::Flood, 0.8 * i);
                put(Modifier::SalinityChange, 0.3 * i);
                put(Modifier::HabitatExpansion, 0.05 * i);
            }
            PressureKind::HypersalineEvent => {
                put(Modifier::SalinityChange, 0.9 * i);
            }
            PressureKind::RadiationBurst => {
                put(Modifier::UvRadiation, 0.8 * i);
                put(Modifier::MortalitySpike, 4.0 * i);
            }
            PressureKind::WildfireSeason => {
                put(Modifier::Wildfire, 0.9 * i);
                put(Modifier::Drought, 0.2 * i);
            }
            PressureKind::PlagueOutbreak => {
                put(Modifier::Disease, 0.9 * i);
            }
            PressureKind::NutrientUpwelling => {
                put(Modifier::ResourceBoost, 0.07 * i);
                put(Modifier::Oxygen, 0.03 * i);
                put(Modifier::Productivity, 0.04 * i);
            }
            PressureKind::NaturalEvolution => {}
        }

        PressureModifiers {
            values,
            region: self.region.clone(),
        }
    }

    pub fn summary(&self) -> String {
        format!("{} (intensity {:.1})", self.kind.as_str(), self.intensity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_evolution_is_free_and_empty() {
        let spec = PressureSpec {
            kind: PressureKind::NaturalEvolution,
            intensity: 5.0,
            region: None,
            narrative: None,
        };
        assert_eq!(spec.kind.energy_cost(5.0), 0.0);
        assert!(spec.modifiers().values.is_empty());
    }

    #[test]
    fn test_glacial_period_cools() {
        let spec = PressureSpec {
            kind: PressureKind::GlacialPeriod,
            intensity: 8.0,
            region: None,
            narrative: None,
        };
        let m = spec.modifiers();
        assert!(m.get(Modifier::Temperature) < -2.0);
    }

    #[test]
    fn test_volcanic_sets_mortality_spike() {
        let spec = PressureSpec {
            kind: PressureKind::VolcanicEruption,
            intensity: 10.0,
            region: None,
            narrative: None,
        };
        assert!(spec.modifiers().get(Modifier::MortalitySpike) >= 150.0);
    }

    #[test]
    fn test_merge_sums_and_globalizes() {
        let a = PressureSpec {
            kind: PressureKind::DroughtPeriod,
            intensity: 5.0,
            region: Some([1, 2].into_iter().collect()),
            narrative: None,
        };
        let b = PressureSpec {
            kind: PressureKind::GreenhouseEarth,
            intensity: 5.0,
            region: None,
            narrative: None,
        };
        let mut merged = a.modifiers();
        merged.merge(b.modifiers());
        assert!(merged.get(Modifier::Temperature) > 0.0);
        assert!(merged.region.is_none());
    }
}
