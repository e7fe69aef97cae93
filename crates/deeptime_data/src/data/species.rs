use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::MAX_POPULATION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeciesStatus {
    Alive,
    Extinct,
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitatType {
    Marine,
    Freshwater,
    Terrestrial,
    Amphibious,
    Aerial,
    DeepSea,
    Coastal,
    Hydrothermal,
}

impl HabitatType {
    /// Ordinal used as a similarity feature (habitat_code / 5).
    pub fn code(&self) -> f64 {
        match self {
            HabitatType::Marine => 0.0,
            HabitatType::Freshwater => 1.0,
            HabitatType::Coastal => 2.0,
            HabitatType::Amphibious => 3.0,
            HabitatType::Terrestrial => 4.0,
            HabitatType::Aerial => 5.0,
            HabitatType::DeepSea => 0.5,
            HabitatType::Hydrothermal => 0.75,
        }
    }

    pub fn is_aquatic(&self) -> bool {
        matches!(
            self,
            HabitatType::Marine
                | HabitatType::Freshwater
                | HabitatType::DeepSea
                | HabitatType::Coastal
                | HabitatType::Hydrothermal
        )
    }

    pub fn is_land_bound(&self) -> bool {
        matches!(self, HabitatType::Terrestrial | HabitatType::Aerial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietType {
    Autotroph,
    Herbivore,
    Carnivore,
    Omnivore,
    Detritivore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevelopmentStage {
    Primordium,
    Primitive,
    Functional,
    Mature,
}

impl DevelopmentStage {
    pub fn next(&self) -> Option<DevelopmentStage> {
        match self {
            DevelopmentStage::Primordium => Some(DevelopmentStage::Primitive),
            DevelopmentStage::Primitive => Some(DevelopmentStage::Functional),
            DevelopmentStage::Functional => Some(DevelopmentStage::Mature),
            DevelopmentStage::Mature => None,
        }
    }

    pub fn prev(&self) -> Option<DevelopmentStage> {
        match self {
            DevelopmentStage::Primordium => None,
            DevelopmentStage::Primitive => Some(DevelopmentStage::Primordium),
            DevelopmentStage::Functional => Some(DevelopmentStage::Primitive),
            DevelopmentStage::Mature => Some(DevelopmentStage::Functional),
        }
    }

    /// Efficiency modifier written onto an organ when it reaches this stage.
    pub fn efficiency(&self) -> f64 {
        match self {
            DevelopmentStage::Primordium => 0.0,
            DevelopmentStage::Primitive => 0.3,
            DevelopmentStage::Functional => 0.7,
            DevelopmentStage::Mature => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dominance {
    Dominant,
    Codominant,
    Recessive,
}

impl Dominance {
    pub fn expression_factor(&self) -> f64 {
        match self {
            Dominance::Dominant => 1.0,
            Dominance::Codominant => 0.6,
            Dominance::Recessive => 0.3,
        }
    }
}

/// A structural organ held by a species, keyed by category in `Species::organs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organ {
    pub organ_type: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    pub acquired_turn: u64,
    #[serde(default)]
    pub modified_turn: Option<u64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub maturity: f64,
    #[serde(default)]
    pub development_stage: Option<DevelopmentStage>,
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
}

fn default_true() -> bool {
    true
}

fn default_efficiency() -> f64 {
    1.0
}

/// A dormant trait blueprint, inactive until activation criteria are met.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DormantTrait {
    pub potential: f64,
    pub dominance: Dominance,
    #[serde(default)]
    pub pressure_types: Vec<String>,
    #[serde(default)]
    pub exposure: u32,
    #[serde(default)]
    pub harmful: bool,
    #[serde(default)]
    pub activated: bool,
    /// For harmful mutations: the trait whose value the mutation degrades.
    #[serde(default)]
    pub target_trait: Option<String>,
}

/// A dormant organ blueprint tracking the 4-stage development pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DormantOrgan {
    pub organ_type: String,
    pub category: String,
    #[serde(default)]
    pub pressure_types: Vec<String>,
    #[serde(default)]
    pub stage: Option<DevelopmentStage>,
    #[serde(default)]
    pub stage_start_turn: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DormantGenes {
    #[serde(default)]
    pub traits: BTreeMap<String, DormantTrait>,
    #[serde(default)]
    pub organs: BTreeMap<String, DormantOrgan>,
}

impl DormantGenes {
    pub fn is_empty(&self) -> bool {
        self.traits.is_empty() && self.organs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StressRecord {
    pub count: u32,
    pub max_death_rate: f64,
}

/// The central entity of the simulation. One row per lineage; mutated only
/// inside the turn pipeline, tombstoned on extinction but never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub id: i64,
    pub lineage_code: String,
    pub latin_name: String,
    pub common_name: String,
    pub description: String,
    #[serde(default)]
    pub genus_code: String,
    #[serde(default = "default_rank")]
    pub taxonomic_rank: String,
    #[serde(default)]
    pub parent_code: Option<String>,
    #[serde(default)]
    pub hybrid_parent_codes: Vec<String>,
    #[serde(default = "default_one")]
    pub hybrid_fertility: f64,

    pub status: SpeciesStatus,
    pub created_turn: u64,
    #[serde(default)]
    pub extinction_turn: Option<u64>,
    #[serde(default)]
    pub extinction_cause: Option<String>,

    /// Biomass units, capped at 2^53 - 1.
    pub population: u64,
    /// Free-form numeric morphology; canonical keys have typed accessors below.
    #[serde(default)]
    pub morphology: BTreeMap<String, f64>,
    /// Abstract traits, each in [0, 10]; see `TraitValidator`.
    #[serde(default)]
    pub abstract_traits: BTreeMap<String, f64>,
    /// Hidden traits, each in [0, 1].
    #[serde(default)]
    pub hidden_traits: BTreeMap<String, f64>,

    pub habitat_type: HabitatType,
    /// Continuous trophic level in [1.0, 5.5].
    pub trophic_level: f64,
    pub diet_type: DietType,
    #[serde(default)]
    pub prey_species: BTreeSet<String>,
    #[serde(default)]
    pub prey_preferences: BTreeMap<String, f64>,
    #[serde(default)]
    pub symbiotic_dependencies: Vec<String>,
    #[serde(default)]
    pub dependency_strength: f64,
    #[serde(default = "default_symbiosis")]
    pub symbiosis_type: String,

    #[serde(default)]
    pub organs: BTreeMap<String, Organ>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub dormant_genes: DormantGenes,
    #[serde(default)]
    pub stress_exposure: BTreeMap<String, StressRecord>,

    #[serde(default = "default_radius")]
    pub gene_diversity_radius: f64,
    #[serde(default)]
    pub explored_directions: Vec<u32>,
    #[serde(default = "default_half")]
    pub gene_stability: f64,
    /// Lazy embedding of `description`; None means recompute on first read.
    #[serde(default)]
    pub ecological_vector: Option<Vec<f32>>,
    #[serde(default)]
    pub history_highlights: Vec<String>,
    #[serde(default)]
    pub accumulated_adaptation_score: f64,
    #[serde(default)]
    pub last_description_update_turn: u64,
    #[serde(default = "default_one")]
    pub plasticity_buffer: f64,
    #[serde(default)]
    pub speciation_pressure: f64,

    #[serde(default)]
    pub is_protected: bool,
    #[serde(default)]
    pub protection_turns: u32,
    #[serde(default)]
    pub is_suppressed: bool,
    #[serde(default)]
    pub suppression_turns: u32,
}

fn default_rank() -> String {
    "species".to_string()
}

fn default_symbiosis() -> String {
    "none".to_string()
}

fn default_one() -> f64 {
    1.0
}

fn default_half() -> f64 {
    0.5
}

fn default_radius() -> f64 {
    0.35
}

impl Species {
    pub fn is_alive(&self) -> bool {
        self.status == SpeciesStatus::Alive
    }

    pub fn is_plant(&self) -> bool {
        self.trophic_level < 2.0
    }

    pub fn is_producer(&self) -> bool {
        self.trophic_level < 2.0
    }

    /// Microbial scale: body under 0.1 mm.
    pub fn is_microbe(&self) -> bool {
        self.body_length_cm() < 0.01
    }

    /// Trophic band: round(level * 2) / 2, yielding 0.5-wide groups.
    pub fn trophic_band(&self) -> f64 {
        (self.trophic_level * 2.0).round() / 2.0
    }

    pub fn morph(&self, key: &str, default: f64) -> f64 {
        self.morphology.get(key).copied().unwrap_or(default)
    }

    pub fn body_length_cm(&self) -> f64 {
        self.morph("body_length_cm", 0.001)
    }

    pub fn body_weight_g(&self) -> f64 {
        self.morph("body_weight_g", 1e-9)
    }

    pub fn lifespan_days(&self) -> f64 {
        self.morph("lifespan_days", 1.0)
    }

    pub fn generation_time_days(&self) -> f64 {
        self.morph("generation_time_days", 1.0).max(0.01)
    }

    pub fn metabolic_rate(&self) -> f64 {
        self.morph("metabolic_rate", 1.0)
    }

    pub fn trait_value(&self, key: &str) -> f64 {
        self.abstract_traits.get(key).copied().unwrap_or(0.0)
    }

    pub fn hidden(&self, key: &str) -> f64 {
        self.hidden_traits.get(key).copied().unwrap_or(0.0)
    }

    pub fn evolution_potential(&self) -> f64 {
        self.hidden_traits
            .get("evolution_potential")
            .copied()
            .unwrap_or(0.5)
    }

    /// Mean of the four environmental resistances, in [0, 1].
    pub fn environmental_tolerance(&self) -> f64 {
        let sum = self.trait_value("cold_resistance")
            + self.trait_value("heat_resistance")
            + self.trait_value("drought_resistance")
            + self.trait_value("salinity_resistance");
        (sum / 40.0).clamp(0.0, 1.0)
    }

    /// Generations elapsed over one turn of `turn_years`, scaled so that
    /// fast-reproducing organisms do not dominate every stochastic gate.
    pub fn generations_per_turn(&self, turn_years: u64, scale_factor: f64) -> f64 {
        let days = turn_years as f64 * 365.25;
        let raw = days / self.generation_time_days();
        (raw / scale_factor).max(1.0)
    }

    pub fn set_population(&mut self, value: u64) {
        self.population = value.min(MAX_POPULATION);
    }

    pub fn age(&self, turn_index: u64) -> u64 {
        turn_index.saturating_sub(self.created_turn)
    }

    pub fn tombstone(&mut self, turn_index: u64, cause: impl Into<String>) {
        self.status = SpeciesStatus::Extinct;
        self.population = 0;
        self.extinction_turn = Some(turn_index);
        self.extinction_cause = Some(cause.into());
    }

    /// Ancestor chain derived from the lineage code: "A1a2" -> ["A1a", "A1"].
    /// A code is root genus letter + number, then alternating letter/number
    /// suffixes, each suffix denoting one child generation.
    pub fn ancestor_chain(&self) -> Vec<String> {
        ancestor_chain_of(&self.lineage_code)
    }

    pub fn push_highlight(&mut self, text: impl Into<String>) {
        const MAX_HIGHLIGHTS: usize = 12;
        self.history_highlights.push(text.into());
        if self.history_highlights.len() > MAX_HIGHLIGHTS {
            let excess = self.history_highlights.len() - MAX_HIGHLIGHTS;
            self.history_highlights.drain(0..excess);
        }
    }
}

/// Strip one child suffix at a time: a trailing digit run, else a trailing
/// lowercase letter. Stops at the genus root (letter + digits).
pub fn ancestor_chain_of(code: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = code.to_string();
    loop {
        let trimmed = strip_one_suffix(&current);
        match trimmed {
            Some(parent) if !parent.is_empty() => {
                chain.push(parent.clone());
                current = parent;
            }
            _ => break,
        }
        if chain.len() >= 10 {
            break;
        }
    }
    chain
}

fn strip_one_suffix(code: &str) -> Option<String> {
    let chars: Vec<char> = code.chars().collect();
    if chars.len() <= 2 {
        return None;
    }
    let last = *chars.last()?;
    if last.is_ascii_digit() {
        // Peel the whole trailing digit run unless it is the genus number.
        let mut i = chars.len();
        while i > 0 && chars[i - 1].is_ascii_digit() {
            i -= 1;
        }
        // "A1" is the root: uppercase + digits only.
        if i == 1 && chars[0].is_ascii_uppercase() {
            return None;
        }
        Some(chars[..i].iter().collect())
    } else if last.is_ascii_lowercase() {
        Some(chars[..chars.len() - 1].iter().collect())
    } else {
        None
    }
}

/// Kinship distance between two codes: generations to the nearest common
/// ancestor, or None when none exists within 10 generations.
pub fn kin_generations(a: &str, b: &str) -> Option<u32> {
    let mut chain_a = vec![a.to_string()];
    chain_a.extend(ancestor_chain_of(a));
    let mut chain_b = vec![b.to_string()];
    chain_b.extend(ancestor_chain_of(b));

    for (i, ca) in chain_a.iter().enumerate() {
        for (j, cb) in chain_b.iter().enumerate() {
            if ca == cb {
                return Some((i + j) as u32);
            }
        }
    }
    None
}
