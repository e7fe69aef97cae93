//! Dormant-gene activation under mortality stress.
//!
//! High death rates push species to express dormant traits, develop organs
//! through a four-stage pipeline, and (for microbes) pick up genes from
//! sympatric donors. All rolls are seeded by lineage code and turn index.

use rand::Rng;
use std::collections::BTreeMap;

use deeptime_data::data::traits::TraitValidator;
use deeptime_data::{
    DevelopmentStage, Dominance, DormantOrgan, DormantTrait, Modifier, MortalityResult, Organ,
    PressureModifiers, Species,
};
use deeptime_net::local_embedding;

use crate::rng::{lineage_rng, stable_hash};

use super::diversity::GeneDiversityService;

/// Traits that can cross species boundaries via HGT.
const TRANSFERABLE_TRAITS: [&str; 6] = [
    "heat_resistance",
    "cold_resistance",
    "salinity_resistance",
    "toxin_resistance",
    "uv_resistance",
    "drought_resistance",
];

/// Linkage groups: activating the primary drags the linked traits along and
/// charges the trade-off.
struct LinkageGroup {
    primary: &'static str,
    linked: &'static [&'static str],
    tradeoff: (&'static str, f64),
}

const LINKAGE_GROUPS: [LinkageGroup; 3] = [
    LinkageGroup {
        primary: "heat_resistance",
        linked: &["drought_resistance"],
        tradeoff: ("cold_resistance", 1.0),
    },
    LinkageGroup {
        primary: "cold_resistance",
        linked: &["defense"],
        tradeoff: ("reproductive_speed", 0.8),
    },
    LinkageGroup {
        primary: "toxin_resistance",
        linked: &["immunity"],
        tradeoff: ("mobility", 0.6),
    },
];

#[derive(Debug, Clone)]
pub struct ActivationConfig {
    pub base_rate_per_turn: f64,
    pub pressure_match_bonus: f64,
    pub death_rate_threshold: f64,
    pub min_exposure: u32,
    pub organ_discovery_base: f64,
    pub turns_per_stage: [u64; 3],
    pub failure_chance: [f64; 3],
    pub hgt_base: f64,
    pub hgt_sympatric_bonus: f64,
    pub hgt_integration_stability: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            base_rate_per_turn: 0.08,
            pressure_match_bonus: 2.0,
            death_rate_threshold: 0.25,
            min_exposure: 2,
            organ_discovery_base: 0.04,
            turns_per_stage: [2, 3, 4],
            failure_chance: [0.25, 0.15, 0.10],
            hgt_base: 0.05,
            hgt_sympatric_bonus: 0.10,
            hgt_integration_stability: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivationResult {
    pub traits: BTreeMap<String, f64>,
    pub organs: Vec<String>,
    pub organ_development: Vec<(String, DevelopmentStage)>,
    pub linked_effects: Vec<String>,
    pub harmful_activated: Vec<String>,
    pub hgt_acquired: Option<(String, f64)>,
}

impl ActivationResult {
    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
            && self.organs.is_empty()
            && self.organ_development.is_empty()
            && self.harmful_activated.is_empty()
            && self.hgt_acquired.is_none()
    }

    pub fn summaries(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, value) in &self.traits {
            out.push(format!("activated {name} at {value:.1}"));
        }
        for name in &self.organs {
            out.push(format!("organ {name} became functional"));
        }
        for (name, stage) in &self.organ_development {
            out.push(format!("organ {name} advanced to {stage:?}"));
        }
        for name in &self.harmful_activated {
            out.push(format!("harmful mutation hit {name}"));
        }
        if let Some((name, value)) = &self.hgt_acquired {
            out.push(format!("horizontal transfer of {name} ({value:.1})"));
        }
        out
    }
}

pub struct GeneActivationService {
    config: ActivationConfig,
    diversity: GeneDiversityService,
}

impl Default for GeneActivationService {
    fn default() -> Self {
        Self {
            config: ActivationConfig::default(),
            diversity: GeneDiversityService::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivationEvent {
    pub lineage_code: String,
    pub summaries: Vec<String>,
}

impl GeneActivationService {
    pub fn new(config: ActivationConfig, diversity: GeneDiversityService) -> Self {
        Self { config, diversity }
    }

    /// Runs activation for every species against its mortality record and
    /// returns the events for the turn report.
    pub fn batch_check(
        &self,
        species: &mut [Species],
        results: &[MortalityResult],
        modifiers: &PressureModifiers,
        turn_index: u64,
    ) -> Vec<ActivationEvent> {
        let by_code: BTreeMap<&str, &MortalityResult> = results
            .iter()
            .map(|r| (r.lineage_code.as_str(), r))
            .collect();
        let donor_pool: Vec<Species> = species
            .iter()
            .filter(|s| s.is_alive() && Self::is_hgt_eligible(s))
            .cloned()
            .collect();

        let mut events = Vec::new();
        for sp in species.iter_mut() {
            if !sp.is_alive() {
                continue;
            }
            let Some(result) = by_code.get(sp.lineage_code.as_str()) else {
                continue;
            };
            let pressure_type = infer_pressure_type(result, modifiers);
            let outcome = self.check_and_activate(
                sp,
                result.death_rate,
                &pressure_type,
                turn_index,
                Some(&donor_pool),
            );
            if !outcome.is_empty() {
                events.push(ActivationEvent {
                    lineage_code: sp.lineage_code.clone(),
                    summaries: outcome.summaries(),
                });
            }
        }
        events
    }

    pub fn check_and_activate(
        &self,
        species: &mut Species,
        death_rate: f64,
        pressure_type: &str,
        turn_index: u64,
        nearby_species: Option<&[Species]>,
    ) -> ActivationResult {
        let mut rng = lineage_rng(&species.lineage_code, turn_index);
        let mut result = ActivationResult::default();

        // Stress bookkeeping.
        let record = species
            .stress_exposure
            .entry(pressure_type.to_string())
            .or_default();
        record.count += 1;
        record.max_death_rate = record.max_death_rate.max(death_rate);

        if species.dormant_genes.is_empty() {
            self.bootstrap_dormant_genes(species, &mut rng);
        }

        self.activate_traits(species, death_rate, pressure_type, &mut rng, &mut result);
        self.develop_organs(species, pressure_type, turn_index, &mut rng, &mut result);
        if Self::is_hgt_eligible(species) {
            if let Some(pool) = nearby_species {
                self.horizontal_transfer(species, pool, &mut rng, &mut result);
            }
        }
        result
    }

    /// Seeds an empty dormant pool from the species' strongest traits plus a
    /// generic adaptability reserve; occasionally a deleterious variant.
    fn bootstrap_dormant_genes(&self, species: &mut Species, rng: &mut impl Rng) {
        let mut ranked: Vec<(String, f64)> = species
            .abstract_traits
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (name, value) in ranked.into_iter().take(2) {
            species.dormant_genes.traits.insert(
                format!("enhanced_{name}"),
                DormantTrait {
                    potential: (value + 2.0).min(9.0),
                    dominance: Dominance::Codominant,
                    pressure_types: vec![pressure_hint_for(&name)],
                    exposure: 0,
                    harmful: false,
                    activated: false,
                    target_trait: Some(name),
                },
            );
        }
        species.dormant_genes.traits.insert(
            "latent_adaptability".to_string(),
            DormantTrait {
                potential: 4.0,
                dominance: Dominance::Recessive,
                pressure_types: vec![],
                exposure: 0,
                harmful: false,
                activated: false,
                target_trait: None,
            },
        );
        // Microbes carry a motility blueprint waiting on the right stress.
        if species.is_microbe() && !species.organs.contains_key("locomotion") {
            species.dormant_genes.organs.insert(
                "proto_flagella".to_string(),
                DormantOrgan {
                    organ_type: "flagella".to_string(),
                    category: "locomotion".to_string(),
                    pressure_types: vec!["predation".to_string(), "resource_scarcity".to_string()],
                    stage: None,
                    stage_start_turn: 0,
                },
            );
        }
        if rng.gen::<f64>() < 0.15 {
            species.dormant_genes.traits.insert(
                "fragile_metabolism".to_string(),
                DormantTrait {
                    potential: 1.5,
                    dominance: Dominance::Recessive,
                    pressure_types: vec![],
                    exposure: 0,
                    harmful: true,
                    activated: false,
                    target_trait: Some("reproductive_speed".to_string()),
                },
            );
        }
    }

    fn activate_traits(
        &self,
        species: &mut Species,
        death_rate: f64,
        pressure_type: &str,
        rng: &mut impl Rng,
        result: &mut ActivationResult,
    ) {
        let evo = species.evolution_potential();
        let radius = species.gene_diversity_radius;
        let species_vec: Vec<f32> = species
            .ecological_vector
            .clone()
            .unwrap_or_else(|| local_embedding(&species.description));
        let pressure_vec = local_embedding(pressure_type);

        let names: Vec<String> = species
            .dormant_genes
            .traits
            .iter()
            .filter(|(_, t)| !t.activated)
            .map(|(k, _)| k.clone())
            .collect();

        let mut activated_primaries = Vec::new();
        for name in names {
            let (probability, gate_passed, harmful, potential, dominance, target) =
                match species.dormant_genes.traits.get_mut(&name) {
                    Some(gene) => {
                        gene.exposure += 1;
                        let mut p = self.config.base_rate_per_turn * (1.0 + evo);
                        let matches = gene.pressure_types.iter().any(|t| t == pressure_type);
                        if matches {
                            p *= self.config.pressure_match_bonus;
                        }
                        if gene.harmful {
                            p *= 0.3;
                        }
                        let gate = death_rate > self.config.death_rate_threshold
                            && gene.exposure >= self.config.min_exposure
                            && self.diversity.is_reachable(&species_vec, &pressure_vec, radius);
                        (
                            p,
                            gate,
                            gene.harmful,
                            gene.potential,
                            gene.dominance,
                            gene.target_trait.clone(),
                        )
                    }
                    None => continue,
                };

            if !gate_passed || rng.gen::<f64>() >= probability {
                continue;
            }

            if harmful {
                if let Some(target) = target {
                    let current = species.trait_value(&target);
                    species
                        .abstract_traits
                        .insert(target.clone(), (current - potential).max(0.0));
                    result.harmful_activated.push(target);
                }
            } else {
                let expressed = potential * dominance.expression_factor();
                let target_name = target.unwrap_or_else(|| name.trim_start_matches("enhanced_").to_string());
                let mut candidate = species.abstract_traits.clone();
                let merged = candidate.get(&target_name).copied().unwrap_or(0.0).max(expressed);
                candidate.insert(target_name.clone(), merged);
                if !TraitValidator::check(&candidate, species.trophic_level) {
                    continue;
                }
                species.abstract_traits = candidate;
                result.traits.insert(target_name.clone(), merged);
                activated_primaries.push(target_name);
                self.diversity.consume_on_activation(species);
                let direction = (stable_hash(pressure_type) % 10_000) as u32;
                if !species.explored_directions.contains(&direction) {
                    species.explored_directions.push(direction);
                }
            }

            if let Some(gene) = species.dormant_genes.traits.get_mut(&name) {
                gene.activated = true;
            }
        }

        // Expressed genes leave the dormant pool; the pool never shadows a
        // live trait key.
        species.dormant_genes.traits.retain(|_, gene| !gene.activated);

        // Linkage: primaries drag their group along.
        for primary in activated_primaries {
            let Some(group) = LINKAGE_GROUPS.iter().find(|g| g.primary == primary) else {
                continue;
            };
            for linked in group.linked {
                let value = 5.0 + rng.gen_range(-1.0..1.0);
                let current = species.trait_value(linked);
                if current < value {
                    let mut candidate = species.abstract_traits.clone();
                    candidate.insert((*linked).to_string(), value);
                    if TraitValidator::check(&candidate, species.trophic_level) {
                        species.abstract_traits = candidate;
                        result.linked_effects.push((*linked).to_string());
                    }
                }
            }
            let (cost_trait, cost) = group.tradeoff;
            let current = species.trait_value(cost_trait);
            if current > 0.0 {
                species
                    .abstract_traits
                    .insert(cost_trait.to_string(), (current - cost).max(0.0));
                result.linked_effects.push(format!("{cost_trait} -{cost:.1}"));
            }
        }
    }

    fn develop_organs(
        &self,
        species: &mut Species,
        pressure_type: &str,
        turn_index: u64,
        rng: &mut impl Rng,
        result: &mut ActivationResult,
    ) {
        let evo = species.evolution_potential();
        let names: Vec<String> = species.dormant_genes.organs.keys().cloned().collect();
        let mut discovery_bonus_earned = false;

        for name in names {
            let Some(organ) = species.dormant_genes.organs.get_mut(&name) else {
                continue;
            };
            let matches = organ.pressure_types.iter().any(|t| t == pressure_type);

            match organ.stage {
                None => {
                    let mut p = self.config.organ_discovery_base * (1.0 + evo * 2.0);
                    if matches {
                        p *= self.config.pressure_match_bonus;
                    }
                    if rng.gen::<f64>() < p {
                        organ.stage = Some(DevelopmentStage::Primordium);
                        organ.stage_start_turn = turn_index;
                        result
                            .organ_development
                            .push((name.clone(), DevelopmentStage::Primordium));
                        discovery_bonus_earned = true;
                    }
                }
                Some(stage) if stage != DevelopmentStage::Mature => {
                    let stage_idx = match stage {
                        DevelopmentStage::Primordium => 0,
                        DevelopmentStage::Primitive => 1,
                        DevelopmentStage::Functional => 2,
                        DevelopmentStage::Mature => unreachable!(),
                    };
                    let base = self.config.turns_per_stage[stage_idx] as f64;
                    let mut required = base - evo * 0.3 * base;
                    if matches {
                        required -= 1.0;
                    }
                    let required = required.max(1.0) as u64;
                    let elapsed = turn_index.saturating_sub(organ.stage_start_turn);
                    if elapsed < required {
                        continue;
                    }
                    if rng.gen::<f64>() < self.config.failure_chance[stage_idx] {
                        // Regression, or loss of a bare primordium.
                        match stage.prev() {
                            Some(prev) => {
                                organ.stage = Some(prev);
                                organ.stage_start_turn = turn_index;
                            }
                            None => {
                                organ.stage = None;
                            }
                        }
                        continue;
                    }
                    let Some(next) = stage.next() else { continue };
                    organ.stage = Some(next);
                    organ.stage_start_turn = turn_index;
                    result.organ_development.push((name.clone(), next));

                    if matches!(next, DevelopmentStage::Functional | DevelopmentStage::Mature) {
                        let organ_type = organ.organ_type.clone();
                        let category = organ.category.clone();
                        species.organs.insert(
                            category,
                            Organ {
                                organ_type,
                                parameters: BTreeMap::new(),
                                acquired_turn: turn_index,
                                modified_turn: None,
                                is_active: true,
                                maturity: next.efficiency(),
                                development_stage: Some(next),
                                efficiency: next.efficiency(),
                            },
                        );
                        result.organs.push(name.clone());
                    }
                }
                _ => {}
            }
        }

        if discovery_bonus_earned {
            self.diversity.grant_discovery_bonus(species);
        }
    }

    pub fn is_hgt_eligible(species: &Species) -> bool {
        species.trophic_level < 1.5 || species.is_microbe()
    }

    fn horizontal_transfer(
        &self,
        species: &mut Species,
        pool: &[Species],
        rng: &mut impl Rng,
        result: &mut ActivationResult,
    ) {
        let donors: Vec<&Species> = pool
            .iter()
            .filter(|d| d.lineage_code != species.lineage_code)
            .collect();
        if donors.is_empty() {
            return;
        }
        let probability = self.config.hgt_base
            + self.config.hgt_sympatric_bonus * (donors.len().min(3) as f64 / 3.0);
        if rng.gen::<f64>() >= probability {
            return;
        }
        let donor = donors[rng.gen_range(0..donors.len())];
        let candidates: Vec<(&str, f64)> = TRANSFERABLE_TRAITS
            .iter()
            .filter_map(|name| {
                let donor_value = donor.trait_value(name);
                let own = species.trait_value(name);
                if donor_value > 1.0 && own < 0.5 {
                    Some((*name, donor_value))
                } else {
                    None
                }
            })
            .collect();
        if candidates.is_empty() {
            return;
        }
        let (name, donor_value) = candidates[rng.gen_range(0..candidates.len())];
        let efficiency = rng.gen_range(0.3..0.7);
        let transferred = donor_value * efficiency;
        if rng.gen::<f64>() < self.config.hgt_integration_stability {
            let mut candidate = species.abstract_traits.clone();
            candidate.insert(name.to_string(), transferred);
            if TraitValidator::check(&candidate, species.trophic_level) {
                species.abstract_traits = candidate;
                result.hgt_acquired = Some((name.to_string(), transferred));
            }
        }
    }
}

fn pressure_hint_for(trait_name: &str) -> String {
    match trait_name {
        "heat_resistance" => "heat",
        "cold_resistance" => "cold",
        "drought_resistance" => "drought",
        "salinity_resistance" => "salinity",
        "uv_resistance" => "radiation",
        _ => "stress",
    }
    .to_string()
}

/// Maps the dominant mortality component onto a stress type label.
pub fn infer_pressure_type(result: &MortalityResult, modifiers: &PressureModifiers) -> String {
    match result.dominant_pressure() {
        Some("environment") => {
            let temp = modifiers.get(Modifier::Temperature);
            if temp < -0.1 {
                "cold".to_string()
            } else if temp > 0.1 {
                "heat".to_string()
            } else if modifiers.get(Modifier::Drought) > 0.0 {
                "drought".to_string()
            } else {
                "stress".to_string()
            }
        }
        Some("predation") => "predation".to_string(),
        Some("competition") | Some("plant_competition") => "competition".to_string(),
        Some("resources") => "resource_scarcity".to_string(),
        Some("trophic") => "starvation".to_string(),
        _ => "stress".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_io::seed::seed_species;

    #[test]
    fn test_bootstrap_fills_empty_pool() {
        let service = GeneActivationService::default();
        let mut species = seed_species().remove(0);
        assert!(species.dormant_genes.is_empty());
        service.check_and_activate(&mut species, 0.1, "heat", 1, None);
        assert!(!species.dormant_genes.is_empty());
        assert!(species.dormant_genes.traits.contains_key("latent_adaptability"));
    }

    #[test]
    fn test_low_mortality_never_activates() {
        let service = GeneActivationService::default();
        let mut species = seed_species().remove(0);
        for turn in 1..20 {
            let result = service.check_and_activate(&mut species, 0.05, "heat", turn, None);
            assert!(result.traits.is_empty());
        }
    }

    #[test]
    fn test_sustained_stress_eventually_activates() {
        let service = GeneActivationService::default();
        let mut species = seed_species().remove(0);
        species.hidden_traits.insert("evolution_potential".into(), 0.9);
        let mut any = false;
        for turn in 1..60 {
            let result = service.check_and_activate(&mut species, 0.6, "heat", turn, None);
            if !result.traits.is_empty() || !result.harmful_activated.is_empty() {
                any = true;
                break;
            }
        }
        assert!(any, "no activation across 60 stressed turns");
    }

    #[test]
    fn test_activation_deterministic() {
        let service = GeneActivationService::default();
        let mut a = seed_species().remove(0);
        let mut b = a.clone();
        for turn in 1..30 {
            let ra = service.check_and_activate(&mut a, 0.5, "cold", turn, None);
            let rb = service.check_and_activate(&mut b, 0.5, "cold", turn, None);
            assert_eq!(ra.traits, rb.traits);
        }
        assert_eq!(a.abstract_traits, b.abstract_traits);
    }

    #[test]
    fn test_stress_exposure_recorded() {
        let service = GeneActivationService::default();
        let mut species = seed_species().remove(0);
        service.check_and_activate(&mut species, 0.4, "drought", 1, None);
        service.check_and_activate(&mut species, 0.7, "drought", 2, None);
        let record = species.stress_exposure.get("drought").unwrap();
        assert_eq!(record.count, 2);
        assert!((record.max_death_rate - 0.7).abs() < 1e-12);
    }
}
