//! Turn report assembly. The narrative comes from the model router when one
//! is wired, with a deterministic template fallback.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use deeptime_data::{
    BranchingEvent, DietType, MajorEvent, MapChange, MapState, MortalityResult, Species,
    SpeciesSnapshot, SpeciesStatus, Tier, TileDistribution, TurnReport,
};
use deeptime_net::{Capability, ModelRouter};

use crate::genes::ActivationEvent;

pub struct ReportContext<'a> {
    pub turn_index: u64,
    pub pressures_summary: String,
    pub species: &'a [Species],
    pub results: &'a [MortalityResult],
    pub branching_events: Vec<BranchingEvent>,
    pub activations: &'a [ActivationEvent],
    pub map_changes: Vec<MapChange>,
    pub major_events: Vec<MajorEvent>,
    pub map_state: &'a MapState,
    pub degraded_mode: bool,
    pub warnings: Vec<String>,
    pub extinctions: Vec<String>,
}

pub struct ReportBuilder;

impl ReportBuilder {
    pub async fn build(ctx: ReportContext<'_>, router: Option<&Arc<ModelRouter>>) -> TurnReport {
        let results_by_code: BTreeMap<&str, &MortalityResult> = ctx
            .results
            .iter()
            .map(|r| (r.lineage_code.as_str(), r))
            .collect();
        let ecosystem_population: u64 = ctx
            .species
            .iter()
            .filter(|s| s.is_alive())
            .map(|s| s.population)
            .sum();

        let mut snapshots = Vec::new();
        for species in ctx.species {
            if species.status == SpeciesStatus::Split {
                continue;
            }
            let result = results_by_code.get(species.lineage_code.as_str());
            let share = if ecosystem_population > 0 {
                species.population as f64 / ecosystem_population as f64
            } else {
                0.0
            };
            snapshots.push(SpeciesSnapshot {
                lineage_code: species.lineage_code.clone(),
                latin_name: species.latin_name.clone(),
                common_name: species.common_name.clone(),
                population: species.population,
                population_share: share,
                deaths: result.map(|r| r.deaths).unwrap_or(0),
                death_rate: result.map(|r| r.death_rate).unwrap_or(0.0),
                niche_overlap: result.map(|r| r.niche_overlap).unwrap_or(0.0),
                tier: result.map(|r| r.tier).unwrap_or(Tier::Background),
                status: species.status,
                ecological_role: ecological_role(species).to_string(),
                distribution: result
                    .map(|r| r.tile_stats.clone())
                    .unwrap_or_else(TileDistribution::default),
            });
        }
        snapshots.sort_by(|a, b| b.population.cmp(&a.population));

        let mut gene_activations: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for event in ctx.activations {
            gene_activations
                .entry(event.lineage_code.clone())
                .or_default()
                .extend(event.summaries.clone());
        }

        let narrative = match router {
            Some(router) if router.has_route(Capability::Narrative) => {
                match Self::ai_narrative(&ctx, router).await {
                    Some(text) => text,
                    None => template_narrative(&ctx),
                }
            }
            _ => template_narrative(&ctx),
        };

        TurnReport {
            turn_index: ctx.turn_index,
            pressures_summary: ctx.pressures_summary,
            narrative,
            species: snapshots,
            branching_events: ctx.branching_events,
            reemergence_events: vec![],
            major_events: ctx.major_events,
            map_changes: ctx.map_changes,
            migration_events: vec![],
            sea_level: ctx.map_state.sea_level,
            global_avg_temperature: ctx.map_state.global_avg_temperature,
            tectonic_stage: ctx.map_state.stage_name.clone(),
            degraded_mode: ctx.degraded_mode,
            warnings: ctx.warnings,
            gene_activations,
        }
    }

    async fn ai_narrative(ctx: &ReportContext<'_>, router: &Arc<ModelRouter>) -> Option<String> {
        let worst: Vec<&MortalityResult> = {
            let mut sorted: Vec<&MortalityResult> = ctx.results.iter().collect();
            sorted.sort_by(|a, b| {
                b.death_rate
                    .partial_cmp(&a.death_rate)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            sorted.into_iter().take(5).collect()
        };
        let prompt = json!({
            "turn": ctx.turn_index,
            "pressures": ctx.pressures_summary,
            "extinctions": ctx.extinctions,
            "new_species": ctx.branching_events.iter().map(|b| &b.child_latin_name).collect::<Vec<_>>(),
            "hardest_hit": worst
                .iter()
                .map(|r| json!({"code": r.lineage_code, "death_rate": r.death_rate}))
                .collect::<Vec<_>>(),
            "sea_level": ctx.map_state.sea_level,
            "temperature": ctx.map_state.global_avg_temperature,
        })
        .to_string();
        let system = "You chronicle half-million-year epochs of an evolving \
                      biosphere. Respond ONLY with JSON {\"narrative\": \"...\"} \
                      in 2-4 vivid but factual sentences.";
        let value = router.invoke(Capability::Narrative, system, &prompt).await.ok()?;
        value
            .get("narrative")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }
}

fn ecological_role(species: &Species) -> &'static str {
    match species.diet_type {
        DietType::Autotroph => "producer",
        DietType::Detritivore => "decomposer",
        DietType::Herbivore => "grazer",
        DietType::Omnivore => "opportunist",
        DietType::Carnivore => {
            if species.trophic_level >= 4.0 {
                "apex predator"
            } else {
                "predator"
            }
        }
    }
}

/// Deterministic narrative used whenever the router is absent or fails.
fn template_narrative(ctx: &ReportContext<'_>) -> String {
    let alive = ctx.species.iter().filter(|s| s.is_alive()).count();
    let mut parts = vec![format!(
        "Turn {}: {} under {}.",
        ctx.turn_index,
        match alive {
            0 => "a silent world".to_string(),
            1 => "a single surviving lineage".to_string(),
            n => format!("{n} living lineages"),
        },
        if ctx.pressures_summary.is_empty() {
            "natural evolution".to_string()
        } else {
            ctx.pressures_summary.clone()
        }
    )];
    if !ctx.extinctions.is_empty() {
        parts.push(format!("Lost to time: {}.", ctx.extinctions.join(", ")));
    }
    if !ctx.branching_events.is_empty() {
        let names: Vec<&str> = ctx
            .branching_events
            .iter()
            .map(|b| b.child_latin_name.as_str())
            .collect();
        parts.push(format!("New lineages emerged: {}.", names.join(", ")));
    }
    if let Some(worst) = ctx.results.iter().max_by(|a, b| {
        a.death_rate
            .partial_cmp(&b.death_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        if worst.death_rate > 0.3 {
            parts.push(format!(
                "{} suffered the most, losing {:.0}% of its population.",
                worst.lineage_code,
                worst.death_rate * 100.0
            ));
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_io::seed::seed_species;

    #[tokio::test]
    async fn test_report_shares_sum_to_one() {
        let species = seed_species();
        let map_state = MapState::default();
        let ctx = ReportContext {
            turn_index: 1,
            pressures_summary: "natural_evolution".to_string(),
            species: &species,
            results: &[],
            branching_events: vec![],
            activations: &[],
            map_changes: vec![],
            major_events: vec![],
            map_state: &map_state,
            degraded_mode: false,
            warnings: vec![],
            extinctions: vec![],
        };
        let report = ReportBuilder::build(ctx, None).await;
        assert_eq!(report.species.len(), 3);
        let total_share: f64 = report.species.iter().map(|s| s.population_share).sum();
        assert!((total_share - 1.0).abs() < 1e-9);
        assert!(!report.narrative.is_empty());
    }

    #[test]
    fn test_roles() {
        let mut species = seed_species().remove(0);
        assert_eq!(ecological_role(&species), "producer");
        species.diet_type = DietType::Carnivore;
        species.trophic_level = 4.2;
        assert_eq!(ecological_role(&species), "apex predator");
    }
}
