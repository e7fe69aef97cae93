use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::mortality::{Tier, TileDistribution};
use super::species::SpeciesStatus;

/// Per-species view included in every turn report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesSnapshot {
    pub lineage_code: String,
    pub latin_name: String,
    pub common_name: String,
    pub population: u64,
    pub population_share: f64,
    pub deaths: u64,
    pub death_rate: f64,
    pub niche_overlap: f64,
    pub tier: Tier,
    pub status: SpeciesStatus,
    pub ecological_role: String,
    #[serde(flatten)]
    pub distribution: TileDistribution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchingEvent {
    pub parent_code: String,
    pub child_code: String,
    pub child_latin_name: String,
    pub child_common_name: String,
    pub turn_index: u64,
    pub speciation_type: String,
    pub description: String,
    #[serde(default)]
    pub degraded_naming: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReemergenceEvent {
    pub lineage_code: String,
    pub turn_index: u64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MajorEvent {
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub severity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapChange {
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub tile_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationEvent {
    pub lineage_code: String,
    pub from_tile: i64,
    pub to_tile: i64,
    pub population: u64,
}

/// The structured output of one simulated turn (~500,000 years).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReport {
    pub turn_index: u64,
    pub pressures_summary: String,
    pub narrative: String,
    pub species: Vec<SpeciesSnapshot>,
    pub branching_events: Vec<BranchingEvent>,
    pub reemergence_events: Vec<ReemergenceEvent>,
    pub major_events: Vec<MajorEvent>,
    pub map_changes: Vec<MapChange>,
    pub migration_events: Vec<MigrationEvent>,
    pub sea_level: f64,
    pub global_avg_temperature: f64,
    pub tectonic_stage: String,
    /// Set when any stage fell back from AI to rules.
    #[serde(default)]
    pub degraded_mode: bool,
    /// Warnings emitted by invariant projections during the turn.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Activation events keyed by lineage code.
    #[serde(default)]
    pub gene_activations: BTreeMap<String, Vec<String>>,
}

impl TurnReport {
    pub fn empty(turn_index: u64) -> Self {
        Self {
            turn_index,
            pressures_summary: String::new(),
            narrative: String::new(),
            species: Vec::new(),
            branching_events: Vec::new(),
            reemergence_events: Vec::new(),
            major_events: Vec::new(),
            map_changes: Vec::new(),
            migration_events: Vec::new(),
            sea_level: 0.0,
            global_avg_temperature: 14.0,
            tectonic_stage: String::new(),
            degraded_mode: false,
            warnings: Vec::new(),
            gene_activations: BTreeMap::new(),
        }
    }
}
