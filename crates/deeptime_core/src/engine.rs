//! Turn orchestrator.
//!
//! Sequences the stages of one simulated turn (~500,000 years) over the
//! stores, emits progress events, and assembles the turn report. Stages run
//! strictly in order; AI-backed stages degrade to rule-only fallbacks and
//! set the report's degraded flag instead of failing the turn.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde_json::json;

use deeptime_data::{
    MortalityResult, PressureModifiers, PressureSpec, Species, SpeciesStatus, Tier, TurnReport,
};
use deeptime_io::{Database, GenusRecord};
use deeptime_net::{EmbeddingService, ModelRouter};

use crate::energy::EnergyStore;
use crate::events::{EventBus, EventKind, SimEvent};
use crate::genes::{GeneActivationService, GeneDiversityService};
use crate::habitat::HabitatManager;
use crate::index::{HabitatIndex, TileIndex};
use crate::kin::KinCompetitionCalculator;
use crate::matrix::Matrix;
use crate::mortality::{
    speciation_candidates, CandidateParams, MortalityContext, TileMortalityEngine,
};
use crate::niche::NicheAnalyzer;
use crate::predation::PredationService;
use crate::report::{ReportBuilder, ReportContext};
use crate::reproduction::ReproductionEngine;
use crate::similarity::combined_similarity_matrix;
use crate::speciation::{SpeciationEngine, SpeciationInput};
use crate::tectonics::{RuleTectonics, TectonicStepper};

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub turn_years: u64,
    pub generation_scale: f64,
    pub critical_species_limit: usize,
    pub focus_batch_size: usize,
    pub focus_batch_limit: usize,
    pub background_population_threshold: u64,
    pub extinction_population_floor: u64,
    pub extinction_death_rate: f64,
    pub autosave_every_rounds: u64,
    pub autosave_slots: u64,
    pub saves_dir: PathBuf,
    pub map_seed: u64,
    pub map_width: u32,
    pub map_height: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            turn_years: 500_000,
            generation_scale: 8.0,
            critical_species_limit: 3,
            focus_batch_size: 8,
            focus_batch_limit: 3,
            background_population_threshold: 50_000,
            extinction_population_floor: 10,
            extinction_death_rate: 0.95,
            autosave_every_rounds: 5,
            autosave_slots: 3,
            saves_dir: PathBuf::from("data/saves"),
            map_seed: 42,
            map_width: 48,
            map_height: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnCommand {
    pub rounds: u32,
    pub pressures: Vec<PressureSpec>,
}

pub struct SimulationEngine {
    pub db: Database,
    pub router: Option<Arc<ModelRouter>>,
    pub embeddings: Arc<EmbeddingService>,
    pub events: EventBus,
    pub energy: EnergyStore,
    pub config: SimConfig,
    pub watchlist: RwLock<BTreeSet<String>>,
    speciation: SpeciationEngine,
    kin: KinCompetitionCalculator,
    reproduction: ReproductionEngine,
    activation: GeneActivationService,
    diversity: GeneDiversityService,
    habitat: HabitatManager,
    tectonics: Box<dyn TectonicStepper>,
}

impl SimulationEngine {
    pub fn new(
        db: Database,
        router: Option<Arc<ModelRouter>>,
        embeddings: Arc<EmbeddingService>,
        config: SimConfig,
    ) -> Self {
        let habitat = HabitatManager::new(db.environment());
        Self {
            db,
            router,
            embeddings,
            events: EventBus::new(),
            energy: EnergyStore::default(),
            config,
            watchlist: RwLock::new(BTreeSet::new()),
            speciation: SpeciationEngine::default(),
            kin: KinCompetitionCalculator::default(),
            reproduction: ReproductionEngine::default(),
            activation: GeneActivationService::default(),
            diversity: GeneDiversityService::default(),
            habitat,
            tectonics: Box::new(RuleTectonics),
        }
    }

    /// Skip the in-flight AI step; affected stages fall back to rules.
    pub fn skip_ai_step(&self) {
        if let Some(router) = &self.router {
            router.skip_current();
        }
    }

    pub fn abort_current_tasks(&self) {
        if let Some(router) = &self.router {
            router.abort_all();
        }
    }

    pub async fn run_turn(&self, command: TurnCommand) -> anyhow::Result<Vec<TurnReport>> {
        let rounds = command.rounds.clamp(1, 32);
        let mut reports = Vec::with_capacity(rounds as usize);
        for _ in 0..rounds {
            let report = self.run_round(&command.pressures).await?;
            let turn_index = report.turn_index;
            reports.push(report);
            self.maybe_autosave(turn_index);
        }
        Ok(reports)
    }

    async fn run_round(&self, pressures: &[PressureSpec]) -> anyhow::Result<TurnReport> {
        // Energy gate comes before any state change.
        let cost: f64 = pressures
            .iter()
            .map(|p| p.kind.energy_cost(p.intensity))
            .sum();
        self.energy.debit(cost).map_err(|e| {
            self.events.emit(
                SimEvent::new(EventKind::Error, "insufficient energy", "energy")
                    .with_payload(json!({"need": e.need, "have": e.have})),
            );
            anyhow::Error::new(e)
        })?;

        let mut degraded_mode = false;
        let mut warnings: Vec<String> = Vec::new();

        let mut map_state = self.db.environment().map_state()?;
        if map_state.map_seed == 0 {
            map_state.map_seed = self.config.map_seed;
        }
        let turn_index = map_state.turn_index + 1;
        self.events
            .emit_stage(EventKind::Start, format!("turn {turn_index} begins"));

        // a. Pressure templates to modifiers.
        let mut modifiers = PressureModifiers::default();
        for spec in pressures {
            modifiers.merge(spec.modifiers());
        }
        let pressures_summary = pressures
            .iter()
            .map(PressureSpec::summary)
            .collect::<Vec<_>>()
            .join("; ");
        self.events.emit_stage(
            EventKind::PressureApplied,
            format!("pressures resolved: {pressures_summary}"),
        );

        // b. Tectonic step over the mutable map.
        if self.db.environment().tile_count()? == 0 {
            let tiles =
                deeptime_io::generate_map(map_state.map_seed, self.config.map_width, self.config.map_height);
            self.db.environment().replace_tiles(&tiles)?;
        }
        let mut tiles_vec = self.db.environment().list_tiles()?;
        let tectonic = self
            .tectonics
            .step(&mut map_state, &mut tiles_vec, &modifiers);
        self.db.environment().update_tiles(&tiles_vec)?;
        self.events.emit_stage(
            EventKind::TectonicStep,
            format!("tectonics: {}", map_state.stage_name),
        );
        let tiles = TileIndex::new(tiles_vec);

        // Load the living population.
        let mut species = self.db.species().list_all()?;
        let alive_count = species.iter().filter(|s| s.is_alive()).count();
        if alive_count == 0 {
            // A silent world still produces a report.
            let report = ReportBuilder::build(
                ReportContext {
                    turn_index,
                    pressures_summary,
                    species: &species,
                    results: &[],
                    branching_events: vec![],
                    activations: &[],
                    map_changes: tectonic.map_changes,
                    major_events: tectonic.major_events,
                    map_state: &map_state,
                    degraded_mode,
                    warnings,
                    extinctions: vec![],
                },
                self.router.as_ref(),
            )
            .await;
            self.finish_round(&mut map_state, turn_index, &report)?;
            return Ok(report);
        }

        // First contact with the map: species without habitat records get
        // their initial top-tile assignment before anything reads them.
        let mut habitat_records = self.db.environment().latest_habitats()?;
        let assigned: BTreeSet<i64> = habitat_records.iter().map(|h| h.species_id).collect();
        let mut fresh_records = Vec::new();
        for sp in species.iter().filter(|s| s.is_alive()) {
            if !assigned.contains(&sp.id) {
                fresh_records.extend(self.habitat.assign_initial_habitat(sp, &tiles, turn_index));
            }
        }
        if !fresh_records.is_empty() {
            self.db.environment().write_habitats_bulk(&fresh_records)?;
            habitat_records.extend(fresh_records);
        }
        let habitats = HabitatIndex::new(habitat_records);

        // Shared similarity state for niche, predation and mortality.
        let descriptions: Vec<String> = species.iter().map(|s| s.description.clone()).collect();
        let embedding_matrix = match self.embeddings.similarity_matrix(&descriptions).await {
            Ok(matrix) => matrix,
            Err(err) => {
                warnings.push(format!("embedding service degraded: {err}"));
                degraded_mode = true;
                vec![vec![0.5; species.len()]; species.len()]
            }
        };
        let sim = combined_similarity_matrix(&species, &embedding_matrix);

        // c. Niche metrics.
        let niche = NicheAnalyzer::analyze(&species, &sim, &habitats, &tiles, &modifiers);
        self.events
            .emit_stage(EventKind::NicheEvaluated, "niche overlap and saturation ready");

        // d. Predation state, cached for the mortality stage.
        PredationService::infer_prey(&mut species, &sim, &habitats);
        self.events
            .emit_stage(EventKind::PredationPrepared, "predation matrix prepared");

        // Kin competition modifiers feed the mortality aggregation.
        let recent_death_rates = self.recent_death_rates()?;
        let kin = self
            .kin
            .calculate(&species, &niche, &recent_death_rates, turn_index);

        // e. Mortality in tiers: critical, focus, background.
        let children_ages = children_ages_of(&species, turn_index);
        let ecosystem_population: u64 = species
            .iter()
            .filter(|s| s.is_alive())
            .map(|s| s.population)
            .sum();

        // Food-web feedback: consumers whose preferred prey has vanished
        // carry dependency mortality into the aggregation stage.
        let alive_codes: BTreeMap<String, bool> = species
            .iter()
            .map(|s| (s.lineage_code.clone(), s.is_alive() && s.population > 0))
            .collect();
        let mut trophic_interactions: BTreeMap<String, f64> = BTreeMap::new();
        for sp in species.iter().filter(|s| s.is_alive()) {
            if sp.prey_species.is_empty() {
                continue;
            }
            let dependency = PredationService::food_dependency(sp, &alive_codes);
            if dependency < 1.0 {
                trophic_interactions.insert(
                    format!("food_web_mortality_{}", sp.lineage_code),
                    (1.0 - dependency) * 0.35,
                );
            }
        }
        let mut results: Vec<MortalityResult> = Vec::new();
        for (tier, indices) in self.tier_batches(&species) {
            if indices.is_empty() {
                continue;
            }
            let batch: Vec<Species> = indices.iter().map(|&i| species[i].clone()).collect();
            let batch_sim = submatrix(&sim, &indices);
            let batch_pred = PredationService::build_matrix(&batch).preference;
            let ctx = MortalityContext {
                species: &batch,
                tier,
                tiles: &tiles,
                habitats: &habitats,
                modifiers: &modifiers,
                niche: &niche,
                trophic_interactions: &trophic_interactions,
                sim: &batch_sim,
                predation: &batch_pred,
                kin: &kin,
                children_ages: &children_ages,
                ecosystem_population,
                turn_index,
                map_seed: map_state.map_seed,
            };
            results.extend(TileMortalityEngine::evaluate(&ctx));
        }
        self.events.emit_stage(
            EventKind::MortalityComputed,
            format!("mortality evaluated for {} species", results.len()),
        );

        // f. Gene activation under stress.
        let activations = self
            .activation
            .batch_check(&mut species, &results, &modifiers, turn_index);
        self.events.emit_stage(
            EventKind::GenesActivated,
            format!("{} species expressed dormant genes", activations.len()),
        );

        // g. Reproduction.
        let reproduction = self.reproduction.apply(
            &species,
            &niche,
            &results,
            &habitats,
            &tiles,
            &kin,
            &tectonic.shocks,
        );
        for note in &reproduction.notes {
            warnings.push(note.clone());
        }
        if !reproduction.rehabitation.is_empty() {
            degraded_mode = true;
        }
        for sp in species.iter_mut() {
            if let Some(total) = reproduction.totals.get(&sp.lineage_code) {
                sp.set_population(*total);
            }
        }
        self.events
            .emit_stage(EventKind::ReproductionApplied, "populations advanced");

        // h. Extinction check.
        let results_by_code: BTreeMap<String, f64> = results
            .iter()
            .map(|r| (r.lineage_code.clone(), r.death_rate))
            .collect();
        let mut extinctions = Vec::new();
        for sp in species.iter_mut() {
            if !sp.is_alive() {
                continue;
            }
            let death_rate = results_by_code
                .get(&sp.lineage_code)
                .copied()
                .unwrap_or(0.0);
            if sp.population <= self.config.extinction_population_floor
                || death_rate >= self.config.extinction_death_rate
            {
                let cause = results
                    .iter()
                    .find(|r| r.lineage_code == sp.lineage_code)
                    .and_then(|r| r.dominant_pressure())
                    .unwrap_or("attrition")
                    .to_string();
                sp.tombstone(turn_index, cause.clone());
                self.db.history().record_event(
                    &sp.lineage_code,
                    "extinction",
                    &json!({"turn": turn_index, "cause": cause}),
                )?;
                extinctions.push(sp.lineage_code.clone());
            }
        }
        self.events.emit_stage(
            EventKind::ExtinctionsChecked,
            format!("{} lineages went extinct", extinctions.len()),
        );

        // i. Speciation from the mortality tile distributions.
        let candidates = speciation_candidates(&results, &tiles, &CandidateParams::default());
        let total_alive = species.iter().filter(|s| s.is_alive()).count();
        let speciation_outcome = self
            .speciation
            .process(
                &mut species,
                SpeciationInput {
                    candidates: &candidates,
                    results: &results,
                    average_pressure: modifiers.average_pressure(),
                    pressures_summary: pressures_summary.clone(),
                    turn_index,
                    map_changes: &tectonic.map_changes,
                    major_events: &tectonic.major_events,
                    total_alive,
                    turn_years: self.config.turn_years,
                    generation_scale: self.config.generation_scale,
                },
                self.router.as_ref(),
                &self.embeddings,
                &self.diversity,
                Some(&self.events),
            )
            .await;
        degraded_mode |= speciation_outcome.degraded;
        let branching_events = speciation_outcome.events.clone();

        // Children join the arena; they inherit the parent's tile weights.
        let mut tile_populations = reproduction.tile_populations;
        for child in &speciation_outcome.children {
            if let Some(parent_code) = &child.parent_code {
                if let Some(parent) = species.iter().find(|s| &s.lineage_code == parent_code) {
                    let weights: BTreeMap<i64, f64> = habitats
                        .for_species(parent.id)
                        .iter()
                        .map(|h| (h.tile_id, h.suitability.max(0.01)))
                        .collect();
                    if !weights.is_empty() {
                        tile_populations.insert(child.lineage_code.clone(), weights);
                    }
                }
            }
        }
        species.extend(speciation_outcome.children);
        self.persist_genus_distances(&speciation_outcome.genetic_distances, turn_index)?;
        self.events.emit_stage(
            EventKind::SpeciationRun,
            format!("{} branching events", branching_events.len()),
        );

        // Per-turn evolutionary state upkeep.
        for sp in species.iter_mut() {
            if !sp.is_alive() {
                continue;
            }
            self.diversity.per_turn_update(sp);
            if sp.protection_turns > 0 {
                sp.protection_turns -= 1;
                sp.is_protected = sp.protection_turns > 0;
            }
            if sp.suppression_turns > 0 {
                sp.suppression_turns -= 1;
                sp.is_suppressed = sp.suppression_turns > 0;
            }
        }

        // j. Habitat snapshot with dispersal smoothing.
        for sp in &species {
            if let Some(pops) = tile_populations.get_mut(&sp.lineage_code) {
                self.habitat.dispersal_smooth(sp, pops, &tiles);
            }
        }
        let force = !reproduction.rehabitation.is_empty();
        self.habitat
            .snapshot_habitats(&species, &tile_populations, &tiles, turn_index, force)?;
        self.events
            .emit_stage(EventKind::HabitatSnapshot, "habitats persisted");

        self.db.species().upsert_many(&mut species)?;

        // k. Report.
        let report = ReportBuilder::build(
            ReportContext {
                turn_index,
                pressures_summary,
                species: &species,
                results: &results,
                branching_events,
                activations: &activations,
                map_changes: tectonic.map_changes,
                major_events: tectonic.major_events,
                map_state: &map_state,
                degraded_mode,
                warnings,
                extinctions,
            },
            self.router.as_ref(),
        )
        .await;
        self.events
            .emit_stage(EventKind::ReportBuilt, "turn report assembled");
        self.finish_round(&mut map_state, turn_index, &report)?;
        Ok(report)
    }

    fn finish_round(
        &self,
        map_state: &mut deeptime_data::MapState,
        turn_index: u64,
        report: &TurnReport,
    ) -> anyhow::Result<()> {
        map_state.turn_index = turn_index;
        self.db.environment().set_map_state(map_state)?;
        self.db.history().insert_report(report)?;
        self.energy.regenerate();
        self.events
            .emit_stage(EventKind::Complete, format!("turn {turn_index} complete"));
        Ok(())
    }

    /// Tier assignment: watched species are critical, the population top is
    /// focus, the long tail is background.
    fn tier_batches(&self, species: &[Species]) -> Vec<(Tier, Vec<usize>)> {
        let watched = self
            .watchlist
            .read()
            .map(|w| w.clone())
            .unwrap_or_default();
        let mut critical = Vec::new();
        let mut rest: Vec<usize> = Vec::new();
        for (i, sp) in species.iter().enumerate() {
            if !sp.is_alive() {
                continue;
            }
            if watched.contains(&sp.lineage_code) && critical.len() < self.config.critical_species_limit
            {
                critical.push(i);
            } else {
                rest.push(i);
            }
        }
        rest.sort_by(|&a, &b| species[b].population.cmp(&species[a].population));
        let focus_cap = self.config.focus_batch_size * self.config.focus_batch_limit;
        let mut focus = Vec::new();
        let mut background = Vec::new();
        for idx in rest {
            let big = species[idx].population >= self.config.background_population_threshold;
            if focus.len() < focus_cap && big {
                focus.push(idx);
            } else {
                background.push(idx);
            }
        }
        // Small worlds evaluate everything in focus detail.
        if focus.is_empty() && background.len() <= self.config.focus_batch_size {
            return vec![(Tier::Critical, critical), (Tier::Focus, background)];
        }
        vec![
            (Tier::Critical, critical),
            (Tier::Focus, focus),
            (Tier::Background, background),
        ]
    }

    fn recent_death_rates(&self) -> anyhow::Result<BTreeMap<String, f64>> {
        let mut out = BTreeMap::new();
        if let Some(last) = self.db.history().recent_reports(1)?.pop() {
            for snapshot in last.species {
                out.insert(snapshot.lineage_code, snapshot.death_rate);
            }
        }
        Ok(out)
    }

    fn persist_genus_distances(
        &self,
        distances: &[(String, String, f64)],
        turn_index: u64,
    ) -> anyhow::Result<()> {
        let mut by_genus: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
        for (genus, pair, distance) in distances {
            by_genus
                .entry(genus.as_str())
                .or_default()
                .push((pair.as_str(), *distance));
        }
        for (genus_code, pairs) in by_genus {
            let mut record = self
                .db
                .history()
                .get_genus(genus_code)?
                .unwrap_or_else(|| GenusRecord {
                    code: genus_code.to_string(),
                    name_latin: genus_code.to_string(),
                    name_common: genus_code.to_string(),
                    genetic_distances: BTreeMap::new(),
                    gene_library: serde_json::Value::Null,
                    created_turn: turn_index,
                    updated_turn: turn_index,
                });
            for (pair, distance) in pairs {
                record.genetic_distances.insert(pair.to_string(), distance);
            }
            record.updated_turn = turn_index;
            self.db.history().upsert_genus(&record)?;
        }
        Ok(())
    }

    fn maybe_autosave(&self, turn_index: u64) {
        if self.config.autosave_every_rounds == 0
            || turn_index % self.config.autosave_every_rounds != 0
        {
            return;
        }
        let db = self.db.clone();
        let dir = self.config.saves_dir.clone();
        let slots = self.config.autosave_slots;
        // Reads a snapshot-consistent view; may overlap the next turn.
        tokio::spawn(async move {
            if let Err(err) =
                tokio::task::spawn_blocking(move || deeptime_io::rotate_autosave(&db, &dir, turn_index, slots))
                    .await
                    .map_err(anyhow::Error::new)
                    .and_then(|r| r.map_err(anyhow::Error::new))
            {
                tracing::warn!(error = %err, "autosave failed");
            }
        });
    }
}

/// Extracts rows/cols `indices` into a dense batch-order matrix.
fn submatrix(full: &Matrix, indices: &[usize]) -> Matrix {
    let n = indices.len();
    let mut out = Matrix::zeros(n, n);
    for (a, &i) in indices.iter().enumerate() {
        for (b, &j) in indices.iter().enumerate() {
            out.set(a, b, full.get(i, j));
        }
    }
    out
}

fn children_ages_of(species: &[Species], turn_index: u64) -> BTreeMap<String, Vec<u64>> {
    let mut out: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for sp in species {
        if sp.status != SpeciesStatus::Alive {
            continue;
        }
        if let Some(parent) = &sp.parent_code {
            out.entry(parent.clone()).or_default().push(sp.age(turn_index));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_fixture() -> SimulationEngine {
        let db = Database::open_in_memory().unwrap();
        deeptime_io::seed_world(&db, 7, 16, 10).unwrap();
        SimulationEngine::new(
            db,
            None,
            Arc::new(EmbeddingService::local()),
            SimConfig {
                autosave_every_rounds: 0,
                map_seed: 7,
                map_width: 16,
                map_height: 10,
                ..SimConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_single_natural_turn() {
        let engine = engine_fixture();
        let reports = engine
            .run_turn(TurnCommand {
                rounds: 1,
                pressures: vec![PressureSpec {
                    kind: deeptime_data::PressureKind::NaturalEvolution,
                    intensity: 0.0,
                    region: None,
                    narrative: None,
                }],
            })
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.turn_index, 1);
        assert_eq!(report.species.len(), 3);
        assert!(report.species.iter().all(|s| s.population > 0));
    }

    #[tokio::test]
    async fn test_turn_counter_advances() {
        let engine = engine_fixture();
        let command = TurnCommand {
            rounds: 2,
            pressures: vec![PressureSpec {
                kind: deeptime_data::PressureKind::NaturalEvolution,
                intensity: 0.0,
                region: None,
                narrative: None,
            }],
        };
        let reports = engine.run_turn(command).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].turn_index, 1);
        assert_eq!(reports[1].turn_index, 2);
        let state = engine.db.environment().map_state().unwrap();
        assert_eq!(state.turn_index, 2);
    }

    #[tokio::test]
    async fn test_empty_world_turn_is_clean() {
        let db = Database::open_in_memory().unwrap();
        let engine = SimulationEngine::new(
            db,
            None,
            Arc::new(EmbeddingService::local()),
            SimConfig {
                autosave_every_rounds: 0,
                ..SimConfig::default()
            },
        );
        let reports = engine
            .run_turn(TurnCommand {
                rounds: 1,
                pressures: vec![PressureSpec {
                    kind: deeptime_data::PressureKind::NaturalEvolution,
                    intensity: 0.0,
                    region: None,
                    narrative: None,
                }],
            })
            .await
            .unwrap();
        assert!(reports[0].species.is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_energy_rejected() {
        let engine = engine_fixture();
        // Drain the pool, then ask for an expensive catastrophe.
        while engine.energy.debit(50.0).is_ok() {}
        let result = engine
            .run_turn(TurnCommand {
                rounds: 1,
                pressures: vec![PressureSpec {
                    kind: deeptime_data::PressureKind::MeteorImpact,
                    intensity: 10.0,
                    region: None,
                    narrative: None,
                }],
            })
            .await;
        assert!(result.is_err());
    }
}
