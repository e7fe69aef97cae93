//! Endpoint handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};
use std::path::Path as FsPath;
use std::sync::Arc;

use deeptime_core::TurnCommand;
use deeptime_data::{Species, TurnReport};

use super::dto::{
    ApiError, ConfirmRequest, CreateSaveRequest, HistoryQuery, LineageNode, MapQuery,
    RunTurnRequest, SaveNameRequest, SpeciesEditRequest, WatchlistRequest,
};
use super::AppState;

pub async fn run_turns(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunTurnRequest>,
) -> Result<Json<Vec<TurnReport>>, ApiError> {
    if !(1..=32).contains(&request.rounds) {
        return Err(ApiError::bad_request("rounds must be in [1, 32]"));
    }
    for pressure in &request.pressures {
        if !(0.0..=10.0).contains(&pressure.intensity) {
            return Err(ApiError::bad_request("intensity must be in [0, 10]"));
        }
    }
    let reports = state
        .engine
        .run_turn(TurnCommand {
            rounds: request.rounds,
            pressures: request.pressures,
        })
        .await?;
    Ok(Json(reports))
}

pub async fn lineage(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let species = state.engine.db.species().list_all()?;
    let nodes: Vec<LineageNode> = species
        .iter()
        .map(|s| LineageNode {
            lineage_code: s.lineage_code.clone(),
            parent_code: s.parent_code.clone(),
            latin_name: s.latin_name.clone(),
            common_name: s.common_name.clone(),
            status: s.status,
            created_turn: s.created_turn,
            population: s.population,
        })
        .collect();
    Ok(Json(json!({ "nodes": nodes })))
}

pub async fn species_list(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let species = state.engine.db.species().list_alive()?;
    let entries: Vec<Value> = species
        .iter()
        .map(|s| {
            json!({
                "lineage_code": s.lineage_code,
                "latin_name": s.latin_name,
                "common_name": s.common_name,
                "population": s.population,
                "status": s.status,
                "ecological_role": role_of(s),
            })
        })
        .collect();
    Ok(Json(json!({ "species": entries })))
}

fn role_of(species: &Species) -> &'static str {
    match species.diet_type {
        deeptime_data::DietType::Autotroph => "producer",
        deeptime_data::DietType::Detritivore => "decomposer",
        deeptime_data::DietType::Herbivore => "grazer",
        deeptime_data::DietType::Omnivore => "opportunist",
        deeptime_data::DietType::Carnivore => "predator",
    }
}

pub async fn species_detail(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Species>, ApiError> {
    // Extinct lineages remain addressable forever.
    state
        .engine
        .db
        .species()
        .get(&code)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("species {code}")))
}

pub async fn species_edit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpeciesEditRequest>,
) -> Result<Json<Species>, ApiError> {
    let store = state.engine.db.species();
    let mut species = store
        .get(&request.lineage_code)?
        .ok_or_else(|| ApiError::not_found(format!("species {}", request.lineage_code)))?;

    if let Some(common_name) = request.common_name {
        species.common_name = common_name;
    }
    if let Some(description) = request.description {
        if species.description != description {
            species.description = description;
            // The embedding is content-addressed; stale vectors must not
            // survive a description edit.
            species.ecological_vector = None;
        }
    }
    if let Some(traits) = request.abstract_traits {
        let mut merged = species.abstract_traits.clone();
        for (name, value) in traits {
            merged.insert(name, value);
        }
        deeptime_data::TraitValidator::project(
            &mut merged,
            species.trophic_level,
            Some(&species.abstract_traits),
        );
        species.abstract_traits = merged;
    }
    if let Some(turns) = request.protect_turns {
        species.is_protected = turns > 0;
        species.protection_turns = turns;
    }
    if let Some(turns) = request.suppress_turns {
        species.is_suppressed = turns > 0;
        species.suppression_turns = turns;
    }

    store.upsert(&mut species)?;
    Ok(Json(species))
}

pub async fn set_watchlist(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WatchlistRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Ok(mut watchlist) = state.engine.watchlist.write() {
        watchlist.clear();
        watchlist.extend(request.lineage_codes.iter().cloned());
    }
    let watching: Vec<String> = state
        .engine
        .watchlist
        .read()
        .map(|w| w.iter().cloned().collect())
        .unwrap_or_default();
    Ok(Json(json!({ "watching": watching })))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TurnReport>>, ApiError> {
    Ok(Json(
        state.engine.db.history().recent_reports(query.limit.min(500))?,
    ))
}

pub async fn map_overview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MapQuery>,
) -> Result<Json<Value>, ApiError> {
    let env = state.engine.db.environment();
    let map_state = env.map_state()?;
    let mut tiles = env.list_tiles()?;
    if let Some(limit) = query.limit_tiles {
        tiles.truncate(limit);
    }

    // Species overlay: per-tile populations from the latest habitat rows.
    let overlay: Option<Value> = match &query.species_code {
        Some(code) => {
            let species = state
                .engine
                .db
                .species()
                .get(code)?
                .ok_or_else(|| ApiError::not_found(format!("species {code}")))?;
            let records = env.latest_habitats_for(species.id)?;
            Some(json!(records
                .iter()
                .map(|h| json!({
                    "tile_id": h.tile_id,
                    "population": h.population,
                    "suitability": h.suitability,
                }))
                .collect::<Vec<_>>()))
        }
        None => None,
    };

    Ok(Json(json!({
        "turn_index": map_state.turn_index,
        "sea_level": map_state.sea_level,
        "global_avg_temperature": map_state.global_avg_temperature,
        "tectonic_stage": map_state.stage_name,
        "view_mode": query.view_mode.unwrap_or_else(|| "biome".to_string()),
        "tiles": tiles,
        "species_overlay": overlay,
    })))
}

pub async fn get_ui_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(
        state
            .ui_config
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|_| json!({})),
    )
}

pub async fn set_ui_config(
    State(state): State<Arc<AppState>>,
    Json(value): Json<Value>,
) -> Json<Value> {
    if let Ok(mut config) = state.ui_config.write() {
        *config = value.clone();
    }
    Json(value)
}

pub async fn create_save(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSaveRequest>,
) -> Result<Json<Value>, ApiError> {
    // A fresh world: wipe, reseed, then snapshot it under the save name.
    state.engine.db.truncate_all()?;
    let seed = request.map_seed.unwrap_or(state.config.world.map_seed);
    deeptime_io::seed_world(
        &state.engine.db,
        seed,
        state.config.world.map_width,
        state.config.world.map_height,
    )?;
    let meta = deeptime_io::create_save(
        &state.engine.db,
        FsPath::new(&state.config.saves_dir),
        &request.save_name,
        request.scenario.as_deref().unwrap_or("default"),
    )?;
    state.rotate_session();
    Ok(Json(json!(meta)))
}

pub async fn write_save(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveNameRequest>,
) -> Result<Json<Value>, ApiError> {
    let meta = deeptime_io::create_save(
        &state.engine.db,
        FsPath::new(&state.config.saves_dir),
        &request.save_name,
        "manual",
    )?;
    Ok(Json(json!({
        "success": true,
        "save_dir": format!("{}/{}", state.config.saves_dir, meta.save_name),
        "turn_index": meta.turn_index,
    })))
}

pub async fn load_save(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveNameRequest>,
) -> Result<Json<Value>, ApiError> {
    let meta = deeptime_io::load_save(
        &state.engine.db,
        FsPath::new(&state.config.saves_dir),
        &request.save_name,
    )?;
    state.rotate_session();
    Ok(Json(json!({"success": true, "turn_index": meta.turn_index})))
}

pub async fn game_state(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let map_state = state.engine.db.environment().map_state()?;
    let species_count = state.engine.db.species().count_alive()?;
    let session = state
        .session_id
        .read()
        .map(|id| id.to_string())
        .unwrap_or_default();
    Ok(Json(json!({
        "turn_index": map_state.turn_index,
        "species_count": species_count,
        "sea_level": map_state.sea_level,
        "global_temperature": map_state.global_avg_temperature,
        "backend_session_id": session,
        "energy": state.engine.energy.available(),
    })))
}

pub async fn abort_tasks(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.engine.abort_current_tasks();
    let diagnostics = state.engine.router.as_ref().map(|r| r.diagnostics());
    Json(json!({
        "success": true,
        "active_requests": diagnostics.as_ref().map(|d| d.active_requests).unwrap_or(0),
        "queued_requests": diagnostics.as_ref().map(|d| d.queued_requests).unwrap_or(0),
    }))
}

pub async fn drop_database(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<Value>, ApiError> {
    if !request.confirm {
        return Err(ApiError::bad_request(
            "destructive operation requires confirm=true",
        ));
    }
    state.engine.db.truncate_all()?;
    state.rotate_session();
    Ok(Json(json!({"success": true})))
}

pub async fn remove_species(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<Value>, ApiError> {
    if !request.confirm {
        return Err(ApiError::bad_request(
            "destructive operation requires confirm=true",
        ));
    }
    let removed = state.engine.db.species().remove(&code)?;
    if !removed {
        return Err(ApiError::not_found(format!("species {code}")));
    }
    state
        .engine
        .db
        .history()
        .record_event(&code, "admin_removal", &json!({}))?;
    Ok(Json(json!({"success": true, "removed": code})))
}
