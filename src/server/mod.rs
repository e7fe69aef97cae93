//! HTTP layer: axum router, app state, SSE stream.

pub mod dto;
pub mod routes;
pub mod sse;

use axum::routing::{get, post};
use axum::Router;
use std::sync::{Arc, RwLock};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use deeptime_core::SimulationEngine;

use crate::model::config::AppConfig;

pub struct AppState {
    pub engine: Arc<SimulationEngine>,
    pub config: AppConfig,
    /// Changes on every process start and on save load; clients use it to
    /// detect a swapped world.
    pub session_id: RwLock<Uuid>,
    pub ui_config: RwLock<serde_json::Value>,
}

impl AppState {
    pub fn new(engine: Arc<SimulationEngine>, config: AppConfig) -> Self {
        Self {
            engine,
            config,
            session_id: RwLock::new(Uuid::new_v4()),
            ui_config: RwLock::new(serde_json::json!({})),
        }
    }

    pub fn rotate_session(&self) {
        if let Ok(mut id) = self.session_id.write() {
            *id = Uuid::new_v4();
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/turns/run", post(routes::run_turns))
        .route("/api/events/stream", get(sse::event_stream))
        .route("/api/lineage", get(routes::lineage))
        .route("/api/species/list", get(routes::species_list))
        .route("/api/species/:code", get(routes::species_detail))
        .route("/api/species/edit", post(routes::species_edit))
        .route("/api/watchlist", post(routes::set_watchlist))
        .route("/api/history", get(routes::history))
        .route("/api/map", get(routes::map_overview))
        .route(
            "/api/config/ui",
            get(routes::get_ui_config).post(routes::set_ui_config),
        )
        .route("/api/saves/create", post(routes::create_save))
        .route("/api/saves/save", post(routes::write_save))
        .route("/api/saves/load", post(routes::load_save))
        .route("/api/game/state", get(routes::game_state))
        .route("/api/tasks/abort", post(routes::abort_tasks))
        .route("/api/admin/drop-database", post(routes::drop_database))
        .route("/api/admin/species/:code/remove", post(routes::remove_species))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = build_router(state.clone());
    tracing::info!("deeptime server listening on http://{addr}");
    tracing::info!("    Turn API:  POST http://{addr}/api/turns/run");
    tracing::info!("    Event SSE: GET  http://{addr}/api/events/stream");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
