//! Request/response shapes for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use deeptime_data::PressureSpec;

#[derive(Debug, Deserialize)]
pub struct RunTurnRequest {
    pub rounds: u32,
    #[serde(default)]
    pub pressures: Vec<PressureSpec>,
}

#[derive(Debug, Deserialize)]
pub struct SpeciesEditRequest {
    pub lineage_code: String,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub abstract_traits: Option<std::collections::BTreeMap<String, f64>>,
    #[serde(default)]
    pub protect_turns: Option<u32>,
    #[serde(default)]
    pub suppress_turns: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WatchlistRequest {
    pub lineage_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaveRequest {
    pub save_name: String,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub map_seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SaveNameRequest {
    pub save_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct MapQuery {
    #[serde(default)]
    pub limit_tiles: Option<usize>,
    #[serde(default)]
    pub view_mode: Option<String>,
    #[serde(default)]
    pub species_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LineageNode {
    pub lineage_code: String,
    pub parent_code: Option<String>,
    pub latin_name: String,
    pub common_name: String,
    pub status: deeptime_data::SpeciesStatus,
    pub created_turn: u64,
    pub population: u64,
}

/// Structured API error: `{error: {code, message, field?}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub field: Option<String>,
    pub extra: Option<serde_json::Value>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
            field: None,
            extra: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
            field: None,
            extra: None,
        }
    }

    pub fn insufficient_energy(need: f64, have: f64) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "insufficient_energy",
            message: format!("insufficient energy: need {need:.1}, have {have:.1}"),
            field: None,
            extra: Some(json!({"need": need, "have": have})),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: message.into(),
            field: None,
            extra: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        if let Some(field) = self.field {
            body["error"]["field"] = json!(field);
        }
        if let Some(extra) = self.extra {
            for (key, value) in extra.as_object().cloned().unwrap_or_default() {
                body["error"][key] = value;
            }
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(energy) = err.downcast_ref::<deeptime_core::energy::InsufficientEnergy>() {
            return ApiError::insufficient_energy(energy.need, energy.have);
        }
        ApiError::internal(err.to_string())
    }
}

impl From<deeptime_io::IoError> for ApiError {
    fn from(err: deeptime_io::IoError) -> Self {
        match &err {
            deeptime_io::IoError::NotFound(what) => ApiError::not_found(what.clone()),
            deeptime_io::IoError::Validation(message) => ApiError::bad_request(message.clone()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}
