//! Tectonic/climate collaborator interface with a rule-based default.
//!
//! The real subsystem lives outside the core; the engine only needs map
//! deltas, environmental summaries, and named events per turn.

use rand::Rng;

use deeptime_data::{MajorEvent, MapChange, MapState, MapTile, Modifier, PressureModifiers};

use crate::reproduction::EnvShocks;
use crate::rng::turn_rng;

pub struct TectonicOutcome {
    pub map_changes: Vec<MapChange>,
    pub major_events: Vec<MajorEvent>,
    pub shocks: EnvShocks,
}

pub trait TectonicStepper: Send + Sync {
    fn step(
        &self,
        state: &mut MapState,
        tiles: &mut [MapTile],
        modifiers: &PressureModifiers,
    ) -> TectonicOutcome;
}

const STAGES: [(&str, u64); 4] = [
    ("stable_craton", 20),
    ("rift_opening", 12),
    ("continental_drift", 16),
    ("collision_orogeny", 10),
];

/// Deterministic drift model: stage cycling, slow sea-level and temperature
/// wander, occasional uplift/volcanism/glaciation map changes.
pub struct RuleTectonics;

impl TectonicStepper for RuleTectonics {
    fn step(
        &self,
        state: &mut MapState,
        tiles: &mut [MapTile],
        modifiers: &PressureModifiers,
    ) -> TectonicOutcome {
        let mut rng = turn_rng(state.map_seed, state.turn_index, 0x7ec7);
        let mut map_changes = Vec::new();
        let mut major_events = Vec::new();

        // Stage progression.
        state.stage_progress += 1.0 / state.stage_duration.max(1) as f64;
        if state.stage_progress >= 1.0 {
            let current = STAGES
                .iter()
                .position(|(name, _)| *name == state.stage_name)
                .unwrap_or(0);
            let (next_name, next_duration) = STAGES[(current + 1) % STAGES.len()];
            state.stage_name = next_name.to_string();
            state.stage_duration = next_duration;
            state.stage_progress = 0.0;
            map_changes.push(MapChange {
                kind: "stage_transition".to_string(),
                description: format!("tectonic stage shifted to {next_name}"),
                tile_ids: vec![],
            });
        }

        // Climate wander plus the operator's temperature push.
        let temp_push = modifiers.get(Modifier::Temperature) * 0.8;
        let temp_drift = rng.gen_range(-0.4..0.4) + temp_push;
        state.global_avg_temperature += temp_drift;
        let sea_drift = rng.gen_range(-1.5..1.5) + temp_drift * 0.8;
        state.sea_level += sea_drift;

        for tile in tiles.iter_mut() {
            tile.temperature += temp_drift;
        }

        // Episodic geology keyed to the stage.
        match state.stage_name.as_str() {
            "collision_orogeny" if rng.gen_bool(0.3) => {
                let uplifted: Vec<i64> = tiles
                    .iter_mut()
                    .filter(|t| t.plate_id % 3 == (state.turn_index % 3) as u32)
                    .map(|t| {
                        t.elevation += rng.gen_range(50.0..250.0);
                        t.id
                    })
                    .take(24)
                    .collect();
                map_changes.push(MapChange {
                    kind: "uplift".to_string(),
                    description: "plate collision raised a mountain belt".to_string(),
                    tile_ids: uplifted,
                });
            }
            "rift_opening" if rng.gen_bool(0.2) => {
                map_changes.push(MapChange {
                    kind: "volcanism".to_string(),
                    description: "rift volcanism along the plate margin".to_string(),
                    tile_ids: vec![],
                });
            }
            _ => {}
        }
        // Severe drought evaporates standing water.
        let drought = modifiers.get(Modifier::Drought);
        if drought > 5.0 {
            let dried: Vec<i64> = tiles
                .iter_mut()
                .filter(|t| t.is_lake)
                .map(|t| {
                    t.is_lake = false;
                    t.biome = deeptime_data::Biome::Plains;
                    t.humidity = (t.humidity - 0.3).max(0.05);
                    t.id
                })
                .collect();
            if !dried.is_empty() {
                map_changes.push(MapChange {
                    kind: "lakes_dried".to_string(),
                    description: "sustained drought drained the inland lakes".to_string(),
                    tile_ids: dried,
                });
            }
        }

        if state.global_avg_temperature < 8.0 {
            map_changes.push(MapChange {
                kind: "glaciation_advance".to_string(),
                description: "ice sheets creep toward the mid-latitudes".to_string(),
                tile_ids: vec![],
            });
        }

        let spike = modifiers.get(Modifier::MortalitySpike);
        if spike > 100.0 {
            major_events.push(MajorEvent {
                kind: "catastrophic_event".to_string(),
                description: "a planet-scale catastrophe marks this epoch".to_string(),
                severity: (spike / 200.0).min(1.0),
            });
        } else if temp_drift.abs() > 1.5 {
            major_events.push(MajorEvent {
                kind: "climate_swing".to_string(),
                description: "an abrupt climate swing stresses every biome".to_string(),
                severity: 0.5,
            });
        }

        TectonicOutcome {
            map_changes,
            major_events,
            shocks: EnvShocks {
                temperature_delta: temp_drift,
                sea_level_delta: sea_drift,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_io::seed::generate_map;

    #[test]
    fn test_step_is_deterministic() {
        let stepper = RuleTectonics;
        let modifiers = PressureModifiers::default();
        let run = || {
            let mut state = MapState {
                map_seed: 99,
                ..MapState::default()
            };
            let mut tiles = generate_map(99, 10, 6);
            let outcome = stepper.step(&mut state, &mut tiles, &modifiers);
            (state.sea_level, state.global_avg_temperature, outcome.shocks.temperature_delta)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_stage_advances_after_duration() {
        let stepper = RuleTectonics;
        let modifiers = PressureModifiers::default();
        let mut state = MapState {
            map_seed: 5,
            stage_duration: 2,
            stage_progress: 0.6,
            ..MapState::default()
        };
        let mut tiles = generate_map(5, 8, 4);
        stepper.step(&mut state, &mut tiles, &modifiers);
        assert_eq!(state.stage_name, "rift_opening");
        assert_eq!(state.stage_progress, 0.0);
    }
}
