use serde::{Deserialize, Serialize};

use super::hex::Axial;
use super::species::HabitatType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Biome {
    Ocean,
    DeepOcean,
    Coast,
    Lake,
    Plains,
    Forest,
    Desert,
    Mountain,
    Tundra,
    IceSheet,
    Volcanic,
    HydrothermalVent,
}

impl Biome {
    pub fn is_water(&self) -> bool {
        matches!(
            self,
            Biome::Ocean | Biome::DeepOcean | Biome::Coast | Biome::Lake | Biome::HydrothermalVent
        )
    }

    /// Binary habitat gating applied before suitability scoring.
    pub fn supports(&self, habitat: HabitatType) -> bool {
        match habitat {
            HabitatType::Marine => matches!(self, Biome::Ocean | Biome::Coast),
            HabitatType::DeepSea => matches!(self, Biome::DeepOcean | Biome::HydrothermalVent),
            HabitatType::Hydrothermal => matches!(self, Biome::HydrothermalVent | Biome::Volcanic),
            HabitatType::Freshwater => matches!(self, Biome::Lake),
            HabitatType::Coastal => matches!(self, Biome::Coast),
            HabitatType::Amphibious => {
                matches!(self, Biome::Coast | Biome::Lake | Biome::Plains | Biome::Forest)
            }
            HabitatType::Terrestrial => matches!(
                self,
                Biome::Plains | Biome::Forest | Biome::Desert | Biome::Mountain | Biome::Tundra
            ),
            HabitatType::Aerial => matches!(
                self,
                Biome::Plains | Biome::Forest | Biome::Mountain | Biome::Coast | Biome::Tundra
            ),
        }
    }
}

/// One hex cell of the world map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapTile {
    pub id: i64,
    pub q: i32,
    pub r: i32,
    /// Legacy rectangular coordinates kept for map exports.
    pub x: i32,
    pub y: i32,
    pub biome: Biome,
    pub elevation: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub salinity: f64,
    pub resources: f64,
    pub plate_id: u32,
    pub is_lake: bool,
}

impl MapTile {
    pub fn axial(&self) -> Axial {
        Axial::new(self.q, self.r)
    }
}

/// Singleton world state, mutated once per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapState {
    pub turn_index: u64,
    pub stage_name: String,
    pub stage_progress: f64,
    pub stage_duration: u64,
    pub sea_level: f64,
    pub global_avg_temperature: f64,
    pub map_seed: u64,
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            turn_index: 0,
            stage_name: "stable_craton".to_string(),
            stage_progress: 0.0,
            stage_duration: 20,
            sea_level: 0.0,
            global_avg_temperature: 14.0,
            map_seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_biome_gating() {
        assert!(Biome::Ocean.supports(HabitatType::Marine));
        assert!(!Biome::DeepOcean.supports(HabitatType::Terrestrial));
        assert!(Biome::Lake.supports(HabitatType::Freshwater));
        assert!(!Biome::Desert.supports(HabitatType::Marine));
    }
}
