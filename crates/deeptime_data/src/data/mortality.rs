use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Evaluation tier chosen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Critical,
    Focus,
    Background,
}

/// Niche analysis output per species: how crowded its niche is and how far
/// demand outruns carrying capacity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NicheMetrics {
    pub overlap: f64,
    pub saturation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Thriving,
    Stable,
    Declining,
    Critical,
}

/// Tile-distribution aggregates carried on every mortality result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileDistribution {
    pub total_tiles: usize,
    /// Tiles with death rate below 0.25.
    pub healthy_tiles: usize,
    /// Tiles with death rate in [0.25, 0.5).
    pub warning_tiles: usize,
    /// Tiles with death rate at or above 0.5.
    pub critical_tiles: usize,
    pub best_tile_rate: f64,
    pub worst_tile_rate: f64,
    /// Any tile under 0.20 counts as a refuge.
    pub has_refuge: bool,
    pub distribution_status: DistributionStatus,
}

impl Default for TileDistribution {
    fn default() -> Self {
        Self {
            total_tiles: 0,
            healthy_tiles: 0,
            warning_tiles: 0,
            critical_tiles: 0,
            best_tile_rate: 0.0,
            worst_tile_rate: 0.0,
            has_refuge: false,
            distribution_status: DistributionStatus::Stable,
        }
    }
}

impl TileDistribution {
    pub fn from_rates(rates: &BTreeMap<i64, f64>) -> Self {
        if rates.is_empty() {
            return Self::default();
        }
        let mut healthy = 0;
        let mut warning = 0;
        let mut critical = 0;
        let mut best = f64::MAX;
        let mut worst = f64::MIN;
        for rate in rates.values() {
            if *rate < 0.25 {
                healthy += 1;
            } else if *rate < 0.5 {
                warning += 1;
            } else {
                critical += 1;
            }
            best = best.min(*rate);
            worst = worst.max(*rate);
        }
        let total = rates.len();
        let status = if critical * 2 > total {
            DistributionStatus::Critical
        } else if warning + critical > healthy {
            DistributionStatus::Declining
        } else if healthy == total && best < 0.1 {
            DistributionStatus::Thriving
        } else {
            DistributionStatus::Stable
        };
        Self {
            total_tiles: total,
            healthy_tiles: healthy,
            warning_tiles: warning,
            critical_tiles: critical,
            best_tile_rate: best,
            worst_tile_rate: worst,
            has_refuge: best < 0.20,
            distribution_status: status,
        }
    }
}

/// Per-species outcome of the tile mortality engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MortalityResult {
    pub lineage_code: String,
    pub initial_population: u64,
    pub deaths: u64,
    pub survivors: u64,
    pub death_rate: f64,
    pub notes: Vec<String>,
    pub niche_overlap: f64,
    pub resource_pressure: f64,
    pub tier: Tier,
    pub tile_stats: TileDistribution,
    /// Per-tile death rate, cached for speciation and gene activation.
    pub tile_mortality: BTreeMap<i64, f64>,
    /// Per-tile population used for the evaluation.
    pub tile_population: BTreeMap<i64, f64>,
    /// Mean contribution of each pressure component, keyed by component name.
    pub pressure_breakdown: BTreeMap<String, f64>,
}

impl MortalityResult {
    /// Name of the strongest pressure component, used to infer the stress
    /// type for gene activation and the extinction cause.
    pub fn dominant_pressure(&self) -> Option<&str> {
        self.pressure_breakdown
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(k, _)| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_distribution_classification() {
        let rates: BTreeMap<i64, f64> =
            [(1, 0.1), (2, 0.3), (3, 0.6), (4, 0.05)].into_iter().collect();
        let d = TileDistribution::from_rates(&rates);
        assert_eq!(d.healthy_tiles, 2);
        assert_eq!(d.warning_tiles, 1);
        assert_eq!(d.critical_tiles, 1);
        assert!(d.has_refuge);
        assert!((d.best_tile_rate - 0.05).abs() < 1e-12);
        assert!((d.worst_tile_rate - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_empty_distribution_defaults() {
        let d = TileDistribution::from_rates(&BTreeMap::new());
        assert_eq!(d.total_tiles, 0);
        assert!(!d.has_refuge);
    }
}
