//! Speciation candidate extraction from the tile-distribution output.
//!
//! A species is a candidate when its occupied tiles show geographic or
//! gradient isolation: multiple connected components under hex-6 adjacency,
//! a steep mortality gradient, a stretched-out range, or widely separated
//! clusters.

use petgraph::unionfind::UnionFind;
use serde::Serialize;
use std::collections::BTreeMap;

use deeptime_data::MortalityResult;

use crate::index::TileIndex;

#[derive(Debug, Clone)]
pub struct CandidateParams {
    pub min_tile_pop: f64,
    pub death_rate_min: f64,
    pub death_rate_max: f64,
    pub min_mortality_gradient: f64,
    pub distance_threshold: u32,
    pub elongation_threshold: f64,
    pub min_cluster_gap: u32,
}

impl Default for CandidateParams {
    fn default() -> Self {
        Self {
            min_tile_pop: 50.0,
            death_rate_min: 0.03,
            death_rate_max: 0.70,
            min_mortality_gradient: 0.25,
            distance_threshold: 6,
            elongation_threshold: 2.5,
            min_cluster_gap: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeciationCandidate {
    pub lineage_code: String,
    pub candidate_tiles: Vec<i64>,
    pub tile_populations: BTreeMap<i64, f64>,
    pub tile_mortality: BTreeMap<i64, f64>,
    pub mortality_gradient: f64,
    pub is_isolated: bool,
    pub clusters: usize,
    pub max_hex_distance: u32,
    pub elongation_ratio: f64,
    pub isolation_type: String,
}

pub fn speciation_candidates(
    results: &[MortalityResult],
    tiles: &TileIndex,
    params: &CandidateParams,
) -> Vec<SpeciationCandidate> {
    let mut out = Vec::new();
    for result in results {
        if result.death_rate < params.death_rate_min || result.death_rate > params.death_rate_max {
            continue;
        }
        let candidate_tiles: Vec<i64> = result
            .tile_population
            .iter()
            .filter(|(_, pop)| **pop >= params.min_tile_pop)
            .map(|(id, _)| *id)
            .collect();
        if candidate_tiles.len() < 2 {
            continue;
        }

        let rates: Vec<f64> = candidate_tiles
            .iter()
            .filter_map(|id| result.tile_mortality.get(id).copied())
            .collect();
        let max_rate = rates.iter().cloned().fold(f64::MIN, f64::max);
        let min_rate = rates.iter().cloned().fold(f64::MAX, f64::min);
        let gradient = (max_rate - min_rate).max(0.0);
        let relative_gradient = if max_rate > 0.0 { gradient / max_rate } else { 0.0 };

        let clusters = count_clusters(&candidate_tiles, tiles);
        let max_distance = max_pairwise_distance(&candidate_tiles, tiles);
        let elongation = if candidate_tiles.len() > 1 {
            max_distance as f64 / (candidate_tiles.len() as f64).sqrt()
        } else {
            0.0
        };
        let cluster_gap = min_inter_cluster_gap(&candidate_tiles, tiles);

        let mut isolation_type = String::new();
        if clusters.0 >= 2 {
            isolation_type = "fragmented_range".to_string();
        } else if gradient >= params.min_mortality_gradient {
            isolation_type = "mortality_gradient".to_string();
        } else if relative_gradient >= 0.25 {
            isolation_type = "relative_gradient".to_string();
        } else if max_distance >= params.distance_threshold {
            isolation_type = "geographic_span".to_string();
        } else if elongation >= params.elongation_threshold {
            isolation_type = "elongated_range".to_string();
        } else if cluster_gap.map(|g| g > params.min_cluster_gap).unwrap_or(false) {
            isolation_type = "cluster_gap".to_string();
        }
        let is_isolated = !isolation_type.is_empty();

        out.push(SpeciationCandidate {
            lineage_code: result.lineage_code.clone(),
            tile_populations: result.tile_population.clone(),
            tile_mortality: result.tile_mortality.clone(),
            candidate_tiles,
            mortality_gradient: gradient,
            is_isolated,
            clusters: clusters.0,
            max_hex_distance: max_distance,
            elongation_ratio: elongation,
            isolation_type,
        });
    }
    out
}

/// Connected components under hex-6 adjacency; returns (count, labels).
fn count_clusters(candidate_tiles: &[i64], tiles: &TileIndex) -> (usize, Vec<usize>) {
    let index: BTreeMap<i64, usize> = candidate_tiles
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();
    let mut uf = UnionFind::<usize>::new(candidate_tiles.len());
    for (i, tile_id) in candidate_tiles.iter().enumerate() {
        for neighbor in tiles.neighbors(*tile_id) {
            if let Some(&j) = index.get(neighbor) {
                uf.union(i, j);
            }
        }
    }
    let labels = uf.into_labeling();
    let mut roots: Vec<usize> = labels.clone();
    roots.sort_unstable();
    roots.dedup();
    (roots.len(), labels)
}

fn max_pairwise_distance(candidate_tiles: &[i64], tiles: &TileIndex) -> u32 {
    let mut max = 0;
    for (i, a) in candidate_tiles.iter().enumerate() {
        for b in candidate_tiles.iter().skip(i + 1) {
            if let Some(d) = tiles.hex_distance(*a, *b) {
                max = max.max(d);
            }
        }
    }
    max
}

/// Smallest hex distance between any two distinct clusters.
fn min_inter_cluster_gap(candidate_tiles: &[i64], tiles: &TileIndex) -> Option<u32> {
    let (count, labels) = count_clusters(candidate_tiles, tiles);
    if count < 2 {
        return None;
    }
    let mut min_gap: Option<u32> = None;
    for (i, a) in candidate_tiles.iter().enumerate() {
        for (j, b) in candidate_tiles.iter().enumerate().skip(i + 1) {
            if labels[i] == labels[j] {
                continue;
            }
            if let Some(d) = tiles.hex_distance(*a, *b) {
                min_gap = Some(min_gap.map_or(d, |g| g.min(d)));
            }
        }
    }
    min_gap
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_data::{Biome, MapTile, Tier, TileDistribution};

    fn line_tiles(n: i32) -> TileIndex {
        let tiles: Vec<MapTile> = (0..n)
            .map(|q| MapTile {
                id: q as i64 + 1,
                q,
                r: 0,
                x: q,
                y: 0,
                biome: Biome::Plains,
                elevation: 10.0,
                temperature: 15.0,
                humidity: 0.5,
                salinity: 0.0,
                resources: 400.0,
                plate_id: 0,
                is_lake: false,
            })
            .collect();
        TileIndex::new(tiles)
    }

    fn result_with(tile_data: &[(i64, f64, f64)]) -> MortalityResult {
        MortalityResult {
            lineage_code: "A1".into(),
            initial_population: 100_000,
            deaths: 20_000,
            survivors: 80_000,
            death_rate: 0.2,
            notes: vec![],
            niche_overlap: 0.0,
            resource_pressure: 0.0,
            tier: Tier::Focus,
            tile_stats: TileDistribution::default(),
            tile_mortality: tile_data.iter().map(|(id, _, m)| (*id, *m)).collect(),
            tile_population: tile_data.iter().map(|(id, p, _)| (*id, *p)).collect(),
            pressure_breakdown: BTreeMap::new(),
        }
    }

    #[test]
    fn test_fragmented_range_detected() {
        let tiles = line_tiles(12);
        // Two occupied blocks separated by a wide gap.
        let result = result_with(&[
            (1, 500.0, 0.1),
            (2, 500.0, 0.1),
            (11, 500.0, 0.1),
            (12, 500.0, 0.1),
        ]);
        let candidates =
            speciation_candidates(&[result], &tiles, &CandidateParams::default());
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert!(c.is_isolated);
        assert_eq!(c.clusters, 2);
        assert_eq!(c.isolation_type, "fragmented_range");
    }

    #[test]
    fn test_gradient_isolation() {
        let tiles = line_tiles(3);
        let result = result_with(&[(1, 500.0, 0.05), (2, 500.0, 0.35), (3, 500.0, 0.6)]);
        let candidates =
            speciation_candidates(&[result], &tiles, &CandidateParams::default());
        assert!(candidates[0].is_isolated);
        assert!(candidates[0].mortality_gradient >= 0.25);
    }

    #[test]
    fn test_compact_range_not_isolated() {
        let tiles = line_tiles(3);
        let result = result_with(&[(1, 500.0, 0.2), (2, 500.0, 0.2)]);
        let candidates =
            speciation_candidates(&[result], &tiles, &CandidateParams::default());
        assert_eq!(candidates.len(), 1);
        assert!(!candidates[0].is_isolated);
    }

    #[test]
    fn test_death_rate_window_filters() {
        let tiles = line_tiles(3);
        let mut result = result_with(&[(1, 500.0, 0.9), (2, 500.0, 0.9)]);
        result.death_rate = 0.9;
        let candidates =
            speciation_candidates(&[result], &tiles, &CandidateParams::default());
        assert!(candidates.is_empty());
    }
}
