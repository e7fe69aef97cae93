//! Read-mostly lookup structures built once per turn from the store
//! snapshots. Engines only ever see these, never live store handles.

use std::collections::BTreeMap;

use deeptime_data::{Axial, HabitatRecord, MapTile};

/// Tile list plus axial lookup and the hex-6 adjacency map.
pub struct TileIndex {
    pub tiles: Vec<MapTile>,
    id_to_idx: BTreeMap<i64, usize>,
    axial_to_id: BTreeMap<Axial, i64>,
    adjacency: BTreeMap<i64, Vec<i64>>,
}

impl TileIndex {
    pub fn new(tiles: Vec<MapTile>) -> Self {
        let mut id_to_idx = BTreeMap::new();
        let mut axial_to_id = BTreeMap::new();
        for (idx, tile) in tiles.iter().enumerate() {
            id_to_idx.insert(tile.id, idx);
            axial_to_id.insert(tile.axial(), tile.id);
        }
        let mut adjacency = BTreeMap::new();
        for tile in &tiles {
            let neighbors: Vec<i64> = tile
                .axial()
                .neighbors()
                .iter()
                .filter_map(|a| axial_to_id.get(a).copied())
                .collect();
            adjacency.insert(tile.id, neighbors);
        }
        Self {
            tiles,
            id_to_idx,
            axial_to_id,
            adjacency,
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, tile_id: i64) -> Option<&MapTile> {
        self.id_to_idx.get(&tile_id).map(|idx| &self.tiles[*idx])
    }

    pub fn idx_of(&self, tile_id: i64) -> Option<usize> {
        self.id_to_idx.get(&tile_id).copied()
    }

    pub fn neighbors(&self, tile_id: i64) -> &[i64] {
        self.adjacency
            .get(&tile_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn hex_distance(&self, a: i64, b: i64) -> Option<u32> {
        let ta = self.get(a)?;
        let tb = self.get(b)?;
        Some(ta.axial().distance(&tb.axial()))
    }

    pub fn id_at(&self, axial: &Axial) -> Option<i64> {
        self.axial_to_id.get(axial).copied()
    }
}

/// Latest-turn habitat view keyed by species id.
pub struct HabitatIndex {
    by_species: BTreeMap<i64, Vec<HabitatRecord>>,
}

impl HabitatIndex {
    pub fn new(records: Vec<HabitatRecord>) -> Self {
        let mut by_species: BTreeMap<i64, Vec<HabitatRecord>> = BTreeMap::new();
        for record in records {
            by_species.entry(record.species_id).or_default().push(record);
        }
        Self { by_species }
    }

    pub fn for_species(&self, species_id: i64) -> &[HabitatRecord] {
        self.by_species
            .get(&species_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn total_suitability(&self, species_id: i64) -> f64 {
        self.for_species(species_id)
            .iter()
            .map(|h| h.suitability)
            .sum()
    }

    /// Fraction of `a`'s tiles also occupied by `b`.
    pub fn tile_overlap(&self, a: i64, b: i64) -> f64 {
        let tiles_a = self.for_species(a);
        if tiles_a.is_empty() {
            return 0.0;
        }
        let tiles_b: std::collections::BTreeSet<i64> =
            self.for_species(b).iter().map(|h| h.tile_id).collect();
        let shared = tiles_a.iter().filter(|h| tiles_b.contains(&h.tile_id)).count();
        shared as f64 / tiles_a.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_data::Biome;

    fn tile(id: i64, q: i32, r: i32) -> MapTile {
        MapTile {
            id,
            q,
            r,
            x: q,
            y: r,
            biome: Biome::Plains,
            elevation: 100.0,
            temperature: 15.0,
            humidity: 0.5,
            salinity: 0.0,
            resources: 400.0,
            plate_id: 0,
            is_lake: false,
        }
    }

    #[test]
    fn test_adjacency_six_neighbors_interior() {
        let mut tiles = Vec::new();
        let mut id = 1;
        for q in -2..=2 {
            for r in -2..=2 {
                tiles.push(tile(id, q, r));
                id += 1;
            }
        }
        let index = TileIndex::new(tiles);
        let center = index.id_at(&Axial::new(0, 0)).unwrap();
        assert_eq!(index.neighbors(center).len(), 6);
    }

    #[test]
    fn test_tile_overlap() {
        let habitats = HabitatIndex::new(vec![
            HabitatRecord::new(1, 10, 100, 0.5, 0),
            HabitatRecord::new(2, 10, 100, 0.5, 0),
            HabitatRecord::new(2, 20, 100, 0.5, 0),
        ]);
        assert!((habitats.tile_overlap(10, 20) - 0.5).abs() < 1e-12);
        assert!((habitats.tile_overlap(20, 10) - 1.0).abs() < 1e-12);
    }
}
