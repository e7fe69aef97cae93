//! Save-file layer.
//!
//! A save is a directory `saves/<name>/` holding `meta.json` plus one
//! gzipped JSON blob per store table. Loading truncates the database and
//! bulk-inserts every blob; the connection mutex makes the swap atomic with
//! respect to concurrent readers.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use deeptime_data::{HabitatRecord, MapState, MapTile, Species, TurnReport};

use crate::error::{IoError, Result};
use crate::store::{Database, GenusRecord, LineageEventRow};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMeta {
    pub save_name: String,
    pub scenario: String,
    pub turn_index: u64,
    pub species_count: usize,
    pub map_seed: u64,
    pub created_at: String,
}

fn save_dir(saves_root: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty()
        || name
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
    {
        return Err(IoError::validation(format!("invalid save name: {name:?}")));
    }
    Ok(saves_root.join(name))
}

fn write_blob<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    let out = std::fs::File::create(dir.join(file))?;
    let mut encoder = GzEncoder::new(out, Compression::default());
    encoder.write_all(&json)?;
    encoder.finish()?;
    Ok(())
}

fn read_blob<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T> {
    let input = std::fs::File::open(dir.join(file))
        .map_err(|e| IoError::corrupt(format!("missing {file}: {e}")))?;
    let mut decoder = GzDecoder::new(input);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Exports every table into `saves_root/<name>/`.
pub fn create_save(
    db: &Database,
    saves_root: &Path,
    name: &str,
    scenario: &str,
) -> Result<SaveMeta> {
    let dir = save_dir(saves_root, name)?;
    std::fs::create_dir_all(&dir)?;

    let species = db.species().list_all()?;
    let tiles = db.environment().list_tiles()?;
    let habitats = db.environment().all_habitats()?;
    let map_state = db.environment().map_state()?;
    let reports = db.history().recent_reports(usize::MAX / 2)?;
    let events = db.history().all_events()?;
    let genera = db.history().list_genera()?;

    let meta = SaveMeta {
        save_name: name.to_string(),
        scenario: scenario.to_string(),
        turn_index: map_state.turn_index,
        species_count: species.len(),
        map_seed: map_state.map_seed,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    std::fs::write(dir.join("meta.json"), serde_json::to_vec_pretty(&meta)?)?;
    write_blob(&dir, "species.json.gz", &species)?;
    write_blob(&dir, "map_tiles.json.gz", &tiles)?;
    write_blob(&dir, "habitats.json.gz", &habitats)?;
    write_blob(&dir, "map_state.json.gz", &map_state)?;
    write_blob(&dir, "turn_logs.json.gz", &reports)?;
    write_blob(&dir, "lineage_events.json.gz", &events)?;
    write_blob(&dir, "genera.json.gz", &genera)?;

    tracing::info!(save = name, species = species.len(), "save exported");
    Ok(meta)
}

/// Truncates the database and bulk-inserts the blobs of `name`.
pub fn load_save(db: &Database, saves_root: &Path, name: &str) -> Result<SaveMeta> {
    let dir = save_dir(saves_root, name)?;
    let meta_bytes = std::fs::read(dir.join("meta.json"))
        .map_err(|e| IoError::not_found(format!("save {name}: {e}")))?;
    let meta: SaveMeta = serde_json::from_slice(&meta_bytes)?;

    let mut species: Vec<Species> = read_blob(&dir, "species.json.gz")?;
    let tiles: Vec<MapTile> = read_blob(&dir, "map_tiles.json.gz")?;
    let habitats: Vec<HabitatRecord> = read_blob(&dir, "habitats.json.gz")?;
    let map_state: MapState = read_blob(&dir, "map_state.json.gz")?;
    let reports: Vec<TurnReport> = read_blob(&dir, "turn_logs.json.gz")?;
    let events: Vec<LineageEventRow> = read_blob(&dir, "lineage_events.json.gz")?;
    let genera: Vec<GenusRecord> = read_blob(&dir, "genera.json.gz")?;

    db.truncate_all()?;
    db.species().upsert_many(&mut species)?;
    db.environment().replace_tiles(&tiles)?;
    db.environment().write_habitats_bulk(&habitats)?;
    db.environment().set_map_state(&map_state)?;
    for report in &reports {
        db.history().insert_report(report)?;
    }
    db.history().insert_events(&events)?;
    for genus in &genera {
        db.history().upsert_genus(genus)?;
    }

    tracing::info!(save = name, turn = meta.turn_index, "save loaded");
    Ok(meta)
}

pub fn list_saves(saves_root: &Path) -> Vec<SaveMeta> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(saves_root) else {
        return out;
    };
    for entry in entries.flatten() {
        let meta_path = entry.path().join("meta.json");
        if let Ok(bytes) = std::fs::read(&meta_path) {
            if let Ok(meta) = serde_json::from_slice::<SaveMeta>(&bytes) {
                out.push(meta);
            }
        }
    }
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    out
}

/// Rolling autosave: keeps at most `slots` saves named `autosave-<k>`.
pub fn rotate_autosave(db: &Database, saves_root: &Path, turn_index: u64, slots: u64) -> Result<SaveMeta> {
    let slot = turn_index % slots.max(1);
    create_save(db, saves_root, &format!("autosave-{slot}"), "autosave")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_save_name_rejected() {
        let root = std::env::temp_dir();
        assert!(save_dir(&root, "../evil").is_err());
        assert!(save_dir(&root, "").is_err());
        assert!(save_dir(&root, "slot-1").is_ok());
    }

    #[test]
    fn test_save_roundtrip_empty_world() {
        let db = Database::open_in_memory().unwrap();
        let root = std::env::temp_dir().join(format!("deeptime-test-{}", std::process::id()));
        let meta = create_save(&db, &root, "roundtrip", "test").unwrap();
        assert_eq!(meta.species_count, 0);
        let loaded = load_save(&db, &root, "roundtrip").unwrap();
        assert_eq!(loaded.save_name, "roundtrip");
        let _ = std::fs::remove_dir_all(&root);
    }
}
