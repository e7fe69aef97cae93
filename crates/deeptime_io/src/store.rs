//! Persistent stores over SQLite.
//!
//! Three views over one connection: `SpeciesStore` (the species arena),
//! `EnvironmentStore` (tiles, habitat records, map state) and `HistoryStore`
//! (turn logs, lineage events, genera). Reads return owned snapshots; writes
//! take the connection mutex for the duration of the batch, which also gives
//! save/load its cross-table exclusivity.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use deeptime_data::{Biome, HabitatRecord, MapState, MapTile, Species, SpeciesStatus, TurnReport};

use crate::error::Result;

/// Habitat bulk inserts are committed in chunks of this many rows.
pub const HABITAT_CHUNK_ROWS: usize = 5000;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;");
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn species(&self) -> SpeciesStore {
        SpeciesStore { db: self.clone() }
    }

    pub fn environment(&self) -> EnvironmentStore {
        EnvironmentStore { db: self.clone() }
    }

    pub fn history(&self) -> HistoryStore {
        HistoryStore { db: self.clone() }
    }

    /// Wipes every table. Used by the destructive admin endpoint and by
    /// save loading before bulk insert.
    pub fn truncate_all(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "DELETE FROM species;
             DELETE FROM habitat_populations;
             DELETE FROM map_tiles;
             DELETE FROM map_state;
             DELETE FROM turn_logs;
             DELETE FROM lineage_events;
             DELETE FROM genera;",
        )?;
        Ok(())
    }
}

fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS species (
            id INTEGER PRIMARY KEY,
            lineage_code TEXT NOT NULL UNIQUE,
            parent_code TEXT,
            status TEXT NOT NULL,
            created_turn INTEGER NOT NULL,
            trophic_level REAL NOT NULL,
            population INTEGER NOT NULL,
            latin_name TEXT NOT NULL,
            common_name TEXT NOT NULL,
            record TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_species_status ON species(status);
        CREATE INDEX IF NOT EXISTS idx_species_parent ON species(parent_code);

        CREATE TABLE IF NOT EXISTS map_tiles (
            id INTEGER PRIMARY KEY,
            x INTEGER NOT NULL,
            y INTEGER NOT NULL,
            q INTEGER NOT NULL,
            r INTEGER NOT NULL,
            biome TEXT NOT NULL,
            elevation REAL NOT NULL,
            temperature REAL NOT NULL,
            humidity REAL NOT NULL,
            salinity REAL NOT NULL,
            resources REAL NOT NULL,
            plate_id INTEGER NOT NULL,
            is_lake INTEGER NOT NULL,
            UNIQUE(q, r)
        );
        CREATE INDEX IF NOT EXISTS idx_tiles_xy ON map_tiles(x, y);
        CREATE INDEX IF NOT EXISTS idx_tiles_biome ON map_tiles(biome);
        CREATE INDEX IF NOT EXISTS idx_tiles_plate ON map_tiles(plate_id);

        CREATE TABLE IF NOT EXISTS habitat_populations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tile_id INTEGER NOT NULL,
            species_id INTEGER NOT NULL,
            population INTEGER NOT NULL,
            suitability REAL NOT NULL,
            turn_index INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_hab_turn ON habitat_populations(turn_index);
        CREATE INDEX IF NOT EXISTS idx_hab_species ON habitat_populations(species_id);
        CREATE INDEX IF NOT EXISTS idx_hab_tile ON habitat_populations(tile_id);
        CREATE INDEX IF NOT EXISTS idx_hab_species_turn ON habitat_populations(species_id, turn_index);
        CREATE INDEX IF NOT EXISTS idx_hab_tile_turn ON habitat_populations(tile_id, turn_index);

        CREATE TABLE IF NOT EXISTS map_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            record TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS turn_logs (
            turn_index INTEGER PRIMARY KEY,
            pressures_summary TEXT NOT NULL,
            narrative TEXT NOT NULL,
            record_data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lineage_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lineage_code TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_lineage ON lineage_events(lineage_code);

        CREATE TABLE IF NOT EXISTS genera (
            code TEXT PRIMARY KEY,
            name_latin TEXT NOT NULL,
            name_common TEXT NOT NULL,
            genetic_distances TEXT NOT NULL,
            gene_library TEXT NOT NULL,
            created_turn INTEGER NOT NULL,
            updated_turn INTEGER NOT NULL
        );",
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Species
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SpeciesStore {
    db: Database,
}

impl SpeciesStore {
    /// Inserts or updates by lineage code. Assigns `id` from the rowid on
    /// first insert and writes it back into the stored record.
    pub fn upsert(&self, species: &mut Species) -> Result<i64> {
        let conn = self.db.lock();
        upsert_species(&conn, species)
    }

    pub fn upsert_many(&self, batch: &mut [Species]) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        for species in batch.iter_mut() {
            upsert_species(&tx, species)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get(&self, lineage_code: &str) -> Result<Option<Species>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare("SELECT record FROM species WHERE lineage_code = ?1")?;
        let mut rows = stmt.query(params![lineage_code])?;
        match rows.next()? {
            Some(row) => {
                let record: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&record)?))
            }
            None => Ok(None),
        }
    }

    pub fn list_alive(&self) -> Result<Vec<Species>> {
        self.list_by_status(Some(SpeciesStatus::Alive))
    }

    pub fn list_all(&self) -> Result<Vec<Species>> {
        self.list_by_status(None)
    }

    fn list_by_status(&self, status: Option<SpeciesStatus>) -> Result<Vec<Species>> {
        let conn = self.db.lock();
        let (sql, param): (&str, Option<String>) = match status {
            Some(s) => (
                "SELECT record FROM species WHERE status = ?1 ORDER BY id",
                Some(status_str(s).to_string()),
            ),
            None => ("SELECT record FROM species ORDER BY id", None),
        };
        let mut stmt = conn.prepare(sql)?;
        let mut out = Vec::new();
        let mut push_row = |record: String| -> Result<()> {
            out.push(serde_json::from_str(&record)?);
            Ok(())
        };
        match param {
            Some(p) => {
                let mut rows = stmt.query(params![p])?;
                while let Some(row) = rows.next()? {
                    push_row(row.get(0)?)?;
                }
            }
            None => {
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    push_row(row.get(0)?)?;
                }
            }
        }
        Ok(out)
    }

    pub fn count_alive(&self) -> Result<usize> {
        let conn = self.db.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM species WHERE status = 'alive'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Hard delete, used only by the admin removal endpoint.
    pub fn remove(&self, lineage_code: &str) -> Result<bool> {
        let conn = self.db.lock();
        let n = conn.execute("DELETE FROM species WHERE lineage_code = ?1", params![lineage_code])?;
        Ok(n > 0)
    }
}

fn upsert_species(conn: &Connection, species: &mut Species) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM species WHERE lineage_code = ?1",
            params![species.lineage_code],
            |row| row.get(0),
        )
        .ok();
    if let Some(id) = existing {
        species.id = id;
        let record = serde_json::to_string(species)?;
        conn.execute(
            "UPDATE species SET parent_code = ?1, status = ?2, created_turn = ?3,
                    trophic_level = ?4, population = ?5, latin_name = ?6,
                    common_name = ?7, record = ?8
             WHERE id = ?9",
            params![
                species.parent_code,
                status_str(species.status),
                species.created_turn as i64,
                species.trophic_level,
                species.population as i64,
                species.latin_name,
                species.common_name,
                record,
                id
            ],
        )?;
        Ok(id)
    } else {
        conn.execute(
            "INSERT INTO species (lineage_code, parent_code, status, created_turn,
                    trophic_level, population, latin_name, common_name, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                species.lineage_code,
                species.parent_code,
                status_str(species.status),
                species.created_turn as i64,
                species.trophic_level,
                species.population as i64,
                species.latin_name,
                species.common_name,
                "{}"
            ],
        )?;
        let id = conn.last_insert_rowid();
        species.id = id;
        let record = serde_json::to_string(species)?;
        conn.execute("UPDATE species SET record = ?1 WHERE id = ?2", params![record, id])?;
        Ok(id)
    }
}

fn status_str(status: SpeciesStatus) -> &'static str {
    match status {
        SpeciesStatus::Alive => "alive",
        SpeciesStatus::Extinct => "extinct",
        SpeciesStatus::Split => "split",
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct EnvironmentStore {
    db: Database,
}

impl EnvironmentStore {
    pub fn replace_tiles(&self, tiles: &[MapTile]) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM map_tiles", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO map_tiles (id, x, y, q, r, biome, elevation, temperature,
                        humidity, salinity, resources, plate_id, is_lake)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for t in tiles {
                stmt.execute(params![
                    t.id,
                    t.x,
                    t.y,
                    t.q,
                    t.r,
                    biome_str(t.biome),
                    t.elevation,
                    t.temperature,
                    t.humidity,
                    t.salinity,
                    t.resources,
                    t.plate_id,
                    t.is_lake as i64
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn update_tiles(&self, tiles: &[MapTile]) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE map_tiles SET biome = ?2, elevation = ?3, temperature = ?4,
                        humidity = ?5, salinity = ?6, resources = ?7, is_lake = ?8
                 WHERE id = ?1",
            )?;
            for t in tiles {
                stmt.execute(params![
                    t.id,
                    biome_str(t.biome),
                    t.elevation,
                    t.temperature,
                    t.humidity,
                    t.salinity,
                    t.resources,
                    t.is_lake as i64
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_tiles(&self) -> Result<Vec<MapTile>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, x, y, q, r, biome, elevation, temperature, humidity,
                    salinity, resources, plate_id, is_lake
             FROM map_tiles ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let biome: String = row.get(5)?;
            Ok(MapTile {
                id: row.get(0)?,
                x: row.get(1)?,
                y: row.get(2)?,
                q: row.get(3)?,
                r: row.get(4)?,
                biome: parse_biome(&biome),
                elevation: row.get(6)?,
                temperature: row.get(7)?,
                humidity: row.get(8)?,
                salinity: row.get(9)?,
                resources: row.get(10)?,
                plate_id: row.get::<_, i64>(11)? as u32,
                is_lake: row.get::<_, i64>(12)? != 0,
            })
        })?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    pub fn tile_count(&self) -> Result<usize> {
        let conn = self.db.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM map_tiles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn map_state(&self) -> Result<MapState> {
        let conn = self.db.lock();
        let record: Option<String> = conn
            .query_row("SELECT record FROM map_state WHERE id = 1", [], |row| row.get(0))
            .ok();
        match record {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(MapState::default()),
        }
    }

    pub fn set_map_state(&self, state: &MapState) -> Result<()> {
        let conn = self.db.lock();
        let record = serde_json::to_string(state)?;
        conn.execute(
            "INSERT INTO map_state (id, record) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET record = excluded.record",
            params![record],
        )?;
        Ok(())
    }

    /// Append-only bulk insert, committed in chunks of `HABITAT_CHUNK_ROWS`.
    pub fn write_habitats_bulk(&self, records: &[HabitatRecord]) -> Result<()> {
        let mut conn = self.db.lock();
        for chunk in records.chunks(HABITAT_CHUNK_ROWS) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO habitat_populations (tile_id, species_id, population,
                            suitability, turn_index)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for h in chunk {
                    stmt.execute(params![
                        h.tile_id,
                        h.species_id,
                        h.population as i64,
                        h.suitability,
                        h.turn_index as i64
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// The canonical distribution: each species' records at its own latest
    /// turn, not the global max turn.
    pub fn latest_habitats(&self) -> Result<Vec<HabitatRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT h.tile_id, h.species_id, h.population, h.suitability, h.turn_index
             FROM habitat_populations h
             JOIN (SELECT species_id, MAX(turn_index) AS latest
                   FROM habitat_populations GROUP BY species_id) m
               ON h.species_id = m.species_id AND h.turn_index = m.latest",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HabitatRecord {
                tile_id: row.get(0)?,
                species_id: row.get(1)?,
                population: row.get::<_, i64>(2)?.max(0) as u64,
                suitability: row.get(3)?,
                turn_index: row.get::<_, i64>(4)? as u64,
            })
        })?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    pub fn latest_habitats_for(&self, species_id: i64) -> Result<Vec<HabitatRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT tile_id, species_id, population, suitability, turn_index
             FROM habitat_populations
             WHERE species_id = ?1
               AND turn_index = (SELECT MAX(turn_index) FROM habitat_populations
                                 WHERE species_id = ?1)",
        )?;
        let rows = stmt.query_map(params![species_id], |row| {
            Ok(HabitatRecord {
                tile_id: row.get(0)?,
                species_id: row.get(1)?,
                population: row.get::<_, i64>(2)?.max(0) as u64,
                suitability: row.get(3)?,
                turn_index: row.get::<_, i64>(4)? as u64,
            })
        })?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Drops habitat history older than the retention window.
    pub fn prune_habitats_before(&self, turn_index: u64) -> Result<usize> {
        let conn = self.db.lock();
        let n = conn.execute(
            "DELETE FROM habitat_populations WHERE turn_index < ?1",
            params![turn_index as i64],
        )?;
        Ok(n)
    }

    pub fn all_habitats(&self) -> Result<Vec<HabitatRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT tile_id, species_id, population, suitability, turn_index
             FROM habitat_populations ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HabitatRecord {
                tile_id: row.get(0)?,
                species_id: row.get(1)?,
                population: row.get::<_, i64>(2)?.max(0) as u64,
                suitability: row.get(3)?,
                turn_index: row.get::<_, i64>(4)? as u64,
            })
        })?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }
}

fn biome_str(biome: Biome) -> String {
    serde_json::to_value(biome)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "plains".to_string())
}

fn parse_biome(s: &str) -> Biome {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(Biome::Plains)
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnLog {
    pub turn_index: u64,
    pub pressures_summary: String,
    pub narrative: String,
    pub report: TurnReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEventRow {
    pub lineage_code: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenusRecord {
    pub code: String,
    pub name_latin: String,
    pub name_common: String,
    /// Pairwise genetic distances between member lineages.
    pub genetic_distances: BTreeMap<String, f64>,
    pub gene_library: serde_json::Value,
    pub created_turn: u64,
    pub updated_turn: u64,
}

#[derive(Clone)]
pub struct HistoryStore {
    db: Database,
}

impl HistoryStore {
    pub fn insert_report(&self, report: &TurnReport) -> Result<()> {
        let conn = self.db.lock();
        let record = serde_json::to_string(report)?;
        conn.execute(
            "INSERT INTO turn_logs (turn_index, pressures_summary, narrative, record_data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(turn_index) DO UPDATE SET
                pressures_summary = excluded.pressures_summary,
                narrative = excluded.narrative,
                record_data = excluded.record_data",
            params![
                report.turn_index as i64,
                report.pressures_summary,
                report.narrative,
                record
            ],
        )?;
        Ok(())
    }

    pub fn recent_reports(&self, limit: usize) -> Result<Vec<TurnReport>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT record_data FROM turn_logs ORDER BY turn_index DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for record in rows.filter_map(std::result::Result::ok) {
            out.push(serde_json::from_str(&record)?);
        }
        out.reverse();
        Ok(out)
    }

    pub fn get_report(&self, turn_index: u64) -> Result<Option<TurnReport>> {
        let conn = self.db.lock();
        let record: Option<String> = conn
            .query_row(
                "SELECT record_data FROM turn_logs WHERE turn_index = ?1",
                params![turn_index as i64],
                |row| row.get(0),
            )
            .ok();
        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn record_event(
        &self,
        lineage_code: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO lineage_events (lineage_code, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                lineage_code,
                event_type,
                payload.to_string(),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn events_for(&self, lineage_code: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT event_type, payload FROM lineage_events
             WHERE lineage_code = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![lineage_code], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for (event_type, payload) in rows.filter_map(std::result::Result::ok) {
            let value = serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
            out.push((event_type, value));
        }
        Ok(out)
    }

    pub fn all_events(&self) -> Result<Vec<LineageEventRow>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT lineage_code, event_type, payload, created_at
             FROM lineage_events ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for (lineage_code, event_type, payload, created_at) in
            rows.filter_map(std::result::Result::ok)
        {
            out.push(LineageEventRow {
                lineage_code,
                event_type,
                payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                created_at,
            });
        }
        Ok(out)
    }

    pub fn insert_events(&self, rows: &[LineageEventRow]) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO lineage_events (lineage_code, event_type, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.lineage_code,
                    row.event_type,
                    row.payload.to_string(),
                    row.created_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_genus(&self, genus: &GenusRecord) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO genera (code, name_latin, name_common, genetic_distances,
                    gene_library, created_turn, updated_turn)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(code) DO UPDATE SET
                genetic_distances = excluded.genetic_distances,
                gene_library = excluded.gene_library,
                updated_turn = excluded.updated_turn",
            params![
                genus.code,
                genus.name_latin,
                genus.name_common,
                serde_json::to_string(&genus.genetic_distances)?,
                genus.gene_library.to_string(),
                genus.created_turn as i64,
                genus.updated_turn as i64
            ],
        )?;
        Ok(())
    }

    pub fn get_genus(&self, code: &str) -> Result<Option<GenusRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT code, name_latin, name_common, genetic_distances, gene_library,
                    created_turn, updated_turn
             FROM genera WHERE code = ?1",
        )?;
        let mut rows = stmt.query(params![code])?;
        match rows.next()? {
            Some(row) => {
                let distances: String = row.get(3)?;
                let library: String = row.get(4)?;
                Ok(Some(GenusRecord {
                    code: row.get(0)?,
                    name_latin: row.get(1)?,
                    name_common: row.get(2)?,
                    genetic_distances: serde_json::from_str(&distances)?,
                    gene_library: serde_json::from_str(&library)
                        .unwrap_or(serde_json::Value::Null),
                    created_turn: row.get::<_, i64>(5)? as u64,
                    updated_turn: row.get::<_, i64>(6)? as u64,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn list_genera(&self) -> Result<Vec<GenusRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare("SELECT code FROM genera ORDER BY code")?;
        let codes: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(std::result::Result::ok)
            .collect();
        drop(stmt);
        drop(conn);
        let mut out = Vec::new();
        for code in codes {
            if let Some(genus) = self.get_genus(&code)? {
                out.push(genus);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_data::{DietType, DormantGenes, HabitatType};
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_species(code: &str, population: u64) -> Species {
        Species {
            id: 0,
            lineage_code: code.to_string(),
            latin_name: format!("Primogenitus {code}"),
            common_name: format!("seed {code}"),
            description: "photosynthetic mat organism".into(),
            genus_code: code.chars().next().unwrap_or('A').to_string(),
            taxonomic_rank: "species".into(),
            parent_code: None,
            hybrid_parent_codes: vec![],
            hybrid_fertility: 1.0,
            status: SpeciesStatus::Alive,
            created_turn: 0,
            extinction_turn: None,
            extinction_cause: None,
            population,
            morphology: BTreeMap::new(),
            abstract_traits: BTreeMap::new(),
            hidden_traits: BTreeMap::new(),
            habitat_type: HabitatType::Marine,
            trophic_level: 1.0,
            diet_type: DietType::Autotroph,
            prey_species: BTreeSet::new(),
            prey_preferences: BTreeMap::new(),
            symbiotic_dependencies: vec![],
            dependency_strength: 0.0,
            symbiosis_type: "none".into(),
            organs: BTreeMap::new(),
            capabilities: BTreeSet::new(),
            dormant_genes: DormantGenes::default(),
            stress_exposure: BTreeMap::new(),
            gene_diversity_radius: 0.35,
            explored_directions: vec![],
            gene_stability: 0.5,
            ecological_vector: None,
            history_highlights: vec![],
            accumulated_adaptation_score: 0.0,
            last_description_update_turn: 0,
            plasticity_buffer: 1.0,
            speciation_pressure: 0.0,
            is_protected: false,
            protection_turns: 0,
            is_suppressed: false,
            suppression_turns: 0,
        }
    }

    #[test]
    fn test_species_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let store = db.species();
        let mut s = sample_species("A1", 5_000_000);
        let id = store.upsert(&mut s).unwrap();
        assert!(id > 0);
        assert_eq!(s.id, id);

        let loaded = store.get("A1").unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.population, 5_000_000);

        s.population = 42;
        store.upsert(&mut s).unwrap();
        let loaded = store.get("A1").unwrap().unwrap();
        assert_eq!(loaded.population, 42);
        assert_eq!(store.list_alive().unwrap().len(), 1);
    }

    #[test]
    fn test_latest_habitats_is_per_species() {
        let db = Database::open_in_memory().unwrap();
        let env = db.environment();
        env.write_habitats_bulk(&[
            HabitatRecord::new(1, 10, 100, 0.5, 1),
            HabitatRecord::new(1, 10, 120, 0.5, 2),
            // Species 20 last wrote at turn 1.
            HabitatRecord::new(2, 20, 300, 0.8, 1),
        ])
        .unwrap();
        let latest = env.latest_habitats().unwrap();
        assert_eq!(latest.len(), 2);
        let s10 = latest.iter().find(|h| h.species_id == 10).unwrap();
        assert_eq!(s10.turn_index, 2);
        let s20 = latest.iter().find(|h| h.species_id == 20).unwrap();
        assert_eq!(s20.turn_index, 1);
    }

    #[test]
    fn test_prune_habitats() {
        let db = Database::open_in_memory().unwrap();
        let env = db.environment();
        env.write_habitats_bulk(&[
            HabitatRecord::new(1, 10, 100, 0.5, 1),
            HabitatRecord::new(1, 10, 120, 0.5, 5),
        ])
        .unwrap();
        let pruned = env.prune_habitats_before(3).unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(env.all_habitats().unwrap().len(), 1);
    }

    #[test]
    fn test_turn_log_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let history = db.history();
        let report = TurnReport::empty(3);
        history.insert_report(&report).unwrap();
        let loaded = history.get_report(3).unwrap().unwrap();
        assert_eq!(loaded.turn_index, 3);
        assert_eq!(history.recent_reports(10).unwrap().len(), 1);
    }
}
