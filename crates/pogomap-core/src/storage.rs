//! SQLite storage with generic keyed batch upsert.
//!
//! # Schema Design
//!
//! The database uses WAL mode so scan workers can read while a write
//! is in flight. All timestamps are epoch milliseconds (i64). Upserts
//! are full-row `INSERT OR REPLACE` statements (no partial-field
//! merge), chunked to respect statement-size limits.
//!
//! # Tables
//!
//! - `pokemon`: transient sightings, read-filtered by `disappear_time`
//! - `pokestop`: fixed bonus-item dispensers, optional lure fields
//! - `gym`: contested-control points
//! - `scanned_location`: one liveness row per distinct step location
//!
//! Concurrent callers share a [`Storage`] behind `Arc`; statements are
//! serialized through an internal connection lock and each chunk is
//! atomic at statement granularity. A failed chunk aborts the call;
//! chunks committed earlier in the same call stay committed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::config::RegionMode;
use crate::error::StorageError;
use crate::records::{ActiveSighting, PokemonRecord, ScannedLocationRecord, StoreRecord};
use crate::species::SpeciesDex;
use crate::transform::wgs_to_gcj;

type Result<T> = std::result::Result<T, StorageError>;

// =============================================================================
// Schema Definition
// =============================================================================

/// Current schema version, tracked via `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Schema initialization SQL. Idempotent via IF NOT EXISTS.
pub const SCHEMA_SQL: &str = r#"
-- WAL mode: concurrent readers alongside the single writer
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

-- Transient sightings: expire via disappear_time, never deleted
CREATE TABLE IF NOT EXISTS pokemon (
    encounter_id TEXT PRIMARY KEY,
    spawnpoint_id TEXT NOT NULL,
    pokemon_id INTEGER NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    disappear_time INTEGER NOT NULL   -- epoch ms
);

CREATE INDEX IF NOT EXISTS idx_pokemon_disappear ON pokemon(disappear_time);

-- Pokestops: full-row replace on re-observation
CREATE TABLE IF NOT EXISTS pokestop (
    pokestop_id TEXT PRIMARY KEY,
    enabled INTEGER NOT NULL,         -- bool
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    last_modified INTEGER NOT NULL,   -- epoch ms
    lure_expiration INTEGER,          -- epoch ms, NULL without an active lure
    active_pokemon_id INTEGER         -- NULL without an active lure
);

-- Gyms
CREATE TABLE IF NOT EXISTS gym (
    gym_id TEXT PRIMARY KEY,
    team_id INTEGER NOT NULL,         -- 0 = uncontested
    guard_pokemon_id INTEGER NOT NULL,
    gym_points INTEGER NOT NULL,
    enabled INTEGER NOT NULL,         -- bool
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    last_modified INTEGER NOT NULL    -- epoch ms
);

-- Scan coverage: one row per distinct step location
CREATE TABLE IF NOT EXISTS scanned_location (
    scanned_id TEXT PRIMARY KEY,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    last_modified INTEGER NOT NULL    -- epoch ms
);

CREATE INDEX IF NOT EXISTS idx_scanned_last_modified ON scanned_location(last_modified);
"#;

/// Coverage recency window for `get_recent`.
pub const RECENT_WINDOW_MS: i64 = 15 * 60 * 1000;

/// Get the current schema version from `PRAGMA user_version`.
pub fn get_user_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(format!("failed to read user_version: {e}")))
}

fn set_user_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))
        .map_err(|e| StorageError::Database(format!("failed to set user_version: {e}")))
}

/// Initialize (or verify) the schema on a connection.
///
/// Idempotent; refuses databases written by a newer schema.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let current = get_user_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(StorageError::Database(format!(
            "database schema version {current} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| StorageError::Database(format!("schema init failed: {e}")))?;

    if current < SCHEMA_VERSION {
        set_user_version(conn, SCHEMA_VERSION)?;
    }
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Database(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    Ok(())
}

// =============================================================================
// Storage Handle
// =============================================================================

/// Storage tuning knobs.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Maximum rows per upsert statement.
    pub upsert_chunk_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upsert_chunk_size: 120,
        }
    }
}

/// Handle over the SQLite database.
///
/// Share across scan workers with `Arc`; the connection lock
/// serializes statements.
pub struct Storage {
    conn: Mutex<Connection>,
    upsert_chunk_size: usize,
}

impl Storage {
    /// Open (or create) the database at `path` with default tuning.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_config(path, StorageConfig::default())
    }

    /// Open (or create) the database at `path`.
    pub fn open_with_config(path: &Path, config: StorageConfig) -> Result<Self> {
        ensure_parent_dir(path)?;
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Database(format!("failed to open database: {e}")))?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            upsert_chunk_size: config.upsert_chunk_size,
        })
    }

    /// In-memory database, primarily for tests.
    pub fn open_in_memory_with_config(config: StorageConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Database(format!("failed to open database: {e}")))?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            upsert_chunk_size: config.upsert_chunk_size,
        })
    }

    /// In-memory database with default tuning.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_config(StorageConfig::default())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("storage mutex poisoned".to_string()))
    }

    /// Insert-or-replace every record in `records`, chunked into
    /// statements of at most `upsert_chunk_size` rows each.
    ///
    /// Returns the number of statements issued. Chunks are submitted
    /// sequentially in the map's iteration order; a chunk failure
    /// aborts the call and propagates, leaving earlier chunks
    /// committed.
    pub fn bulk_upsert<R: StoreRecord>(&self, records: &BTreeMap<String, R>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.lock()?;
        let columns = R::COLUMNS.join(", ");
        let row_group = format!("({})", vec!["?"; R::COLUMNS.len()].join(", "));
        let rows: Vec<&R> = records.values().collect();
        let chunk_size = self.upsert_chunk_size.max(1);

        let mut batches = 0;
        for (index, chunk) in rows.chunks(chunk_size).enumerate() {
            let start = index * chunk_size;
            debug!(
                table = R::TABLE,
                "inserting rows {start} to {}",
                start + chunk.len()
            );

            let placeholders = vec![row_group.clone(); chunk.len()].join(", ");
            let sql = format!(
                "INSERT OR REPLACE INTO {} ({columns}) VALUES {placeholders}",
                R::TABLE
            );
            let params: Vec<SqlValue> = chunk.iter().flat_map(|r| r.values()).collect();
            conn.execute(&sql, params_from_iter(params)).map_err(|e| {
                StorageError::Database(format!("failed to upsert into {}: {e}", R::TABLE))
            })?;
            batches += 1;
        }
        Ok(batches)
    }

    /// Sightings still visible now, augmented with display names.
    ///
    /// Never returns a row whose `disappear_time` has passed. In
    /// alternate region mode every returned coordinate pair is
    /// transformed; stored rows are untouched.
    pub fn get_active(&self, dex: SpeciesDex, region: RegionMode) -> Result<Vec<ActiveSighting>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut records = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT encounter_id, spawnpoint_id, pokemon_id, latitude, longitude,
                            disappear_time
                     FROM pokemon WHERE disappear_time > ?1",
                )
                .map_err(|e| StorageError::Database(format!("failed to query pokemon: {e}")))?;
            stmt.query_map([now_ms], PokemonRecord::from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| StorageError::Database(format!("failed to read pokemon: {e}")))?
        };

        apply_region_transform(&mut records, region);

        Ok(records
            .into_iter()
            .map(|r| ActiveSighting {
                pokemon_name: dex.name(r.pokemon_id).to_string(),
                encounter_id: r.encounter_id,
                spawnpoint_id: r.spawnpoint_id,
                pokemon_id: r.pokemon_id,
                latitude: r.latitude,
                longitude: r.longitude,
                disappear_time: r.disappear_time,
            })
            .collect())
    }

    /// Coverage rows scanned within the last 15 minutes.
    pub fn get_recent(&self, region: RegionMode) -> Result<Vec<ScannedLocationRecord>> {
        let cutoff_ms = Utc::now().timestamp_millis() - RECENT_WINDOW_MS;
        let mut records = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT scanned_id, latitude, longitude, last_modified
                     FROM scanned_location WHERE last_modified >= ?1",
                )
                .map_err(|e| {
                    StorageError::Database(format!("failed to query scanned_location: {e}"))
                })?;
            stmt.query_map([cutoff_ms], ScannedLocationRecord::from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| {
                    StorageError::Database(format!("failed to read scanned_location: {e}"))
                })?
        };

        apply_region_transform(&mut records, region);
        Ok(records)
    }

    /// Every record of one entity kind.
    pub fn get_all<R: StoreRecord>(&self, region: RegionMode) -> Result<Vec<R>> {
        let mut records = {
            let conn = self.lock()?;
            let sql = format!("SELECT {} FROM {}", R::COLUMNS.join(", "), R::TABLE);
            let mut stmt = conn.prepare(&sql).map_err(|e| {
                StorageError::Database(format!("failed to query {}: {e}", R::TABLE))
            })?;
            stmt.query_map([], R::from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| StorageError::Database(format!("failed to read {}: {e}", R::TABLE)))?
        };

        apply_region_transform(&mut records, region);
        Ok(records)
    }
}

/// Apply the read-time coordinate transform uniformly to a result set.
fn apply_region_transform<R: StoreRecord>(records: &mut [R], region: RegionMode) {
    if region != RegionMode::Alternate {
        return;
    }
    for record in records {
        let (lat, lon) = record.coordinates();
        let (lat, lon) = wgs_to_gcj(lat, lon);
        record.set_coordinates(lat, lon);
    }
}
