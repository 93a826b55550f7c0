//! Typed store records and the generic persistence contract.
//!
//! Each entity kind is a plain record struct plus a [`StoreRecord`]
//! implementation describing its table, column order, and row
//! conversions. The storage layer is generic over this trait; nothing
//! in it is bound to a particular entity.
//!
//! All timestamp fields are absolute UTC epoch milliseconds.

use rusqlite::types::Value as SqlValue;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Contract between a record type and the generic storage layer.
///
/// `COLUMNS` and [`StoreRecord::values`] must agree on order; the
/// first column is the primary key. [`StoreRecord::from_row`] reads a
/// row selected in `COLUMNS` order.
pub trait StoreRecord: Sized {
    /// Table backing this entity kind.
    const TABLE: &'static str;
    /// Column names, primary key first.
    const COLUMNS: &'static [&'static str];

    /// Primary key value of this record.
    fn key(&self) -> &str;

    /// Column values in `COLUMNS` order.
    fn values(&self) -> Vec<SqlValue>;

    /// Rebuild a record from a row selected in `COLUMNS` order.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Stored coordinates, for read-time transformation.
    fn coordinates(&self) -> (f64, f64);

    /// Replace the coordinates on a read-side copy. Never used to
    /// rewrite stored rows.
    fn set_coordinates(&mut self, latitude: f64, longitude: f64);
}

// =============================================================================
// Transient sightings
// =============================================================================

/// A time-limited wild sighting. Expires naturally via
/// `disappear_time`; rows are never explicitly deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PokemonRecord {
    /// Text-safe form of the upstream encounter id (base64 of its
    /// decimal representation; the raw u64 overflows an INTEGER column).
    pub encounter_id: String,
    pub spawnpoint_id: String,
    pub pokemon_id: u16,
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch ms after which the sighting is no longer visible.
    pub disappear_time: i64,
}

impl StoreRecord for PokemonRecord {
    const TABLE: &'static str = "pokemon";
    const COLUMNS: &'static [&'static str] = &[
        "encounter_id",
        "spawnpoint_id",
        "pokemon_id",
        "latitude",
        "longitude",
        "disappear_time",
    ];

    fn key(&self) -> &str {
        &self.encounter_id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.encounter_id.clone()),
            SqlValue::Text(self.spawnpoint_id.clone()),
            SqlValue::Integer(i64::from(self.pokemon_id)),
            SqlValue::Real(self.latitude),
            SqlValue::Real(self.longitude),
            SqlValue::Integer(self.disappear_time),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            encounter_id: row.get(0)?,
            spawnpoint_id: row.get(1)?,
            pokemon_id: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            disappear_time: row.get(5)?,
        })
    }

    fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    fn set_coordinates(&mut self, latitude: f64, longitude: f64) {
        self.latitude = latitude;
        self.longitude = longitude;
    }
}

/// Active sighting surfaced by `get_active`, augmented with the
/// resolved display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSighting {
    pub encounter_id: String,
    pub spawnpoint_id: String,
    pub pokemon_id: u16,
    pub pokemon_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub disappear_time: i64,
}

// =============================================================================
// Fixed installations
// =============================================================================

/// A pokestop, optionally running a lure module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PokestopRecord {
    pub pokestop_id: String,
    pub enabled: bool,
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch ms of the upstream modification.
    pub last_modified: i64,
    /// Epoch ms at which the active lure expires; unset when no lure.
    pub lure_expiration: Option<i64>,
    /// Species attracted by the active lure; unset when no lure.
    pub active_pokemon_id: Option<u16>,
}

impl StoreRecord for PokestopRecord {
    const TABLE: &'static str = "pokestop";
    const COLUMNS: &'static [&'static str] = &[
        "pokestop_id",
        "enabled",
        "latitude",
        "longitude",
        "last_modified",
        "lure_expiration",
        "active_pokemon_id",
    ];

    fn key(&self) -> &str {
        &self.pokestop_id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.pokestop_id.clone()),
            SqlValue::Integer(i64::from(self.enabled)),
            SqlValue::Real(self.latitude),
            SqlValue::Real(self.longitude),
            SqlValue::Integer(self.last_modified),
            self.lure_expiration.map_or(SqlValue::Null, SqlValue::Integer),
            self.active_pokemon_id
                .map_or(SqlValue::Null, |id| SqlValue::Integer(i64::from(id))),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            pokestop_id: row.get(0)?,
            enabled: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            last_modified: row.get(4)?,
            lure_expiration: row.get(5)?,
            active_pokemon_id: row.get(6)?,
        })
    }

    fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    fn set_coordinates(&mut self, latitude: f64, longitude: f64) {
        self.latitude = latitude;
        self.longitude = longitude;
    }
}

/// Faction controlling a gym.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Team {
    Uncontested,
    Mystic,
    Valor,
    Instinct,
}

impl Team {
    /// Map the wire-level team id. Unknown ids yield `None`.
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Team::Uncontested),
            1 => Some(Team::Mystic),
            2 => Some(Team::Valor),
            3 => Some(Team::Instinct),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Uncontested => "uncontested",
            Team::Mystic => "mystic",
            Team::Valor => "valor",
            Team::Instinct => "instinct",
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gym: a fixed location under contestable faction control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymRecord {
    pub gym_id: String,
    /// Controlling faction id; 0 = uncontested.
    pub team_id: i64,
    /// Species guarding the gym; 0 when unguarded.
    pub guard_pokemon_id: u16,
    pub gym_points: i64,
    pub enabled: bool,
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch ms of the upstream modification.
    pub last_modified: i64,
}

impl GymRecord {
    /// Controlling faction, if the stored id is a known team.
    pub fn team(&self) -> Option<Team> {
        Team::from_id(self.team_id)
    }
}

impl StoreRecord for GymRecord {
    const TABLE: &'static str = "gym";
    const COLUMNS: &'static [&'static str] = &[
        "gym_id",
        "team_id",
        "guard_pokemon_id",
        "gym_points",
        "enabled",
        "latitude",
        "longitude",
        "last_modified",
    ];

    fn key(&self) -> &str {
        &self.gym_id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.gym_id.clone()),
            SqlValue::Integer(self.team_id),
            SqlValue::Integer(i64::from(self.guard_pokemon_id)),
            SqlValue::Integer(self.gym_points),
            SqlValue::Integer(i64::from(self.enabled)),
            SqlValue::Real(self.latitude),
            SqlValue::Real(self.longitude),
            SqlValue::Integer(self.last_modified),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            gym_id: row.get(0)?,
            team_id: row.get(1)?,
            guard_pokemon_id: row.get(2)?,
            gym_points: row.get(3)?,
            enabled: row.get(4)?,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            last_modified: row.get(7)?,
        })
    }

    fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    fn set_coordinates(&mut self, latitude: f64, longitude: f64) {
        self.latitude = latitude;
        self.longitude = longitude;
    }
}

// =============================================================================
// Scan coverage
// =============================================================================

/// Liveness marker: one row per distinct scanned step location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedLocationRecord {
    /// Deterministic key derived from the step coordinates.
    pub scanned_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch ms of the most recent scan of this step.
    pub last_modified: i64,
}

impl ScannedLocationRecord {
    /// Key for a step location. The shortest-roundtrip float form
    /// keeps repeated scans of the same step on a single row
    /// (`(1.0, 2.0)` → `"1.0,2.0"`).
    pub fn key_for(latitude: f64, longitude: f64) -> String {
        format!("{latitude:?},{longitude:?}")
    }
}

impl StoreRecord for ScannedLocationRecord {
    const TABLE: &'static str = "scanned_location";
    const COLUMNS: &'static [&'static str] =
        &["scanned_id", "latitude", "longitude", "last_modified"];

    fn key(&self) -> &str {
        &self.scanned_id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.scanned_id.clone()),
            SqlValue::Real(self.latitude),
            SqlValue::Real(self.longitude),
            SqlValue::Integer(self.last_modified),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            scanned_id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            last_modified: row.get(3)?,
        })
    }

    fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    fn set_coordinates(&mut self, latitude: f64, longitude: f64) {
        self.latitude = latitude;
        self.longitude = longitude;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_ids_map_to_factions() {
        assert_eq!(Team::from_id(0), Some(Team::Uncontested));
        assert_eq!(Team::from_id(1), Some(Team::Mystic));
        assert_eq!(Team::from_id(2), Some(Team::Valor));
        assert_eq!(Team::from_id(3), Some(Team::Instinct));
        assert_eq!(Team::from_id(7), None);
    }

    #[test]
    fn scanned_key_is_deterministic_and_keeps_float_form() {
        assert_eq!(ScannedLocationRecord::key_for(1.0, 2.0), "1.0,2.0");
        assert_eq!(
            ScannedLocationRecord::key_for(37.7749, -122.4194),
            "37.7749,-122.4194"
        );
        assert_eq!(
            ScannedLocationRecord::key_for(1.0, 2.0),
            ScannedLocationRecord::key_for(1.0, 2.0)
        );
    }

    #[test]
    fn column_counts_match_values() {
        let pokemon = PokemonRecord {
            encounter_id: "abc".to_string(),
            spawnpoint_id: "sp".to_string(),
            pokemon_id: 1,
            latitude: 0.0,
            longitude: 0.0,
            disappear_time: 0,
        };
        assert_eq!(pokemon.values().len(), PokemonRecord::COLUMNS.len());

        let stop = PokestopRecord {
            pokestop_id: "ps".to_string(),
            enabled: true,
            latitude: 0.0,
            longitude: 0.0,
            last_modified: 0,
            lure_expiration: None,
            active_pokemon_id: None,
        };
        assert_eq!(stop.values().len(), PokestopRecord::COLUMNS.len());

        let gym = GymRecord {
            gym_id: "g".to_string(),
            team_id: 0,
            guard_pokemon_id: 0,
            gym_points: 0,
            enabled: true,
            latitude: 0.0,
            longitude: 0.0,
            last_modified: 0,
        };
        assert_eq!(gym.values().len(), GymRecord::COLUMNS.len());

        let scanned = ScannedLocationRecord {
            scanned_id: "1.0,2.0".to_string(),
            latitude: 1.0,
            longitude: 2.0,
            last_modified: 0,
        };
        assert_eq!(scanned.values().len(), ScannedLocationRecord::COLUMNS.len());
    }
}
