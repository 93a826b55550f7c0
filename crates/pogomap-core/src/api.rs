//! Wire types for the upstream map-objects response.
//!
//! Field names here are an external contract with the game API and are
//! preserved verbatim: all timestamps arrive as epoch milliseconds,
//! forts carry a `type` discriminator (1 = pokestop, absent or other =
//! gym), and lured pokestops attach an optional `lure_info` sub-object.
//!
//! Structural requirements (the `responses.GET_MAP_OBJECTS.map_cells`
//! path, required per-entity fields) are enforced by deserialization;
//! a response failing them is rejected whole as
//! [`Error::MalformedResponse`]. Per-cell entity lists and the
//! gym-only counters are optional and default, matching the upstream
//! API's habit of omitting them.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level RPC envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct MapResponse {
    pub responses: ResponseBody,
}

/// The `responses` object; only the map-objects reply is consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBody {
    #[serde(rename = "GET_MAP_OBJECTS")]
    pub get_map_objects: MapObjects,
}

/// The map-objects reply: a list of S2 cells.
#[derive(Debug, Clone, Deserialize)]
pub struct MapObjects {
    pub map_cells: Vec<MapCell>,
}

/// One scanned cell. Either entity list may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapCell {
    #[serde(default)]
    pub wild_pokemons: Vec<WildPokemon>,
    #[serde(default)]
    pub forts: Vec<Fort>,
}

/// A transient wild-pokemon sighting.
#[derive(Debug, Clone, Deserialize)]
pub struct WildPokemon {
    /// Opaque encounter id; too wide for a database integer column,
    /// so it is re-keyed to a text form before persistence.
    pub encounter_id: u64,
    pub spawnpoint_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch ms at which the sighting was last observed upstream.
    pub last_modified_timestamp_ms: i64,
    /// Remaining visibility in ms. The API occasionally reports
    /// negative values; kept signed so the arithmetic stays total.
    pub time_till_hidden_ms: i64,
    pub pokemon_data: PokemonData,
}

/// Nested species payload of a wild sighting.
#[derive(Debug, Clone, Deserialize)]
pub struct PokemonData {
    pub pokemon_id: u16,
}

/// A fixed installation: pokestop (`type == 1`) or gym (anything else,
/// including a missing `type`).
#[derive(Debug, Clone, Deserialize)]
pub struct Fort {
    pub id: String,
    #[serde(rename = "type", default)]
    pub fort_type: Option<i64>,
    pub enabled: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub last_modified_timestamp_ms: i64,
    /// Gym-only fields; the API omits them for unclaimed gyms and for
    /// partial payloads, so each defaults to 0.
    #[serde(default)]
    pub owned_by_team: i64,
    #[serde(default)]
    pub guard_pokemon_id: u16,
    #[serde(default)]
    pub gym_points: i64,
    /// Present only while a lure module is active on a pokestop.
    #[serde(default)]
    pub lure_info: Option<LureInfo>,
}

/// Active lure module details on a pokestop.
#[derive(Debug, Clone, Deserialize)]
pub struct LureInfo {
    pub lure_expires_timestamp_ms: i64,
    pub active_pokemon_id: u16,
}

/// Fort `type` value identifying a pokestop.
pub const FORT_TYPE_POKESTOP: i64 = 1;

impl Fort {
    /// Whether this fort is a pokestop (as opposed to a gym).
    pub fn is_pokestop(&self) -> bool {
        self.fort_type == Some(FORT_TYPE_POKESTOP)
    }
}

impl MapResponse {
    /// Deserialize a raw JSON value into the wire contract.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::MalformedResponse(e.to_string()))
    }

    /// Deserialize a raw JSON string into the wire contract.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::MalformedResponse(e.to_string()))
    }
}
