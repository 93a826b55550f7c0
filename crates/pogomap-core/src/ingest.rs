//! Map-response parsing and upsert pipeline.
//!
//! The sole entry point the outer scan loop calls. One call walks the
//! cells of a map-objects response, classifies and keys the entities
//! into per-kind batches, then upserts the batches:
//!
//! ```text
//! MapResponse → build_batches (classify + key + gate)
//!                     ↓
//!         {pokemon, pokestops, gyms, scanned}
//!                     ↓
//!            Storage::bulk_upsert (chunked)
//! ```
//!
//! Batch building never touches storage, so gating and classification
//! are testable without a database. High-value sightings are handed to
//! the notifier along the way; a dispatch failure is logged and
//! swallowed.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::{Fort, MapResponse, WildPokemon};
use crate::error::Result;
use crate::notify::Notifier;
use crate::records::{
    GymRecord, PokemonRecord, PokestopRecord, ScannedLocationRecord, StoreRecord,
};
use crate::species::{SpeciesClass, SpeciesDex, SpeciesSets};
use crate::storage::Storage;

/// Step index above which first-pass scans parse forts anyway.
const SHALLOW_STEP_LIMIT: u32 = 50;

/// Whether fort parsing runs for this scan pass.
///
/// First-pass shallow steps skip forts entirely, throttling
/// installation-table churn from early, incomplete passes.
pub fn fort_parsing_enabled(iteration_num: u32, step: u32) -> bool {
    iteration_num > 0 || step > SHALLOW_STEP_LIMIT
}

/// Text-safe key form of the upstream encounter id (base64 of its
/// decimal representation).
pub fn encode_encounter_id(encounter_id: u64) -> String {
    BASE64.encode(encounter_id.to_string())
}

/// Keyed batches produced from one scan response.
#[derive(Debug, Default)]
pub struct ScanBatches {
    pub pokemon: BTreeMap<String, PokemonRecord>,
    pub pokestops: BTreeMap<String, PokestopRecord>,
    pub gyms: BTreeMap<String, GymRecord>,
    pub scanned: BTreeMap<String, ScannedLocationRecord>,
}

/// Per-call result counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScanSummary {
    pub pokemon: usize,
    pub pokestops: usize,
    pub gyms: usize,
}

/// The parse/persist pipeline.
pub struct ScanPipeline {
    storage: Arc<Storage>,
    notifier: Box<dyn Notifier>,
    species: SpeciesSets,
    dex: SpeciesDex,
    store_forts: bool,
}

impl ScanPipeline {
    pub fn new(storage: Arc<Storage>, notifier: Box<dyn Notifier>, species: SpeciesSets) -> Self {
        Self {
            storage,
            notifier,
            species,
            dex: SpeciesDex,
            store_forts: true,
        }
    }

    /// Disable fort persistence. Fort batches are still built and
    /// gated so the decision stays observable.
    pub fn with_store_forts(mut self, store_forts: bool) -> Self {
        self.store_forts = store_forts;
        self
    }

    /// Parse one scan response and persist its batches.
    ///
    /// Sighting and coverage writes are unconditional (sightings only
    /// when the batch is non-empty; coverage always). A storage
    /// failure propagates; batches already committed stay committed.
    pub fn parse_scan(
        &self,
        response: &MapResponse,
        iteration_num: u32,
        step: u32,
        step_location: (f64, f64),
    ) -> Result<ScanSummary> {
        let batches = self.build_batches(response, iteration_num, step, step_location);
        let summary = ScanSummary {
            pokemon: batches.pokemon.len(),
            pokestops: batches.pokestops.len(),
            gyms: batches.gyms.len(),
        };

        if !batches.pokemon.is_empty() {
            info!("upserting {} pokemon", batches.pokemon.len());
            self.storage.bulk_upsert(&batches.pokemon)?;
        }

        if self.store_forts {
            if !batches.pokestops.is_empty() {
                info!("upserting {} pokestops", batches.pokestops.len());
                self.storage.bulk_upsert(&batches.pokestops)?;
            }
            if !batches.gyms.is_empty() {
                info!("upserting {} gyms", batches.gyms.len());
                self.storage.bulk_upsert(&batches.gyms)?;
            }
        }

        self.storage.bulk_upsert(&batches.scanned)?;
        Ok(summary)
    }

    /// Build the per-kind batches for one response without touching
    /// storage. Key collisions within a pass resolve last-seen-wins.
    pub fn build_batches(
        &self,
        response: &MapResponse,
        iteration_num: u32,
        step: u32,
        step_location: (f64, f64),
    ) -> ScanBatches {
        let mut batches = ScanBatches::default();

        for cell in &response.responses.get_map_objects.map_cells {
            for wild in &cell.wild_pokemons {
                self.collect_sighting(wild, &mut batches.pokemon);
            }

            if fort_parsing_enabled(iteration_num, step) {
                for fort in &cell.forts {
                    if fort.is_pokestop() {
                        let record = pokestop_from_fort(fort);
                        batches.pokestops.insert(record.key().to_string(), record);
                    } else {
                        let record = gym_from_fort(fort);
                        batches.gyms.insert(record.key().to_string(), record);
                    }
                }
            }
        }

        let (latitude, longitude) = step_location;
        let scanned = ScannedLocationRecord {
            scanned_id: ScannedLocationRecord::key_for(latitude, longitude),
            latitude,
            longitude,
            last_modified: Utc::now().timestamp_millis(),
        };
        batches.scanned.insert(scanned.key().to_string(), scanned);

        batches
    }

    fn collect_sighting(&self, wild: &WildPokemon, out: &mut BTreeMap<String, PokemonRecord>) {
        let species_id = wild.pokemon_data.pokemon_id;
        let class = self.species.classify(species_id);
        if !class.is_retained() {
            return;
        }

        let disappear_time = wild.last_modified_timestamp_ms + wild.time_till_hidden_ms;
        let name = self.dex.name(species_id);
        info!("pokemon: {name} id# {species_id}");

        if class == SpeciesClass::HighValue {
            // Best-effort, single attempt; never aborts the pipeline.
            if let Err(e) = self.notifier.notify(
                name,
                species_id,
                wild.latitude,
                wild.longitude,
                disappear_time,
            ) {
                warn!("alert dispatch failed for {name}: {e}");
            }
        }

        let record = PokemonRecord {
            encounter_id: encode_encounter_id(wild.encounter_id),
            spawnpoint_id: wild.spawnpoint_id.clone(),
            pokemon_id: species_id,
            latitude: wild.latitude,
            longitude: wild.longitude,
            disappear_time,
        };
        out.insert(record.key().to_string(), record);
    }
}

fn pokestop_from_fort(fort: &Fort) -> PokestopRecord {
    let (lure_expiration, active_pokemon_id) = match &fort.lure_info {
        Some(lure) => (
            Some(lure.lure_expires_timestamp_ms),
            Some(lure.active_pokemon_id),
        ),
        None => (None, None),
    };
    PokestopRecord {
        pokestop_id: fort.id.clone(),
        enabled: fort.enabled,
        latitude: fort.latitude,
        longitude: fort.longitude,
        last_modified: fort.last_modified_timestamp_ms,
        lure_expiration,
        active_pokemon_id,
    }
}

fn gym_from_fort(fort: &Fort) -> GymRecord {
    GymRecord {
        gym_id: fort.id.clone(),
        team_id: fort.owned_by_team,
        guard_pokemon_id: fort.guard_pokemon_id,
        gym_points: fort.gym_points,
        enabled: fort.enabled,
        latitude: fort.latitude,
        longitude: fort.longitude,
        last_modified: fort.last_modified_timestamp_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    use crate::config::RegionMode;
    use crate::notify::NotifyError;
    use crate::species::SpeciesDex;

    #[derive(Debug, Clone, Default)]
    struct RecordingNotifier {
        calls: Arc<Mutex<Vec<(String, u16, f64, f64, i64)>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(
            &self,
            species_name: &str,
            species_id: u16,
            latitude: f64,
            longitude: f64,
            disappear_time: i64,
        ) -> std::result::Result<(), NotifyError> {
            self.calls.lock().unwrap().push((
                species_name.to_string(),
                species_id,
                latitude,
                longitude,
                disappear_time,
            ));
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(
            &self,
            _: &str,
            _: u16,
            _: f64,
            _: f64,
            _: i64,
        ) -> std::result::Result<(), NotifyError> {
            Err(NotifyError("transport down".to_string()))
        }
    }

    fn wild(encounter_id: u64, pokemon_id: u16) -> serde_json::Value {
        json!({
            "encounter_id": encounter_id,
            "spawnpoint_id": "spawn-1",
            "latitude": 37.7765,
            "longitude": -122.4172,
            "last_modified_timestamp_ms": 1000,
            "time_till_hidden_ms": 2000,
            "pokemon_data": { "pokemon_id": pokemon_id }
        })
    }

    fn response_with(cells: serde_json::Value) -> MapResponse {
        MapResponse::from_value(json!({
            "responses": { "GET_MAP_OBJECTS": { "map_cells": cells } }
        }))
        .unwrap()
    }

    fn pipeline_with(notifier: Box<dyn Notifier>) -> ScanPipeline {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        ScanPipeline::new(storage, notifier, SpeciesSets::default())
    }

    // =========================================================================
    // Sighting classification
    // =========================================================================

    #[test]
    fn rare_sighting_is_stored_without_notification() {
        let notifier = RecordingNotifier::default();
        let pipeline = pipeline_with(Box::new(notifier.clone()));
        let response = response_with(json!([{ "wild_pokemons": [wild(99, 1)] }]));

        let summary = pipeline.parse_scan(&response, 0, 0, (1.0, 2.0)).unwrap();
        assert_eq!(summary.pokemon, 1);
        assert!(notifier.calls.lock().unwrap().is_empty());

        let active = pipeline
            .storage
            .get_active(SpeciesDex, RegionMode::Native)
            .unwrap();
        // disappear_time = last_modified + time_till_hidden, already in
        // the past here, so the read filters it out.
        assert!(active.is_empty());
    }

    #[test]
    fn disappear_time_is_sum_of_wire_timestamps() {
        let pipeline = pipeline_with(Box::new(RecordingNotifier::default()));
        let response = response_with(json!([{ "wild_pokemons": [wild(99, 1)] }]));

        let batches = pipeline.build_batches(&response, 0, 0, (1.0, 2.0));
        let record = batches.pokemon.values().next().unwrap();
        assert_eq!(record.disappear_time, 3000);
        assert_eq!(record.encounter_id, encode_encounter_id(99));
        assert_eq!(record.spawnpoint_id, "spawn-1");
    }

    #[test]
    fn high_value_sighting_triggers_exactly_one_notification() {
        let notifier = RecordingNotifier::default();
        let pipeline = pipeline_with(Box::new(notifier.clone()));
        let response = response_with(json!([{ "wild_pokemons": [wild(99, 150)] }]));

        pipeline.parse_scan(&response, 0, 0, (1.0, 2.0)).unwrap();

        let calls = notifier.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (name, id, lat, lon, disappear) = calls[0].clone();
        assert_eq!(name, "Mewtwo");
        assert_eq!(id, 150);
        assert!((lat - 37.7765).abs() < f64::EPSILON);
        assert!((lon + 122.4172).abs() < f64::EPSILON);
        assert_eq!(disappear, 3000);
    }

    #[test]
    fn unlisted_species_produces_no_record() {
        let pipeline = pipeline_with(Box::new(RecordingNotifier::default()));
        // Pidgey is in neither set.
        let response = response_with(json!([{ "wild_pokemons": [wild(99, 16)] }]));

        let batches = pipeline.build_batches(&response, 0, 0, (1.0, 2.0));
        assert!(batches.pokemon.is_empty());
    }

    #[test]
    fn duplicate_encounter_key_resolves_last_seen_wins() {
        let pipeline = pipeline_with(Box::new(RecordingNotifier::default()));
        let response = response_with(json!([{
            "wild_pokemons": [wild(99, 1), wild(99, 4)]
        }]));

        let batches = pipeline.build_batches(&response, 0, 0, (1.0, 2.0));
        assert_eq!(batches.pokemon.len(), 1);
        assert_eq!(batches.pokemon.values().next().unwrap().pokemon_id, 4);
    }

    #[test]
    fn notifier_failure_never_aborts_the_pipeline() {
        let pipeline = pipeline_with(Box::new(FailingNotifier));
        let response = response_with(json!([{ "wild_pokemons": [wild(99, 150)] }]));

        let summary = pipeline.parse_scan(&response, 0, 0, (1.0, 2.0)).unwrap();
        assert_eq!(summary.pokemon, 1);
    }

    // =========================================================================
    // Fort gating and classification
    // =========================================================================

    fn fort_cells() -> serde_json::Value {
        json!([{
            "forts": [
                {
                    "id": "stop-1",
                    "type": 1,
                    "enabled": true,
                    "latitude": 1.0,
                    "longitude": 2.0,
                    "last_modified_timestamp_ms": 5000
                },
                {
                    "id": "gym-1",
                    "enabled": true,
                    "latitude": 3.0,
                    "longitude": 4.0,
                    "last_modified_timestamp_ms": 6000,
                    "owned_by_team": 2,
                    "guard_pokemon_id": 68,
                    "gym_points": 11000
                }
            ]
        }])
    }

    #[test]
    fn shallow_first_pass_skips_forts_entirely() {
        let pipeline = pipeline_with(Box::new(RecordingNotifier::default()));
        let response = response_with(fort_cells());

        let batches = pipeline.build_batches(&response, 0, 50, (1.0, 2.0));
        assert!(batches.pokestops.is_empty());
        assert!(batches.gyms.is_empty());
    }

    #[test]
    fn deep_step_or_later_iteration_parses_forts() {
        let pipeline = pipeline_with(Box::new(RecordingNotifier::default()));
        let response = response_with(fort_cells());

        let by_step = pipeline.build_batches(&response, 0, 51, (1.0, 2.0));
        assert_eq!(by_step.pokestops.len(), 1);
        assert_eq!(by_step.gyms.len(), 1);

        let by_iteration = pipeline.build_batches(&response, 1, 0, (1.0, 2.0));
        assert_eq!(by_iteration.pokestops.len(), 1);
        assert_eq!(by_iteration.gyms.len(), 1);
    }

    #[test]
    fn pokestop_without_lure_has_unset_lure_fields() {
        let pipeline = pipeline_with(Box::new(RecordingNotifier::default()));
        let response = response_with(fort_cells());

        let batches = pipeline.build_batches(&response, 1, 0, (1.0, 2.0));
        let stop = batches.pokestops.get("stop-1").unwrap();
        assert_eq!(stop.lure_expiration, None);
        assert_eq!(stop.active_pokemon_id, None);
        assert_eq!(stop.last_modified, 5000);
    }

    #[test]
    fn gym_fields_carry_wire_values() {
        let pipeline = pipeline_with(Box::new(RecordingNotifier::default()));
        let response = response_with(fort_cells());

        let batches = pipeline.build_batches(&response, 1, 0, (1.0, 2.0));
        let gym = batches.gyms.get("gym-1").unwrap();
        assert_eq!(gym.team_id, 2);
        assert_eq!(gym.guard_pokemon_id, 68);
        assert_eq!(gym.gym_points, 11000);
    }

    #[test]
    fn store_forts_flag_gates_writes_but_not_batches() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let pipeline = ScanPipeline::new(
            Arc::clone(&storage),
            Box::new(RecordingNotifier::default()),
            SpeciesSets::default(),
        )
        .with_store_forts(false);
        let response = response_with(fort_cells());

        let summary = pipeline.parse_scan(&response, 1, 0, (1.0, 2.0)).unwrap();
        // Classification still happened...
        assert_eq!(summary.pokestops, 1);
        assert_eq!(summary.gyms, 1);
        // ...but nothing was written.
        let stops: Vec<PokestopRecord> = storage.get_all(RegionMode::Native).unwrap();
        assert!(stops.is_empty());
        let gyms: Vec<GymRecord> = storage.get_all(RegionMode::Native).unwrap();
        assert!(gyms.is_empty());
    }

    // =========================================================================
    // Coverage
    // =========================================================================

    #[test]
    fn coverage_row_is_produced_even_for_an_empty_response() {
        let pipeline = pipeline_with(Box::new(RecordingNotifier::default()));
        let response = response_with(json!([]));

        let batches = pipeline.build_batches(&response, 0, 0, (1.0, 2.0));
        assert_eq!(batches.scanned.len(), 1);
        assert!(batches.scanned.contains_key("1.0,2.0"));
    }

    #[test]
    fn repeated_scans_of_a_step_collapse_to_one_coverage_row() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let pipeline = ScanPipeline::new(
            Arc::clone(&storage),
            Box::new(RecordingNotifier::default()),
            SpeciesSets::default(),
        );
        let response = response_with(json!([]));

        pipeline.parse_scan(&response, 0, 0, (1.0, 2.0)).unwrap();
        pipeline.parse_scan(&response, 0, 1, (1.0, 2.0)).unwrap();

        let rows: Vec<ScannedLocationRecord> = storage.get_all(RegionMode::Native).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scanned_id, "1.0,2.0");
    }
}
