//! Species classification and display-name lookup.
//!
//! Two membership sets drive what the parser keeps: `rare` species are
//! persisted, `high_value` species are persisted *and* trigger a
//! notification. Anything in neither set is dropped. The sets are
//! plain data and can be replaced wholesale from configuration.

use std::collections::HashMap;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Classification of a species id against the configured sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesClass {
    /// Not in any set; the sighting is discarded.
    Ignored,
    /// Stored, no notification.
    Rare,
    /// Stored and dispatched to the notifier.
    HighValue,
}

impl SpeciesClass {
    pub fn as_str(self) -> &'static str {
        match self {
            SpeciesClass::Ignored => "ignored",
            SpeciesClass::Rare => "rare",
            SpeciesClass::HighValue => "high_value",
        }
    }

    /// Whether a sighting with this classification is persisted.
    pub fn is_retained(self) -> bool {
        !matches!(self, SpeciesClass::Ignored)
    }
}

impl std::fmt::Display for SpeciesClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two membership sets, overridable from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesSets {
    /// Species ids persisted on sight.
    pub rare: HashSet<u16>,
    /// Species ids persisted on sight and forwarded to the notifier.
    pub high_value: HashSet<u16>,
}

impl Default for SpeciesSets {
    fn default() -> Self {
        Self {
            rare: [
                1, 2, 3, 4, 5, 6, 7, 29, 30, 31, 32, 33, 34, 35, 36, 43, 44, 45, 58, 60, 61,
                62, 66, 67, 68, 69, 70, 71, 72, 73, 79, 80, 88, 89, 92, 93, 94, 129,
            ]
            .into_iter()
            .collect(),
            high_value: [59, 103, 130, 131, 134, 136, 142, 143, 144, 145, 146, 149, 150, 151]
                .into_iter()
                .collect(),
        }
    }
}

impl SpeciesSets {
    /// Classify a species id. High-value wins when an id appears in
    /// both sets.
    pub fn classify(&self, species_id: u16) -> SpeciesClass {
        if self.high_value.contains(&species_id) {
            SpeciesClass::HighValue
        } else if self.rare.contains(&species_id) {
            SpeciesClass::Rare
        } else {
            SpeciesClass::Ignored
        }
    }
}

/// Fallback display name for ids missing from the lookup table.
pub const UNKNOWN_SPECIES: &str = "Unknown";

static SPECIES_NAMES: Lazy<HashMap<u16, String>> = Lazy::new(|| {
    // Embedded English locale table; ships with the crate so reads
    // never depend on an external file at runtime.
    serde_json::from_str::<HashMap<String, String>>(include_str!("../data/species_en.json"))
        .expect("embedded species table is valid JSON")
        .into_iter()
        .filter_map(|(id, name)| id.parse::<u16>().ok().map(|id| (id, name)))
        .collect()
});

/// Display-name lookup over the embedded species table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeciesDex;

impl SpeciesDex {
    /// Resolve the display name for a species id.
    ///
    /// Returns [`UNKNOWN_SPECIES`] for ids outside the table.
    pub fn name(self, species_id: u16) -> &'static str {
        SPECIES_NAMES
            .get(&species_id)
            .map_or(UNKNOWN_SPECIES, String::as_str)
    }
}
