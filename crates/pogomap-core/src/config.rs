//! Deployment configuration.
//!
//! Everything that was ambient process state in earlier map scanners
//! (display region mode, species lists, transport settings) is an
//! explicit value here, loaded once from TOML and threaded into the
//! components that need it.
//!
//! ```toml
//! db_path = "pogomap.db"
//! region_mode = "native"
//! upsert_chunk_size = 120
//! store_forts = true
//!
//! [species]
//! high_value = [149, 150, 151]
//!
//! [notify]
//! enabled = true
//! recipient = "ops@example.com"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::notify::NotifyConfig;
use crate::species::SpeciesSets;

/// Coordinate system applied to read queries.
///
/// Stored rows are always native (WGS-84); `Alternate` applies the
/// GCJ-02 transform uniformly to every record a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    #[default]
    Native,
    Alternate,
}

impl RegionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionMode::Native => "native",
            RegionMode::Alternate => "alternate",
        }
    }
}

impl std::str::FromStr for RegionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "native" => Ok(RegionMode::Native),
            "alternate" => Ok(RegionMode::Alternate),
            _ => Err(format!("unknown region mode: {s}")),
        }
    }
}

impl std::fmt::Display for RegionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database path.
    pub db_path: PathBuf,

    /// Coordinate system for read queries.
    pub region_mode: RegionMode,

    /// Maximum rows per upsert statement.
    pub upsert_chunk_size: usize,

    /// Persist pokestop/gym batches. Batch building and gating always
    /// run regardless.
    pub store_forts: bool,

    /// Species membership sets for the classifier.
    pub species: SpeciesSets,

    /// Alert dispatch settings.
    pub notify: NotifyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("pogomap.db"),
            region_mode: RegionMode::Native,
            upsert_chunk_size: 120,
            store_forts: true,
            species: SpeciesSets::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate().map_err(Error::Config)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.upsert_chunk_size == 0 {
            return Err("upsert_chunk_size must be >= 1".to_string());
        }
        if self.db_path.as_os_str().is_empty() {
            return Err("db_path must not be empty".to_string());
        }
        self.notify.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.upsert_chunk_size, 120);
        assert_eq!(config.region_mode, RegionMode::Native);
        assert!(config.store_forts);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = AppConfig {
            upsert_chunk_size: 0,
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("upsert_chunk_size"));
    }

    #[test]
    fn partial_toml_overlays_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            region_mode = "alternate"

            [species]
            high_value = [151]
            "#,
        )
        .unwrap();
        assert_eq!(config.region_mode, RegionMode::Alternate);
        assert_eq!(config.upsert_chunk_size, 120);
        assert!(config.species.high_value.contains(&151));
        assert_eq!(config.species.high_value.len(), 1);
        // Unspecified sections keep their defaults.
        assert!(config.species.rare.contains(&1));
    }

    #[test]
    fn region_mode_round_trips_through_str() {
        assert_eq!("native".parse::<RegionMode>().unwrap(), RegionMode::Native);
        assert_eq!(
            "alternate".parse::<RegionMode>().unwrap(),
            RegionMode::Alternate
        );
        assert!("gcj".parse::<RegionMode>().is_err());
        assert_eq!(RegionMode::Alternate.to_string(), "alternate");
    }
}
