//! pogomap-core: map-scan ingest and persistence
//!
//! Core library for `pogomap`, a scanner companion that turns raw
//! map-objects responses from the upstream game API into normalized
//! records in a local SQLite store.
//!
//! # Architecture
//!
//! ```text
//! Map API response → ScanPipeline → per-kind batches → Storage (SQLite)
//!      (wire types)   (classify,                        (chunked
//!                      gate, key)        ↓               upserts)
//!                                    Notifier
//!                            (best-effort alerts)
//! ```
//!
//! # Modules
//!
//! - `api`: wire types for the map-objects response (verbatim field names)
//! - `ingest`: the parse/persist pipeline the scan loop drives
//! - `species`: rare/high-value classification and display names
//! - `storage`: SQLite store with generic keyed batch upsert
//! - `records`: typed records and the generic persistence contract
//! - `transform`: WGS-84 → GCJ-02 read-time coordinate transform
//! - `notify`: injected alert sink for high-value sightings
//! - `config`: explicit deployment configuration (TOML)
//! - `logging`: tracing subscriber setup for binaries
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod notify;
pub mod records;
pub mod species;
pub mod storage;
pub mod transform;

pub use error::{Error, Result, StorageError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
