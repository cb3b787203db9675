//! File-backed record collections.
//!
//! This module provides the `RecordStore` for loading and writing tray
//! requirement records. Each collection is a JSON array of documents in the
//! data directory:
//! - `case_type_requirements.json`
//! - `physician_preferences.json`
//!
//! Documents are normalized and validated on every load, and soft-deleted
//! records are filtered out before anything reaches the resolver.

pub mod manager;

pub use manager::{Collection, RecordStore, StoreResult};
