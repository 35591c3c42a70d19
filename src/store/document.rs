//! Document persistence
//!
//! The store's durable form is a single JSON document on disk. Writes go
//! to a temp file in the same directory followed by a rename, so a crash
//! mid-write never leaves a torn document behind.

use crate::error::{AppError, Result};
use crate::store::models::StoreDocument;
use std::fs;
use std::path::Path;

pub const STORE_FILE: &str = "inventory.json";

/// Load the document from disk.
///
/// A missing or empty file yields a well-formed empty document rather
/// than an error; a present but unparseable file is a hard error.
pub fn load(path: &Path) -> Result<StoreDocument> {
    if !path.exists() {
        return Ok(StoreDocument::default());
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    if raw.trim().is_empty() {
        return Ok(StoreDocument::default());
    }

    let doc = serde_json::from_str(&raw)?;
    Ok(doc)
}

/// Persist the document atomically (temp file + rename).
pub fn save(path: &Path, doc: &StoreDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let raw = serde_json::to_string_pretty(doc)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw)?;
    fs::rename(&tmp, path)?;

    Ok(())
}
