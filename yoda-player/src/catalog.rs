//! Track catalog
//!
//! Read-only mapping from tag id to audio file and start offset, loaded once at
//! startup from a JSON document shaped like:
//!
//! ```json
//! { "04A1B2C3": { "file": "podcasts/ep12.mp3", "offset": 42 } }
//! ```
//!
//! A missing or unparsable document is fatal. A single bad entry is not: it is
//! logged, left out of the table, and its id resolves as not found.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// One playable catalog entry
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    /// Path handed to the player backend
    pub file: String,
    /// Start offset in seconds (finite, non-negative)
    pub offset_seconds: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, TrackEntry>,
    malformed: Vec<String>,
}

impl Catalog {
    /// Read and parse the catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Catalog(format!("{}: {}", path.display(), e)))?;
        let catalog = Self::from_json_str(&text).map_err(|e| match e {
            Error::Catalog(msg) => Error::Catalog(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;

        info!(
            "Loaded {} catalog entries from {} ({} malformed)",
            catalog.len(),
            path.display(),
            catalog.malformed.len()
        );
        Ok(catalog)
    }

    /// Parse a catalog document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: Value =
            serde_json::from_str(text).map_err(|e| Error::Catalog(e.to_string()))?;
        let Value::Object(map) = document else {
            return Err(Error::Catalog("document root must be an object".to_string()));
        };

        let mut catalog = Catalog::default();
        for (id, raw) in map {
            match parse_entry(&raw) {
                Ok(entry) => {
                    catalog.entries.insert(id, entry);
                }
                Err(problem) => {
                    warn!("Skipping catalog entry '{}': {}", id, problem);
                    catalog.malformed.push(id);
                }
            }
        }
        catalog.malformed.sort();
        Ok(catalog)
    }

    /// Resolve a tag id
    pub fn lookup(&self, id: &str) -> Option<&TrackEntry> {
        self.entries.get(id)
    }

    /// Number of playable entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids skipped at load because their entry was malformed, sorted
    pub fn malformed(&self) -> &[String] {
        &self.malformed
    }
}

impl FromIterator<(String, TrackEntry)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (String, TrackEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            malformed: Vec::new(),
        }
    }
}

fn parse_entry(raw: &Value) -> std::result::Result<TrackEntry, &'static str> {
    let fields = raw.as_object().ok_or("entry is not an object")?;

    let file = fields
        .get("file")
        .and_then(Value::as_str)
        .ok_or("missing or non-string \"file\"")?;
    if file.is_empty() {
        return Err("empty \"file\"");
    }

    let offset_seconds = fields
        .get("offset")
        .and_then(Value::as_f64)
        .ok_or("missing or non-numeric \"offset\"")?;
    if !offset_seconds.is_finite() || offset_seconds < 0.0 {
        return Err("negative \"offset\"");
    }

    Ok(TrackEntry {
        file: file.to_string(),
        offset_seconds,
    })
}
