use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IndexError;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;

/// Distance used by the index itself. Re-ranking recomputes cosine separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SquaredL2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub dimensions: usize,
    pub metric: Metric,
    pub entry_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexManifest {
    pub fn new(dimensions: usize) -> Self {
        let now = Utc::now();
        Self {
            format_version: FORMAT_VERSION,
            dimensions,
            metric: Metric::SquaredL2,
            entry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IndexError::Serialize(e.to_string()))?;
        let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, dir.join(MANIFEST_FILE))?;
        debug!("index manifest saved to {}", dir.display());
        Ok(())
    }

    /// Returns `None` when the directory holds no manifest (nothing persisted yet).
    pub fn load(dir: &Path) -> Result<Option<Self>, IndexError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)?;
        let manifest: IndexManifest =
            serde_json::from_str(&data).map_err(|e| IndexError::Serialize(e.to_string()))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(IndexError::Corrupt {
                path: path.display().to_string(),
                reason: format!("unsupported format version {}", manifest.format_version),
            });
        }
        Ok(Some(manifest))
    }
}
