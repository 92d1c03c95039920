use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use ecrag_core::Chunk;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::IndexError;
use crate::manifest::IndexManifest;

pub const ENTRIES_FILE: &str = "entries.bin";

/// A chunk together with the embedding computed from its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One nearest-neighbour result. `rank` is 0-based, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub distance: f32,
    pub rank: usize,
}

/// Exhaustive squared-L2 index. Entries keep insertion order, which also breaks
/// distance ties during search.
pub struct VectorIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            manifest: IndexManifest::new(dimensions),
            entries: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.manifest.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append entries. The whole call is rejected if any vector has the wrong width.
    pub fn add(&mut self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        let dims = self.dimensions();
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                actual: bad.vector.len(),
            });
        }
        self.entries.extend(entries);
        self.manifest.entry_count = self.entries.len();
        self.manifest.updated_at = Utc::now();
        Ok(())
    }

    /// Drop every entry after the first `len`. No-op when the index is not longer than `len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.entries.len() {
            return;
        }
        self.entries.truncate(len);
        self.manifest.entry_count = self.entries.len();
        self.manifest.updated_at = Utc::now();
    }

    /// The `k` entries nearest to `query`. Fewer are returned when the index is smaller.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions(),
                actual: query.len(),
            });
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, squared_l2(query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (i, distance))| {
                let entry = &self.entries[i];
                SearchHit {
                    chunk: entry.chunk.clone(),
                    vector: entry.vector.clone(),
                    distance,
                    rank,
                }
            })
            .collect())
    }

    /// Persist to `dir`, replacing whatever was there.
    ///
    /// `entries.bin` is a sequence of records, each a u32 little-endian length
    /// followed by the msgpack-encoded [`IndexEntry`]. The manifest is written
    /// last, so a directory without one is treated as empty.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir)?;

        let tmp = dir.join(format!("{ENTRIES_FILE}.tmp"));
        {
            let mut file = std::io::BufWriter::new(fs::File::create(&tmp)?);
            for entry in &self.entries {
                let encoded =
                    rmp_serde::to_vec(entry).map_err(|e| IndexError::Serialize(e.to_string()))?;
                let len = encoded.len() as u32;
                file.write_all(&len.to_le_bytes())?;
                file.write_all(&encoded)?;
            }
            file.flush()?;
        }
        fs::rename(&tmp, dir.join(ENTRIES_FILE))?;
        self.manifest.save(dir)?;

        info!(
            "Index saved to {}: {} entries, {} dims",
            dir.display(),
            self.entries.len(),
            self.dimensions()
        );
        Ok(())
    }

    /// Load a persisted index. Returns `None` if nothing has been saved in `dir`.
    pub fn load(dir: &Path) -> Result<Option<Self>, IndexError> {
        let Some(manifest) = IndexManifest::load(dir)? else {
            return Ok(None);
        };

        let path = dir.join(ENTRIES_FILE);
        let corrupt = |reason: String| IndexError::Corrupt {
            path: path.display().to_string(),
            reason,
        };

        let data = if path.exists() { fs::read(&path)? } else { Vec::new() };
        let mut entries = Vec::with_capacity(manifest.entry_count);
        let mut pos = 0;

        while pos < data.len() {
            let Some(prefix) = data.get(pos..pos + 4) else {
                return Err(corrupt("truncated length prefix".to_string()));
            };
            let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            pos += 4;

            let Some(payload) = data.get(pos..pos + len) else {
                return Err(corrupt("truncated index entry".to_string()));
            };
            let entry: IndexEntry =
                rmp_serde::from_slice(payload).map_err(|e| IndexError::Serialize(e.to_string()))?;
            if entry.vector.len() != manifest.dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: manifest.dimensions,
                    actual: entry.vector.len(),
                });
            }
            entries.push(entry);
            pos += len;
        }

        if entries.len() != manifest.entry_count {
            return Err(corrupt(format!(
                "manifest lists {} entries, found {}",
                manifest.entry_count,
                entries.len()
            )));
        }

        debug!("index loaded from {}: {} entries", dir.display(), entries.len());
        Ok(Some(Self { manifest, entries }))
    }

    /// Load the index in `dir`, or start an empty one if none exists yet.
    ///
    /// A persisted index built with a different embedding width is an error:
    /// its vectors cannot be compared with the configured embedder's output.
    pub fn open_or_create(dir: &Path, dimensions: usize) -> Result<Self, IndexError> {
        match Self::load(dir)? {
            Some(index) if index.dimensions() != dimensions => Err(IndexError::DimensionMismatch {
                expected: index.dimensions(),
                actual: dimensions,
            }),
            Some(index) => {
                info!("Opened index at {} ({} entries)", dir.display(), index.len());
                Ok(index)
            }
            None => {
                info!("No index at {}, starting empty", dir.display());
                Ok(Self::new(dimensions))
            }
        }
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
