//! Persistent flat vector index over embedded chunks.
//!
//! On disk an index is a directory holding `manifest.json` (dimensions, entry
//! count, timestamps) and `entries.bin` (length-prefixed msgpack entries).

pub mod error;
pub mod flat;
pub mod manifest;

pub use error::IndexError;
pub use flat::{IndexEntry, SearchHit, VectorIndex};
pub use manifest::{IndexManifest, Metric};
