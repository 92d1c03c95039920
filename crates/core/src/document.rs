use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One page of extracted text. `page_index` is 0-based, as produced by extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_index: usize,
    pub text: String,
}

/// A loaded knowledge source: its identifier (the path as given) and its pages in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source: String,
    pub pages: Vec<Page>,
}

impl SourceDocument {
    /// Total character count across all pages.
    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }

    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// A bounded span of text with provenance. Never mutated after the chunker emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position within the source document.
    pub index: usize,
    pub content: String,
    /// Identifier of the originating document.
    pub source: String,
    /// 0-based index of the originating page.
    pub page_index: usize,
    /// Set when the chunk exceeds the configured size under [`OversizePolicy::Accept`].
    #[serde(default)]
    pub oversized: bool,
}

impl Chunk {
    /// Length in characters (Unicode scalar values), the unit chunk sizes are measured in.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// 1-based page number for display.
    pub fn page_number(&self) -> usize {
        self.page_index + 1
    }
}

/// What the chunker does with a piece that is still too long after every separator
/// has been tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizePolicy {
    /// Cut at the size boundary (on char boundaries), keeping the configured overlap.
    #[default]
    HardSplit,
    /// Keep the piece whole and flag the chunk as oversized.
    Accept,
}

impl FromStr for OversizePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard_split" | "split" => Ok(OversizePolicy::HardSplit),
            "accept" => Ok(OversizePolicy::Accept),
            other => Err(ConfigError::invalid(
                "CHUNK_OVERSIZE_POLICY",
                format!("expected 'hard_split' or 'accept', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for OversizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OversizePolicy::HardSplit => write!(f, "hard_split"),
            OversizePolicy::Accept => write!(f, "accept"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_is_one_based() {
        let chunk = Chunk {
            index: 0,
            content: "运费规则".to_string(),
            source: "rules.pdf".to_string(),
            page_index: 0,
            oversized: false,
        };
        assert_eq!(chunk.page_number(), 1);
        assert_eq!(chunk.char_len(), 4);
    }

    #[test]
    fn oversize_policy_parses() {
        assert_eq!("accept".parse::<OversizePolicy>().unwrap(), OversizePolicy::Accept);
        assert_eq!(
            "Hard_Split".parse::<OversizePolicy>().unwrap(),
            OversizePolicy::HardSplit
        );
        assert!("truncate".parse::<OversizePolicy>().is_err());
    }

    #[test]
    fn blank_document_detection() {
        let doc = SourceDocument {
            source: "a.pdf".into(),
            pages: vec![
                Page { page_index: 0, text: "  \n".into() },
                Page { page_index: 1, text: String::new() },
            ],
        };
        assert!(doc.is_blank());
        assert_eq!(doc.total_chars(), 3);
    }
}
