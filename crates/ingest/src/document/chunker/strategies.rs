//! Recursive separator splitting, applied page by page.

use ecrag_core::{Chunk, OversizePolicy, Page, SourceDocument};

use super::helpers::{char_len, hard_split, merge_splits, split_keep_separator};
use super::types::ChunkConfig;

/// A chunk body before provenance is attached.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Piece {
    pub text: String,
    pub oversized: bool,
}

/// Split `text` into pieces of at most `config.chunk_size` characters (see
/// [`OversizePolicy`] for the one exception).
pub(crate) fn split_text(text: &str, config: &ChunkConfig) -> Vec<Piece> {
    let separators: Vec<&str> = config.separators.iter().map(String::as_str).collect();
    let mut out = Vec::new();
    split_recursive(text, &separators, config, &mut out);
    out
}

fn split_recursive(text: &str, separators: &[&str], config: &ChunkConfig, out: &mut Vec<Piece>) {
    // Coarsest separator present in the text; the finer ones remain for oversized pieces.
    let (separator, finer) = match separators.iter().position(|s| text.contains(s)) {
        Some(i) => (separators[i], &separators[i + 1..]),
        None => ("", &separators[separators.len()..]),
    };

    let splits = split_keep_separator(text, separator);
    let mut good: Vec<&str> = Vec::new();

    for s in splits {
        if char_len(s) < config.chunk_size {
            good.push(s);
            continue;
        }
        flush_good(&mut good, config, out);
        if finer.is_empty() {
            push_unsplittable(s, config, out);
        } else {
            split_recursive(s, finer, config, out);
        }
    }
    flush_good(&mut good, config, out);
}

fn flush_good(good: &mut Vec<&str>, config: &ChunkConfig, out: &mut Vec<Piece>) {
    if good.is_empty() {
        return;
    }
    out.extend(
        merge_splits(good, config.chunk_size, config.chunk_overlap)
            .into_iter()
            .map(|text| Piece { text, oversized: false }),
    );
    good.clear();
}

fn push_unsplittable(text: &str, config: &ChunkConfig, out: &mut Vec<Piece>) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if char_len(trimmed) <= config.chunk_size {
        out.push(Piece { text: trimmed.to_string(), oversized: false });
        return;
    }
    match config.oversize {
        OversizePolicy::HardSplit => out.extend(
            hard_split(trimmed, config.chunk_size, config.chunk_overlap)
                .into_iter()
                .map(|text| Piece { text, oversized: false }),
        ),
        OversizePolicy::Accept => {
            tracing::debug!(
                chars = char_len(trimmed),
                max = config.chunk_size,
                "keeping unsplittable piece as an oversized chunk"
            );
            out.push(Piece { text: trimmed.to_string(), oversized: true });
        }
    }
}

/// Split one page. Overlap never crosses a page boundary.
pub(crate) fn split_page(page: &Page, config: &ChunkConfig) -> Vec<Piece> {
    if page.text.trim().is_empty() {
        return Vec::new();
    }
    split_text(&page.text, config)
}

/// Attach provenance to per-page pieces and number them across the document.
pub(crate) fn assemble(doc: &SourceDocument, per_page: Vec<Vec<Piece>>) -> Vec<Chunk> {
    doc.pages
        .iter()
        .zip(per_page)
        .flat_map(|(page, pieces)| {
            pieces.into_iter().map(move |piece| (page.page_index, piece))
        })
        .enumerate()
        .map(|(index, (page_index, piece))| Chunk {
            index,
            content: piece.text,
            source: doc.source.clone(),
            page_index,
            oversized: piece.oversized,
        })
        .collect()
}
