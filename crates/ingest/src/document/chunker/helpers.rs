//! Splitting and merging primitives used by the recursive splitter.
//!
//! All lengths are character counts, so multi-byte text is measured the way a reader
//! sees it and every slice boundary falls on a char boundary.

/// Length of `text` in characters.
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` on `separator`, keeping each separator attached to the start of the
/// piece that follows it. Empty pieces are dropped.
pub(crate) fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return vec![text];
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Concatenate pieces and trim. Returns `None` when nothing but whitespace remains.
fn join_pieces<'a>(pieces: impl Iterator<Item = &'a str>) -> Option<String> {
    let joined: String = pieces.collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Greedily merge pieces (each shorter than `chunk_size`) into chunks of at most
/// `chunk_size` characters. After a chunk is emitted, pieces are dropped from its front
/// until the retained tail is at most `overlap` characters and the next piece fits;
/// that tail opens the next chunk.
pub(crate) fn merge_splits(pieces: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: std::collections::VecDeque<(&str, usize)> = Default::default();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        if total + len > chunk_size && !current.is_empty() {
            if let Some(chunk) = join_pieces(current.iter().map(|(p, _)| *p)) {
                chunks.push(chunk);
            }
            while total > overlap || (total + len > chunk_size && total > 0) {
                match current.pop_front() {
                    Some((_, front_len)) => total -= front_len,
                    None => break,
                }
            }
        }
        current.push_back((piece, len));
        total += len;
    }

    if let Some(chunk) = join_pieces(current.iter().map(|(p, _)| *p)) {
        chunks.push(chunk);
    }
    chunks
}

/// Cut `text` into windows of `chunk_size` characters; consecutive windows share
/// `overlap` characters. Requires `overlap < chunk_size`.
pub(crate) fn hard_split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n_chars = bounds.len() - 1;
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(n_chars);
        let window = text[bounds[start]..bounds[end]].trim();
        if !window.is_empty() {
            windows.push(window.to_string());
        }
        if end == n_chars {
            break;
        }
        start += step;
    }
    windows
}
