use ecrag_core::Page;

use super::ExtractionError;

/// Extract per-page text. Pages keep their 0-based position in the PDF even when
/// blank pages in between are dropped.
pub fn extract_pdf(bytes: &[u8]) -> Result<Vec<Page>, ExtractionError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    Ok(split_pages(&text))
}

/// pdf-extract returns all text as one string with form feeds (`\x0C`) between pages.
fn split_pages(text: &str) -> Vec<Page> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        // Scanned/image-only PDF: no text layer.
        tracing::warn!("PDF contains no extractable text");
        return Vec::new();
    }

    if text.contains('\x0C') {
        text.split('\x0C')
            .enumerate()
            .filter(|(_, page_text)| !page_text.trim().is_empty())
            .map(|(i, page_text)| Page {
                page_index: i,
                text: page_text.trim().to_string(),
            })
            .collect()
    } else {
        // No page breaks found, treat as a single page
        vec![Page {
            page_index: 0,
            text: trimmed.to_string(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_feeds_separate_pages() {
        let pages = split_pages("第一页\x0C\x0C第三页\x0C");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_index, 0);
        assert_eq!(pages[1].page_index, 2);
        assert_eq!(pages[1].text, "第三页");
    }

    #[test]
    fn no_form_feed_is_single_page() {
        let pages = split_pages("  only page  ");
        assert_eq!(pages, vec![Page { page_index: 0, text: "only page".into() }]);
    }

    #[test]
    fn blank_text_yields_no_pages() {
        assert!(split_pages(" \n\x0C ").is_empty());
    }
}
