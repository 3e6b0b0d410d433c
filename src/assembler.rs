//! All-or-nothing reassembly of page results into document text.

use crate::document::{DocumentResult, PageResult};
use std::collections::BTreeMap;

/// Blank line between consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Walk `0..page_count` in order. The first failed (or missing) page fails
/// the whole document and no text is produced.
pub fn assemble(page_count: usize, mut results: BTreeMap<usize, PageResult>) -> DocumentResult {
    let mut texts = Vec::with_capacity(page_count);

    for index in 0..page_count {
        match results.remove(&index) {
            Some(PageResult::Text(text)) => texts.push(text),
            Some(PageResult::Failed(failure)) => {
                return DocumentResult::Failed {
                    page_index: index,
                    reason: format!("{} (after {} attempts)", failure.reason, failure.attempts),
                };
            }
            None => {
                return DocumentResult::Failed {
                    page_index: index,
                    reason: "no result for page".to_string(),
                };
            }
        }
    }

    DocumentResult::Complete(texts.join(PAGE_SEPARATOR))
}
