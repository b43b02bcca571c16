//! Comparison-text normalization for matching.
//!
//! Both block text and segment text go through [`normalize`]: NFKC, every
//! whitespace run collapsed to one space, ends trimmed. The result keeps a map
//! from each normalized character back to the byte range of the source text it
//! came from, so a match found in normalized space can be carved out of the
//! raw runs.

use std::ops::Range;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    origins: Vec<CharOrigin>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CharOrigin {
    normalized_start: usize,
    raw: Range<usize>,
}

pub fn normalize(raw: &str) -> NormalizedText {
    let mut text = String::with_capacity(raw.len());
    let mut origins = Vec::with_capacity(raw.len());
    let mut pending_space: Option<Range<usize>> = None;

    // Graphemes are normalized one at a time; composition never crosses a
    // grapheme boundary, and each output char can then point at its source.
    for (offset, grapheme) in raw.grapheme_indices(true) {
        let raw_range = offset..offset + grapheme.len();
        for ch in grapheme.nfkc() {
            if ch.is_whitespace() {
                if !text.is_empty() && pending_space.is_none() {
                    pending_space = Some(raw_range.clone());
                }
                continue;
            }
            if let Some(space) = pending_space.take() {
                origins.push(CharOrigin {
                    normalized_start: text.len(),
                    raw: space,
                });
                text.push(' ');
            }
            origins.push(CharOrigin {
                normalized_start: text.len(),
                raw: raw_range.clone(),
            });
            text.push(ch);
        }
    }

    NormalizedText { text, origins }
}

/// Normalized form only, for texts that never need carving.
pub fn normalize_for_matching(raw: &str) -> String {
    normalize(raw).text
}

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn char_len(&self) -> usize {
        self.origins.len()
    }

    pub fn contains(&self, needle: &str) -> bool {
        !needle.is_empty() && self.text.contains(needle)
    }

    /// Byte offsets of every occurrence of `needle`, overlapping ones included.
    pub fn occurrences(&self, needle: &str) -> Vec<usize> {
        let mut found = Vec::new();
        if needle.is_empty() {
            return found;
        }
        let mut from = 0;
        while let Some(pos) = self.text[from..].find(needle) {
            let at = from + pos;
            found.push(at);
            let step = self.text[at..].chars().next().map_or(1, char::len_utf8);
            from = at + step;
            if from >= self.text.len() {
                break;
            }
        }
        found
    }

    /// Map a normalized byte range back onto the raw text it was built from.
    pub fn raw_range(&self, normalized: Range<usize>) -> Option<Range<usize>> {
        if normalized.start >= normalized.end {
            return None;
        }
        let first = self
            .origins
            .binary_search_by_key(&normalized.start, |origin| origin.normalized_start)
            .ok()?;
        let last = self
            .origins
            .partition_point(|origin| origin.normalized_start < normalized.end)
            .checked_sub(1)?;
        if last < first {
            return None;
        }
        Some(self.origins[first].raw.start..self.origins[last].raw.end)
    }
}
