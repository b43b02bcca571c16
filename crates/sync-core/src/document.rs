//! Document model consumed by the aligner.
//!
//! A block is an ordered list of text runs. Runs are either base text or
//! annotation glosses (ruby readings and the like); annotation runs are kept
//! for rendering but never take part in matching. Alignment tags either a
//! whole block or a carved-out run with the segment it belongs to.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use ts_rs::TS;

/// Click target payload: the segment a block or run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
pub struct SegmentTag {
    pub segment_index: usize,
    pub start_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    #[default]
    Text,
    Annotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub kind: RunKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub tag: Option<SegmentTag>,
}

impl TextRun {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: RunKind::Text,
            tag: None,
        }
    }

    pub fn annotation(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: RunKind::Annotation,
            tag: None,
        }
    }

    /// Annotation subtrees are excluded from match text and carving.
    pub fn is_annotation(&self) -> bool {
        self.kind == RunKind::Annotation
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct Block {
    pub id: String,
    pub runs: Vec<TextRun>,
    #[serde(default)]
    pub has_styled_children: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub tag: Option<SegmentTag>,
}

impl Block {
    pub fn new(id: impl Into<String>, runs: Vec<TextRun>, has_styled_children: bool) -> Self {
        Self {
            id: id.into(),
            runs,
            has_styled_children,
            tag: None,
        }
    }

    /// Single-run block without styled children.
    pub fn plain(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, vec![TextRun::text(text)], false)
    }

    /// Base text: every non-annotation run, in order.
    pub fn text_content(&self) -> String {
        self.runs
            .iter()
            .filter(|run| !run.is_annotation())
            .map(|run| run.text.as_str())
            .collect()
    }

    pub fn is_tagged(&self) -> bool {
        self.tag.is_some()
    }

    /// Base-text byte ranges already claimed by tagged runs.
    pub fn claimed_ranges(&self) -> Vec<Range<usize>> {
        let mut offset = 0;
        let mut claimed = Vec::new();
        for run in self.runs.iter().filter(|run| !run.is_annotation()) {
            let end = offset + run.text.len();
            if run.tag.is_some() && end > offset {
                claimed.push(offset..end);
            }
            offset = end;
        }
        claimed
    }

    pub fn overlaps_claimed(&self, range: &Range<usize>) -> bool {
        self.claimed_ranges()
            .iter()
            .any(|claimed| claimed.start < range.end && range.start < claimed.end)
    }

    /// Tag the whole block as one clickable unit. Returns false if it
    /// already carries a tag.
    pub fn tag_whole(&mut self, tag: SegmentTag) -> bool {
        if self.tag.is_some() {
            return false;
        }
        self.tag = Some(tag);
        true
    }

    /// Carve `range` (base-text byte offsets) into its own tagged run.
    ///
    /// The first touched run keeps its leading text, runs fully inside the
    /// range are consumed, the last touched run keeps its trailing text.
    /// Annotation runs inside the range stay in place after the tagged run.
    /// Returns false when the range is empty, out of bounds, not on char
    /// boundaries, or overlaps an existing tag.
    pub fn carve(&mut self, range: Range<usize>, tag: SegmentTag) -> bool {
        let base = self.text_content();
        if range.start >= range.end
            || range.end > base.len()
            || !base.is_char_boundary(range.start)
            || !base.is_char_boundary(range.end)
            || self.overlaps_claimed(&range)
        {
            return false;
        }

        let mut carved = Vec::with_capacity(self.runs.len() + 2);
        let mut inserted = false;
        let mut offset = 0;
        for run in std::mem::take(&mut self.runs) {
            if run.is_annotation() {
                carved.push(run);
                continue;
            }
            let run_start = offset;
            let run_end = offset + run.text.len();
            offset = run_end;
            if run_end <= range.start || run_start >= range.end {
                carved.push(run);
                continue;
            }
            if range.start > run_start {
                carved.push(TextRun::text(&run.text[..range.start - run_start]));
            }
            if !inserted {
                carved.push(TextRun {
                    text: base[range.clone()].to_string(),
                    kind: RunKind::Text,
                    tag: Some(tag),
                });
                inserted = true;
            }
            if range.end < run_end {
                carved.push(TextRun::text(&run.text[range.end - run_start..]));
            }
        }
        self.runs = carved;
        inserted
    }
}

/// Block list after an alignment pass, ready for rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct AnnotatedDocument {
    pub blocks: Vec<Block>,
    pub segment_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(segment_index: usize) -> SegmentTag {
        SegmentTag {
            segment_index,
            start_time: segment_index as f64,
        }
    }

    #[test]
    fn text_content_skips_annotation_runs() {
        let block = Block::new(
            "b1",
            vec![
                TextRun::text("漢"),
                TextRun::annotation("かん"),
                TextRun::text("字"),
            ],
            true,
        );
        assert_eq!(block.text_content(), "漢字");
    }

    #[test]
    fn carve_within_one_run_keeps_surrounding_text() {
        let mut block = Block::plain("b1", "Hello world");
        assert!(block.carve(0..5, tag(0)));
        assert!(block.carve(6..11, tag(1)));

        let texts: Vec<&str> = block.runs.iter().map(|run| run.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", " ", "world"]);
        assert_eq!(block.runs[0].tag, Some(tag(0)));
        assert_eq!(block.runs[1].tag, None);
        assert_eq!(block.runs[2].tag, Some(tag(1)));
        assert_eq!(block.text_content(), "Hello world");
    }

    #[test]
    fn carve_across_runs_truncates_first_and_last() {
        let mut block = Block::new(
            "b1",
            vec![
                TextRun::text("one two"),
                TextRun::text(" three "),
                TextRun::text("four five"),
            ],
            false,
        );
        assert!(block.carve(4..18, tag(3)));

        let texts: Vec<&str> = block.runs.iter().map(|run| run.text.as_str()).collect();
        assert_eq!(texts, vec!["one ", "two three four", " five"]);
        assert_eq!(block.runs[1].tag, Some(tag(3)));
        assert_eq!(block.text_content(), "one two three four five");
    }

    #[test]
    fn carve_keeps_inner_annotations_after_the_tagged_run() {
        let mut block = Block::new(
            "b1",
            vec![
                TextRun::text("ab"),
                TextRun::annotation("gloss"),
                TextRun::text("cd"),
            ],
            false,
        );
        assert!(block.carve(1..3, tag(0)));

        let texts: Vec<&str> = block.runs.iter().map(|run| run.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "bc", "gloss", "d"]);
        assert!(block.runs[2].is_annotation());
    }

    #[test]
    fn carve_refuses_claimed_or_invalid_ranges() {
        let mut block = Block::plain("b1", "AAAA");
        assert!(block.carve(0..2, tag(0)));
        assert!(!block.carve(1..3, tag(1)));
        assert!(!block.carve(2..2, tag(1)));
        assert!(!block.carve(2..9, tag(1)));
        assert!(block.carve(2..4, tag(1)));
        assert_eq!(block.claimed_ranges(), vec![0..2, 2..4]);
    }

    #[test]
    fn whole_block_tag_is_never_replaced() {
        let mut block = Block::plain("b1", "text");
        assert!(block.tag_whole(tag(0)));
        assert!(!block.tag_whole(tag(1)));
        assert_eq!(block.tag, Some(tag(0)));
    }
}
