//! Forward-only containment alignment of transcript segments onto blocks.
//!
//! One pass walks the segments from the anchor onward while a block cursor
//! only ever moves forward. Each segment claims the first unclaimed occurrence
//! of its normalized text in the first block (from the cursor) that still has
//! one; the match is written back into the block as a tagged run or, for
//! blocks with styled children, as a whole-block tag.

use crate::document::{AnnotatedDocument, Block, SegmentTag};
use crate::error::AlignError;
use crate::normalize::{NormalizedText, normalize, normalize_for_matching};
use crate::segment::Segment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, trace};
use ts_rs::TS;

pub const DEFAULT_MIN_BLOCK_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Anchor {
    pub start_block_id: String,
    pub start_segment_index: usize,
}

impl Anchor {
    pub fn new(start_block_id: impl Into<String>, start_segment_index: usize) -> Self {
        Self {
            start_block_id: start_block_id.into(),
            start_segment_index,
        }
    }
}

/// Sparse `segment index -> block id` assignment. Absent keys are unmapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignmentMapping {
    entries: BTreeMap<usize, String>,
}

impl AlignmentMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(&index).map(String::as_str)
    }

    pub fn insert(&mut self, index: usize, block_id: impl Into<String>) {
        self.entries.insert(index, block_id.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries
            .iter()
            .map(|(index, block_id)| (*index, block_id.as_str()))
    }

    /// Dense form with `None` for unmapped indices, as the cache stores it.
    pub fn to_dense(&self, segment_count: usize) -> Vec<Option<String>> {
        (0..segment_count)
            .map(|index| self.entries.get(&index).cloned())
            .collect()
    }

    pub fn from_dense(dense: Vec<Option<String>>) -> Self {
        let entries = dense
            .into_iter()
            .enumerate()
            .filter_map(|(index, block_id)| block_id.map(|id| (index, id)))
            .collect();
        Self { entries }
    }

    /// Mapped block positions never decrease as the segment index grows.
    pub fn is_monotonic(&self, blocks: &[Block]) -> bool {
        let positions: BTreeMap<&str, usize> = blocks
            .iter()
            .enumerate()
            .map(|(pos, block)| (block.id.as_str(), pos))
            .collect();
        let mut last = 0;
        for block_id in self.entries.values() {
            let Some(&pos) = positions.get(block_id.as_str()) else {
                return false;
            };
            if pos < last {
                return false;
            }
            last = pos;
        }
        true
    }
}

impl FromIterator<(usize, String)> for AlignmentMapping {
    fn from_iter<T: IntoIterator<Item = (usize, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    Matched { index: usize, block_id: String },
    Missed { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct MatchProgress {
    pub processed: usize,
    pub matched: usize,
    pub total: usize,
    pub remaining: usize,
}

impl MatchProgress {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed as f64 / self.total as f64) * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentResult {
    pub mapping: AlignmentMapping,
    pub matched_count: usize,
    pub annotated: AnnotatedDocument,
}

/// Incremental alignment pass over an owned copy of the blocks.
pub struct Aligner<'a> {
    blocks: Vec<Block>,
    normalized: Vec<Option<NormalizedText>>,
    segments: &'a [Segment],
    cursor: usize,
    next_segment: usize,
    start_segment: usize,
    min_block_chars: usize,
    mapping: AlignmentMapping,
    matched: usize,
}

/// Check that a pass over `blocks` and `segments` can start at `anchor`.
///
/// Returns the position of the anchor block.
pub fn validate(
    blocks: &[Block],
    segments: &[Segment],
    anchor: &Anchor,
) -> Result<usize, AlignError> {
    if blocks.is_empty() {
        return Err(AlignError::EmptyDocument);
    }
    let mut seen = HashSet::with_capacity(blocks.len());
    for block in blocks {
        if !seen.insert(block.id.as_str()) {
            return Err(AlignError::DuplicateBlockId {
                block_id: block.id.clone(),
            });
        }
    }
    let position = blocks
        .iter()
        .position(|block| block.id == anchor.start_block_id)
        .ok_or_else(|| AlignError::UnknownAnchorBlock {
            block_id: anchor.start_block_id.clone(),
        })?;
    if anchor.start_segment_index >= segments.len() {
        return Err(AlignError::AnchorSegmentOutOfRange {
            index: anchor.start_segment_index,
            count: segments.len(),
        });
    }
    Ok(position)
}

impl<'a> Aligner<'a> {
    pub fn new(
        blocks: &[Block],
        segments: &'a [Segment],
        anchor: &Anchor,
        min_block_chars: usize,
    ) -> Result<Self, AlignError> {
        let cursor = validate(blocks, segments, anchor)?;

        debug!(
            blocks = blocks.len(),
            segments = segments.len(),
            start_block = %anchor.start_block_id,
            start_segment = anchor.start_segment_index,
            "Alignment pass prepared"
        );

        Ok(Self {
            blocks: blocks.to_vec(),
            normalized: vec![None; blocks.len()],
            segments,
            cursor,
            next_segment: anchor.start_segment_index,
            start_segment: anchor.start_segment_index,
            min_block_chars,
            mapping: AlignmentMapping::new(),
            matched: 0,
        })
    }

    pub fn progress(&self) -> MatchProgress {
        let total = self.segments.len() - self.start_segment;
        let processed = self.next_segment - self.start_segment;
        MatchProgress {
            processed,
            matched: self.matched,
            total,
            remaining: total - processed,
        }
    }

    /// Position of the block the last match landed in, or the anchor block.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Process the next segment. `None` once every segment has been seen.
    pub fn step(&mut self) -> Option<SegmentOutcome> {
        let segments = self.segments;
        let segment = segments.get(self.next_segment)?;
        self.next_segment += 1;
        let index = segment.index;

        let needle = normalize_for_matching(&segment.text);
        if needle.is_empty() {
            trace!(index, "Segment has no comparable text");
            return Some(SegmentOutcome::Missed { index });
        }

        let tag = SegmentTag {
            segment_index: index,
            start_time: segment.start,
        };
        for pos in self.cursor..self.blocks.len() {
            if self.try_claim(pos, &needle, tag) {
                self.cursor = pos;
                self.matched += 1;
                let block_id = self.blocks[pos].id.clone();
                self.mapping.insert(index, block_id.clone());
                trace!(index, block = %block_id, "Segment matched");
                return Some(SegmentOutcome::Matched { index, block_id });
            }
        }

        trace!(index, "Segment not found after cursor");
        Some(SegmentOutcome::Missed { index })
    }

    pub fn finish(mut self) -> AlignmentResult {
        while self.step().is_some() {}
        info!(
            matched = self.matched,
            total = self.segments.len() - self.start_segment,
            "Alignment pass finished"
        );
        AlignmentResult {
            mapping: self.mapping,
            matched_count: self.matched,
            annotated: AnnotatedDocument {
                blocks: self.blocks,
                segment_count: self.segments.len(),
            },
        }
    }

    fn try_claim(&mut self, pos: usize, needle: &str, tag: SegmentTag) -> bool {
        let blocks = &self.blocks;
        let normalized = self.normalized[pos]
            .get_or_insert_with(|| normalize(&blocks[pos].text_content()));
        if normalized.char_len() < self.min_block_chars || !normalized.contains(needle) {
            return false;
        }

        let block = &mut self.blocks[pos];
        if block.has_styled_children {
            return block.tag_whole(tag);
        }
        if block.is_tagged() {
            return false;
        }
        normalized
            .occurrences(needle)
            .into_iter()
            .filter_map(|at| normalized.raw_range(at..at + needle.len()))
            .find(|range| !block.overlaps_claimed(range))
            .is_some_and(|range| block.carve(range, tag))
    }
}

/// Run a whole pass with the default minimum block length.
pub fn align(
    blocks: &[Block],
    segments: &[Segment],
    anchor: &Anchor,
) -> Result<AlignmentResult, AlignError> {
    Ok(Aligner::new(blocks, segments, anchor, DEFAULT_MIN_BLOCK_CHARS)?.finish())
}
