//! Persistence contract for alignment data and the per-document cache state.

use crate::align::{AlignmentMapping, Anchor};
use crate::document::{AnnotatedDocument, Block};
use crate::error::StoreError;
use crate::segment::SegmentList;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Unprocessed,
    RawCached,
    Matched,
    RenderedCached,
}

impl CacheState {
    /// States holding mapping data that a new pass must discard first.
    pub fn needs_invalidation(self) -> bool {
        matches!(self, Self::Matched | Self::RenderedCached)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
pub struct Bookmark {
    pub segment_index: usize,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
pub struct DocumentRecord {
    pub doc_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub last_position: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub anchor: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub bookmark: Option<Bookmark>,
}

impl DocumentRecord {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            ..Self::default()
        }
    }
}

/// Everything a pass or a reader view needs for one document.
///
/// `blocks` holds the annotated snapshot when the state is
/// [`CacheState::RenderedCached`] and the raw blocks otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub record: DocumentRecord,
    pub blocks: Vec<Block>,
    pub segments: SegmentList,
    pub mapping: AlignmentMapping,
    pub cache_state: CacheState,
}

/// One `segment index -> block id` assignment inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub index: usize,
    pub block_id: String,
}

impl MappingEntry {
    pub fn new(index: usize, block_id: impl Into<String>) -> Self {
        Self {
            index,
            block_id: block_id.into(),
        }
    }
}

pub trait AlignmentStore {
    fn load_for_alignment(&self, doc_id: &str) -> Result<LoadedDocument, StoreError>;

    fn store_raw(
        &self,
        record: &DocumentRecord,
        blocks: &[Block],
        segments: &SegmentList,
    ) -> Result<(), StoreError>;

    /// Commit one bounded batch atomically; earlier batches are unaffected
    /// by a failure here.
    fn save_mapping_batch(&self, doc_id: &str, entries: &[MappingEntry])
    -> Result<(), StoreError>;

    fn save_anchor(&self, doc_id: &str, anchor: &Anchor) -> Result<(), StoreError>;

    fn save_rendered_snapshot(
        &self,
        doc_id: &str,
        annotated: &AnnotatedDocument,
    ) -> Result<(), StoreError>;

    /// Drop the snapshot and reset every mapping entry. Idempotent.
    fn invalidate(&self, doc_id: &str) -> Result<(), StoreError>;

    fn clear_all_for_document(&self, doc_id: &str) -> Result<(), StoreError>;

    fn load_record(&self, doc_id: &str) -> Result<Option<DocumentRecord>, StoreError>;

    fn save_bookmark(&self, doc_id: &str, bookmark: Bookmark) -> Result<(), StoreError>;

    fn save_position(&self, doc_id: &str, seconds: f64) -> Result<(), StoreError>;
}
