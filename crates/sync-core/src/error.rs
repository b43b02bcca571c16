use thiserror::Error;

/// Precondition failures that stop an alignment pass before it starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlignError {
    #[error("document has no blocks")]
    EmptyDocument,
    #[error("anchor block `{block_id}` is not part of the document")]
    UnknownAnchorBlock { block_id: String },
    #[error("anchor segment {index} is out of range (segment count {count})")]
    AnchorSegmentOutOfRange { index: usize, count: usize },
    #[error("block id `{block_id}` appears more than once")]
    DuplicateBlockId { block_id: String },
}

/// Rejections raised while validating a transcript segment list.
#[derive(Debug, Error, PartialEq)]
pub enum SegmentError {
    #[error("segment at position {position} carries index {index}")]
    NonContiguousIndex { position: usize, index: usize },
    #[error("segment {index} has invalid bounds start={start} end={end}")]
    InvalidBounds { index: usize, start: f64, end: f64 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("TOML error while {context}: {message}")]
    Toml {
        context: &'static str,
        message: String,
    },
    #[error("document `{doc_id}` has no raw data; import it first")]
    NotImported { doc_id: String },
    #[error("batch of {len} entries exceeds the limit of {limit}")]
    BatchTooLarge { len: usize, limit: usize },
    #[error("segment index {index} is out of range (segment count {count})")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("refusing to snapshot `{doc_id}` without a persisted mapping")]
    SnapshotWithoutMapping { doc_id: String },
    #[error(transparent)]
    Segments(#[from] SegmentError),
}

impl StoreError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn toml(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Toml {
            context,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Precondition(#[from] AlignError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("batch of {entries} mappings failed after {attempts} attempts: {source}")]
    BatchFailed {
        entries: usize,
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("matching cancelled after {processed} segments")]
    Cancelled { processed: usize },
}

/// Soft playback failures; they never alter tracker or mapping state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("playback failed: {0}")]
    Play(String),
}
