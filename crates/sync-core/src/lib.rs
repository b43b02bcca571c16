//! Text–audio synchronization engine.
//!
//! Aligns a timed transcript with the blocks of a document, persists the
//! result through an [`store::AlignmentStore`], and tracks playback against
//! the aligned segments.

pub mod align;
pub mod bindings;
pub mod cache;
pub mod cancellation;
pub mod config;
pub mod document;
pub mod error;
pub mod matching;
pub mod normalize;
pub mod segment;
pub mod store;
pub mod tracker;

pub use align::{Aligner, AlignmentMapping, AlignmentResult, Anchor, MatchProgress, align};
pub use cache::CacheStore;
pub use cancellation::CancellationToken;
pub use config::{SyncConfig, load_config};
pub use document::{AnnotatedDocument, Block, RunKind, SegmentTag, TextRun};
pub use error::{AlignError, MatchError, PlaybackError, SegmentError, StoreError};
pub use matching::{MatchSummary, MatchingJob};
pub use segment::{Segment, SegmentList};
pub use store::{AlignmentStore, Bookmark, CacheState, DocumentRecord, LoadedDocument};
pub use tracker::{
    Clock, Effect, MediaTransport, PlaybackCommand, PlaybackEvent, PlaybackSession,
    PlaybackTracker, SystemClock,
};
