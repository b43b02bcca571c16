//! File-backed [`AlignmentStore`].
//!
//! Each document gets its own directory under the cache root, named by the
//! SHA-256 of the document id so arbitrary ids stay filesystem-safe:
//!
//! - `record.toml`: title, author, resume position, anchor, bookmark
//! - `blocks.json` / `segments.json`: the raw data set from import
//! - `mapping.json`: dense mapping, `null` for unmapped segments
//! - `snapshot.json`: annotated blocks from the last complete pass
//!
//! Files are written to a sibling temp file and renamed into place, so a
//! reader sees either the previous or the new content of a file.

use crate::align::{AlignmentMapping, Anchor};
use crate::document::{AnnotatedDocument, Block};
use crate::error::StoreError;
use crate::segment::{Segment, SegmentList};
use crate::store::{
    AlignmentStore, Bookmark, CacheState, DEFAULT_BATCH_SIZE, DocumentRecord, LoadedDocument,
    MappingEntry,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RECORD_FILE: &str = "record.toml";
const BLOCKS_FILE: &str = "blocks.json";
const SEGMENTS_FILE: &str = "segments.json";
const MAPPING_FILE: &str = "mapping.json";
const SNAPSHOT_FILE: &str = "snapshot.json";

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    batch_size: usize,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn doc_dir(&self, doc_id: &str) -> PathBuf {
        hash_dir(&self.root, doc_id)
    }

    fn file(&self, doc_id: &str, name: &str) -> PathBuf {
        self.doc_dir(doc_id).join(name)
    }

    fn read_record(&self, doc_id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let path = self.file(doc_id, RECORD_FILE);
        let Some(data) = read_optional(&path)? else {
            return Ok(None);
        };
        toml::from_str(&data)
            .map(Some)
            .map_err(|err| StoreError::toml("reading document record", err))
    }

    fn write_record(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        let contents = toml::to_string(record)
            .map_err(|err| StoreError::toml("writing document record", err))?;
        write_atomic(&self.file(&record.doc_id, RECORD_FILE), contents.as_bytes())
    }

    fn require_record(&self, doc_id: &str) -> Result<DocumentRecord, StoreError> {
        self.read_record(doc_id)?
            .ok_or_else(|| StoreError::NotImported {
                doc_id: doc_id.to_string(),
            })
    }

    fn read_dense_mapping(&self, doc_id: &str) -> Result<Option<Vec<Option<String>>>, StoreError> {
        read_json(&self.file(doc_id, MAPPING_FILE), "reading mapping")
    }

    fn write_dense_mapping(&self, doc_id: &str, dense: &[Option<String>]) -> Result<(), StoreError> {
        write_json(&self.file(doc_id, MAPPING_FILE), dense, "writing mapping")
    }

    fn remove_snapshot(&self, doc_id: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.file(doc_id, SNAPSHOT_FILE)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io("removing rendered snapshot", err)),
        }
    }
}

impl AlignmentStore for CacheStore {
    fn load_for_alignment(&self, doc_id: &str) -> Result<LoadedDocument, StoreError> {
        let record = self
            .read_record(doc_id)?
            .unwrap_or_else(|| DocumentRecord::new(doc_id));
        let blocks: Option<Vec<Block>> =
            read_json(&self.file(doc_id, BLOCKS_FILE), "reading blocks")?;
        let segments: Option<Vec<Segment>> =
            read_json(&self.file(doc_id, SEGMENTS_FILE), "reading segments")?;

        let (Some(blocks), Some(segments)) = (blocks, segments) else {
            debug!(doc_id, "No raw data cached");
            return Ok(LoadedDocument {
                record,
                blocks: Vec::new(),
                segments: SegmentList::default(),
                mapping: AlignmentMapping::new(),
                cache_state: CacheState::Unprocessed,
            });
        };
        let segments = SegmentList::new(segments)?;
        let mapping = self
            .read_dense_mapping(doc_id)?
            .map(AlignmentMapping::from_dense)
            .unwrap_or_default();

        if mapping.is_empty() {
            return Ok(LoadedDocument {
                record,
                blocks,
                segments,
                mapping,
                cache_state: CacheState::RawCached,
            });
        }

        let snapshot: Option<AnnotatedDocument> =
            read_json(&self.file(doc_id, SNAPSHOT_FILE), "reading rendered snapshot")?;
        let (blocks, cache_state) = match snapshot {
            Some(snapshot) => (snapshot.blocks, CacheState::RenderedCached),
            None => (blocks, CacheState::Matched),
        };
        debug!(doc_id, ?cache_state, mapped = mapping.len(), "Loaded cached document");
        Ok(LoadedDocument {
            record,
            blocks,
            segments,
            mapping,
            cache_state,
        })
    }

    fn store_raw(
        &self,
        record: &DocumentRecord,
        blocks: &[Block],
        segments: &SegmentList,
    ) -> Result<(), StoreError> {
        let doc_id = record.doc_id.as_str();
        write_json(&self.file(doc_id, BLOCKS_FILE), &blocks, "writing blocks")?;
        write_json(
            &self.file(doc_id, SEGMENTS_FILE),
            segments.as_slice(),
            "writing segments",
        )?;
        self.write_dense_mapping(doc_id, &vec![None; segments.len()])?;
        self.remove_snapshot(doc_id)?;
        self.write_record(record)?;
        info!(
            doc_id,
            blocks = blocks.len(),
            segments = segments.len(),
            "Stored raw document data"
        );
        Ok(())
    }

    fn save_mapping_batch(
        &self,
        doc_id: &str,
        entries: &[MappingEntry],
    ) -> Result<(), StoreError> {
        if entries.len() > self.batch_size {
            return Err(StoreError::BatchTooLarge {
                len: entries.len(),
                limit: self.batch_size,
            });
        }
        let dense = self
            .read_dense_mapping(doc_id)?
            .ok_or_else(|| StoreError::NotImported {
                doc_id: doc_id.to_string(),
            })?;
        let count = dense.len();
        if let Some(entry) = entries.iter().find(|entry| entry.index >= count) {
            return Err(StoreError::IndexOutOfRange {
                index: entry.index,
                count,
            });
        }
        let mut mapping = AlignmentMapping::from_dense(dense);
        for entry in entries {
            mapping.insert(entry.index, entry.block_id.clone());
        }
        self.write_dense_mapping(doc_id, &mapping.to_dense(count))?;
        debug!(doc_id, entries = entries.len(), "Committed mapping batch");
        Ok(())
    }

    fn save_anchor(&self, doc_id: &str, anchor: &Anchor) -> Result<(), StoreError> {
        let mut record = self.require_record(doc_id)?;
        record.anchor = Some(anchor.clone());
        self.write_record(&record)
    }

    fn save_rendered_snapshot(
        &self,
        doc_id: &str,
        annotated: &AnnotatedDocument,
    ) -> Result<(), StoreError> {
        let has_mapping = self
            .read_dense_mapping(doc_id)?
            .is_some_and(|dense| dense.iter().any(Option::is_some));
        if !has_mapping {
            return Err(StoreError::SnapshotWithoutMapping {
                doc_id: doc_id.to_string(),
            });
        }
        write_json(
            &self.file(doc_id, SNAPSHOT_FILE),
            annotated,
            "writing rendered snapshot",
        )?;
        info!(doc_id, blocks = annotated.blocks.len(), "Saved rendered snapshot");
        Ok(())
    }

    fn invalidate(&self, doc_id: &str) -> Result<(), StoreError> {
        self.remove_snapshot(doc_id)?;
        if let Some(dense) = self.read_dense_mapping(doc_id)? {
            self.write_dense_mapping(doc_id, &AlignmentMapping::new().to_dense(dense.len()))?;
        }
        info!(doc_id, "Invalidated alignment cache");
        Ok(())
    }

    fn clear_all_for_document(&self, doc_id: &str) -> Result<(), StoreError> {
        match fs::remove_dir_all(self.doc_dir(doc_id)) {
            Ok(()) => {
                info!(doc_id, "Cleared cached document");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io("clearing document cache", err)),
        }
    }

    fn load_record(&self, doc_id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        self.read_record(doc_id)
    }

    fn save_bookmark(&self, doc_id: &str, bookmark: Bookmark) -> Result<(), StoreError> {
        let mut record = self.require_record(doc_id)?;
        record.bookmark = Some(bookmark);
        self.write_record(&record)?;
        debug!(doc_id, segment = bookmark.segment_index, time = bookmark.time, "Saved bookmark");
        Ok(())
    }

    fn save_position(&self, doc_id: &str, seconds: f64) -> Result<(), StoreError> {
        let mut record = self.require_record(doc_id)?;
        record.last_position = seconds;
        self.write_record(&record)
    }
}

pub fn hash_dir(root: &Path, doc_id: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    root.join(hash)
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::io("reading cache file", err)),
    }
}

fn read_json<T: DeserializeOwned>(
    path: &Path,
    context: &'static str,
) -> Result<Option<T>, StoreError> {
    let Some(data) = read_optional(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|err| StoreError::json(context, err))
}

fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    context: &'static str,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value).map_err(|err| StoreError::json(context, err))?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| StoreError::io("creating cache dir", err))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|err| StoreError::io("writing temp file", err))?;
    if let Err(err) = fs::rename(&tmp, path) {
        warn!(path = %path.display(), "Failed to move temp file into place: {err}");
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io("renaming temp file", err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SegmentTag;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_store(label: &str) -> CacheStore {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after epoch")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("sync-core-cache-{label}-{nonce}"));
        let _ = fs::remove_dir_all(&root);
        CacheStore::new(root)
    }

    fn import(store: &CacheStore, doc_id: &str) -> (Vec<Block>, SegmentList) {
        let blocks = vec![Block::plain("b1", "Hello world"), Block::plain("b2", "Again")];
        let segments = SegmentList::new(vec![
            Segment::new(0, "Hello", 0.0, 1.0),
            Segment::new(1, "world", 1.0, 2.0),
            Segment::new(2, "Again", 2.0, 3.0),
        ])
        .expect("segments should be valid");
        let mut record = DocumentRecord::new(doc_id);
        record.title = "Test Book".to_string();
        store
            .store_raw(&record, &blocks, &segments)
            .expect("raw data should be stored");
        (blocks, segments)
    }

    #[test]
    fn unknown_document_is_unprocessed() {
        let store = temp_store("unknown");
        let loaded = store.load_for_alignment("missing").expect("load should work");
        assert_eq!(loaded.cache_state, CacheState::Unprocessed);
        assert!(loaded.blocks.is_empty());
        assert_eq!(loaded.record.doc_id, "missing");
    }

    #[test]
    fn raw_import_round_trips() {
        let store = temp_store("raw");
        let (blocks, segments) = import(&store, "book");

        let loaded = store.load_for_alignment("book").expect("load should work");
        assert_eq!(loaded.cache_state, CacheState::RawCached);
        assert_eq!(loaded.blocks, blocks);
        assert_eq!(loaded.segments, segments);
        assert!(loaded.mapping.is_empty());
        assert_eq!(loaded.record.title, "Test Book");
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn mapping_batches_accumulate() {
        let store = temp_store("batches");
        import(&store, "book");

        store
            .save_mapping_batch("book", &[MappingEntry::new(0, "b1"), MappingEntry::new(1, "b1")])
            .expect("first batch should commit");
        store
            .save_mapping_batch("book", &[MappingEntry::new(2, "b2")])
            .expect("second batch should commit");

        let loaded = store.load_for_alignment("book").expect("load should work");
        assert_eq!(loaded.cache_state, CacheState::Matched);
        assert_eq!(loaded.mapping.get(0), Some("b1"));
        assert_eq!(loaded.mapping.get(1), Some("b1"));
        assert_eq!(loaded.mapping.get(2), Some("b2"));
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn batch_at_the_size_limit_round_trips() {
        let store = temp_store("full-batch").with_batch_size(3);
        import(&store, "book");

        let entries = [
            MappingEntry::new(0, "b1"),
            MappingEntry::new(1, "b1"),
            MappingEntry::new(2, "b2"),
        ];
        store
            .save_mapping_batch("book", &entries)
            .expect("batch at the limit should commit");

        let loaded = store.load_for_alignment("book").expect("load should work");
        let stored: Vec<_> = loaded
            .mapping
            .iter()
            .map(|(index, block_id)| MappingEntry::new(index, block_id))
            .collect();
        assert_eq!(stored, entries);
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn invalid_batches_leave_the_mapping_untouched() {
        let store = temp_store("invalid").with_batch_size(2);
        import(&store, "book");

        let oversized = [
            MappingEntry::new(0, "b1"),
            MappingEntry::new(1, "b1"),
            MappingEntry::new(2, "b2"),
        ];
        assert!(matches!(
            store.save_mapping_batch("book", &oversized),
            Err(StoreError::BatchTooLarge { len: 3, limit: 2 })
        ));
        assert!(matches!(
            store.save_mapping_batch("book", &[MappingEntry::new(0, "b1"), MappingEntry::new(9, "b2")]),
            Err(StoreError::IndexOutOfRange { index: 9, count: 3 })
        ));
        assert!(matches!(
            store.save_mapping_batch("other", &[MappingEntry::new(0, "b1")]),
            Err(StoreError::NotImported { .. })
        ));

        let loaded = store.load_for_alignment("book").expect("load should work");
        assert!(loaded.mapping.is_empty());
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn snapshot_requires_mapping_and_is_served_when_fresh() {
        let store = temp_store("snapshot");
        let (blocks, _) = import(&store, "book");
        let mut annotated = AnnotatedDocument {
            blocks: blocks.clone(),
            segment_count: 3,
        };
        annotated.blocks[1].tag_whole(SegmentTag {
            segment_index: 2,
            start_time: 2.0,
        });

        assert!(matches!(
            store.save_rendered_snapshot("book", &annotated),
            Err(StoreError::SnapshotWithoutMapping { .. })
        ));

        store
            .save_mapping_batch("book", &[MappingEntry::new(2, "b2")])
            .expect("batch should commit");
        store
            .save_rendered_snapshot("book", &annotated)
            .expect("snapshot should save");

        let loaded = store.load_for_alignment("book").expect("load should work");
        assert_eq!(loaded.cache_state, CacheState::RenderedCached);
        assert_eq!(loaded.blocks, annotated.blocks);
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn invalidate_resets_to_raw_and_is_idempotent() {
        let store = temp_store("invalidate");
        let (blocks, _) = import(&store, "book");
        store
            .save_mapping_batch("book", &[MappingEntry::new(0, "b1")])
            .expect("batch should commit");
        store
            .save_rendered_snapshot(
                "book",
                &AnnotatedDocument {
                    blocks: blocks.clone(),
                    segment_count: 3,
                },
            )
            .expect("snapshot should save");

        store.invalidate("book").expect("invalidate should work");
        store.invalidate("book").expect("second invalidate should work");
        store.invalidate("never-imported").expect("unknown docs are a no-op");

        let loaded = store.load_for_alignment("book").expect("load should work");
        assert_eq!(loaded.cache_state, CacheState::RawCached);
        assert!(loaded.mapping.is_empty());
        assert_eq!(loaded.blocks, blocks);
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn record_updates_and_clear() {
        let store = temp_store("record");
        import(&store, "book");

        store
            .save_bookmark(
                "book",
                Bookmark {
                    segment_index: 1,
                    time: 1.25,
                },
            )
            .expect("bookmark should save");
        store.save_position("book", 42.5).expect("position should save");
        store
            .save_anchor("book", &Anchor::new("b1", 0))
            .expect("anchor should save");

        let record = store
            .load_record("book")
            .expect("record should load")
            .expect("record should exist");
        assert_eq!(record.bookmark.map(|b| b.segment_index), Some(1));
        assert_eq!(record.last_position, 42.5);
        assert_eq!(record.anchor, Some(Anchor::new("b1", 0)));
        assert_eq!(record.title, "Test Book");

        assert!(matches!(
            store.save_position("other", 1.0),
            Err(StoreError::NotImported { .. })
        ));

        store.clear_all_for_document("book").expect("clear should work");
        store.clear_all_for_document("book").expect("clear is idempotent");
        assert!(store.load_record("book").expect("load should work").is_none());
        let loaded = store.load_for_alignment("book").expect("load should work");
        assert_eq!(loaded.cache_state, CacheState::Unprocessed);
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn document_dirs_are_hashed_ids() {
        let store = temp_store("hash");
        let dir = store.doc_dir("some/odd:id");
        let name = dir
            .file_name()
            .and_then(|name| name.to_str())
            .expect("hash dir should have a name");
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_ne!(dir, store.doc_dir("some/odd:id2"));
    }
}
