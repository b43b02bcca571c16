//! Command-line front end for the synchronization engine.
//!
//! Responsibilities here are intentionally minimal:
//! - Parse command-line arguments.
//! - Load configuration from `conf/config.toml` and apply its log level.
//! - Wire the file-backed cache into the matching job and playback tracker.

use anyhow::{Context, Result, anyhow, bail};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use sync_core::config::DEFAULT_CONFIG_PATH;
use sync_core::{
    AlignmentStore, Anchor, Block, Bookmark, CacheStore, CancellationToken, DocumentRecord,
    MatchingJob, PlaybackSession, PlaybackTracker, Segment, SegmentList, SyncConfig, load_config,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const USAGE: &str = "Usage: sync-reader <command> [args]
  import <doc> <blocks.json> <segments.json> [title] [author]
  match <doc> <block-id> <segment-index>
  status <doc>
  invalidate <doc>
  clear <doc>
  locate <doc> <seconds>
  bookmark <doc> <segment-index> <seconds>
  export-bindings <dir>";

#[derive(Debug, PartialEq)]
enum Command {
    Import {
        doc_id: String,
        blocks: PathBuf,
        segments: PathBuf,
        title: String,
        author: String,
    },
    Match {
        doc_id: String,
        anchor: Anchor,
    },
    Status {
        doc_id: String,
    },
    Invalidate {
        doc_id: String,
    },
    Clear {
        doc_id: String,
    },
    Locate {
        doc_id: String,
        seconds: f64,
    },
    Bookmark {
        doc_id: String,
        bookmark: Bookmark,
    },
    ExportBindings {
        dir: PathBuf,
    },
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let command = parse_args(env::args().skip(1))?;
    let config = load_config(Path::new(DEFAULT_CONFIG_PATH));
    set_log_level(reload_handle, config.logging.log_level.as_filter_str());
    info!(
        cache = %config.storage.cache_dir.display(),
        level = %config.logging.log_level,
        "Starting sync reader"
    );

    let store = CacheStore::new(&config.storage.cache_dir).with_batch_size(config.matching.batch_size);
    match command {
        Command::Import {
            doc_id,
            blocks,
            segments,
            title,
            author,
        } => import(&store, doc_id, &blocks, &segments, title, author),
        Command::Match { doc_id, anchor } => run_match(store, &config, &doc_id, &anchor),
        Command::Status { doc_id } => status(&store, &doc_id),
        Command::Invalidate { doc_id } => {
            store.invalidate(&doc_id)?;
            println!("{doc_id}: alignment discarded");
            Ok(())
        }
        Command::Clear { doc_id } => {
            store.clear_all_for_document(&doc_id)?;
            println!("{doc_id}: cache cleared");
            Ok(())
        }
        Command::Locate { doc_id, seconds } => locate(&store, &config, &doc_id, seconds),
        Command::Bookmark { doc_id, bookmark } => save_bookmark(&store, &doc_id, bookmark),
        Command::ExportBindings { dir } => {
            sync_core::bindings::export_ts_bindings(&dir)?;
            println!("exported TS bindings to {}", dir.display());
            Ok(())
        }
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command> {
    let mut args = args.into_iter();
    let name = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let mut next = |what: &str| {
        args.next()
            .ok_or_else(|| anyhow!("Missing <{what}> for `{name}`\n{USAGE}"))
    };

    let command = match name.as_str() {
        "import" => Command::Import {
            doc_id: next("doc")?,
            blocks: PathBuf::from(next("blocks.json")?),
            segments: PathBuf::from(next("segments.json")?),
            title: next("title").unwrap_or_default(),
            author: next("author").unwrap_or_default(),
        },
        "match" => {
            let doc_id = next("doc")?;
            let block_id = next("block-id")?;
            let index = next("segment-index")?;
            Command::Match {
                doc_id,
                anchor: Anchor::new(block_id, parse_index(&index)?),
            }
        }
        "status" => Command::Status {
            doc_id: next("doc")?,
        },
        "invalidate" => Command::Invalidate {
            doc_id: next("doc")?,
        },
        "clear" => Command::Clear {
            doc_id: next("doc")?,
        },
        "locate" => {
            let doc_id = next("doc")?;
            let seconds = next("seconds")?;
            Command::Locate {
                doc_id,
                seconds: parse_seconds(&seconds)?,
            }
        }
        "bookmark" => {
            let doc_id = next("doc")?;
            let index = next("segment-index")?;
            let seconds = next("seconds")?;
            Command::Bookmark {
                doc_id,
                bookmark: Bookmark {
                    segment_index: parse_index(&index)?,
                    time: parse_seconds(&seconds)?,
                },
            }
        }
        "export-bindings" => Command::ExportBindings {
            dir: PathBuf::from(next("dir")?),
        },
        other => bail!("Unknown command `{other}`\n{USAGE}"),
    };
    Ok(command)
}

fn parse_index(raw: &str) -> Result<usize> {
    raw.parse()
        .with_context(|| format!("Invalid segment index `{raw}`"))
}

fn parse_seconds(raw: &str) -> Result<f64> {
    let seconds: f64 = raw
        .parse()
        .with_context(|| format!("Invalid time `{raw}`"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("Time must be a non-negative number of seconds, got `{raw}`");
    }
    Ok(seconds)
}

fn import(
    store: &CacheStore,
    doc_id: String,
    blocks_path: &Path,
    segments_path: &Path,
    title: String,
    author: String,
) -> Result<()> {
    let blocks: Vec<Block> = read_json(blocks_path)?;
    let segments: Vec<Segment> = read_json(segments_path)?;
    let segments = SegmentList::new(segments)
        .with_context(|| format!("Invalid segment list in {}", segments_path.display()))?;

    let mut record = store
        .load_record(&doc_id)?
        .unwrap_or_else(|| DocumentRecord::new(doc_id.as_str()));
    if !title.is_empty() {
        record.title = title;
    }
    if !author.is_empty() {
        record.author = author;
    }
    store.store_raw(&record, &blocks, &segments)?;
    println!(
        "{doc_id}: imported {} blocks and {} segments",
        blocks.len(),
        segments.len()
    );
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

fn run_match(store: CacheStore, config: &SyncConfig, doc_id: &str, anchor: &Anchor) -> Result<()> {
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C; cancelling matching pass");
        handler_token.cancel();
    }) {
        warn!("Failed to install Ctrl+C signal handler: {err}");
    }

    let job = MatchingJob::new(store, &config.matching).with_cancellation(cancel);
    let mut last_reported = 0;
    let summary = job.run(doc_id, anchor, |progress| {
        let pct = progress.percentage() as u32;
        if pct >= last_reported + 10 || progress.is_complete() {
            last_reported = pct;
            info!(
                processed = progress.processed,
                matched = progress.matched,
                remaining = progress.remaining,
                "Matching {pct}%"
            );
        }
    })?;

    println!(
        "{doc_id}: matched {}/{} segments (failed batches: {}, lost entries: {}, snapshot: {})",
        summary.matched,
        summary.total,
        summary.failed_batches,
        summary.lost_entries,
        if summary.snapshot_saved { "saved" } else { "not saved" }
    );
    Ok(())
}

fn status(store: &CacheStore, doc_id: &str) -> Result<()> {
    let loaded = store.load_for_alignment(doc_id)?;
    println!("document:  {doc_id}");
    println!("state:     {:?}", loaded.cache_state);
    if !loaded.record.title.is_empty() {
        println!("title:     {}", loaded.record.title);
    }
    if !loaded.record.author.is_empty() {
        println!("author:    {}", loaded.record.author);
    }
    println!("blocks:    {}", loaded.blocks.len());
    println!(
        "segments:  {} ({} mapped)",
        loaded.segments.len(),
        loaded.mapping.len()
    );
    if let Some(anchor) = &loaded.record.anchor {
        println!(
            "anchor:    block {} / segment {}",
            anchor.start_block_id, anchor.start_segment_index
        );
    }
    if let Some(bookmark) = loaded.record.bookmark {
        println!(
            "bookmark:  segment {} at {:.2}s",
            bookmark.segment_index, bookmark.time
        );
    }
    Ok(())
}

fn locate(store: &CacheStore, config: &SyncConfig, doc_id: &str, seconds: f64) -> Result<()> {
    let loaded = store.load_for_alignment(doc_id)?;
    let mut session = PlaybackSession::from_record(&loaded.record);
    let mut tracker = PlaybackTracker::new(loaded.segments, &config.playback);
    tracker.on_time_update(seconds, &mut session);

    let Some(index) = tracker.current_segment() else {
        println!("{doc_id}: no segment at {seconds:.2}s");
        return Ok(());
    };
    let text = tracker
        .segments()
        .get(index)
        .map(|segment| segment.text.as_str())
        .unwrap_or_default();
    match loaded.mapping.get(index) {
        Some(block_id) => println!("{doc_id}: segment {index} in block {block_id}: {text}"),
        None => println!("{doc_id}: segment {index} (unmapped): {text}"),
    }
    Ok(())
}

fn save_bookmark(store: &CacheStore, doc_id: &str, bookmark: Bookmark) -> Result<()> {
    let loaded = store.load_for_alignment(doc_id)?;
    if bookmark.segment_index >= loaded.segments.len() {
        bail!(
            "Segment {} is out of range for `{doc_id}` ({} segments)",
            bookmark.segment_index,
            loaded.segments.len()
        );
    }
    store.save_bookmark(doc_id, bookmark)?;
    println!(
        "{doc_id}: bookmark set to segment {} at {:.2}s",
        bookmark.segment_index, bookmark.time
    );
    Ok(())
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_match_command() {
        let command = parse_args(args(&["match", "book", "p3", "12"])).expect("should parse");
        assert_eq!(
            command,
            Command::Match {
                doc_id: "book".to_string(),
                anchor: Anchor::new("p3", 12),
            }
        );
    }

    #[test]
    fn import_title_and_author_are_optional() {
        let command =
            parse_args(args(&["import", "book", "b.json", "s.json"])).expect("should parse");
        let Command::Import { title, author, .. } = command else {
            panic!("expected import command");
        };
        assert!(title.is_empty());
        assert!(author.is_empty());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["dance"])).is_err());
        assert!(parse_args(args(&["locate", "book"])).is_err());
        assert!(parse_args(args(&["locate", "book", "-1"])).is_err());
        assert!(parse_args(args(&["bookmark", "book", "x", "1.0"])).is_err());
    }
}
