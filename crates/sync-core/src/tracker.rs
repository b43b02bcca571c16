//! Playback tracker: turns a live media time signal into highlight, scroll and
//! bookmark effects, and routes user actions into seeks.
//!
//! The tracker never touches the UI or the media element directly. Seeks go
//! through [`MediaTransport`], time is read from a [`Clock`], and everything
//! the UI should do comes back as a list of [`Effect`] values. Per-document
//! session data lives in a caller-owned [`PlaybackSession`].

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, StoreError};
use crate::segment::SegmentList;
use crate::store::{AlignmentStore, Bookmark, DocumentRecord};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use ts_rs::TS;

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// The media element as seen by the tracker.
pub trait MediaTransport {
    fn is_ready(&self) -> bool;
    fn seek(&mut self, time: f64) -> Result<(), PlaybackError>;
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
}

/// UI side effects requested by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    Highlight { segment_index: usize },
    ScrollTo { segment_index: usize, instant: bool },
    MarkBookmark { segment_index: usize },
    PlaybackFailed { message: String },
}

/// Session data for one open document, owned by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackSession {
    pub doc_id: String,
    pub current_time: f64,
    pub pending_seek: Option<f64>,
    pub bookmark: Option<Bookmark>,
}

impl PlaybackSession {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            ..Self::default()
        }
    }

    pub fn from_record(record: &DocumentRecord) -> Self {
        Self {
            doc_id: record.doc_id.clone(),
            current_time: record.last_position,
            pending_seek: None,
            bookmark: record.bookmark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
pub struct TrackerState {
    pub current_segment: Option<usize>,
    pub is_playing: bool,
    pub suppressed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    TimeUpdate { time: f64 },
    MediaReady,
    SeekToSegment { index: usize },
    SegmentClick { index: usize },
    SkipNext,
    SkipPrev,
    ApplyBookmark { bookmark: Bookmark },
    SaveBookmark,
    TogglePlayPause,
}

impl PlaybackCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::TimeUpdate { .. } => "playback_time_update",
            Self::MediaReady => "playback_media_ready",
            Self::SeekToSegment { .. } => "playback_seek_to_segment",
            Self::SegmentClick { .. } => "playback_segment_click",
            Self::SkipNext => "playback_skip_next",
            Self::SkipPrev => "playback_skip_prev",
            Self::ApplyBookmark { .. } => "playback_apply_bookmark",
            Self::SaveBookmark => "playback_save_bookmark",
            Self::TogglePlayPause => "playback_toggle_play_pause",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub action: &'static str,
    pub effects: Vec<Effect>,
}

pub struct PlaybackTracker<C: Clock = SystemClock> {
    segments: SegmentList,
    clock: C,
    suppression_window: Duration,
    bookmark_offset: f64,
    compact_layout: bool,
    auto_scroll: bool,
    current: Option<usize>,
    is_playing: bool,
    suppressed_until: Option<Instant>,
}

impl PlaybackTracker {
    pub fn new(segments: SegmentList, cfg: &PlaybackConfig) -> Self {
        Self::with_clock(segments, cfg, SystemClock)
    }
}

impl<C: Clock> PlaybackTracker<C> {
    pub fn with_clock(segments: SegmentList, cfg: &PlaybackConfig, clock: C) -> Self {
        Self {
            segments,
            clock,
            suppression_window: cfg.suppression_window(),
            bookmark_offset: cfg.bookmark_seek_offset_secs,
            compact_layout: cfg.compact_layout,
            auto_scroll: cfg.auto_scroll,
            current: None,
            is_playing: false,
            suppressed_until: None,
        }
    }

    pub fn segments(&self) -> &SegmentList {
        &self.segments
    }

    pub fn current_segment(&self) -> Option<usize> {
        self.current
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed_until
            .is_some_and(|until| self.clock.now() < until)
    }

    pub fn state(&self) -> TrackerState {
        TrackerState {
            current_segment: self.current,
            is_playing: self.is_playing,
            suppressed: self.is_suppressed(),
        }
    }

    pub fn apply_command<M, S>(
        &mut self,
        command: PlaybackCommand,
        session: &mut PlaybackSession,
        media: &mut M,
        store: &S,
    ) -> Result<PlaybackEvent, StoreError>
    where
        M: MediaTransport + ?Sized,
        S: AlignmentStore + ?Sized,
    {
        let action = command.action();
        let effects = match command {
            PlaybackCommand::TimeUpdate { time } => self.on_time_update(time, session),
            PlaybackCommand::MediaReady => self.on_media_ready(session, media),
            PlaybackCommand::SeekToSegment { index } => self.seek_to_segment(index, session, media),
            PlaybackCommand::SegmentClick { index } => self.on_segment_click(index, session, media),
            PlaybackCommand::SkipNext => self.skip(1, session, media),
            PlaybackCommand::SkipPrev => self.skip(-1, session, media),
            PlaybackCommand::ApplyBookmark { bookmark } => {
                self.apply_bookmark(bookmark, session, media)
            }
            PlaybackCommand::SaveBookmark => self.save_bookmark(session, store)?,
            PlaybackCommand::TogglePlayPause => self.toggle_play_pause(session, media),
        };
        Ok(PlaybackEvent { action, effects })
    }

    pub fn on_time_update(&mut self, time: f64, session: &mut PlaybackSession) -> Vec<Effect> {
        if self.is_suppressed() {
            return Vec::new();
        }
        self.suppressed_until = None;
        session.current_time = time;

        let Some(index) = self.segments.find_at(time) else {
            return Vec::new();
        };
        if self.current == Some(index) {
            return Vec::new();
        }
        let previous = self.current.replace(index);

        let mut effects = vec![Effect::Highlight {
            segment_index: index,
        }];
        if self.auto_scroll {
            if self.compact_layout {
                effects.push(Effect::ScrollTo {
                    segment_index: index,
                    instant: true,
                });
            } else if previous.is_none_or(|prev| index > prev) {
                effects.push(Effect::ScrollTo {
                    segment_index: index,
                    instant: false,
                });
            }
        }
        effects
    }

    pub fn seek_to_segment<M: MediaTransport + ?Sized>(
        &mut self,
        index: usize,
        session: &mut PlaybackSession,
        media: &mut M,
    ) -> Vec<Effect> {
        let Some(start) = self.segments.start_time(index) else {
            debug!(index, count = self.segments.len(), "Seek target out of range");
            return Vec::new();
        };
        self.suppressed_until = Some(self.clock.now() + self.suppression_window);
        if let Err(err) = media.seek(start) {
            self.suppressed_until = None;
            return self.playback_failed(err);
        }
        session.current_time = start;
        self.current = Some(index);

        let mut effects = vec![
            Effect::Highlight {
                segment_index: index,
            },
            Effect::ScrollTo {
                segment_index: index,
                instant: self.compact_layout,
            },
        ];
        match media.play() {
            Ok(()) => self.is_playing = true,
            Err(err) => effects.extend(self.playback_failed(err)),
        }
        effects
    }

    pub fn skip<M: MediaTransport + ?Sized>(
        &mut self,
        delta: isize,
        session: &mut PlaybackSession,
        media: &mut M,
    ) -> Vec<Effect> {
        let current = self.current.map_or(-1, |index| index as isize);
        let target = current + delta;
        if target < 0 || target as usize >= self.segments.len() {
            return Vec::new();
        }
        self.seek_to_segment(target as usize, session, media)
    }

    pub fn on_segment_click<M: MediaTransport + ?Sized>(
        &mut self,
        index: usize,
        session: &mut PlaybackSession,
        media: &mut M,
    ) -> Vec<Effect> {
        if self.segments.start_time(index).is_none() {
            warn!(index, "Click on a segment the tracker does not know");
            return Vec::new();
        }
        self.seek_to_segment(index, session, media)
    }

    pub fn apply_bookmark<M: MediaTransport + ?Sized>(
        &mut self,
        bookmark: Bookmark,
        session: &mut PlaybackSession,
        media: &mut M,
    ) -> Vec<Effect> {
        let index = bookmark.segment_index;
        let Some(start) = self.segments.start_time(index) else {
            warn!(index, "Ignoring bookmark outside the segment list");
            return Vec::new();
        };
        self.current = Some(index);
        session.bookmark = Some(bookmark);

        let mut effects = vec![
            Effect::Highlight {
                segment_index: index,
            },
            Effect::MarkBookmark {
                segment_index: index,
            },
            Effect::ScrollTo {
                segment_index: index,
                instant: true,
            },
        ];

        let target = start + self.bookmark_offset;
        if media.is_ready() {
            effects.extend(self.seek_quietly(target, session, media));
        } else {
            debug!(index, target, "Media not ready; queueing bookmark seek");
            session.pending_seek = Some(target);
        }
        effects
    }

    /// Apply a bookmark seek queued while the media was loading.
    pub fn on_media_ready<M: MediaTransport + ?Sized>(
        &mut self,
        session: &mut PlaybackSession,
        media: &mut M,
    ) -> Vec<Effect> {
        match session.pending_seek.take() {
            Some(target) => self.seek_quietly(target, session, media),
            None => Vec::new(),
        }
    }

    pub fn save_bookmark<S: AlignmentStore + ?Sized>(
        &mut self,
        session: &mut PlaybackSession,
        store: &S,
    ) -> Result<Vec<Effect>, StoreError> {
        let Some(index) = self.current else {
            return Ok(Vec::new());
        };
        let bookmark = Bookmark {
            segment_index: index,
            time: session.current_time,
        };
        store.save_bookmark(&session.doc_id, bookmark)?;
        session.bookmark = Some(bookmark);
        info!(doc_id = %session.doc_id, index, time = bookmark.time, "Bookmark saved");
        Ok(vec![Effect::MarkBookmark {
            segment_index: index,
        }])
    }

    pub fn toggle_play_pause<M: MediaTransport + ?Sized>(
        &mut self,
        session: &mut PlaybackSession,
        media: &mut M,
    ) -> Vec<Effect> {
        if self.is_playing {
            media.pause();
            self.is_playing = false;
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.compact_layout && media.is_ready() {
            if let Some(target) = session.pending_seek.take() {
                effects.extend(self.seek_quietly(target, session, media));
            }
        }
        match media.play() {
            Ok(()) => self.is_playing = true,
            Err(err) => effects.extend(self.playback_failed(err)),
        }
        effects
    }

    fn seek_quietly<M: MediaTransport + ?Sized>(
        &mut self,
        target: f64,
        session: &mut PlaybackSession,
        media: &mut M,
    ) -> Vec<Effect> {
        self.suppressed_until = Some(self.clock.now() + self.suppression_window);
        match media.seek(target) {
            Ok(()) => {
                session.current_time = target;
                Vec::new()
            }
            Err(err) => {
                self.suppressed_until = None;
                self.playback_failed(err)
            }
        }
    }

    fn playback_failed(&mut self, err: PlaybackError) -> Vec<Effect> {
        warn!("Playback request failed: {err}");
        self.is_playing = false;
        vec![Effect::PlaybackFailed {
            message: err.to_string(),
        }]
    }
}
