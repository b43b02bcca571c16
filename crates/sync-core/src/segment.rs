//! Timed transcript segments as handed over by the transcript parser.

use crate::error::SegmentError;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct Segment {
    pub index: usize,
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn new(index: usize, text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            index,
            text: text.into(),
            start,
            end,
        }
    }

    /// Half-open containment: `start <= time < end`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Validated, index-ordered segment list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentList {
    segments: Vec<Segment>,
}

impl SegmentList {
    pub fn new(segments: Vec<Segment>) -> Result<Self, SegmentError> {
        for (position, segment) in segments.iter().enumerate() {
            if segment.index != position {
                return Err(SegmentError::NonContiguousIndex {
                    position,
                    index: segment.index,
                });
            }
            let finite = segment.start.is_finite() && segment.end.is_finite();
            if !finite || segment.start >= segment.end {
                return Err(SegmentError::InvalidBounds {
                    index: segment.index,
                    start: segment.start,
                    end: segment.end,
                });
            }
        }
        Ok(Self { segments })
    }

    pub fn as_slice(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn start_time(&self, index: usize) -> Option<f64> {
        self.segments.get(index).map(|segment| segment.start)
    }

    /// Find the first segment, in index order, whose `[start, end)` range
    /// holds `time`. Overlapping and out-of-order lists resolve the same way.
    pub fn find_at(&self, time: f64) -> Option<usize> {
        if !time.is_finite() {
            return None;
        }
        self.segments
            .iter()
            .position(|segment| segment.contains(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(bounds: &[(f64, f64)]) -> SegmentList {
        let segments = bounds
            .iter()
            .enumerate()
            .map(|(idx, (start, end))| Segment::new(idx, format!("s{idx}"), *start, *end))
            .collect();
        SegmentList::new(segments).expect("segments should be valid")
    }

    #[test]
    fn rejects_gaps_in_indices() {
        let err = SegmentList::new(vec![
            Segment::new(0, "a", 0.0, 1.0),
            Segment::new(2, "b", 1.0, 2.0),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            SegmentError::NonContiguousIndex {
                position: 1,
                index: 2
            }
        );
    }

    #[test]
    fn rejects_empty_or_inverted_ranges() {
        assert!(SegmentList::new(vec![Segment::new(0, "a", 1.0, 1.0)]).is_err());
        assert!(SegmentList::new(vec![Segment::new(0, "a", 2.0, 1.0)]).is_err());
        assert!(SegmentList::new(vec![Segment::new(0, "a", f64::NAN, 1.0)]).is_err());
    }

    #[test]
    fn find_at_uses_half_open_ranges() {
        let segments = list(&[(0.0, 2.0), (2.0, 4.0)]);
        assert_eq!(segments.find_at(0.0), Some(0));
        assert_eq!(segments.find_at(1.9), Some(0));
        assert_eq!(segments.find_at(2.0), Some(1));
        assert_eq!(segments.find_at(4.0), None);
        assert_eq!(segments.find_at(-0.5), None);
    }

    #[test]
    fn find_at_handles_unsorted_lists() {
        let segments = list(&[(5.0, 6.0), (1.0, 2.0), (7.0, 8.0)]);
        assert_eq!(segments.find_at(1.5), Some(1));
        assert_eq!(segments.find_at(7.5), Some(2));
    }

    #[test]
    fn find_at_prefers_the_earliest_overlapping_segment() {
        let sorted = list(&[(0.0, 4.0), (2.0, 6.0), (3.0, 5.0)]);
        assert_eq!(sorted.find_at(3.5), Some(0));
        assert_eq!(sorted.find_at(4.5), Some(1));

        let unsorted = list(&[(6.0, 9.0), (2.0, 8.0), (7.0, 8.0)]);
        assert_eq!(unsorted.find_at(7.5), Some(0));
        assert_eq!(unsorted.find_at(3.0), Some(1));
    }

    #[test]
    fn find_at_skips_gaps_between_segments() {
        let segments = list(&[(0.0, 1.0), (3.0, 4.0)]);
        assert_eq!(segments.find_at(2.0), None);
    }
}
