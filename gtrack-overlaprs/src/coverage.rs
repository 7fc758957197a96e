//! Depth-of-coverage over sorted interval sources.
//!
//! [`DepthSweep`] is the single-sequence sweep: intervals are pushed in
//! ascending `first` order and finished segments of constant depth come out as
//! soon as no later interval can change them. [`CoverageIter`] drives one sweep
//! per seqname over any [`IntervalSource`].
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};

use gtrack_core::models::Interval;
use gtrack_core::utils::natural_cmp;
use gtrack_core::{GtrackError, Result};

use crate::IntervalSource;

/// A maximal run of positions `[first, last]` covered by exactly `depth` intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthSegment {
    pub first: u32,
    pub last: u32,
    pub depth: u32,
}

///
/// Sweep-line depth computation for the intervals of one sequence.
///
/// Only the end points of the currently open intervals are kept (in a min-heap),
/// so memory is bounded by the maximum depth, not by the length of the sequence.
/// Uncovered gaps are not reported and adjacent segments with equal depth are
/// merged before they are handed out.
///
/// # Examples
///
/// ```
/// use gtrack_overlaprs::{DepthSegment, DepthSweep};
///
/// let mut sweep = DepthSweep::new();
/// sweep.push(1, 10).unwrap();
/// sweep.push(5, 12).unwrap();
/// sweep.finish();
///
/// let segments: Vec<DepthSegment> = std::iter::from_fn(|| sweep.pop()).collect();
/// assert_eq!(
///     segments,
///     vec![
///         DepthSegment { first: 1, last: 4, depth: 1 },
///         DepthSegment { first: 5, last: 10, depth: 2 },
///         DepthSegment { first: 11, last: 12, depth: 1 },
///     ]
/// );
/// ```
#[derive(Debug, Default)]
pub struct DepthSweep {
    /// `last + 1` of every open interval
    ends: BinaryHeap<Reverse<u64>>,
    /// first position not yet accounted for in an emitted segment
    pos: u64,
    last_first: u32,
    pending: Option<DepthSegment>,
    ready: VecDeque<DepthSegment>,
}

impl DepthSweep {
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Add the interval `[first, last]`.
    ///
    /// Intervals must arrive with non-decreasing `first`; anything else is an
    /// ordering error and leaves the sweep unchanged.
    pub fn push(&mut self, first: u32, last: u32) -> Result<()> {
        if first < self.last_first {
            return Err(GtrackError::Ordering(format!(
                "unsorted input: interval starting at {first} after one starting at {}",
                self.last_first
            )));
        }
        if first > last {
            return Err(GtrackError::Precondition(format!(
                "interval first ({first}) is past last ({last})"
            )));
        }
        self.last_first = first;

        let first = first as u64;
        self.close_until(first);
        if !self.ends.is_empty() && self.pos < first {
            self.emit(self.pos, first - 1, self.ends.len() as u32);
        }
        self.pos = first;
        self.ends.push(Reverse(last as u64 + 1));
        Ok(())
    }

    /// Close every open interval and release all pending segments.
    pub fn finish(&mut self) {
        self.close_until(u64::MAX);
        if let Some(segment) = self.pending.take() {
            self.ready.push_back(segment);
        }
        self.last_first = 0;
    }

    /// Take the next finished segment.
    pub fn pop(&mut self) -> Option<DepthSegment> {
        self.ready.pop_front()
    }

    /// `true` when nothing is open, pending or waiting to be popped.
    pub fn is_idle(&self) -> bool {
        self.ends.is_empty() && self.pending.is_none() && self.ready.is_empty()
    }

    fn close_until(&mut self, to: u64) {
        while let Some(&Reverse(end)) = self.ends.peek() {
            if end > to {
                break;
            }
            if self.pos < end {
                self.emit(self.pos, end - 1, self.ends.len() as u32);
            }
            self.pos = end;
            while self.ends.peek() == Some(&Reverse(end)) {
                self.ends.pop();
            }
        }
    }

    fn emit(&mut self, first: u64, last: u64, depth: u32) {
        let (first, last) = (first as u32, last as u32);
        if let Some(pending) = self.pending.as_mut()
            && pending.depth == depth
            && pending.last as u64 + 1 == first as u64
        {
            pending.last = last;
            return;
        }
        if let Some(done) = self.pending.replace(DepthSegment { first, last, depth }) {
            self.ready.push_back(done);
        }
    }
}

enum Step {
    Fail(GtrackError),
    End,
    Same,
    Switch(String),
}

///
/// Streams the depth profile of a sorted [`IntervalSource`] as
/// `Interval<u32>` segments whose metadata is the depth.
///
/// Segments come out sorted by seqname (natural order) then position; gaps with
/// depth zero are skipped. Input that is not sorted produces an
/// [`GtrackError::Ordering`] item, after which the iterator is exhausted.
///
pub struct CoverageIter<S> {
    source: S,
    seqname: Option<String>,
    sweep: DepthSweep,
    done: bool,
}

impl<S: IntervalSource> CoverageIter<S> {
    pub fn new(source: S) -> Self {
        CoverageIter {
            source,
            seqname: None,
            sweep: DepthSweep::new(),
            done: false,
        }
    }

    fn fail(&mut self, err: GtrackError) -> Option<Result<Interval<u32>>> {
        self.done = true;
        self.sweep = DepthSweep::new();
        Some(Err(err))
    }
}

impl<S: IntervalSource> Iterator for CoverageIter<S> {
    type Item = Result<Interval<u32>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(segment) = self.sweep.pop()
                && let Some(seqname) = self.seqname.as_deref()
            {
                return Some(Interval::new(
                    seqname,
                    segment.first,
                    segment.last,
                    segment.depth,
                ));
            }
            if self.done {
                return None;
            }

            let step = match self.source.peek() {
                Err(e) => Step::Fail(e),
                Ok(None) => Step::End,
                Ok(Some(next)) => match self.seqname.as_deref() {
                    Some(current) if current == next.seqname() => Step::Same,
                    Some(current) if natural_cmp(next.seqname(), current) == Ordering::Less => {
                        Step::Fail(GtrackError::Ordering(format!(
                            "unsorted input: {} follows {}",
                            next.seqname(),
                            current
                        )))
                    }
                    _ => Step::Switch(next.seqname().to_string()),
                },
            };

            match step {
                Step::Fail(e) => return self.fail(e),
                Step::End => {
                    self.sweep.finish();
                    self.done = true;
                }
                Step::Switch(seqname) => {
                    if self.sweep.is_idle() {
                        self.seqname = Some(seqname);
                    } else {
                        // drain the previous sequence under its own name first
                        self.sweep.finish();
                    }
                }
                Step::Same => match self.source.advance() {
                    Err(e) => return self.fail(e),
                    Ok(None) => {}
                    Ok(Some(interval)) => {
                        if let Err(e) = self.sweep.push(interval.first(), interval.last()) {
                            return self.fail(e);
                        }
                    }
                },
            }
        }
    }
}
