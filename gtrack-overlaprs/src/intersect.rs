//! Merge-join intersection of two sorted interval sources.
use std::cmp::Ordering;

use log::debug;

use gtrack_core::models::Interval;
use gtrack_core::utils::natural_cmp;
use gtrack_core::{GtrackError, Result};

use crate::{IntervalSource, StreamBuffer};

type SeqnameCmp = Box<dyn Fn(&str, &str) -> Ordering>;
type PairFilter<MA, MB> = Box<dyn Fn(&Interval<MA>, &Interval<MB>) -> bool>;

/// Last position consumed from one side, used to reject unsorted input.
#[derive(Debug, Default)]
struct Cursor {
    seqname: Option<String>,
    first: u32,
}

impl Cursor {
    fn advance_to<M>(
        &mut self,
        interval: &Interval<M>,
        cmp: &dyn Fn(&str, &str) -> Ordering,
        side: &str,
    ) -> Result<()> {
        if let Some(seqname) = self.seqname.as_deref() {
            match cmp(interval.seqname(), seqname) {
                Ordering::Less => {
                    return Err(GtrackError::Ordering(format!(
                        "unsorted input on the {side} side: {interval} follows {seqname}:{}",
                        self.first
                    )));
                }
                Ordering::Equal if interval.first() < self.first => {
                    return Err(GtrackError::Ordering(format!(
                        "unsorted input on the {side} side: {interval} follows {seqname}:{}",
                        self.first
                    )));
                }
                Ordering::Equal => {
                    self.first = interval.first();
                    return Ok(());
                }
                Ordering::Greater => {}
            }
        }
        self.seqname = Some(interval.seqname().to_string());
        self.first = interval.first();
        Ok(())
    }
}

enum Fill {
    Discard,
    Keep,
    Stop,
}

///
/// Lazily yields every overlapping pair between two sorted interval sources.
///
/// Both sources must be sorted by seqname (natural order unless a comparator
/// is given with [`intersect_by`]) and then by `first`. The left side drives the
/// iteration: pairs come out grouped by left interval, in left order, and for
/// each left interval in right order. Right intervals that could still overlap
/// a later left interval are held in a [`StreamBuffer`] window; nothing else is
/// buffered.
///
/// An interval that sorts before one already consumed from the same side is
/// reported as [`GtrackError::Ordering`]. Errors from either source are passed
/// through. After the first error the iterator yields nothing more.
///
/// # Examples
///
/// ```
/// use gtrack_core::models::Interval;
/// use gtrack_overlaprs::{IterSource, intersect};
///
/// let a = vec![Interval::new("chr1", 1, 10, "a1").unwrap()];
/// let b = vec![
///     Interval::new("chr1", 5, 6, "b1").unwrap(),
///     Interval::new("chr2", 5, 6, "b2").unwrap(),
/// ];
///
/// let pairs: Vec<_> = intersect(IterSource::new(a.into_iter()), IterSource::new(b.into_iter()))
///     .map(|pair| pair.map(|(a, b)| (*a.metadata(), *b.metadata())))
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(pairs, vec![("a1", "b1")]);
/// ```
pub struct IntersectIter<A: IntervalSource, B: IntervalSource> {
    a: A,
    b: B,
    cmp: SeqnameCmp,
    filter: Option<PairFilter<A::Metadata, B::Metadata>>,
    window: StreamBuffer<Interval<B::Metadata>>,
    current: Option<Interval<A::Metadata>>,
    /// logical index of the next window entry to compare with `current`
    next_in_window: usize,
    a_cursor: Cursor,
    b_cursor: Cursor,
    done: bool,
}

/// Intersect two sources sorted in natural seqname order.
pub fn intersect<A, B>(a: A, b: B) -> IntersectIter<A, B>
where
    A: IntervalSource,
    B: IntervalSource,
{
    intersect_by(a, b, natural_cmp)
}

///
/// Intersect two sources sorted with a caller-supplied seqname order.
///
/// `cmp` must be a strict total order and both sources must follow it, e.g. the
/// chromosome order declared in a file header.
///
pub fn intersect_by<A, B, C>(a: A, b: B, cmp: C) -> IntersectIter<A, B>
where
    A: IntervalSource,
    B: IntervalSource,
    C: Fn(&str, &str) -> Ordering + 'static,
{
    IntersectIter {
        a,
        b,
        cmp: Box::new(cmp),
        filter: None,
        window: StreamBuffer::new(),
        current: None,
        next_in_window: 0,
        a_cursor: Cursor::default(),
        b_cursor: Cursor::default(),
        done: false,
    }
}

impl<A, B> IntersectIter<A, B>
where
    A: IntervalSource,
    B: IntervalSource,
{
    /// Only emit pairs for which `filter` returns `true`.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Interval<A::Metadata>, &Interval<B::Metadata>) -> bool + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    fn fail<T>(&mut self, err: GtrackError) -> Option<Result<T>> {
        self.done = true;
        self.current = None;
        self.window.clear();
        Some(Err(err))
    }

    /// Drop window entries that cannot overlap `a` or anything after it.
    fn evict(&mut self, a: &Interval<A::Metadata>) {
        while let Some(front) = self.window.front() {
            if (self.cmp)(front.seqname(), a.seqname()) != Ordering::Equal
                || front.last() < a.first()
            {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Pull right intervals that start at or before `a.last()` into the window.
    fn fill(&mut self, a: &Interval<A::Metadata>) -> Result<()> {
        loop {
            let action = match self.b.peek()? {
                None => Fill::Stop,
                Some(b) => match (self.cmp)(b.seqname(), a.seqname()) {
                    Ordering::Less => Fill::Discard,
                    Ordering::Equal if b.first() <= a.last() => Fill::Keep,
                    _ => Fill::Stop,
                },
            };
            if let Fill::Stop = action {
                return Ok(());
            }

            let Some(b) = self.b.advance()? else {
                return Ok(());
            };
            self.b_cursor.advance_to(&b, self.cmp.as_ref(), "right")?;
            if let Fill::Keep = action {
                self.window.push_back(b);
            }
        }
    }
}

impl<A, B> Iterator for IntersectIter<A, B>
where
    A: IntervalSource,
    B: IntervalSource,
    A::Metadata: Clone,
    B::Metadata: Clone,
{
    type Item = Result<(Interval<A::Metadata>, Interval<B::Metadata>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(a) = self.current.as_ref() {
                while self.next_in_window < self.window.end_index() {
                    let index = self.next_in_window;
                    self.next_in_window += 1;
                    let Some(b) = self.window.get(index) else {
                        continue;
                    };
                    if !a.overlaps(b) {
                        continue;
                    }
                    if let Some(filter) = self.filter.as_ref()
                        && !filter(a, b)
                    {
                        continue;
                    }
                    return Some(Ok((a.clone(), b.clone())));
                }
                self.current = None;
            }

            let a = match self.a.advance() {
                Err(e) => return self.fail(e),
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Ok(Some(a)) => a,
            };
            let entering = self.a_cursor.seqname.as_deref() != Some(a.seqname());
            if let Err(e) = self.a_cursor.advance_to(&a, self.cmp.as_ref(), "left") {
                return self.fail(e);
            }
            if entering {
                debug!("intersect: entering {}", a.seqname());
            }

            self.evict(&a);
            if let Err(e) = self.fill(&a) {
                return self.fail(e);
            }
            self.next_in_window = self.window.first_index();
            self.current = Some(a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{FallibleSource, IterSource};

    fn iv(seqname: &str, first: u32, last: u32) -> Interval<String> {
        Interval::new(seqname, first, last, format!("{seqname}:{first}-{last}")).unwrap()
    }

    fn source(intervals: Vec<Interval<String>>) -> IterSource<std::vec::IntoIter<Interval<String>>> {
        IterSource::new(intervals.into_iter())
    }

    fn pairs<A, B>(iter: IntersectIter<A, B>) -> Vec<(String, String)>
    where
        A: IntervalSource<Metadata = String>,
        B: IntervalSource<Metadata = String>,
    {
        iter.map(|r| r.unwrap())
            .map(|(a, b)| (a.into_metadata(), b.into_metadata()))
            .collect()
    }

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[rstest]
    fn test_different_chromosomes() {
        let got = pairs(intersect(
            source(vec![iv("chr1", 1, 100)]),
            source(vec![iv("chr2", 1, 100)]),
        ));
        assert!(got.is_empty());
    }

    #[rstest]
    fn test_single_overlap() {
        let got = pairs(intersect(
            source(vec![iv("chr1", 1, 100)]),
            source(vec![iv("chr1", 100, 200)]),
        ));
        assert_eq!(got, vec![pair("chr1:1-100", "chr1:100-200")]);
    }

    #[rstest]
    fn test_empty_sides() {
        assert!(pairs(intersect(source(vec![]), source(vec![iv("chr1", 1, 2)]))).is_empty());
        assert!(pairs(intersect(source(vec![iv("chr1", 1, 2)]), source(vec![]))).is_empty());
    }

    #[rstest]
    fn test_window_look_back() {
        // the long right interval must still be found by later left intervals
        let a = vec![iv("chr1", 5, 6), iv("chr1", 50, 60), iv("chr1", 90, 95)];
        let b = vec![iv("chr1", 1, 100), iv("chr1", 10, 20), iv("chr1", 55, 56)];
        let got = pairs(intersect(source(a), source(b)));
        assert_eq!(
            got,
            vec![
                pair("chr1:5-6", "chr1:1-100"),
                pair("chr1:50-60", "chr1:1-100"),
                pair("chr1:50-60", "chr1:55-56"),
                pair("chr1:90-95", "chr1:1-100"),
            ]
        );
    }

    #[rstest]
    fn test_skips_unshared_seqnames() {
        let a = vec![iv("chr1", 1, 10), iv("chr3", 1, 10), iv("chr10", 5, 5)];
        let b = vec![iv("chr2", 1, 10), iv("chr3", 10, 12), iv("chr10", 1, 4)];
        let got = pairs(intersect(source(a), source(b)));
        assert_eq!(got, vec![pair("chr3:1-10", "chr3:10-12")]);
    }

    #[rstest]
    fn test_unsorted_left() {
        let a = vec![iv("chr1", 10, 20), iv("chr1", 5, 30)];
        let b = vec![iv("chr1", 1, 100)];
        let mut iter = intersect(source(a), source(b));
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(iter.next(), Some(Err(GtrackError::Ordering(_)))));
        assert!(iter.next().is_none());
    }

    #[rstest]
    fn test_unsorted_right_seqname() {
        let a = vec![iv("chr2", 1, 10), iv("chr10", 1, 10), iv("chr20", 1, 10)];
        let b = vec![iv("chr10", 1, 10), iv("chr2", 1, 10)];
        let results: Vec<_> = intersect(source(a), source(b)).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(GtrackError::Ordering(_))));
    }

    #[rstest]
    fn test_unsorted_right_position() {
        let a = vec![iv("chr1", 1, 100)];
        let b = vec![iv("chr1", 50, 60), iv("chr1", 10, 20)];
        let results: Vec<_> = intersect(source(a), source(b)).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(GtrackError::Ordering(_))));
    }

    #[rstest]
    fn test_custom_order() {
        // lexicographic order puts chr10 before chr2
        let a = vec![iv("chr10", 1, 10), iv("chr2", 1, 10)];
        let b = vec![iv("chr10", 5, 5), iv("chr2", 5, 5)];
        let got = pairs(intersect_by(source(a), source(b), |x: &str, y: &str| x.cmp(y)));
        assert_eq!(
            got,
            vec![pair("chr10:1-10", "chr10:5-5"), pair("chr2:1-10", "chr2:5-5")]
        );
    }

    #[rstest]
    fn test_filter() {
        let a = vec![iv("chr1", 1, 100)];
        let b = vec![iv("chr1", 1, 5), iv("chr1", 10, 50), iv("chr1", 60, 61)];
        let got = pairs(
            intersect(source(a), source(b)).with_filter(|_, b: &Interval<String>| b.span() > 2),
        );
        assert_eq!(
            got,
            vec![pair("chr1:1-100", "chr1:1-5"), pair("chr1:1-100", "chr1:10-50")]
        );
    }

    #[rstest]
    fn test_source_error_passes_through() {
        let a = vec![iv("chr1", 1, 100)];
        let b: Vec<Result<Interval<String>>> = vec![
            Ok(iv("chr1", 1, 2)),
            Err(GtrackError::Format("corrupt block".to_string())),
        ];
        let mut iter = intersect(source(a), FallibleSource::new(b.into_iter()));
        assert!(matches!(iter.next(), Some(Err(GtrackError::Format(_)))));
        assert!(iter.next().is_none());
    }
}
