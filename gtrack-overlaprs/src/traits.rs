use std::iter::Peekable;

use gtrack_core::models::Interval;
use gtrack_core::{GtrackError, Result};

/// A structure that answers "which stored intervals overlap `[first, last]`".
pub trait Overlapper<M> {
    fn find(&self, first: u32, last: u32) -> Vec<&Interval<M>> {
        self.find_iter(first, last).collect()
    }

    fn find_iter<'a>(
        &'a self,
        first: u32,
        last: u32,
    ) -> Box<dyn Iterator<Item = &'a Interval<M>> + 'a>;
}

///
/// An ordered source of intervals that can be inspected one element ahead.
///
/// This is the only capability the merge-join ([`crate::IntersectIter`]) and the
/// coverage sweep ([`crate::CoverageIter`]) rely on, so the same algorithms run
/// over vectors, collections and file-backed streams alike. Errors raised by the
/// underlying source (for example a corrupt block in a track file) surface from
/// `peek`/`advance` instead of being confused with the end of the stream.
///
pub trait IntervalSource {
    type Metadata;

    /// Look at the next interval without consuming it.
    fn peek(&mut self) -> Result<Option<&Interval<Self::Metadata>>>;

    /// Consume and return the next interval.
    fn advance(&mut self) -> Result<Option<Interval<Self::Metadata>>>;

    /// `true` once every interval has been consumed.
    fn exhausted(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_none())
    }
}

impl<S: IntervalSource + ?Sized> IntervalSource for &mut S {
    type Metadata = S::Metadata;

    fn peek(&mut self) -> Result<Option<&Interval<Self::Metadata>>> {
        (**self).peek()
    }

    fn advance(&mut self) -> Result<Option<Interval<Self::Metadata>>> {
        (**self).advance()
    }
}

///
/// Adapts any iterator of intervals (a `Vec`, a collection iterator, a generator)
/// into an [`IntervalSource`].
///
/// # Examples
///
/// ```
/// use gtrack_core::models::Interval;
/// use gtrack_overlaprs::{IntervalSource, IterSource};
///
/// let intervals = vec![Interval::new("chr1", 1, 10, ()).unwrap()];
/// let mut source = IterSource::new(intervals.into_iter());
/// assert_eq!(source.peek().unwrap().map(|i| i.first()), Some(1));
/// assert!(source.advance().unwrap().is_some());
/// assert!(source.exhausted().unwrap());
/// ```
pub struct IterSource<I: Iterator> {
    inner: Peekable<I>,
}

impl<I: Iterator> IterSource<I> {
    pub fn new(iter: I) -> Self {
        IterSource {
            inner: iter.peekable(),
        }
    }
}

impl<I, M> IntervalSource for IterSource<I>
where
    I: Iterator<Item = Interval<M>>,
{
    type Metadata = M;

    fn peek(&mut self) -> Result<Option<&Interval<M>>> {
        Ok(self.inner.peek())
    }

    fn advance(&mut self) -> Result<Option<Interval<M>>> {
        Ok(self.inner.next())
    }
}

///
/// Adapts an iterator of `Result<Interval<M>, E>` (typically a file-backed reader)
/// into an [`IntervalSource`].
///
/// The first error ends the source: it is returned once and every later call
/// reports the source as exhausted.
///
pub struct FallibleSource<I, M> {
    inner: I,
    peeked: Option<Interval<M>>,
    done: bool,
}

impl<I, M, E> FallibleSource<I, M>
where
    I: Iterator<Item = std::result::Result<Interval<M>, E>>,
    E: Into<GtrackError>,
{
    pub fn new(iter: I) -> Self {
        FallibleSource {
            inner: iter,
            peeked: None,
            done: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        if self.peeked.is_none() && !self.done {
            match self.inner.next() {
                Some(Ok(interval)) => self.peeked = Some(interval),
                Some(Err(e)) => {
                    self.done = true;
                    return Err(e.into());
                }
                None => self.done = true,
            }
        }
        Ok(())
    }
}

impl<I, M, E> IntervalSource for FallibleSource<I, M>
where
    I: Iterator<Item = std::result::Result<Interval<M>, E>>,
    E: Into<GtrackError>,
{
    type Metadata = M;

    fn peek(&mut self) -> Result<Option<&Interval<M>>> {
        self.fill()?;
        Ok(self.peeked.as_ref())
    }

    fn advance(&mut self) -> Result<Option<Interval<M>>> {
        self.fill()?;
        Ok(self.peeked.take())
    }
}
