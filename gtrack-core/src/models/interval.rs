use std::cmp::Ordering;
use std::fmt::{self, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{GtrackError, Result};
use crate::models::Strand;
use crate::utils::natural_cmp;

///
/// A closed range `[first, last]` (1-based) on a named sequence, with a strand
/// and caller-defined metadata.
///
/// Intervals are immutable once built; use [`Interval::new`] so the range is
/// validated. Two intervals are equal when every field, metadata included, is
/// equal. Ordering is by `(seqname, first, last, strand)` with seqnames in
/// natural order (see [`natural_cmp`]); [`Interval::cmp_position`] exposes that
/// order without requiring `M: Ord`.
///
/// # Examples
///
/// ```
/// use gtrack_core::models::{Interval, Strand};
///
/// let gene = Interval::new("chr1", 1000, 2000, "BRCA1")
///     .unwrap()
///     .with_strand(Strand::Forward);
/// assert_eq!(gene.span(), 1001);
/// assert_eq!(gene.to_string(), "chr1:1000-2000(+)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interval<M> {
    seqname: String,
    first: u32,
    last: u32,
    strand: Strand,
    metadata: M,
}

impl<M> Interval<M> {
    ///
    /// Create a new interval with the default strand ([`Strand::Both`]).
    ///
    /// # Arguments
    /// - seqname: name of the sequence (chromosome/contig), must not be empty
    /// - first: first position, 1-based
    /// - last: last position, inclusive, must be >= first
    /// - metadata: value carried along with the interval
    pub fn new(seqname: impl Into<String>, first: u32, last: u32, metadata: M) -> Result<Self> {
        let seqname = seqname.into();
        if seqname.is_empty() {
            return Err(GtrackError::Precondition(
                "interval seqname must not be empty".to_string(),
            ));
        }
        if first == 0 {
            return Err(GtrackError::Precondition(format!(
                "interval positions are 1-based, got first=0 on {seqname}"
            )));
        }
        if first > last {
            return Err(GtrackError::Precondition(format!(
                "interval first ({first}) is past last ({last}) on {seqname}"
            )));
        }

        Ok(Interval {
            seqname,
            first,
            last,
            strand: Strand::default(),
            metadata,
        })
    }

    /// Replace the strand.
    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    pub fn seqname(&self) -> &str {
        &self.seqname
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn into_metadata(self) -> M {
        self.metadata
    }

    ///
    /// Number of positions covered by the interval.
    ///
    pub fn span(&self) -> u32 {
        self.last - self.first + 1
    }

    ///
    /// Check whether two intervals share at least one position on the same sequence.
    ///
    pub fn overlaps<N>(&self, other: &Interval<N>) -> bool {
        self.seqname == other.seqname && self.first <= other.last && other.first <= self.last
    }

    ///
    /// Compare by `(seqname, first, last, strand)`, ignoring metadata.
    ///
    pub fn cmp_position<N>(&self, other: &Interval<N>) -> Ordering {
        natural_cmp(&self.seqname, &other.seqname)
            .then_with(|| self.first.cmp(&other.first))
            .then_with(|| self.last.cmp(&other.last))
            .then_with(|| self.strand.cmp(&other.strand))
    }

    /// Transform the metadata while keeping the range and strand.
    pub fn map_metadata<N, F>(self, f: F) -> Interval<N>
    where
        F: FnOnce(M) -> N,
    {
        Interval {
            seqname: self.seqname,
            first: self.first,
            last: self.last,
            strand: self.strand,
            metadata: f(self.metadata),
        }
    }
}

impl<M: Ord> Ord for Interval<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        // metadata only breaks ties so that Ord agrees with Eq
        self.cmp_position(other)
            .then_with(|| self.metadata.cmp(&other.metadata))
    }
}

impl<M: Ord> PartialOrd for Interval<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Display for Interval<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}({})",
            self.seqname, self.first, self.last, self.strand
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn iv(seqname: &str, first: u32, last: u32) -> Interval<()> {
        Interval::new(seqname, first, last, ()).unwrap()
    }

    #[rstest]
    fn test_new_validates() {
        assert!(Interval::new("chr1", 5, 4, ()).is_err());
        assert!(Interval::new("chr1", 0, 4, ()).is_err());
        assert!(Interval::new("", 1, 4, ()).is_err());
        assert!(Interval::new("chr1", 4, 4, ()).is_ok());
    }

    #[rstest]
    fn test_default_strand() {
        assert_eq!(iv("chr1", 1, 2).strand(), Strand::Both);
    }

    #[rstest]
    fn test_span() {
        assert_eq!(iv("chr1", 10, 10).span(), 1);
        assert_eq!(iv("chr1", 10, 19).span(), 10);
    }

    #[rstest]
    #[case(("chr1", 1, 10), ("chr1", 10, 20), true)]
    #[case(("chr1", 1, 10), ("chr1", 11, 20), false)]
    #[case(("chr1", 5, 6), ("chr1", 1, 100), true)]
    #[case(("chr1", 1, 10), ("chr2", 1, 10), false)]
    fn test_overlaps(
        #[case] a: (&str, u32, u32),
        #[case] b: (&str, u32, u32),
        #[case] expected: bool,
    ) {
        let a = iv(a.0, a.1, a.2);
        let b = iv(b.0, b.1, b.2);
        assert_eq!(a.overlaps(&b), expected);
        assert_eq!(b.overlaps(&a), expected);
    }

    #[rstest]
    fn test_ordering() {
        let mut intervals = vec![
            iv("chr10", 1, 5),
            iv("chr2", 7, 9),
            iv("chr2", 3, 9),
            iv("chr2", 3, 4),
            iv("chr2", 3, 4).with_strand(Strand::Forward),
        ];
        intervals.sort();

        let got: Vec<String> = intervals.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            got,
            vec![
                "chr2:3-4(+)",
                "chr2:3-4(.)",
                "chr2:3-9(.)",
                "chr2:7-9(.)",
                "chr10:1-5(.)",
            ]
        );
    }

    #[rstest]
    fn test_equality_includes_metadata() {
        let a = Interval::new("chr1", 1, 2, 1u8).unwrap();
        let b = Interval::new("chr1", 1, 2, 2u8).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.cmp_position(&b), Ordering::Equal);
        assert_eq!(a.cmp(&b), Ordering::Less);
    }

    #[rstest]
    fn test_map_metadata() {
        let a = Interval::new("chr1", 1, 2, 3u32)
            .unwrap()
            .with_strand(Strand::Reverse);
        let b = a.map_metadata(|m| m as f32 * 0.5);
        assert_eq!(b.metadata(), &1.5);
        assert_eq!(b.strand(), Strand::Reverse);
        assert_eq!(b.first(), 1);
    }
}
