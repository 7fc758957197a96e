//! Genome-wide interval storage: one [`IntervalTree`] per seqname.
use fxhash::FxHashMap;

use gtrack_core::Result;
use gtrack_core::models::Interval;
use gtrack_core::utils::natural_cmp;

use crate::interval_tree::{self, IntervalTree, OverlapIter};
use crate::{CoverageIter, IterSource};

///
/// A set of intervals over many sequences, kept as one balanced interval tree
/// per seqname.
///
/// Insertion order does not matter: [`IntervalCollection::iter`] always yields
/// intervals sorted by seqname (natural order), then `first`, `last` and strand.
///
/// # Examples
///
/// ```
/// use gtrack_core::models::Interval;
/// use gtrack_overlaprs::IntervalCollection;
///
/// let peaks: IntervalCollection<&str> = vec![
///     Interval::new("chr10", 5, 50, "p3").unwrap(),
///     Interval::new("chr2", 100, 200, "p2").unwrap(),
///     Interval::new("chr2", 1, 10, "p1").unwrap(),
/// ]
/// .into_iter()
/// .collect();
///
/// let names: Vec<&str> = peaks.iter().map(|i| *i.metadata()).collect();
/// assert_eq!(names, vec!["p1", "p2", "p3"]);
///
/// let genes: IntervalCollection<&str> =
///     vec![Interval::new("chr2", 150, 160, "g1").unwrap()].into_iter().collect();
/// let pairs: Vec<(&str, &str)> = peaks
///     .overlaps(&genes)
///     .map(|(p, g)| (*p.metadata(), *g.metadata()))
///     .collect();
/// assert_eq!(pairs, vec![("p2", "g1")]);
/// ```
#[derive(Debug, Clone)]
pub struct IntervalCollection<M> {
    trees: FxHashMap<String, IntervalTree<M>>,
    len: usize,
}

impl<M> Default for IntervalCollection<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> IntervalCollection<M> {
    pub fn new() -> Self {
        IntervalCollection {
            trees: FxHashMap::default(),
            len: 0,
        }
    }

    /// Add an interval. O(log n) in the size of its seqname's tree.
    pub fn insert(&mut self, interval: Interval<M>) {
        match self.trees.get_mut(interval.seqname()) {
            Some(tree) => tree.insert(interval),
            None => {
                let seqname = interval.seqname().to_string();
                let mut tree = IntervalTree::new();
                tree.insert(interval);
                self.trees.insert(seqname, tree);
            }
        }
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Seqnames present in the collection, in natural order.
    pub fn seqnames(&self) -> Vec<&str> {
        let mut seqnames: Vec<&str> = self.trees.keys().map(String::as_str).collect();
        seqnames.sort_by(|a, b| natural_cmp(a, b));
        seqnames
    }

    /// The tree holding the intervals of one seqname.
    pub fn get(&self, seqname: &str) -> Option<&IntervalTree<M>> {
        self.trees.get(seqname)
    }

    fn sorted_trees(&self) -> Vec<&IntervalTree<M>> {
        self.seqnames()
            .into_iter()
            .filter_map(|seqname| self.trees.get(seqname))
            .collect()
    }

    ///
    /// Iterate over every interval in `(seqname, first, last, strand)` order.
    ///
    /// Each call starts a fresh pass.
    pub fn iter(&self) -> Iter<'_, M> {
        Iter {
            trees: self.sorted_trees().into_iter(),
            current: None,
        }
    }

    ///
    /// All intervals overlapping `query` (on the same seqname).
    ///
    pub fn overlapping<N>(&self, query: &Interval<N>) -> impl Iterator<Item = &Interval<M>> + '_ {
        let (first, last) = (query.first(), query.last());
        self.trees
            .get(query.seqname())
            .into_iter()
            .flat_map(move |tree| tree.query(first, last))
    }

    ///
    /// Every overlapping pair between this collection and `other`.
    ///
    /// Seqnames are visited in natural order. Within a seqname, intervals of
    /// `self` are taken in order and each is looked up in `other`'s tree, so the
    /// output order is fixed for a given pair of collections.
    ///
    pub fn overlaps<'a, 'b, N>(&'a self, other: &'b IntervalCollection<N>) -> Overlaps<'a, 'b, M, N> {
        let shared: Vec<(&'a IntervalTree<M>, &'b IntervalTree<N>)> = self
            .seqnames()
            .into_iter()
            .filter_map(|seqname| Some((self.trees.get(seqname)?, other.trees.get(seqname)?)))
            .collect();

        Overlaps {
            shared: shared.into_iter(),
            left: None,
            hits: None,
        }
    }

    ///
    /// Depth-of-coverage segments of the whole collection.
    ///
    /// The collection is always sorted, so the items are never ordering errors.
    pub fn coverage(&self) -> impl Iterator<Item = Result<Interval<u32>>> + '_ {
        let positions = self.iter().map(|interval| {
            Interval::new(interval.seqname(), interval.first(), interval.last(), ())
                .map(|i| i.with_strand(interval.strand()))
        });
        CoverageIter::new(crate::FallibleSource::new(positions))
    }
}

impl<M: Clone> IntervalCollection<M> {
    /// An [`crate::IntervalSource`] over a sorted copy of the collection.
    pub fn source(&self) -> IterSource<std::iter::Cloned<Iter<'_, M>>> {
        IterSource::new(self.iter().cloned())
    }
}

impl<M> FromIterator<Interval<M>> for IntervalCollection<M> {
    fn from_iter<T: IntoIterator<Item = Interval<M>>>(iter: T) -> Self {
        let mut collection = IntervalCollection::new();
        collection.extend(iter);
        collection
    }
}

impl<M> Extend<Interval<M>> for IntervalCollection<M> {
    fn extend<T: IntoIterator<Item = Interval<M>>>(&mut self, iter: T) {
        for interval in iter {
            self.insert(interval);
        }
    }
}

impl<'a, M> IntoIterator for &'a IntervalCollection<M> {
    type Item = &'a Interval<M>;
    type IntoIter = Iter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Sorted iterator over an [`IntervalCollection`].
pub struct Iter<'a, M> {
    trees: std::vec::IntoIter<&'a IntervalTree<M>>,
    current: Option<interval_tree::Iter<'a, M>>,
}

impl<'a, M> Iterator for Iter<'a, M> {
    type Item = &'a Interval<M>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(interval) = self.current.as_mut().and_then(Iterator::next) {
                return Some(interval);
            }
            self.current = Some(self.trees.next()?.iter());
        }
    }
}

/// Iterator over the overlapping pairs of two collections.
pub struct Overlaps<'a, 'b, M, N> {
    shared: std::vec::IntoIter<(&'a IntervalTree<M>, &'b IntervalTree<N>)>,
    left: Option<(interval_tree::Iter<'a, M>, &'b IntervalTree<N>)>,
    hits: Option<(&'a Interval<M>, OverlapIter<'b, N>)>,
}

impl<'a, 'b, M, N> Iterator for Overlaps<'a, 'b, M, N> {
    type Item = (&'a Interval<M>, &'b Interval<N>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((a, hits)) = self.hits.as_mut()
                && let Some(b) = hits.next()
            {
                return Some((*a, b));
            }
            self.hits = None;

            if let Some((intervals, other)) = self.left.as_mut()
                && let Some(a) = intervals.next()
            {
                let tree: &'b IntervalTree<N> = other;
                self.hits = Some((a, tree.query(a.first(), a.last())));
                continue;
            }

            let (mine, theirs) = self.shared.next()?;
            self.left = Some((mine.iter(), theirs));
        }
    }
}
