use std::cmp::Ordering;

use gtrack_core::models::Interval;

use crate::Overlapper;

#[derive(Debug, Clone)]
struct Node<M> {
    interval: Interval<M>,
    left: Option<usize>,
    right: Option<usize>,
    height: u8,
    /// largest `last` in the subtree rooted here
    max_last: u32,
}

///
/// A self-balancing (AVL) interval tree for the intervals of a single sequence.
///
/// Nodes live in an arena (`Vec`) and refer to their children by index, so the
/// tree owns all of its intervals in one allocation and never needs reference
/// counting. Every node caches the maximum `last` of its subtree which lets
/// overlap queries skip whole subtrees that end before the query starts.
///
/// The tree does not look at seqnames: all intervals are assumed to be on the
/// same sequence, which is what [`crate::IntervalCollection`] guarantees.
/// In-order traversal yields intervals sorted by `(first, last, strand)`;
/// equal keys keep their insertion order.
///
/// # Examples
///
/// ```
/// use gtrack_core::models::Interval;
/// use gtrack_overlaprs::{IntervalTree, Overlapper};
///
/// let mut tree = IntervalTree::new();
/// tree.insert(Interval::new("chr1", 100, 200, "gene1").unwrap());
/// tree.insert(Interval::new("chr1", 150, 300, "gene2").unwrap());
/// tree.insert(Interval::new("chr1", 400, 500, "gene3").unwrap());
///
/// let hits: Vec<&str> = tree.find_iter(180, 250).map(|i| *i.metadata()).collect();
/// assert_eq!(hits, vec!["gene1", "gene2"]);
/// ```
#[derive(Debug, Clone)]
pub struct IntervalTree<M> {
    nodes: Vec<Node<M>>,
    root: Option<usize>,
}

impl<M> Default for IntervalTree<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> IntervalTree<M> {
    pub fn new() -> Self {
        IntervalTree {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    ///
    /// Insert an interval, rebalancing on the way back up. O(log n).
    ///
    pub fn insert(&mut self, interval: Interval<M>) {
        let max_last = interval.last();
        self.nodes.push(Node {
            interval,
            left: None,
            right: None,
            height: 1,
            max_last,
        });
        let new = self.nodes.len() - 1;
        let root = self.insert_at(self.root, new);
        self.root = Some(root);
    }

    fn insert_at(&mut self, at: Option<usize>, new: usize) -> usize {
        let Some(idx) = at else {
            return new;
        };

        // ties go right so equal keys come out in insertion order
        let goes_left = self.nodes[new]
            .interval
            .cmp_position(&self.nodes[idx].interval)
            == Ordering::Less;

        if goes_left {
            let child = self.insert_at(self.nodes[idx].left, new);
            self.nodes[idx].left = Some(child);
        } else {
            let child = self.insert_at(self.nodes[idx].right, new);
            self.nodes[idx].right = Some(child);
        }

        self.update(idx);
        self.rebalance(idx)
    }

    fn height(&self, idx: Option<usize>) -> u8 {
        idx.map_or(0, |i| self.nodes[i].height)
    }

    fn max_last(&self, idx: Option<usize>) -> u32 {
        idx.map_or(0, |i| self.nodes[i].max_last)
    }

    fn update(&mut self, idx: usize) {
        let (left, right) = (self.nodes[idx].left, self.nodes[idx].right);
        let height = 1 + self.height(left).max(self.height(right));
        let max_last = self.nodes[idx]
            .interval
            .last()
            .max(self.max_last(left))
            .max(self.max_last(right));

        let node = &mut self.nodes[idx];
        node.height = height;
        node.max_last = max_last;
    }

    fn balance_factor(&self, idx: usize) -> i16 {
        self.height(self.nodes[idx].left) as i16 - self.height(self.nodes[idx].right) as i16
    }

    fn rotate_right(&mut self, y: usize) -> usize {
        let Some(x) = self.nodes[y].left else {
            return y;
        };
        self.nodes[y].left = self.nodes[x].right;
        self.nodes[x].right = Some(y);
        self.update(y);
        self.update(x);
        x
    }

    fn rotate_left(&mut self, x: usize) -> usize {
        let Some(y) = self.nodes[x].right else {
            return x;
        };
        self.nodes[x].right = self.nodes[y].left;
        self.nodes[y].left = Some(x);
        self.update(x);
        self.update(y);
        y
    }

    fn rebalance(&mut self, idx: usize) -> usize {
        let balance = self.balance_factor(idx);

        if balance > 1 {
            if let Some(left) = self.nodes[idx].left
                && self.balance_factor(left) < 0
            {
                let rotated = self.rotate_left(left);
                self.nodes[idx].left = Some(rotated);
            }
            return self.rotate_right(idx);
        }

        if balance < -1 {
            if let Some(right) = self.nodes[idx].right
                && self.balance_factor(right) > 0
            {
                let rotated = self.rotate_right(right);
                self.nodes[idx].right = Some(rotated);
            }
            return self.rotate_left(idx);
        }

        idx
    }

    ///
    /// Iterate over all intervals in `(first, last, strand)` order.
    ///
    pub fn iter(&self) -> Iter<'_, M> {
        let mut iter = Iter {
            tree: self,
            stack: Vec::with_capacity(self.height(self.root) as usize),
        };
        iter.push_left(self.root);
        iter
    }

    ///
    /// Iterate over the intervals overlapping `[first, last]`, in tree order.
    ///
    /// Subtrees whose cached maximum `last` is below `first` are never visited
    /// and the walk stops at the first node starting after `last`, so a query
    /// costs O(log n + k).
    ///
    pub fn query(&self, first: u32, last: u32) -> OverlapIter<'_, M> {
        let mut iter = OverlapIter {
            tree: self,
            stack: Vec::with_capacity(self.height(self.root) as usize),
            first,
            last,
        };
        iter.push_left(self.root);
        iter
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        fn walk<M>(tree: &IntervalTree<M>, idx: Option<usize>) -> (u8, u32) {
            let Some(i) = idx else { return (0, 0) };
            let node = &tree.nodes[i];
            let (hl, ml) = walk(tree, node.left);
            let (hr, mr) = walk(tree, node.right);
            assert!((hl as i16 - hr as i16).abs() <= 1, "unbalanced node");
            assert_eq!(node.height, 1 + hl.max(hr));
            assert_eq!(node.max_last, node.interval.last().max(ml).max(mr));
            (node.height, node.max_last)
        }
        walk(self, self.root);
    }
}

impl<M> Overlapper<M> for IntervalTree<M> {
    fn find_iter<'a>(
        &'a self,
        first: u32,
        last: u32,
    ) -> Box<dyn Iterator<Item = &'a Interval<M>> + 'a> {
        Box::new(self.query(first, last))
    }
}

impl<M> FromIterator<Interval<M>> for IntervalTree<M> {
    fn from_iter<T: IntoIterator<Item = Interval<M>>>(iter: T) -> Self {
        let mut tree = IntervalTree::new();
        for interval in iter {
            tree.insert(interval);
        }
        tree
    }
}

impl<'a, M> IntoIterator for &'a IntervalTree<M> {
    type Item = &'a Interval<M>;
    type IntoIter = Iter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// In-order iterator over an [`IntervalTree`].
pub struct Iter<'a, M> {
    tree: &'a IntervalTree<M>,
    stack: Vec<usize>,
}

impl<M> Iter<'_, M> {
    fn push_left(&mut self, mut at: Option<usize>) {
        while let Some(idx) = at {
            self.stack.push(idx);
            at = self.tree.nodes[idx].left;
        }
    }
}

impl<'a, M> Iterator for Iter<'a, M> {
    type Item = &'a Interval<M>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.stack.pop()?;
        let node = &self.tree.nodes[idx];
        self.push_left(node.right);
        Some(&node.interval)
    }
}

/// Iterator over the intervals of an [`IntervalTree`] overlapping a range.
pub struct OverlapIter<'a, M> {
    tree: &'a IntervalTree<M>,
    stack: Vec<usize>,
    first: u32,
    last: u32,
}

impl<M> OverlapIter<'_, M> {
    fn push_left(&mut self, mut at: Option<usize>) {
        while let Some(idx) = at {
            let node = &self.tree.nodes[idx];
            if node.max_last < self.first {
                break;
            }
            self.stack.push(idx);
            at = node.left;
        }
    }
}

impl<'a, M> Iterator for OverlapIter<'a, M> {
    type Item = &'a Interval<M>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(idx) = self.stack.pop() {
            let node = &self.tree.nodes[idx];
            if node.interval.first() > self.last {
                // everything after this node in order starts even later
                self.stack.clear();
                return None;
            }
            self.push_left(node.right);
            if node.interval.last() >= self.first {
                return Some(&node.interval);
            }
        }
        None
    }
}
