//! Genomic interval overlap operations for the gtrack workspace.
//!
//! This crate holds every overlap algorithm used by gtrack. Higher-level crates (the
//! indexed track engine in `gtrack-bbi`) feed their data through these types instead of
//! reimplementing overlap logic.
//!
//! ## Features
//!
//! - **In-memory collections**: [`IntervalCollection`] keeps one balanced [`IntervalTree`]
//!   per seqname and answers overlap queries in O(log n + k)
//! - **Streaming intersection**: [`intersect`] merge-joins two sorted [`IntervalSource`]s,
//!   in memory or file-backed, holding only a small look-back window
//! - **Coverage**: [`CoverageIter`] turns a sorted source into constant-depth segments
//!
//! ## Quick Start
//!
//! ```rust
//! use gtrack_core::models::Interval;
//! use gtrack_overlaprs::{IntervalCollection, IterSource, intersect};
//!
//! let peaks = vec![
//!     Interval::new("chr1", 100, 200, "peak1").unwrap(),
//!     Interval::new("chr1", 150, 300, "peak2").unwrap(),
//!     Interval::new("chr2", 400, 500, "peak3").unwrap(),
//! ];
//! let genes = vec![Interval::new("chr1", 180, 250, "gene1").unwrap()];
//!
//! // in memory
//! let peak_set: IntervalCollection<&str> = peaks.iter().cloned().collect();
//! let gene_set: IntervalCollection<&str> = genes.iter().cloned().collect();
//! assert_eq!(peak_set.overlaps(&gene_set).count(), 2);
//!
//! // streaming, over inputs that are already sorted
//! let pairs = intersect(
//!     IterSource::new(peaks.into_iter()),
//!     IterSource::new(genes.into_iter()),
//! );
//! assert_eq!(pairs.count(), 2);
//! ```

/// Genome-wide collections of interval trees.
///
/// See [`IntervalCollection`] for details.
pub mod collection;

/// Depth-of-coverage sweeps.
pub mod coverage;

/// Sorted-stream merge-join.
///
/// See [`IntersectIter`] for details.
pub mod intersect;

/// Arena-backed AVL interval tree.
///
/// See [`IntervalTree`] for details.
pub mod interval_tree;

pub mod stream_buffer;

/// Core traits for overlap operations.
///
/// See [`Overlapper`] and [`IntervalSource`].
pub mod traits;

// re-exports
pub use self::collection::IntervalCollection;
pub use self::coverage::{CoverageIter, DepthSegment, DepthSweep};
pub use self::intersect::{IntersectIter, intersect, intersect_by};
pub use self::interval_tree::IntervalTree;
pub use self::stream_buffer::StreamBuffer;
pub use self::traits::{FallibleSource, IntervalSource, IterSource, Overlapper};
