//! Indexed, compressed genomic track files with multi-resolution summaries.
//!
//! A track is written once and then queried by range. The on-disk layout is
//! the BBI family used by BigWig and BigBed: a chromosome B+ tree, zlib
//! compressed data blocks, an R-tree over the blocks and a stack of zoom
//! levels, each with its own R-tree, so a summary over a megabase reads a
//! handful of bins instead of every record.
//!
//! ## Track kinds
//!
//! - **signal** (`f32` values, BigWig layout): non-overlapping ranges with a value
//! - **feature** ([`BedFeature`], BigBed layout): possibly overlapping ranges with
//!   optional BED columns; summaries describe coverage depth
//!
//! ## Quick Start
//!
//! ```rust
//! use std::io::Cursor;
//!
//! use gtrack_bbi::{BigBedReader, BigBedWriter, BedFeature, TrackWriterOptions};
//! use gtrack_core::models::{Interval, Strand};
//!
//! let mut writer = BigBedWriter::new(
//!     Vec::new(),
//!     vec![("chr1".to_string(), 10_000), ("chr2".to_string(), 5_000)],
//!     TrackWriterOptions::default(),
//! )
//! .unwrap();
//! writer
//!     .push(
//!         Interval::new("chr1", 101, 200, BedFeature::new().with_name("peak1"))
//!             .unwrap()
//!             .with_strand(Strand::Forward),
//!     )
//!     .unwrap();
//! writer
//!     .push(Interval::new("chr1", 151, 400, BedFeature::new().with_name("peak2")).unwrap())
//!     .unwrap();
//! let bytes = writer.into_inner().unwrap();
//!
//! let mut reader = BigBedReader::new(Cursor::new(bytes)).unwrap();
//! let hits = reader.query("chr1", 190, 210).unwrap();
//! assert_eq!(hits.len(), 2);
//! assert_eq!(hits[0].metadata().name().unwrap(), "peak1");
//!
//! let depth = reader.summarize("chr1", 1, 10_000).unwrap();
//! assert_eq!(depth.covered_bases(), 300);
//! assert_eq!(depth.max(), Some(2.0));
//! ```

pub mod bed_feature;
mod block;
pub mod chrom_index;
pub mod consts;
pub mod header;
pub mod options;

/// Read side: range queries, zoom queries, summaries and full scans.
///
/// See [`TrackReader`] for details.
pub mod reader;

/// Chromosome-interval R-tree over data and zoom blocks.
pub mod rtree;

pub mod summary;
pub mod value;

/// Write side: buffering, block building and file layout.
///
/// See [`TrackWriter`] for details.
pub mod writer;

/// Per-bin summaries at decreasing resolution.
pub mod zoom;

// re-exports
pub use self::bed_feature::BedFeature;
pub use self::chrom_index::{ChromIndex, ChromInfo};
pub use self::options::TrackWriterOptions;
pub use self::reader::{Records, SummaryPath, TrackReader};
pub use self::summary::{Moments, Summary, ValueSegment};
pub use self::value::{Entry, TrackValue};
pub use self::writer::TrackWriter;
pub use self::zoom::ZoomRecord;

/// Writer of signal tracks.
pub type BigWigWriter<W> = TrackWriter<W, f32>;
/// Reader of signal tracks.
pub type BigWigReader<R> = TrackReader<R, f32>;
/// Writer of feature tracks.
pub type BigBedWriter<W> = TrackWriter<W, BedFeature>;
/// Reader of feature tracks.
pub type BigBedReader<R> = TrackReader<R, BedFeature>;

/// Open a signal track file.
pub fn open_bigwig<P: AsRef<std::path::Path>>(
    path: P,
) -> gtrack_core::Result<BigWigReader<std::io::BufReader<std::fs::File>>> {
    TrackReader::open(path)
}

/// Open a feature track file.
pub fn open_bigbed<P: AsRef<std::path::Path>>(
    path: P,
) -> gtrack_core::Result<BigBedReader<std::io::BufReader<std::fs::File>>> {
    TrackReader::open(path)
}
