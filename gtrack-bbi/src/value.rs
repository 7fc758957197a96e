//! The two kinds of records a track can hold.
use gtrack_core::models::{Interval, Strand};
use gtrack_core::{GtrackError, Result};
use gtrack_overlaprs::DepthSweep;

use crate::bed_feature::BedFeature;
use crate::block;
use crate::consts::{BIGBED_MAGIC, BIGWIG_MAGIC};
use crate::summary::ValueSegment;

///
/// A record as stored on disk: chromosome id and a 0-based half-open
/// `[start, end)` range.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<V> {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub strand: Strand,
    pub value: V,
}

impl<V> Entry<V> {
    pub(crate) fn from_interval(chrom_id: u32, interval: Interval<V>) -> Self {
        let (start, end, strand) = (interval.first() - 1, interval.last(), interval.strand());
        Entry {
            chrom_id,
            start,
            end,
            strand,
            value: interval.into_metadata(),
        }
    }

    pub(crate) fn into_interval(self, seqname: &str) -> Result<Interval<V>> {
        Ok(Interval::new(seqname, self.start + 1, self.end, self.value)?.with_strand(self.strand))
    }

    pub(crate) fn overlaps(&self, chrom_id: u32, start: u32, end: u32) -> bool {
        self.chrom_id == chrom_id && self.start < end && self.end > start
    }
}

///
/// Metadata types a track can store, one per track kind.
///
/// `f32` makes a signal track (BigWig layout): each record is a value over a
/// range and ranges on one chromosome may not overlap. [`BedFeature`] makes a
/// feature track (BigBed layout): records may overlap and summaries describe
/// how many features cover each base.
///
pub trait TrackValue: Clone + Sized {
    /// Magic number identifying the track kind in header and footer.
    const MAGIC: u32;

    /// Reject record sets the kind cannot store. `entries` are sorted.
    fn check(entries: &[Entry<Self>]) -> Result<()>;

    /// BED field count for the header (0 for signal tracks).
    fn field_count(entries: &[Entry<Self>]) -> u16;

    /// Table declaration written alongside feature tracks.
    fn auto_sql(field_count: u16) -> Option<String>;

    /// Append the uncompressed block for `entries` (all on `chrom_id`) to `out`.
    fn encode_block(chrom_id: u32, entries: &[Entry<Self>], out: &mut Vec<u8>) -> Result<()>;

    fn decode_block(data: &[u8]) -> Result<Vec<Entry<Self>>>;

    ///
    /// Non-overlapping runs of per-base values for sorted `entries` of one
    /// chromosome. Uncovered bases produce no run.
    fn value_segments(entries: &[Entry<Self>]) -> Result<Vec<ValueSegment>>;
}

impl TrackValue for f32 {
    const MAGIC: u32 = BIGWIG_MAGIC;

    fn check(entries: &[Entry<f32>]) -> Result<()> {
        if let Some(stranded) = entries.iter().find(|e| e.strand != Strand::Both) {
            return Err(GtrackError::Precondition(format!(
                "signal records carry no strand, got '{}' at [{}, {}) on chromosome id {}",
                stranded.strand, stranded.start, stranded.end, stranded.chrom_id
            )));
        }
        for pair in entries.windows(2) {
            if pair[0].chrom_id == pair[1].chrom_id && pair[1].start < pair[0].end {
                return Err(GtrackError::Precondition(format!(
                    "signal records overlap: [{}, {}) and [{}, {}) on chromosome id {}",
                    pair[0].start, pair[0].end, pair[1].start, pair[1].end, pair[0].chrom_id
                )));
            }
        }
        Ok(())
    }

    fn field_count(_entries: &[Entry<f32>]) -> u16 {
        0
    }

    fn auto_sql(_field_count: u16) -> Option<String> {
        None
    }

    fn encode_block(chrom_id: u32, entries: &[Entry<f32>], out: &mut Vec<u8>) -> Result<()> {
        block::encode_signal(chrom_id, entries, out)
    }

    fn decode_block(data: &[u8]) -> Result<Vec<Entry<f32>>> {
        block::decode_signal(data)
    }

    fn value_segments(entries: &[Entry<f32>]) -> Result<Vec<ValueSegment>> {
        Ok(entries
            .iter()
            .map(|e| ValueSegment {
                start: e.start,
                end: e.end,
                value: e.value as f64,
            })
            .collect())
    }
}

/// autoSql column declarations of the standard BED fields.
const BED_AUTO_SQL_FIELDS: [&str; 12] = [
    "string chrom;       \"Reference sequence chromosome or scaffold\"",
    "uint   chromStart;  \"Start position in chromosome\"",
    "uint   chromEnd;    \"End position in chromosome\"",
    "string name;        \"Name of item\"",
    "uint   score;       \"Score from 0-1000\"",
    "char[1] strand;     \"+ or -\"",
    "uint   thickStart;  \"Start of where display should be thick (start codon)\"",
    "uint   thickEnd;    \"End of where display should be thick (stop codon)\"",
    "uint   reserved;    \"Used as itemRgb as of 2004-11-22\"",
    "int    blockCount;  \"Number of blocks\"",
    "int[blockCount] blockSizes; \"Comma separated list of block sizes\"",
    "int[blockCount] chromStarts; \"Start positions relative to chromStart\"",
];

impl TrackValue for BedFeature {
    const MAGIC: u32 = BIGBED_MAGIC;

    fn check(entries: &[Entry<BedFeature>]) -> Result<()> {
        entries.iter().try_for_each(|e| e.value.validate())
    }

    fn field_count(entries: &[Entry<BedFeature>]) -> u16 {
        3 + entries
            .iter()
            .map(|e| e.value.column_count(e.strand))
            .max()
            .unwrap_or(0)
    }

    fn auto_sql(field_count: u16) -> Option<String> {
        let mut sql = String::from("table bed\n\"Browser Extensible Data\"\n(\n");
        for field in BED_AUTO_SQL_FIELDS.iter().take(field_count as usize) {
            sql.push_str("   ");
            sql.push_str(field);
            sql.push('\n');
        }
        sql.push_str(")\n");
        Some(sql)
    }

    fn encode_block(_chrom_id: u32, entries: &[Entry<BedFeature>], out: &mut Vec<u8>) -> Result<()> {
        block::encode_features(entries, |e| e.value.encode(e.strand), out)
    }

    fn decode_block(data: &[u8]) -> Result<Vec<Entry<BedFeature>>> {
        block::decode_features(data)?
            .into_iter()
            .map(|raw| {
                let (value, strand) = BedFeature::decode(raw.rest)?;
                Ok(Entry {
                    chrom_id: raw.chrom_id,
                    start: raw.start,
                    end: raw.end,
                    strand,
                    value,
                })
            })
            .collect()
    }

    /// Coverage depth: how many features overlap each base.
    fn value_segments(entries: &[Entry<BedFeature>]) -> Result<Vec<ValueSegment>> {
        let mut sweep = DepthSweep::new();
        let mut segments = Vec::new();
        for entry in entries {
            sweep.push(entry.start + 1, entry.end)?;
            while let Some(segment) = sweep.pop() {
                segments.push(depth_segment(segment));
            }
        }
        sweep.finish();
        while let Some(segment) = sweep.pop() {
            segments.push(depth_segment(segment));
        }
        Ok(segments)
    }
}

fn depth_segment(segment: gtrack_overlaprs::DepthSegment) -> ValueSegment {
    ValueSegment {
        start: segment.first - 1,
        end: segment.last,
        value: segment.depth as f64,
    }
}
