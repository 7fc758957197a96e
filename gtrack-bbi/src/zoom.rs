//! Zoom levels: per-bin summaries at decreasing resolution.
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use gtrack_core::{GtrackError, Result};

use crate::chrom_index::ChromIndex;
use crate::consts::ZOOM_RECORD_SIZE;
use crate::options::TrackWriterOptions;
use crate::summary::{Summary, ValueSegment};

///
/// Summary of one bin `[start, end)` of one zoom level.
///
/// Bins of a level with width `w` start at multiples of `w` and are clipped to
/// the chromosome length. Bins without covered bases are not stored.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRecord {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub summary: Summary,
}

impl ZoomRecord {
    pub(crate) fn overlaps(&self, chrom_id: u32, start: u32, end: u32) -> bool {
        self.chrom_id == chrom_id && self.start < end && self.end > start
    }

    /// Append the 32-byte on-disk form; statistics are narrowed to `f32`.
    pub(crate) fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let s = &self.summary;
        out.write_u32::<LittleEndian>(self.chrom_id)?;
        out.write_u32::<LittleEndian>(self.start)?;
        out.write_u32::<LittleEndian>(self.end)?;
        out.write_u32::<LittleEndian>(u32::try_from(s.covered_bases()).unwrap_or(u32::MAX))?;
        out.write_f32::<LittleEndian>(s.min().unwrap_or(0.0) as f32)?;
        out.write_f32::<LittleEndian>(s.max().unwrap_or(0.0) as f32)?;
        out.write_f32::<LittleEndian>(s.sum() as f32)?;
        out.write_f32::<LittleEndian>(s.sum_squares() as f32)?;
        Ok(())
    }

    pub(crate) fn decode_block(data: &[u8]) -> Result<Vec<ZoomRecord>> {
        if data.len() % ZOOM_RECORD_SIZE != 0 {
            return Err(GtrackError::Format(format!(
                "zoom block of {} bytes is not a whole number of records",
                data.len()
            )));
        }
        let mut records = Vec::with_capacity(data.len() / ZOOM_RECORD_SIZE);
        let mut cursor = data;
        while !cursor.is_empty() {
            let chrom_id = cursor.read_u32::<LittleEndian>()?;
            let start = cursor.read_u32::<LittleEndian>()?;
            let end = cursor.read_u32::<LittleEndian>()?;
            let valid_count = cursor.read_u32::<LittleEndian>()?;
            let min = cursor.read_f32::<LittleEndian>()?;
            let max = cursor.read_f32::<LittleEndian>()?;
            let sum = cursor.read_f32::<LittleEndian>()?;
            let sum_squares = cursor.read_f32::<LittleEndian>()?;
            if start >= end {
                return Err(GtrackError::Format(format!(
                    "zoom record with empty range {start}..{end}"
                )));
            }
            records.push(ZoomRecord {
                chrom_id,
                start,
                end,
                summary: Summary::from_parts(
                    valid_count as u64,
                    min as f64,
                    max as f64,
                    sum as f64,
                    sum_squares as f64,
                ),
            });
        }
        Ok(records)
    }
}

///
/// Bin widths of the zoom levels to build, finest first.
///
/// Level `k` (1-based) is `bin_size * zoom_scale_factor^(k-1)` bases wide.
/// Levels stop at `max_zoom_levels`, at the first width wider than the
/// longest chromosome, or when the width no longer fits in a `u32`.
pub(crate) fn reduction_levels(options: &TrackWriterOptions, longest_chrom: u32) -> Vec<u32> {
    let mut levels = Vec::new();
    let mut width = Some(options.bin_size);
    while let Some(w) = width {
        if levels.len() >= options.max_zoom_levels as usize || w > longest_chrom {
            break;
        }
        levels.push(w);
        width = w.checked_mul(options.zoom_scale_factor);
    }
    levels
}

///
/// Bin the value runs of one chromosome into the finest zoom level.
///
/// `segments` must be sorted and non-overlapping; a run crossing a bin
/// boundary is split between the bins.
pub(crate) fn bin_segments(
    chrom_id: u32,
    chrom_length: u32,
    width: u32,
    segments: &[ValueSegment],
    out: &mut Vec<ZoomRecord>,
) {
    let mut current: Option<ZoomRecord> = None;
    for segment in segments {
        let mut start = segment.start;
        while start < segment.end {
            let bin_start = start - start % width;
            let bin_end = bin_start.saturating_add(width).min(chrom_length);
            let end = segment.end.min(bin_end);
            if end <= start {
                // run extends past the chromosome end
                break;
            }

            if current.as_ref().is_some_and(|r| r.start != bin_start) {
                out.extend(current.take());
            }
            let record = current.get_or_insert(ZoomRecord {
                chrom_id,
                start: bin_start,
                end: bin_end,
                summary: Summary::default(),
            });
            record.summary.add_run(segment.value, (end - start) as u64);
            start = end;
        }
    }
    out.extend(current);
}

///
/// Merge a level's records into bins `width` bases wide.
///
/// `width` must be a multiple of the finer level's width, so every finer bin
/// falls entirely into one coarser bin.
pub(crate) fn coarsen(finer: &[ZoomRecord], width: u32, chroms: &ChromIndex) -> Vec<ZoomRecord> {
    let mut coarser: Vec<ZoomRecord> = Vec::new();
    for record in finer {
        let bin_start = record.start - record.start % width;
        match coarser.last_mut() {
            Some(last) if last.chrom_id == record.chrom_id && last.start == bin_start => {
                last.summary.merge(&record.summary);
            }
            _ => {
                let chrom_length = chroms.get(record.chrom_id).map_or(record.end, |c| c.length);
                coarser.push(ZoomRecord {
                    chrom_id: record.chrom_id,
                    start: bin_start,
                    end: bin_start.saturating_add(width).min(chrom_length),
                    summary: record.summary,
                });
            }
        }
    }
    coarser
}
