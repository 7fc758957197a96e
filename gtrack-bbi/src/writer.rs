use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info};

use gtrack_core::models::Interval;
use gtrack_core::{GtrackError, Result};

use crate::block;
use crate::chrom_index::ChromIndex;
use crate::consts::{
    BBI_VERSION, CHROM_TREE_BLOCK_SIZE, FOOTER_SIZE, HEADER_SIZE, TOTAL_SUMMARY_SIZE,
    ZOOM_HEADER_SIZE, ZOOM_RECORD_SIZE,
};
use crate::header::{BbiHeader, Footer, ZoomHeader};
use crate::options::TrackWriterOptions;
use crate::rtree::{self, BlockRef};
use crate::summary::Summary;
use crate::value::{Entry, TrackValue};
use crate::zoom::{self, ZoomRecord};

enum WriterState<V> {
    /// buffering records until close
    Writing(Vec<Entry<V>>),
    /// close started; stays here if it failed
    Finalizing,
    Closed,
}

/// A compressed block waiting for its file offset.
struct PendingBlock {
    start_chrom: u32,
    start_base: u32,
    end_chrom: u32,
    end_base: u32,
    data: Vec<u8>,
}

/// Blocks of one section plus the largest block before compression.
#[derive(Default)]
struct Section {
    blocks: Vec<PendingBlock>,
    max_uncompressed: usize,
}

impl Section {
    fn push(&mut self, chrom_id: u32, start: u32, end: u32, raw: Vec<u8>, compress: bool) -> Result<()> {
        self.max_uncompressed = self.max_uncompressed.max(raw.len());
        self.blocks.push(PendingBlock {
            start_chrom: chrom_id,
            start_base: start,
            end_chrom: chrom_id,
            end_base: end,
            data: block::compress(&raw, compress)?,
        });
        Ok(())
    }

    fn bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.data.len() as u64).sum()
    }

    /// Block references for blocks laid out back to back from `offset`.
    fn refs(&self, mut offset: u64) -> Vec<BlockRef> {
        self.blocks
            .iter()
            .map(|b| {
                let r = BlockRef {
                    start_chrom: b.start_chrom,
                    start_base: b.start_base,
                    end_chrom: b.end_chrom,
                    end_base: b.end_base,
                    offset,
                    size: b.data.len() as u64,
                };
                offset += r.size;
                r
            })
            .collect()
    }

    fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        for b in &self.blocks {
            out.write_all(&b.data)?;
        }
        Ok(())
    }
}

///
/// Writes a track file in one go.
///
/// Records are buffered in memory in any order; [`TrackWriter::close`] sorts
/// them, cuts them into blocks, builds the R-tree and zoom levels and writes
/// the file front to back. The output only needs [`Write`], never [`std::io::Seek`],
/// because every offset is known before the first byte goes out.
///
/// A writer that is dropped without being closed leaves its output empty.
///
/// # Examples
///
/// ```
/// use gtrack_bbi::{BigWigReader, BigWigWriter, TrackWriterOptions};
/// use gtrack_core::models::Interval;
/// use std::io::Cursor;
///
/// let mut writer = BigWigWriter::new(
///     Vec::new(),
///     vec![("chr1".to_string(), 1000)],
///     TrackWriterOptions::default(),
/// )
/// .unwrap();
/// writer.push(Interval::new("chr1", 1, 100, 2.0f32).unwrap()).unwrap();
/// let bytes = writer.into_inner().unwrap();
///
/// let mut reader = BigWigReader::new(Cursor::new(bytes)).unwrap();
/// assert_eq!(reader.query("chr1", 50, 60).unwrap().len(), 1);
/// ```
pub struct TrackWriter<W: Write, V: TrackValue> {
    out: W,
    chroms: ChromIndex,
    options: TrackWriterOptions,
    state: WriterState<V>,
}

impl<V: TrackValue> TrackWriter<BufWriter<File>, V> {
    /// Create (or truncate) the file at `path` and write the track into it.
    pub fn create<P: AsRef<Path>>(
        path: P,
        chrom_sizes: Vec<(String, u32)>,
        options: TrackWriterOptions,
    ) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file), chrom_sizes, options)
    }
}

impl<W: Write, V: TrackValue> TrackWriter<W, V> {
    ///
    /// Start a track over the given chromosomes.
    ///
    /// # Arguments
    /// - out: destination of the finished file
    /// - chrom_sizes: `(name, length)` of every chromosome records may refer to
    /// - options: block, index and zoom settings, validated here
    pub fn new(out: W, chrom_sizes: Vec<(String, u32)>, options: TrackWriterOptions) -> Result<Self> {
        options.validate()?;
        let chroms = ChromIndex::new(chrom_sizes)?;
        Ok(TrackWriter {
            out,
            chroms,
            options,
            state: WriterState::Writing(Vec::new()),
        })
    }

    pub fn chroms(&self) -> &ChromIndex {
        &self.chroms
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, WriterState::Closed)
    }

    ///
    /// Buffer one record.
    ///
    /// The seqname must be one of the writer's chromosomes and the record must
    /// end within it. Fails once [`TrackWriter::close`] has been called.
    pub fn push(&mut self, interval: Interval<V>) -> Result<()> {
        let WriterState::Writing(entries) = &mut self.state else {
            return Err(GtrackError::Precondition(
                "cannot add records to a closed track writer".to_string(),
            ));
        };
        let Some(chrom) = self.chroms.by_name(interval.seqname()) else {
            return Err(GtrackError::Precondition(format!(
                "unknown chromosome '{}'",
                interval.seqname()
            )));
        };
        if interval.last() > chrom.length {
            return Err(GtrackError::Precondition(format!(
                "{interval} ends past the end of {} ({} bases)",
                chrom.name, chrom.length
            )));
        }
        entries.push(Entry::from_interval(chrom.id, interval));
        Ok(())
    }

    pub fn push_all<I>(&mut self, intervals: I) -> Result<()>
    where
        I: IntoIterator<Item = Interval<V>>,
    {
        for interval in intervals {
            self.push(interval)?;
        }
        Ok(())
    }

    ///
    /// Finish the file.
    ///
    /// Closing a closed writer does nothing. If finishing fails, the output is
    /// incomplete and every later call reports an error.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, WriterState::Finalizing) {
            WriterState::Closed => {
                self.state = WriterState::Closed;
                Ok(())
            }
            WriterState::Finalizing => Err(GtrackError::Precondition(
                "an earlier close failed, the track is incomplete".to_string(),
            )),
            WriterState::Writing(entries) => {
                self.finalize(entries)?;
                self.state = WriterState::Closed;
                Ok(())
            }
        }
    }

    /// Close the writer and hand back its output.
    pub fn into_inner(mut self) -> Result<W> {
        self.close()?;
        Ok(self.out)
    }

    fn finalize(&mut self, mut entries: Vec<Entry<V>>) -> Result<()> {
        entries.sort_by_key(|e| (e.chrom_id, e.start, e.end, e.strand));
        V::check(&entries)?;

        let options = &self.options;
        let field_count = V::field_count(&entries);
        let auto_sql = V::auto_sql(field_count);
        let widths = if entries.is_empty() {
            Vec::new()
        } else {
            zoom::reduction_levels(options, self.chroms.max_length())
        };

        let mut total = Summary::default();
        let mut data = Section::default();
        let mut levels: Vec<Vec<ZoomRecord>> = vec![Vec::new(); widths.len()];
        let limit = options.block_record_limit as usize;

        for group in entries.chunk_by(|a, b| a.chrom_id == b.chrom_id) {
            let chrom_id = group[0].chrom_id;
            let chrom_length = self.chroms.get(chrom_id).map_or(0, |c| c.length);

            let segments = V::value_segments(group)?;
            for segment in &segments {
                total.add_run(segment.value, segment.bases());
            }
            if let (Some(width), Some(finest)) = (widths.first(), levels.first_mut()) {
                zoom::bin_segments(chrom_id, chrom_length, *width, &segments, finest);
            }

            for chunk in group.chunks(limit) {
                let mut raw = Vec::new();
                V::encode_block(chrom_id, chunk, &mut raw)?;
                let end = chunk.iter().map(|e| e.end).max().unwrap_or(0);
                data.push(chrom_id, chunk[0].start, end, raw, options.compress)?;
            }
        }
        for k in 1..widths.len() {
            levels[k] = zoom::coarsen(&levels[k - 1], widths[k], &self.chroms);
        }

        let mut zoom_sections = Vec::with_capacity(levels.len());
        for records in &levels {
            let mut section = Section::default();
            for group in records.chunk_by(|a, b| a.chrom_id == b.chrom_id) {
                for chunk in group.chunks(limit) {
                    let mut raw = Vec::with_capacity(chunk.len() * ZOOM_RECORD_SIZE);
                    for record in chunk {
                        record.write(&mut raw)?;
                    }
                    let end = chunk.iter().map(|r| r.end).max().unwrap_or(0);
                    section.push(chunk[0].chrom_id, chunk[0].start, end, raw, options.compress)?;
                }
            }
            zoom_sections.push(section);
        }

        // lay out every section before writing anything
        let zoom_count = widths.len() as u64;
        let mut offset = HEADER_SIZE + zoom_count * ZOOM_HEADER_SIZE;
        let auto_sql_offset = match &auto_sql {
            Some(sql) => {
                let at = offset;
                offset += sql.len() as u64 + 1;
                at
            }
            None => 0,
        };
        let total_summary_offset = offset;
        offset += TOTAL_SUMMARY_SIZE;

        let chrom_tree_offset = offset;
        let chrom_tree = self.chroms.encode(chrom_tree_offset, CHROM_TREE_BLOCK_SIZE)?;
        offset += chrom_tree.len() as u64;

        let full_data_offset = offset;
        offset += 8;
        let data_refs = data.refs(offset);
        offset += data.bytes();

        let full_index_offset = offset;
        let data_index = rtree::encode(&data_refs, options.index_fanout, offset, offset)?;
        offset += data_index.len() as u64;

        let mut zoom_data_offsets = Vec::with_capacity(zoom_sections.len());
        let mut zoom_refs = Vec::with_capacity(zoom_sections.len());
        for section in &zoom_sections {
            zoom_data_offsets.push(offset);
            offset += 4;
            zoom_refs.push(section.refs(offset));
            offset += section.bytes();
        }
        let zoom_data_end = offset;

        let mut zoom_headers = Vec::with_capacity(zoom_sections.len());
        let mut zoom_indices = Vec::with_capacity(zoom_sections.len());
        for (k, refs) in zoom_refs.iter().enumerate() {
            let section_end = zoom_data_offsets
                .get(k + 1)
                .copied()
                .unwrap_or(zoom_data_end);
            let index = rtree::encode(refs, options.index_fanout, offset, section_end)?;
            zoom_headers.push(ZoomHeader {
                reduction_level: widths[k],
                data_offset: zoom_data_offsets[k],
                index_offset: offset,
            });
            offset += index.len() as u64;
            zoom_indices.push(index);
        }

        let max_uncompressed = zoom_sections
            .iter()
            .map(|s| s.max_uncompressed)
            .fold(data.max_uncompressed, usize::max);
        let uncompress_buf_size = if options.compress {
            u32::try_from(max_uncompressed).map_err(|_| {
                GtrackError::Precondition(format!(
                    "a block of {max_uncompressed} bytes is too large to index"
                ))
            })?
        } else {
            0
        };

        let header = BbiHeader {
            magic: V::MAGIC,
            version: BBI_VERSION,
            zoom_levels: widths.len() as u16,
            chrom_tree_offset,
            full_data_offset,
            full_index_offset,
            field_count,
            defined_field_count: field_count,
            auto_sql_offset,
            total_summary_offset,
            uncompress_buf_size,
        };

        debug!(
            "Track layout: chrom tree at {chrom_tree_offset}, data at {full_data_offset}, \
             index at {full_index_offset}, zoom levels {widths:?}"
        );

        let out = &mut self.out;
        header.write(out)?;
        for zoom_header in &zoom_headers {
            zoom_header.write(out)?;
        }
        if let Some(sql) = &auto_sql {
            out.write_all(sql.as_bytes())?;
            out.write_u8(0)?;
        }
        total.write(out)?;
        out.write_all(&chrom_tree)?;
        out.write_u64::<LittleEndian>(data.blocks.len() as u64)?;
        data.write(out)?;
        out.write_all(&data_index)?;
        for (records, section) in levels.iter().zip(&zoom_sections) {
            let count = u32::try_from(records.len()).map_err(|_| {
                GtrackError::Precondition(format!(
                    "zoom level with {} bins is too large",
                    records.len()
                ))
            })?;
            out.write_u32::<LittleEndian>(count)?;
            section.write(out)?;
        }
        for index in &zoom_indices {
            out.write_all(index)?;
        }
        Footer::for_header(&header).write(out)?;
        out.flush()?;

        info!(
            "Finished track: {} records in {} blocks over {} chromosomes, {} zoom levels, {} bytes",
            entries.len(),
            data.blocks.len(),
            self.chroms.len(),
            widths.len(),
            offset + FOOTER_SIZE
        );
        Ok(())
    }
}
