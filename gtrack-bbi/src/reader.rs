use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::Path;

use log::{debug, warn};

use gtrack_core::models::Interval;
use gtrack_core::{GtrackError, Result};

use crate::block;
use crate::chrom_index::ChromIndex;
use crate::consts::{FOOTER_SIZE, HEADER_SIZE, MAX_AUTO_SQL_SIZE, MAX_VALUES_SPAN};
use crate::header::{BbiHeader, Footer, ZoomHeader};
use crate::rtree::{BlockRef, RTreeHeader};
use crate::summary::{Moments, Summary};
use crate::value::{Entry, TrackValue};
use crate::zoom::ZoomRecord;

///
/// Where [`TrackReader::summarize_with`] takes its numbers from.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryPath {
    /// The coarsest zoom level whose bins fit in the query, raw records otherwise.
    #[default]
    Auto,
    /// Decode every record in the range.
    Raw,
    /// A specific zoom level, 1 being the finest.
    Zoom(usize),
}

///
/// Random access to a finished track file.
///
/// Opening reads the header, footer, zoom headers, total summary and the
/// chromosome table; the R-tree headers are loaded on first use and data
/// blocks are only decoded for the ranges a query touches.
///
/// Positions in queries are 1-based and inclusive, like [`Interval`].
///
pub struct TrackReader<R: Read + Seek, V: TrackValue> {
    input: R,
    header: BbiHeader,
    zoom_headers: Vec<ZoomHeader>,
    auto_sql: Option<String>,
    summary: Summary,
    chroms: ChromIndex,
    data_index: Option<RTreeHeader>,
    zoom_indices: Vec<Option<RTreeHeader>>,
    _value: PhantomData<V>,
}

impl<V: TrackValue> TrackReader<BufReader<File>, V> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek, V: TrackValue> TrackReader<R, V> {
    ///
    /// Validate the file and load its tables.
    ///
    /// Fails with [`GtrackError::Format`] when the magic number is not the one
    /// of this track kind, or when the footer does not repeat the header (a
    /// truncated or overwritten file).
    pub fn new(mut input: R) -> Result<Self> {
        input.seek(SeekFrom::Start(0))?;
        let header = BbiHeader::read(&mut input, V::MAGIC)?;

        let file_size = input.seek(SeekFrom::End(0))?;
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(GtrackError::Format(format!(
                "truncated file of {file_size} bytes"
            )));
        }
        input.seek(SeekFrom::Start(file_size - FOOTER_SIZE))?;
        Footer::read(&mut input)?.check(&header)?;

        input.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut zoom_headers = Vec::with_capacity(header.zoom_levels as usize);
        for _ in 0..header.zoom_levels {
            let zoom_header = ZoomHeader::read(&mut input)?;
            if zoom_header.reduction_level == 0 {
                return Err(GtrackError::Format(
                    "zoom level with zero bin width".to_string(),
                ));
            }
            zoom_headers.push(zoom_header);
        }

        let auto_sql = match header.auto_sql_offset {
            0 => None,
            offset => Some(read_auto_sql(&mut input, offset)?),
        };
        let summary = match header.total_summary_offset {
            0 => Summary::default(),
            offset => {
                input.seek(SeekFrom::Start(offset))?;
                Summary::read(&mut input)?
            }
        };
        let chroms = ChromIndex::read(&mut input, header.chrom_tree_offset)?;

        debug!(
            "Opened track: {} chromosomes, zoom levels {:?}, {file_size} bytes",
            chroms.len(),
            zoom_headers.iter().map(|z| z.reduction_level).collect::<Vec<_>>()
        );

        let zoom_indices = vec![None; zoom_headers.len()];
        Ok(TrackReader {
            input,
            header,
            zoom_headers,
            auto_sql,
            summary,
            chroms,
            data_index: None,
            zoom_indices,
            _value: PhantomData,
        })
    }

    pub fn header(&self) -> &BbiHeader {
        &self.header
    }

    /// `(name, length)` of every chromosome, in natural name order.
    pub fn chromosomes(&self) -> Vec<(&str, u32)> {
        self.chroms
            .natural_order()
            .into_iter()
            .map(|c| (c.name.as_str(), c.length))
            .collect()
    }

    pub fn chrom_index(&self) -> &ChromIndex {
        &self.chroms
    }

    /// Bin widths of the zoom levels, finest first.
    pub fn zoom_levels(&self) -> Vec<u32> {
        self.zoom_headers.iter().map(|z| z.reduction_level).collect()
    }

    /// Totals over the whole file.
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn auto_sql(&self) -> Option<&str> {
        self.auto_sql.as_deref()
    }

    ///
    /// Every record overlapping `first..=last` on `chrom`, in position order.
    ///
    /// A chromosome the track does not know yields no records.
    pub fn query(&mut self, chrom: &str, first: u32, last: u32) -> Result<Vec<Interval<V>>> {
        check_range(first, last)?;
        let Some((chrom_id, name, _)) = self.resolve(chrom) else {
            return Ok(Vec::new());
        };
        self.entries(chrom_id, first - 1, last)?
            .into_iter()
            .map(|e| e.into_interval(&name))
            .collect()
    }

    ///
    /// The bins of zoom level `level` (1-based, finest first) overlapping
    /// `first..=last` on `chrom`.
    ///
    pub fn query_zoom(
        &mut self,
        level: usize,
        chrom: &str,
        first: u32,
        last: u32,
    ) -> Result<Vec<Interval<Summary>>> {
        check_range(first, last)?;
        let level = self.level_index(level)?;
        let Some((chrom_id, name, _)) = self.resolve(chrom) else {
            return Ok(Vec::new());
        };
        self.zoom_records(level, chrom_id, first - 1, last)?
            .into_iter()
            .map(|r| Interval::new(name.as_str(), r.start + 1, r.end, r.summary))
            .collect()
    }

    ///
    /// Per-base values over `first..=last`, `NaN` where nothing is recorded.
    ///
    /// Signal tracks give the stored value, feature tracks the number of
    /// features covering the base. The range is clipped to the chromosome, so
    /// the vector has one value per base from `first` to `min(last, length)`
    /// and is empty for an unknown chromosome. Spans over
    /// [`MAX_VALUES_SPAN`] bases after clipping are rejected.
    pub fn values(&mut self, chrom: &str, first: u32, last: u32) -> Result<Vec<f32>> {
        check_range(first, last)?;
        let Some((chrom_id, _, chrom_length)) = self.resolve(chrom) else {
            return Ok(Vec::new());
        };
        let (start, end) = (first - 1, last.min(chrom_length));
        if start >= end {
            return Ok(Vec::new());
        }
        if end - start > MAX_VALUES_SPAN {
            return Err(GtrackError::Precondition(format!(
                "per-base values over {} bases exceed the limit of {MAX_VALUES_SPAN}, summarize instead",
                end - start
            )));
        }

        let mut values = vec![f32::NAN; (end - start) as usize];
        let entries = self.entries(chrom_id, start, end)?;
        for segment in V::value_segments(&entries)? {
            if let Some(s) = segment.clip(start, end) {
                values[(s.start - start) as usize..(s.end - start) as usize].fill(s.value as f32);
            }
        }
        Ok(values)
    }

    pub fn summarize(&mut self, chrom: &str, first: u32, last: u32) -> Result<Summary> {
        self.summarize_with(chrom, first, last, SummaryPath::Auto)
    }

    ///
    /// Covered bases, min, max, sum and mean of the values over `first..=last`.
    ///
    /// A zoom level answers the whole bins inside the range and raw records
    /// fill in the partial bins at either end, so every path gives the same
    /// answer up to `f32` rounding of the stored bin sums.
    pub fn summarize_with(
        &mut self,
        chrom: &str,
        first: u32,
        last: u32,
        path: SummaryPath,
    ) -> Result<Summary> {
        Ok(self.aggregate(chrom, first, last, path)?.0)
    }

    pub fn stddev(&mut self, chrom: &str, first: u32, last: u32) -> Result<Option<f64>> {
        self.stddev_with(chrom, first, last, SummaryPath::Auto)
    }

    /// Population standard deviation of the per-base values, `None` when no base is covered.
    pub fn stddev_with(
        &mut self,
        chrom: &str,
        first: u32,
        last: u32,
        path: SummaryPath,
    ) -> Result<Option<f64>> {
        Ok(self.aggregate(chrom, first, last, path)?.1.stddev())
    }

    ///
    /// Every record in the file: chromosomes in natural order, records in
    /// position order within each. Blocks are decoded as the iterator reaches
    /// them.
    ///
    /// Wrap it in [`gtrack_overlaprs::FallibleSource`] to feed it to
    /// [`gtrack_overlaprs::intersect`].
    pub fn records(&mut self) -> Records<'_, R, V> {
        let chroms = self
            .chroms
            .natural_order()
            .into_iter()
            .map(|c| (c.id, c.name.clone()))
            .collect::<Vec<_>>()
            .into_iter();
        Records {
            reader: self,
            chroms,
            chrom_id: 0,
            chrom_name: String::new(),
            blocks: Vec::new().into_iter(),
            pending: Vec::new().into_iter(),
            done: false,
        }
    }

    fn resolve(&self, chrom: &str) -> Option<(u32, String, u32)> {
        match self.chroms.by_name(chrom) {
            Some(c) => Some((c.id, c.name.clone(), c.length)),
            None => {
                warn!("Chromosome {chrom} is not part of this track");
                None
            }
        }
    }

    fn level_index(&self, level: usize) -> Result<usize> {
        if level == 0 || level > self.zoom_headers.len() {
            return Err(GtrackError::Precondition(format!(
                "zoom level {level} does not exist, the track has {}",
                self.zoom_headers.len()
            )));
        }
        Ok(level - 1)
    }

    fn data_index(&mut self) -> Result<RTreeHeader> {
        if let Some(index) = self.data_index {
            return Ok(index);
        }
        let index = RTreeHeader::read(&mut self.input, self.header.full_index_offset)?;
        debug!("Loaded data index with {} blocks", index.item_count);
        self.data_index = Some(index);
        Ok(index)
    }

    fn zoom_index(&mut self, level: usize) -> Result<RTreeHeader> {
        if let Some(index) = self.zoom_indices[level] {
            return Ok(index);
        }
        let index = RTreeHeader::read(&mut self.input, self.zoom_headers[level].index_offset)?;
        debug!(
            "Loaded index of zoom level {} with {} blocks",
            level + 1,
            index.item_count
        );
        self.zoom_indices[level] = Some(index);
        Ok(index)
    }

    fn read_block(&mut self, block: &BlockRef) -> Result<Vec<u8>> {
        block::read_block(
            &mut self.input,
            block.offset,
            block.size,
            self.header.uncompress_buf_size,
        )
    }

    /// Records overlapping 0-based `[start, end)`.
    fn entries(&mut self, chrom_id: u32, start: u32, end: u32) -> Result<Vec<Entry<V>>> {
        let index = self.data_index()?;
        let mut entries = Vec::new();
        for block in index.search(&mut self.input, chrom_id, start, end)? {
            let data = self.read_block(&block)?;
            entries.extend(
                V::decode_block(&data)?
                    .into_iter()
                    .filter(|e| e.overlaps(chrom_id, start, end)),
            );
        }
        entries.sort_by_key(|e| (e.start, e.end, e.strand));
        Ok(entries)
    }

    fn zoom_records(
        &mut self,
        level: usize,
        chrom_id: u32,
        start: u32,
        end: u32,
    ) -> Result<Vec<ZoomRecord>> {
        let index = self.zoom_index(level)?;
        let mut records = Vec::new();
        for block in index.search(&mut self.input, chrom_id, start, end)? {
            let data = self.read_block(&block)?;
            records.extend(
                ZoomRecord::decode_block(&data)?
                    .into_iter()
                    .filter(|r| r.overlaps(chrom_id, start, end)),
            );
        }
        Ok(records)
    }

    /// Coarsest zoom level whose bins are no wider than `span` bases.
    fn auto_level(&self, span: u32) -> Option<usize> {
        self.zoom_headers
            .iter()
            .enumerate()
            .filter(|(_, z)| z.reduction_level <= span)
            .max_by_key(|(_, z)| z.reduction_level)
            .map(|(k, _)| k)
    }

    fn aggregate(
        &mut self,
        chrom: &str,
        first: u32,
        last: u32,
        path: SummaryPath,
    ) -> Result<(Summary, Moments)> {
        check_range(first, last)?;
        let level = match path {
            SummaryPath::Zoom(level) => Some(self.level_index(level)?),
            _ => None,
        };
        let mut summary = Summary::default();
        let mut moments = Moments::default();
        let Some((chrom_id, _, chrom_length)) = self.resolve(chrom) else {
            return Ok((summary, moments));
        };

        let (start, end) = (first - 1, last.min(chrom_length));
        if start >= end {
            return Ok((summary, moments));
        }
        let level = match path {
            SummaryPath::Auto => self.auto_level(end - start),
            _ => level,
        };

        // whole bins come from the zoom level, the ragged ends from raw records
        let mut raw = vec![(start, end)];
        if let Some(level) = level {
            let width = self.zoom_headers[level].reduction_level as u64;
            let inner_start = (start as u64).div_ceil(width) * width;
            let inner_end = if end == chrom_length {
                end as u64
            } else {
                end as u64 / width * width
            };
            if inner_start < inner_end {
                let (inner_start, inner_end) = (inner_start as u32, inner_end as u32);
                raw = vec![(start, inner_start), (inner_end, end)];
                for record in self.zoom_records(level, chrom_id, inner_start, inner_end)? {
                    if record.start >= inner_start && record.start < inner_end {
                        summary.merge(&record.summary);
                        moments.merge(&Moments::from_summary(&record.summary));
                    }
                }
            }
        }

        for (start, end) in raw {
            if start >= end {
                continue;
            }
            let entries = self.entries(chrom_id, start, end)?;
            for segment in V::value_segments(&entries)? {
                if let Some(s) = segment.clip(start, end) {
                    summary.add_run(s.value, s.bases());
                    moments.add_run(s.value, s.bases());
                }
            }
        }
        Ok((summary, moments))
    }
}

fn check_range(first: u32, last: u32) -> Result<()> {
    if first == 0 || first > last {
        return Err(GtrackError::Precondition(format!(
            "invalid query range {first}..={last}, positions are 1-based and first must not exceed last"
        )));
    }
    Ok(())
}

fn read_auto_sql<R: Read + Seek>(input: &mut R, offset: u64) -> Result<String> {
    input.seek(SeekFrom::Start(offset))?;
    let mut text = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = input.read(&mut chunk)?;
        if n == 0 {
            return Err(GtrackError::Format("unterminated autoSql text".to_string()));
        }
        if let Some(nul) = chunk[..n].iter().position(|&b| b == 0) {
            text.extend_from_slice(&chunk[..nul]);
            break;
        }
        text.extend_from_slice(&chunk[..n]);
        if text.len() > MAX_AUTO_SQL_SIZE {
            return Err(GtrackError::Format("autoSql text is too long".to_string()));
        }
    }
    String::from_utf8(text).map_err(|_| GtrackError::Format("autoSql text is not UTF-8".to_string()))
}

///
/// Lazy full scan created by [`TrackReader::records`].
///
/// Stops after the first error.
pub struct Records<'a, R: Read + Seek, V: TrackValue> {
    reader: &'a mut TrackReader<R, V>,
    chroms: std::vec::IntoIter<(u32, String)>,
    chrom_id: u32,
    chrom_name: String,
    blocks: std::vec::IntoIter<BlockRef>,
    pending: std::vec::IntoIter<Entry<V>>,
    done: bool,
}

impl<R: Read + Seek, V: TrackValue> Records<'_, R, V> {
    fn advance(&mut self) -> Result<Option<Interval<V>>> {
        loop {
            if let Some(entry) = self.pending.next() {
                return entry.into_interval(&self.chrom_name).map(Some);
            }
            if let Some(block) = self.blocks.next() {
                let data = self.reader.read_block(&block)?;
                let chrom_id = self.chrom_id;
                let entries: Vec<Entry<V>> = V::decode_block(&data)?
                    .into_iter()
                    .filter(|e| e.chrom_id == chrom_id)
                    .collect();
                self.pending = entries.into_iter();
                continue;
            }
            let Some((chrom_id, name)) = self.chroms.next() else {
                return Ok(None);
            };
            let index = self.reader.data_index()?;
            self.blocks = index
                .search(&mut self.reader.input, chrom_id, 0, u32::MAX)?
                .into_iter();
            self.chrom_id = chrom_id;
            self.chrom_name = name;
        }
    }
}

impl<R: Read + Seek, V: TrackValue> Iterator for Records<'_, R, V> {
    type Item = Result<Interval<V>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(interval)) => Some(Ok(interval)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read + Seek, V: TrackValue> std::iter::FusedIterator for Records<'_, R, V> {}
