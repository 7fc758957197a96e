//! Block codec: (de)compression and the record layouts inside data blocks.
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use gtrack_core::models::Strand;
use gtrack_core::{GtrackError, Result};

use crate::consts::BEDGRAPH_SECTION_HEADER_SIZE;
use crate::value::Entry;

/// Section types of signal blocks.
const SECTION_BEDGRAPH: u8 = 1;
const SECTION_VARIABLE_STEP: u8 = 2;
const SECTION_FIXED_STEP: u8 = 3;

///
/// zlib-compress a block, or return it unchanged when compression is off.
///
pub(crate) fn compress(data: &[u8], compress: bool) -> Result<Vec<u8>> {
    if !compress {
        return Ok(data.to_vec());
    }
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

///
/// Undo [`compress`].
///
/// `uncompress_buf_size` is the header's bound on decompressed block size;
/// zero means blocks are stored uncompressed. Anything that does not inflate
/// cleanly within the bound is a format error.
pub(crate) fn decompress(data: Vec<u8>, uncompress_buf_size: u32) -> Result<Vec<u8>> {
    if uncompress_buf_size == 0 {
        return Ok(data);
    }
    let limit = uncompress_buf_size as u64;
    let mut out = Vec::with_capacity(uncompress_buf_size as usize);
    ZlibDecoder::new(&data[..])
        .take(limit + 1)
        .read_to_end(&mut out)
        .map_err(|e| GtrackError::Format(format!("corrupt compressed block: {e}")))?;
    if out.len() as u64 > limit {
        return Err(GtrackError::Format(format!(
            "block inflates past the declared maximum of {limit} bytes"
        )));
    }
    Ok(out)
}

/// Read `size` bytes at `offset` and decompress them.
pub(crate) fn read_block<R: Read + Seek>(
    input: &mut R,
    offset: u64,
    size: u64,
    uncompress_buf_size: u32,
) -> Result<Vec<u8>> {
    input.seek(SeekFrom::Start(offset))?;
    let mut raw = Vec::new();
    input.by_ref().take(size).read_to_end(&mut raw)?;
    if (raw.len() as u64) < size {
        return Err(GtrackError::Format(format!(
            "truncated block at offset {offset}: expected {size} bytes, found {}",
            raw.len()
        )));
    }
    decompress(raw, uncompress_buf_size)
}

///
/// Encode signal records of one chromosome as a bedGraph section.
///
/// Layout: chrom id, section start, section end, step, span (all u32), type
/// (u8), reserved (u8), item count (u16), then `(start, end, value)` per item.
pub(crate) fn encode_signal(chrom_id: u32, entries: &[Entry<f32>], out: &mut Vec<u8>) -> Result<()> {
    if entries.len() > u16::MAX as usize {
        return Err(GtrackError::Precondition(format!(
            "a block holds at most {} records, got {}",
            u16::MAX,
            entries.len()
        )));
    }
    let start = entries.first().map_or(0, |e| e.start);
    let end = entries.iter().map(|e| e.end).max().unwrap_or(0);

    out.write_u32::<LittleEndian>(chrom_id)?;
    out.write_u32::<LittleEndian>(start)?;
    out.write_u32::<LittleEndian>(end)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u8(SECTION_BEDGRAPH)?;
    out.write_u8(0)?;
    out.write_u16::<LittleEndian>(entries.len() as u16)?;
    for entry in entries {
        out.write_u32::<LittleEndian>(entry.start)?;
        out.write_u32::<LittleEndian>(entry.end)?;
        out.write_f32::<LittleEndian>(entry.value)?;
    }
    Ok(())
}

///
/// Decode a signal block (bedGraph, variableStep or fixedStep section).
///
pub(crate) fn decode_signal(data: &[u8]) -> Result<Vec<Entry<f32>>> {
    if data.len() < BEDGRAPH_SECTION_HEADER_SIZE {
        return Err(GtrackError::Format(format!(
            "signal block of {} bytes is shorter than its section header",
            data.len()
        )));
    }
    let mut cursor = data;
    let chrom_id = cursor.read_u32::<LittleEndian>()?;
    let section_start = cursor.read_u32::<LittleEndian>()?;
    let _section_end = cursor.read_u32::<LittleEndian>()?;
    let step = cursor.read_u32::<LittleEndian>()?;
    let span = cursor.read_u32::<LittleEndian>()?;
    let section_type = cursor.read_u8()?;
    let _reserved = cursor.read_u8()?;
    let count = cursor.read_u16::<LittleEndian>()? as usize;

    let item_size = match section_type {
        SECTION_BEDGRAPH => 12,
        SECTION_VARIABLE_STEP => 8,
        SECTION_FIXED_STEP => 4,
        other => {
            return Err(GtrackError::Format(format!(
                "unknown signal section type {other}"
            )));
        }
    };
    if cursor.len() != count * item_size {
        return Err(GtrackError::Format(format!(
            "signal block declares {count} items but holds {} bytes of items",
            cursor.len()
        )));
    }

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let (start, end, value) = match section_type {
            SECTION_BEDGRAPH => {
                let start = cursor.read_u32::<LittleEndian>()?;
                let end = cursor.read_u32::<LittleEndian>()?;
                (start, end, cursor.read_f32::<LittleEndian>()?)
            }
            SECTION_VARIABLE_STEP => {
                let start = cursor.read_u32::<LittleEndian>()?;
                (start, start.saturating_add(span), cursor.read_f32::<LittleEndian>()?)
            }
            _ => {
                let start = section_start.saturating_add(step.saturating_mul(i as u32));
                (start, start.saturating_add(span), cursor.read_f32::<LittleEndian>()?)
            }
        };
        if start >= end {
            return Err(GtrackError::Format(format!(
                "signal record with empty range {start}..{end}"
            )));
        }
        entries.push(Entry {
            chrom_id,
            start,
            end,
            strand: Strand::Both,
            value,
        });
    }
    Ok(entries)
}

///
/// Encode feature records as an item count (u16) followed by
/// `chrom id, start, end, rest\0` items.
///
pub(crate) fn encode_features<T, F>(entries: &[Entry<T>], rest: F, out: &mut Vec<u8>) -> Result<()>
where
    F: Fn(&Entry<T>) -> String,
{
    if entries.len() > u16::MAX as usize {
        return Err(GtrackError::Precondition(format!(
            "a block holds at most {} records, got {}",
            u16::MAX,
            entries.len()
        )));
    }
    out.write_u16::<LittleEndian>(entries.len() as u16)?;
    for entry in entries {
        out.write_u32::<LittleEndian>(entry.chrom_id)?;
        out.write_u32::<LittleEndian>(entry.start)?;
        out.write_u32::<LittleEndian>(entry.end)?;
        let rest = rest(entry);
        if rest.contains('\0') {
            return Err(GtrackError::Precondition(
                "feature fields must not contain NUL bytes".to_string(),
            ));
        }
        out.write_all(rest.as_bytes())?;
        out.write_u8(0)?;
    }
    Ok(())
}

/// A feature item as stored in a block, before its "rest" is parsed.
pub(crate) struct RawFeature<'a> {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub rest: &'a str,
}

/// Decode a feature block. The item count must match the records present.
pub(crate) fn decode_features(data: &[u8]) -> Result<Vec<RawFeature<'_>>> {
    if data.len() < 2 {
        return Err(GtrackError::Format(
            "feature block is missing its item count".to_string(),
        ));
    }
    let mut cursor = data;
    let count = cursor.read_u16::<LittleEndian>()? as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        if cursor.len() < 12 {
            return Err(GtrackError::Format(
                "feature block ends inside a record".to_string(),
            ));
        }
        let chrom_id = cursor.read_u32::<LittleEndian>()?;
        let start = cursor.read_u32::<LittleEndian>()?;
        let end = cursor.read_u32::<LittleEndian>()?;
        let Some(nul) = cursor.iter().position(|&b| b == 0) else {
            return Err(GtrackError::Format(
                "unterminated feature record".to_string(),
            ));
        };
        let rest = std::str::from_utf8(&cursor[..nul])
            .map_err(|_| GtrackError::Format("feature record is not UTF-8".to_string()))?;
        cursor = &cursor[nul + 1..];
        if start >= end {
            return Err(GtrackError::Format(format!(
                "feature record with empty range {start}..{end}"
            )));
        }
        items.push(RawFeature {
            chrom_id,
            start,
            end,
            rest,
        });
    }
    if !cursor.is_empty() {
        return Err(GtrackError::Format(format!(
            "feature block declares {count} items but has {} trailing bytes",
            cursor.len()
        )));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn signal(start: u32, end: u32, value: f32) -> Entry<f32> {
        Entry {
            chrom_id: 3,
            start,
            end,
            strand: Strand::Both,
            value,
        }
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn test_compression(#[case] on: bool) {
        let data: Vec<u8> = (0..5000u32).flat_map(|i| (i % 7).to_le_bytes()).collect();
        let packed = compress(&data, on).unwrap();
        let limit = if on { data.len() as u32 } else { 0 };
        assert_eq!(decompress(packed, limit).unwrap(), data);
    }

    #[rstest]
    fn test_decompress_over_limit() {
        let data = vec![1u8; 1000];
        let packed = compress(&data, true).unwrap();
        assert!(matches!(decompress(packed, 999), Err(GtrackError::Format(_))));
    }

    #[rstest]
    fn test_decompress_garbage() {
        assert!(matches!(
            decompress(vec![0xde, 0xad, 0xbe, 0xef], 100),
            Err(GtrackError::Format(_))
        ));
    }

    #[rstest]
    fn test_signal_block() {
        let entries = vec![signal(0, 10, 1.5), signal(10, 11, -2.0), signal(20, 40, 0.0)];
        let mut data = Vec::new();
        encode_signal(3, &entries, &mut data).unwrap();
        assert_eq!(data.len(), 24 + 3 * 12);
        assert_eq!(decode_signal(&data).unwrap(), entries);
    }

    #[rstest]
    fn test_signal_block_bad_count() {
        let mut data = Vec::new();
        encode_signal(3, &[signal(0, 10, 1.5)], &mut data).unwrap();
        data.truncate(data.len() - 1);
        assert!(matches!(decode_signal(&data), Err(GtrackError::Format(_))));
        assert!(matches!(decode_signal(&data[..10]), Err(GtrackError::Format(_))));
    }

    #[rstest]
    fn test_fixed_step_section() {
        let mut data = Vec::new();
        for v in [7u32, 100, 0, 10, 5] {
            data.write_u32::<LittleEndian>(v).unwrap();
        }
        data.write_u8(SECTION_FIXED_STEP).unwrap();
        data.write_u8(0).unwrap();
        data.write_u16::<LittleEndian>(2).unwrap();
        data.write_f32::<LittleEndian>(1.0).unwrap();
        data.write_f32::<LittleEndian>(2.0).unwrap();
        // chrom 7, section start 100, step 10, span 5
        let got = decode_signal(&data).unwrap();
        let ranges: Vec<(u32, u32, u32)> = got.iter().map(|e| (e.chrom_id, e.start, e.end)).collect();
        assert_eq!(ranges, vec![(7, 100, 105), (7, 110, 115)]);
    }

    #[rstest]
    fn test_feature_block() {
        let entries = vec![
            Entry {
                chrom_id: 1,
                start: 5,
                end: 9,
                strand: Strand::Both,
                value: "a\t1".to_string(),
            },
            Entry {
                chrom_id: 1,
                start: 6,
                end: 7,
                strand: Strand::Both,
                value: String::new(),
            },
        ];
        let mut data = Vec::new();
        encode_features(&entries, |e| e.value.clone(), &mut data).unwrap();
        let items = decode_features(&data).unwrap();
        let got: Vec<(u32, u32, u32, &str)> = items
            .iter()
            .map(|i| (i.chrom_id, i.start, i.end, i.rest))
            .collect();
        assert_eq!(got, vec![(1, 5, 9, "a\t1"), (1, 6, 7, "")]);

        assert!(matches!(
            decode_features(&data[..data.len() - 1]),
            Err(GtrackError::Format(_))
        ));
        assert!(matches!(decode_features(&data[..5]), Err(GtrackError::Format(_))));
        assert!(matches!(decode_features(&data[..1]), Err(GtrackError::Format(_))));
    }

    #[rstest]
    fn test_feature_block_cut_at_record_boundary() {
        let entries: Vec<Entry<String>> = (0..200u32)
            .map(|i| Entry {
                chrom_id: 0,
                start: i * 10,
                end: i * 10 + 5,
                strand: Strand::Both,
                value: format!("f{i}"),
            })
            .collect();
        let mut data = Vec::new();
        encode_features(&entries, |e| e.value.clone(), &mut data).unwrap();
        assert_eq!(decode_features(&data).unwrap().len(), 200);

        // 2-byte count, then 9 records of 12 bytes plus "fN\0"
        let cut = 2 + 9 * (12 + 3);
        assert!(matches!(decode_features(&data[..cut]), Err(GtrackError::Format(_))));

        let mut padded = data.clone();
        padded.extend_from_slice(&[0u8; 16]);
        assert!(matches!(decode_features(&padded), Err(GtrackError::Format(_))));
    }

    #[rstest]
    fn test_read_block_truncated() {
        let mut input = Cursor::new(vec![0u8; 10]);
        assert!(matches!(
            read_block(&mut input, 4, 20, 0),
            Err(GtrackError::Format(_))
        ));
        assert_eq!(read_block(&mut input, 4, 6, 0).unwrap(), vec![0u8; 6]);
    }
}
