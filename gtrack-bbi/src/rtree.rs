//! Chromosome-interval R-tree (the "CIR tree") mapping ranges to blocks.
use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fxhash::FxHashSet;

use gtrack_core::{GtrackError, Result};

use crate::consts::{CIR_INTERNAL_ITEM_SIZE, CIR_LEAF_ITEM_SIZE, CIR_TREE_HEADER_SIZE, CIR_TREE_MAGIC};

/// A data block and the range of records it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub start_chrom: u32,
    pub start_base: u32,
    pub end_chrom: u32,
    pub end_base: u32,
    pub offset: u64,
    pub size: u64,
}

impl BlockRef {
    fn start(&self) -> (u32, u32) {
        (self.start_chrom, self.start_base)
    }

    fn end(&self) -> (u32, u32) {
        (self.end_chrom, self.end_base)
    }
}

/// `[start, end)` in (chrom id, base) coordinates.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: (u32, u32),
    end: (u32, u32),
}

impl Span {
    fn covering<'a>(mut spans: impl Iterator<Item = &'a Span>) -> Span {
        let Some(first) = spans.next() else {
            return Span {
                start: (0, 0),
                end: (0, 0),
            };
        };
        spans.fold(*first, |acc, s| Span {
            start: acc.start.min(s.start),
            end: acc.end.max(s.end),
        })
    }

    fn overlaps(&self, chrom: u32, start: u32, end: u32) -> bool {
        self.start < (chrom, end) && (chrom, start) < self.end
    }
}

///
/// Build the R-tree over `blocks` (sorted by start) and serialize it.
///
/// Leaves group `fanout` blocks, each upper level groups `fanout` nodes of the
/// level below, and every node's range covers all of its children. Nodes are
/// written root first, so a child always lives after its parent.
///
/// # Arguments
/// - blocks: data blocks in (chrom id, start) order
/// - fanout: maximum children per node, at least 2
/// - base_offset: absolute file offset the returned bytes will be written at
/// - end_file_offset: offset right after the data section the blocks live in
pub(crate) fn encode(
    blocks: &[BlockRef],
    fanout: u32,
    base_offset: u64,
    end_file_offset: u64,
) -> Result<Vec<u8>> {
    let fanout = fanout.max(2) as usize;

    let mut below: Vec<Span> = blocks
        .iter()
        .map(|b| Span {
            start: b.start(),
            end: b.end(),
        })
        .collect();

    // levels[0] are leaves; a node is a range of indices into the level below
    let mut levels: Vec<Vec<std::ops::Range<usize>>> = Vec::new();
    let mut spans: Vec<Vec<Span>> = Vec::new();
    loop {
        let nodes: Vec<std::ops::Range<usize>> = if below.is_empty() {
            vec![0..0]
        } else {
            (0..below.len())
                .step_by(fanout)
                .map(|start| start..(start + fanout).min(below.len()))
                .collect()
        };
        let node_spans: Vec<Span> = nodes
            .iter()
            .map(|r| Span::covering(below[r.clone()].iter()))
            .collect();
        let done = nodes.len() == 1;
        levels.push(nodes);
        spans.push(node_spans.clone());
        below = node_spans;
        if done {
            break;
        }
    }

    let mut offsets: Vec<Vec<u64>> = vec![Vec::new(); levels.len()];
    let mut cursor = base_offset + CIR_TREE_HEADER_SIZE;
    for (depth, level) in levels.iter().enumerate().rev() {
        let item_size = if depth == 0 {
            CIR_LEAF_ITEM_SIZE
        } else {
            CIR_INTERNAL_ITEM_SIZE
        };
        for node in level {
            offsets[depth].push(cursor);
            cursor += 4 + node.len() as u64 * item_size;
        }
    }

    let root = Span::covering(spans[spans.len() - 1].iter());
    let mut out = Vec::with_capacity((cursor - base_offset) as usize);
    out.write_u32::<LittleEndian>(CIR_TREE_MAGIC)?;
    out.write_u32::<LittleEndian>(fanout as u32)?;
    out.write_u64::<LittleEndian>(blocks.len() as u64)?;
    out.write_u32::<LittleEndian>(root.start.0)?;
    out.write_u32::<LittleEndian>(root.start.1)?;
    out.write_u32::<LittleEndian>(root.end.0)?;
    out.write_u32::<LittleEndian>(root.end.1)?;
    out.write_u64::<LittleEndian>(end_file_offset)?;
    out.write_u32::<LittleEndian>(1)?;
    out.write_u32::<LittleEndian>(0)?;

    for depth in (0..levels.len()).rev() {
        let is_leaf = depth == 0;
        for node in &levels[depth] {
            out.write_u8(is_leaf as u8)?;
            out.write_u8(0)?;
            out.write_u16::<LittleEndian>(node.len() as u16)?;
            for child in node.clone() {
                if is_leaf {
                    let block = &blocks[child];
                    out.write_u32::<LittleEndian>(block.start_chrom)?;
                    out.write_u32::<LittleEndian>(block.start_base)?;
                    out.write_u32::<LittleEndian>(block.end_chrom)?;
                    out.write_u32::<LittleEndian>(block.end_base)?;
                    out.write_u64::<LittleEndian>(block.offset)?;
                    out.write_u64::<LittleEndian>(block.size)?;
                } else {
                    let span = &spans[depth - 1][child];
                    out.write_u32::<LittleEndian>(span.start.0)?;
                    out.write_u32::<LittleEndian>(span.start.1)?;
                    out.write_u32::<LittleEndian>(span.end.0)?;
                    out.write_u32::<LittleEndian>(span.end.1)?;
                    out.write_u64::<LittleEndian>(offsets[depth - 1][child])?;
                }
            }
        }
    }
    Ok(out)
}

/// The 48-byte R-tree header, loaded once per index and cached by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RTreeHeader {
    pub item_count: u64,
    pub root_offset: u64,
}

impl RTreeHeader {
    pub fn read<R: Read + Seek>(input: &mut R, offset: u64) -> Result<Self> {
        input.seek(SeekFrom::Start(offset))?;
        let mut read = || -> std::io::Result<(u32, u64)> {
            let magic = input.read_u32::<LittleEndian>()?;
            let _block_size = input.read_u32::<LittleEndian>()?;
            let item_count = input.read_u64::<LittleEndian>()?;
            let _start_chrom = input.read_u32::<LittleEndian>()?;
            let _start_base = input.read_u32::<LittleEndian>()?;
            let _end_chrom = input.read_u32::<LittleEndian>()?;
            let _end_base = input.read_u32::<LittleEndian>()?;
            let _end_file_offset = input.read_u64::<LittleEndian>()?;
            let _items_per_slot = input.read_u32::<LittleEndian>()?;
            let _reserved = input.read_u32::<LittleEndian>()?;
            Ok((magic, item_count))
        };
        let (magic, item_count) = read().map_err(|e| GtrackError::from_read(e, "index header"))?;
        if magic != CIR_TREE_MAGIC {
            return Err(GtrackError::Format(format!(
                "bad index magic {magic:#010x} at offset {offset}"
            )));
        }
        Ok(RTreeHeader {
            item_count,
            root_offset: offset + CIR_TREE_HEADER_SIZE,
        })
    }

    ///
    /// Every block whose range intersects `[start, end)` on `chrom`, in file order.
    ///
    /// Only children whose covering range intersects the query are visited;
    /// children are sorted by start, so the scan of a node stops at the first
    /// child starting at or after the query end.
    pub fn search<R: Read + Seek>(
        &self,
        input: &mut R,
        chrom: u32,
        start: u32,
        end: u32,
    ) -> Result<Vec<BlockRef>> {
        let mut found = Vec::new();
        let mut pending = vec![self.root_offset];
        let mut visited = FxHashSet::default();
        visited.insert(self.root_offset);
        while let Some(node_offset) = pending.pop() {
            input.seek(SeekFrom::Start(node_offset))?;
            let children = read_node(input, chrom, start, end, &mut found)
                .map_err(|e| GtrackError::from_read(e, "index node"))?;
            if found.len() as u64 > self.item_count {
                return Err(GtrackError::Format(
                    "index yields more blocks than its header declares".to_string(),
                ));
            }
            for child in children.into_iter().rev() {
                if child <= node_offset {
                    return Err(GtrackError::Format(format!(
                        "index node at {node_offset} points backwards to {child}"
                    )));
                }
                if !visited.insert(child) {
                    return Err(GtrackError::Format(format!(
                        "index node at {child} is reached twice"
                    )));
                }
                pending.push(child);
            }
        }
        Ok(found)
    }
}

fn read_node<R: Read>(
    input: &mut R,
    chrom: u32,
    start: u32,
    end: u32,
    found: &mut Vec<BlockRef>,
) -> std::io::Result<Vec<u64>> {
    let is_leaf = input.read_u8()?;
    let _reserved = input.read_u8()?;
    let count = input.read_u16::<LittleEndian>()?;

    let mut children = Vec::new();
    for _ in 0..count {
        let span = Span {
            start: (
                input.read_u32::<LittleEndian>()?,
                input.read_u32::<LittleEndian>()?,
            ),
            end: (
                input.read_u32::<LittleEndian>()?,
                input.read_u32::<LittleEndian>()?,
            ),
        };
        let offset = input.read_u64::<LittleEndian>()?;
        let size = if is_leaf == 1 {
            input.read_u64::<LittleEndian>()?
        } else {
            0
        };

        if span.start >= (chrom, end) {
            break;
        }
        if !span.overlaps(chrom, start, end) {
            continue;
        }
        if is_leaf == 1 {
            found.push(BlockRef {
                start_chrom: span.start.0,
                start_base: span.start.1,
                end_chrom: span.end.0,
                end_base: span.end.1,
                offset,
                size,
            });
        } else {
            children.push(offset);
        }
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn blocks(n: u32) -> Vec<BlockRef> {
        // 10 blocks per chromosome, each covering 100 bases
        (0..n)
            .map(|i| BlockRef {
                start_chrom: i / 10,
                start_base: (i % 10) * 100,
                end_chrom: i / 10,
                end_base: (i % 10) * 100 + 100,
                offset: 1000 + i as u64 * 50,
                size: 50,
            })
            .collect()
    }

    fn tree(blocks: &[BlockRef], fanout: u32) -> (RTreeHeader, Cursor<Vec<u8>>) {
        let base = 64u64;
        let mut bytes = vec![0u8; base as usize];
        bytes.extend(encode(blocks, fanout, base, 999).unwrap());
        let mut cursor = Cursor::new(bytes);
        let header = RTreeHeader::read(&mut cursor, base).unwrap();
        (header, cursor)
    }

    #[rstest]
    #[case(0, 4)]
    #[case(1, 4)]
    #[case(4, 4)]
    #[case(95, 4)]
    #[case(95, 2)]
    #[case(95, 256)]
    fn test_search_matches_scan(#[case] n: u32, #[case] fanout: u32) {
        let all = blocks(n);
        let (header, mut cursor) = tree(&all, fanout);
        assert_eq!(header.item_count, n as u64);

        for (chrom, start, end) in [(0, 0, 1), (0, 150, 350), (3, 999, 1000), (9, 0, 1000), (20, 0, 5)] {
            let expected: Vec<BlockRef> = all
                .iter()
                .filter(|b| b.start_chrom == chrom && b.start_base < end && b.end_base > start)
                .copied()
                .collect();
            let got = header.search(&mut cursor, chrom, start, end).unwrap();
            assert_eq!(got, expected, "query {chrom}:{start}-{end}");
        }
    }

    #[rstest]
    fn test_multi_chrom_block() {
        // a block spanning from the end of chrom 0 into chrom 2
        let all = vec![BlockRef {
            start_chrom: 0,
            start_base: 500,
            end_chrom: 2,
            end_base: 10,
            offset: 100,
            size: 1,
        }];
        let (header, mut cursor) = tree(&all, 4);
        assert_eq!(header.search(&mut cursor, 1, 0, 1).unwrap().len(), 1);
        assert_eq!(header.search(&mut cursor, 0, 0, 500).unwrap().len(), 0);
        assert_eq!(header.search(&mut cursor, 2, 10, 20).unwrap().len(), 0);
    }

    #[rstest]
    fn test_bad_magic() {
        let mut bytes = encode(&blocks(3), 4, 0, 0).unwrap();
        bytes[1] ^= 0x55;
        assert!(matches!(
            RTreeHeader::read(&mut Cursor::new(bytes), 0),
            Err(GtrackError::Format(_))
        ));
    }

    #[rstest]
    fn test_shared_child_rejected() {
        // two leaves under one root; point the second root item at the first leaf
        let mut bytes = encode(&blocks(4), 2, 0, 0).unwrap();
        let root = CIR_TREE_HEADER_SIZE as usize + 4;
        let first = root + 16;
        let second = first + CIR_INTERNAL_ITEM_SIZE as usize;
        let shared = bytes[first..first + 8].to_vec();
        bytes[second..second + 8].copy_from_slice(&shared);

        let mut cursor = Cursor::new(bytes);
        let header = RTreeHeader::read(&mut cursor, 0).unwrap();
        assert!(matches!(
            header.search(&mut cursor, 0, 0, 1000),
            Err(GtrackError::Format(_))
        ));
    }

    #[rstest]
    fn test_truncated_node() {
        let mut bytes = encode(&blocks(30), 4, 0, 0).unwrap();
        bytes.truncate(bytes.len() - 8);
        let mut cursor = Cursor::new(bytes);
        let header = RTreeHeader::read(&mut cursor, 0).unwrap();
        assert!(matches!(
            header.search(&mut cursor, 2, 0, 1000),
            Err(GtrackError::Format(_))
        ));
    }
}
