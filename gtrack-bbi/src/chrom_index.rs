//! Chromosome name <-> id mapping and its on-disk B+ tree.
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fxhash::{FxHashMap, FxHashSet};
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use gtrack_core::utils::natural_cmp;
use gtrack_core::{GtrackError, Result};

use crate::consts::{CHROM_TREE_HEADER_SIZE, CHROM_TREE_MAGIC, MAX_CHROM_NAME_SIZE};

/// A chromosome known to a track.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChromInfo {
    pub id: u32,
    pub name: String,
    pub length: u32,
}

///
/// Bijective mapping between chromosome names and the numeric ids the data
/// blocks, R-tree and zoom records refer to.
///
/// Ids are assigned in byte-wise name order, the order the on-disk B+ tree is
/// keyed by. Lookup by id is an index into a vector, lookup by name a hash
/// map lookup.
///
/// # Examples
///
/// ```
/// use gtrack_bbi::ChromIndex;
///
/// let index = ChromIndex::new(vec![("chr2".to_string(), 500), ("chr1".to_string(), 1000)]).unwrap();
/// assert_eq!(index.id("chr1"), Some(0));
/// assert_eq!(index.get(1).map(|c| c.length), Some(500));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChromIndex {
    chroms: Vec<ChromInfo>,
    by_name: FxHashMap<String, u32>,
}

impl ChromIndex {
    ///
    /// Build the index from `(name, length)` pairs.
    ///
    /// Names must be unique, non-empty and free of NUL bytes; lengths must be
    /// positive.
    pub fn new(chrom_sizes: Vec<(String, u32)>) -> Result<Self> {
        let mut chrom_sizes = chrom_sizes;
        chrom_sizes.sort_by(|a, b| a.0.cmp(&b.0));

        for window in chrom_sizes.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(GtrackError::Precondition(format!(
                    "duplicate chromosome name '{}'",
                    window[0].0
                )));
            }
        }
        for (name, length) in chrom_sizes.iter() {
            if name.is_empty() || name.contains('\0') {
                return Err(GtrackError::Precondition(format!(
                    "invalid chromosome name {name:?}"
                )));
            }
            if name.len() > MAX_CHROM_NAME_SIZE as usize {
                return Err(GtrackError::Precondition(format!(
                    "chromosome name is longer than {MAX_CHROM_NAME_SIZE} bytes: {name}"
                )));
            }
            if *length == 0 {
                return Err(GtrackError::Precondition(format!(
                    "chromosome {name} must have a positive length"
                )));
            }
        }

        let chroms: Vec<ChromInfo> = chrom_sizes
            .into_iter()
            .enumerate()
            .map(|(id, (name, length))| ChromInfo {
                id: id as u32,
                name,
                length,
            })
            .collect();
        Ok(Self::from_chroms(chroms))
    }

    fn from_chroms(chroms: Vec<ChromInfo>) -> Self {
        let by_name = chroms.iter().map(|c| (c.name.clone(), c.id)).collect();
        ChromIndex { chroms, by_name }
    }

    pub fn id(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: u32) -> Option<&ChromInfo> {
        self.chroms.get(id as usize)
    }

    pub fn by_name(&self, name: &str) -> Option<&ChromInfo> {
        self.id(name).and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.chroms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chroms.is_empty()
    }

    /// Chromosomes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ChromInfo> {
        self.chroms.iter()
    }

    /// Chromosomes in natural name order, the order intervals sort in.
    pub fn natural_order(&self) -> Vec<&ChromInfo> {
        let mut chroms: Vec<&ChromInfo> = self.chroms.iter().collect();
        chroms.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        chroms
    }

    pub fn max_length(&self) -> u32 {
        self.chroms.iter().map(|c| c.length).max().unwrap_or(0)
    }

    fn key_size(&self) -> u32 {
        self.chroms
            .iter()
            .map(|c| c.name.len() as u32)
            .max()
            .unwrap_or(0)
            .max(1)
    }

    ///
    /// Serialize the index as a B+ tree.
    ///
    /// Leaves hold up to `block_size` chromosomes; upper levels hold up to
    /// `block_size` children keyed by their first name. Nodes are written root
    /// first, level by level, so every child sits after its parent.
    ///
    /// # Arguments
    /// - base_offset: absolute file offset the returned bytes will be written at
    /// - block_size: maximum items per node, at least 2
    pub(crate) fn encode(&self, base_offset: u64, block_size: u32) -> Result<Vec<u8>> {
        let block_size = block_size.max(2) as usize;
        let key_size = self.key_size();
        let item_size = key_size as u64 + 8;

        // levels[0] are the leaves, each node is a range of indices into the level below
        let mut levels: Vec<Vec<std::ops::Range<usize>>> = Vec::new();
        let leaves: Vec<std::ops::Range<usize>> = if self.chroms.is_empty() {
            vec![0..0]
        } else {
            (0..self.chroms.len())
                .step_by(block_size)
                .map(|start| start..(start + block_size).min(self.chroms.len()))
                .collect()
        };
        levels.push(leaves);
        while levels.last().map_or(0, Vec::len) > 1 {
            let below = levels.last().map_or(0, Vec::len);
            let level = (0..below)
                .step_by(block_size)
                .map(|start| start..(start + block_size).min(below))
                .collect();
            levels.push(level);
        }

        // first chromosome under every node, per level
        let mut first_item: Vec<Vec<usize>> = vec![levels[0].iter().map(|r| r.start).collect()];
        for level in levels.iter().skip(1) {
            let below = &first_item[first_item.len() - 1];
            let firsts = level.iter().map(|r| below[r.start]).collect();
            first_item.push(firsts);
        }

        // node offsets, root level first
        let mut offsets: Vec<Vec<u64>> = vec![Vec::new(); levels.len()];
        let mut cursor = base_offset + CHROM_TREE_HEADER_SIZE;
        for (depth, level) in levels.iter().enumerate().rev() {
            for node in level {
                offsets[depth].push(cursor);
                cursor += 4 + node.len() as u64 * item_size;
            }
        }

        let mut out = Vec::with_capacity((cursor - base_offset) as usize);
        out.write_u32::<LittleEndian>(CHROM_TREE_MAGIC)?;
        out.write_u32::<LittleEndian>(block_size as u32)?;
        out.write_u32::<LittleEndian>(key_size)?;
        out.write_u32::<LittleEndian>(8)?;
        out.write_u64::<LittleEndian>(self.chroms.len() as u64)?;
        out.write_u64::<LittleEndian>(0)?;

        for depth in (0..levels.len()).rev() {
            let is_leaf = depth == 0;
            for node in &levels[depth] {
                out.write_u8(is_leaf as u8)?;
                out.write_u8(0)?;
                out.write_u16::<LittleEndian>(node.len() as u16)?;
                for child in node.clone() {
                    if is_leaf {
                        let chrom = &self.chroms[child];
                        write_key(&mut out, &chrom.name, key_size)?;
                        out.write_u32::<LittleEndian>(chrom.id)?;
                        out.write_u32::<LittleEndian>(chrom.length)?;
                    } else {
                        let chrom = &self.chroms[first_item[depth - 1][child]];
                        write_key(&mut out, &chrom.name, key_size)?;
                        out.write_u64::<LittleEndian>(offsets[depth - 1][child])?;
                    }
                }
            }
        }

        debug!(
            "chrom tree: {} chromosomes, {} levels, {} bytes",
            self.chroms.len(),
            levels.len(),
            out.len()
        );
        Ok(out)
    }

    ///
    /// Read a B+ tree written by [`ChromIndex::encode`] (or any conforming writer).
    ///
    pub(crate) fn read<R: Read + Seek>(input: &mut R, offset: u64) -> Result<Self> {
        input.seek(SeekFrom::Start(offset))?;
        let mut read_header = || -> std::io::Result<(u32, u32, u32, u64)> {
            let magic = input.read_u32::<LittleEndian>()?;
            let _block_size = input.read_u32::<LittleEndian>()?;
            let key_size = input.read_u32::<LittleEndian>()?;
            let val_size = input.read_u32::<LittleEndian>()?;
            let item_count = input.read_u64::<LittleEndian>()?;
            let _reserved = input.read_u64::<LittleEndian>()?;
            Ok((magic, key_size, val_size, item_count))
        };
        let (magic, key_size, val_size, item_count) =
            read_header().map_err(|e| GtrackError::from_read(e, "chromosome tree header"))?;

        if magic != CHROM_TREE_MAGIC {
            return Err(GtrackError::Format(format!(
                "bad chromosome tree magic {magic:#010x}"
            )));
        }
        if val_size != 8 || key_size == 0 || key_size > MAX_CHROM_NAME_SIZE {
            return Err(GtrackError::Format(format!(
                "unsupported chromosome tree layout (key size {key_size}, value size {val_size})"
            )));
        }

        let mut chroms: Vec<ChromInfo> = Vec::new();
        let mut pending = vec![offset + CHROM_TREE_HEADER_SIZE];
        let mut visited = FxHashSet::default();
        visited.insert(offset + CHROM_TREE_HEADER_SIZE);
        while let Some(node_offset) = pending.pop() {
            input.seek(SeekFrom::Start(node_offset))?;
            let children = read_node(input, key_size, &mut chroms)
                .map_err(|e| GtrackError::from_read(e, "chromosome tree node"))?;
            if chroms.len() as u64 > item_count {
                return Err(GtrackError::Format(
                    "chromosome tree holds more items than its header declares".to_string(),
                ));
            }
            for child in children.into_iter().rev() {
                if child <= node_offset {
                    return Err(GtrackError::Format(format!(
                        "chromosome tree node at {node_offset} points backwards to {child}"
                    )));
                }
                if !visited.insert(child) {
                    return Err(GtrackError::Format(format!(
                        "chromosome tree node at {child} is reached twice"
                    )));
                }
                pending.push(child);
            }
        }

        if chroms.len() as u64 != item_count {
            return Err(GtrackError::Format(format!(
                "chromosome tree declares {item_count} items but holds {}",
                chroms.len()
            )));
        }

        chroms.sort_by_key(|c| c.id);
        for (expected, chrom) in chroms.iter().enumerate() {
            if chrom.id as usize != expected {
                return Err(GtrackError::Format(format!(
                    "chromosome ids are not contiguous at {}",
                    chrom.name
                )));
            }
            if chrom.length == 0 {
                return Err(GtrackError::Format(format!(
                    "chromosome {} has zero length",
                    chrom.name
                )));
            }
        }

        let index = Self::from_chroms(chroms);
        if index.by_name.len() != index.chroms.len() {
            return Err(GtrackError::Format(
                "duplicate chromosome names in chromosome tree".to_string(),
            ));
        }
        Ok(index)
    }
}

fn write_key(out: &mut Vec<u8>, name: &str, key_size: u32) -> std::io::Result<()> {
    out.write_all(name.as_bytes())?;
    out.resize(out.len() + key_size as usize - name.len(), 0);
    Ok(())
}

/// Read one node, pushing leaf items and returning child offsets.
fn read_node<R: Read>(
    input: &mut R,
    key_size: u32,
    chroms: &mut Vec<ChromInfo>,
) -> std::io::Result<Vec<u64>> {
    let is_leaf = input.read_u8()?;
    let _reserved = input.read_u8()?;
    let count = input.read_u16::<LittleEndian>()?;

    let mut key = vec![0u8; key_size as usize];
    let mut children = Vec::new();
    for _ in 0..count {
        input.read_exact(&mut key)?;
        if is_leaf == 1 {
            let id = input.read_u32::<LittleEndian>()?;
            let length = input.read_u32::<LittleEndian>()?;
            let name_len = key.iter().position(|&b| b == 0).unwrap_or(key.len());
            chroms.push(ChromInfo {
                id,
                name: String::from_utf8_lossy(&key[..name_len]).into_owned(),
                length,
            });
        } else {
            children.push(input.read_u64::<LittleEndian>()?);
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

    fn sizes(names: &[(&str, u32)]) -> Vec<(String, u32)> {
        names.iter().map(|(n, l)| (n.to_string(), *l)).collect()
    }

    #[rstest]
    fn test_ids_follow_byte_order() {
        let index = ChromIndex::new(sizes(&[("chr10", 10), ("chr2", 2), ("chr1", 1)])).unwrap();
        assert_eq!(index.id("chr1"), Some(0));
        assert_eq!(index.id("chr10"), Some(1));
        assert_eq!(index.id("chr2"), Some(2));
        assert_eq!(index.id("chr3"), None);

        let natural: Vec<&str> = index.natural_order().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(natural, vec!["chr1", "chr2", "chr10"]);
        assert_eq!(index.max_length(), 10);
    }

    #[rstest]
    #[case(sizes(&[("chr1", 1), ("chr1", 2)]))]
    #[case(sizes(&[("chr1", 0)]))]
    #[case(sizes(&[("", 5)]))]
    #[case(sizes(&[("chr\01", 5)]))]
    fn test_invalid(#[case] chrom_sizes: Vec<(String, u32)>) {
        assert!(matches!(
            ChromIndex::new(chrom_sizes),
            Err(GtrackError::Precondition(_))
        ));
    }

    #[rstest]
    #[case(0, 4)]
    #[case(1, 4)]
    #[case(4, 4)]
    #[case(5, 4)]
    #[case(1000, 4)]
    #[case(1000, 256)]
    fn test_tree_io(#[case] n: usize, #[case] block_size: u32) {
        let chrom_sizes: Vec<(String, u32)> =
            (0..n).map(|i| (format!("chr{i}"), i as u32 + 1)).collect();
        let index = ChromIndex::new(chrom_sizes).unwrap();

        // write behind some unrelated bytes to exercise absolute offsets
        let base = 17u64;
        let mut bytes = vec![0xAB; base as usize];
        bytes.extend(index.encode(base, block_size).unwrap());

        let back = ChromIndex::read(&mut Cursor::new(bytes), base).unwrap();
        assert_eq!(back.len(), n);
        for chrom in index.iter() {
            assert_eq!(back.get(chrom.id), Some(chrom));
            assert_eq!(back.id(&chrom.name), Some(chrom.id));
        }
    }

    #[rstest]
    fn test_tree_bad_magic() {
        let index = ChromIndex::new(sizes(&[("chr1", 5)])).unwrap();
        let mut bytes = index.encode(0, 256).unwrap();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            ChromIndex::read(&mut Cursor::new(bytes), 0),
            Err(GtrackError::Format(_))
        ));
    }

    #[rstest]
    fn test_tree_shared_child_rejected() {
        let index =
            ChromIndex::new(sizes(&[("chr1", 1), ("chr2", 2), ("chr3", 3), ("chr4", 4)])).unwrap();
        let mut bytes = index.encode(0, 2).unwrap();
        // root items are a 4-byte key and an 8-byte child offset
        let first = CHROM_TREE_HEADER_SIZE as usize + 4 + 4;
        let second = first + 12;
        let shared = bytes[first..first + 8].to_vec();
        bytes[second..second + 8].copy_from_slice(&shared);
        assert!(matches!(
            ChromIndex::read(&mut Cursor::new(bytes), 0),
            Err(GtrackError::Format(_))
        ));
    }

    #[rstest]
    fn test_tree_truncated() {
        let index = ChromIndex::new(sizes(&[("chr1", 5), ("chr2", 6)])).unwrap();
        let mut bytes = index.encode(0, 256).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            ChromIndex::read(&mut Cursor::new(bytes), 0),
            Err(GtrackError::Format(_))
        ));
    }
}
