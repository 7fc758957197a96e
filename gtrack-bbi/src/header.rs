//! Fixed-size sections at both ends of a track file.
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use gtrack_core::{GtrackError, Result};

use crate::consts::{BBI_VERSION, BIGBED_MAGIC, BIGWIG_MAGIC};

/// The 64-byte header at offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BbiHeader {
    pub magic: u32,
    pub version: u16,
    pub zoom_levels: u16,
    pub chrom_tree_offset: u64,
    pub full_data_offset: u64,
    pub full_index_offset: u64,
    pub field_count: u16,
    pub defined_field_count: u16,
    pub auto_sql_offset: u64,
    pub total_summary_offset: u64,
    /// largest decompressed block size, 0 when blocks are stored uncompressed
    pub uncompress_buf_size: u32,
}

impl BbiHeader {
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_u32::<LittleEndian>(self.magic)?;
        out.write_u16::<LittleEndian>(self.version)?;
        out.write_u16::<LittleEndian>(self.zoom_levels)?;
        out.write_u64::<LittleEndian>(self.chrom_tree_offset)?;
        out.write_u64::<LittleEndian>(self.full_data_offset)?;
        out.write_u64::<LittleEndian>(self.full_index_offset)?;
        out.write_u16::<LittleEndian>(self.field_count)?;
        out.write_u16::<LittleEndian>(self.defined_field_count)?;
        out.write_u64::<LittleEndian>(self.auto_sql_offset)?;
        out.write_u64::<LittleEndian>(self.total_summary_offset)?;
        out.write_u32::<LittleEndian>(self.uncompress_buf_size)?;
        out.write_u64::<LittleEndian>(0)?;
        Ok(())
    }

    ///
    /// Read and validate a header.
    ///
    /// The magic number is checked before anything else is trusted.
    ///
    /// # Arguments
    /// - input: reader positioned at the start of the file
    /// - expected_magic: magic of the track kind being opened
    pub fn read<R: Read>(input: &mut R, expected_magic: u32) -> Result<Self> {
        let magic = input
            .read_u32::<LittleEndian>()
            .map_err(|e| GtrackError::from_read(e, "header"))?;
        if magic != expected_magic {
            return Err(GtrackError::Format(format!(
                "bad magic number {magic:#010x}, expected {expected_magic:#010x} ({})",
                kind_name(expected_magic)
            )));
        }

        let mut read = || -> std::io::Result<BbiHeader> {
            let version = input.read_u16::<LittleEndian>()?;
            let zoom_levels = input.read_u16::<LittleEndian>()?;
            let chrom_tree_offset = input.read_u64::<LittleEndian>()?;
            let full_data_offset = input.read_u64::<LittleEndian>()?;
            let full_index_offset = input.read_u64::<LittleEndian>()?;
            let field_count = input.read_u16::<LittleEndian>()?;
            let defined_field_count = input.read_u16::<LittleEndian>()?;
            let auto_sql_offset = input.read_u64::<LittleEndian>()?;
            let total_summary_offset = input.read_u64::<LittleEndian>()?;
            let uncompress_buf_size = input.read_u32::<LittleEndian>()?;
            let _reserved = input.read_u64::<LittleEndian>()?;
            Ok(BbiHeader {
                magic,
                version,
                zoom_levels,
                chrom_tree_offset,
                full_data_offset,
                full_index_offset,
                field_count,
                defined_field_count,
                auto_sql_offset,
                total_summary_offset,
                uncompress_buf_size,
            })
        };
        let header = read().map_err(|e| GtrackError::from_read(e, "header"))?;

        if header.version < 3 || header.version > BBI_VERSION {
            return Err(GtrackError::Format(format!(
                "unsupported version {}",
                header.version
            )));
        }
        Ok(header)
    }
}

fn kind_name(magic: u32) -> &'static str {
    match magic {
        BIGWIG_MAGIC => "signal track",
        BIGBED_MAGIC => "feature track",
        _ => "unknown",
    }
}

/// One 24-byte entry per zoom level, directly after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomHeader {
    /// bin width in bases
    pub reduction_level: u32,
    pub data_offset: u64,
    pub index_offset: u64,
}

impl ZoomHeader {
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_u32::<LittleEndian>(self.reduction_level)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u64::<LittleEndian>(self.data_offset)?;
        out.write_u64::<LittleEndian>(self.index_offset)?;
        Ok(())
    }

    pub fn read<R: Read>(input: &mut R) -> Result<Self> {
        let mut read = || -> std::io::Result<ZoomHeader> {
            let reduction_level = input.read_u32::<LittleEndian>()?;
            let _reserved = input.read_u32::<LittleEndian>()?;
            let data_offset = input.read_u64::<LittleEndian>()?;
            let index_offset = input.read_u64::<LittleEndian>()?;
            Ok(ZoomHeader {
                reduction_level,
                data_offset,
                index_offset,
            })
        };
        read().map_err(|e| GtrackError::from_read(e, "zoom header"))
    }
}

///
/// The 40-byte footer at the very end of the file.
///
/// It repeats the section offsets and the magic number so a truncated or
/// spliced file is caught before any data section is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub chrom_tree_offset: u64,
    pub full_data_offset: u64,
    pub full_index_offset: u64,
    pub total_summary_offset: u64,
    pub zoom_levels: u16,
    pub magic: u32,
}

impl Footer {
    pub fn for_header(header: &BbiHeader) -> Self {
        Footer {
            chrom_tree_offset: header.chrom_tree_offset,
            full_data_offset: header.full_data_offset,
            full_index_offset: header.full_index_offset,
            total_summary_offset: header.total_summary_offset,
            zoom_levels: header.zoom_levels,
            magic: header.magic,
        }
    }

    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_u64::<LittleEndian>(self.chrom_tree_offset)?;
        out.write_u64::<LittleEndian>(self.full_data_offset)?;
        out.write_u64::<LittleEndian>(self.full_index_offset)?;
        out.write_u64::<LittleEndian>(self.total_summary_offset)?;
        out.write_u16::<LittleEndian>(self.zoom_levels)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.magic)?;
        Ok(())
    }

    pub fn read<R: Read>(input: &mut R) -> Result<Self> {
        let mut read = || -> std::io::Result<Footer> {
            let chrom_tree_offset = input.read_u64::<LittleEndian>()?;
            let full_data_offset = input.read_u64::<LittleEndian>()?;
            let full_index_offset = input.read_u64::<LittleEndian>()?;
            let total_summary_offset = input.read_u64::<LittleEndian>()?;
            let zoom_levels = input.read_u16::<LittleEndian>()?;
            let _reserved = input.read_u16::<LittleEndian>()?;
            let magic = input.read_u32::<LittleEndian>()?;
            Ok(Footer {
                chrom_tree_offset,
                full_data_offset,
                full_index_offset,
                total_summary_offset,
                zoom_levels,
                magic,
            })
        };
        read().map_err(|e| GtrackError::from_read(e, "footer"))
    }

    /// Fail unless the footer repeats the header exactly.
    pub fn check(&self, header: &BbiHeader) -> Result<()> {
        if self.magic != header.magic {
            return Err(GtrackError::Format(format!(
                "footer magic {:#010x} does not match header, file is truncated or corrupt",
                self.magic
            )));
        }
        if *self != Footer::for_header(header) {
            return Err(GtrackError::Format(
                "footer offsets do not match header".to_string(),
            ));
        }
        Ok(())
    }
}
