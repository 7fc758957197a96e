pub const BIGWIG_MAGIC: u32 = 0x888F_FC26;
pub const BIGBED_MAGIC: u32 = 0x8789_F2EB;
pub const CIR_TREE_MAGIC: u32 = 0x2468_ACE0;
pub const CHROM_TREE_MAGIC: u32 = 0x78CA_8C91;

pub const BBI_VERSION: u16 = 4;

pub const HEADER_SIZE: u64 = 64;
pub const ZOOM_HEADER_SIZE: u64 = 24;
pub const TOTAL_SUMMARY_SIZE: u64 = 40;
pub const FOOTER_SIZE: u64 = 40;
pub const CHROM_TREE_HEADER_SIZE: u64 = 32;
pub const CIR_TREE_HEADER_SIZE: u64 = 48;

pub const CIR_LEAF_ITEM_SIZE: u64 = 32;
pub const CIR_INTERNAL_ITEM_SIZE: u64 = 24;
pub const ZOOM_RECORD_SIZE: usize = 32;
pub const BEDGRAPH_SECTION_HEADER_SIZE: usize = 24;

/// number of chromosomes per chrom B+ tree node
pub const CHROM_TREE_BLOCK_SIZE: u32 = 256;

/// guard against absurd allocations when a corrupt file declares huge counts
pub const MAX_CHROM_NAME_SIZE: u32 = 1024;

/// most bases a single per-base values query may span
pub const MAX_VALUES_SPAN: u32 = 1 << 28;

// writer defaults
pub const DEFAULT_BIN_SIZE: u32 = 64;
pub const DEFAULT_ZOOM_SCALE_FACTOR: u32 = 4;
pub const DEFAULT_BLOCK_RECORD_LIMIT: u32 = 1024;
pub const DEFAULT_INDEX_FANOUT: u32 = 256;
pub const DEFAULT_MAX_ZOOM_LEVELS: u16 = 10;
pub const MAX_AUTO_SQL_SIZE: usize = 1 << 20;
