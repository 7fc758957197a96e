#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use gtrack_core::{GtrackError, Result};

use crate::consts::{
    DEFAULT_BIN_SIZE, DEFAULT_BLOCK_RECORD_LIMIT, DEFAULT_INDEX_FANOUT, DEFAULT_MAX_ZOOM_LEVELS,
    DEFAULT_ZOOM_SCALE_FACTOR,
};

///
/// Knobs for [`crate::TrackWriter`].
///
/// # Examples
///
/// ```
/// use gtrack_bbi::TrackWriterOptions;
///
/// let options = TrackWriterOptions::default()
///     .with_bin_size(100)
///     .with_block_record_limit(512);
/// assert!(options.validate().is_ok());
/// assert!(options.clone().with_zoom_scale_factor(1).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackWriterOptions {
    /// width in bases of a bin at the finest zoom level
    pub bin_size: u32,
    /// bin width multiplier between consecutive zoom levels, must be > 1
    pub zoom_scale_factor: u32,
    /// maximum number of records per data block, 1..=65535
    pub block_record_limit: u32,
    /// children per R-tree node, 2..=65535
    pub index_fanout: u32,
    pub max_zoom_levels: u16,
    /// zlib-compress data and zoom blocks
    pub compress: bool,
}

impl Default for TrackWriterOptions {
    fn default() -> Self {
        TrackWriterOptions {
            bin_size: DEFAULT_BIN_SIZE,
            zoom_scale_factor: DEFAULT_ZOOM_SCALE_FACTOR,
            block_record_limit: DEFAULT_BLOCK_RECORD_LIMIT,
            index_fanout: DEFAULT_INDEX_FANOUT,
            max_zoom_levels: DEFAULT_MAX_ZOOM_LEVELS,
            compress: true,
        }
    }
}

impl TrackWriterOptions {
    pub fn with_bin_size(mut self, bin_size: u32) -> Self {
        self.bin_size = bin_size;
        self
    }

    pub fn with_zoom_scale_factor(mut self, zoom_scale_factor: u32) -> Self {
        self.zoom_scale_factor = zoom_scale_factor;
        self
    }

    pub fn with_block_record_limit(mut self, block_record_limit: u32) -> Self {
        self.block_record_limit = block_record_limit;
        self
    }

    pub fn with_index_fanout(mut self, index_fanout: u32) -> Self {
        self.index_fanout = index_fanout;
        self
    }

    pub fn with_max_zoom_levels(mut self, max_zoom_levels: u16) -> Self {
        self.max_zoom_levels = max_zoom_levels;
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    ///
    /// Check every option against its allowed range.
    ///
    pub fn validate(&self) -> Result<()> {
        if self.bin_size == 0 {
            return Err(GtrackError::Precondition(
                "bin_size must be positive".to_string(),
            ));
        }
        if self.zoom_scale_factor < 2 {
            return Err(GtrackError::Precondition(format!(
                "zoom_scale_factor must be greater than 1, got {}",
                self.zoom_scale_factor
            )));
        }
        if !(1..=u16::MAX as u32).contains(&self.block_record_limit) {
            return Err(GtrackError::Precondition(format!(
                "block_record_limit must be within 1..={}, got {}",
                u16::MAX,
                self.block_record_limit
            )));
        }
        if !(2..=u16::MAX as u32).contains(&self.index_fanout) {
            return Err(GtrackError::Precondition(format!(
                "index_fanout must be within 2..={}, got {}",
                u16::MAX,
                self.index_fanout
            )));
        }
        Ok(())
    }
}
