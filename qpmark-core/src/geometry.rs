use crate::config::BLOCK_SIZE;
use crate::error::{Error, Result};

/// Partition of a frame into `BLOCK_SIZE` x `BLOCK_SIZE` blocks, row-major.
///
/// Partial blocks on the right and bottom edges count as whole blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    width: u32,
    height: u32,
    blocks_x: u32,
    blocks_y: u32,
}

impl BlockGeometry {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimension { width, height });
        }
        let (blocks_x, blocks_y) = block_count(width, height);
        if blocks_x.checked_mul(blocks_y).is_none() {
            return Err(Error::InvalidDimension { width, height });
        }
        Ok(Self {
            width,
            height,
            blocks_x,
            blocks_y,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn blocks_x(&self) -> u32 {
        self.blocks_x
    }

    pub fn blocks_y(&self) -> u32 {
        self.blocks_y
    }

    pub fn total_blocks(&self) -> u32 {
        self.blocks_x * self.blocks_y
    }

    /// Top-left sample coordinates of block `index`.
    pub fn coordinates(&self, index: u32) -> (u32, u32) {
        let x = (index % self.blocks_x) * BLOCK_SIZE;
        let y = (index / self.blocks_x) * BLOCK_SIZE;
        (x, y)
    }
}

/// Blocks along each axis: `(ceil(width / 8), ceil(height / 8))`.
pub fn block_count(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(BLOCK_SIZE), height.div_ceil(BLOCK_SIZE))
}
