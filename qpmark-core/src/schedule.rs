//! Deterministic block selection and QP delta derivation.
//!
//! Each session seed yields one permutation of the block indices. Frame `f`
//! modifies the permutation entries at `(f + i * period) mod total_blocks`
//! for `i < blocks_per_frame`, so the same block set recurs every
//! `temporal_period` frames while simultaneously modified blocks stay
//! spatially scattered.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::WatermarkConfig;
use crate::geometry::BlockGeometry;
use crate::key::WatermarkKey;

/// A block scheduled for modification in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Left edge of the block, in samples.
    pub x: u32,
    /// Top edge of the block, in samples.
    pub y: u32,
    /// QP offset: -1, 0 or +1.
    pub delta: i8,
    pub frame_index: u32,
}

/// Seeded permutation of `[0, total_blocks)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSchedule {
    permutation: Vec<u32>,
}

impl BlockSchedule {
    pub fn generate(seed: u32, total_blocks: u32) -> Self {
        let mut permutation: Vec<u32> = (0..total_blocks).collect();
        WatermarkKey::from_seed(seed).shuffle(&mut permutation);
        Self { permutation }
    }

    pub fn len(&self) -> usize {
        self.permutation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permutation.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.permutation
    }

    /// Block index at permutation position `position`.
    pub fn block_at(&self, position: usize) -> u32 {
        self.permutation[position]
    }
}

/// Selects blocks and deltas for each frame.
///
/// The schedule is shared behind an `Arc` and replaced wholesale when the
/// config or geometry changes, so readers never observe a partial rebuild.
#[derive(Debug, Clone)]
pub struct BlockScheduler {
    seed: u32,
    period: u32,
    blocks_per_frame: u32,
    geometry: Option<BlockGeometry>,
    schedule: Arc<BlockSchedule>,
}

impl BlockScheduler {
    /// Scheduler not yet bound to a geometry; yields no blocks.
    pub fn unbound(config: &WatermarkConfig) -> Self {
        Self {
            seed: config.seed,
            period: config.period(),
            blocks_per_frame: 0,
            geometry: None,
            schedule: Arc::new(BlockSchedule::generate(config.seed, 0)),
        }
    }

    pub fn new(config: &WatermarkConfig, geometry: BlockGeometry) -> Self {
        let total_blocks = geometry.total_blocks();
        Self {
            seed: config.seed,
            period: config.period(),
            blocks_per_frame: config.blocks_per_frame(total_blocks),
            geometry: Some(geometry),
            schedule: Arc::new(BlockSchedule::generate(config.seed, total_blocks)),
        }
    }

    pub fn geometry(&self) -> Option<&BlockGeometry> {
        self.geometry.as_ref()
    }

    pub fn schedule(&self) -> &Arc<BlockSchedule> {
        &self.schedule
    }

    pub fn total_blocks(&self) -> u32 {
        self.schedule.len() as u32
    }

    pub fn blocks_per_frame(&self) -> u32 {
        self.blocks_per_frame
    }

    /// Blocks to modify in frame `frame_index`, in selection order.
    pub fn blocks_for_frame(&self, frame_index: u32) -> Vec<BlockInfo> {
        let Some(geometry) = self.geometry else {
            return Vec::new();
        };
        let total = self.schedule.len() as u64;
        if total == 0 {
            return Vec::new();
        }

        (0..self.blocks_per_frame as u64)
            .map(|i| {
                let position = (frame_index as u64 + i * self.period as u64) % total;
                let block_index = self.schedule.block_at(position as usize);
                let (x, y) = geometry.coordinates(block_index);
                BlockInfo {
                    x,
                    y,
                    delta: qp_delta(self.seed, block_index, frame_index),
                    frame_index,
                }
            })
            .collect()
    }
}

/// Deterministic QP delta in `{-1, 0, +1}` for a block in a frame.
pub fn qp_delta(seed: u32, block_index: u32, frame_index: u32) -> i8 {
    (mix(seed, block_index, frame_index) % 3) as i8 - 1
}

/// Multiply-xor-shift mix of the three inputs.
fn mix(seed: u32, block_index: u32, frame_index: u32) -> u32 {
    let mut h = seed
        ^ block_index.wrapping_mul(0x9E37_79B1)
        ^ frame_index.wrapping_mul(0x85EB_CA77).rotate_left(13);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    h
}
