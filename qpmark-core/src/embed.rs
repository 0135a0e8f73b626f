use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::WatermarkConfig;
use crate::error::{Error, Result};
use crate::geometry::BlockGeometry;
use crate::payload::Payload;
use crate::schedule::{BlockInfo, BlockScheduler};

/// Codec-integration seam: receives every scheduled QP change.
///
/// `buffer` is the engine's private copy of the frame, which an in-band
/// implementation may edit. Implementations must tolerate concurrent calls
/// for different frames.
pub trait QpWriter: Send + Sync {
    fn write_qp_delta(
        &self,
        buffer: &mut [u8],
        geometry: &BlockGeometry,
        block: &BlockInfo,
    ) -> Result<()>;
}

impl<W: QpWriter + ?Sized> QpWriter for Arc<W> {
    fn write_qp_delta(
        &self,
        buffer: &mut [u8],
        geometry: &BlockGeometry,
        block: &BlockInfo,
    ) -> Result<()> {
        (**self).write_qp_delta(buffer, geometry, block)
    }
}

/// Writer that discards every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullQpWriter;

impl QpWriter for NullQpWriter {
    fn write_qp_delta(&self, _: &mut [u8], _: &BlockGeometry, _: &BlockInfo) -> Result<()> {
        Ok(())
    }
}

/// Per-frame QP offsets for an external encoder.
///
/// Zero deltas are kept so the plan records every scheduled block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QpPlan {
    pub width: u32,
    pub height: u32,
    pub block_size: u32,
    pub payload: Payload,
    pub frames: BTreeMap<u32, Vec<BlockInfo>>,
}

impl QpPlan {
    pub fn total_blocks(&self) -> usize {
        self.frames.values().map(Vec::len).sum()
    }
}

/// Writer that collects scheduled changes into a [`QpPlan`].
#[derive(Debug, Default)]
pub struct QpPlanWriter {
    frames: Mutex<BTreeMap<u32, Vec<BlockInfo>>>,
}

impl QpPlanWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan of everything collected so far for `engine`'s session.
    pub fn plan(&self, engine: &EmbeddingEngine) -> QpPlan {
        let frames = self
            .frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let (width, height) = engine
            .geometry()
            .map(|g| (g.width(), g.height()))
            .unwrap_or((0, 0));
        QpPlan {
            width,
            height,
            block_size: crate::config::BLOCK_SIZE,
            payload: engine.embedded_payload(),
            frames,
        }
    }
}

impl QpWriter for QpPlanWriter {
    fn write_qp_delta(&self, _: &mut [u8], _: &BlockGeometry, block: &BlockInfo) -> Result<()> {
        let mut frames = self
            .frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        frames.entry(block.frame_index).or_default().push(*block);
        Ok(())
    }
}

/// Applies the block schedule to frames.
///
/// `apply` takes `&self`; the schedule is immutable between `bind` /
/// `update_config` calls and the counters are atomic, so frames may be
/// processed concurrently.
pub struct EmbeddingEngine {
    config: WatermarkConfig,
    embedded_payload: Payload,
    scheduler: BlockScheduler,
    writer: Box<dyn QpWriter>,
    frames_processed: AtomicU64,
    blocks_modified: AtomicU64,
}

impl EmbeddingEngine {
    /// Engine with a no-op writer.
    pub fn new(config: WatermarkConfig) -> Self {
        Self::with_writer(config, Box::new(NullQpWriter))
    }

    pub fn with_writer(config: WatermarkConfig, writer: Box<dyn QpWriter>) -> Self {
        let scheduler = BlockScheduler::unbound(&config);
        let embedded_payload = config.embedded_payload();
        Self {
            config,
            embedded_payload,
            scheduler,
            writer,
            frames_processed: AtomicU64::new(0),
            blocks_modified: AtomicU64::new(0),
        }
    }

    /// Bind to a frame size and build the schedule.
    pub fn bind(&mut self, width: u32, height: u32) -> Result<()> {
        let geometry = BlockGeometry::new(width, height)?;
        self.scheduler = BlockScheduler::new(&self.config, geometry);
        info!(
            "embedding engine bound: {width}x{height}, {} blocks, {} per frame",
            geometry.total_blocks(),
            self.scheduler.blocks_per_frame()
        );
        Ok(())
    }

    /// Replace the config; the schedule is rebuilt for the bound geometry.
    pub fn update_config(&mut self, config: WatermarkConfig) {
        self.embedded_payload = config.embedded_payload();
        self.scheduler = match self.scheduler.geometry() {
            Some(&geometry) => BlockScheduler::new(&config, geometry),
            None => BlockScheduler::unbound(&config),
        };
        self.config = config;
        info!("watermark config updated, schedule regenerated");
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    pub fn geometry(&self) -> Option<&BlockGeometry> {
        self.scheduler.geometry()
    }

    pub fn scheduler(&self) -> &BlockScheduler {
        &self.scheduler
    }

    /// Payload after optional encryption.
    pub fn embedded_payload(&self) -> Payload {
        self.embedded_payload
    }

    /// Blocks scheduled for `frame_index`. Empty when unbound.
    pub fn blocks_for_frame(&self, frame_index: u32) -> Vec<BlockInfo> {
        self.scheduler.blocks_for_frame(frame_index)
    }

    /// Copy `frame`, hand every scheduled block to the writer, return the copy.
    pub fn apply(&self, frame: &[u8], frame_index: u32) -> Result<Vec<u8>> {
        let geometry = *self.scheduler.geometry().ok_or(Error::NotInitialized)?;
        let mut modified = frame.to_vec();
        let blocks = self.scheduler.blocks_for_frame(frame_index);

        for block in &blocks {
            self.writer
                .write_qp_delta(&mut modified, &geometry, block)?;
        }

        self.blocks_modified
            .fetch_add(blocks.len() as u64, Ordering::Relaxed);
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        debug!("frame {frame_index}: {} blocks scheduled", blocks.len());
        Ok(modified)
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            blocks_modified: self.blocks_modified.load(Ordering::Relaxed),
            total_blocks: self.scheduler.total_blocks(),
            block_density: self.config.density(),
            temporal_period: self.config.period(),
            payload: self.embedded_payload,
        }
    }
}

/// Snapshot of an embedding session.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderStats {
    pub frames_processed: u64,
    pub blocks_modified: u64,
    pub total_blocks: u32,
    pub block_density: f64,
    pub temporal_period: u32,
    pub payload: Payload,
}

impl fmt::Display for EncoderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Embedding stats:")?;
        writeln!(f, "  Frames processed: {}", self.frames_processed)?;
        writeln!(f, "  Blocks modified:  {}", self.blocks_modified)?;
        writeln!(f, "  Total blocks:     {}", self.total_blocks)?;
        writeln!(f, "  Block density:    {:.3}%", self.block_density * 100.0)?;
        writeln!(f, "  Temporal period:  {} frames", self.temporal_period)?;
        write!(f, "  Payload:          {}", self.payload)
    }
}
