pub mod config;
pub mod dct;
pub mod detect;
pub mod embed;
pub mod error;
pub mod features;
pub mod frame;
pub mod geometry;
pub mod key;
pub mod learned;
pub mod payload;
pub mod schedule;
pub mod source;
pub mod statistical;

#[cfg(feature = "parallel")]
pub mod parallel;

use std::sync::Arc;

// Re-export primary API types
pub use config::{AnalysisMethod, ExtractionConfig, WatermarkConfig};
pub use detect::{DetectionResult, Extractor, ExtractorStats};
pub use embed::{EmbeddingEngine, EncoderStats, NullQpWriter, QpPlan, QpPlanWriter, QpWriter};
pub use error::Error;
pub use features::{FeatureExtractor, FrameAnalysis};
pub use frame::{Frame, PixelFormat};
pub use geometry::BlockGeometry;
pub use key::WatermarkKey;
pub use learned::{LearnedDetector, ModelProfile};
pub use payload::Payload;
pub use schedule::{BlockInfo, BlockScheduler};
pub use source::{ImageSequence, VecSource};
pub use statistical::StatisticalDetector;

#[cfg(feature = "parallel")]
pub use parallel::{analyze_parallel, embed_parallel};

/// Blocks scheduled for one frame of a `width` x `height` video.
///
/// This is the one-shot API; for a whole session bind an
/// [`EmbeddingEngine`] once and reuse it.
pub fn blocks_for_frame(
    config: &WatermarkConfig,
    width: u32,
    height: u32,
    frame_index: u32,
) -> error::Result<Vec<BlockInfo>> {
    let geometry = BlockGeometry::new(width, height)?;
    Ok(BlockScheduler::new(config, geometry).blocks_for_frame(frame_index))
}

/// Analyze `frames` and run detection with a fresh [`Extractor`].
///
/// The `min_frames` / `max_frames` limits of `config` apply.
pub fn detect(
    frames: Vec<Frame>,
    config: &ExtractionConfig,
    profile: Arc<ModelProfile>,
) -> DetectionResult {
    Extractor::new(config.clone(), profile).analyze_source(VecSource::new(frames))
}
