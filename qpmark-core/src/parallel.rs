//! Optional parallel processing using rayon.
//!
//! Enable with the `parallel` feature flag. Feature extraction is a pure
//! function of one frame and `EmbeddingEngine::apply` only reads shared
//! state, so both fan out across frames with no coordination.

use rayon::prelude::*;

use crate::embed::EmbeddingEngine;
use crate::error::Result;
use crate::features::{FeatureExtractor, FrameAnalysis};
use crate::frame::Frame;

/// Analyze frames in parallel. Output order matches `frames`.
pub fn analyze_parallel(extractor: &FeatureExtractor, frames: &[Frame]) -> Vec<FrameAnalysis> {
    frames
        .par_iter()
        .map(|frame| extractor.extract(frame))
        .collect()
}

/// Apply the engine's schedule to every frame in parallel, using each
/// frame's own index. Fails on the first error.
pub fn embed_parallel(engine: &EmbeddingEngine, frames: &[Frame]) -> Result<Vec<Vec<u8>>> {
    frames
        .par_iter()
        .map(|frame| engine.apply(&frame.data, frame.index))
        .collect()
}
