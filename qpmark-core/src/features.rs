//! Per-frame statistical features.
//!
//! True encoder QPs are not observable after decoding, so local block
//! variance stands in for them. All features are computed on a fixed-size
//! luma raster so frames from different source resolutions are comparable.

use std::cell::RefCell;

use log::debug;

use crate::config::BLOCK_SIZE;
use crate::dct::Dct2d;
use crate::frame::{AnalysisRaster, Frame};

/// Scale applied to block standard deviations to land in a QP-like range.
const QP_PROXY_SCALE: f64 = 100.0;
/// Histogram bins used for the entropy estimate.
const HISTOGRAM_BINS: usize = 256;

/// Features of one analyzed frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameAnalysis {
    pub frame_index: u32,
    /// One QP proxy per 8x8 cell, row-major.
    pub qp_values: Vec<f64>,
    /// Flattened 2-D DCT of the analysis raster, row-major.
    pub dct_coefficients: Vec<f64>,
    /// Shannon entropy of the intensity histogram, in bits.
    pub entropy: f64,
    /// Global sample variance.
    pub variance: f64,
}

impl FrameAnalysis {
    /// Zero-valued analysis for a frame that could not be analyzed.
    pub fn empty(frame_index: u32) -> Self {
        Self {
            frame_index,
            ..Self::default()
        }
    }

    pub fn blocks_analyzed(&self) -> usize {
        self.qp_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.qp_values.is_empty() && self.dct_coefficients.is_empty()
    }

    /// Mean QP proxy, or `None` when no blocks were analyzed.
    pub fn mean_qp(&self) -> Option<f64> {
        if self.qp_values.is_empty() {
            None
        } else {
            Some(self.qp_values.iter().sum::<f64>() / self.qp_values.len() as f64)
        }
    }

    /// Feature vector of this frame: QP proxies, DCT coefficients,
    /// entropy, variance.
    pub fn features(&self) -> impl Iterator<Item = f64> + '_ {
        self.qp_values
            .iter()
            .chain(self.dct_coefficients.iter())
            .copied()
            .chain([self.entropy, self.variance])
    }
}

/// Computes [`FrameAnalysis`] records from raw frames.
///
/// Stateless apart from its configuration, so one extractor may be shared
/// across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureExtractor {
    analysis_size: u32,
}

impl FeatureExtractor {
    pub fn new(analysis_size: u32) -> Self {
        Self { analysis_size }
    }

    pub fn analysis_size(&self) -> u32 {
        self.analysis_size
    }

    /// Analyze one frame. Degenerate frames give [`FrameAnalysis::empty`].
    pub fn extract(&self, frame: &Frame) -> FrameAnalysis {
        let Some(raster) = AnalysisRaster::from_frame(frame, self.analysis_size) else {
            debug!("frame {}: degenerate input, empty analysis", frame.index);
            return FrameAnalysis::empty(frame.index);
        };

        let dct_coefficients = match dct_coefficients(&raster) {
            Ok(coefficients) => coefficients,
            Err(e) => {
                debug!("frame {}: DCT failed: {e}", frame.index);
                Vec::new()
            }
        };

        FrameAnalysis {
            frame_index: frame.index,
            qp_values: qp_proxies(&raster),
            dct_coefficients,
            entropy: entropy(&raster.samples),
            variance: mean_and_variance(&raster.samples).1,
        }
    }
}

/// Standard deviation (x100) of every 8x8 cell, row-major. Edge cells may
/// be partial.
pub fn qp_proxies(raster: &AnalysisRaster) -> Vec<f64> {
    let size = raster.size;
    let block = BLOCK_SIZE as usize;
    let cells = size.div_ceil(block);
    let mut values = Vec::with_capacity(cells * cells);
    let mut cell = Vec::with_capacity(block * block);

    for y0 in (0..size).step_by(block) {
        for x0 in (0..size).step_by(block) {
            cell.clear();
            for y in y0..(y0 + block).min(size) {
                cell.extend_from_slice(&raster.row(y)[x0..(x0 + block).min(size)]);
            }
            let (_, variance) = mean_and_variance(&cell);
            values.push(variance.sqrt() * QP_PROXY_SCALE);
        }
    }
    values
}

thread_local! {
    /// Transform planned for the last analysis size seen on this thread.
    static DCT_PLAN: RefCell<Option<Dct2d>> = const { RefCell::new(None) };
}

fn dct_coefficients(raster: &AnalysisRaster) -> crate::error::Result<Vec<f64>> {
    let size = raster.size;
    let mut plane = raster.samples.clone();
    DCT_PLAN.with_borrow_mut(|slot| -> crate::error::Result<()> {
        let mut dct = match slot.take() {
            Some(dct) if dct.fits(size, size) => dct,
            _ => {
                debug!("planning {size}x{size} DCT");
                Dct2d::new(size, size)?
            }
        };
        let result = dct.forward(&mut plane);
        *slot = Some(dct);
        result
    })?;
    Ok(plane)
}

/// Shannon entropy in bits of a 256-bin histogram of `[0, 1]` samples.
pub fn entropy(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut histogram = [0usize; HISTOGRAM_BINS];
    for &s in samples {
        let bin = (s * 255.0).round() as usize;
        histogram[bin.min(HISTOGRAM_BINS - 1)] += 1;
    }
    let total = samples.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum::<f64>()
        .max(0.0)
}

/// Population mean and variance. `(0, 0)` for an empty slice.
pub fn mean_and_variance(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}
