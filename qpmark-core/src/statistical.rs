//! Autocorrelation search for periodic QP structure.
//!
//! A scheduled watermark modulates the same block set every
//! `temporal_period` frames, so the per-frame mean QP proxy of a marked
//! video carries a periodic component. The detector scores the strongest
//! raw autocorrelation over a range of lags.

use log::debug;

use crate::detect::DetectionResult;
use crate::features::FrameAnalysis;
use crate::payload::Payload;

/// Frames required before any analysis is attempted.
pub const MIN_FRAMES: usize = 10;
/// QP samples required for the autocorrelation search.
pub const MIN_AUTOCORRELATION_SAMPLES: usize = 20;
/// Autocorrelation peaks at or below this are treated as noise.
const PEAK_THRESHOLD: f64 = 0.1;
/// Upper bound on the confidence this detector reports.
const MAX_CONFIDENCE: f64 = 0.8;
/// Confidence above which the detector reports a detection.
const DETECTION_CONFIDENCE: f64 = 0.5;
/// Scale from the autocorrelation peak to the reported payload value.
const PAYLOAD_SCALE: f64 = 1e6;

/// Periodicity detector over per-frame mean QP proxies. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalDetector;

impl StatisticalDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, analyses: &[FrameAnalysis]) -> DetectionResult {
        if analyses.len() < MIN_FRAMES {
            return DetectionResult::not_detected(format!(
                "insufficient frames for statistical analysis: {} < {MIN_FRAMES}",
                analyses.len()
            ));
        }

        let series: Vec<f64> = analyses.iter().filter_map(FrameAnalysis::mean_qp).collect();
        if series.len() < MIN_AUTOCORRELATION_SAMPLES {
            return DetectionResult::not_detected(format!(
                "too few QP samples for autocorrelation: {} < {MIN_AUTOCORRELATION_SAMPLES}",
                series.len()
            ));
        }

        let lags = 1..series.len() / 2;
        let lags_examined = lags.len();
        let peak = lags
            .map(|lag| autocorrelation(&series, lag))
            .fold(f64::NEG_INFINITY, f64::max);

        // Payload and seed are only reported for a peak above the noise floor.
        let (confidence, payload, seed) = if peak > PEAK_THRESHOLD {
            (
                peak.min(MAX_CONFIDENCE),
                Payload::new((peak * PAYLOAD_SCALE).round() as u64),
                lags_examined as u32,
            )
        } else {
            (0.0, Payload::default(), 0)
        };
        debug!("statistical: {lags_examined} lags, peak {peak:.6}, confidence {confidence:.3}");

        DetectionResult {
            detected: confidence > DETECTION_CONFIDENCE,
            confidence,
            payload,
            seed,
            diagnostic: format!("autocorrelation peak {peak:.6} over {lags_examined} lags"),
        }
    }
}

/// Unnormalized autocorrelation `sum_i q[i] * q[i + lag]`.
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if lag >= series.len() {
        return 0.0;
    }
    series
        .iter()
        .zip(&series[lag..])
        .map(|(a, b)| a * b)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(index: u32, qp: f64) -> FrameAnalysis {
        FrameAnalysis {
            frame_index: index,
            qp_values: vec![qp; 4],
            ..FrameAnalysis::default()
        }
    }

    fn series(values: impl IntoIterator<Item = f64>) -> Vec<FrameAnalysis> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, qp)| analysis(i as u32, qp))
            .collect()
    }

    #[test]
    fn too_few_frames() {
        let result = StatisticalDetector::new().detect(&series([1.0; 5]));
        assert!(!result.detected);
        assert_eq!(result.confidence, 0.0);
        assert!(result.diagnostic.contains("insufficient frames"));
    }

    #[test]
    fn too_few_samples_for_autocorrelation() {
        let result = StatisticalDetector::new().detect(&series([1.0; 15]));
        assert!(!result.detected);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn frames_without_qp_values_are_skipped() {
        let mut analyses = series([1.0; 12]);
        analyses.extend((12..30).map(FrameAnalysis::empty));
        let result = StatisticalDetector::new().detect(&analyses);
        assert!(!result.detected);
        assert!(result.diagnostic.contains("too few QP samples"));
    }

    #[test]
    fn flat_series_has_zero_confidence() {
        let result = StatisticalDetector::new().detect(&series([0.0; 25]));
        assert!(!result.detected);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.payload, Payload::default());
        assert_eq!(result.seed, 0);
        assert!(result.diagnostic.contains("over 11 lags"));
    }

    #[test]
    fn strong_structure_is_capped() {
        let result = StatisticalDetector::new().detect(&series([10.0; 40]));
        assert!(result.detected);
        assert_eq!(result.confidence, MAX_CONFIDENCE);
    }

    #[test]
    fn weak_peak_is_noise() {
        // 24 samples of 0.05: lag 1 gives 23 * 0.0025 = 0.0575
        let result = StatisticalDetector::new().detect(&series([0.05; 24]));
        assert!(!result.detected);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.payload, Payload::default());
        assert_eq!(result.seed, 0);
    }

    #[test]
    fn peak_above_noise_floor_reports_payload_and_seed() {
        // 24 samples of 0.1: lag 1 gives 23 * 0.01 = 0.23
        let result = StatisticalDetector::new().detect(&series([0.1; 24]));
        assert!(!result.detected);
        assert!((result.confidence - 0.23).abs() < 1e-9);
        assert_eq!(result.payload, Payload::new(230_000));
        // lags 1..12
        assert_eq!(result.seed, 11);
    }

    #[test]
    fn autocorrelation_sums_lagged_products() {
        let q = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(autocorrelation(&q, 1), 2.0 + 6.0 + 12.0);
        assert_eq!(autocorrelation(&q, 3), 4.0);
        assert_eq!(autocorrelation(&q, 4), 0.0);
    }
}
