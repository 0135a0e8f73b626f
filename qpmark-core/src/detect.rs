//! Detection fusion and extraction sessions.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};

use crate::config::{AnalysisMethod, ExtractionConfig};
use crate::error::{Error, Result};
use crate::features::{FeatureExtractor, FrameAnalysis};
use crate::frame::Frame;
use crate::learned::{LearnedDetector, ModelProfile};
use crate::payload::Payload;
use crate::statistical::StatisticalDetector;

/// Diagnostic reported when no detector passes the confidence gate.
pub const NO_DETECTION: &str = "no watermark detected with sufficient confidence";

/// Outcome of a detection attempt.
///
/// `payload` and `seed` are best-effort reconstructions and are not
/// verified against the embedded values.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub detected: bool,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub payload: Payload,
    pub seed: u32,
    pub diagnostic: String,
}

impl DetectionResult {
    pub fn not_detected(diagnostic: impl Into<String>) -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            payload: Payload::default(),
            seed: 0,
            diagnostic: diagnostic.into(),
        }
    }

    /// Whether this result is a detection at or above `threshold`.
    pub fn passes(&self, threshold: f64) -> bool {
        self.detected && self.confidence >= threshold
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detected {
            write!(
                f,
                "detected (confidence {:.3}): payload {}, seed {} [{}]",
                self.confidence, self.payload, self.seed, self.diagnostic
            )
        } else {
            write!(
                f,
                "not detected (confidence {:.3}): {}",
                self.confidence, self.diagnostic
            )
        }
    }
}

/// One lazily evaluated detector run.
type Stage<'a> = &'a dyn Fn() -> DetectionResult;

/// Run detectors in order and return the first result passing `threshold`.
///
/// Detectors are evaluated lazily, so later ones only run when earlier ones
/// fail the gate.
pub fn fuse<I>(detectors: I, threshold: f64) -> DetectionResult
where
    I: IntoIterator,
    I::Item: FnOnce() -> DetectionResult,
{
    detectors
        .into_iter()
        .map(|detect| detect())
        .find(|result| result.passes(threshold))
        .unwrap_or_else(|| DetectionResult::not_detected(NO_DETECTION))
}

/// Extraction session: feature extraction, both detectors and counters.
///
/// Detection methods take `&self`; counters are atomic so a session can be
/// shared across threads.
pub struct Extractor {
    config: ExtractionConfig,
    features: FeatureExtractor,
    statistical: StatisticalDetector,
    learned: LearnedDetector,
    videos_processed: AtomicU64,
    frames_analyzed: AtomicU64,
    watermarks_detected: AtomicU64,
}

impl Extractor {
    pub fn new(config: ExtractionConfig, profile: Arc<ModelProfile>) -> Self {
        Self {
            features: FeatureExtractor::new(config.analysis_size),
            statistical: StatisticalDetector::new(),
            learned: LearnedDetector::new(profile),
            config,
            videos_processed: AtomicU64::new(0),
            frames_analyzed: AtomicU64::new(0),
            watermarks_detected: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn feature_extractor(&self) -> &FeatureExtractor {
        &self.features
    }

    /// Replace the extraction config. The model profile is kept.
    pub fn update_config(&mut self, config: ExtractionConfig) {
        self.features = FeatureExtractor::new(config.analysis_size);
        self.config = config;
        info!("extraction config updated");
    }

    pub fn analyze_frame(&self, frame: &Frame) -> FrameAnalysis {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
        self.features.extract(frame)
    }

    /// Run the configured detector(s) over already analyzed frames.
    pub fn detect_watermark(&self, analyses: &[FrameAnalysis]) -> DetectionResult {
        let statistical = || self.statistical.detect(analyses);
        let learned = || self.learned.detect(analyses);
        let threshold = self.config.confidence_threshold;

        let result = match self.config.method {
            AnalysisMethod::Statistical => fuse([&statistical as Stage<'_>], threshold),
            AnalysisMethod::Learned => fuse([&learned as Stage<'_>], threshold),
            AnalysisMethod::Fused => fuse(
                [
                    &statistical as Stage<'_>,
                    &learned as Stage<'_>,
                ],
                threshold,
            ),
        };
        if result.detected {
            self.watermarks_detected.fetch_add(1, Ordering::Relaxed);
        }
        debug!("{:?} detection over {} frames: {result}", self.config.method, analyses.len());
        result
    }

    /// Scan a frame source and run detection.
    ///
    /// At most `max_frames` frames are pulled from `source`. Frames that fail
    /// to decode are skipped. Fewer than `min_frames` usable frames is
    /// reported as a non-detection and does not count as a processed video.
    pub fn analyze_source<S>(&self, source: S) -> DetectionResult
    where
        S: IntoIterator<Item = Result<Frame>>,
    {
        let mut analyses = Vec::new();
        for item in source.into_iter().take(self.config.max_frames) {
            match item {
                Ok(frame) => analyses.push(self.analyze_frame(&frame)),
                Err(e) => warn!("skipping unreadable frame: {e}"),
            }
        }

        if analyses.len() < self.config.min_frames {
            let error = Error::InsufficientFrames {
                needed: self.config.min_frames,
                got: analyses.len(),
            };
            info!("{error}");
            return DetectionResult::not_detected(error.to_string());
        }

        self.videos_processed.fetch_add(1, Ordering::Relaxed);
        info!("analyzed {} frames", analyses.len());
        self.detect_watermark(&analyses)
    }

    pub fn stats(&self) -> ExtractorStats {
        ExtractorStats {
            videos_processed: self.videos_processed.load(Ordering::Relaxed),
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            watermarks_detected: self.watermarks_detected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of an extraction session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractorStats {
    pub videos_processed: u64,
    pub frames_analyzed: u64,
    pub watermarks_detected: u64,
}

impl ExtractorStats {
    /// Detections per processed video, in percent. Zero before any video.
    pub fn detection_rate(&self) -> f64 {
        if self.videos_processed == 0 {
            0.0
        } else {
            self.watermarks_detected as f64 * 100.0 / self.videos_processed as f64
        }
    }
}

impl fmt::Display for ExtractorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extraction stats:")?;
        writeln!(f, "  Videos processed:    {}", self.videos_processed)?;
        writeln!(f, "  Frames analyzed:     {}", self.frames_analyzed)?;
        writeln!(f, "  Watermarks detected: {}", self.watermarks_detected)?;
        write!(f, "  Detection rate:      {:.1}%", self.detection_rate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(config: ExtractionConfig) -> Extractor {
        Extractor::new(config, Arc::new(ModelProfile::reference(64)))
    }

    fn result(detected: bool, confidence: f64, seed: u32) -> DetectionResult {
        DetectionResult {
            detected,
            confidence,
            payload: Payload::new(seed as u64),
            seed,
            diagnostic: String::new(),
        }
    }

    #[test]
    fn fuse_returns_first_passing_result() {
        let low = || result(true, 0.6, 1);
        let high = || result(true, 0.9, 2);
        let fused = fuse([&low as Stage<'_>, &high as Stage<'_>], 0.7);
        assert_eq!(fused.seed, 2);

        let first = fuse([&high as Stage<'_>, &low as Stage<'_>], 0.5);
        assert_eq!(first.seed, 2);
    }

    #[test]
    fn fuse_skips_confident_non_detections() {
        let confident_miss = || result(false, 0.95, 1);
        let fused = fuse([&confident_miss as Stage<'_>], 0.7);
        assert!(!fused.detected);
        assert_eq!(fused.diagnostic, NO_DETECTION);
        assert_eq!(fused.confidence, 0.0);
    }

    #[test]
    fn fuse_is_lazy() {
        let calls = std::cell::Cell::new(0);
        let pass = || {
            calls.set(calls.get() + 1);
            result(true, 1.0, 7)
        };
        let never = || -> DetectionResult { panic!("second detector evaluated") };
        let fused = fuse([&pass as Stage<'_>, &never as Stage<'_>], 0.7);
        assert_eq!(fused.seed, 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn no_frames_is_not_detected() {
        let session = extractor(ExtractionConfig::default());
        let result = session.detect_watermark(&[]);
        assert!(!result.detected);
        assert_eq!(result.diagnostic, NO_DETECTION);
    }

    #[test]
    fn short_source_reports_insufficient_frames() {
        let session = extractor(ExtractionConfig {
            analysis_size: 16,
            ..ExtractionConfig::default()
        });
        let frames = (0..4).map(|i| Ok(Frame::from_fn(i, 16, 16, |_, _| 0)));
        let result = session.analyze_source(frames);
        assert!(!result.detected);
        assert!(result.diagnostic.contains("insufficient frames"));
        assert_eq!(session.stats().videos_processed, 0);
        assert_eq!(session.stats().frames_analyzed, 4);
    }

    #[test]
    fn max_frames_is_a_hard_stop() {
        let session = extractor(ExtractionConfig {
            min_frames: 1,
            max_frames: 3,
            analysis_size: 8,
            ..ExtractionConfig::default()
        });
        let pulled = std::cell::Cell::new(0);
        let frames = (0..100).map(|i| {
            pulled.set(pulled.get() + 1);
            Ok(Frame::from_fn(i, 8, 8, |_, _| 0))
        });
        session.analyze_source(frames);
        assert_eq!(pulled.get(), 3);
        assert_eq!(session.stats().frames_analyzed, 3);
    }

    #[test]
    fn unreadable_frames_are_skipped() {
        let session = extractor(ExtractionConfig {
            min_frames: 2,
            analysis_size: 8,
            ..ExtractionConfig::default()
        });
        let frames = vec![
            Ok(Frame::from_fn(0, 8, 8, |_, _| 0)),
            Err(Error::SourceUnavailable("gone".into())),
            Ok(Frame::from_fn(2, 8, 8, |_, _| 0)),
        ];
        let result = session.analyze_source(frames);
        assert!(!result.diagnostic.contains("insufficient frames"));
        assert_eq!(session.stats().frames_analyzed, 2);
    }

    #[test]
    fn learned_only_method_uses_profile() {
        let session = Extractor::new(
            ExtractionConfig {
                method: AnalysisMethod::Learned,
                confidence_threshold: 0.6,
                ..ExtractionConfig::default()
            },
            Arc::new(ModelProfile::from_weights(vec![1.0]).unwrap()),
        );
        let analysis = FrameAnalysis {
            qp_values: vec![5.0],
            ..FrameAnalysis::default()
        };
        let result = session.detect_watermark(&[analysis]);
        assert!(result.detected);
        assert_eq!(session.stats().watermarks_detected, 1);
    }

    #[test]
    fn short_videos_do_not_dilute_detection_rate() {
        let session = Extractor::new(
            ExtractionConfig {
                method: AnalysisMethod::Learned,
                min_frames: 3,
                analysis_size: 8,
                ..ExtractionConfig::default()
            },
            // one QP proxy, then the DC coefficient (8 for a white 8x8 raster)
            Arc::new(ModelProfile::from_weights(vec![0.0, 1e3]).unwrap()),
        );
        let white = |count: u32| {
            (0..count).map(|i| Ok::<_, Error>(Frame::from_fn(i, 8, 8, |_, _| 255)))
        };

        assert!(!session.analyze_source(white(2)).detected);
        assert!(session.analyze_source(white(3)).detected);

        let stats = session.stats();
        assert_eq!(stats.videos_processed, 1);
        assert_eq!(stats.watermarks_detected, 1);
        assert_eq!(stats.detection_rate(), 100.0);
    }

    #[test]
    fn stats_summary() {
        let stats = ExtractorStats {
            videos_processed: 4,
            frames_analyzed: 100,
            watermarks_detected: 1,
        };
        assert_eq!(stats.detection_rate(), 25.0);
        let text = stats.to_string();
        assert!(text.contains("Frames analyzed:     100"));
        assert!(text.contains("25.0%"));
        assert_eq!(ExtractorStats::default().detection_rate(), 0.0);
    }

    #[test]
    fn update_config_changes_analysis_size() {
        let mut session = extractor(ExtractionConfig::default());
        session.update_config(ExtractionConfig {
            analysis_size: 32,
            ..ExtractionConfig::default()
        });
        assert_eq!(session.feature_extractor().analysis_size(), 32);
    }
}
