use serde::{Deserialize, Serialize};

use crate::key::encryption_mask;
use crate::payload::Payload;

/// Slack absorbed before flooring the per-frame block budget, so decimal
/// densities such as 0.7 or 0.29 are not rounded down by representation error.
const BUDGET_EPSILON: f64 = 1e-9;

/// Edge length of a square block, in samples.
pub const BLOCK_SIZE: u32 = 8;

/// Configuration for watermark embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Payload identifying the content owner.
    pub payload: Payload,
    /// Seed for the block permutation and delta derivation.
    pub seed: u32,
    /// Fraction of blocks modified over one temporal period, in (0, 1].
    /// Default: 0.008.
    pub block_density: f64,
    /// Frames between repetitions of the block pattern. Default: 30.
    pub temporal_period: u32,
    /// Whether the payload is masked before embedding.
    pub enable_encryption: bool,
    /// Passphrase for the payload mask. Empty means identity.
    pub encryption_key: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            payload: Payload::default(),
            seed: 0,
            block_density: 0.008,
            temporal_period: 30,
            enable_encryption: false,
            encryption_key: String::new(),
        }
    }
}

impl WatermarkConfig {
    /// Density clamped into `[0, 1]`; NaN counts as zero.
    pub fn density(&self) -> f64 {
        if self.block_density.is_nan() {
            0.0
        } else {
            self.block_density.clamp(0.0, 1.0)
        }
    }

    /// Temporal period, never below one frame.
    pub fn period(&self) -> u32 {
        self.temporal_period.max(1)
    }

    /// Number of blocks modified in each frame for a geometry of
    /// `total_blocks` blocks. Never exceeds `total_blocks`.
    pub fn blocks_per_frame(&self, total_blocks: u32) -> u32 {
        let exact = total_blocks as f64 * self.density() / self.period() as f64;
        let budget = (exact + BUDGET_EPSILON).floor();
        (budget as u32).min(total_blocks)
    }

    /// Payload as it is embedded (masked if encryption is enabled).
    pub fn embedded_payload(&self) -> Payload {
        if self.enable_encryption {
            self.payload.masked(encryption_mask(&self.encryption_key))
        } else {
            self.payload
        }
    }
}

/// Which detector(s) an extraction session runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMethod {
    /// Autocorrelation search over per-frame QP proxies.
    Statistical,
    /// Weight-profile scoring of concatenated features.
    Learned,
    /// Statistical first, learned as fallback.
    #[default]
    Fused,
}

/// Configuration for watermark extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum frames a scan must yield before detection runs. Default: 10.
    pub min_frames: usize,
    /// Hard cap on frames read from a source. Default: 1000.
    pub max_frames: usize,
    /// Minimum confidence for a detector result to be accepted. Default: 0.7.
    pub confidence_threshold: f64,
    /// Edge of the square analysis raster frames are resampled to. Default: 720.
    pub analysis_size: u32,
    /// Detector selection. Default: fused.
    pub method: AnalysisMethod,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_frames: 10,
            max_frames: 1000,
            confidence_threshold: 0.7,
            analysis_size: 720,
            method: AnalysisMethod::Fused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_per_frame_spreads_density_over_period() {
        let config = WatermarkConfig {
            block_density: 0.5,
            temporal_period: 2,
            ..WatermarkConfig::default()
        };
        // 100 * 0.5 / 2
        assert_eq!(config.blocks_per_frame(100), 25);
    }

    #[test]
    fn blocks_per_frame_floors_to_zero() {
        let config = WatermarkConfig {
            seed: 12345,
            block_density: 0.3,
            temporal_period: 30,
            ..WatermarkConfig::default()
        };
        assert_eq!(config.blocks_per_frame(64), 0);
    }

    #[test]
    fn decimal_densities_floor_exactly() {
        let cases = [
            (0.7, 10, 1, 7),
            (0.005, 6000, 30, 1),
            (0.29, 100, 1, 29),
            (0.008, 8160, 30, 2),
            (0.3, 64, 30, 0),
        ];
        for (density, total, period, expected) in cases {
            let config = WatermarkConfig {
                block_density: density,
                temporal_period: period,
                ..WatermarkConfig::default()
            };
            assert_eq!(
                config.blocks_per_frame(total),
                expected,
                "density {density}, {total} blocks, period {period}"
            );
        }
    }

    #[test]
    fn degenerate_values_are_clamped() {
        let config = WatermarkConfig {
            block_density: 7.0,
            temporal_period: 0,
            ..WatermarkConfig::default()
        };
        assert_eq!(config.period(), 1);
        assert_eq!(config.blocks_per_frame(64), 64);

        let nan = WatermarkConfig {
            block_density: f64::NAN,
            ..WatermarkConfig::default()
        };
        assert_eq!(nan.blocks_per_frame(64), 0);
    }

    #[test]
    fn embedded_payload_respects_encryption_flag() {
        let plain = WatermarkConfig {
            payload: Payload::new(42),
            encryption_key: "k".into(),
            ..WatermarkConfig::default()
        };
        assert_eq!(plain.embedded_payload(), Payload::new(42));

        let encrypted = WatermarkConfig {
            enable_encryption: true,
            ..plain.clone()
        };
        assert_ne!(encrypted.embedded_payload(), Payload::new(42));
        assert_eq!(
            encrypted
                .embedded_payload()
                .masked(encryption_mask("k")),
            Payload::new(42)
        );
    }

    #[test]
    fn extraction_defaults() {
        let config = ExtractionConfig::default();
        assert_eq!(config.min_frames, 10);
        assert_eq!(config.max_frames, 1000);
        assert_eq!(config.method, AnalysisMethod::Fused);
    }
}
