//! Weight-profile scoring of concatenated frame features.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::detect::DetectionResult;
use crate::error::{Error, Result};
use crate::features::FrameAnalysis;
use crate::payload::Payload;

/// Length of [`ModelProfile::reference`] profiles used when no model is given.
pub const REFERENCE_PROFILE_LEN: usize = 1024;
/// Confidence above which the detector reports a detection.
const DETECTION_CONFIDENCE: f64 = 0.6;

/// Immutable feature weight vector.
///
/// Loaded once and shared by every detector built from it; there are no
/// mutating methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    weights: Vec<f64>,
}

impl ModelProfile {
    /// Profile from in-memory weights. Rejects empty or non-finite vectors.
    pub fn from_weights(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::Model("weight profile is empty".into()));
        }
        if let Some(i) = weights.iter().position(|w| !w.is_finite()) {
            return Err(Error::Model(format!("weight {i} is not finite")));
        }
        Ok(Self { weights })
    }

    /// Deserialize a `{"weights": [...]}` document.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let profile: Self =
            serde_json::from_reader(reader).map_err(|e| Error::Model(e.to_string()))?;
        Self::from_weights(profile.weights)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Model(format!("{}: {e}", path.display())))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Placeholder profile `sin(0.1 i) * 0.5 + 0.5` for runs without a
    /// trained model.
    pub fn reference(len: usize) -> Self {
        let weights = (0..len.max(1))
            .map(|i| (0.1 * i as f64).sin() * 0.5 + 0.5)
            .collect();
        Self { weights }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Model(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Scores frame features against a [`ModelProfile`].
#[derive(Debug, Clone)]
pub struct LearnedDetector {
    profile: Arc<ModelProfile>,
}

impl LearnedDetector {
    pub fn new(profile: Arc<ModelProfile>) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    pub fn detect(&self, analyses: &[FrameAnalysis]) -> DetectionResult {
        if analyses.is_empty() {
            return DetectionResult::not_detected("no frames for learned analysis");
        }
        let features = || analyses.iter().flat_map(FrameAnalysis::features);

        let raw: f64 = features()
            .zip(self.profile.weights())
            .map(|(f, w)| f * w)
            .sum();
        let confidence = score_confidence(raw);

        let mut bytes = [0u8; 8];
        for (byte, f) in bytes.iter_mut().zip(features()) {
            *byte = scaled_byte(f);
        }
        let payload = u64::from_le_bytes(bytes);
        let seed = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        debug!("learned: raw score {raw:.6}, confidence {confidence:.3}");
        DetectionResult {
            detected: confidence > DETECTION_CONFIDENCE,
            confidence,
            payload: Payload::new(payload),
            seed,
            diagnostic: format!("learned score {raw:.6}"),
        }
    }
}

/// Map a raw score into `[0, 1]`; NaN scores give zero.
fn score_confidence(raw: f64) -> f64 {
    let confidence = raw.tanh() * 0.5 + 0.5;
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Feature scaled by 255 into a byte. NaN maps to zero.
fn scaled_byte(feature: f64) -> u8 {
    (feature * 255.0).clamp(0.0, 255.0) as u8
}
