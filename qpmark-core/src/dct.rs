//! Orthonormal DCT-II computed through a real FFT.
//!
//! A length-N DCT is evaluated with one length-N real FFT (Makhoul's
//! reordering): even samples ascending, odd samples descending, then each
//! bin is rotated by `exp(-i*pi*k / 2N)` and its real part kept.

use realfft::num_complex::Complex64;
use realfft::{RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Pre-planned 1-D DCT-II for a fixed length.
pub struct DctProcessor {
    len: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    // Pre-allocated scratch buffers
    reordered: Vec<f64>,
    spectrum: Vec<Complex64>,
    scratch: Vec<Complex64>,
    /// `exp(-i*pi*k / 2N)` times the orthonormal scale for bin `k`.
    twiddles: Vec<Complex64>,
}

impl DctProcessor {
    /// Plan a DCT of `len` samples. `len` must be > 0.
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::Transform("DCT length must be positive".into()));
        }
        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(len);
        let spectrum = forward.make_output_vec();
        let scratch = forward.make_scratch_vec();

        let n = len as f64;
        let twiddles = (0..len)
            .map(|k| {
                let scale = if k == 0 {
                    (1.0 / n).sqrt()
                } else {
                    (2.0 / n).sqrt()
                };
                Complex64::from_polar(scale, -PI * k as f64 / (2.0 * n))
            })
            .collect();

        Ok(Self {
            len,
            forward,
            reordered: vec![0.0; len],
            spectrum,
            scratch,
            twiddles,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Transform `data` in place. `data` must have exactly `len` elements.
    pub fn process(&mut self, data: &mut [f64]) -> Result<()> {
        if data.len() != self.len {
            return Err(Error::Transform(format!(
                "expected {} samples, got {}",
                self.len,
                data.len()
            )));
        }
        let n = self.len;
        for (i, &x) in data.iter().step_by(2).enumerate() {
            self.reordered[i] = x;
        }
        for (i, &x) in data.iter().skip(1).step_by(2).enumerate() {
            self.reordered[n - 1 - i] = x;
        }

        self.forward
            .process_with_scratch(&mut self.reordered, &mut self.spectrum, &mut self.scratch)
            .map_err(|e| Error::Transform(e.to_string()))?;

        let half = self.spectrum.len();
        for (k, out) in data.iter_mut().enumerate() {
            let bin = if k < half {
                self.spectrum[k]
            } else {
                self.spectrum[n - k].conj()
            };
            *out = (self.twiddles[k] * bin).re;
        }
        Ok(())
    }
}

/// Separable 2-D DCT-II over a row-major `width` x `height` plane.
pub struct Dct2d {
    width: usize,
    height: usize,
    rows: DctProcessor,
    cols: DctProcessor,
    column: Vec<f64>,
}

impl Dct2d {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        Ok(Self {
            width,
            height,
            rows: DctProcessor::new(width)?,
            cols: DctProcessor::new(height)?,
            column: vec![0.0; height],
        })
    }

    /// Whether this transform was planned for a `width` x `height` plane.
    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.width == width && self.height == height
    }

    /// Transform `plane` in place (rows first, then columns).
    pub fn forward(&mut self, plane: &mut [f64]) -> Result<()> {
        if plane.len() != self.width * self.height {
            return Err(Error::Transform(format!(
                "expected {}x{} plane, got {} samples",
                self.width,
                self.height,
                plane.len()
            )));
        }
        for row in plane.chunks_exact_mut(self.width) {
            self.rows.process(row)?;
        }
        for x in 0..self.width {
            for (y, c) in self.column.iter_mut().enumerate() {
                *c = plane[y * self.width + x];
            }
            self.cols.process(&mut self.column)?;
            for (y, &c) in self.column.iter().enumerate() {
                plane[y * self.width + x] = c;
            }
        }
        Ok(())
    }
}
