use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};

/// Sample layout of a raw frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Bgr8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A decoded video frame: interleaved 8-bit samples, row-major, no padding.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(index: u32, width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            format,
            data,
        }
    }

    /// Single-channel frame filled from `f(x, y)`.
    pub fn from_fn(index: u32, width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> Self {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self::new(index, width, height, PixelFormat::Gray8, data)
    }

    /// Wrap a decoded image. Grayscale stays single-channel, everything
    /// else is converted to RGB.
    pub fn from_image(index: u32, image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        match image {
            DynamicImage::ImageLuma8(gray) => {
                Self::new(index, width, height, PixelFormat::Gray8, gray.into_raw())
            }
            other => Self::new(
                index,
                width,
                height,
                PixelFormat::Rgb8,
                other.into_rgb8().into_raw(),
            ),
        }
    }

    /// Number of bytes a well-formed buffer of this size holds.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels()
    }

    /// Zero-sized or truncated buffers.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.len() < self.expected_len()
    }

    /// Luma plane using BT.601 weights. `None` for degenerate frames.
    pub fn to_luma(&self) -> Option<GrayImage> {
        if self.is_degenerate() {
            return None;
        }
        let pixels = self.width as usize * self.height as usize;
        let channels = self.format.channels();
        let samples = &self.data[..pixels * channels];
        let luma: Vec<u8> = match self.format {
            PixelFormat::Gray8 => samples.to_vec(),
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => samples
                .chunks_exact(channels)
                .map(|px| bt601(px[0], px[1], px[2]))
                .collect(),
            PixelFormat::Bgr8 => samples
                .chunks_exact(channels)
                .map(|px| bt601(px[2], px[1], px[0]))
                .collect(),
        };
        GrayImage::from_raw(self.width, self.height, luma)
    }
}

fn bt601(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

/// Square luma raster at the analysis resolution, samples in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRaster {
    pub size: usize,
    pub samples: Vec<f64>,
}

impl AnalysisRaster {
    /// Convert `frame` to luma and resample to `size` x `size` with a
    /// bilinear filter. `None` for degenerate frames or a zero size.
    pub fn from_frame(frame: &Frame, size: u32) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let luma = frame.to_luma()?;
        let resized = if luma.width() == size && luma.height() == size {
            luma
        } else {
            imageops::resize(&luma, size, size, FilterType::Triangle)
        };
        let samples = resized
            .into_raw()
            .into_iter()
            .map(|v| v as f64 / 255.0)
            .collect();
        Some(Self {
            size: size as usize,
            samples,
        })
    }

    pub fn row(&self, y: usize) -> &[f64] {
        &self.samples[y * self.size..(y + 1) * self.size]
    }
}
