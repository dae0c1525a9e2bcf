use ndarray::Array2;

use crate::math::ellipse::Ellipse;

/// Color/Bayer mode of the source data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColorMode {
    Mono,
    BayerRGGB,
    BayerGRBG,
    BayerGBRG,
    BayerBGGR,
    RGB,
    BGR,
}

impl ColorMode {
    pub fn is_bayer(&self) -> bool {
        matches!(
            self,
            Self::BayerRGGB | Self::BayerGRBG | Self::BayerGBRG | Self::BayerBGGR
        )
    }
}

/// Frame geometry, fixed for the whole SER sequence.
#[derive(Clone, Copy, Debug)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
    /// Bit depth of a single plane (1..=16).
    pub pixel_depth: u32,
    pub color_mode: ColorMode,
    /// Endianness of 16-bit samples.
    pub little_endian: bool,
}

impl Geometry {
    /// Bytes per pixel plane (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_sample(&self) -> usize {
        if self.pixel_depth <= 8 {
            1
        } else {
            2
        }
    }

    /// Number of planes per pixel (1 for mono/bayer, 3 for RGB/BGR).
    pub fn planes_per_pixel(&self) -> usize {
        match self.color_mode {
            ColorMode::RGB | ColorMode::BGR => 3,
            _ => 1,
        }
    }

    /// Total bytes per frame.
    pub fn frame_byte_size(&self) -> usize {
        self.width * self.height * self.bytes_per_sample() * self.planes_per_pixel()
    }
}

/// Statistics attached to a processed image.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageStats {
    pub black_point: f32,
}

/// Typed metadata carried along with a processed image.
///
/// Each stage fills the fields it is responsible for; consumers look up
/// what they need by field rather than by runtime type.
#[derive(Clone, Debug, Default)]
pub struct ImageMetadata {
    pub pixel_shift: Option<f64>,
    pub ellipse: Option<Ellipse>,
    pub black_point: Option<f32>,
    pub stats: Option<ImageStats>,
}

/// A single grayscale image moving through the pipeline.
///
/// Pixel values are f32 in [0, 65535]; shape is (height, width).
#[derive(Clone, Debug)]
pub struct ImageWrapper {
    pub data: Array2<f32>,
    pub metadata: ImageMetadata,
}

impl ImageWrapper {
    pub fn new(data: Array2<f32>) -> Self {
        Self {
            data,
            metadata: ImageMetadata::default(),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn with_pixel_shift(mut self, shift: f64) -> Self {
        self.metadata.pixel_shift = Some(shift);
        self
    }
}
