pub mod debayer;

use ndarray::Array2;

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::error::{Result, SolexError};
use crate::frame::{ColorMode, Geometry};

use self::debayer::{demosaic, site_channel};

/// Converts raw SER frame bytes into single-channel float buffers.
///
/// All converters produce samples in [0, 65535]: 8-bit input is scaled by
/// 256, 16-bit input is taken as-is honoring the header endianness.
pub trait ImageConverter: Send + Sync {
    /// Allocate an output buffer matching the frame geometry.
    fn create_buffer(&self, geometry: &Geometry) -> Array2<f32> {
        Array2::zeros((geometry.height, geometry.width))
    }

    fn convert(
        &self,
        frame_index: usize,
        bytes: &[u8],
        geometry: &Geometry,
        out: &mut Array2<f32>,
    ) -> Result<()>;
}

/// Pick the converter for a color mode.
pub fn create_converter(mode: ColorMode) -> Box<dyn ImageConverter> {
    match mode {
        ColorMode::Mono => Box::new(MonoConverter),
        ColorMode::RGB | ColorMode::BGR => Box::new(RgbLuminanceConverter),
        _ => Box::new(BayerConverter),
    }
}

#[inline]
fn read_sample(bytes: &[u8], index: usize, geometry: &Geometry) -> f32 {
    if geometry.bytes_per_sample() == 1 {
        // Align 8-bit data with the 16-bit sample range.
        bytes[index] as f32 * 256.0
    } else {
        let pair = [bytes[2 * index], bytes[2 * index + 1]];
        if geometry.little_endian {
            u16::from_le_bytes(pair) as f32
        } else {
            u16::from_be_bytes(pair) as f32
        }
    }
}

fn check_frame_size(bytes: &[u8], geometry: &Geometry) -> Result<()> {
    if bytes.len() < geometry.frame_byte_size() {
        return Err(SolexError::InvalidSer(format!(
            "Frame too short: expected {} bytes, got {}",
            geometry.frame_byte_size(),
            bytes.len()
        )));
    }
    Ok(())
}

/// Direct 8-/16-bit to float conversion.
pub struct MonoConverter;

impl ImageConverter for MonoConverter {
    fn convert(
        &self,
        _frame_index: usize,
        bytes: &[u8],
        geometry: &Geometry,
        out: &mut Array2<f32>,
    ) -> Result<()> {
        check_frame_size(bytes, geometry)?;
        for row in 0..geometry.height {
            for col in 0..geometry.width {
                out[[row, col]] = read_sample(bytes, row * geometry.width + col, geometry);
            }
        }
        Ok(())
    }
}

/// Interleaved RGB/BGR frames collapsed to BT.601 luminance.
pub struct RgbLuminanceConverter;

impl ImageConverter for RgbLuminanceConverter {
    fn convert(
        &self,
        _frame_index: usize,
        bytes: &[u8],
        geometry: &Geometry,
        out: &mut Array2<f32>,
    ) -> Result<()> {
        check_frame_size(bytes, geometry)?;
        let (ri, bi) = match geometry.color_mode {
            ColorMode::BGR => (2, 0),
            _ => (0, 2),
        };
        for row in 0..geometry.height {
            for col in 0..geometry.width {
                let base = 3 * (row * geometry.width + col);
                let r = read_sample(bytes, base + ri, geometry);
                let g = read_sample(bytes, base + 1, geometry);
                let b = read_sample(bytes, base + bi, geometry);
                out[[row, col]] = LUMINANCE_R * r + LUMINANCE_G * g + LUMINANCE_B * b;
            }
        }
        Ok(())
    }
}

/// Bayer mosaic frames: bilinear demosaic, then luminance.
pub struct BayerConverter;

impl ImageConverter for BayerConverter {
    fn convert(
        &self,
        _frame_index: usize,
        bytes: &[u8],
        geometry: &Geometry,
        out: &mut Array2<f32>,
    ) -> Result<()> {
        check_frame_size(bytes, geometry)?;
        let (w, h) = (geometry.width, geometry.height);

        // Scatter sensor samples into their channel slot; the demosaic
        // fills the two missing channels of every interior pixel.
        let mut rgb = vec![0.0f32; w * h * 3];
        for row in 0..h {
            for col in 0..w {
                let idx = row * w + col;
                let channel = site_channel(col, row, geometry.color_mode)?;
                rgb[3 * idx + channel] = read_sample(bytes, idx, geometry);
            }
        }
        demosaic(&mut rgb, geometry.color_mode, w, h)?;

        for row in 0..h {
            for col in 0..w {
                let base = 3 * (row * w + col);
                out[[row, col]] = LUMINANCE_R * rgb[base]
                    + LUMINANCE_G * rgb[base + 1]
                    + LUMINANCE_B * rgb[base + 2];
            }
        }
        Ok(())
    }
}
