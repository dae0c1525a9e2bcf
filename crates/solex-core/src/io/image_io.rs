use std::path::Path;

use image::{ImageFormat, Luma, Rgb};
use ndarray::Array2;

use crate::consts::MAX_PIXEL_VALUE;
use crate::error::Result;

/// Save a single-channel buffer as a 16-bit grayscale image.
///
/// Samples are expected in [0, 65535] and are clamped before encoding.
/// Format is chosen from the file extension (PNG or TIFF; TIFF default).
pub fn save_mono(data: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let mut pixels: Vec<u16> = Vec::with_capacity(h * w);
    for row in 0..h {
        for col in 0..w {
            pixels.push(data[[row, col]].clamp(0.0, MAX_PIXEL_VALUE) as u16);
        }
    }

    let img = image::ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .expect("buffer size matches dimensions");
    match format_for(path) {
        ImageFormat::Png => img.save_with_format(path, ImageFormat::Png)?,
        _ => img.save_with_format(path, ImageFormat::Tiff)?,
    }
    Ok(())
}

/// Save three channel planes as a 16-bit RGB image.
pub fn save_rgb(channels: &[Array2<f32>; 3], path: &Path) -> Result<()> {
    let (h, w) = channels[0].dim();
    let mut pixels: Vec<u16> = Vec::with_capacity(h * w * 3);
    for row in 0..h {
        for col in 0..w {
            for channel in channels {
                pixels.push(channel[[row, col]].clamp(0.0, MAX_PIXEL_VALUE) as u16);
            }
        }
    }

    let img = image::ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .expect("buffer size matches dimensions");
    match format_for(path) {
        ImageFormat::Png => img.save_with_format(path, ImageFormat::Png)?,
        _ => img.save_with_format(path, ImageFormat::Tiff)?,
    }
    Ok(())
}

fn format_for(path: &Path) -> ImageFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => ImageFormat::Png,
        _ => ImageFormat::Tiff,
    }
}
