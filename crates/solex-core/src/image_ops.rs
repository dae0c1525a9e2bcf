use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::{MAX_PIXEL_VALUE, PARALLEL_PIXEL_THRESHOLD};
use crate::math::gaussian::gaussian_kernel_1d;

/// Rotate 90 degrees counter-clockwise. Output shape is (w, h).
pub fn rotate_left(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut out = Array2::<f32>::zeros((w, h));
    for row in 0..w {
        for col in 0..h {
            out[[row, col]] = data[[col, w - 1 - row]];
        }
    }
    out
}

/// Rotate 90 degrees clockwise. Output shape is (w, h).
pub fn rotate_right(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut out = Array2::<f32>::zeros((w, h));
    for row in 0..w {
        for col in 0..h {
            out[[row, col]] = data[[h - 1 - col, row]];
        }
    }
    out
}

/// Mirror along the vertical axis (left-right), in place.
pub fn flip_horizontal(data: &mut Array2<f32>) {
    let (h, w) = data.dim();
    for row in 0..h {
        for col in 0..w / 2 {
            data.swap([row, col], [row, w - 1 - col]);
        }
    }
}

/// Mirror along the horizontal axis (top-bottom), in place.
pub fn flip_vertical(data: &mut Array2<f32>) {
    let (h, w) = data.dim();
    for row in 0..h / 2 {
        for col in 0..w {
            data.swap([row, col], [h - 1 - row, col]);
        }
    }
}

/// Bilinear sample at fractional coordinates, clamped to the image bounds.
pub fn bilinear_sample(data: &Array2<f32>, x: f64, y: f64) -> f32 {
    let (h, w) = data.dim();
    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let top = data[[y0, x0]] * (1.0 - fx) + data[[y0, x1]] * fx;
    let bottom = data[[y1, x0]] * (1.0 - fx) + data[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Rotate by an arbitrary angle (radians, counter-clockwise) around the
/// image center. Samples bilinearly; pixels falling outside the source
/// are filled with zero.
pub fn rotate(data: &Array2<f32>, angle: f64) -> Array2<f32> {
    let (h, w) = data.dim();
    let cx = (w - 1) as f64 / 2.0;
    let cy = (h - 1) as f64 / 2.0;
    let (sin, cos) = angle.sin_cos();

    let mut out = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            let dx = col as f64 - cx;
            let dy = row as f64 - cy;
            // Inverse mapping: rotate the destination pixel back.
            let sx = cx + dx * cos + dy * sin;
            let sy = cy - dx * sin + dy * cos;
            if sx >= 0.0 && sx <= (w - 1) as f64 && sy >= 0.0 && sy <= (h - 1) as f64 {
                out[[row, col]] = bilinear_sample(data, sx, sy);
            }
        }
    }
    out
}

/// Resample to a new size with bilinear interpolation.
pub fn rescale(data: &Array2<f32>, new_width: usize, new_height: usize) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut out = Array2::<f32>::zeros((new_height, new_width));
    let sx = w as f64 / new_width as f64;
    let sy = h as f64 / new_height as f64;
    for row in 0..new_height {
        for col in 0..new_width {
            out[[row, col]] = bilinear_sample(data, col as f64 * sx, row as f64 * sy);
        }
    }
    out
}

/// Separable Gaussian blur with edge clamping.
pub fn gaussian_blur(data: &Array2<f32>, sigma: f32) -> Array2<f32> {
    let kernel = gaussian_kernel_1d(sigma);
    let rows = convolve_1d(data, &kernel, true);
    convolve_1d(&rows, &kernel, false)
}

/// Unsharp masking: out = img + amount * (img - blurred), clamped to the
/// pipeline sample range.
pub fn unsharp_mask(data: &Array2<f32>, sigma: f32, amount: f32) -> Array2<f32> {
    let blurred = gaussian_blur(data, sigma);
    let mut out = data.clone();
    out.zip_mut_with(&blurred, |v, &b| {
        *v = (*v + amount * (*v - b)).clamp(0.0, MAX_PIXEL_VALUE);
    });
    out
}

fn convolve_1d(data: &Array2<f32>, kernel: &[f32], horizontal: bool) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = kernel.len() / 2;

    let convolve_row = |row: usize| -> Vec<f32> {
        (0..w)
            .map(|col| {
                let mut sum = 0.0f32;
                for (ki, &kv) in kernel.iter().enumerate() {
                    let offset = ki as isize - radius as isize;
                    let (src_row, src_col) = if horizontal {
                        (row, (col as isize + offset).clamp(0, w as isize - 1) as usize)
                    } else {
                        ((row as isize + offset).clamp(0, h as isize - 1) as usize, col)
                    };
                    sum += data[[src_row, src_col]] * kv;
                }
                sum
            })
            .collect()
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(convolve_row).collect()
    } else {
        (0..h).map(convolve_row).collect()
    };

    let mut out = Array2::<f32>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            out[[row, col]] = val;
        }
    }
    out
}
