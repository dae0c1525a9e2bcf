use ndarray::Array2;
use tracing::debug;

use crate::error::{Result, SolexError};
use crate::image_ops::gaussian_blur;
use crate::math::ellipse::{fit_ellipse, Ellipse};

/// Semi-axis ratio bounds outside which a fit is rejected.
const MIN_AXIS_RATIO: f64 = 0.5;
const MAX_AXIS_RATIO: f64 = 2.0;

/// Gradient magnitude threshold, relative to the image peak gradient.
const EDGE_GRADIENT_THRESHOLD: f32 = 0.25;

/// Blur applied before gradient extraction.
const PREFILTER_SIGMA: f32 = 2.0;

const MIN_EDGE_SAMPLES: usize = 16;

/// Result of the disk ellipse regression.
#[derive(Clone, Debug)]
pub struct EllipseFit {
    pub ellipse: Ellipse,
    /// Mean radial distance of the edge samples to the fitted boundary.
    pub residual_error: f64,
    pub sample_count: usize,
}

/// Fit the solar disk boundary on a reconstructed image.
///
/// Pre-filter: Gaussian blur then Sobel gradient magnitude; samples above
/// a relative threshold feed a direct least-squares conic fit. Fits whose
/// semi-axis ratio falls outside [0.5, 2.0] or whose center lies outside
/// the image are rejected.
pub fn fit_disk_ellipse(data: &Array2<f32>) -> Result<EllipseFit> {
    let (h, w) = data.dim();
    let blurred = gaussian_blur(data, PREFILTER_SIGMA);
    let points = edge_points(&blurred);
    debug!(samples = points.len(), "Disk edge samples extracted");
    if points.len() < MIN_EDGE_SAMPLES {
        return Err(SolexError::EllipseFit(format!(
            "only {} edge samples found",
            points.len()
        )));
    }

    let ellipse = fit_ellipse(&points)
        .ok_or_else(|| SolexError::EllipseFit("degenerate conic".to_string()))?;

    let ratio = ellipse.axis_ratio();
    if !(MIN_AXIS_RATIO..=MAX_AXIS_RATIO).contains(&ratio)
        && !(MIN_AXIS_RATIO..=MAX_AXIS_RATIO).contains(&(1.0 / ratio))
    {
        return Err(SolexError::EllipseFit(format!(
            "implausible semi-axis ratio {ratio:.2}"
        )));
    }
    if ellipse.cx < 0.0
        || ellipse.cx >= w as f64
        || ellipse.cy < 0.0
        || ellipse.cy >= h as f64
    {
        return Err(SolexError::EllipseFit(format!(
            "center ({:.1}, {:.1}) outside the image",
            ellipse.cx, ellipse.cy
        )));
    }

    let residual_error = points
        .iter()
        .map(|&(x, y)| ellipse.radial_residual(x, y))
        .sum::<f64>()
        / points.len() as f64;

    Ok(EllipseFit {
        ellipse,
        residual_error,
        sample_count: points.len(),
    })
}

/// Sobel gradient magnitudes above a fraction of the peak gradient.
fn edge_points(data: &Array2<f32>) -> Vec<(f64, f64)> {
    let (h, w) = data.dim();
    if h < 3 || w < 3 {
        return Vec::new();
    }

    let mut gradient = Array2::<f32>::zeros((h, w));
    let mut peak = 0.0f32;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (data[[y - 1, x + 1]] + 2.0 * data[[y, x + 1]] + data[[y + 1, x + 1]])
                - (data[[y - 1, x - 1]] + 2.0 * data[[y, x - 1]] + data[[y + 1, x - 1]]);
            let gy = (data[[y + 1, x - 1]] + 2.0 * data[[y + 1, x]] + data[[y + 1, x + 1]])
                - (data[[y - 1, x - 1]] + 2.0 * data[[y - 1, x]] + data[[y - 1, x + 1]]);
            let magnitude = (gx * gx + gy * gy).sqrt();
            gradient[[y, x]] = magnitude;
            peak = peak.max(magnitude);
        }
    }
    if peak <= 0.0 {
        return Vec::new();
    }

    let threshold = peak * EDGE_GRADIENT_THRESHOLD;
    let mut points = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            if gradient[[y, x]] > threshold {
                points.push((x as f64, y as f64));
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_image(w: usize, h: usize, cx: f64, cy: f64, radius: f64) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(y, x)| {
            let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
            if d <= radius {
                30000.0
            } else {
                500.0
            }
        })
    }

    #[test]
    fn fits_centered_circle_within_half_pixel() {
        let img = disk_image(256, 256, 128.0, 128.0, 100.0);
        let fit = fit_disk_ellipse(&img).unwrap();
        assert!((fit.ellipse.cx - 128.0).abs() < 0.5);
        assert!((fit.ellipse.cy - 128.0).abs() < 0.5);
        assert!((fit.ellipse.a - 100.0).abs() < 2.5);
        assert!((fit.ellipse.b - 100.0).abs() < 2.5);
        assert!(fit.ellipse.axis_ratio() < 1.05);
    }

    #[test]
    fn flat_image_is_rejected() {
        let img = Array2::from_elem((64, 64), 1000.0f32);
        assert!(fit_disk_ellipse(&img).is_err());
    }

    #[test]
    fn off_image_center_is_rejected() {
        // Only a sliver of a huge disk is visible; the center regresses
        // far outside the frame.
        let img = disk_image(64, 64, 500.0, 32.0, 470.0);
        assert!(fit_disk_ellipse(&img).is_err());
    }
}
