use tracing::info;

use crate::error::Result;
use crate::frame::{ImageStats, ImageWrapper};
use crate::image_ops::{flip_horizontal, flip_vertical, rescale, rotate, unsharp_mask};
use crate::math::ellipse::Ellipse;
use crate::params::GeometryParams;

use super::fitting::EllipseFit;

const SHARPEN_SIGMA: f32 = 1.5;
const SHARPEN_AMOUNT: f32 = 0.8;

/// Output of the geometry correction stage.
#[derive(Clone, Debug)]
pub struct GeometryCorrection {
    pub corrected: ImageWrapper,
    /// The disk boundary after correction, a circle up to fit error.
    pub corrected_circle: Ellipse,
    /// Median of the off-disk background.
    pub black_point: f32,
    /// Residual error inherited from the ellipse regression.
    pub residual_error: f64,
}

/// Turns the reconstructed elliptical disk into a circular one.
///
/// Tilt correction rotates by the ellipse orientation (or a user-forced
/// angle), XY correction rescales the vertical axis by the semi-axis
/// ratio (or a user-forced ratio), then the configured mirrors apply.
pub struct GeometryCorrector<'a> {
    params: &'a GeometryParams,
}

impl<'a> GeometryCorrector<'a> {
    pub fn new(params: &'a GeometryParams) -> Self {
        Self { params }
    }

    pub fn correct(&self, image: &ImageWrapper, fit: &EllipseFit) -> Result<GeometryCorrection> {
        let ellipse = fit.ellipse;
        let tilt = self.params.tilt.unwrap_or(ellipse.theta);
        let ratio = self.params.xy_ratio.unwrap_or(ellipse.axis_ratio());
        info!(
            tilt_deg = tilt.to_degrees(),
            ratio, "Applying geometry correction"
        );

        // Rotating the content by -tilt brings the major axis horizontal.
        let (h, w) = image.data.dim();
        let rotated = rotate(&image.data, -tilt);
        let (mut cx, mut cy) = rotate_destination(
            ellipse.cx,
            ellipse.cy,
            (w - 1) as f64 / 2.0,
            (h - 1) as f64 / 2.0,
            -tilt,
        );

        // Stretch the minor axis up to the major one; when downsampling is
        // disallowed and the ratio shrinks the image, grow the other axis
        // instead.
        let mut data = rotated;
        if (ratio - 1.0).abs() > 1e-3 {
            if ratio < 1.0 && self.params.disallow_downsampling {
                let new_width = (w as f64 / ratio).round().max(1.0) as usize;
                let scale = new_width as f64 / w as f64;
                data = rescale(&data, new_width, h);
                cx *= scale;
            } else {
                let new_height = (h as f64 * ratio).round().max(1.0) as usize;
                let scale = new_height as f64 / h as f64;
                data = rescale(&data, w, new_height);
                cy *= scale;
            }
        }

        if self.params.horizontal_mirror {
            flip_horizontal(&mut data);
            cx = (data.ncols() - 1) as f64 - cx;
        }
        if self.params.vertical_mirror {
            flip_vertical(&mut data);
            cy = (data.nrows() - 1) as f64 - cy;
        }

        if self.params.sharpen {
            data = unsharp_mask(&data, SHARPEN_SIGMA, SHARPEN_AMOUNT);
        }

        let corrected_circle = Ellipse::circle(cx, cy, ellipse.a);
        let black_point = off_disk_median(&data, &corrected_circle);

        let mut corrected = ImageWrapper::new(data);
        corrected.metadata.pixel_shift = image.metadata.pixel_shift;
        corrected.metadata.ellipse = Some(corrected_circle);
        corrected.metadata.black_point = Some(black_point);
        corrected.metadata.stats = Some(ImageStats { black_point });

        Ok(GeometryCorrection {
            corrected,
            corrected_circle,
            black_point,
            residual_error: fit.residual_error,
        })
    }
}

/// Where a source point lands when the image content is rotated by
/// `angle` (the inverse of the sampling transform used by `rotate`).
fn rotate_destination(x: f64, y: f64, cx: f64, cy: f64, angle: f64) -> (f64, f64) {
    let (sin, cos) = angle.sin_cos();
    let dx = x - cx;
    let dy = y - cy;
    (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos)
}

fn off_disk_median(data: &ndarray::Array2<f32>, circle: &Ellipse) -> f32 {
    let (h, w) = data.dim();
    let mut background: Vec<f32> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if !circle.contains(x as f64, y as f64) {
                background.push(data[[y, x]]);
            }
        }
    }
    if background.is_empty() {
        return 0.0;
    }
    background.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    background[background.len() / 2]
}
