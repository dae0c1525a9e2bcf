use ndarray::Array2;
use tracing::{debug, info};

use crate::consts::{
    DEFAULT_MAGNITUDE_CEILING, DETECTION_THRESHOLD_STEP, MAX_DETECTION_THRESHOLD,
};
use crate::error::{Result, SolexError};
use crate::math::regression::{fit_parabola, parabola_vertex_offset, residual_variance, Parabola};

/// Mean squared residual (px^2) above which a polynomial fit is rejected.
const FIT_RESIDUAL_TOLERANCE: f64 = 2.0;

/// Locates the absorption line in the averaged spectrogram and fits the
/// distortion polynomial y(x) = a*x^2 + b*x + c describing its vertical
/// position across columns.
pub struct SpectrumFrameAnalyzer {
    width: usize,
    height: usize,
    magnitude_ceiling: f64,
}

impl SpectrumFrameAnalyzer {
    pub fn new(width: usize, height: usize, magnitude_ceiling: f64) -> Self {
        Self {
            width,
            height,
            magnitude_ceiling,
        }
    }

    pub fn with_default_ceiling(width: usize, height: usize) -> Self {
        Self::new(width, height, DEFAULT_MAGNITUDE_CEILING)
    }

    /// Sub-pixel line center per column, `None` where no line qualifies.
    ///
    /// A pixel belongs to the line when it sits within `threshold` of the
    /// column minimum (relative to the column dynamic range) and below the
    /// magnitude ceiling. The connected run containing the darkest pixel
    /// is retained; its center is refined by parabolic interpolation of
    /// the three darkest samples.
    pub fn line_centers(&self, average: &Array2<f32>, threshold: f64) -> Vec<Option<f64>> {
        (0..self.width)
            .map(|x| self.column_center(average, x, threshold))
            .collect()
    }

    fn column_center(&self, average: &Array2<f32>, x: usize, threshold: f64) -> Option<f64> {
        let h = self.height;
        let column: Vec<f64> = (0..h).map(|y| average[[y, x]] as f64).collect();

        let (mut darkest, mut min) = (0usize, f64::MAX);
        let mut max = f64::MIN;
        for (y, &v) in column.iter().enumerate() {
            if v < min {
                min = v;
                darkest = y;
            }
            max = max.max(v);
        }
        if min >= self.magnitude_ceiling || max <= min {
            return None;
        }

        let cutoff = min + threshold * (max - min);
        let qualifies =
            |y: usize| column[y] <= cutoff && column[y] < self.magnitude_ceiling;

        // Walk the connected run around the darkest pixel.
        let mut lo = darkest;
        while lo > 0 && qualifies(lo - 1) {
            lo -= 1;
        }
        let mut hi = darkest;
        while hi + 1 < h && qualifies(hi + 1) {
            hi += 1;
        }

        let offset = if darkest > lo && darkest < hi {
            parabola_vertex_offset(
                column[darkest - 1],
                column[darkest],
                column[darkest + 1],
            )
        } else {
            0.0
        };
        Some(darkest as f64 + offset)
    }

    /// Fit the distortion polynomial, escalating the detection threshold
    /// by 0.10 after each failed attempt until it would exceed 1.0.
    pub fn find_distortion_polynomial(
        &self,
        average: &Array2<f32>,
        initial_threshold: f64,
    ) -> Result<Parabola> {
        let min_samples = (self.width / 10).max(3);
        let mut threshold = initial_threshold;

        while threshold <= MAX_DETECTION_THRESHOLD {
            let centers = self.line_centers(average, threshold);
            let mut xs = Vec::with_capacity(self.width);
            let mut ys = Vec::with_capacity(self.width);
            for (x, center) in centers.iter().enumerate() {
                if let Some(y) = center {
                    xs.push(x as f64);
                    ys.push(*y);
                }
            }

            if xs.len() >= min_samples {
                if let Some(fit) = fit_parabola(&xs, &ys) {
                    let variance = residual_variance(&fit, &xs, &ys);
                    if variance <= FIT_RESIDUAL_TOLERANCE {
                        info!(
                            a = fit.a,
                            b = fit.b,
                            c = fit.c,
                            threshold,
                            "Distortion polynomial found"
                        );
                        return Ok(fit);
                    }
                    debug!(variance, threshold, "Fit residual too high, escalating");
                }
            } else {
                debug!(
                    samples = xs.len(),
                    threshold, "Not enough line samples, escalating"
                );
            }
            threshold += DETECTION_THRESHOLD_STEP;
        }

        Err(SolexError::SpectralLineNotFound {
            max_threshold: MAX_DETECTION_THRESHOLD,
        })
    }
}
