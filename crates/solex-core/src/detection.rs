use ndarray::Array2;
use tracing::info;

use crate::consts::{DEFAULT_BRIGHTNESS_FLOOR, DEFAULT_EDGE_RELATIVE_THRESHOLD};
use crate::convert::ImageConverter;
use crate::error::Result;
use crate::event::{Broadcaster, ProcessingEvent};
use crate::io::ser::SerReader;

/// Output of the edge detection pass.
#[derive(Clone, Debug)]
pub struct EdgeDetectionResult {
    /// Arithmetic mean over all frames of the recording.
    pub average_image: Array2<f32>,
    /// Per-frame magnitude (sum of samples above the floor).
    pub magnitudes: Vec<f64>,
    /// `(start, end)` frame range covering the solar disk, end exclusive.
    /// `None` when no frame reaches the detection threshold.
    pub edges: Option<(usize, usize)>,
}

/// Locates the sweep start/end by watching the per-frame brightness
/// magnitude rise above a fraction of its peak.
///
/// A single sequential pass also produces the average spectrogram image
/// consumed by the spectral line analysis.
pub struct MagnitudeBasedSunEdgeDetector {
    brightness_floor: f32,
    relative_threshold: f64,
}

impl Default for MagnitudeBasedSunEdgeDetector {
    fn default() -> Self {
        Self {
            brightness_floor: DEFAULT_BRIGHTNESS_FLOOR,
            relative_threshold: DEFAULT_EDGE_RELATIVE_THRESHOLD,
        }
    }
}

impl MagnitudeBasedSunEdgeDetector {
    pub fn new(brightness_floor: f32, relative_threshold: f64) -> Self {
        Self {
            brightness_floor,
            relative_threshold,
        }
    }

    /// Consume every frame of the reader once, from the beginning.
    pub fn detect_edges(
        &self,
        reader: &mut SerReader,
        converter: &dyn ImageConverter,
        broadcaster: &Broadcaster,
    ) -> Result<EdgeDetectionResult> {
        let geometry = reader.geometry();
        let frame_count = reader.frame_count();
        let mut sum = Array2::<f64>::zeros((geometry.height, geometry.width));
        let mut magnitudes = Vec::with_capacity(frame_count);
        let mut buffer = converter.create_buffer(&geometry);

        reader.seek(0)?;
        for i in 0..frame_count {
            let bytes = reader.current_frame_bytes()?;
            converter.convert(i, bytes, &geometry, &mut buffer)?;
            reader.next_frame()?;

            let mut magnitude = 0.0f64;
            for (&v, acc) in buffer.iter().zip(sum.iter_mut()) {
                *acc += v as f64;
                if v > self.brightness_floor {
                    magnitude += v as f64;
                }
            }
            magnitudes.push(magnitude);

            if i % 64 == 0 || i + 1 == frame_count {
                broadcaster.broadcast(&ProcessingEvent::Progress {
                    fraction: (i + 1) as f64 / frame_count as f64,
                    task: "Computing average image".to_string(),
                });
            }
        }

        let average_image = sum.mapv(|v| (v / frame_count as f64) as f32);
        let edges = self.find_edges(&magnitudes);
        match edges {
            Some((start, end)) => info!(start, end, "Sun edges detected"),
            None => info!("No sun edges detected, using the whole file"),
        }

        Ok(EdgeDetectionResult {
            average_image,
            magnitudes,
            edges,
        })
    }

    fn find_edges(&self, magnitudes: &[f64]) -> Option<(usize, usize)> {
        let peak = magnitudes.iter().cloned().fold(0.0f64, f64::max);
        if peak <= 0.0 {
            return None;
        }
        let threshold = peak * self.relative_threshold;
        let start = magnitudes.iter().position(|&m| m > threshold)?;
        let last = magnitudes.iter().rposition(|&m| m > threshold)?;
        Some((start, last + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_ramp_boundaries() {
        let detector = MagnitudeBasedSunEdgeDetector::default();
        let mut magnitudes = vec![0.0f64; 400];
        for (i, m) in magnitudes.iter_mut().enumerate().take(300).skip(100) {
            let t = (i - 100) as f64 / 200.0;
            *m = 1.0 - (2.0 * t - 1.0).abs();
        }
        let (start, end) = detector.find_edges(&magnitudes).unwrap();
        let threshold = 0.1;
        assert!(magnitudes[start] > threshold);
        assert!(magnitudes[end - 1] > threshold);
        assert!(start > 100 && end < 300);
    }

    #[test]
    fn dark_file_has_no_edges() {
        let detector = MagnitudeBasedSunEdgeDetector::default();
        assert!(detector.find_edges(&[0.0; 50]).is_none());
    }
}
