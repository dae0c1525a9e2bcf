pub mod doppler;
mod emitter;

pub use emitter::{DiscardNonRequiredImages, ImageEmitter, NoOpImageEmitter};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::frame::ImageWrapper;
use crate::geometry::corrector::GeometryCorrection;
use crate::geometry::fitting::EllipseFit;

/// Stable tags for the images the pipeline can produce.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GeneratedImageKind {
    Raw,
    GeometryCorrected,
    BandingFixed,
    Doppler,
    Continuum,
    Colorized,
    Redshift,
    Cropped,
    Reconstruction,
    Debug,
    TechnicalCard,
}

/// Results recorded by the per-shift workflow stages.
#[derive(Clone, Debug, Default)]
pub struct StageResults {
    pub ellipse_fit: Option<EllipseFit>,
    pub geometry_correction: Option<GeometryCorrection>,
}

/// Per-pixel-shift processing state.
///
/// Owns the reconstructed plane for its shift; two states never share a
/// buffer. Internal states participate in computation (edge detection,
/// continuum estimation) but never emit visible artifacts.
#[derive(Clone, Debug)]
pub struct WorkflowState {
    pixel_shift: f64,
    width: usize,
    height: usize,
    internal: bool,
    /// Reconstructed plane, one row per scanned frame.
    pub reconstructed: Array2<f32>,
    /// Rotated/flipped image, set after the orientation stage.
    pub image: Option<ImageWrapper>,
    pub results: StageResults,
}

impl WorkflowState {
    /// Allocate the state for one pixel shift. The buffer is written
    /// exactly once per row during reconstruction.
    pub fn prepare(width: usize, height: usize, pixel_shift: f64) -> Self {
        Self {
            pixel_shift,
            width,
            height,
            internal: false,
            reconstructed: Array2::zeros((height, width)),
            image: None,
            results: StageResults::default(),
        }
    }

    pub fn pixel_shift(&self) -> f64 {
        self.pixel_shift
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn set_internal(&mut self, internal: bool) {
        self.internal = internal;
    }
}
