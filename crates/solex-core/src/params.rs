use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{CONTINUUM_SHIFT, DEFAULT_DETECTION_THRESHOLD};
use crate::error::Result;
use crate::workflow::GeneratedImageKind;

/// A spectral line commonly observed with the Sol'Ex spectrograph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectralRay {
    pub label: String,
    /// Wavelength in nanometers; 0 when unknown or autodetected.
    pub wavelength: f64,
}

impl SpectralRay {
    fn predefined(label: &str, wavelength: f64) -> Self {
        Self {
            label: label.to_string(),
            wavelength,
        }
    }

    pub fn autodetect() -> Self {
        Self::predefined("Autodetect", 0.0)
    }

    pub fn h_alpha() -> Self {
        Self::predefined("H-alpha", 656.281)
    }

    pub fn h_beta() -> Self {
        Self::predefined("H-beta", 486.134)
    }

    pub fn calcium_k() -> Self {
        Self::predefined("Calcium (K)", 393.366)
    }

    pub fn calcium_h() -> Self {
        Self::predefined("Calcium (H)", 396.847)
    }

    pub fn helium_d3() -> Self {
        Self::predefined("Helium (D3)", 587.562)
    }

    pub fn sodium_d1() -> Self {
        Self::predefined("Sodium (D1)", 589.592)
    }

    pub fn sodium_d2() -> Self {
        Self::predefined("Sodium (D2)", 588.995)
    }
}

impl Default for SpectralRay {
    fn default() -> Self {
        Self::h_alpha()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectrumParams {
    pub ray: SpectralRay,
    /// Relative threshold for absorption line detection, in (0, 1].
    pub detection_threshold: f64,
    /// Main pixel shift requested by the user.
    pub pixel_shift: f64,
    /// Shift applied on both sides of the line for doppler composites.
    pub doppler_shift: f64,
    /// Swap the red and blue channels of the doppler composite.
    pub switch_red_blue: bool,
}

impl Default for SpectrumParams {
    fn default() -> Self {
        Self {
            ray: SpectralRay::default(),
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            pixel_shift: 0.0,
            doppler_shift: 3.0,
            switch_red_blue: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObservationDetails {
    pub observer: Option<String>,
    pub email: Option<String>,
    /// Decimal degrees, positive north/east.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// ISO-8601 observation date.
    pub date: Option<String>,
    pub instrument: Option<String>,
    pub telescope: Option<String>,
    pub focal_length_mm: Option<u32>,
    pub aperture_mm: Option<u32>,
    pub camera: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GeometryParams {
    /// Forced tilt angle in radians; `None` means use the fitted ellipse.
    pub tilt: Option<f64>,
    /// Forced X/Y stretch ratio; `None` means derive from the ellipse.
    pub xy_ratio: Option<f64>,
    pub horizontal_mirror: bool,
    pub vertical_mirror: bool,
    pub sharpen: bool,
    pub disallow_downsampling: bool,
    pub autocorrect_angle_p: bool,
}

impl GeometryParams {
    pub fn with_tilt(self, tilt: Option<f64>) -> Self {
        Self { tilt, ..self }
    }

    pub fn with_xy_ratio(self, xy_ratio: Option<f64>) -> Self {
        Self { xy_ratio, ..self }
    }

    pub fn with_mirrors(self, horizontal: bool, vertical: bool) -> Self {
        Self {
            horizontal_mirror: horizontal,
            vertical_mirror: vertical,
            ..self
        }
    }

    pub fn with_sharpen(self, sharpen: bool) -> Self {
        Self { sharpen, ..self }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BandingCorrectionParams {
    /// Moving average window, in rows.
    pub band_width: usize,
    pub passes: usize,
}

impl Default for BandingCorrectionParams {
    fn default() -> Self {
        Self {
            band_width: 24,
            passes: 3,
        }
    }
}

/// Which images to produce, and at which pixel shifts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestedImages {
    pub images: BTreeSet<GeneratedImageKind>,
    pub pixel_shifts: Vec<f64>,
    /// Shifts whose planes participate in computation but are never emitted.
    pub internal_pixel_shifts: Vec<f64>,
}

impl RequestedImages {
    pub fn is_enabled(&self, kind: GeneratedImageKind) -> bool {
        self.images.contains(&kind)
    }
}

impl Default for RequestedImages {
    fn default() -> Self {
        Self {
            images: [
                GeneratedImageKind::Raw,
                GeneratedImageKind::GeometryCorrected,
                GeneratedImageKind::BandingFixed,
            ]
            .into_iter()
            .collect(),
            pixel_shifts: vec![0.0],
            internal_pixel_shifts: vec![-CONTINUUM_SHIFT],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtraParams {
    /// Save the effective parameters next to the generated images.
    pub autosave: bool,
    pub file_name_pattern: String,
    pub generate_debug_images: bool,
    pub generate_fits: bool,
}

impl Default for ExtraParams {
    fn default() -> Self {
        Self {
            autosave: false,
            file_name_pattern: "%BASENAME%_%KIND%_%INDEX%".to_string(),
            generate_debug_images: false,
            generate_fits: false,
        }
    }
}

/// Full parameter set of a processing run. State evolves by copy through
/// the `with_*` functions, never by mutation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProcessParams {
    pub spectrum: SpectrumParams,
    pub observation: ObservationDetails,
    pub geometry: GeometryParams,
    pub banding: BandingCorrectionParams,
    pub requested: RequestedImages,
    pub extra: ExtraParams,
}

impl ProcessParams {
    pub fn with_spectrum(self, spectrum: SpectrumParams) -> Self {
        Self { spectrum, ..self }
    }

    pub fn with_observation(self, observation: ObservationDetails) -> Self {
        Self {
            observation,
            ..self
        }
    }

    pub fn with_geometry(self, geometry: GeometryParams) -> Self {
        Self { geometry, ..self }
    }

    pub fn with_banding(self, banding: BandingCorrectionParams) -> Self {
        Self { banding, ..self }
    }

    pub fn with_requested(self, requested: RequestedImages) -> Self {
        Self { requested, ..self }
    }

    pub fn with_extra(self, extra: ExtraParams) -> Self {
        Self { extra, ..self }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::SolexError::Pipeline(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| crate::error::SolexError::Pipeline(e.to_string()))
    }
}
