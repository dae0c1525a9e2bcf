use ndarray::Array2;
use tracing::warn;

use crate::error::Result;
use crate::params::ProcessParams;
use crate::stretching::range_expansion_rgb;

use super::{GeneratedImageKind, ImageEmitter, WorkflowState};

/// Builds the red/blue doppler composite from the two planes shifted on
/// either side of the spectral line.
pub struct DopplerSupport<'a> {
    params: &'a ProcessParams,
    states: &'a [WorkflowState],
}

impl<'a> DopplerSupport<'a> {
    pub fn new(params: &'a ProcessParams, states: &'a [WorkflowState]) -> Self {
        Self { params, states }
    }

    /// Emit the doppler image when both wings are available.
    pub fn produce_doppler_image(&self, emitter: &dyn ImageEmitter) -> Result<()> {
        let shift = self.params.spectrum.doppler_shift;
        let Some(red_wing) = self.plane_at(-shift) else {
            warn!(shift = -shift, "Doppler wing missing, skipping composite");
            return Ok(());
        };
        let Some(blue_wing) = self.plane_at(shift) else {
            warn!(shift, "Doppler wing missing, skipping composite");
            return Ok(());
        };
        if red_wing.dim() != blue_wing.dim() {
            warn!("Doppler wings have different geometry, skipping composite");
            return Ok(());
        }

        let (red, blue) = if self.params.spectrum.switch_red_blue {
            (blue_wing, red_wing)
        } else {
            (red_wing, blue_wing)
        };
        let (h, w) = red.dim();

        emitter.new_color_image(
            GeneratedImageKind::Doppler,
            "processed",
            "Doppler",
            "doppler",
            w,
            h,
            &|| {
                let green = (red + blue) / 2.0;
                let mut channels = [red.to_owned(), green, blue.to_owned()];
                range_expansion_rgb(&mut channels);
                channels
            },
        )?;
        Ok(())
    }

    /// Best available plane for a pixel shift: geometry corrected when the
    /// stage ran, the oriented raw image otherwise.
    fn plane_at(&self, shift: f64) -> Option<&Array2<f32>> {
        let state = self
            .states
            .iter()
            .find(|s| (s.pixel_shift() - shift).abs() < 1e-9)?;
        if let Some(correction) = &state.results.geometry_correction {
            return Some(&correction.corrected.data);
        }
        state.image.as_ref().map(|image| &image.data)
    }
}
