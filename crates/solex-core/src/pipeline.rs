use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use ndarray::Array2;
use tracing::{error, info};

use crate::banding::fix_banding;
use crate::consts::{CONTINUUM_SHIFT, EDGE_PADDING_FRAMES};
use crate::convert::{create_converter, ImageConverter};
use crate::detection::{EdgeDetectionResult, MagnitudeBasedSunEdgeDetector};
use crate::error::{Result, SolexError};
use crate::event::{
    Broadcaster, Notification, ProcessingEvent, ProcessingListener, ProcessingOutcome,
};
use crate::frame::{Geometry, ImageStats, ImageWrapper};
use crate::geometry::{fit_disk_ellipse, EllipseFit, GeometryCorrector};
use crate::image_ops::rotate_left;
use crate::io::ser::{SerHeader, SerReader};
use crate::math::ellipse::Ellipse;
use crate::math::regression::Parabola;
use crate::params::ProcessParams;
use crate::reconstruction::ReconstructionEngine;
use crate::sched::ParallelContext;
use crate::spectrum::SpectrumFrameAnalyzer;
use crate::stretching::range_expansion;
use crate::workflow::doppler::DopplerSupport;
use crate::workflow::{GeneratedImageKind, ImageEmitter, NoOpImageEmitter, WorkflowState};

static NO_OP_EMITTER: NoOpImageEmitter = NoOpImageEmitter;

/// Margin added around the disk when producing the cropped image.
const CROP_MARGIN: f64 = 0.1;

/// Drives a full processing run over one SER recording.
///
/// Owns the broadcaster and both scheduling contexts; the image emitter is
/// the host-provided collaborator that renders and persists outputs.
pub struct SolexVideoProcessor {
    ser_file: PathBuf,
    output_directory: PathBuf,
    params: ProcessParams,
    emitter: Arc<dyn ImageEmitter>,
    broadcaster: Arc<Broadcaster>,
    main_context: ParallelContext,
    io_context: ParallelContext,
}

impl SolexVideoProcessor {
    pub fn new(
        ser_file: PathBuf,
        output_directory: PathBuf,
        params: ProcessParams,
        emitter: Arc<dyn ImageEmitter>,
    ) -> Result<Self> {
        Ok(Self {
            ser_file,
            output_directory,
            params,
            emitter,
            broadcaster: Arc::new(Broadcaster::new()),
            main_context: ParallelContext::cpu_bound()?,
            io_context: ParallelContext::io_bound()?,
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn ProcessingListener>) -> u64 {
        self.broadcaster.add_listener(listener)
    }

    pub fn remove_listener(&self, id: u64) {
        self.broadcaster.remove_listener(id)
    }

    /// Run the whole pipeline: edge detection, spectral line analysis,
    /// reconstruction, geometry correction, banding fix and emission.
    pub fn process(&self) -> Result<()> {
        self.install_error_handlers();

        if self.params.extra.autosave {
            let config_file = self.output_directory.join("config.json");
            self.params.save_to(&config_file)?;
        }
        self.broadcaster
            .broadcast(&ProcessingEvent::ProcessingStart {
                timestamp: SystemTime::now(),
                params: Box::new(self.params.clone()),
            });

        // First sequential pass: metadata, average image, sun edges.
        let scan = self.io_context.blocking(|_| self.scan_video());
        let (header, fps, detection) = match scan {
            Ok(scan) => scan,
            Err(e) => {
                self.broadcast_error(&e);
                return Err(e);
            }
        };
        if let Some(fps) = fps {
            info!(fps, "Estimated capture rate");
        }

        let frame_count = header.frame_count as usize;
        let (start, end) = match detection.edges {
            Some((start, end)) => (
                start.saturating_sub(EDGE_PADDING_FRAMES),
                (end + EDGE_PADDING_FRAMES).min(frame_count),
            ),
            None => (0, frame_count),
        };

        match self.generate_images(&header, start, end, &detection) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.broadcast_error(&e);
                Err(e)
            }
        }
    }

    fn install_error_handlers(&self) {
        for context in [&self.main_context, &self.io_context] {
            let broadcaster = Arc::clone(&self.broadcaster);
            context.set_error_handler(Arc::new(move |e| {
                error!(error = %e, "Task failed");
                broadcaster.broadcast(&ProcessingEvent::Notification(Notification::error(
                    "Unexpected error",
                    "Error during processing",
                    e.to_string(),
                )));
            }));
        }
    }

    /// Sequential read of the whole file: broadcasts the video metadata
    /// and produces the average image and magnitudes.
    fn scan_video(&self) -> Result<(SerHeader, Option<f64>, EdgeDetectionResult)> {
        let mut reader = SerReader::open(&self.ser_file)?;
        let header = reader.header().clone();
        self.broadcaster
            .broadcast(&ProcessingEvent::VideoMetadata(header.clone()));
        let geometry = reader.geometry();
        info!(frames = reader.frame_count(), "SER file opened");
        info!(
            mode = ?geometry.color_mode,
            depth = geometry.pixel_depth,
            width = geometry.width,
            height = geometry.height,
            "Computing average image for limb detection"
        );

        let converter = create_converter(geometry.color_mode);
        let detector = MagnitudeBasedSunEdgeDetector::default();
        let detection = detector.detect_edges(&mut reader, converter.as_ref(), &self.broadcaster)?;
        let fps = reader.estimate_fps();
        Ok((header, fps, detection))
    }

    fn generate_images(
        &self,
        header: &SerHeader,
        start: usize,
        end: usize,
        detection: &EdgeDetectionResult,
    ) -> Result<()> {
        let geometry = header.geometry();
        let width = geometry.width;
        let height = geometry.height;
        let new_height = end - start;
        if new_height == 0 {
            return Err(SolexError::EmptySequence);
        }

        self.broadcaster
            .broadcast(&ProcessingEvent::OutputImageDimensionsDetermined {
                label: "raw".to_string(),
                width,
                height: new_height,
            });

        let mut states = self.create_workflow_states(width, new_height);

        let analyzer = SpectrumFrameAnalyzer::with_default_ceiling(width, height);
        let polynomial = match analyzer.find_distortion_polynomial(
            &detection.average_image,
            self.params.spectrum.detection_threshold,
        ) {
            Ok(polynomial) => polynomial,
            Err(e) => {
                // No partial artifacts: stop before any plane is written.
                error!("Unable to find the spectral line");
                return Err(e);
            }
        };
        self.maybe_emit_debug_average(&detection.average_image)?;

        self.reconstruct_planes(start, end, &geometry, &polynomial, &mut states)?;
        self.orient_planes(&mut states);

        let fit = self.perform_ellipse_fitting(&states);
        if fit.is_none() {
            self.broadcaster.broadcast(&ProcessingEvent::Suggestion {
                title: "Ellipse fit failed".to_string(),
                message: "The disk boundary could not be regressed; images are \
                          emitted without geometry correction. Consider forcing \
                          a tilt and X/Y ratio."
                    .to_string(),
            });
        }

        self.run_state_workflows(&mut states, fit.as_ref());

        if self.params.requested.is_enabled(GeneratedImageKind::Doppler) {
            let doppler = DopplerSupport::new(&self.params, &states);
            if let Err(e) = doppler.produce_doppler_image(&EmittingContext::new(self)) {
                self.broadcast_error(&e);
            }
        }

        self.broadcast_done(&states);
        Ok(())
    }

    fn create_workflow_states(&self, width: usize, new_height: usize) -> Vec<WorkflowState> {
        let requested = &self.params.requested;
        let mut states: Vec<WorkflowState> = requested
            .pixel_shifts
            .iter()
            .map(|&shift| {
                let mut state = WorkflowState::prepare(width, new_height, shift);
                if requested.internal_pixel_shifts.contains(&shift) {
                    state.set_internal(true);
                }
                state
            })
            .collect();

        // Always keep a continuum plane around; it stays internal unless
        // the continuum image was explicitly requested.
        if !states.iter().any(|s| s.pixel_shift() <= -CONTINUUM_SHIFT) {
            let mut continuum = WorkflowState::prepare(width, new_height, -CONTINUUM_SHIFT);
            continuum
                .set_internal(!requested.is_enabled(GeneratedImageKind::Continuum));
            states.push(continuum);
        }
        states
    }

    fn maybe_emit_debug_average(&self, average: &Array2<f32>) -> Result<()> {
        if !self.params.extra.generate_debug_images {
            return Ok(());
        }
        let image = ImageWrapper::new(average.clone());
        EmittingContext::new(self).emit_mono(
            GeneratedImageKind::Debug,
            "debug",
            "Average",
            "average",
            &image,
        )
    }

    fn reconstruct_planes(
        &self,
        start: usize,
        end: usize,
        geometry: &Geometry,
        polynomial: &Parabola,
        states: &mut [WorkflowState],
    ) -> Result<()> {
        let converter = create_converter(geometry.color_mode);
        let annotate = self.params.extra.generate_debug_images
            && self
                .params
                .requested
                .is_enabled(GeneratedImageKind::Reconstruction);
        let engine = ReconstructionEngine::new(
            converter.as_ref(),
            &self.main_context,
            &self.broadcaster,
            annotate,
        );
        self.io_context.blocking(|_| {
            let mut reader = SerReader::open(&self.ser_file)?;
            engine.reconstruct(&mut reader, start, end, polynomial, states)
        })
    }

    /// Rotate every plane left so the scan direction becomes vertical.
    fn orient_planes(&self, states: &mut [WorkflowState]) {
        self.main_context.blocking(|scope| {
            for state in states.iter_mut() {
                scope.spawn(move || {
                    let shift = state.pixel_shift();
                    let rotated = rotate_left(&state.reconstructed);
                    state.image = Some(ImageWrapper::new(rotated).with_pixel_shift(shift));
                    Ok(())
                });
            }
        });
    }

    /// First successful disk regression across the states, lowest shift
    /// first; shared by every downstream correction.
    fn perform_ellipse_fitting(&self, states: &[WorkflowState]) -> Option<EllipseFit> {
        let mut ordered: Vec<&WorkflowState> = states.iter().collect();
        ordered.sort_by(|a, b| a.pixel_shift().total_cmp(&b.pixel_shift()));
        for state in ordered {
            let Some(image) = &state.image else { continue };
            match fit_disk_ellipse(&image.data) {
                Ok(fit) => return Some(fit),
                Err(e) => {
                    info!(shift = state.pixel_shift(), error = %e, "Disk fit attempt failed");
                }
            }
        }
        error!("Unable to perform ellipse regression");
        None
    }

    fn run_state_workflows(&self, states: &mut [WorkflowState], fit: Option<&EllipseFit>) {
        self.main_context.blocking(|scope| {
            for state in states.iter_mut() {
                let fit = fit.cloned();
                scope.spawn(move || self.process_state(state, fit));
            }
        });
    }

    /// Per-shift workflow: geometry correction, banding fix, emission.
    fn process_state(&self, state: &mut WorkflowState, fit: Option<EllipseFit>) -> Result<()> {
        let emitting = EmittingContext::new(self).for_state(state.is_internal());
        let shift = state.pixel_shift();
        let continuum = self.params.requested.is_enabled(GeneratedImageKind::Continuum)
            && shift <= -CONTINUUM_SHIFT;
        let raw_kind = if continuum {
            GeneratedImageKind::Continuum
        } else {
            GeneratedImageKind::Raw
        };

        let image = state
            .image
            .clone()
            .ok_or_else(|| SolexError::Pipeline("missing oriented image".to_string()))?;
        emitting.emit_mono(raw_kind, "raw", "Raw", &suffixed("raw", shift), &image)?;

        state.results.ellipse_fit = fit.clone();
        let (mut banded, ellipse) = match &fit {
            Some(fit) => {
                let corrector = GeometryCorrector::new(&self.params.geometry);
                let correction = corrector.correct(&image, fit)?;
                emitting.emit_mono(
                    GeneratedImageKind::GeometryCorrected,
                    "processed",
                    "Disk",
                    &suffixed("disk", shift),
                    &correction.corrected,
                )?;
                let banded = correction.corrected.clone();
                let circle = correction.corrected_circle;
                state.results.geometry_correction = Some(correction);
                (banded, Some(circle))
            }
            None => (image, None),
        };

        fix_banding(
            &mut banded.data,
            self.params.banding.band_width,
            self.params.banding.passes,
            ellipse.as_ref(),
        );
        emitting.emit_mono(
            GeneratedImageKind::BandingFixed,
            "processed",
            "Banding fixed",
            &suffixed("banding_fixed", shift),
            &banded,
        )?;

        if let Some(circle) = ellipse {
            if self.params.requested.is_enabled(GeneratedImageKind::Cropped) {
                let cropped = crop_to_disk(&banded.data, &circle);
                emitting.emit_mono(
                    GeneratedImageKind::Cropped,
                    "processed",
                    "Cropped",
                    &suffixed("cropped", shift),
                    &ImageWrapper::new(cropped).with_pixel_shift(shift),
                )?;
            }
        }
        Ok(())
    }

    fn broadcast_done(&self, states: &[WorkflowState]) {
        let mut shift_images: Vec<(f64, ImageWrapper)> = states
            .iter()
            .map(|state| {
                let image = match &state.results.geometry_correction {
                    Some(correction) => correction.corrected.clone(),
                    None => state
                        .image
                        .clone()
                        .unwrap_or_else(|| ImageWrapper::new(state.reconstructed.clone())),
                };
                (state.pixel_shift(), image)
            })
            .collect();
        shift_images.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (ellipse, stats): (Option<Ellipse>, Option<ImageStats>) = states
            .iter()
            .find_map(|s| s.results.geometry_correction.as_ref())
            .map(|correction| {
                (
                    Some(correction.corrected_circle),
                    Some(ImageStats {
                        black_point: correction.black_point,
                    }),
                )
            })
            .unwrap_or((None, None));

        self.broadcaster
            .broadcast(&ProcessingEvent::ProcessingDone(ProcessingOutcome {
                timestamp: SystemTime::now(),
                shift_images,
                ellipse,
                stats,
            }));
    }

    fn broadcast_error(&self, e: &SolexError) {
        self.broadcaster
            .broadcast(&ProcessingEvent::Notification(Notification::error(
                "Unexpected error",
                "Error during processing",
                e.to_string(),
            )));
    }
}

/// Square crop centered on the disk, with a margin around the limb.
fn crop_to_disk(data: &Array2<f32>, circle: &Ellipse) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = circle.a * (1.0 + CROP_MARGIN);
    let side = (2.0 * radius).round() as usize;
    let side = side.min(w).min(h).max(1);
    let x0 = ((circle.cx - side as f64 / 2.0).round().max(0.0) as usize).min(w - side);
    let y0 = ((circle.cy - side as f64 / 2.0).round().max(0.0) as usize).min(h - side);
    data.slice(ndarray::s![y0..y0 + side, x0..x0 + side])
        .to_owned()
}

fn suffixed(name: &str, shift: f64) -> String {
    format!("{name}_{shift}")
}

/// Couples the host emitter with event broadcasting, so every generated
/// image produces the matching `ImageGenerated`/`FileGenerated` events.
/// Kinds the user did not request are dropped; internal workflow states
/// get a silent context: no files, no events.
struct EmittingContext<'a> {
    emitter: &'a dyn ImageEmitter,
    broadcaster: &'a Broadcaster,
    requested: &'a std::collections::BTreeSet<GeneratedImageKind>,
    silent: bool,
}

impl<'a> EmittingContext<'a> {
    fn new(processor: &'a SolexVideoProcessor) -> Self {
        Self {
            emitter: processor.emitter.as_ref(),
            broadcaster: &processor.broadcaster,
            requested: &processor.params.requested.images,
            silent: false,
        }
    }

    fn for_state(self, internal: bool) -> Self {
        if internal {
            Self {
                emitter: &NO_OP_EMITTER,
                silent: true,
                ..self
            }
        } else {
            self
        }
    }

    fn discards(&self, kind: GeneratedImageKind) -> bool {
        self.silent || !self.requested.contains(&kind)
    }

    fn emit_mono(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        image: &ImageWrapper,
    ) -> Result<()> {
        if self.discards(kind) {
            return Ok(());
        }
        let path =
            self.emitter
                .new_mono_image(kind, category, title, name, image, Some(&range_expansion))?;
        self.broadcaster.broadcast(&ProcessingEvent::ImageGenerated {
            kind,
            title: title.to_string(),
            path: path.clone(),
            image: image.clone(),
        });
        if let Some(path) = path {
            self.broadcaster.broadcast(&ProcessingEvent::FileGenerated {
                kind,
                title: title.to_string(),
                path,
            });
        }
        Ok(())
    }
}

impl ImageEmitter for EmittingContext<'_> {
    fn new_mono_image(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        image: &ImageWrapper,
        transform: Option<&(dyn Fn(&mut Array2<f32>) + Sync)>,
    ) -> Result<Option<PathBuf>> {
        if self.discards(kind) {
            return Ok(None);
        }
        let path = self
            .emitter
            .new_mono_image(kind, category, title, name, image, transform)?;
        self.broadcaster.broadcast(&ProcessingEvent::ImageGenerated {
            kind,
            title: title.to_string(),
            path: path.clone(),
            image: image.clone(),
        });
        Ok(path)
    }

    fn new_color_image(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        width: usize,
        height: usize,
        rgb_supplier: &(dyn Fn() -> [Array2<f32>; 3] + Sync),
    ) -> Result<Option<PathBuf>> {
        if self.discards(kind) {
            return Ok(None);
        }
        let path = self
            .emitter
            .new_color_image(kind, category, title, name, width, height, rgb_supplier)?;
        if let Some(path) = path.clone() {
            self.broadcaster.broadcast(&ProcessingEvent::FileGenerated {
                kind,
                title: title.to_string(),
                path,
            });
        }
        Ok(path)
    }

    fn new_generic_file(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        path: &Path,
    ) -> Result<Option<PathBuf>> {
        if self.discards(kind) {
            return Ok(None);
        }
        let reported = self
            .emitter
            .new_generic_file(kind, category, title, name, path)?;
        if let Some(reported) = reported.clone() {
            self.broadcaster.broadcast(&ProcessingEvent::FileGenerated {
                kind,
                title: title.to_string(),
                path: reported,
            });
        }
        Ok(reported)
    }
}
