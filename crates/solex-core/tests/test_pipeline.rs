mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{build_ser_with_frames, write_test_ser};
use ndarray::Array2;
use solex_core::convert::create_converter;
use solex_core::detection::MagnitudeBasedSunEdgeDetector;
use solex_core::error::Result;
use solex_core::event::{Broadcaster, ImageLine, ProcessingListener, ProcessingOutcome};
use solex_core::frame::{ColorMode, ImageWrapper};
use solex_core::io::ser::SerReader;
use solex_core::params::{ProcessParams, RequestedImages};
use solex_core::pipeline::SolexVideoProcessor;
use solex_core::reconstruction::ReconstructionEngine;
use solex_core::sched::ParallelContext;
use solex_core::spectrum::SpectrumFrameAnalyzer;
use solex_core::workflow::{GeneratedImageKind, ImageEmitter, WorkflowState};

const DARK_ROW: usize = 15;

/// Brightness of a spectrogram row: dark absorption line at DARK_ROW,
/// brighter continuum everywhere else.
fn row_brightness(y: usize) -> u8 {
    if y == DARK_ROW {
        10
    } else {
        200 - 5 * (y as i64 - DARK_ROW as i64).unsigned_abs().min(16) as u8
    }
}

fn spectrogram_frames(width: usize, height: usize, count: usize) -> Vec<Vec<u8>> {
    let mut frame = Vec::with_capacity(width * height);
    for y in 0..height {
        for _ in 0..width {
            frame.push(row_brightness(y));
        }
    }
    vec![frame; count]
}

#[test]
fn detects_polynomial_and_reconstructs_uniform_planes() {
    let (width, height, count) = (32usize, 32usize, 100usize);
    let ser_data = build_ser_with_frames(
        width as u32,
        height as u32,
        &spectrogram_frames(width, height, count),
    );
    let tmpfile = write_test_ser(&ser_data);
    let mut reader = SerReader::open(tmpfile.path()).unwrap();

    let broadcaster = Broadcaster::new();
    let converter = create_converter(ColorMode::Mono);
    let detection = MagnitudeBasedSunEdgeDetector::default()
        .detect_edges(&mut reader, converter.as_ref(), &broadcaster)
        .unwrap();
    // Every frame is lit: the whole file is the scan range.
    assert_eq!(detection.edges, Some((0, count)));

    let analyzer = SpectrumFrameAnalyzer::with_default_ceiling(width, height);
    let polynomial = analyzer
        .find_distortion_polynomial(&detection.average_image, 0.2)
        .unwrap();
    assert!(polynomial.a.abs() < 1e-6);
    assert!(polynomial.b.abs() < 1e-6);
    assert!((polynomial.c - DARK_ROW as f64).abs() < 1e-6);

    let mut states = vec![
        WorkflowState::prepare(width, count, 0.0),
        WorkflowState::prepare(width, count, 3.0),
    ];
    let main_context = ParallelContext::cpu_bound().unwrap();
    let engine =
        ReconstructionEngine::new(converter.as_ref(), &main_context, &broadcaster, false);
    engine
        .reconstruct(&mut reader, 0, count, &polynomial, &mut states)
        .unwrap();

    // Shift 0 stacks the darkest row; shift +3 samples three rows below.
    let dark = row_brightness(DARK_ROW) as f32 * 256.0;
    let below = row_brightness(DARK_ROW + 3) as f32 * 256.0;
    assert!(states[0].reconstructed.iter().all(|&v| v == dark));
    assert!(states[1].reconstructed.iter().all(|&v| v == below));
    // Distinct shifts never alias buffers.
    assert_ne!(
        states[0].reconstructed.as_ptr(),
        states[1].reconstructed.as_ptr()
    );
    for state in &states {
        assert!(state
            .reconstructed
            .iter()
            .all(|&v| (0.0..=65535.0).contains(&v)));
    }
}

#[test]
fn edge_detector_finds_padded_scan_range() {
    let (width, height, count) = (8usize, 8usize, 400usize);
    let mut frames = Vec::with_capacity(count);
    for i in 0..count {
        let value: u8 = if (150..250).contains(&i) {
            let t = (i - 150) as f64 / 100.0;
            let tri = 1.0 - (2.0 * t - 1.0).abs();
            20 + (200.0 * tri) as u8
        } else {
            0
        };
        frames.push(vec![value; width * height]);
    }
    let ser_data = build_ser_with_frames(width as u32, height as u32, &frames);
    let tmpfile = write_test_ser(&ser_data);
    let mut reader = SerReader::open(tmpfile.path()).unwrap();

    let broadcaster = Broadcaster::new();
    let converter = create_converter(ColorMode::Mono);
    let detection = MagnitudeBasedSunEdgeDetector::default()
        .detect_edges(&mut reader, converter.as_ref(), &broadcaster)
        .unwrap();

    let (start, end) = detection.edges.unwrap();
    let peak = detection
        .magnitudes
        .iter()
        .cloned()
        .fold(0.0f64, f64::max);
    let threshold = 0.1 * peak;
    assert!(detection.magnitudes[start] > threshold);
    assert!(detection.magnitudes[end - 1] > threshold);
    assert!(start >= 150 && end <= 250);
    // The 40-frame pads land in the dark part of the recording.
    assert_eq!(detection.magnitudes[start - 40], 0.0);
    assert_eq!(detection.magnitudes[end + 40 - 1], 0.0);
}

/// Records every emission instead of writing files.
#[derive(Default)]
struct CollectingEmitter {
    emitted: Mutex<Vec<(GeneratedImageKind, String)>>,
}

impl ImageEmitter for CollectingEmitter {
    fn new_mono_image(
        &self,
        kind: GeneratedImageKind,
        _category: &str,
        _title: &str,
        name: &str,
        _image: &ImageWrapper,
        _transform: Option<&(dyn Fn(&mut Array2<f32>) + Sync)>,
    ) -> Result<Option<PathBuf>> {
        self.emitted.lock().unwrap().push((kind, name.to_string()));
        Ok(None)
    }

    fn new_color_image(
        &self,
        kind: GeneratedImageKind,
        _category: &str,
        _title: &str,
        name: &str,
        _width: usize,
        _height: usize,
        _rgb_supplier: &(dyn Fn() -> [Array2<f32>; 3] + Sync),
    ) -> Result<Option<PathBuf>> {
        self.emitted.lock().unwrap().push((kind, name.to_string()));
        Ok(None)
    }

    fn new_generic_file(
        &self,
        kind: GeneratedImageKind,
        _category: &str,
        _title: &str,
        name: &str,
        _path: &Path,
    ) -> Result<Option<PathBuf>> {
        self.emitted.lock().unwrap().push((kind, name.to_string()));
        Ok(None)
    }
}

#[derive(Default)]
struct CollectingListener {
    outcome: Mutex<Option<ProcessingOutcome>>,
    partial_rows: AtomicUsize,
    suggestions: AtomicUsize,
    errors: AtomicUsize,
}

impl ProcessingListener for CollectingListener {
    fn on_processing_done(&self, outcome: &ProcessingOutcome) {
        *self.outcome.lock().unwrap() = Some(outcome.clone());
    }

    fn on_partial_reconstruction(&self, _line: &ImageLine) {
        self.partial_rows.fetch_add(1, Ordering::SeqCst);
    }

    fn on_suggestion(&self, _title: &str, _message: &str) {
        self.suggestions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_notification(&self, notification: &solex_core::event::Notification) {
        if notification.alert_type == solex_core::event::AlertType::Error {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn full_pipeline_emits_requested_images_and_outcome() {
    let (width, height, count) = (32usize, 32usize, 100usize);
    let ser_data = build_ser_with_frames(
        width as u32,
        height as u32,
        &spectrogram_frames(width, height, count),
    );
    let tmpfile = write_test_ser(&ser_data);
    let outdir = tempfile::tempdir().unwrap();

    let params = ProcessParams::default().with_requested(RequestedImages {
        pixel_shifts: vec![0.0, 3.0],
        ..RequestedImages::default()
    });
    let emitter = Arc::new(CollectingEmitter::default());
    let listener = Arc::new(CollectingListener::default());

    let processor = SolexVideoProcessor::new(
        tmpfile.path().to_path_buf(),
        outdir.path().to_path_buf(),
        params,
        emitter.clone(),
    )
    .unwrap();
    processor.add_listener(listener.clone());
    processor.process().unwrap();

    let emitted = emitter.emitted.lock().unwrap();
    let names: Vec<&str> = emitted.iter().map(|(_, name)| name.as_str()).collect();
    assert!(names.contains(&"raw_0"));
    assert!(names.contains(&"raw_3"));
    assert!(names.contains(&"banding_fixed_0"));
    assert!(names.contains(&"banding_fixed_3"));
    // The internal continuum plane never emits.
    assert!(!names.iter().any(|n| n.contains("-15")));

    // One partial reconstruction event per visible (row, shift).
    assert_eq!(listener.partial_rows.load(Ordering::SeqCst), 2 * count);
    // No disk in a synthetic flat field: uncorrected path plus suggestion.
    assert!(listener.suggestions.load(Ordering::SeqCst) >= 1);

    let outcome = listener.outcome.lock().unwrap().clone().unwrap();
    let shifts: Vec<f64> = outcome.shift_images.iter().map(|(s, _)| *s).collect();
    assert_eq!(shifts, vec![-15.0, 0.0, 3.0]);
    assert!(outcome.ellipse.is_none());
    let (_, raw) = &outcome.shift_images[1];
    // Rotated left: scan lines become columns.
    assert_eq!(raw.data.dim(), (width, count));
}

#[test]
fn missing_spectral_line_stops_the_pipeline() {
    let (width, height, count) = (16usize, 16usize, 60usize);
    // Uniformly bright: column minima sit above the magnitude ceiling.
    let frames = vec![vec![150u8; width * height]; count];
    let ser_data = build_ser_with_frames(width as u32, height as u32, &frames);
    let tmpfile = write_test_ser(&ser_data);
    let outdir = tempfile::tempdir().unwrap();

    let emitter = Arc::new(CollectingEmitter::default());
    let listener = Arc::new(CollectingListener::default());
    let processor = SolexVideoProcessor::new(
        tmpfile.path().to_path_buf(),
        outdir.path().to_path_buf(),
        ProcessParams::default(),
        emitter.clone(),
    )
    .unwrap();
    processor.add_listener(listener.clone());

    assert!(processor.process().is_err());
    // No partial artifacts, and the user saw an error notification.
    assert!(emitter.emitted.lock().unwrap().is_empty());
    assert!(listener.errors.load(Ordering::SeqCst) >= 1);
    assert!(listener.outcome.lock().unwrap().is_none());
}
