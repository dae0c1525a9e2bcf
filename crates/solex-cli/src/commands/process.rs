use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use solex_core::event::{ImageLine, ProcessingListener};
use solex_core::params::{
    BandingCorrectionParams, GeometryParams, ProcessParams, RequestedImages, SpectrumParams,
};
use solex_core::pipeline::SolexVideoProcessor;
use solex_core::workflow::GeneratedImageKind;

use crate::emitter::FilesystemImageEmitter;

#[derive(Args)]
pub struct ProcessArgs {
    /// Input SER file
    pub file: PathBuf,

    /// Process params file (JSON), overridden by the other flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma-separated pixel shifts to reconstruct
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub shifts: String,

    /// Produce the doppler composite (uses +/- this shift)
    #[arg(long)]
    pub doppler: Option<f64>,

    /// Spectral line detection threshold
    #[arg(long, default_value = "0.2")]
    pub threshold: f64,

    /// Force a tilt angle in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub tilt: Option<f64>,

    /// Force an X/Y stretch ratio
    #[arg(long)]
    pub ratio: Option<f64>,

    /// Mirror the output horizontally
    #[arg(long)]
    pub hflip: bool,

    /// Mirror the output vertically
    #[arg(long)]
    pub vflip: bool,

    /// Apply unsharp masking after geometry correction
    #[arg(long)]
    pub sharpen: bool,

    /// Banding correction window, in rows
    #[arg(long, default_value = "24")]
    pub band_width: usize,

    /// Banding correction passes
    #[arg(long, default_value = "3")]
    pub band_passes: usize,

    /// Also generate a square crop centered on the disk
    #[arg(long)]
    pub crop: bool,

    /// Generate debug images (average spectrum frame)
    #[arg(long)]
    pub debug: bool,

    /// Save the effective parameters next to the outputs
    #[arg(long)]
    pub autosave: bool,

    /// Output directory
    #[arg(short, long, default_value = "solex-output")]
    pub output: PathBuf,
}

pub fn run(args: &ProcessArgs) -> Result<()> {
    let params = build_params(args)?;

    println!("Sol'Ex pipeline");
    println!("  Input:   {}", args.file.display());
    println!("  Output:  {}", args.output.display());
    println!("  Shifts:  {:?}", params.requested.pixel_shifts);
    if let Some(doppler) = args.doppler {
        println!("  Doppler: +/-{doppler}");
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;

    let emitter = Arc::new(FilesystemImageEmitter::new(args.output.clone()));
    let processor = SolexVideoProcessor::new(
        args.file.clone(),
        args.output.clone(),
        params,
        emitter,
    )?;

    let progress = Arc::new(ProgressListener::new());
    processor.add_listener(progress.clone());
    processor.process()?;
    progress.finish();

    println!("Done, images written to {}", args.output.display());
    Ok(())
}

fn build_params(args: &ProcessArgs) -> Result<ProcessParams> {
    let base = match &args.config {
        Some(path) => ProcessParams::read_from(path)
            .with_context(|| format!("Invalid process params {}", path.display()))?,
        None => ProcessParams::default(),
    };

    let shifts: Vec<f64> = args
        .shifts
        .split(',')
        .map(|s| s.trim().parse::<f64>().context("Invalid pixel shift"))
        .collect::<Result<_>>()?;

    let mut images = RequestedImages {
        pixel_shifts: shifts,
        ..base.requested.clone()
    };
    if args.doppler.is_some() {
        images.images.insert(GeneratedImageKind::Doppler);
    }
    if args.crop {
        images.images.insert(GeneratedImageKind::Cropped);
    }

    let mut spectrum = SpectrumParams {
        detection_threshold: args.threshold,
        ..base.spectrum.clone()
    };
    if let Some(doppler) = args.doppler {
        spectrum.doppler_shift = doppler;
    }

    let geometry = GeometryParams {
        tilt: args.tilt.map(f64::to_radians),
        xy_ratio: args.ratio,
        horizontal_mirror: args.hflip,
        vertical_mirror: args.vflip,
        sharpen: args.sharpen,
        ..base.geometry.clone()
    };

    let banding = BandingCorrectionParams {
        band_width: args.band_width,
        passes: args.band_passes,
    };

    let mut extra = base.extra.clone();
    extra.generate_debug_images = args.debug;
    extra.autosave = args.autosave;

    Ok(base
        .with_spectrum(spectrum)
        .with_geometry(geometry)
        .with_banding(banding)
        .with_requested(images)
        .with_extra(extra))
}

/// Bridges pipeline progress events onto an indicatif bar.
struct ProgressListener {
    bar: ProgressBar,
}

impl ProgressListener {
    fn new() -> Self {
        let bar = ProgressBar::new(1000);
        bar.set_style(
            ProgressStyle::with_template("{msg:24} [{bar:40.cyan/blue}] {percent}%")
                .expect("valid template")
                .progress_chars("##-"),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProcessingListener for ProgressListener {
    fn on_progress(&self, fraction: f64, task: &str) {
        self.bar.set_message(task.to_string());
        self.bar.set_position((fraction * 1000.0) as u64);
    }

    fn on_partial_reconstruction(&self, line: &ImageLine) {
        if line.total_rows > 0 {
            self.bar.set_message("Reconstructing");
            self.bar
                .set_position((line.row as f64 / line.total_rows as f64 * 1000.0) as u64);
        }
    }
}
