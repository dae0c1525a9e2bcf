use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use solex_core::io::ser::SerReader;

#[derive(Args)]
pub struct InfoArgs {
    /// Input SER file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = SerReader::open(&args.file)?;
    let header = reader.header();
    let geometry = reader.geometry();

    println!("File:        {}", args.file.display());
    println!("Frames:      {}", reader.frame_count());
    println!("Dimensions:  {}x{}", geometry.width, geometry.height);
    println!("Bit depth:   {}", geometry.pixel_depth);
    println!("Color mode:  {:?}", geometry.color_mode);

    if !header.observer.is_empty() {
        println!("Observer:    {}", header.observer);
    }
    if !header.telescope.is_empty() {
        println!("Telescope:   {}", header.telescope);
    }
    if !header.instrument.is_empty() {
        println!("Instrument:  {}", header.instrument);
    }
    if let Some(fps) = reader.estimate_fps() {
        println!("Est. FPS:    {fps:.2}");
    }

    let total_mb =
        (header.frame_byte_size() * reader.frame_count()) as f64 / (1024.0 * 1024.0);
    println!("Data size:   {total_mb:.1} MB");

    Ok(())
}
