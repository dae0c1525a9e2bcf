use std::path::{Path, PathBuf};

use ndarray::Array2;
use solex_core::error::Result;
use solex_core::frame::ImageWrapper;
use solex_core::io::image_io::{save_mono, save_rgb};
use solex_core::workflow::{GeneratedImageKind, ImageEmitter};

/// Emitter that renders generated images as 16-bit PNG files inside the
/// output directory, one subdirectory per category.
pub struct FilesystemImageEmitter {
    output_dir: PathBuf,
}

impl FilesystemImageEmitter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn target(&self, category: &str, name: &str) -> Result<PathBuf> {
        let dir = self.output_dir.join(category);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{name}.png")))
    }
}

impl ImageEmitter for FilesystemImageEmitter {
    fn new_mono_image(
        &self,
        _kind: GeneratedImageKind,
        category: &str,
        _title: &str,
        name: &str,
        image: &ImageWrapper,
        transform: Option<&(dyn Fn(&mut Array2<f32>) + Sync)>,
    ) -> Result<Option<PathBuf>> {
        let mut data = image.data.clone();
        if let Some(transform) = transform {
            transform(&mut data);
        }
        let path = self.target(category, name)?;
        save_mono(&data, &path)?;
        Ok(Some(path))
    }

    fn new_color_image(
        &self,
        _kind: GeneratedImageKind,
        category: &str,
        _title: &str,
        name: &str,
        _width: usize,
        _height: usize,
        rgb_supplier: &(dyn Fn() -> [Array2<f32>; 3] + Sync),
    ) -> Result<Option<PathBuf>> {
        let channels = rgb_supplier();
        let path = self.target(category, name)?;
        save_rgb(&channels, &path)?;
        Ok(Some(path))
    }

    fn new_generic_file(
        &self,
        _kind: GeneratedImageKind,
        category: &str,
        _title: &str,
        name: &str,
        path: &Path,
    ) -> Result<Option<PathBuf>> {
        let destination = self.target(category, name)?;
        let destination = destination.with_extension(
            path.extension().and_then(|e| e.to_str()).unwrap_or("dat"),
        );
        std::fs::copy(path, &destination)?;
        Ok(Some(destination))
    }
}
