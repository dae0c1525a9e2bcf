use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::Result;
use crate::frame::ImageWrapper;

use super::GeneratedImageKind;

/// Collaborator that renders and persists generated images.
///
/// The core never encodes files itself: it hands in-memory float buffers
/// to an emitter and broadcasts whatever path the emitter reports back.
pub trait ImageEmitter: Send + Sync {
    /// Emit a single-channel image. `transform` runs on a copy of the
    /// buffer before rendering.
    fn new_mono_image(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        image: &ImageWrapper,
        transform: Option<&(dyn Fn(&mut Array2<f32>) + Sync)>,
    ) -> Result<Option<PathBuf>>;

    /// Emit a color image from lazily produced R/G/B planes.
    fn new_color_image(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        width: usize,
        height: usize,
        rgb_supplier: &(dyn Fn() -> [Array2<f32>; 3] + Sync),
    ) -> Result<Option<PathBuf>>;

    /// Register an already materialized file (e.g. a technical card).
    fn new_generic_file(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        path: &Path,
    ) -> Result<Option<PathBuf>>;
}

/// Emitter for internal workflow states: swallows everything.
pub struct NoOpImageEmitter;

impl ImageEmitter for NoOpImageEmitter {
    fn new_mono_image(
        &self,
        _kind: GeneratedImageKind,
        _category: &str,
        _title: &str,
        _name: &str,
        _image: &ImageWrapper,
        _transform: Option<&(dyn Fn(&mut Array2<f32>) + Sync)>,
    ) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    fn new_color_image(
        &self,
        _kind: GeneratedImageKind,
        _category: &str,
        _title: &str,
        _name: &str,
        _width: usize,
        _height: usize,
        _rgb_supplier: &(dyn Fn() -> [Array2<f32>; 3] + Sync),
    ) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    fn new_generic_file(
        &self,
        _kind: GeneratedImageKind,
        _category: &str,
        _title: &str,
        _name: &str,
        _path: &Path,
    ) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Decorator that drops images whose kind was not requested.
pub struct DiscardNonRequiredImages<E> {
    inner: E,
    requested: BTreeSet<GeneratedImageKind>,
}

impl<E: ImageEmitter> DiscardNonRequiredImages<E> {
    pub fn new(inner: E, requested: BTreeSet<GeneratedImageKind>) -> Self {
        Self { inner, requested }
    }
}

impl<E: ImageEmitter> ImageEmitter for DiscardNonRequiredImages<E> {
    fn new_mono_image(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        image: &ImageWrapper,
        transform: Option<&(dyn Fn(&mut Array2<f32>) + Sync)>,
    ) -> Result<Option<PathBuf>> {
        if !self.requested.contains(&kind) {
            return Ok(None);
        }
        self.inner
            .new_mono_image(kind, category, title, name, image, transform)
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
        if !self.requested.contains(&kind) {
            return Ok(None);
        }
        self.inner
            .new_color_image(kind, category, title, name, width, height, rgb_supplier)
    }

    fn new_generic_file(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        path: &Path,
    ) -> Result<Option<PathBuf>> {
        if !self.requested.contains(&kind) {
            return Ok(None);
        }
        self.inner.new_generic_file(kind, category, title, name, path)
    }
}


impl<E: ImageEmitter + ?Sized> ImageEmitter for std::sync::Arc<E> {
    fn new_mono_image(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        image: &ImageWrapper,
        transform: Option<&(dyn Fn(&mut Array2<f32>) + Sync)>,
    ) -> Result<Option<PathBuf>> {
        (**self).new_mono_image(kind, category, title, name, image, transform)
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
        (**self).new_color_image(kind, category, title, name, width, height, rgb_supplier)
    }

    fn new_generic_file(
        &self,
        kind: GeneratedImageKind,
        category: &str,
        title: &str,
        name: &str,
        path: &Path,
    ) -> Result<Option<PathBuf>> {
        (**self).new_generic_file(kind, category, title, name, path)
    }
}
