use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::frame::{ImageStats, ImageWrapper};
use crate::io::ser::SerHeader;
use crate::math::ellipse::Ellipse;
use crate::params::ProcessParams;
use crate::workflow::GeneratedImageKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertType {
    Error,
    Warning,
    Information,
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub alert_type: AlertType,
    pub title: String,
    pub header: String,
    pub message: String,
}

impl Notification {
    pub fn error(title: impl Into<String>, header: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            alert_type: AlertType::Error,
            title: title.into(),
            header: header.into(),
            message: message.into(),
        }
    }
}

/// One reconstructed output row, for live preview consumers.
#[derive(Clone, Debug)]
pub struct ImageLine {
    pub pixel_shift: f64,
    pub row: usize,
    pub total_rows: usize,
    pub line: Vec<f64>,
    /// Whether the consumer should display detection annotations.
    pub annotated: bool,
}

/// Outcome payload of a completed run.
#[derive(Clone, Debug)]
pub struct ProcessingOutcome {
    pub timestamp: SystemTime,
    /// Final image per pixel shift, sorted by shift.
    pub shift_images: Vec<(f64, ImageWrapper)>,
    pub ellipse: Option<Ellipse>,
    pub stats: Option<ImageStats>,
}

/// Every event the pipeline can broadcast, with its typed payload.
#[derive(Clone, Debug)]
pub enum ProcessingEvent {
    ProcessingStart {
        timestamp: SystemTime,
        params: Box<ProcessParams>,
    },
    OutputImageDimensionsDetermined {
        label: String,
        width: usize,
        height: usize,
    },
    PartialReconstruction(ImageLine),
    ImageGenerated {
        kind: GeneratedImageKind,
        title: String,
        path: Option<PathBuf>,
        image: ImageWrapper,
    },
    FileGenerated {
        kind: GeneratedImageKind,
        title: String,
        path: PathBuf,
    },
    Notification(Notification),
    Suggestion {
        title: String,
        message: String,
    },
    Progress {
        /// Fraction of the task done, in [0, 1].
        fraction: f64,
        task: String,
    },
    VideoMetadata(SerHeader),
    ProcessingDone(ProcessingOutcome),
    ScriptExecutionResult {
        labels: Vec<String>,
    },
}

/// Listener with one method per event variant. All methods default to
/// no-ops; implementors override what they care about and must not block
/// the publishing thread.
#[allow(unused_variables)]
pub trait ProcessingListener: Send + Sync {
    fn on_processing_start(&self, timestamp: SystemTime, params: &ProcessParams) {}
    fn on_output_dimensions_determined(&self, label: &str, width: usize, height: usize) {}
    fn on_partial_reconstruction(&self, line: &ImageLine) {}
    fn on_image_generated(
        &self,
        kind: GeneratedImageKind,
        title: &str,
        path: Option<&PathBuf>,
        image: &ImageWrapper,
    ) {
    }
    fn on_file_generated(&self, kind: GeneratedImageKind, title: &str, path: &PathBuf) {}
    fn on_notification(&self, notification: &Notification) {}
    fn on_suggestion(&self, title: &str, message: &str) {}
    fn on_progress(&self, fraction: f64, task: &str) {}
    fn on_video_metadata(&self, header: &SerHeader) {}
    fn on_processing_done(&self, outcome: &ProcessingOutcome) {}
    fn on_script_execution_result(&self, labels: &[String]) {}
}

/// Synchronous fan-out of processing events to registered listeners.
#[derive(Default)]
pub struct Broadcaster {
    listeners: RwLock<Vec<(u64, Arc<dyn ProcessingListener>)>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ProcessingListener>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().unwrap().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: u64) {
        self.listeners.write().unwrap().retain(|(lid, _)| *lid != id);
    }

    /// Dispatch an event to every listener, on the publishing thread.
    pub fn broadcast(&self, event: &ProcessingEvent) {
        let listeners = self.listeners.read().unwrap();
        for (_, listener) in listeners.iter() {
            match event {
                ProcessingEvent::ProcessingStart { timestamp, params } => {
                    listener.on_processing_start(*timestamp, params)
                }
                ProcessingEvent::OutputImageDimensionsDetermined {
                    label,
                    width,
                    height,
                } => listener.on_output_dimensions_determined(label, *width, *height),
                ProcessingEvent::PartialReconstruction(line) => {
                    listener.on_partial_reconstruction(line)
                }
                ProcessingEvent::ImageGenerated {
                    kind,
                    title,
                    path,
                    image,
                } => listener.on_image_generated(*kind, title, path.as_ref(), image),
                ProcessingEvent::FileGenerated { kind, title, path } => {
                    listener.on_file_generated(*kind, title, path)
                }
                ProcessingEvent::Notification(notification) => {
                    listener.on_notification(notification)
                }
                ProcessingEvent::Suggestion { title, message } => {
                    listener.on_suggestion(title, message)
                }
                ProcessingEvent::Progress { fraction, task } => {
                    listener.on_progress(*fraction, task)
                }
                ProcessingEvent::VideoMetadata(header) => listener.on_video_metadata(header),
                ProcessingEvent::ProcessingDone(outcome) => listener.on_processing_done(outcome),
                ProcessingEvent::ScriptExecutionResult { labels } => {
                    listener.on_script_execution_result(labels)
                }
            }
        }
    }
}
