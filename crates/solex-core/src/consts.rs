/// Upper bound of the float sample range produced by the converters.
pub const MAX_PIXEL_VALUE: f32 = 65535.0;

/// Pixel shift used to sample the off-line continuum background.
pub const CONTINUUM_SHIFT: f64 = 15.0;

/// Frames added on each side of the detected sun edges.
pub const EDGE_PADDING_FRAMES: usize = 40;

/// Samples below this value do not contribute to a frame's magnitude.
pub const DEFAULT_BRIGHTNESS_FLOOR: f32 = 5000.0;

/// Fraction of the peak magnitude a frame must reach to count as lit.
pub const DEFAULT_EDGE_RELATIVE_THRESHOLD: f64 = 0.1;

/// Column magnitude ceiling above which no absorption line is searched.
pub const DEFAULT_MAGNITUDE_CEILING: f64 = 5000.0;

/// Initial relative threshold for spectral line detection.
pub const DEFAULT_DETECTION_THRESHOLD: f64 = 0.2;

/// Escalation step applied to the detection threshold when the fit fails.
pub const DETECTION_THRESHOLD_STEP: f64 = 0.10;

/// Detection threshold is never escalated beyond this value.
pub const MAX_DETECTION_THRESHOLD: f64 = 1.0;

/// ITU-R BT.601 luminance weights used when collapsing RGB frames.
pub const LUMINANCE_R: f32 = 0.299;
pub const LUMINANCE_G: f32 = 0.587;
pub const LUMINANCE_B: f32 = 0.114;

/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;
