pub mod corrector;
pub mod fitting;

pub use corrector::{GeometryCorrection, GeometryCorrector};
pub use fitting::{fit_disk_ellipse, EllipseFit};
