use ndarray::Array2;
use solex_core::frame::ImageWrapper;
use solex_core::geometry::{fit_disk_ellipse, GeometryCorrector};
use solex_core::params::GeometryParams;

fn disk(w: usize, h: usize, cx: f64, cy: f64, rx: f64, ry: f64) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(y, x)| {
        let d = ((x as f64 - cx) / rx).powi(2) + ((y as f64 - cy) / ry).powi(2);
        if d <= 1.0 {
            25000.0
        } else {
            300.0
        }
    })
}

#[test]
fn perfect_circle_fits_within_half_a_pixel() {
    let img = disk(256, 256, 128.0, 128.0, 100.0, 100.0);
    let fit = fit_disk_ellipse(&img).unwrap();
    assert!((fit.ellipse.cx - 128.0).abs() < 0.5);
    assert!((fit.ellipse.cy - 128.0).abs() < 0.5);
    assert!((fit.ellipse.a - 100.0).abs() < 0.5);
    assert!((fit.ellipse.b - 100.0).abs() < 0.5);
}

#[test]
fn xy_correction_leaves_a_circle_unchanged() {
    let img = ImageWrapper::new(disk(256, 256, 128.0, 128.0, 100.0, 100.0));
    let fit = fit_disk_ellipse(&img.data).unwrap();
    let params = GeometryParams::default();
    let correction = GeometryCorrector::new(&params).correct(&img, &fit).unwrap();

    let (h, w) = correction.corrected.data.dim();
    assert_eq!(w, 256);
    assert!((h as i64 - 256).unsigned_abs() <= 2);
    let circle = correction.corrected_circle;
    assert!((circle.cx - 128.0).abs() < 1.5);
    assert!((circle.cy - 128.0).abs() < 1.5);
    assert!((circle.a - 100.0).abs() < 1.0);
    assert_eq!(circle.a, circle.b);
}

#[test]
fn tilted_ellipse_is_circularized() {
    // Axis-aligned ellipse, wider than tall.
    let img = ImageWrapper::new(disk(256, 200, 128.0, 100.0, 90.0, 60.0));
    let fit = fit_disk_ellipse(&img.data).unwrap();
    assert!(fit.ellipse.axis_ratio() > 1.3);

    let params = GeometryParams::default();
    let correction = GeometryCorrector::new(&params).correct(&img, &fit).unwrap();
    let refit = fit_disk_ellipse(&correction.corrected.data).unwrap();
    assert!(
        refit.ellipse.axis_ratio() < 1.1,
        "ratio {}",
        refit.ellipse.axis_ratio()
    );
    // Background median, not the disk.
    assert!(correction.black_point < 1000.0);
}

#[test]
fn mirrors_move_an_off_center_disk() {
    let img = ImageWrapper::new(disk(128, 128, 40.0, 64.0, 25.0, 25.0));
    let fit = fit_disk_ellipse(&img.data).unwrap();
    let params = GeometryParams::default().with_mirrors(true, false);
    let correction = GeometryCorrector::new(&params).correct(&img, &fit).unwrap();
    // Horizontally mirrored: the disk lands on the right half.
    assert!(correction.corrected_circle.cx > 80.0);
    let bright = correction.corrected.data[[64, 100]];
    assert!(bright > 10000.0);
}
