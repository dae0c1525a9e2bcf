use ndarray::Array2;

use crate::consts::MAX_PIXEL_VALUE;
use crate::math::ellipse::Ellipse;

/// Row-wise flat-field reduction of horizontal banding.
///
/// Each row's background level is measured outside the solar disk when an
/// ellipse is known (whole row otherwise) and pulled towards the moving
/// average of the neighboring rows. Runs in place, `passes` times.
pub fn fix_banding(
    data: &mut Array2<f32>,
    band_width: usize,
    passes: usize,
    ellipse: Option<&Ellipse>,
) {
    for _ in 0..passes {
        reduce_banding(data, band_width, ellipse);
    }
}

fn reduce_banding(data: &mut Array2<f32>, band_width: usize, ellipse: Option<&Ellipse>) {
    let (h, w) = data.dim();
    if h == 0 || w == 0 {
        return;
    }

    let mut row_avg = vec![0.0f64; h];
    for y in 0..h {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for x in 0..w {
            let off_disk = match ellipse {
                Some(e) => !e.contains(x as f64, y as f64),
                None => true,
            };
            if off_disk {
                sum += data[[y, x]] as f64;
                count += 1;
            }
        }
        if count == 0 {
            // Row fully inside the disk: fall back to the whole row.
            sum = (0..w).map(|x| data[[y, x]] as f64).sum();
            count = w;
        }
        row_avg[y] = sum / count as f64;
    }

    let smoothed = moving_average(&row_avg, band_width);
    for y in 0..h {
        let offset = (row_avg[y] - smoothed[y]) as f32;
        for x in 0..w {
            data[[y, x]] = (data[[y, x]] - offset).clamp(0.0, MAX_PIXEL_VALUE);
        }
    }
}

fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let half = (window / 2).max(1);
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_single_row_stripe() {
        let mut data = Array2::from_elem((21, 8), 1000.0f32);
        for x in 0..8 {
            data[[10, x]] = 1800.0;
        }
        fix_banding(&mut data, 8, 3, None);
        let residual = (data[[10, 0]] - data[[5, 0]]).abs();
        assert!(residual < 300.0, "stripe residual {residual}");
    }

    #[test]
    fn uniform_image_is_untouched() {
        let mut data = Array2::from_elem((16, 16), 420.0f32);
        let before = data.clone();
        fix_banding(&mut data, 4, 2, None);
        assert_eq!(data, before);
    }

    #[test]
    fn disk_pixels_are_excluded_from_the_estimate() {
        // Bright disk in the middle; banding offsets must derive from the
        // dark background only.
        let mut data = Array2::from_elem((40, 40), 100.0f32);
        let ellipse = Ellipse::circle(20.0, 20.0, 12.0);
        for y in 0..40 {
            for x in 0..40 {
                if ellipse.contains(x as f64, y as f64) {
                    data[[y, x]] = 30000.0;
                }
            }
        }
        let before = data.clone();
        fix_banding(&mut data, 6, 1, Some(&ellipse));
        // Background is uniform, so nothing should move.
        for y in 0..40 {
            for x in 0..40 {
                assert!((data[[y, x]] - before[[y, x]]).abs() < 1.0);
            }
        }
    }
}
