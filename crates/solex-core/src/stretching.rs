use ndarray::Array2;

use crate::consts::MAX_PIXEL_VALUE;

/// Expand the sample range so the brightest pixel reaches 65535.
///
/// No-op on all-black images.
pub fn range_expansion(data: &mut Array2<f32>) {
    let max = data.iter().cloned().fold(f32::MIN, f32::max);
    if max <= 0.0 {
        return;
    }
    let scale = MAX_PIXEL_VALUE / max;
    data.mapv_inplace(|v| v * scale);
}

/// Range expansion over three channels, preserving their relative scale.
pub fn range_expansion_rgb(channels: &mut [Array2<f32>; 3]) {
    let max = channels
        .iter()
        .flat_map(|c| c.iter().cloned())
        .fold(f32::MIN, f32::max);
    if max <= 0.0 {
        return;
    }
    let scale = MAX_PIXEL_VALUE / max;
    for channel in channels.iter_mut() {
        channel.mapv_inplace(|v| v * scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretches_max_to_full_range() {
        let mut data = Array2::from_shape_vec((1, 4), vec![0.0, 100.0, 200.0, 400.0]).unwrap();
        range_expansion(&mut data);
        assert_eq!(data[[0, 3]], 65535.0);
        assert!((data[[0, 1]] - 65535.0 / 4.0).abs() < 1e-2);
    }

    #[test]
    fn black_image_unchanged() {
        let mut data = Array2::<f32>::zeros((4, 4));
        range_expansion(&mut data);
        assert!(data.iter().all(|&v| v == 0.0));
    }
}
