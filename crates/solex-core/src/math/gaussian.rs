use ndarray::Array2;

/// 2D Gaussian evaluated at (x, y).
pub fn gaussian(x: f64, y: f64, sigma: f64) -> f64 {
    (1.0 / (2.0 * std::f64::consts::PI * sigma * sigma))
        * (-(x * x + y * y) / (2.0 * sigma * sigma)).exp()
}

/// Square NxN Gaussian kernel centered on the grid origin.
pub fn gaussian_kernel(n: usize, sigma: f64) -> Array2<f32> {
    let mut kernel = Array2::<f32>::zeros((n, n));
    for y in 0..n {
        for x in 0..n {
            kernel[[y, x]] = gaussian(x as f64, y as f64, sigma) as f32;
        }
    }
    kernel
}

/// Normalized 1D Gaussian kernel for separable convolution.
///
/// Radius is 3 sigma, so the kernel captures > 99% of the distribution.
pub fn gaussian_kernel_1d(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    let size = 2 * radius + 1;
    let mut kernel = vec![0.0f32; size];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        *k = (-x * x / s2).exp();
        sum += *k;
    }

    for v in &mut kernel {
        *v /= sum;
    }

    kernel
}
