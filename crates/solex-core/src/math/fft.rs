use num_complex::Complex;
use rustfft::FftPlanner;

/// Forward FFT of a real-valued signal.
pub fn fft(signal: &[f32]) -> Vec<Complex<f64>> {
    let mut data: Vec<Complex<f64>> = signal
        .iter()
        .map(|&v| Complex::new(v as f64, 0.0))
        .collect();
    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(data.len()).process(&mut data);
    data
}

/// Inverse FFT, normalized by 1/N so that `inverse_fft(fft(x)) == x`.
pub fn inverse_fft(spectrum: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut data = spectrum.to_vec();
    let mut planner = FftPlanner::new();
    planner.plan_fft_inverse(data.len()).process(&mut data);
    let n = data.len() as f64;
    for v in &mut data {
        *v /= n;
    }
    data
}
