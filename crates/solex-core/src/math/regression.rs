use nalgebra::{Matrix3, Vector3};

/// Degree-2 polynomial y(x) = a*x^2 + b*x + c.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Parabola {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Parabola {
    pub fn y(&self, x: f64) -> f64 {
        (self.a * x + self.b) * x + self.c
    }
}

/// Refine a minimum (or maximum) location from three equally spaced samples.
///
/// Returns the fractional offset from the center sample, clamped to
/// +/- 0.5 pixel. Degenerate (flat) neighborhoods return 0.
pub fn parabola_vertex_offset(prev: f64, center: f64, next: f64) -> f64 {
    let denom = prev - 2.0 * center + next;
    if denom.abs() > 1e-12 {
        ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
    } else {
        0.0
    }
}

/// Ordinary least-squares fit of y = a*x^2 + b*x + c over the sample set.
///
/// Returns `None` for fewer than 3 samples or a singular normal system
/// (e.g. all samples sharing the same x).
pub fn fit_parabola(xs: &[f64], ys: &[f64]) -> Option<Parabola> {
    assert_eq!(xs.len(), ys.len());
    let n = xs.len();
    if n < 3 {
        return None;
    }

    let mut sx = [0.0f64; 5];
    let mut b0 = 0.0;
    let mut b1 = 0.0;
    let mut b2 = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let x2 = x * x;
        sx[0] += 1.0;
        sx[1] += x;
        sx[2] += x2;
        sx[3] += x2 * x;
        sx[4] += x2 * x2;
        b0 += y;
        b1 += x * y;
        b2 += x2 * y;
    }

    let m = Matrix3::new(
        sx[4], sx[3], sx[2], //
        sx[3], sx[2], sx[1], //
        sx[2], sx[1], sx[0],
    );
    let rhs = Vector3::new(b2, b1, b0);
    let solution = m.lu().solve(&rhs)?;

    let fit = Parabola {
        a: solution[0],
        b: solution[1],
        c: solution[2],
    };
    if fit.a.is_finite() && fit.b.is_finite() && fit.c.is_finite() {
        Some(fit)
    } else {
        None
    }
}

/// Mean squared residual of a fit against the sample set.
pub fn residual_variance(fit: &Parabola, xs: &[f64], ys: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let sum: f64 = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - fit.y(x);
            r * r
        })
        .sum();
    sum / xs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_parabola() {
        let truth = Parabola {
            a: 0.002,
            b: -0.5,
            c: 120.0,
        };
        let xs: Vec<f64> = (0..200).map(|x| x as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| truth.y(x)).collect();
        let fit = fit_parabola(&xs, &ys).unwrap();
        assert!((fit.a - truth.a).abs() < 1e-9);
        assert!((fit.b - truth.b).abs() < 1e-7);
        assert!((fit.c - truth.c).abs() < 1e-5);
        assert!(residual_variance(&fit, &xs, &ys) < 1e-10);
    }

    #[test]
    fn vertex_offset_centered_on_symmetric_samples() {
        assert_eq!(parabola_vertex_offset(1.0, 0.0, 1.0), 0.0);
        // Minimum slightly towards the next sample.
        let offset = parabola_vertex_offset(2.0, 0.0, 1.0);
        assert!(offset > 0.0 && offset <= 0.5);
    }

    #[test]
    fn degenerate_input_returns_none() {
        assert!(fit_parabola(&[1.0, 1.0, 1.0], &[0.0, 1.0, 2.0]).is_none());
        assert!(fit_parabola(&[0.0, 1.0], &[0.0, 1.0]).is_none());
    }
}
