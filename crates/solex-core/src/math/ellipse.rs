use nalgebra::{Matrix2, Matrix5, SymmetricEigen, Vector2, Vector5};

/// An ellipse in center/semi-axes/rotation form, with a >= b.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipse {
    pub cx: f64,
    pub cy: f64,
    /// Semi-major axis.
    pub a: f64,
    /// Semi-minor axis.
    pub b: f64,
    /// Rotation of the major axis, radians, in (-pi/2, pi/2].
    pub theta: f64,
}

impl Ellipse {
    pub fn circle(cx: f64, cy: f64, radius: f64) -> Self {
        Self {
            cx,
            cy,
            a: radius,
            b: radius,
            theta: 0.0,
        }
    }

    /// Ratio of semi-axes, always >= 1.
    pub fn axis_ratio(&self) -> f64 {
        self.a / self.b
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (u, v) = self.to_canonical(x, y);
        (u / self.a).powi(2) + (v / self.b).powi(2) <= 1.0
    }

    /// Radial distance from the ellipse boundary, in pixels along the
    /// normalized radius. Zero on the boundary.
    pub fn radial_residual(&self, x: f64, y: f64) -> f64 {
        let (u, v) = self.to_canonical(x, y);
        let r = ((u / self.a).powi(2) + (v / self.b).powi(2)).sqrt();
        (r - 1.0).abs() * self.b
    }

    fn to_canonical(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.cx;
        let dy = y - self.cy;
        let (sin, cos) = self.theta.sin_cos();
        (dx * cos + dy * sin, -dx * sin + dy * cos)
    }
}

/// Direct least-squares fit of an ellipse to a point cloud.
///
/// Fits the general conic x^2 + Bxy + Cy^2 + Dx + Ey + F = 0 by ordinary
/// least squares, then converts to center/axes/rotation. Returns `None`
/// when the system is singular or the conic is not an ellipse.
pub fn fit_ellipse(points: &[(f64, f64)]) -> Option<Ellipse> {
    if points.len() < 5 {
        return None;
    }

    let mut mtm = Matrix5::<f64>::zeros();
    let mut mtv = Vector5::<f64>::zeros();
    for &(x, y) in points {
        let row = Vector5::new(x * y, y * y, x, y, 1.0);
        let target = -x * x;
        mtm += row * row.transpose();
        mtv += row * target;
    }

    let solution = mtm.lu().solve(&mtv)?;
    let (bq, cq, dq, eq, fq) = (
        solution[0],
        solution[1],
        solution[2],
        solution[3],
        solution[4],
    );

    // Center from the gradient of the quadratic form.
    let grad = Matrix2::new(2.0, bq, bq, 2.0 * cq);
    let center = grad.lu().solve(&Vector2::new(-dq, -eq))?;
    let (cx, cy) = (center[0], center[1]);

    // Constant term of the conic translated to the center.
    let f0 = cx * cx + bq * cx * cy + cq * cy * cy + dq * cx + eq * cy + fq;

    let eigen = SymmetricEigen::new(Matrix2::new(1.0, bq / 2.0, bq / 2.0, cq));
    let mut axes = [(0usize, 0.0f64); 2];
    for (i, &lambda) in eigen.eigenvalues.iter().enumerate() {
        let squared = -f0 / lambda;
        if !(squared.is_finite() && squared > 0.0) {
            return None;
        }
        axes[i] = (i, squared.sqrt());
    }

    // Major axis corresponds to the smaller eigenvalue.
    let (major_idx, a) = if axes[0].1 >= axes[1].1 {
        axes[0]
    } else {
        axes[1]
    };
    let b = axes[1 - major_idx].1;
    let dir = eigen.eigenvectors.column(major_idx);
    let mut theta = dir[1].atan2(dir[0]);
    if theta > std::f64::consts::FRAC_PI_2 {
        theta -= std::f64::consts::PI;
    } else if theta <= -std::f64::consts::FRAC_PI_2 {
        theta += std::f64::consts::PI;
    }
    // A near-circle has no meaningful orientation and the eigenvectors
    // degenerate; report it as axis-aligned.
    if a - b <= 1e-2 * a {
        theta = 0.0;
    }

    Some(Ellipse { cx, cy, a, b, theta })
}
