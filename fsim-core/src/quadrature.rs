//! Gauss-Legendre quadrature rules.
//!
//! Provides 1D rules on [-1, 1] and their tensor products on [-1, 1]^2,
//! used for element and boundary-edge integration.

/// A 2D quadrature point in element reference coordinates.
#[derive(Debug, Clone, Copy)]
pub struct QuadPoint2 {
    /// Reference coordinates (xi, eta) in [-1, 1]^2.
    pub xi: f64,
    pub eta: f64,
    /// Integration weight.
    pub weight: f64,
}

/// 1D Gauss-Legendre points and weights on [-1, 1].
///
/// # Panics
///
/// Panics if `n` is not in 1..=4.
pub fn gauss_1d(n: usize) -> Vec<(f64, f64)> {
    match n {
        1 => vec![(0.0, 2.0)],
        2 => {
            let p = 1.0 / 3.0_f64.sqrt();
            vec![(-p, 1.0), (p, 1.0)]
        }
        3 => {
            let p = (3.0 / 5.0_f64).sqrt();
            vec![(-p, 5.0 / 9.0), (0.0, 8.0 / 9.0), (p, 5.0 / 9.0)]
        }
        4 => {
            let sqrt_6_5 = (6.0 / 5.0_f64).sqrt();
            let p1 = ((3.0 - 2.0 * sqrt_6_5) / 7.0).sqrt();
            let p2 = ((3.0 + 2.0 * sqrt_6_5) / 7.0).sqrt();
            let sqrt_30 = 30.0_f64.sqrt();
            let w1 = (18.0 + sqrt_30) / 36.0;
            let w2 = (18.0 - sqrt_30) / 36.0;
            vec![(-p2, w2), (-p1, w1), (p1, w1), (p2, w2)]
        }
        _ => panic!("gauss_1d: n must be 1, 2, 3, or 4, got {}", n),
    }
}

/// Tensor-product rule on the reference square [-1, 1]^2 with `n` points
/// per direction.
pub fn gauss_square(n: usize) -> Vec<QuadPoint2> {
    let rule = gauss_1d(n);
    let mut points = Vec::with_capacity(n * n);
    for &(eta, weta) in &rule {
        for &(xi, wxi) in &rule {
            points.push(QuadPoint2 {
                xi,
                eta,
                weight: wxi * weta,
            });
        }
    }
    points
}
