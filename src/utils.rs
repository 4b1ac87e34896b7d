/// Numerical utilities shared by the library and its gradient-check tests.

use ndarray::Array2;

/// Centered finite-difference gradient of a scalar-valued function.
///
/// Perturbs each entry of `x` by ±eps and returns (f(x+eps) - f(x-eps)) / 2eps
/// per entry. Used to verify the analytic backward passes.
pub fn numeric_gradient<F>(mut f: F, x: &Array2<f64>, eps: f64) -> Array2<f64>
where
    F: FnMut(&Array2<f64>) -> f64,
{
    let mut grad = Array2::zeros(x.raw_dim());
    let mut probe = x.clone();

    for i in 0..x.nrows() {
        for j in 0..x.ncols() {
            let original = probe[[i, j]];

            probe[[i, j]] = original + eps;
            let f_plus = f(&probe);
            probe[[i, j]] = original - eps;
            let f_minus = f(&probe);
            probe[[i, j]] = original;

            grad[[i, j]] = (f_plus - f_minus) / (2.0 * eps);
        }
    }

    grad
}

/// Relative error between two gradients, as used when comparing analytic
/// and numeric results: max over entries of |a - b| / max(1, |a| + |b|).
pub fn relative_error(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    assert_eq!(a.shape(), b.shape(), "Relative error requires matching shapes");

    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y).abs() / (x.abs() + y.abs()).max(1.0))
        .fold(0.0, f64::max)
}
