//! Forward-mode derivatives of small fixed-size functions using dual numbers.
//!
//! Functions are written once, generic over `T: DualNum<f64>`, and evaluated with `f64` for
//! values, [`Dual64`] for first derivatives and [`HyperDual64`] for second derivatives.

pub use num_dual::{Dual64, DualNum, HyperDual64};

use prelude::*;

/// Value and gradient of `f` at `x`, one forward pass per variable.
pub fn gradient<const N: usize>(
    f: impl Fn(&[Dual64; N]) -> Dual64,
    x: &[float; N],
) -> (float, [float; N]) {
    let mut value = 0.0;
    let mut grad = [0.0; N];
    for i in 0..N {
        let mut xd = x.map(Dual64::from);
        xd[i].eps = 1.0;
        let res = f(&xd);
        value = res.re;
        grad[i] = res.eps;
    }
    if N == 0 {
        value = f(&x.map(Dual64::from)).re;
    }
    (value, grad)
}

/// Value and Hessian of `f` at `x`.
pub fn hessian<const N: usize>(
    f: impl Fn(&[HyperDual64; N]) -> HyperDual64,
    x: &[float; N],
) -> (float, Matrix<N, N>) {
    let mut value = 0.0;
    let mut hess = Matrix::<N, N>::zeros();
    for i in 0..N {
        for j in i..N {
            let mut xd = x.map(HyperDual64::from);
            xd[i].eps1 = 1.0;
            xd[j].eps2 = 1.0;
            let res = f(&xd);
            value = res.re;
            hess[(i, j)] = res.eps1eps2;
            hess[(j, i)] = res.eps1eps2;
        }
    }
    if N == 0 {
        value = f(&x.map(HyperDual64::from)).re;
    }
    (value, hess)
}

/// Value and Jacobian of the vector function `f` at `x`.
pub fn jacobian<const N: usize, const M: usize>(
    f: impl Fn(&[Dual64; N]) -> [Dual64; M],
    x: &[float; N],
) -> ([float; M], Matrix<M, N>) {
    let mut value = [0.0; M];
    let mut jac = Matrix::<M, N>::zeros();
    for i in 0..N {
        let mut xd = x.map(Dual64::from);
        xd[i].eps = 1.0;
        let res = f(&xd);
        for (r, d) in res.iter().enumerate() {
            value[r] = d.re;
            jac[(r, i)] = d.eps;
        }
    }
    if N == 0 {
        value = f(&x.map(Dual64::from)).map(|d| d.re);
    }
    (value, jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rosenbrock<T: DualNum<f64> + Copy>(x: &[T; 2]) -> T {
        let a = T::from(1.0) - x[0];
        let b = x[1] - x[0] * x[0];
        a * a + b * b * 100.0
    }

    fn polar<T: DualNum<f64> + Copy>(x: &[T; 2]) -> [T; 3] {
        [x[0] * x[1].cos(), x[0] * x[1].sin(), x[0] * x[0]]
    }

    #[test]
    fn gradient_matches_analytic() {
        let x = [0.5, -0.25];
        let (value, grad) = gradient(rosenbrock::<Dual64>, &x);
        assert_abs_diff_eq!(value, rosenbrock(&x), epsilon = 1e-12);
        let b = x[1] - x[0] * x[0];
        assert_abs_diff_eq!(grad[0], -2.0 * (1.0 - x[0]) - 400.0 * x[0] * b, epsilon = 1e-10);
        assert_abs_diff_eq!(grad[1], 200.0 * b, epsilon = 1e-10);
    }

    #[test]
    fn hessian_matches_analytic() {
        let x = [0.5, -0.25];
        let (value, hess) = hessian(rosenbrock::<HyperDual64>, &x);
        assert_abs_diff_eq!(value, rosenbrock(&x), epsilon = 1e-12);
        assert_abs_diff_eq!(hess[(0, 0)], 2.0 - 400.0 * (x[1] - 3.0 * x[0] * x[0]), epsilon = 1e-9);
        assert_abs_diff_eq!(hess[(0, 1)], -400.0 * x[0], epsilon = 1e-9);
        assert_abs_diff_eq!(hess[(1, 0)], -400.0 * x[0], epsilon = 1e-9);
        assert_abs_diff_eq!(hess[(1, 1)], 200.0, epsilon = 1e-9);
    }

    #[test]
    fn jacobian_matches_analytic() {
        let x = [2.0, 0.3];
        let (value, jac) = jacobian(polar::<Dual64>, &x);
        assert_abs_diff_eq!(value[0], 2.0 * 0.3f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(jac[(0, 0)], 0.3f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(jac[(0, 1)], -2.0 * 0.3f64.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(jac[(1, 1)], 2.0 * 0.3f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(jac[(2, 0)], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(jac[(2, 1)], 0.0, epsilon = 1e-12);
    }
}
