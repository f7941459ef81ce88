//! Reference path as a polynomial `y = f(x)` and helpers to build one from waypoints.

use nlp::diff::DualNum;
use prelude::*;

use crate::ModelError;

/// Polynomial coefficients in ascending order, `c0 + c1 x + c2 x^2 + ...`.
#[derive(Clone, Debug, PartialEq)]
pub struct Coefficients {
    coeffs: Vec<float>,
}

impl Coefficients {
    pub fn new(coeffs: Vec<float>) -> Result<Coefficients, ModelError> {
        if coeffs.is_empty() {
            return Err(ModelError::NoCoefficients);
        }
        if let Some(index) = coeffs.iter().position(|c| !c.is_finite()) {
            return Err(ModelError::NonFiniteCoefficient { index });
        }
        Ok(Coefficients { coeffs })
    }

    /// Least-squares fit of a degree `degree` polynomial through the points `(xs[i], ys[i])`.
    pub fn fit(xs: &[float], ys: &[float], degree: usize) -> Result<Coefficients, ModelError> {
        if xs.len() != ys.len() {
            return Err(ModelError::MismatchedWaypoints(xs.len(), ys.len()));
        }
        let needed = degree + 1;
        if xs.len() < needed {
            return Err(ModelError::TooFewPoints {
                degree,
                needed,
                points: xs.len(),
            });
        }
        if let Some(i) = (0..xs.len()).find(|&i| !xs[i].is_finite() || !ys[i].is_finite()) {
            return Err(ModelError::NonFiniteWaypoint(i));
        }

        let vandermonde = DMatrix::from_fn(xs.len(), needed, |r, c| xs[r].powi(c as i32));
        let b = DVector::from_column_slice(ys);
        let solution = vandermonde
            .svd(true, true)
            .solve(&b, 1e-12)
            .map_err(ModelError::Fit)?;

        Coefficients::new(solution.iter().cloned().collect())
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn as_slice(&self) -> &[float] {
        &self.coeffs
    }

    /// `f(x)`
    pub fn eval<T: DualNum<f64> + Copy>(&self, x: T) -> T {
        let mut coeffs = self.coeffs.iter().rev();
        let mut acc = T::from(*coeffs.next().unwrap_or(&0.0));
        for &c in coeffs {
            acc = acc * x + c;
        }
        acc
    }

    /// `f'(x)`
    pub fn slope<T: DualNum<f64> + Copy>(&self, x: T) -> T {
        let mut acc = T::from(0.0);
        for (i, &c) in self.coeffs.iter().enumerate().skip(1).rev() {
            acc = acc * x + c * i as float;
        }
        acc
    }

    /// Heading of the path tangent, `atan(f'(x))`.
    pub fn heading<T: DualNum<f64> + Copy>(&self, x: T) -> T {
        self.slope(x).atan()
    }
}

/// Expresses global waypoints relative to a vehicle at `(x, y)` facing `psi`, with the vehicle
/// looking down the positive x axis.
pub fn to_vehicle_frame(
    points: &[(float, float)],
    x: float,
    y: float,
    psi: float,
) -> Vec<(float, float)> {
    let (sin_psi, cos_psi) = psi.sin_cos();
    points
        .iter()
        .map(|&(px, py)| {
            let (dx, dy) = (px - x, py - y);
            (dx * cos_psi + dy * sin_psi, -dx * sin_psi + dy * cos_psi)
        })
        .collect()
}
