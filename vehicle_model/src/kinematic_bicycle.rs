// Kinematic bicycle model discretised with a single forward Euler step, extended with the
// cross-track and heading errors relative to a polynomial reference path.

use nlp::diff::{self, Dual64, DualNum};
use prelude::*;

use crate::{Actuation, Coefficients, ModelError, State};

/// Largest sub-step used by `predict`.
const PREDICT_STEP: float = 0.01;

#[derive(Clone, Debug)]
pub struct KinematicBicycle {
    inv_lf: float,
    heading_correction: bool,
}

impl KinematicBicycle {
    /// `lf` is the distance from the front axle to the centre of gravity. With
    /// `heading_correction` the heading error follows the change in path heading as the vehicle
    /// advances along the reference.
    pub fn new(lf: float, heading_correction: bool) -> Result<KinematicBicycle, ModelError> {
        if !(lf.is_finite() && lf > 0.0) {
            return Err(ModelError::InvalidLf(lf));
        }
        Ok(KinematicBicycle {
            inv_lf: 1.0 / lf,
            heading_correction,
        })
    }

    pub fn heading_correction(&self) -> bool {
        self.heading_correction
    }

    /// Advances `s = [x, y, psi, v, cte, epsi]` by `dt` under `u = [delta, a]`.
    pub fn step<T: DualNum<f64> + Copy>(
        &self,
        s: &[T; 6],
        u: &[T; 2],
        dt: float,
        coeffs: &Coefficients,
    ) -> [T; 6] {
        let [x, y, psi, v, cte, epsi] = *s;
        let [delta, a] = *u;

        let yaw_rate = v * delta * self.inv_lf;
        let x_next = x + v * psi.cos() * dt;

        let mut epsi_next = epsi + yaw_rate * dt;
        if self.heading_correction {
            epsi_next -= coeffs.heading(x_next) - coeffs.heading(x);
        }

        [
            x_next,
            y + v * psi.sin() * dt,
            psi + yaw_rate * dt,
            v + a * dt,
            cte + v * epsi.sin() * dt,
            epsi_next,
        ]
    }

    pub fn step_state(
        &self,
        state: &State,
        actuation: &Actuation,
        dt: float,
        coeffs: &Coefficients,
    ) -> State {
        State::from_array(self.step(&state.to_array(), &actuation.to_array(), dt, coeffs))
    }

    /// Holds `actuation` for `horizon` seconds starting from `state`, integrating in short
    /// sub-steps. The path errors of the result are measured afresh against `coeffs`.
    pub fn predict(
        &self,
        state: &State,
        actuation: &Actuation,
        horizon: float,
        coeffs: &Coefficients,
    ) -> State {
        if !(horizon > 0.0) {
            return *state;
        }
        let steps = (horizon / PREDICT_STEP).ceil() as usize;
        let dt = horizon / steps as float;

        let mut s = *state;
        for _ in 0..steps {
            s = self.step_state(&s, actuation, dt, coeffs);
        }
        State::on_path(s.x, s.y, s.psi, s.v, coeffs)
    }

    /// Next state and its Jacobian with respect to `[x, y, psi, v, cte, epsi, delta, a]`.
    pub fn linearise(
        &self,
        s: &[float; 6],
        u: &[float; 2],
        dt: float,
        coeffs: &Coefficients,
    ) -> ([float; 6], Matrix<6, 8>) {
        let _guard = flame::start_guard("model linearise");
        let w = [s[0], s[1], s[2], s[3], s[4], s[5], u[0], u[1]];
        diff::jacobian(
            |w: &[Dual64; 8]| {
                let s = [w[0], w[1], w[2], w[3], w[4], w[5]];
                self.step(&s, &[w[6], w[7]], dt, coeffs)
            },
            &w,
        )
    }

    /// True everywhere the Jacobian returned by `linearise` could be non-zero.
    pub fn linearise_sparsity(&self) -> nalgebra::SMatrix<bool, 6, 8> {
        let c = self.heading_correction;

        #[rustfmt::skip]
        let mask = nalgebra::SMatrix::<bool, 6, 8>::from_row_slice(&[
            // x     y      psi    v      cte    epsi   delta  a
            true,  false, true,  true,  false, false, false, false,
            false, true,  true,  true,  false, false, false, false,
            false, false, true,  true,  false, false, true,  false,
            false, false, false, true,  false, false, false, true,
            false, false, false, true,  true,  true,  false, false,
            c,     false, c,     true,  false, true,  true,  false,
        ]);
        mask
    }
}
