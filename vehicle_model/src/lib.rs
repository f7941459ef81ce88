use thiserror::Error;

use prelude::*;

mod kinematic_bicycle;
pub use kinematic_bicycle::KinematicBicycle;

pub mod reference;
pub use reference::Coefficients;

/// Vehicle pose and speed together with its errors relative to the reference path.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct State {
    pub x: float,
    pub y: float,
    pub psi: float,
    pub v: float,
    /// Cross-track error, `y - f(x)`.
    pub cte: float,
    /// Heading error, `psi - atan(f'(x))`.
    pub epsi: float,
}

impl State {
    pub const DIM: usize = 6;

    /// Builds a state whose path errors are measured against `coeffs`.
    pub fn on_path(x: float, y: float, psi: float, v: float, coeffs: &Coefficients) -> State {
        State {
            x,
            y,
            psi,
            v,
            cte: y - coeffs.eval(x),
            epsi: psi - coeffs.heading(x),
        }
    }

    pub fn to_array(&self) -> [float; 6] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }

    pub fn from_array([x, y, psi, v, cte, epsi]: [float; 6]) -> State {
        State {
            x,
            y,
            psi,
            v,
            cte,
            epsi,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Actuation {
    /// Steering angle in radians.
    pub delta: float,
    /// Acceleration, positive for throttle and negative for braking.
    pub a: float,
}

impl Actuation {
    pub const DIM: usize = 2;

    pub const NEUTRAL: Actuation = Actuation { delta: 0.0, a: 0.0 };

    pub fn to_array(&self) -> [float; 2] {
        [self.delta, self.a]
    }

    pub fn from_array([delta, a]: [float; 2]) -> Actuation {
        Actuation { delta, a }
    }

    pub fn is_finite(&self) -> bool {
        self.delta.is_finite() && self.a.is_finite()
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ModelError {
    #[error("polynomial needs at least one coefficient")]
    NoCoefficients,
    #[error("coefficient {index} is not finite")]
    NonFiniteCoefficient { index: usize },
    #[error("distance from front axle to centre of gravity must be finite and positive, got {0}")]
    InvalidLf(float),
    #[error("fitting a degree {degree} polynomial needs at least {needed} points, got {points}")]
    TooFewPoints {
        degree: usize,
        needed: usize,
        points: usize,
    },
    #[error("waypoint coordinate lists differ in length ({0} vs {1})")]
    MismatchedWaypoints(usize, usize),
    #[error("non-finite waypoint at index {0}")]
    NonFiniteWaypoint(usize),
    #[error("least squares fit failed: {0}")]
    Fit(&'static str),
}
