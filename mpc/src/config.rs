use serde::Deserialize;

use nlp::SqpSettings;
use prelude::*;
use vehicle_model::Actuation;

use crate::MpcError;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MpcConfig {
    /// Number of predicted states, N.
    pub horizon: usize,
    /// Seconds between predicted states.
    pub dt: float,
    pub ref_v: float,
    /// Distance between the front axle and the centre of gravity.
    pub lf: float,
    pub max_steering_deg: float,
    pub min_acceleration: float,
    pub max_acceleration: float,
    pub polynomial_degree: usize,
    pub path_heading_correction: bool,
    pub fallback: FallbackPolicy,
    pub emit_trajectory: bool,
    pub weights: CostWeights,
    pub solver: SqpSettings,
}

impl Default for MpcConfig {
    fn default() -> MpcConfig {
        MpcConfig {
            horizon: 10,
            dt: 0.1,
            ref_v: 10.0,
            lf: 2.67,
            max_steering_deg: 25.0,
            min_acceleration: -1.0,
            max_acceleration: 1.0,
            polynomial_degree: 3,
            path_heading_correction: false,
            fallback: FallbackPolicy::Neutral,
            emit_trajectory: true,
            weights: CostWeights::default(),
            solver: SqpSettings::default(),
        }
    }
}

impl MpcConfig {
    pub fn validate(&self) -> Result<(), MpcError> {
        if self.horizon < 2 {
            return Err(MpcError::HorizonTooShort(self.horizon));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(MpcError::InvalidTimestep(self.dt));
        }
        if !self.ref_v.is_finite() {
            return Err(MpcError::InvalidReferenceSpeed(self.ref_v));
        }
        if !(self.max_steering_deg.is_finite() && self.max_steering_deg >= 0.0) {
            return Err(MpcError::InvalidBounds("steering"));
        }
        if !(self.min_acceleration.is_finite()
            && self.max_acceleration.is_finite()
            && self.min_acceleration <= self.max_acceleration)
        {
            return Err(MpcError::InvalidBounds("acceleration"));
        }
        self.weights.validate()?;

        let time_limit = self.solver.time_limit;
        if !(time_limit.is_finite() && time_limit > 0.0) {
            return Err(MpcError::InvalidTimeLimit(time_limit));
        }
        Ok(())
    }

    pub fn max_steering(&self) -> float {
        deg_to_rad(self.max_steering_deg)
    }

    /// Lower and upper actuation limits.
    pub fn actuation_bounds(&self) -> (Actuation, Actuation) {
        let lower = Actuation {
            delta: -self.max_steering(),
            a: self.min_acceleration,
        };
        let upper = Actuation {
            delta: self.max_steering(),
            a: self.max_acceleration,
        };
        (lower, upper)
    }

    pub fn clamp_actuation(&self, actuation: &Actuation) -> Actuation {
        let (lower, upper) = self.actuation_bounds();
        Actuation {
            delta: clamp(actuation.delta, lower.delta, upper.delta),
            a: clamp(actuation.a, lower.a, upper.a),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CostWeights {
    pub cte: float,
    pub epsi: float,
    pub v: float,
    pub delta: float,
    pub a: float,
    pub delta_rate: float,
    pub a_rate: float,
}

impl Default for CostWeights {
    fn default() -> CostWeights {
        CostWeights {
            cte: 1.0,
            epsi: 1.0,
            v: 10.0,
            delta: 1.0,
            a: 10.0,
            delta_rate: 10.0,
            a_rate: 1.0,
        }
    }
}

impl CostWeights {
    fn validate(&self) -> Result<(), MpcError> {
        let weights = [
            ("cte", self.cte),
            ("epsi", self.epsi),
            ("v", self.v),
            ("delta", self.delta),
            ("a", self.a),
            ("delta_rate", self.delta_rate),
            ("a_rate", self.a_rate),
        ];
        for &(name, value) in &weights {
            if !(value.is_finite() && value >= 0.0) {
                return Err(MpcError::InvalidWeight { name, value });
            }
        }
        Ok(())
    }
}

/// Actuation returned when a cycle cannot be solved.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Zero steering and acceleration.
    #[default]
    Neutral,
    /// The last successfully solved actuation, or neutral if there is none.
    HoldPrevious,
}
