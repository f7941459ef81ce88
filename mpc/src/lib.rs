//! Nonlinear model predictive controller for following a polynomial reference path.
//!
//! Each control cycle builds an NLP over the whole horizon from the measured state, solves it
//! and applies the first actuation.

mod config;
pub use config::{CostWeights, FallbackPolicy, MpcConfig};

mod constraints;
pub use constraints::ConstraintSet;

mod controller;
pub use controller::{ControlOutput, ControlStatus, Controller, Trajectory};

mod cost;
pub use cost::{CostBreakdown, CostFunction};

mod error;
pub use error::{ControlFailure, MpcError};

mod layout;
pub use layout::Layout;

mod problem;
pub use problem::{MpcProblem, ProblemBuilder};
