//! Nonlinear programs of the form
//!
//! ```text
//! minimise    f(z)
//! subject to  g_l <= g(z) <= g_u
//!             z_l <= z    <= z_u
//! ```
//!
//! Problems describe themselves through [`NlpProblem`] and are solved by any [`NlpSolver`].

use std::time::Duration;
use thiserror::Error;

use prelude::*;

pub mod diff;
mod sqp;

pub use sqp::{QpSettings, SqpSettings, SqpSolver};

/// Evaluator called repeatedly by a solver at trial points of its choosing.
///
/// Derivatives are expected to be exact (see [`diff`]). The objective Hessian is requested once
/// per solve and treated as constant, which is exact for quadratic objectives.
pub trait NlpProblem {
    fn n_variables(&self) -> usize;

    fn n_constraints(&self) -> usize;

    fn objective(&self, z: &[float]) -> float;

    fn objective_gradient(&self, z: &[float], grad: &mut [float]);

    /// Full symmetric Hessian of the objective.
    fn objective_hessian(&self) -> sparse::Builder;

    fn constraints(&self, z: &[float], g: &mut [float]);

    /// Constraint Jacobian with every entry that may become non-zero either set to its constant
    /// value or covered by a tracked block.
    fn jacobian_structure(&self) -> sparse::Builder;

    /// Writes the Jacobian at `z` into the tracked blocks of a matrix built from
    /// `jacobian_structure`, possibly with further rows stacked below it.
    fn jacobian(&self, z: &[float], jac: &mut sparse::CscMatrix);
}

pub trait NlpSolver {
    fn solve<P: NlpProblem>(&mut self, problem: &P, initial: &[float], bounds: &Bounds)
        -> NlpSolution;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
    pub variable_lower: Vec<float>,
    pub variable_upper: Vec<float>,
    pub constraint_lower: Vec<float>,
    pub constraint_upper: Vec<float>,
}

impl Bounds {
    pub fn n_variables(&self) -> usize {
        self.variable_lower.len()
    }

    pub fn n_constraints(&self) -> usize {
        self.constraint_lower.len()
    }

    /// Sum of the amounts by which `g` lies outside the constraint bounds.
    pub fn violation_l1(&self, g: &[float]) -> float {
        self.violations(g).sum()
    }

    /// Largest amount by which `g` lies outside the constraint bounds.
    pub fn violation_max(&self, g: &[float]) -> float {
        self.violations(g).fold(0.0, max)
    }

    fn violations<'a>(&'a self, g: &'a [float]) -> impl Iterator<Item = float> + 'a {
        g.iter()
            .zip(&self.constraint_lower)
            .zip(&self.constraint_upper)
            .map(|((&g, &l), &u)| max(0.0, max(g - u, l - g)))
    }

    fn assert_dims(&self, n: usize, m: usize) {
        assert_eq!(self.variable_lower.len(), n);
        assert_eq!(self.variable_upper.len(), n);
        assert_eq!(self.constraint_lower.len(), m);
        assert_eq!(self.constraint_upper.len(), m);
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SolveFailure {
    #[error("iteration limit of {0} reached")]
    MaxIterations(u32),
    #[error("time limit of {0:?} reached")]
    TimeLimit(Duration),
    #[error("QP subproblem is infeasible")]
    Infeasible,
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("QP subproblem failed: {0}")]
    Qp(&'static str),
    #[error("QP setup failed: {0}")]
    Setup(String),
}

#[derive(Clone, Debug)]
pub struct NlpSolution {
    /// Final iterate. Only a candidate unless `failure` is `None`.
    pub z: Vec<float>,
    pub objective: float,
    pub constraint_violation: float,
    pub iterations: u32,
    pub failure: Option<SolveFailure>,
}

impl NlpSolution {
    pub fn is_converged(&self) -> bool {
        self.failure.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds {
            variable_lower: vec![NEG_INFINITY],
            variable_upper: vec![INFINITY],
            constraint_lower: vec![0.0, -1.0],
            constraint_upper: vec![0.0, 1.0],
        }
    }

    #[test]
    fn violation_counts_only_excess() {
        let b = bounds();
        assert_eq!(b.violation_l1(&[0.0, 0.5]), 0.0);
        assert_eq!(b.violation_l1(&[-0.25, 1.5]), 0.75);
        assert_eq!(b.violation_max(&[-0.25, 1.5]), 0.5);
        assert_eq!((b.n_variables(), b.n_constraints()), (1, 2));
    }

    #[test]
    fn failures_describe_themselves() {
        assert_eq!(
            SolveFailure::MaxIterations(0).to_string(),
            "iteration limit of 0 reached"
        );
        assert_eq!(
            SolveFailure::NonFinite("objective").to_string(),
            "non-finite value in objective"
        );
    }
}
