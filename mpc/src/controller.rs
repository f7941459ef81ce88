use log::{debug, warn};

use nlp::{NlpSolution, NlpSolver, SqpSolver};
use prelude::*;
use vehicle_model::{Actuation, Coefficients, State};

use crate::{ControlFailure, CostBreakdown, FallbackPolicy, Layout, MpcConfig, MpcError, ProblemBuilder};

/// Predicted states and actuations over the horizon.
///
/// Only a candidate unless the cycle that produced it reports `ControlStatus::Solved`.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    pub states: Vec<State>,
    pub actuations: Vec<Actuation>,
}

impl Trajectory {
    pub fn from_decision_vector(layout: Layout, z: &[float]) -> Trajectory {
        assert_eq!(z.len(), layout.n_variables());
        Trajectory {
            states: (0..layout.horizon())
                .map(|k| State::from_array(layout.state_at(z, k)))
                .collect(),
            actuations: (0..layout.n_actuations())
                .map(|k| Actuation::from_array(layout.actuation_at(z, k)))
                .collect(),
        }
    }

    /// Predicted `(x, y)` positions, one per state.
    pub fn positions(&self) -> Vec<(float, float)> {
        self.states.iter().map(|s| (s.x, s.y)).collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ControlStatus {
    Solved,
    /// The actuation is the configured fallback.
    Degraded(ControlFailure),
}

impl ControlStatus {
    pub fn is_solved(&self) -> bool {
        *self == ControlStatus::Solved
    }
}

#[derive(Clone, Debug)]
pub struct ControlOutput {
    /// Command to apply now.
    pub actuation: Actuation,
    pub status: ControlStatus,
    pub trajectory: Option<Trajectory>,
    pub cost: Option<CostBreakdown>,
}

/// Receding-horizon controller. Each call to `solve` optimises the whole horizon and returns
/// only the first actuation.
pub struct Controller<S: NlpSolver = SqpSolver> {
    config: MpcConfig,
    builder: ProblemBuilder,
    solver: S,
    previous: Option<Actuation>,
}

impl Controller<SqpSolver> {
    pub fn new(config: MpcConfig) -> Result<Controller<SqpSolver>, MpcError> {
        let solver = SqpSolver::new(config.solver.clone());
        Controller::with_solver(config, solver)
    }
}

impl<S: NlpSolver> Controller<S> {
    pub fn with_solver(config: MpcConfig, solver: S) -> Result<Controller<S>, MpcError> {
        let builder = ProblemBuilder::new(&config)?;
        Ok(Controller {
            config,
            builder,
            solver,
            previous: None,
        })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub fn layout(&self) -> Layout {
        self.builder.layout()
    }

    pub fn solve(&mut self, state: &State, coeffs: &Coefficients) -> ControlOutput {
        let _guard = flame::start_guard("controller step");

        if let Err(failure) = self.check_input(state, coeffs) {
            return self.fall_back(failure, None);
        }

        let problem = self.builder.build(state, coeffs);
        let solution = self.solver.solve(&problem, problem.initial_guess(), problem.bounds());

        if let Some(failure) = solution.failure.clone() {
            return self.fall_back(ControlFailure::Solver(failure), Some(&solution));
        }
        let layout = self.layout();
        if solution.z.len() != layout.n_variables() {
            let failure = ControlFailure::SolutionLength {
                expected: layout.n_variables(),
                actual: solution.z.len(),
            };
            return self.fall_back(failure, None);
        }
        if !solution.z.iter().all(|v| v.is_finite()) {
            return self.fall_back(ControlFailure::NonFiniteSolution, None);
        }

        let first = Actuation::from_array(layout.actuation_at(&solution.z, 0));
        let actuation = self.config.clamp_actuation(&first);
        self.previous = Some(actuation);

        debug!(
            "solved in {} iterations: delta = {:.4}, a = {:.4}, cost = {:.4}",
            solution.iterations, actuation.delta, actuation.a, solution.objective
        );

        let (trajectory, cost) = self.diagnostics(Some(&solution));
        ControlOutput {
            actuation,
            status: ControlStatus::Solved,
            trajectory,
            cost,
        }
    }

    fn check_input(&self, state: &State, coeffs: &Coefficients) -> Result<(), ControlFailure> {
        if !state.is_finite() {
            return Err(ControlFailure::InvalidInput(format!("non-finite state {:?}", state)));
        }
        let expected = self.config.polynomial_degree + 1;
        if coeffs.len() != expected {
            return Err(ControlFailure::InvalidInput(format!(
                "expected {} polynomial coefficients, got {}",
                expected,
                coeffs.len()
            )));
        }
        Ok(())
    }

    fn fall_back(&mut self, failure: ControlFailure, candidate: Option<&NlpSolution>) -> ControlOutput {
        let actuation = match self.config.fallback {
            FallbackPolicy::Neutral => self.config.clamp_actuation(&Actuation::NEUTRAL),
            FallbackPolicy::HoldPrevious => self
                .previous
                .unwrap_or_else(|| self.config.clamp_actuation(&Actuation::NEUTRAL)),
        };
        warn!("control degraded ({}), applying {:?}", failure, actuation);

        let (trajectory, cost) = self.diagnostics(candidate);
        ControlOutput {
            actuation,
            status: ControlStatus::Degraded(failure),
            trajectory,
            cost,
        }
    }

    fn diagnostics(&self, solution: Option<&NlpSolution>) -> (Option<Trajectory>, Option<CostBreakdown>) {
        let layout = self.layout();
        match solution {
            Some(solution)
                if self.config.emit_trajectory
                    && solution.z.len() == layout.n_variables()
                    && solution.z.iter().all(|v| v.is_finite()) =>
            {
                let trajectory = Trajectory::from_decision_vector(layout, &solution.z);
                let cost = self.builder.cost().breakdown(&solution.z);
                (Some(trajectory), Some(cost))
            }
            _ => (None, None),
        }
    }
}
