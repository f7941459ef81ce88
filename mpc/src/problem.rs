use nlp::{Bounds, NlpProblem};
use prelude::*;
use vehicle_model::{Coefficients, KinematicBicycle, State};

use crate::{ConstraintSet, CostFunction, Layout, MpcConfig, MpcError};

/// Turns a measured state and reference path into an NLP over the decision vector.
///
/// Everything that does not depend on the measurement, including the Jacobian sparsity and the
/// cost terms, is built once here and shared by every problem.
#[derive(Clone, Debug)]
pub struct ProblemBuilder {
    layout: Layout,
    cost: CostFunction,
    constraints: ConstraintSet,
    bounds: Bounds,
}

impl ProblemBuilder {
    pub fn new(config: &MpcConfig) -> Result<ProblemBuilder, MpcError> {
        config.validate()?;
        let _guard = flame::start_guard("mpc problem setup");

        let layout = Layout::new(config.horizon);
        let model = KinematicBicycle::new(config.lf, config.path_heading_correction)?;
        let cost = CostFunction::new(layout, &config.weights, config.ref_v);
        let constraints =
            ConstraintSet::new(layout, model, config.dt, config.actuation_bounds());

        let (variable_lower, variable_upper) = constraints.variable_bounds();
        let (constraint_lower, constraint_upper) = constraints.residual_bounds();

        Ok(ProblemBuilder {
            layout,
            cost,
            constraints,
            bounds: Bounds {
                variable_lower,
                variable_upper,
                constraint_lower,
                constraint_upper,
            },
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn cost(&self) -> &CostFunction {
        &self.cost
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn build<'a>(&'a self, state: &State, coeffs: &'a Coefficients) -> MpcProblem<'a> {
        let _guard = flame::start_guard("mpc problem build");
        MpcProblem {
            builder: self,
            measured: *state,
            coeffs,
            initial_guess: self.initial_guess(state, coeffs),
        }
    }

    /// States rolled out from the measurement with zero actuation.
    fn initial_guess(&self, state: &State, coeffs: &Coefficients) -> Vec<float> {
        let layout = &self.layout;
        let model = self.constraints.model();
        let mut z = vec![0.0; layout.n_variables()];

        let mut s = state.to_array();
        layout.set_state(&mut z, 0, &s);
        for k in 1..layout.horizon() {
            s = model.step(&s, &[0.0, 0.0], self.constraints.dt(), coeffs);
            layout.set_state(&mut z, k, &s);
        }
        z
    }
}

/// One cycle's NLP. Lives only as long as the solve.
pub struct MpcProblem<'a> {
    builder: &'a ProblemBuilder,
    measured: State,
    coeffs: &'a Coefficients,
    initial_guess: Vec<float>,
}

impl<'a> MpcProblem<'a> {
    pub fn initial_guess(&self) -> &[float] {
        &self.initial_guess
    }

    pub fn bounds(&self) -> &Bounds {
        &self.builder.bounds
    }

    pub fn measured(&self) -> &State {
        &self.measured
    }
}

impl<'a> NlpProblem for MpcProblem<'a> {
    fn n_variables(&self) -> usize {
        self.builder.layout.n_variables()
    }

    fn n_constraints(&self) -> usize {
        self.builder.layout.n_constraints()
    }

    fn objective(&self, z: &[float]) -> float {
        self.builder.cost.evaluate(z)
    }

    fn objective_gradient(&self, z: &[float], grad: &mut [float]) {
        self.builder.cost.gradient(z, grad)
    }

    fn objective_hessian(&self) -> sparse::Builder {
        self.builder.cost.hessian()
    }

    fn constraints(&self, z: &[float], g: &mut [float]) {
        self.builder
            .constraints
            .residuals(z, &self.measured, self.coeffs, g)
    }

    fn jacobian_structure(&self) -> sparse::Builder {
        self.builder.constraints.jacobian_structure()
    }

    fn jacobian(&self, z: &[float], jac: &mut sparse::CscMatrix) {
        self.builder.constraints.jacobian(z, self.coeffs, jac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn straight() -> Coefficients {
        Coefficients::new(vec![0.0, 0.0, 0.0, 0.0]).unwrap()
    }

    #[test]
    fn initial_guess_is_feasible() {
        let builder = ProblemBuilder::new(&MpcConfig::default()).unwrap();
        let coeffs = Coefficients::new(vec![1.0, 0.2, -0.01, 0.0005]).unwrap();
        let state = State::on_path(0.0, 0.0, 0.1, 8.0, &coeffs);
        let problem = builder.build(&state, &coeffs);

        let mut g = vec![1.0; problem.n_constraints()];
        problem.constraints(problem.initial_guess(), &mut g);
        assert!(g.iter().all(|r| r.abs() < 1e-12));

        let layout = builder.layout();
        let z = problem.initial_guess();
        assert_eq!(z.len(), layout.n_variables());
        assert!(z[layout.delta_start()..].iter().all(|&u| u == 0.0));
        assert_eq!(layout.state_at(z, 0), state.to_array());
    }

    #[test]
    fn default_heading_error_ignores_path_curvature() {
        let curved = Coefficients::new(vec![0.0, 0.0, 0.01, 0.0]).unwrap();
        let state = State {
            v: 10.0,
            ..State::default()
        };
        let residual = |config: &MpcConfig| {
            let builder = ProblemBuilder::new(config).unwrap();
            let layout = builder.layout();
            let problem = builder.build(&state, &curved);
            let mut z = problem.initial_guess().to_vec();
            layout.set_actuation(&mut z, 0, &[0.1, 0.0]);
            layout.set_state(&mut z, 1, &[0.0; 6]);
            let mut g = vec![0.0; problem.n_constraints()];
            problem.constraints(&z, &mut g);
            -g[layout.state(5, 1)]
        };

        let config = MpcConfig {
            horizon: 2,
            ..MpcConfig::default()
        };
        let expected = 0.0 + 10.0 / config.lf * 0.1 * config.dt;
        assert_abs_diff_eq!(residual(&config), expected, epsilon = 1e-12);

        let corrected = MpcConfig {
            path_heading_correction: true,
            ..config
        };
        assert!(residual(&corrected) < expected - 1e-3);
    }

    #[test]
    fn dimensions_follow_horizon() {
        let config = MpcConfig {
            horizon: 2,
            ..MpcConfig::default()
        };
        let builder = ProblemBuilder::new(&config).unwrap();
        let state = State::default();
        let coeffs = straight();
        let problem = builder.build(&state, &coeffs);

        assert_eq!(problem.n_variables(), 14);
        assert_eq!(problem.n_constraints(), 12);
        assert_eq!(problem.bounds().n_variables(), 14);
        assert_eq!(problem.bounds().n_constraints(), 12);
        assert_eq!(problem.objective_hessian().shape(), (14, 14));
        assert_eq!(problem.jacobian_structure().shape(), (12, 14));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = MpcConfig {
            lf: -1.0,
            ..MpcConfig::default()
        };
        assert!(matches!(ProblemBuilder::new(&config), Err(MpcError::Model(_))));
    }
}
