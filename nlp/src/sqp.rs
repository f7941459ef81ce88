use log::{debug, log_enabled, trace, Level};
use serde::Deserialize;
use std::time::{Duration, Instant};

use osqp_wrapper::{Problem, Settings, Status};
use prelude::*;

use crate::{Bounds, NlpProblem, NlpSolution, NlpSolver, SolveFailure};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SqpSettings {
    pub max_iterations: u32,
    /// Wall-clock budget for one solve, in seconds.
    pub time_limit: float,
    /// Converged once the step is this small relative to the iterate.
    pub step_tolerance: float,
    pub constraint_tolerance: float,
    pub max_backtracks: u32,
    pub qp: QpSettings,
}

impl Default for SqpSettings {
    fn default() -> SqpSettings {
        SqpSettings {
            max_iterations: 50,
            time_limit: 0.5,
            step_tolerance: 1e-5,
            constraint_tolerance: 1e-5,
            max_backtracks: 10,
            qp: QpSettings::default(),
        }
    }
}

impl SqpSettings {
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs_f64(max(self.time_limit, 0.0))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QpSettings {
    pub max_iterations: u32,
    pub eps_abs: float,
    pub eps_rel: float,
    pub polish: bool,
}

impl Default for QpSettings {
    fn default() -> QpSettings {
        QpSettings {
            max_iterations: 10000,
            eps_abs: 1e-8,
            eps_rel: 1e-8,
            polish: true,
        }
    }
}

impl QpSettings {
    fn to_osqp(&self) -> Settings {
        Settings::default()
            .verbose(log_enabled!(Level::Trace))
            .max_iter(self.max_iterations)
            .eps_abs(self.eps_abs)
            .eps_rel(self.eps_rel)
            .polish(self.polish)
    }
}

/// Sequential quadratic programming with an l1 merit line search.
///
/// Each iteration linearises the constraints around the current iterate and solves
///
/// ```text
/// minimise    1/2 d'Hd + grad'd
/// subject to  g_l - g <= J d <= g_u - g
///             z_l - z <=   d <= z_u - z
/// ```
///
/// with OSQP, where `H` is the constant objective Hessian. A fresh QP workspace is set up for
/// every solve so nothing carries over between calls.
pub struct SqpSolver {
    settings: SqpSettings,
}

struct Evaluation {
    objective: float,
    gradient: Vec<float>,
    constraints: Vec<float>,
}

impl SqpSolver {
    pub fn new(settings: SqpSettings) -> SqpSolver {
        SqpSolver { settings }
    }

    pub fn settings(&self) -> &SqpSettings {
        &self.settings
    }
}

impl Default for SqpSolver {
    fn default() -> SqpSolver {
        SqpSolver::new(SqpSettings::default())
    }
}

impl NlpSolver for SqpSolver {
    #[allow(non_snake_case)]
    fn solve<P: NlpProblem>(&mut self, problem: &P, initial: &[float], bounds: &Bounds) -> NlpSolution {
        let _guard = flame::start_guard("sqp solve");
        let start = Instant::now();
        let time_limit = self.settings.time_limit();

        let n = problem.n_variables();
        let m = problem.n_constraints();
        assert_eq!(initial.len(), n);
        bounds.assert_dims(n, m);

        let var_lower: Vec<float> = bounds.variable_lower.iter().map(|&b| qp_bound(b)).collect();
        let var_upper: Vec<float> = bounds.variable_upper.iter().map(|&b| qp_bound(b)).collect();
        let con_lower: Vec<float> = bounds.constraint_lower.iter().map(|&b| qp_bound(b)).collect();
        let con_upper: Vec<float> = bounds.constraint_upper.iter().map(|&b| qp_bound(b)).collect();

        let mut z: Vec<float> = (0..n)
            .map(|i| clamp(initial[i], var_lower[i], var_upper[i]))
            .collect();

        let mut A = sparse::vstack(&[problem.jacobian_structure(), sparse::eye(n)]).build_csc();
        assert_eq!(A.shape(), (m + n, n));

        let mut eval = match evaluate(problem, &z, &mut A) {
            Ok(eval) => eval,
            Err(failure) => return failed(z, NAN, INFINITY, 0, failure),
        };

        let mut iterations = 0;
        if self.settings.max_iterations == 0 {
            let violation = bounds.violation_max(&eval.constraints);
            return failed(z, eval.objective, violation, 0, SolveFailure::MaxIterations(0));
        }

        let P = problem.objective_hessian().upper_triangular().build_csc();
        assert_eq!(P.shape(), (n, n));

        let (mut l, mut u) = (vec![0.0; m + n], vec![0.0; m + n]);
        qp_bounds(&eval.constraints, &z, (&con_lower, &con_upper), (&var_lower, &var_upper), &mut l, &mut u);

        let mut qp = match Problem::new(&P, &eval.gradient, &A, &l, &u, &self.settings.qp.to_osqp()) {
            Ok(qp) => qp,
            Err(e) => {
                let violation = bounds.violation_max(&eval.constraints);
                return failed(z, eval.objective, violation, 0, SolveFailure::Setup(e.to_string()));
            }
        };

        let mut merit_weight = 1.0;

        while iterations < self.settings.max_iterations {
            let violation = bounds.violation_max(&eval.constraints);

            let elapsed = start.elapsed();
            if elapsed >= time_limit {
                let failure = SolveFailure::TimeLimit(time_limit);
                return failed(z, eval.objective, violation, iterations, failure);
            }

            if iterations > 0 {
                qp.update_lin_cost(&eval.gradient);
                qp.update_A(&A);
                qp.update_bounds(&l, &u);
            }
            qp.update_time_limit(Some(time_limit - elapsed));
            iterations += 1;

            let (d, y) = match qp.solve() {
                Status::Solved(s) | Status::SolvedInaccurate(s) => (s.x().to_vec(), s.y().to_vec()),
                Status::MaxIterationsReached(s) => {
                    debug!("sqp iteration {}: qp hit its iteration limit", iterations);
                    (s.x().to_vec(), s.y().to_vec())
                }
                Status::TimeLimitReached(_) => {
                    let failure = SolveFailure::TimeLimit(time_limit);
                    return failed(z, eval.objective, violation, iterations, failure);
                }
                Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                    let failure = SolveFailure::Infeasible;
                    return failed(z, eval.objective, violation, iterations, failure);
                }
                Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                    let failure = SolveFailure::Qp("unbounded subproblem");
                    return failed(z, eval.objective, violation, iterations, failure);
                }
                Status::NonConvex(_) => {
                    let failure = SolveFailure::Qp("non-convex objective");
                    return failed(z, eval.objective, violation, iterations, failure);
                }
                _ => {
                    let failure = SolveFailure::Qp("unknown status");
                    return failed(z, eval.objective, violation, iterations, failure);
                }
            };

            if !d.iter().chain(&y).all(|v| v.is_finite()) {
                let failure = SolveFailure::NonFinite("qp solution");
                return failed(z, eval.objective, violation, iterations, failure);
            }

            let step = inf_norm(&d);
            debug!(
                "sqp iteration {}: f = {:.6e}, violation = {:.3e}, step = {:.3e}",
                iterations, eval.objective, violation, step
            );

            if violation <= self.settings.constraint_tolerance
                && step <= self.settings.step_tolerance * (1.0 + inf_norm(&z))
            {
                return NlpSolution {
                    z,
                    objective: eval.objective,
                    constraint_violation: violation,
                    iterations,
                    failure: None,
                };
            }

            merit_weight = max(merit_weight, 1.1 * inf_norm(&y[..m]) + 1e-3);
            let violation_l1 = bounds.violation_l1(&eval.constraints);
            let merit = eval.objective + merit_weight * violation_l1;
            let slope = dot(&eval.gradient, &d) - merit_weight * violation_l1;

            let mut alpha = 1.0;
            let mut trial = vec![0.0; n];
            let mut trial_constraints = vec![0.0; m];
            for backtrack in 0..=self.settings.max_backtracks {
                for i in 0..n {
                    trial[i] = clamp(z[i] + alpha * d[i], var_lower[i], var_upper[i]);
                }
                let trial_objective = problem.objective(&trial);
                problem.constraints(&trial, &mut trial_constraints);
                let trial_merit =
                    trial_objective + merit_weight * bounds.violation_l1(&trial_constraints);
                trace!("line search alpha = {:.3e}: merit {:.6e} -> {:.6e}", alpha, merit, trial_merit);

                if trial_merit.is_finite() && trial_merit <= merit + 1e-4 * alpha * min(slope, 0.0) {
                    break;
                }
                if backtrack < self.settings.max_backtracks {
                    alpha *= 0.5;
                } else {
                    debug!("sqp iteration {}: line search exhausted at alpha = {:.3e}", iterations, alpha);
                }
            }

            z.copy_from_slice(&trial);
            eval = match evaluate(problem, &z, &mut A) {
                Ok(eval) => eval,
                Err(failure) => return failed(z, NAN, INFINITY, iterations, failure),
            };
            qp_bounds(&eval.constraints, &z, (&con_lower, &con_upper), (&var_lower, &var_upper), &mut l, &mut u);
        }

        let violation = bounds.violation_max(&eval.constraints);
        let failure = SolveFailure::MaxIterations(self.settings.max_iterations);
        failed(z, eval.objective, violation, iterations, failure)
    }
}

fn evaluate<P: NlpProblem>(
    problem: &P,
    z: &[float],
    jac: &mut sparse::CscMatrix,
) -> Result<Evaluation, SolveFailure> {
    let _guard = flame::start_guard("sqp evaluate");

    let objective = problem.objective(z);
    if !objective.is_finite() {
        return Err(SolveFailure::NonFinite("objective"));
    }

    let mut gradient = vec![0.0; z.len()];
    problem.objective_gradient(z, &mut gradient);
    if !gradient.iter().all(|v| v.is_finite()) {
        return Err(SolveFailure::NonFinite("objective gradient"));
    }

    let mut constraints = vec![0.0; problem.n_constraints()];
    problem.constraints(z, &mut constraints);
    if !constraints.iter().all(|v| v.is_finite()) {
        return Err(SolveFailure::NonFinite("constraints"));
    }

    problem.jacobian(z, jac);
    if !jac.data().iter().all(|v| v.is_finite()) {
        return Err(SolveFailure::NonFinite("constraint jacobian"));
    }

    Ok(Evaluation {
        objective,
        gradient,
        constraints,
    })
}

/// Bounds on the step `d` for the QP subproblem at `z`.
fn qp_bounds(
    g: &[float],
    z: &[float],
    (con_lower, con_upper): (&[float], &[float]),
    (var_lower, var_upper): (&[float], &[float]),
    l: &mut [float],
    u: &mut [float],
) {
    let m = g.len();
    for i in 0..m {
        l[i] = con_lower[i] - g[i];
        u[i] = con_upper[i] - g[i];
    }
    for i in 0..z.len() {
        l[m + i] = min(var_lower[i] - z[i], 0.0);
        u[m + i] = max(var_upper[i] - z[i], 0.0);
    }
}

fn qp_bound(b: float) -> float {
    if b >= UNBOUNDED {
        INFINITY
    } else if b <= -UNBOUNDED {
        NEG_INFINITY
    } else {
        b
    }
}

fn dot(a: &[float], b: &[float]) -> float {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn failed(
    z: Vec<float>,
    objective: float,
    constraint_violation: float,
    iterations: u32,
    failure: SolveFailure,
) -> NlpSolution {
    debug!("sqp failed after {} iterations: {}", iterations, failure);
    NlpSolution {
        z,
        objective,
        constraint_violation,
        iterations,
        failure: Some(failure),
    }
}
