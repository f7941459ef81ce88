use nlp::diff::{self, Dual64, DualNum, HyperDual64};
use prelude::*;

use crate::{CostWeights, Layout};

/// Groups of cost terms reported separately by `CostFunction::breakdown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Component {
    Tracking,
    Speed,
    Effort,
    Smoothness,
}

#[derive(Clone, Copy, Debug)]
enum Term {
    /// `weight * (z[var] - target)^2`
    Deviation { var: usize, target: float },
    /// `weight * (z[next] - z[prev])^2`
    Rate { prev: usize, next: usize },
}

#[derive(Clone, Copy, Debug)]
struct WeightedTerm {
    component: Component,
    weight: float,
    term: Term,
}

impl WeightedTerm {
    fn vars(&self) -> [usize; 2] {
        match self.term {
            Term::Deviation { var, .. } => [var, var],
            Term::Rate { prev, next } => [prev, next],
        }
    }

    // For deviations only the first argument is used.
    fn value<T: DualNum<f64> + Copy>(&self, w: &[T; 2]) -> T {
        let e = match self.term {
            Term::Deviation { target, .. } => w[0] - target,
            Term::Rate { .. } => w[1] - w[0],
        };
        e * e * self.weight
    }

    fn arity(&self) -> usize {
        match self.term {
            Term::Deviation { .. } => 1,
            Term::Rate { .. } => 2,
        }
    }
}

/// Per-group cost of a decision vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CostBreakdown {
    /// Cross-track and heading error.
    pub tracking: float,
    /// Deviation from the reference speed.
    pub speed: float,
    /// Steering and acceleration magnitude.
    pub effort: float,
    /// Change in steering and acceleration between steps.
    pub smoothness: float,
}

impl CostBreakdown {
    pub fn total(&self) -> float {
        self.tracking + self.speed + self.effort + self.smoothness
    }
}

/// Weighted sum of squared tracking errors, speed error, actuation and actuation rates over the
/// horizon. Every term depends on at most two decision variables.
#[derive(Clone, Debug)]
pub struct CostFunction {
    n_variables: usize,
    terms: Vec<WeightedTerm>,
}

impl CostFunction {
    pub fn new(layout: Layout, weights: &CostWeights, ref_v: float) -> CostFunction {
        let n = layout.horizon();
        let m = layout.n_actuations();
        let mut terms = Vec::with_capacity(3 * n + 2 * m + 2 * m.saturating_sub(1));

        let mut deviation = |component, weight, var, target| {
            terms.push(WeightedTerm {
                component,
                weight,
                term: Term::Deviation { var, target },
            })
        };
        for k in 0..n {
            deviation(Component::Tracking, weights.cte, layout.cte_start() + k, 0.0);
            deviation(Component::Tracking, weights.epsi, layout.epsi_start() + k, 0.0);
            deviation(Component::Speed, weights.v, layout.v_start() + k, ref_v);
        }
        for k in 0..m {
            deviation(Component::Effort, weights.delta, layout.delta_start() + k, 0.0);
            deviation(Component::Effort, weights.a, layout.a_start() + k, 0.0);
        }

        for k in 0..m.saturating_sub(1) {
            for &(start, weight) in &[
                (layout.delta_start(), weights.delta_rate),
                (layout.a_start(), weights.a_rate),
            ] {
                terms.push(WeightedTerm {
                    component: Component::Smoothness,
                    weight,
                    term: Term::Rate {
                        prev: start + k,
                        next: start + k + 1,
                    },
                });
            }
        }

        CostFunction {
            n_variables: layout.n_variables(),
            terms,
        }
    }

    pub fn evaluate<T: DualNum<f64> + Copy>(&self, z: &[T]) -> T {
        assert_eq!(z.len(), self.n_variables);
        let mut total = T::from(0.0);
        for term in &self.terms {
            let [i, j] = term.vars();
            total += term.value(&[z[i], z[j]]);
        }
        total
    }

    pub fn gradient(&self, z: &[float], grad: &mut [float]) {
        assert_eq!(z.len(), self.n_variables);
        assert_eq!(grad.len(), self.n_variables);
        grad.iter_mut().for_each(|g| *g = 0.0);

        for term in &self.terms {
            let vars = term.vars();
            let (_, g) = diff::gradient(|w: &[Dual64; 2]| term.value(w), &[z[vars[0]], z[vars[1]]]);
            for a in 0..term.arity() {
                grad[vars[a]] += g[a];
            }
        }
    }

    /// Full symmetric Hessian. Exact everywhere since every term is quadratic.
    pub fn hessian(&self) -> sparse::Builder {
        let mut hess = sparse::Builder::with_capacity(
            self.n_variables,
            self.n_variables,
            4 * self.terms.len(),
        );
        for term in &self.terms {
            let vars = term.vars();
            let (_, h) = diff::hessian(|w: &[HyperDual64; 2]| term.value(w), &[0.0, 0.0]);
            for a in 0..term.arity() {
                for b in 0..term.arity() {
                    if h[(a, b)] != 0.0 {
                        hess.push(vars[a], vars[b], h[(a, b)]);
                    }
                }
            }
        }
        hess
    }

    pub fn breakdown(&self, z: &[float]) -> CostBreakdown {
        assert_eq!(z.len(), self.n_variables);
        let mut breakdown = CostBreakdown::default();
        for term in &self.terms {
            let [i, j] = term.vars();
            let value = term.value(&[z[i], z[j]]);
            match term.component {
                Component::Tracking => breakdown.tracking += value,
                Component::Speed => breakdown.speed += value,
                Component::Effort => breakdown.effort += value,
                Component::Smoothness => breakdown.smoothness += value,
            }
        }
        breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn weights() -> CostWeights {
        CostWeights {
            cte: 2.0,
            epsi: 3.0,
            v: 0.5,
            delta: 5.0,
            a: 7.0,
            delta_rate: 11.0,
            a_rate: 13.0,
        }
    }

    fn sample(layout: Layout) -> Vec<float> {
        (0..layout.n_variables())
            .map(|i| ((i * 7 % 11) as float - 5.0) * 0.1)
            .collect()
    }

    #[test]
    fn evaluates_every_term() {
        let layout = Layout::new(3);
        let cost = CostFunction::new(layout, &weights(), 4.0);
        let mut z = vec![0.0; layout.n_variables()];
        z[layout.cte_start() + 1] = 1.0;
        z[layout.epsi_start() + 2] = -1.0;
        z[layout.v_start()] = 4.0;
        z[layout.delta_start() + 1] = 0.5;
        z[layout.a_start()] = 1.0;

        let b = cost.breakdown(&z);
        assert_abs_diff_eq!(b.tracking, 2.0 + 3.0, epsilon = 1e-12);
        // Two of the three speeds are zero.
        assert_abs_diff_eq!(b.speed, 2.0 * 0.5 * 16.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.effort, 5.0 * 0.25 + 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.smoothness, 11.0 * 0.25 + 13.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cost.evaluate(&z), b.total(), epsilon = 1e-12);
    }

    #[test]
    fn gradient_matches_dual_evaluation() {
        let layout = Layout::new(4);
        let cost = CostFunction::new(layout, &weights(), 1.0);
        let z = sample(layout);

        let mut grad = vec![0.0; z.len()];
        cost.gradient(&z, &mut grad);

        for i in 0..z.len() {
            let zd: Vec<Dual64> = z
                .iter()
                .enumerate()
                .map(|(j, &v)| Dual64::new(v, if i == j { 1.0 } else { 0.0 }))
                .collect();
            assert_abs_diff_eq!(grad[i], cost.evaluate(&zd).eps, epsilon = 1e-10);
        }
    }

    #[test]
    fn hessian_predicts_quadratic_exactly() {
        let layout = Layout::new(4);
        let cost = CostFunction::new(layout, &weights(), 1.0);
        let z = sample(layout);
        let d: Vec<float> = (0..z.len()).map(|i| ((i % 3) as float - 1.0) * 0.2).collect();

        let h = cost.hessian().build_csc().to_dense();
        assert_eq!(h, h.transpose());

        let mut grad = vec![0.0; z.len()];
        cost.gradient(&z, &mut grad);
        let dv = DVector::from_column_slice(&d);
        let predicted = cost.evaluate(&z)
            + grad.iter().zip(&d).map(|(g, d)| g * d).sum::<float>()
            + 0.5 * (dv.transpose() * &h * &dv)[(0, 0)];

        let moved: Vec<float> = z.iter().zip(&d).map(|(z, d)| z + d).collect();
        assert_abs_diff_eq!(cost.evaluate(&moved), predicted, epsilon = 1e-10);
    }

    #[test]
    fn two_step_horizon_has_no_rate_terms() {
        let layout = Layout::new(2);
        let cost = CostFunction::new(layout, &weights(), 0.0);
        let z = vec![1.0; layout.n_variables()];
        assert_eq!(cost.breakdown(&z).smoothness, 0.0);
    }
}
