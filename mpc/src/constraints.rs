use prelude::*;
use vehicle_model::{Actuation, Coefficients, KinematicBicycle, State};

use crate::Layout;

/// Dynamics residuals tying each predicted state to its predecessor, plus the actuator box
/// bounds on the decision vector.
///
/// Residuals are zero when feasible:
///
/// ```text
/// s_0 - measured           = 0
/// s_k - f(s_k-1, u_k-1)    = 0    for k in 1..N
/// ```
#[derive(Clone, Debug)]
pub struct ConstraintSet {
    layout: Layout,
    model: KinematicBicycle,
    dt: float,
    actuation_lower: Actuation,
    actuation_upper: Actuation,
    structure: sparse::Builder,
    // Block for step k is at index k - 1
    blocks: Vec<sparse::BlockRef>,
}

impl ConstraintSet {
    pub fn new(
        layout: Layout,
        model: KinematicBicycle,
        dt: float,
        (actuation_lower, actuation_upper): (Actuation, Actuation),
    ) -> ConstraintSet {
        let n_rows = layout.n_constraints();
        let n_cols = layout.n_variables();

        let sparsity = model.linearise_sparsity();
        let sparsity = nalgebra::DMatrix::<bool>::from_column_slice(6, 8, sparsity.as_slice());

        // d(s_k)/d(s_k) is the identity for every row
        let identity = sparse::hstack(&[sparse::eye(n_rows), sparse::zeros(n_rows, n_cols - n_rows)]);
        let mut parts = vec![identity];
        let mut blocks = Vec::with_capacity(layout.n_actuations());

        for k in 1..layout.horizon() {
            let rows: Vec<usize> = (0..State::DIM).map(|j| layout.state(j, k)).collect();
            let cols: Vec<usize> = (0..State::DIM)
                .map(|j| layout.state(j, k - 1))
                .chain((0..Actuation::DIM).map(|j| layout.actuation(j, k - 1)))
                .collect();
            let (part, block) = sparse::scatter_mut(n_rows, n_cols, &rows, &cols, &sparsity);
            parts.push(part);
            blocks.push(block);
        }

        ConstraintSet {
            layout,
            model,
            dt,
            actuation_lower,
            actuation_upper,
            structure: sparse::add(&parts),
            blocks,
        }
    }

    pub fn model(&self) -> &KinematicBicycle {
        &self.model
    }

    pub fn dt(&self) -> float {
        self.dt
    }

    pub fn residuals(&self, z: &[float], measured: &State, coeffs: &Coefficients, g: &mut [float]) {
        let layout = &self.layout;
        assert_eq!(g.len(), layout.n_constraints());

        let measured = measured.to_array();
        for j in 0..State::DIM {
            let i = layout.state(j, 0);
            g[i] = z[i] - measured[j];
        }

        for k in 1..layout.horizon() {
            let prev = layout.state_at(z, k - 1);
            let u = layout.actuation_at(z, k - 1);
            let predicted = self.model.step(&prev, &u, self.dt, coeffs);
            for j in 0..State::DIM {
                let i = layout.state(j, k);
                g[i] = z[i] - predicted[j];
            }
        }
    }

    /// Jacobian pattern. Constant entries are set; the model derivatives are written by
    /// `jacobian`.
    pub fn jacobian_structure(&self) -> sparse::Builder {
        self.structure.clone()
    }

    pub fn jacobian(&self, z: &[float], coeffs: &Coefficients, jac: &mut sparse::CscMatrix) {
        for (block, k) in self.blocks.iter().zip(1..) {
            let prev = self.layout.state_at(z, k - 1);
            let u = self.layout.actuation_at(z, k - 1);
            let (_, d) = self.model.linearise(&prev, &u, self.dt, coeffs);
            let value = DMatrix::from_column_slice(6, 8, (-d).as_slice());
            jac.set_block(block, &value);
        }
    }

    /// Box bounds on the decision vector. States are unbounded.
    pub fn variable_bounds(&self) -> (Vec<float>, Vec<float>) {
        let layout = &self.layout;
        let mut lower = vec![-UNBOUNDED; layout.n_variables()];
        let mut upper = vec![UNBOUNDED; layout.n_variables()];
        for k in 0..layout.n_actuations() {
            layout.set_actuation(&mut lower, k, &self.actuation_lower.to_array());
            layout.set_actuation(&mut upper, k, &self.actuation_upper.to_array());
        }
        (lower, upper)
    }

    pub fn residual_bounds(&self) -> (Vec<float>, Vec<float>) {
        let m = self.layout.n_constraints();
        (vec![0.0; m], vec![0.0; m])
    }
}
