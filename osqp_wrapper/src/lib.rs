use osqp::Problem as InnerProblem;
use std::borrow::Cow;
use std::time::Duration;

pub use osqp::{SetupError, Settings, Status};

use prelude::*;

pub struct Problem {
    inner: InnerProblem,
}

impl Problem {
    /// `P` must only contain entries on or above the diagonal.
    #[allow(non_snake_case)]
    pub fn new(
        P: &sparse::CscMatrix,
        q: &[float],
        A: &sparse::CscMatrix,
        l: &[float],
        u: &[float],
        settings: &Settings,
    ) -> Result<Problem, SetupError> {
        let _guard = flame::start_guard("osqp setup");
        let inner = InnerProblem::new(convert_sparse(P), q, convert_sparse(A), l, u, settings)?;
        Ok(Problem { inner })
    }

    pub fn update_lin_cost(&mut self, q: &[float]) {
        let _guard = flame::start_guard("osqp update_lin_cost");
        self.inner.update_lin_cost(q)
    }

    pub fn update_bounds(&mut self, l: &[float], u: &[float]) {
        let _guard = flame::start_guard("osqp update_bounds");
        self.inner.update_bounds(l, u)
    }

    /// The sparsity pattern of `A` must match the one given at setup.
    #[allow(non_snake_case)]
    pub fn update_A(&mut self, A: &sparse::CscMatrix) {
        let _guard = flame::start_guard("osqp update_A");
        self.inner.update_A(convert_sparse(A))
    }

    pub fn update_time_limit(&mut self, time_limit: Option<Duration>) {
        self.inner.update_time_limit(time_limit)
    }

    pub fn solve(&mut self) -> Status {
        let _guard = flame::start_guard("osqp solve");
        self.inner.solve()
    }
}

pub fn convert_sparse(this: &sparse::CscMatrix) -> osqp::CscMatrix {
    let (nrows, ncols) = this.shape();
    osqp::CscMatrix {
        nrows,
        ncols,
        indptr: Cow::Borrowed(this.indptr()),
        indices: Cow::Borrowed(this.indices()),
        data: Cow::Borrowed(this.data()),
    }
}
