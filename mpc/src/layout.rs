use prelude::*;
use vehicle_model::{Actuation, State};

/// Offsets into the flat decision vector
///
/// ```text
/// [ x_0..x_N | y | psi | v | cte | epsi | delta_0..delta_N-1 | a ]
/// ```
///
/// State `j` at step `k` lives at `j * N + k`. Constraint rows use the same indexing: the row
/// constraining state `j` at step `k` is `j * N + k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    n: usize,
}

impl Layout {
    pub fn new(n: usize) -> Layout {
        assert!(n >= 2, "horizon must contain at least 2 steps");
        Layout { n }
    }

    /// Number of predicted states, N.
    pub fn horizon(&self) -> usize {
        self.n
    }

    /// Number of predicted actuations, N - 1.
    pub fn n_actuations(&self) -> usize {
        self.n - 1
    }

    pub fn n_variables(&self) -> usize {
        State::DIM * self.n + Actuation::DIM * self.n_actuations()
    }

    pub fn n_constraints(&self) -> usize {
        State::DIM * self.n
    }

    pub fn x_start(&self) -> usize {
        0
    }

    pub fn y_start(&self) -> usize {
        self.n
    }

    pub fn psi_start(&self) -> usize {
        2 * self.n
    }

    pub fn v_start(&self) -> usize {
        3 * self.n
    }

    pub fn cte_start(&self) -> usize {
        4 * self.n
    }

    pub fn epsi_start(&self) -> usize {
        5 * self.n
    }

    pub fn delta_start(&self) -> usize {
        State::DIM * self.n
    }

    pub fn a_start(&self) -> usize {
        self.delta_start() + self.n_actuations()
    }

    /// Index of state component `j` (in `State::to_array` order) at step `k`.
    pub fn state(&self, j: usize, k: usize) -> usize {
        debug_assert!(j < State::DIM && k < self.n);
        j * self.n + k
    }

    /// Index of actuation component `j` (in `Actuation::to_array` order) at step `k`.
    pub fn actuation(&self, j: usize, k: usize) -> usize {
        debug_assert!(j < Actuation::DIM && k < self.n_actuations());
        self.delta_start() + j * self.n_actuations() + k
    }

    pub fn state_at(&self, z: &[float], k: usize) -> [float; 6] {
        let mut s = [0.0; 6];
        for (j, v) in s.iter_mut().enumerate() {
            *v = z[self.state(j, k)];
        }
        s
    }

    pub fn actuation_at(&self, z: &[float], k: usize) -> [float; 2] {
        [z[self.actuation(0, k)], z[self.actuation(1, k)]]
    }

    pub fn set_state(&self, z: &mut [float], k: usize, s: &[float; 6]) {
        for (j, &v) in s.iter().enumerate() {
            z[self.state(j, k)] = v;
        }
    }

    pub fn set_actuation(&self, z: &mut [float], k: usize, u: &[float; 2]) {
        for (j, &v) in u.iter().enumerate() {
            z[self.actuation(j, k)] = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_contiguous_and_ordered() {
        let layout = Layout::new(10);
        let starts = [
            layout.x_start(),
            layout.y_start(),
            layout.psi_start(),
            layout.v_start(),
            layout.cte_start(),
            layout.epsi_start(),
            layout.delta_start(),
            layout.a_start(),
        ];
        assert_eq!(starts, [0, 10, 20, 30, 40, 50, 60, 69]);
        assert_eq!(layout.a_start() + layout.n_actuations(), layout.n_variables());
        assert_eq!(layout.n_variables(), 78);
        assert_eq!(layout.n_constraints(), 60);
    }

    #[test]
    fn smallest_horizon() {
        let layout = Layout::new(2);
        assert_eq!(layout.n_variables(), 14);
        assert_eq!(layout.delta_start(), 12);
        assert_eq!(layout.a_start(), 13);
    }

    #[test]
    #[should_panic]
    fn rejects_single_step_horizon() {
        Layout::new(1);
    }

    #[test]
    fn accessors_round_trip() {
        let layout = Layout::new(4);
        let mut z = vec![0.0; layout.n_variables()];
        layout.set_state(&mut z, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        layout.set_actuation(&mut z, 1, &[0.1, 0.2]);

        assert_eq!(z[layout.epsi_start() + 2], 6.0);
        assert_eq!(z[layout.a_start() + 1], 0.2);
        assert_eq!(layout.state_at(&z, 2), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(layout.actuation_at(&z, 1), [0.1, 0.2]);
        assert_eq!(layout.state_at(&z, 0), [0.0; 6]);
    }
}
