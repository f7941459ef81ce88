pub use flame;
pub use nalgebra;

#[allow(non_camel_case_types)]
pub type float = f64;
pub use std::f64::consts::PI;
pub use std::f64::{INFINITY, NAN, NEG_INFINITY};

/// Magnitude at and beyond which a variable bound is treated as absent.
pub const UNBOUNDED: float = 1.0e19;

pub fn min<T: Copy + PartialOrd>(a: T, b: T) -> T {
    if b < a {
        b
    } else {
        a
    }
}

pub fn max<T: Copy + PartialOrd>(a: T, b: T) -> T {
    if b > a {
        b
    } else {
        a
    }
}

pub fn clamp<T: Copy + PartialOrd>(v: T, lo: T, hi: T) -> T {
    max(lo, min(v, hi))
}

pub fn deg_to_rad(deg: float) -> float {
    deg * PI / 180.0
}

/// Largest absolute element, zero for an empty slice.
pub fn inf_norm(v: &[float]) -> float {
    v.iter().fold(0.0, |acc, x| max(acc, x.abs()))
}

pub type Matrix<const R: usize, const C: usize> = nalgebra::SMatrix<float, R, C>;
pub type DMatrix = nalgebra::DMatrix<float>;
pub type DVector = nalgebra::DVector<float>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_clamp() {
        assert_eq!(min(1.0, 2.0), 1.0);
        assert_eq!(max(1.0, 2.0), 2.0);
        assert_eq!(clamp(3.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(-3.0, -1.0, 1.0), -1.0);
        assert_eq!(inf_norm(&[1.0, -4.0, 2.0]), 4.0);
        assert_eq!(inf_norm(&[]), 0.0);
        assert!((deg_to_rad(180.0) - PI).abs() < 1e-12);
    }
}
