use config::PathConfig;
use prelude::*;
use vehicle_model::{Actuation, Coefficients, KinematicBicycle, ModelError, State};

/// Global reference path `y = amplitude * sin(2 pi x / wavelength)`.
pub struct SinePath {
    amplitude: float,
    wavenumber: float,
}

impl SinePath {
    pub fn new(config: &PathConfig) -> SinePath {
        SinePath {
            amplitude: config.amplitude,
            wavenumber: 2.0 * PI / config.wavelength,
        }
    }

    pub fn y(&self, x: float) -> float {
        self.amplitude * (self.wavenumber * x).sin()
    }

    pub fn heading(&self, x: float) -> float {
        (self.amplitude * self.wavenumber * (self.wavenumber * x).cos()).atan()
    }

    /// `count` waypoints `spacing` apart, starting one spacing behind `x`.
    pub fn waypoints(&self, x: float, count: usize, spacing: float) -> Vec<(float, float)> {
        (0..count)
            .map(|i| {
                let wx = x + (i as float - 1.0) * spacing;
                (wx, self.y(wx))
            })
            .collect()
    }
}

/// The simulated vehicle. Only its pose and speed are meaningful.
pub struct Plant {
    model: KinematicBicycle,
    flat: Coefficients,
    state: State,
}

impl Plant {
    pub fn new(lf: float, x: float, y: float, psi: float, v: float) -> Result<Plant, ModelError> {
        let flat = Coefficients::new(vec![0.0])?;
        Ok(Plant {
            model: KinematicBicycle::new(lf, false)?,
            state: State::on_path(x, y, psi, v, &flat),
            flat,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn advance(&mut self, actuation: &Actuation, duration: float) {
        self.state = self
            .model
            .predict(&self.state, actuation, duration, &self.flat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn path() -> SinePath {
        SinePath::new(&PathConfig {
            amplitude: 2.0,
            wavelength: 40.0,
            ..PathConfig::default()
        })
    }

    #[test]
    fn waypoints_start_behind_vehicle() {
        let points = path().waypoints(10.0, 4, 5.0);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].0, 5.0);
        assert_eq!(points[3].0, 20.0);
        assert_abs_diff_eq!(points[1].1, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn heading_follows_slope() {
        let path = path();
        assert_abs_diff_eq!(path.heading(10.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(path.heading(0.0), (2.0 * 2.0 * PI / 40.0).atan(), epsilon = 1e-12);
    }

    #[test]
    fn plant_drives_straight_without_steering() {
        let mut plant = Plant::new(2.67, 0.0, 1.0, 0.0, 10.0).unwrap();
        plant.advance(&Actuation { delta: 0.0, a: 1.0 }, 0.5);
        assert_abs_diff_eq!(plant.state().y, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(plant.state().v, 10.5, epsilon = 1e-9);
        assert!(plant.state().x > 5.0);
    }
}
