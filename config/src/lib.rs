use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use mpc::{MpcConfig, MpcError};
use prelude::*;

pub static CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub controller: MpcConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Simulated seconds.
    pub duration: float,
    /// Seconds between controller invocations.
    pub control_period: float,
    /// Delay between computing an actuation and it reaching the vehicle, in seconds.
    pub latency: float,
    /// Sleep so that simulated time keeps pace with wall-clock time.
    pub real_time: bool,
    /// Initial lateral offset from the path.
    pub initial_offset: float,
    pub initial_speed: float,
    pub path: PathConfig,
    /// Where to write an HTML flame graph of the run, if anywhere.
    pub flame_graph: Option<PathBuf>,
}

impl Default for SimulatorConfig {
    fn default() -> SimulatorConfig {
        SimulatorConfig {
            duration: 20.0,
            control_period: 0.1,
            latency: 0.1,
            real_time: false,
            initial_offset: 1.0,
            initial_speed: 5.0,
            path: PathConfig::default(),
            flame_graph: None,
        }
    }
}

/// Sinusoidal global path `y = amplitude * sin(2 pi x / wavelength)`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfig {
    pub amplitude: float,
    pub wavelength: float,
    /// Waypoints handed to the polynomial fit each cycle.
    pub waypoints: usize,
    pub waypoint_spacing: float,
}

impl Default for PathConfig {
    fn default() -> PathConfig {
        PathConfig {
            amplitude: 5.0,
            wavelength: 100.0,
            waypoints: 8,
            waypoint_spacing: 5.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to deserialise configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid controller configuration: {0}")]
    Controller(#[from] MpcError),
    #[error("invalid simulator configuration: {0}")]
    Simulator(&'static str),
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    from_str(&config_str)
}

pub fn from_str(config_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(config_str)?;
    config.controller.validate()?;
    config.simulator.validate()?;
    Ok(config)
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |v: float| v.is_finite() && v > 0.0;
        if !(self.duration.is_finite() && self.duration >= 0.0) {
            return Err(ConfigError::Simulator("duration must be finite and non-negative"));
        }
        if !positive(self.control_period) {
            return Err(ConfigError::Simulator("control_period must be positive"));
        }
        if !(self.latency.is_finite() && self.latency >= 0.0) {
            return Err(ConfigError::Simulator("latency must be finite and non-negative"));
        }
        if !(self.initial_offset.is_finite() && self.initial_speed.is_finite()) {
            return Err(ConfigError::Simulator("initial state must be finite"));
        }
        if !positive(self.path.wavelength) || !self.path.amplitude.is_finite() {
            return Err(ConfigError::Simulator("path must have a finite amplitude and positive wavelength"));
        }
        if !positive(self.path.waypoint_spacing) || self.path.waypoints < 2 {
            return Err(ConfigError::Simulator("path needs at least 2 waypoints with positive spacing"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpc::FallbackPolicy;

    #[test]
    fn empty_file_uses_defaults() {
        let config = from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = from_str(
            r#"
            [controller]
            horizon = 15
            fallback = "hold_previous"

            [controller.weights]
            cte = 100.0

            [controller.solver]
            max_iterations = 20

            [simulator]
            real_time = true
            flame_graph = "flame.html"
            "#,
        )
        .unwrap();

        assert_eq!(config.controller.horizon, 15);
        assert_eq!(config.controller.fallback, FallbackPolicy::HoldPrevious);
        assert_eq!(config.controller.weights.cte, 100.0);
        assert_eq!(config.controller.weights.epsi, 1.0);
        assert_eq!(config.controller.solver.max_iterations, 20);
        assert_eq!(config.controller.dt, 0.1);
        assert!(config.simulator.real_time);
        assert_eq!(config.simulator.flame_graph, Some(PathBuf::from("flame.html")));
        assert_eq!(config.simulator.path, PathConfig::default());
    }

    #[test]
    fn rejects_invalid_controller() {
        let err = from_str("[controller]\nhorizon = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Controller(MpcError::HorizonTooShort(1))));
    }

    #[test]
    fn rejects_invalid_simulator() {
        let err = from_str("[simulator]\ncontrol_period = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Simulator(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = from_str("[controller]\nhorizn = 12\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load("does/not/exist.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert_eq!(path, PathBuf::from("does/not/exist.toml")),
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn repository_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(CONFIG_FILE);
        load(path).unwrap();
    }
}
