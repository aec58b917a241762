use crate::symbolic::{Param, ParamValues};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_T_MAX: f64 = 10.0;
pub const DEFAULT_SAMPLES: usize = 500;
/// Sample count used when fewer than two are requested.
pub const FALLBACK_SAMPLES: usize = 100;
pub const MIN_SAMPLES: usize = 2;
/// Largest sample count accepted at the prompt.
pub const MAX_SAMPLES: usize = 1_000_000;
/// Largest scenario count accepted at the prompt.
pub const MAX_SCENARIOS: usize = 100;
pub const DEFAULT_SCENARIO_COUNT: usize = 1;
pub const DEFAULT_MASS: f64 = 80.0;
pub const DEFAULT_DRAG: f64 = 12.0;
pub const DEFAULT_GRAVITY: f64 = 9.81;
pub const DEFAULT_INITIAL_VELOCITY: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InputError {
    #[error("T_max must be positive (got {0})")]
    InvalidTMax(f64),
    #[error("mass m must be positive (got {0})")]
    InvalidMass(f64),
    #[error("drag coefficient gamma must be positive (got {0})")]
    InvalidDrag(f64),
    #[error("{name} must be a finite number (got {value})")]
    NonFinite { name: &'static str, value: f64 },
    #[error("a time grid needs at least 2 samples (got {0})")]
    TooFewSamples(usize),
    #[error("a run needs at least one scenario")]
    NoScenarios,
}

fn positive(value: f64, err: fn(f64) -> InputError) -> Result<f64, InputError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(err(value))
    }
}

fn finite(value: f64, name: &'static str) -> Result<f64, InputError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InputError::NonFinite { name, value })
    }
}

/// Validated physical constants of one scenario. `mass` and `drag` are
/// strictly positive, so nothing downstream can divide by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParams")]
pub struct PhysicalParams {
    mass: f64,
    drag: f64,
    gravity: f64,
    initial_velocity: f64,
}

#[derive(Deserialize)]
struct RawParams {
    mass: f64,
    drag: f64,
    gravity: f64,
    initial_velocity: f64,
}

impl TryFrom<RawParams> for PhysicalParams {
    type Error = InputError;
    fn try_from(raw: RawParams) -> Result<Self, Self::Error> {
        Self::new(raw.mass, raw.drag, raw.gravity, raw.initial_velocity)
    }
}

impl PhysicalParams {
    pub fn new(
        mass: f64,
        drag: f64,
        gravity: f64,
        initial_velocity: f64,
    ) -> Result<Self, InputError> {
        Ok(Self {
            mass: validate_mass(mass)?,
            drag: validate_drag(drag)?,
            gravity: finite(gravity, "gravitational acceleration g")?,
            initial_velocity: finite(initial_velocity, "initial velocity v0")?,
        })
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn drag(&self) -> f64 {
        self.drag
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    pub fn initial_velocity(&self) -> f64 {
        self.initial_velocity
    }

    /// Values in `Param` slot order.
    pub fn values(&self) -> ParamValues {
        let mut values = [0.0; 4];
        values[Param::Mass.index()] = self.mass;
        values[Param::Drag.index()] = self.drag;
        values[Param::Gravity.index()] = self.gravity;
        values[Param::InitialVelocity.index()] = self.initial_velocity;
        values
    }

    /// Steady state `m g / gamma`.
    pub fn terminal_velocity(&self) -> f64 {
        self.mass * self.gravity / self.drag
    }

    /// Time constant `m / gamma`.
    pub fn time_constant(&self) -> f64 {
        self.mass / self.drag
    }
}

impl Default for PhysicalParams {
    fn default() -> Self {
        Self {
            mass: DEFAULT_MASS,
            drag: DEFAULT_DRAG,
            gravity: DEFAULT_GRAVITY,
            initial_velocity: DEFAULT_INITIAL_VELOCITY,
        }
    }
}

impl fmt::Display for PhysicalParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m = {:.4} kg, gamma = {:.4} kg/s, g = {:.4} m/s^2, v0 = {:.4} m/s",
            self.mass, self.drag, self.gravity, self.initial_velocity
        )
    }
}

/// Evenly spaced sample times over `[0, t_max]`, endpoints included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    times: Vec<f64>,
}

impl TimeGrid {
    pub fn new(t_max: f64, samples: usize) -> Result<Self, InputError> {
        let t_max = positive(t_max, InputError::InvalidTMax)?;
        if samples < MIN_SAMPLES {
            return Err(InputError::TooFewSamples(samples));
        }
        let last = (samples - 1) as f64;
        let times = (0..samples)
            .map(|i| {
                if i == samples - 1 {
                    t_max
                } else {
                    t_max * i as f64 / last
                }
            })
            .collect();
        Ok(Self { times })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn t_max(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    pub params: PhysicalParams,
}

impl Scenario {
    pub fn new(label: impl Into<String>, params: PhysicalParams) -> Self {
        Self {
            label: label.into(),
            params,
        }
    }

    /// `Scenario {index}`, 1-based.
    pub fn default_label(index: usize) -> String {
        format!("Scenario {index}")
    }
}

/// One scenario's velocities on the shared grid plus derived figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub label: String,
    pub params: PhysicalParams,
    pub velocities: Vec<f64>,
    pub terminal_velocity: f64,
    pub final_velocity: f64,
    pub deviation: f64,
}

/// A non-fatal correction applied to user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coercion {
    SampleCount { requested: i64, used: usize },
    ScenarioCount { requested: i64, used: usize },
}

impl fmt::Display for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coercion::SampleCount { requested, used } => write!(
                f,
                "sample count {requested} is too small, using {used}"
            ),
            Coercion::ScenarioCount { requested, used } => write!(
                f,
                "scenario count {requested} is too small, using {used}"
            ),
        }
    }
}

pub fn coerce_sample_count(requested: i64) -> (usize, Option<Coercion>) {
    match usize::try_from(requested) {
        Ok(samples) if samples >= MIN_SAMPLES => (samples, None),
        _ => (
            FALLBACK_SAMPLES,
            Some(Coercion::SampleCount {
                requested,
                used: FALLBACK_SAMPLES,
            }),
        ),
    }
}

pub fn coerce_scenario_count(requested: i64) -> (usize, Option<Coercion>) {
    match usize::try_from(requested) {
        Ok(count) if count >= 1 => (count, None),
        _ => (
            DEFAULT_SCENARIO_COUNT,
            Some(Coercion::ScenarioCount {
                requested,
                used: DEFAULT_SCENARIO_COUNT,
            }),
        ),
    }
}

/// Everything a run needs, built once at the boundary and passed by value
/// into the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub t_max: f64,
    pub samples: usize,
    pub scenarios: Vec<Scenario>,
}

impl RunConfig {
    pub fn new(t_max: f64, samples: usize, scenarios: Vec<Scenario>) -> Result<Self, InputError> {
        let t_max = positive(t_max, InputError::InvalidTMax)?;
        if samples < MIN_SAMPLES {
            return Err(InputError::TooFewSamples(samples));
        }
        if scenarios.is_empty() {
            return Err(InputError::NoScenarios);
        }
        Ok(Self {
            t_max,
            samples,
            scenarios,
        })
    }

    pub fn time_grid(&self) -> Result<TimeGrid, InputError> {
        TimeGrid::new(self.t_max, self.samples)
    }
}

/// Validates `t_max` on its own, ahead of any other prompt.
pub fn validate_t_max(t_max: f64) -> Result<f64, InputError> {
    positive(t_max, InputError::InvalidTMax)
}

pub fn validate_mass(mass: f64) -> Result<f64, InputError> {
    positive(mass, InputError::InvalidMass)
}

pub fn validate_drag(drag: f64) -> Result<f64, InputError> {
    positive(drag, InputError::InvalidDrag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_reject_non_positive_mass_and_drag() {
        assert_eq!(
            PhysicalParams::new(0.0, 12.0, 9.81, 0.0),
            Err(InputError::InvalidMass(0.0))
        );
        assert_eq!(
            PhysicalParams::new(80.0, -1.0, 9.81, 0.0),
            Err(InputError::InvalidDrag(-1.0))
        );
        assert!(matches!(
            PhysicalParams::new(80.0, 12.0, f64::NAN, 0.0),
            Err(InputError::NonFinite { .. })
        ));
        assert!(PhysicalParams::new(80.0, 12.0, -9.81, -5.0).is_ok());
    }

    #[test]
    fn terminal_velocity_of_default_skydiver() {
        let params = PhysicalParams::default();
        assert!((params.terminal_velocity() - 65.4).abs() < 1e-12);
        assert!((params.time_constant() - 80.0 / 12.0).abs() < 1e-15);
        assert_eq!(params.values(), [80.0, 12.0, 9.81, 0.0]);
    }

    #[test]
    fn time_grid_spans_the_closed_interval() {
        let grid = TimeGrid::new(10.0, 5).expect("valid grid");
        assert_eq!(grid.times(), &[0.0, 2.5, 5.0, 7.5, 10.0]);
        assert_eq!(grid.t_max(), 10.0);

        let fine = TimeGrid::new(0.3, 7).expect("valid grid");
        assert_eq!(fine.times()[0], 0.0);
        assert_eq!(fine.times()[6], 0.3);
        assert!(fine.times().windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(TimeGrid::new(10.0, 1), Err(InputError::TooFewSamples(1)));
        assert_eq!(TimeGrid::new(0.0, 10), Err(InputError::InvalidTMax(0.0)));
    }

    #[test]
    fn counts_are_coerced_to_safe_defaults() {
        assert_eq!(coerce_sample_count(500), (500, None));
        assert_eq!(coerce_sample_count(2), (2, None));
        assert_eq!(
            coerce_sample_count(1),
            (
                FALLBACK_SAMPLES,
                Some(Coercion::SampleCount {
                    requested: 1,
                    used: FALLBACK_SAMPLES
                })
            )
        );
        assert_eq!(coerce_sample_count(-4).0, FALLBACK_SAMPLES);
        assert_eq!(coerce_scenario_count(3), (3, None));
        assert_eq!(coerce_scenario_count(0).0, 1);
        assert!(coerce_scenario_count(-1).1.is_some());
    }

    #[test]
    fn run_config_validates_its_fields() {
        let scenario = Scenario::new(Scenario::default_label(1), PhysicalParams::default());
        assert_eq!(scenario.label, "Scenario 1");
        assert_eq!(
            RunConfig::new(-1.0, 10, vec![scenario.clone()]),
            Err(InputError::InvalidTMax(-1.0))
        );
        assert_eq!(RunConfig::new(10.0, 10, vec![]), Err(InputError::NoScenarios));
        let config = RunConfig::new(10.0, 11, vec![scenario]).expect("valid config");
        assert_eq!(config.time_grid().expect("valid grid").len(), 11);
    }

    #[test]
    fn raw_params_are_validated_on_conversion() {
        let raw = RawParams {
            mass: 0.0,
            drag: 12.0,
            gravity: DEFAULT_GRAVITY,
            initial_velocity: DEFAULT_INITIAL_VELOCITY,
        };
        assert_eq!(PhysicalParams::try_from(raw), Err(InputError::InvalidMass(0.0)));
    }
}
