use anyhow::Result;
use dragfall_core::model::{
    coerce_sample_count, coerce_scenario_count, validate_drag, validate_mass, validate_t_max,
    Coercion, PhysicalParams, RunConfig, Scenario, DEFAULT_DRAG, DEFAULT_GRAVITY,
    DEFAULT_INITIAL_VELOCITY, DEFAULT_MASS, DEFAULT_SAMPLES, DEFAULT_SCENARIO_COUNT,
    DEFAULT_T_MAX, MAX_SAMPLES, MAX_SCENARIOS,
};
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

pub const INVALID_VALUE_NOTICE: &str = "  Invalid value, using the default.";

/// Line-oriented prompts with bracketed defaults over any reader/writer pair.
///
/// Empty input and end of input both accept the default. Text that does not
/// parse as a finite number prints a notice and also falls back to the
/// default.
pub struct Prompter<R, W> {
    input: R,
    output: W,
    exhausted: bool,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            exhausted: false,
        }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }

    fn ask(&mut self, message: &str, default: &str) -> io::Result<Option<String>> {
        write!(self.output, "{message} [{default}]: ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            self.exhausted = true;
            writeln!(self.output)?;
            return Ok(None);
        }
        let answer = line.trim();
        if answer.is_empty() {
            Ok(None)
        } else {
            Ok(Some(answer.to_string()))
        }
    }

    fn reject(&mut self, message: &str, answer: &str) -> io::Result<()> {
        warn!(prompt = message, input = answer, "malformed number, using default");
        writeln!(self.output, "{INVALID_VALUE_NOTICE}")
    }

    pub fn read_f64(&mut self, message: &str, default: f64) -> io::Result<f64> {
        let Some(answer) = self.ask(message, &format!("{default:?}"))? else {
            return Ok(default);
        };
        match answer.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => {
                self.reject(message, &answer)?;
                Ok(default)
            }
        }
    }

    /// Reads a count. Fractional answers are truncated toward zero, so
    /// `2.9` reads as `2` and `-0.5` as `0`. Answers above `limit` are
    /// treated as malformed.
    pub fn read_count(&mut self, message: &str, default: usize, limit: usize) -> io::Result<i64> {
        let fallback = i64::try_from(default).unwrap_or(i64::MAX);
        let Some(answer) = self.ask(message, &default.to_string())? else {
            return Ok(fallback);
        };
        match answer.parse::<f64>() {
            Ok(value) if value.is_finite() && value.trunc() <= limit as f64 => {
                Ok(value.trunc() as i64)
            }
            _ => {
                self.reject(message, &answer)?;
                Ok(fallback)
            }
        }
    }

    pub fn read_label(&mut self, message: &str, default: &str) -> io::Result<String> {
        Ok(self
            .ask(message, default)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn notice(&mut self, coercion: &Coercion) -> io::Result<()> {
        warn!(%coercion, "coerced input");
        writeln!(self.output, "\nWARNING: {coercion}.")
    }

    pub fn section(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.output, "\n--- {title} ---")
    }

    /// Asks for the shared run settings, then for each scenario in turn.
    ///
    /// `T_max` is validated as soon as it is read, and each scenario's mass
    /// and drag before the next prompt; an `InputError` aborts the run.
    /// Sample and scenario counts are coerced instead, and the coercions are
    /// returned alongside the configuration.
    pub fn collect_config(&mut self) -> Result<(RunConfig, Vec<Coercion>)> {
        let mut coercions = Vec::new();

        let t_max = validate_t_max(
            self.read_f64("Maximum simulation time T_max (s)", DEFAULT_T_MAX)?,
        )?;

        let requested = self.read_count("Number of samples", DEFAULT_SAMPLES, MAX_SAMPLES)?;
        let (samples, coerced) = coerce_sample_count(requested);
        if let Some(coercion) = coerced {
            self.notice(&coercion)?;
            coercions.push(coercion);
        }

        let requested =
            self.read_count("Number of scenarios", DEFAULT_SCENARIO_COUNT, MAX_SCENARIOS)?;
        let (count, coerced) = coerce_scenario_count(requested);
        if let Some(coercion) = coerced {
            self.notice(&coercion)?;
            coercions.push(coercion);
        }

        let mut scenarios = Vec::new();
        for index in 1..=count {
            if self.exhausted && !scenarios.is_empty() {
                warn!(
                    read = scenarios.len(),
                    requested = count,
                    "input ended, skipping remaining scenarios"
                );
                break;
            }
            let default_label = Scenario::default_label(index);
            self.section(&default_label)?;
            let label = self.read_label("Label", &default_label)?;
            let mass = validate_mass(self.read_f64("Mass m (kg)", DEFAULT_MASS)?)?;
            let drag =
                validate_drag(self.read_f64("Drag coefficient gamma (kg/s)", DEFAULT_DRAG)?)?;
            let gravity = self.read_f64("Gravity g (m/s^2)", DEFAULT_GRAVITY)?;
            let initial_velocity =
                self.read_f64("Initial velocity v(0) (m/s)", DEFAULT_INITIAL_VELOCITY)?;
            let params = PhysicalParams::new(mass, drag, gravity, initial_velocity)?;
            debug!(%label, %params, "scenario accepted");
            scenarios.push(Scenario::new(label, params));
        }

        Ok((RunConfig::new(t_max, samples, scenarios)?, coercions))
    }
}
