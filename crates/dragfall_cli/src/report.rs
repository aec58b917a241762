use dragfall_core::model::{Coercion, EvaluationResult, PhysicalParams};
use dragfall_core::{SimulationOutput, SymbolicSolution};
use serde::Serialize;
use std::io::{self, Write};

pub fn write_banner<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "=== Model: vertical fall with linear drag ===")?;
    writeln!(out, "Equation: m dv/dt = m g - gamma v")?;
    writeln!(out, "The downward axis is taken as positive.")?;
    writeln!(out)
}

pub fn write_solution<W: Write>(out: &mut W, solution: &SymbolicSolution) -> io::Result<()> {
    writeln!(out, "Transform-domain equation:")?;
    writeln!(out, "  {}", solution.equation)?;
    writeln!(out, "Symbolic solution v(t):")?;
    writeln!(out, "  {solution}")?;
    writeln!(out)
}

/// Per-scenario summary: parameters, terminal and final velocity, and the
/// gap between them.
pub fn write_results<W: Write>(
    out: &mut W,
    t_max: f64,
    results: &[EvaluationResult],
) -> io::Result<()> {
    writeln!(out, "\n=== Results ===")?;
    for result in results {
        writeln!(out, "[{}] {}", result.label, result.params)?;
        writeln!(
            out,
            "  Terminal velocity v_T = m g / gamma = {:.4} m/s",
            result.terminal_velocity
        )?;
        writeln!(
            out,
            "  Velocity at the end of the run v({t_max:?}) = {:.4} m/s",
            result.final_velocity
        )?;
        writeln!(
            out,
            "  Difference |v(T_max) - v_T| = {:.4e} m/s",
            result.deviation
        )?;
    }
    writeln!(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub label: String,
    pub params: PhysicalParams,
    pub terminal_velocity: f64,
    pub final_velocity: f64,
    pub deviation: f64,
}

/// Machine-readable record of one run, printed with `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub expression: String,
    pub t_max: f64,
    pub samples: usize,
    pub coercions: Vec<Coercion>,
    pub scenarios: Vec<ScenarioSummary>,
}

impl RunReport {
    pub fn new(
        solution: &SymbolicSolution,
        output: &SimulationOutput,
        coercions: Vec<Coercion>,
    ) -> Self {
        Self {
            expression: solution.expression.to_string(),
            t_max: output.grid.t_max(),
            samples: output.grid.len(),
            coercions,
            scenarios: output
                .results
                .iter()
                .map(|result| ScenarioSummary {
                    label: result.label.clone(),
                    params: result.params,
                    terminal_velocity: result.terminal_velocity,
                    final_velocity: result.final_velocity,
                    deviation: result.deviation,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragfall_core::model::{RunConfig, Scenario};
    use dragfall_core::Simulation;

    fn skydiver_run() -> (Simulation, SimulationOutput) {
        let simulation = Simulation::new().expect("derivation should succeed");
        let config = RunConfig::new(
            10.0,
            500,
            vec![Scenario::new("Scenario 1", PhysicalParams::default())],
        )
        .expect("valid config");
        let output = simulation.run_scenarios(&config).expect("valid run");
        (simulation, output)
    }

    #[test]
    fn results_use_fixed_and_scientific_precision() {
        let (_, output) = skydiver_run();
        let mut buffer = Vec::new();
        write_results(&mut buffer, 10.0, &output.results).expect("in-memory write");
        let text = String::from_utf8(buffer).expect("UTF-8");
        assert!(text.contains("[Scenario 1] m = 80.0000 kg, gamma = 12.0000 kg/s"));
        assert!(text.contains("v_T = m g / gamma = 65.4000 m/s"));
        assert!(text.contains("v(10.0) = 50.8073 m/s"));
        assert!(text.contains("|v(T_max) - v_T| = 1.4593e1 m/s"));
    }

    #[test]
    fn solution_block_shows_the_canonical_expression() {
        let (simulation, _) = skydiver_run();
        let mut buffer = Vec::new();
        write_banner(&mut buffer).expect("in-memory write");
        write_solution(&mut buffer, simulation.solution()).expect("in-memory write");
        let text = String::from_utf8(buffer).expect("UTF-8");
        assert!(text.contains("Equation: m dv/dt = m g - gamma v"));
        assert!(text.contains("  m*s*V - m*v0 = -gamma*V + g*m/s"));
        assert!(text.contains("  v(t) = g*m/gamma + (v0 - g*m/gamma)*exp(-gamma*t/m)"));
    }

    #[test]
    fn report_serializes_without_the_sample_vectors() {
        let (simulation, output) = skydiver_run();
        let report = RunReport::new(
            simulation.solution(),
            &output,
            vec![Coercion::ScenarioCount {
                requested: 0,
                used: 1,
            }],
        );
        let json = serde_json::to_value(&report).expect("serializable");
        assert_eq!(json["samples"], 500);
        assert_eq!(json["t_max"], 10.0);
        assert_eq!(json["scenarios"][0]["label"], "Scenario 1");
        assert_eq!(json["scenarios"][0]["params"]["mass"], 80.0);
        assert!(json["scenarios"][0].get("velocities").is_none());
        assert_eq!(json["coercions"][0]["ScenarioCount"]["requested"], 0);
    }
}
