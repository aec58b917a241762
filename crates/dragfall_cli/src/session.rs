use crate::prompt::Prompter;
use crate::report::{self, RunReport};
use anyhow::Result;
use dragfall_core::model::{InputError, PhysicalParams};
use dragfall_core::{verify, Simulation, SimulationOutput};
use std::io::{BufRead, Write};
use tracing::{debug, info};

/// Relative tolerance for the startup self-check of the derived law.
const VERIFY_TOLERANCE: f64 = 1e-9;

/// What a finished session hands back for plotting and JSON output.
pub struct SessionOutcome {
    pub output: SimulationOutput,
    pub report: RunReport,
}

/// Runs one interactive session: derivation, prompts, evaluation and the
/// console report. Nothing is evaluated until every prompt has been
/// answered and validated.
pub fn run_session<R: BufRead, W: Write>(input: R, out: &mut W) -> Result<SessionOutcome> {
    writeln!(out, "Building the symbolic solution by Laplace transform...")?;
    let simulation = Simulation::new()?;
    let check = verify::check_solution(
        simulation.evaluator(),
        &[PhysicalParams::default()],
        VERIFY_TOLERANCE,
    )?;
    debug!(?check, "derived law verified");
    report::write_solution(out, simulation.solution())?;
    report::write_banner(out)?;

    let mut prompter = Prompter::new(input, &mut *out);
    let (config, coercions) = prompter.collect_config()?;
    info!(
        t_max = config.t_max,
        samples = config.samples,
        scenarios = config.scenarios.len(),
        "configuration accepted"
    );

    let output = simulation.run_scenarios(&config)?;
    report::write_results(out, config.t_max, &output.results)?;
    let report = RunReport::new(simulation.solution(), &output, coercions);
    Ok(SessionOutcome { output, report })
}

/// `1` for rejected user input, `2` for anything else.
pub fn exit_status_for(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<InputError>().is_some() {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragfall_core::DerivationError;
    use std::io::Cursor;

    fn run(input: &str) -> (Result<SessionOutcome>, String) {
        let mut out = Vec::new();
        let result = run_session(Cursor::new(input.as_bytes().to_vec()), &mut out);
        (result, String::from_utf8(out).expect("UTF-8"))
    }

    fn assert_err_contains<T>(result: Result<T>, needle: &str) -> anyhow::Error {
        match result {
            Ok(_) => panic!("expected an error containing {needle:?}"),
            Err(err) => {
                assert!(err.to_string().contains(needle), "{err}");
                err
            }
        }
    }

    #[test]
    fn default_session_reports_the_skydiver() {
        let (result, text) = run("\n\n\n\n\n\n\n\n");
        let outcome = result.expect("defaults are valid");
        assert!(text.contains("v(t) = g*m/gamma + (v0 - g*m/gamma)*exp(-gamma*t/m)"));
        assert!(text.contains("=== Results ==="));
        assert!(text.contains("50.8073 m/s"));
        assert_eq!(outcome.output.results.len(), 1);
        assert_eq!(outcome.report.samples, 500);
        assert!(outcome.report.coercions.is_empty());
    }

    #[test]
    fn derivation_is_printed_before_any_prompt() {
        let (_, text) = run("");
        let solution = text.find("v(t) =").expect("solution printed");
        let first_prompt = text.find("T_max").expect("prompt printed");
        assert!(solution < first_prompt);
    }

    #[test]
    fn invalid_mass_maps_to_exit_status_one() {
        let (result, text) = run("\n\n\n\n0\n");
        let err = assert_err_contains(result, "mass m must be positive");
        assert_eq!(exit_status_for(&err), 1);
        assert!(!text.contains("=== Results ==="));
    }

    #[test]
    fn invalid_t_max_maps_to_exit_status_one() {
        let (result, _) = run("0\n");
        let err = assert_err_contains(result, "T_max must be positive");
        assert_eq!(exit_status_for(&err), 1);
    }

    #[test]
    fn invalid_drag_maps_to_exit_status_one() {
        let (result, text) = run("\n\n\n\n\n0\n");
        let err = assert_err_contains(result, "drag coefficient gamma must be positive");
        assert_eq!(exit_status_for(&err), 1);
        assert!(!text.contains("=== Results ==="));
    }

    #[test]
    fn coercions_are_reported_and_recorded() {
        let (result, text) = run("\n1\n-2\n\n\n\n\n\n");
        let outcome = result.expect("coercions are not fatal");
        assert!(text.contains("WARNING: sample count 1 is too small, using 100."));
        assert!(text.contains("WARNING: scenario count -2 is too small, using 1."));
        assert_eq!(outcome.report.samples, 100);
        assert_eq!(outcome.report.coercions.len(), 2);
    }

    #[test]
    fn other_failures_map_to_exit_status_two() {
        let err = anyhow::Error::from(DerivationError::NoUniqueSolution {
            equation: "V = V".to_string(),
        });
        assert_eq!(exit_status_for(&err), 2);
        assert_eq!(exit_status_for(&anyhow::anyhow!("window creation failed")), 2);
    }
}
