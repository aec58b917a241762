use crate::equation_engine::{Bytecode, Compiler, VM};
use crate::laplace::{DerivationError, SymbolicSolution};
use crate::model::{InputError, PhysicalParams};
use crate::symbolic::ParamPoly;
use crate::traits::Scalar;
use tracing::debug;

/// Numeric form of a derived velocity law, built once per run.
///
/// Each call reduces every exponential mode to a pair of plain numbers
/// `(residue, rate)` for the given parameters, then sweeps the time samples
/// with one `exp` per mode per sample. Underflow of `exp` to zero is silent,
/// so long runs saturate at the terminal velocity.
#[derive(Debug, Clone)]
pub struct VelocityEvaluator {
    modes: Vec<(ParamPoly, ParamPoly)>,
    bytecode: Bytecode,
}

impl VelocityEvaluator {
    pub fn compile(solution: &SymbolicSolution) -> Result<Self, DerivationError> {
        let compiler = Compiler::new(&[solution.variable()], &solution.parameters());
        let bytecode = compiler.compile(&solution.expression)?;
        let modes = solution
            .closed_form
            .terms()
            .iter()
            .map(|term| (term.residue.clone(), term.rate.clone()))
            .collect::<Vec<_>>();
        debug!(
            modes = modes.len(),
            ops = bytecode.ops().len(),
            "compiled velocity evaluator"
        );
        Ok(Self { modes, bytecode })
    }

    /// Velocities at each of `times`, index for index.
    pub fn evaluate(&self, times: &[f64], params: &PhysicalParams) -> Vec<f64> {
        let values = params.values();
        let modes: Vec<(f64, f64)> = self
            .modes
            .iter()
            .map(|(residue, rate)| (residue.eval(&values), rate.eval(&values)))
            .collect();
        times
            .iter()
            .map(|&t| {
                modes
                    .iter()
                    .map(|&(residue, rate)| residue * (rate * t).exp())
                    .sum()
            })
            .collect()
    }

    /// Same as `evaluate`, taking unvalidated scalars.
    pub fn evaluate_raw(
        &self,
        times: &[f64],
        mass: f64,
        drag: f64,
        gravity: f64,
        initial_velocity: f64,
    ) -> Result<Vec<f64>, InputError> {
        let params = PhysicalParams::new(mass, drag, gravity, initial_velocity)?;
        Ok(self.evaluate(times, &params))
    }

    /// Single-point evaluation through the compiled expression.
    pub fn evaluate_at(&self, t: f64, params: &PhysicalParams) -> Option<f64> {
        let mut stack = Vec::with_capacity(self.bytecode.max_depth());
        self.execute(&[t], &params.values(), &mut stack)
    }

    /// Runs the compiled expression on any scalar type, e.g. `Dual` to get
    /// `dv/dt` alongside `v`.
    pub fn execute<T: Scalar>(&self, vars: &[T], params: &[T], stack: &mut Vec<T>) -> Option<T> {
        VM::execute(&self.bytecode, vars, params, stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laplace::derive_velocity;
    use crate::model::TimeGrid;

    fn evaluator() -> VelocityEvaluator {
        let solution = derive_velocity().expect("derivation should succeed");
        VelocityEvaluator::compile(&solution).expect("expression should compile")
    }

    fn params(mass: f64, drag: f64, gravity: f64, v0: f64) -> PhysicalParams {
        PhysicalParams::new(mass, drag, gravity, v0).expect("valid parameters")
    }

    fn parameter_sweep() -> Vec<PhysicalParams> {
        let mut out = Vec::new();
        for mass in [0.05, 1.0, 80.0, 2500.0] {
            for drag in [0.01, 0.7, 12.0, 300.0] {
                for gravity in [1.62, 9.81, 24.79] {
                    for v0 in [-20.0, 0.0, 3.3, 500.0] {
                        out.push(params(mass, drag, gravity, v0));
                    }
                }
            }
        }
        out
    }

    #[test]
    fn initial_value_is_recovered() {
        let evaluator = evaluator();
        for p in parameter_sweep() {
            let v = evaluator.evaluate(&[0.0], &p);
            let tolerance = 1e-9 * (1.0 + p.terminal_velocity().abs());
            assert!(
                (v[0] - p.initial_velocity()).abs() <= tolerance,
                "{p}: v(0) = {}",
                v[0]
            );
        }
    }

    #[test]
    fn converges_to_terminal_velocity() {
        let evaluator = evaluator();
        for p in parameter_sweep() {
            let t = 40.0 * p.time_constant();
            let v = evaluator.evaluate(&[10.0 * p.time_constant(), t], &p);
            let terminal = p.terminal_velocity();
            let gap = (p.initial_velocity() - terminal).abs();
            assert!((v[0] - terminal).abs() <= 1e-4 * gap + 1e-9 * terminal.abs());
            assert!((v[1] - terminal).abs() <= 1e-9 * (1.0 + terminal.abs()));
        }
    }

    #[test]
    fn approach_is_monotone_from_either_side() {
        let evaluator = evaluator();
        let grid = TimeGrid::new(60.0, 400).expect("valid grid");
        for v0 in [0.0, 30.0, 120.0] {
            let p = params(80.0, 12.0, 9.81, v0);
            let v = evaluator.evaluate(grid.times(), &p);
            if v0 < p.terminal_velocity() {
                assert!(v.windows(2).all(|w| w[1] >= w[0]));
            } else {
                assert!(v.windows(2).all(|w| w[1] <= w[0]));
            }
        }

        let base = params(80.0, 12.0, 9.81, 0.0);
        let at_terminal = params(80.0, 12.0, 9.81, base.terminal_velocity());
        let v = evaluator.evaluate(grid.times(), &at_terminal);
        for value in v {
            assert!((value - at_terminal.terminal_velocity()).abs() < 1e-9);
        }
    }

    #[test]
    fn skydiver_after_ten_seconds() {
        let evaluator = evaluator();
        let grid = TimeGrid::new(10.0, 500).expect("valid grid");
        let v = evaluator.evaluate(grid.times(), &PhysicalParams::default());
        assert_eq!(v.len(), 500);
        let expected = 65.4 * (1.0 - (-1.5_f64).exp());
        assert!((v[499] - expected).abs() < 1e-9);
        assert!((v[499] - 50.81).abs() < 0.01);
    }

    #[test]
    fn repeated_calls_are_bit_identical() {
        let evaluator = evaluator();
        let grid = TimeGrid::new(25.0, 1000).expect("valid grid");
        let p = params(3.0, 0.4, 9.81, -7.0);
        let first = evaluator.evaluate(grid.times(), &p);
        let second = evaluator.evaluate(grid.times(), &p);
        let first_bits: Vec<u64> = first.iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn underflow_saturates_without_error() {
        let evaluator = evaluator();
        let p = params(0.001, 1000.0, 9.81, 50.0);
        let v = evaluator.evaluate(&[1e6, 1e300], &p);
        assert!(v.iter().all(|x| x.is_finite()));
        for value in v {
            assert!((value - p.terminal_velocity()).abs() < 1e-12);
        }
    }

    #[test]
    fn compiled_expression_agrees_with_mode_sweep() {
        let evaluator = evaluator();
        for p in parameter_sweep().into_iter().step_by(7) {
            for t in [0.0, 0.25, 3.0, 17.0] {
                let swept = evaluator.evaluate(&[t], &p)[0];
                let compiled = evaluator.evaluate_at(t, &p).expect("all slots supplied");
                assert!(
                    (swept - compiled).abs() <= 1e-9 * (1.0 + swept.abs()),
                    "{p} at t={t}: {swept} vs {compiled}"
                );
            }
        }
    }

    #[test]
    fn raw_entry_point_validates_first() {
        let evaluator = evaluator();
        assert_eq!(
            evaluator.evaluate_raw(&[0.0, 1.0], 0.0, 12.0, 9.81, 0.0),
            Err(InputError::InvalidMass(0.0))
        );
        assert_eq!(
            evaluator.evaluate_raw(&[0.0], 80.0, 0.0, 9.81, 0.0),
            Err(InputError::InvalidDrag(0.0))
        );
        let v = evaluator
            .evaluate_raw(&[0.0], 80.0, 12.0, 9.81, 4.0)
            .expect("valid parameters");
        assert!((v[0] - 4.0).abs() < 1e-12);
    }
}
