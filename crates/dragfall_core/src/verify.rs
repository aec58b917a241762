//! Self-check of a derived velocity law against the equation of motion.
//!
//! The compiled expression is run on dual numbers seeded in `t`, which yields
//! `v(t)` and `dv/dt` in one pass. Those are substituted back into
//! `m dv/dt = m g - gamma v` and the initial and limiting values are checked.

use crate::autodiff::Dual;
use crate::evaluator::VelocityEvaluator;
use crate::model::PhysicalParams;
use crate::traits::{DynamicalSystem, Scalar};
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

/// Multiples of the time constant at which the residual is sampled.
const SAMPLE_TIME_CONSTANTS: [f64; 6] = [0.0, 0.1, 0.5, 1.0, 3.0, 10.0];
/// Horizon, in time constants, at which the law must have settled.
const SETTLING_TIME_CONSTANTS: f64 = 50.0;

/// `dv/dt = g - (gamma / m) v` as a one-dimensional flow.
#[derive(Debug, Clone, Copy)]
pub struct LinearDragOde {
    params: PhysicalParams,
}

impl LinearDragOde {
    pub fn new(params: PhysicalParams) -> Self {
        Self { params }
    }
}

fn lift<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::zero)
}

impl<T: Scalar> DynamicalSystem<T> for LinearDragOde {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let rate = lift::<T>(self.params.drag() / self.params.mass());
        out[0] = lift::<T>(self.params.gravity()) - rate * x[0];
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub parameter_sets: usize,
    pub samples: usize,
    /// Largest `|m dv/dt + gamma v - m g|`, relative to the force scale.
    pub max_residual: f64,
    pub max_initial_error: f64,
    pub max_settling_error: f64,
}

/// `v(t)` and `dv/dt` from the compiled expression.
fn velocity_and_slope(
    evaluator: &VelocityEvaluator,
    t: f64,
    params: &PhysicalParams,
    stack: &mut Vec<Dual>,
) -> Result<Dual> {
    let values = params.values().map(Dual::constant);
    evaluator
        .execute(&[Dual::variable(t)], &values, stack)
        .ok_or_else(|| anyhow!("Compiled velocity law references an unbound slot."))
}

pub fn check_solution(
    evaluator: &VelocityEvaluator,
    parameter_sets: &[PhysicalParams],
    tolerance: f64,
) -> Result<VerificationReport> {
    if parameter_sets.is_empty() {
        bail!("Verification needs at least one parameter set.");
    }
    if tolerance.is_nan() || tolerance <= 0.0 {
        bail!("Verification tolerance must be positive.");
    }

    let mut report = VerificationReport {
        parameter_sets: parameter_sets.len(),
        samples: 0,
        max_residual: 0.0,
        max_initial_error: 0.0,
        max_settling_error: 0.0,
    };
    let mut stack = Vec::new();
    let mut slope = [0.0];

    for params in parameter_sets {
        let ode = LinearDragOde::new(*params);
        let tau = params.time_constant();
        let terminal = params.terminal_velocity();

        for multiple in SAMPLE_TIME_CONSTANTS {
            let t = multiple * tau;
            let v = velocity_and_slope(evaluator, t, params, &mut stack)?;
            ode.apply(t, &[v.val], &mut slope);
            let force_scale = params.mass() * (params.gravity().abs() + v.eps.abs())
                + params.drag() * v.val.abs()
                + 1.0;
            let residual = params.mass() * (v.eps - slope[0]).abs() / force_scale;
            report.max_residual = report.max_residual.max(residual);
            report.samples += 1;
            if residual > tolerance {
                bail!(
                    "Equation of motion violated at t = {t} for {params}: relative residual {residual:e}."
                );
            }
        }

        let initial = velocity_and_slope(evaluator, 0.0, params, &mut stack)?.val;
        let initial_error = (initial - params.initial_velocity()).abs()
            / (1.0 + params.initial_velocity().abs() + terminal.abs());
        report.max_initial_error = report.max_initial_error.max(initial_error);
        if initial_error > tolerance {
            bail!("v(0) = {initial} does not match v0 for {params}.");
        }

        let settled =
            velocity_and_slope(evaluator, SETTLING_TIME_CONSTANTS * tau, params, &mut stack)?.val;
        let settling_error = (settled - terminal).abs() / (1.0 + terminal.abs());
        report.max_settling_error = report.max_settling_error.max(settling_error);
        if settling_error > tolerance {
            bail!("Velocity {settled} has not settled to m g / gamma = {terminal} for {params}.");
        }
    }

    Ok(report)
}

/// Parameter sets spanning light and heavy bodies, weak and strong drag,
/// and starts below, at and above terminal velocity.
pub fn reference_parameter_sets() -> Vec<PhysicalParams> {
    [
        (80.0, 12.0, 9.81, 0.0),
        (0.145, 0.0023, 9.81, 40.0),
        (1200.0, 450.0, 1.62, -15.0),
        (2.0, 0.5, 24.79, 99.16),
        (0.01, 3.0, 9.81, 250.0),
    ]
    .into_iter()
    .filter_map(|(m, gamma, g, v0)| PhysicalParams::new(m, gamma, g, v0).ok())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laplace::{derive, derive_velocity, LinearForm, TransformEquation};
    use crate::symbolic::{Param, ParamPoly};

    fn evaluator() -> VelocityEvaluator {
        let solution = derive_velocity().expect("derivation should succeed");
        VelocityEvaluator::compile(&solution).expect("expression should compile")
    }

    #[test]
    fn derived_law_satisfies_the_equation_of_motion() {
        let sets = reference_parameter_sets();
        assert_eq!(sets.len(), 5);
        let report = check_solution(&evaluator(), &sets, 1e-9).expect("law should verify");
        assert_eq!(report.parameter_sets, 5);
        assert_eq!(report.samples, 5 * SAMPLE_TIME_CONSTANTS.len());
        assert!(report.max_residual < 1e-12);
        assert!(report.max_initial_error < 1e-12);
        assert!(report.max_settling_error < 1e-12);
    }

    #[test]
    fn ode_right_hand_side_vanishes_at_terminal_velocity() {
        let params = PhysicalParams::default();
        let ode = LinearDragOde::new(params);
        assert_eq!(DynamicalSystem::<f64>::dimension(&ode), 1);
        let mut out = [1.0];
        ode.apply(0.0, &[params.terminal_velocity()], &mut out);
        assert!(out[0].abs() < 1e-12);

        let mut dual_out = [Dual::constant(0.0)];
        ode.apply(Dual::constant(0.0), &[Dual::variable(0.0)], &mut dual_out);
        assert!((dual_out[0].val - 9.81).abs() < 1e-12);
        assert!((dual_out[0].eps + 12.0 / 80.0).abs() < 1e-15);
    }

    #[test]
    fn a_wrong_law_is_caught() {
        // Rest start regardless of v0: m s V = m g / s - gamma V.
        let mut equation = TransformEquation::linear_drag();
        let m = ParamPoly::param(Param::Mass);
        equation.lhs = LinearForm::derivative(ParamPoly::zero()).scale(&m);
        let solution = derive(equation).expect("still solvable");
        let wrong = VelocityEvaluator::compile(&solution).expect("compiles");

        let err = check_solution(&wrong, &reference_parameter_sets(), 1e-9)
            .expect_err("v0 is ignored");
        assert!(err.to_string().contains("does not match v0"), "{err}");
    }

    #[test]
    fn rejects_degenerate_requests() {
        let evaluator = evaluator();
        assert!(check_solution(&evaluator, &[], 1e-9).is_err());
        assert!(check_solution(&evaluator, &reference_parameter_sets(), 0.0).is_err());
        assert!(check_solution(&evaluator, &reference_parameter_sets(), f64::NAN).is_err());
    }

    #[test]
    fn dual_slope_matches_the_closed_form_derivative() {
        let evaluator = evaluator();
        let params = PhysicalParams::new(3.0, 1.5, 9.81, 4.0).expect("valid");
        let mut stack = Vec::new();
        for t in [0.0, 0.7, 2.0] {
            let v = velocity_and_slope(&evaluator, t, &params, &mut stack).expect("runs");
            let expected = (9.81 - 1.5 * 4.0 / 3.0) * (-1.5 * t / 3.0_f64).exp();
            assert!((v.eps - expected).abs() < 1e-12);
        }
    }
}
