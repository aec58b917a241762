//! Transform-domain derivation of the fall velocity.
//!
//! The governing relation `m dv/dt = m g - gamma v` is written directly in the
//! transform domain using `L{dv/dt} = s V(s) - v0` and `L{c} = c / s`, solved
//! algebraically for `V(s)`, and inverted by residues at its simple poles.

use crate::equation_engine::{BinaryOp, EngineError, Expr, Function};
use crate::symbolic::{Param, ParamPoly, ParamValues, Rational, SPoly};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Name of the independent variable in the time-domain expression.
pub const TIME_SYMBOL: &str = "t";
/// Name used for the unknown transformed function when printing equations.
pub const UNKNOWN_SYMBOL: &str = "V";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DerivationError {
    #[error("no unique solution for V(s) in {equation}")]
    NoUniqueSolution { equation: String },
    #[error("transform {transform} is not strictly proper; its inverse contains impulses")]
    ImproperTransform { transform: String },
    #[error("transform {transform} has a repeated pole")]
    RepeatedPole { transform: String },
    #[error("denominator of {transform} has a factor of degree {degree} that cannot be split")]
    UnsupportedDenominator { transform: String, degree: usize },
    #[error("cannot divide {dividend} by {divisor} exactly")]
    NonMonomialDivision { dividend: String, divisor: String },
    #[error("failed to compile the time-domain expression: {0}")]
    Compile(#[from] EngineError),
}

/// One side of a transform-domain equation, `coeff * V(s) + constant`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearForm {
    pub coeff: Rational,
    pub constant: Rational,
}

impl LinearForm {
    /// The unknown `V(s)` itself.
    pub fn unknown() -> Self {
        Self {
            coeff: Rational::constant(ParamPoly::constant(1.0)),
            constant: Rational::zero(),
        }
    }

    pub fn known(value: Rational) -> Self {
        Self {
            coeff: Rational::zero(),
            constant: value,
        }
    }

    /// `L{dv/dt} = s V(s) - v(0)`.
    pub fn derivative(initial_value: ParamPoly) -> Self {
        Self {
            coeff: SPoly::s().into(),
            constant: Rational::constant(-&initial_value),
        }
    }

    /// `L{c} = c / s` for a constant `c`.
    pub fn step(value: ParamPoly) -> Self {
        Self::known(Rational {
            num: SPoly::constant(value),
            den: SPoly::s(),
        })
    }

    pub fn scale(&self, factor: &ParamPoly) -> Self {
        let factor = Rational::constant(factor.clone());
        Self {
            coeff: &self.coeff * &factor,
            constant: &self.constant * &factor,
        }
    }

    pub fn plus(&self, other: &LinearForm) -> Self {
        Self {
            coeff: &self.coeff + &other.coeff,
            constant: &self.constant + &other.constant,
        }
    }

    pub fn minus(&self, other: &LinearForm) -> Self {
        Self {
            coeff: &self.coeff - &other.coeff,
            constant: &self.constant - &other.constant,
        }
    }

    fn to_expr(&self) -> Expr {
        let mut terms = Vec::new();
        if !self.coeff.is_zero() {
            let unknown = Expr::var(UNKNOWN_SYMBOL);
            let mut coeff_terms = self.coeff.normalized().signed_terms();
            if coeff_terms.len() == 1 {
                let (negative, magnitude) = coeff_terms.remove(0);
                terms.push((negative, Expr::binary(magnitude, BinaryOp::Mul, unknown)));
            } else {
                let coeff = Expr::signed_sum(coeff_terms);
                terms.push((false, Expr::binary(coeff, BinaryOp::Mul, unknown)));
            }
        }
        if !self.constant.is_zero() {
            terms.extend(self.constant.normalized().signed_terms());
        }
        Expr::signed_sum(terms)
    }
}

/// A linear equation `lhs = rhs` in the unknown `V(s)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformEquation {
    pub lhs: LinearForm,
    pub rhs: LinearForm,
}

impl TransformEquation {
    /// `m (s V(s) - v0) = m g / s - gamma V(s)`.
    pub fn linear_drag() -> Self {
        let m = ParamPoly::param(Param::Mass);
        let gamma = ParamPoly::param(Param::Drag);
        let weight = &m * &ParamPoly::param(Param::Gravity);
        let v0 = ParamPoly::param(Param::InitialVelocity);

        let lhs = LinearForm::derivative(v0).scale(&m);
        let rhs = LinearForm::step(weight).minus(&LinearForm::unknown().scale(&gamma));
        Self { lhs, rhs }
    }

    /// Solves for `V(s)`. The equation is linear, so the answer is unique
    /// exactly when the collected coefficient of `V(s)` is nonzero.
    pub fn solve(&self) -> Result<Rational, DerivationError> {
        let coeff = &self.lhs.coeff - &self.rhs.coeff;
        let constant = &self.rhs.constant - &self.lhs.constant;
        constant
            .checked_div(&coeff)
            .map(|solution| solution.normalized())
            .ok_or_else(|| DerivationError::NoUniqueSolution {
                equation: self.to_string(),
            })
    }
}

impl fmt::Display for TransformEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.lhs.to_expr(), self.rhs.to_expr())
    }
}

/// `residue * exp(rate * t)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpTerm {
    pub residue: ParamPoly,
    pub rate: ParamPoly,
}

/// A time-domain function written as a sum of exponential modes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClosedForm {
    terms: Vec<ExpTerm>,
}

impl ClosedForm {
    /// Canonical form: modes with equal rates merged, vanishing modes dropped,
    /// the constant mode first and the rest in monomial order.
    pub fn new(terms: Vec<ExpTerm>) -> Self {
        let mut merged: Vec<ExpTerm> = Vec::with_capacity(terms.len());
        for term in terms {
            match merged.iter_mut().find(|existing| existing.rate == term.rate) {
                Some(existing) => existing.residue = &existing.residue + &term.residue,
                None => merged.push(term),
            }
        }
        merged.retain(|term| !term.residue.is_zero());
        merged.sort_by(|a, b| {
            b.rate
                .is_zero()
                .cmp(&a.rate.is_zero())
                .then_with(|| a.rate.leading_monomial().cmp(&b.rate.leading_monomial()))
        });
        Self { terms: merged }
    }

    pub fn terms(&self) -> &[ExpTerm] {
        &self.terms
    }

    /// Direct evaluation at one instant, without compilation.
    pub fn eval(&self, t: f64, values: &ParamValues) -> f64 {
        self.terms
            .iter()
            .map(|term| term.residue.eval(values) * (term.rate.eval(values) * t).exp())
            .sum()
    }

    pub fn to_expr(&self) -> Expr {
        let terms = self.terms.iter().flat_map(|term| {
            if term.rate.is_zero() {
                return term.residue.signed_terms(None);
            }
            let rate_t = term.rate.to_expr_times(Some((TIME_SYMBOL, 1)));
            let mode = Expr::call(Function::Exp, rate_t);
            match term.residue.as_monomial() {
                Some((monomial, coeff)) if monomial.is_one() && coeff.abs() == 1.0 => {
                    vec![(coeff < 0.0, mode)]
                }
                Some(_) => term
                    .residue
                    .signed_terms(None)
                    .into_iter()
                    .map(|(negative, magnitude)| {
                        (negative, Expr::binary(magnitude, BinaryOp::Mul, mode.clone()))
                    })
                    .collect(),
                None => vec![(
                    false,
                    Expr::binary(term.residue.to_expr(), BinaryOp::Mul, mode),
                )],
            }
        });
        Expr::signed_sum(terms)
    }
}

impl fmt::Display for ClosedForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

fn exact_div(dividend: &ParamPoly, divisor: &ParamPoly) -> Result<ParamPoly, DerivationError> {
    dividend
        .checked_div(divisor)
        .ok_or_else(|| DerivationError::NonMonomialDivision {
            dividend: dividend.to_string(),
            divisor: divisor.to_string(),
        })
}

/// Inverts a strictly proper rational transform whose denominator is
/// `s^k R(s)` with `k <= 1` and `deg R <= 1`, i.e. at most two simple poles.
pub fn inverse_transform(transform: &Rational) -> Result<ClosedForm, DerivationError> {
    let transform = transform.normalized();
    if transform.is_zero() {
        return Ok(ClosedForm::default());
    }
    let Rational { num, den } = &transform;
    let describe = || transform.to_string();

    let den_degree = den.degree().unwrap_or(0);
    if num.degree().unwrap_or(0) >= den_degree {
        return Err(DerivationError::ImproperTransform {
            transform: describe(),
        });
    }

    let origin_multiplicity = den.lowest_power();
    if origin_multiplicity > 1 {
        return Err(DerivationError::RepeatedPole {
            transform: describe(),
        });
    }

    let mut poles = Vec::with_capacity(2);
    if origin_multiplicity == 1 {
        poles.push(ParamPoly::zero());
    }
    let remainder = den.shift_down(origin_multiplicity);
    match remainder.degree() {
        Some(0) => {}
        Some(1) => poles.push(exact_div(&-&remainder.coeff(0), &remainder.coeff(1))?),
        degree => {
            return Err(DerivationError::UnsupportedDenominator {
                transform: describe(),
                degree: degree.unwrap_or(0),
            })
        }
    }

    let den_slope = den.derivative();
    let mut terms = Vec::with_capacity(poles.len());
    for pole in poles {
        let slope = den_slope.eval_at(&pole);
        if slope.is_zero() {
            return Err(DerivationError::RepeatedPole {
                transform: describe(),
            });
        }
        let residue = exact_div(&num.eval_at(&pole), &slope)?;
        terms.push(ExpTerm {
            residue,
            rate: pole,
        });
    }

    Ok(ClosedForm::new(terms))
}

/// Everything produced by one derivation, shared read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicSolution {
    pub equation: TransformEquation,
    pub transform: Rational,
    pub closed_form: ClosedForm,
    pub expression: Expr,
}

impl SymbolicSolution {
    /// Independent variable name.
    pub fn variable(&self) -> &'static str {
        TIME_SYMBOL
    }

    /// Parameter names in slot order.
    pub fn parameters(&self) -> [&'static str; 4] {
        Param::symbols()
    }
}

impl fmt::Display for SymbolicSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v(t) = {}", self.expression)
    }
}

/// Derives `v(t; m, gamma, g, v0)` for an arbitrary transform equation.
pub fn derive(equation: TransformEquation) -> Result<SymbolicSolution, DerivationError> {
    let transform = equation.solve()?;
    debug!(%equation, %transform, "solved transform-domain equation");
    let closed_form = inverse_transform(&transform)?;
    let expression = closed_form.to_expr();
    debug!(%expression, "inverted transform");
    Ok(SymbolicSolution {
        equation,
        transform,
        closed_form,
        expression,
    })
}

/// Derives the linear-drag velocity law.
pub fn derive_velocity() -> Result<SymbolicSolution, DerivationError> {
    derive(TransformEquation::linear_drag())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::{parse, Compiler, VM};
    use crate::symbolic::Monomial;

    fn p(param: Param) -> ParamPoly {
        ParamPoly::param(param)
    }

    #[test]
    fn builds_the_drag_equation_from_transform_rules() {
        let equation = TransformEquation::linear_drag();
        assert_eq!(
            equation.to_string(),
            "m*s*V - m*v0 = -gamma*V + g*m/s"
        );
    }

    #[test]
    fn solves_for_the_transformed_velocity() {
        let solution = TransformEquation::linear_drag()
            .solve()
            .expect("linear equation has a unique solution");
        assert_eq!(solution.to_string(), "(m*s*v0 + g*m)/(m*s^2 + gamma*s)");
    }

    #[test]
    fn inverts_to_the_canonical_velocity_law() {
        let solution = derive_velocity().expect("derivation should succeed");
        assert_eq!(
            solution.expression.to_string(),
            "g*m/gamma + (v0 - g*m/gamma)*exp(-gamma*t/m)"
        );
        assert_eq!(solution.closed_form.terms().len(), 2);
        assert!(solution.closed_form.terms()[0].rate.is_zero());
        assert_eq!(solution.to_string(), format!("v(t) = {}", solution.expression));
        assert_eq!(solution.variable(), "t");
        assert_eq!(solution.parameters(), ["m", "gamma", "g", "v0"]);
    }

    #[test]
    fn canonical_expression_matches_hand_derived_formula() {
        let solution = derive_velocity().expect("derivation should succeed");
        let hand = parse("(m*g/gamma)*(1 - exp(-gamma*t/m)) + v0*exp(-gamma*t/m)")
            .expect("reference should parse");
        let reference = Compiler::new(&["t"], &Param::symbols())
            .compile(&hand)
            .expect("reference should compile");
        let mut stack = Vec::new();
        for values in [[80.0, 12.0, 9.81, 0.0], [2.0, 0.5, 1.6, -3.0], [70.0, 7.0, 9.81, 150.0]] {
            for t in [0.0, 0.3, 1.0, 7.5, 40.0] {
                let expected = VM::execute(&reference, &[t], &values, &mut stack)
                    .expect("reference should run");
                let actual = solution.closed_form.eval(t, &values);
                assert!(
                    (actual - expected).abs() < 1e-9,
                    "t={t}, values={values:?}: {actual} vs {expected}"
                );
            }
        }
    }

    #[test]
    fn degenerate_equation_has_no_unique_solution() {
        // m V = m V + g
        let m = p(Param::Mass);
        let lhs = LinearForm::unknown().scale(&m);
        let rhs = lhs.plus(&LinearForm::known(Rational::constant(p(Param::Gravity))));
        let equation = TransformEquation { lhs, rhs };
        let err = derive(equation).expect_err("coefficient of V cancels");
        assert_eq!(
            err,
            DerivationError::NoUniqueSolution {
                equation: "m*V = m*V + g".to_string()
            }
        );
    }

    #[test]
    fn rejects_transforms_outside_the_supported_family() {
        let s = SPoly::s();
        let one = ParamPoly::constant(1.0);

        let improper = Rational::new(s.clone(), s.clone()).expect("nonzero denominator");
        assert!(matches!(
            inverse_transform(&Rational::new(&s * &s, s.clone()).expect("nonzero")),
            Err(DerivationError::ImproperTransform { .. })
        ));
        // s/s normalizes to the constant 1, still improper.
        assert!(matches!(
            inverse_transform(&improper),
            Err(DerivationError::ImproperTransform { .. })
        ));

        let double_origin = Rational::new(SPoly::constant(one.clone()), &s * &s).expect("nonzero");
        assert!(matches!(
            inverse_transform(&double_origin),
            Err(DerivationError::RepeatedPole { .. })
        ));

        // 1 / (m s + gamma s + ... ) with a sum as leading coefficient
        let lead = &p(Param::Mass) + &p(Param::Drag);
        let den = SPoly::from_coeffs(vec![one.clone(), lead]);
        let shared = Rational::new(SPoly::constant(one.clone()), den).expect("nonzero");
        assert!(matches!(
            inverse_transform(&shared),
            Err(DerivationError::NonMonomialDivision { .. })
        ));

        let quadratic = SPoly::from_coeffs(vec![one.clone(), ParamPoly::zero(), one.clone()]);
        let oscillator = Rational::new(SPoly::constant(one), quadratic).expect("nonzero");
        assert!(matches!(
            inverse_transform(&oscillator),
            Err(DerivationError::UnsupportedDenominator { degree: 2, .. })
        ));
    }

    #[test]
    fn inverts_a_pure_exponential() {
        // 1 / (s + gamma/m) -> exp(-gamma*t/m)
        let rate = p(Param::Drag)
            .checked_div(&p(Param::Mass))
            .expect("monomial divisor");
        let den = SPoly::from_coeffs(vec![rate, ParamPoly::constant(1.0)]);
        let transform =
            Rational::new(SPoly::constant(ParamPoly::constant(1.0)), den).expect("nonzero");
        let closed = inverse_transform(&transform).expect("simple pole");
        assert_eq!(closed.to_string(), "exp(-gamma*t/m)");
        assert_eq!(
            closed.terms()[0].rate,
            ParamPoly::term(Monomial::of(Param::Drag) * Monomial::of(Param::Mass).recip(), -1.0)
        );
    }

    #[test]
    fn closed_form_merges_and_drops_modes() {
        let v0 = p(Param::InitialVelocity);
        let rate = -&p(Param::Drag);
        let closed = ClosedForm::new(vec![
            ExpTerm { residue: v0.clone(), rate: rate.clone() },
            ExpTerm { residue: -&v0, rate: rate.clone() },
            ExpTerm { residue: p(Param::Gravity), rate: ParamPoly::zero() },
        ]);
        assert_eq!(closed.to_string(), "g");
        assert_eq!(ClosedForm::default().to_string(), "0");
    }
}
