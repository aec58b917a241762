//! Exact algebra over the physical parameters of the linear-drag model.
//!
//! - `ParamPoly`: Laurent polynomials in `m`, `gamma`, `g`, `v0` (negative exponents allowed,
//!   so dividing by a single parameter stays inside the representation).
//! - `SPoly`: polynomials in the transform variable `s` with `ParamPoly` coefficients.
//! - `Rational`: quotients of two `SPoly`.
//!
//! Like terms are collected after every operation and exact zeros are dropped, so
//! `is_zero` is a structural test rather than a numeric tolerance.

use crate::equation_engine::{BinaryOp, Expr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// The four physical parameters of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Param {
    Mass,
    Drag,
    Gravity,
    InitialVelocity,
}

impl Param {
    pub const ALL: [Param; 4] = [
        Param::Mass,
        Param::Drag,
        Param::Gravity,
        Param::InitialVelocity,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Param::Mass => "m",
            Param::Drag => "gamma",
            Param::Gravity => "g",
            Param::InitialVelocity => "v0",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Symbol names in slot order, as the compiler expects them.
    pub fn symbols() -> [&'static str; 4] {
        Param::ALL.map(Param::symbol)
    }
}

/// Parameter values in `Param::index` order.
pub type ParamValues = [f64; 4];

/// A product of integer powers of the parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Monomial([i32; 4]);

impl Monomial {
    pub const ONE: Monomial = Monomial([0; 4]);

    pub fn of(param: Param) -> Self {
        Self::power(param, 1)
    }

    pub fn power(param: Param, exponent: i32) -> Self {
        let mut exps = [0; 4];
        exps[param.index()] = exponent;
        Monomial(exps)
    }

    pub fn exponent(&self, param: Param) -> i32 {
        self.0[param.index()]
    }

    pub fn is_one(&self) -> bool {
        self.0 == [0; 4]
    }

    pub fn recip(self) -> Self {
        Monomial(self.0.map(|e| -e))
    }

    pub fn eval(&self, values: &ParamValues) -> f64 {
        self.0
            .iter()
            .zip(values)
            .filter(|(exp, _)| **exp != 0)
            .map(|(exp, value)| value.powi(*exp))
            .product()
    }
}

impl Mul for Monomial {
    type Output = Monomial;
    fn mul(self, rhs: Monomial) -> Monomial {
        let mut exps = self.0;
        for (e, r) in exps.iter_mut().zip(rhs.0) {
            *e += r;
        }
        Monomial(exps)
    }
}

/// A Laurent polynomial in the parameters with `f64` coefficients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamPoly {
    terms: BTreeMap<Monomial, f64>,
}

impl ParamPoly {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self::term(Monomial::ONE, value)
    }

    pub fn param(param: Param) -> Self {
        Self::term(Monomial::of(param), 1.0)
    }

    pub fn term(monomial: Monomial, coeff: f64) -> Self {
        let mut poly = Self::zero();
        poly.accumulate(monomial, coeff);
        poly
    }

    fn accumulate(&mut self, monomial: Monomial, coeff: f64) {
        let entry = self.terms.entry(monomial).or_insert(0.0);
        *entry += coeff;
        if *entry == 0.0 {
            self.terms.remove(&monomial);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (Monomial, f64)> + '_ {
        self.terms.iter().map(|(m, c)| (*m, *c))
    }

    /// The single `(monomial, coefficient)` pair, if there is exactly one.
    pub fn as_monomial(&self) -> Option<(Monomial, f64)> {
        let mut iter = self.terms();
        let first = iter.next()?;
        match iter.next() {
            None => Some(first),
            Some(_) => None,
        }
    }

    /// Smallest monomial, used as a stable sort key.
    pub fn leading_monomial(&self) -> Option<Monomial> {
        self.terms.keys().next().copied()
    }

    pub fn scale(&self, factor: f64) -> Self {
        let mut out = Self::zero();
        for (m, c) in self.terms() {
            out.accumulate(m, c * factor);
        }
        out
    }

    /// Exact division by a single-monomial divisor. `None` if the divisor has
    /// zero or several terms.
    pub fn checked_div(&self, divisor: &ParamPoly) -> Option<ParamPoly> {
        let (monomial, coeff) = divisor.as_monomial()?;
        let inverse = monomial.recip();
        let mut out = Self::zero();
        for (m, c) in self.terms() {
            out.accumulate(m * inverse, c / coeff);
        }
        Some(out)
    }

    pub fn eval(&self, values: &ParamValues) -> f64 {
        self.terms().map(|(m, c)| c * m.eval(values)).sum()
    }

    /// Magnitude of `coeff * monomial * extra` with its sign split off.
    /// Numerator factors print in alphabetical order, followed by a single
    /// division by the denominator factors.
    fn monomial_expr(monomial: Monomial, coeff: f64, extra: Option<(&str, i32)>) -> (bool, Expr) {
        let mut numerator: Vec<(&str, i32)> = Vec::new();
        let mut denominator: Vec<(&str, i32)> = Vec::new();
        for param in Param::ALL {
            let exp = monomial.exponent(param);
            if exp > 0 {
                numerator.push((param.symbol(), exp));
            } else if exp < 0 {
                denominator.push((param.symbol(), -exp));
            }
        }
        numerator.extend(extra);
        numerator.sort_unstable();
        denominator.sort_unstable();

        let magnitude = coeff.abs();
        let mut factors: Vec<Expr> = Vec::new();
        if magnitude != 1.0 || numerator.is_empty() {
            factors.push(Expr::Number(magnitude));
        }
        factors.extend(numerator.into_iter().map(power_expr));
        let mut expr = Expr::product(factors);
        if !denominator.is_empty() {
            let den = Expr::product(denominator.into_iter().map(power_expr));
            expr = Expr::binary(expr, BinaryOp::Div, den);
        }
        (coeff < 0.0, expr)
    }

    /// Signed magnitudes of each term of `self * extra^k`.
    pub fn signed_terms(&self, extra: Option<(&str, i32)>) -> Vec<(bool, Expr)> {
        self.terms()
            .map(|(m, c)| Self::monomial_expr(m, c, extra))
            .collect()
    }

    /// Expression for `self * extra^k`.
    pub fn to_expr_times(&self, extra: Option<(&str, i32)>) -> Expr {
        Expr::signed_sum(self.signed_terms(extra))
    }

    pub fn to_expr(&self) -> Expr {
        self.to_expr_times(None)
    }
}

fn power_expr((name, exp): (&str, i32)) -> Expr {
    if exp == 1 {
        Expr::var(name)
    } else {
        Expr::binary(Expr::var(name), BinaryOp::Pow, Expr::Number(exp as f64))
    }
}

impl fmt::Display for ParamPoly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

impl Add for &ParamPoly {
    type Output = ParamPoly;
    fn add(self, rhs: &ParamPoly) -> ParamPoly {
        let mut out = self.clone();
        for (m, c) in rhs.terms() {
            out.accumulate(m, c);
        }
        out
    }
}

impl Sub for &ParamPoly {
    type Output = ParamPoly;
    fn sub(self, rhs: &ParamPoly) -> ParamPoly {
        let mut out = self.clone();
        for (m, c) in rhs.terms() {
            out.accumulate(m, -c);
        }
        out
    }
}

impl Mul for &ParamPoly {
    type Output = ParamPoly;
    fn mul(self, rhs: &ParamPoly) -> ParamPoly {
        let mut out = ParamPoly::zero();
        for (ma, ca) in self.terms() {
            for (mb, cb) in rhs.terms() {
                out.accumulate(ma * mb, ca * cb);
            }
        }
        out
    }
}

impl Neg for &ParamPoly {
    type Output = ParamPoly;
    fn neg(self) -> ParamPoly {
        self.scale(-1.0)
    }
}

/// A polynomial in the transform variable `s`; `coeffs[k]` multiplies `s^k`.
/// Trailing zero coefficients are always trimmed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SPoly {
    coeffs: Vec<ParamPoly>,
}

impl SPoly {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_coeffs(coeffs: Vec<ParamPoly>) -> Self {
        let mut poly = Self { coeffs };
        poly.trim();
        poly
    }

    pub fn constant(value: ParamPoly) -> Self {
        Self::from_coeffs(vec![value])
    }

    /// The transform variable `s` itself.
    pub fn s() -> Self {
        Self::from_coeffs(vec![ParamPoly::zero(), ParamPoly::constant(1.0)])
    }

    fn trim(&mut self) {
        while self.coeffs.last().is_some_and(ParamPoly::is_zero) {
            self.coeffs.pop();
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        self.coeffs.len().checked_sub(1)
    }

    pub fn coeff(&self, power: usize) -> ParamPoly {
        self.coeffs.get(power).cloned().unwrap_or_default()
    }

    /// Multiplicity of the root at `s = 0`.
    pub fn lowest_power(&self) -> usize {
        self.coeffs.iter().take_while(|c| c.is_zero()).count()
    }

    /// Divides by `s^k`; the caller guarantees the low coefficients are zero.
    pub fn shift_down(&self, k: usize) -> Self {
        Self::from_coeffs(self.coeffs.iter().skip(k).cloned().collect())
    }

    pub fn scale(&self, factor: &ParamPoly) -> Self {
        Self::from_coeffs(self.coeffs.iter().map(|c| c * factor).collect())
    }

    pub fn derivative(&self) -> Self {
        Self::from_coeffs(
            self.coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(k, c)| c.scale(k as f64))
                .collect(),
        )
    }

    /// Horner evaluation at a symbolic point.
    pub fn eval_at(&self, point: &ParamPoly) -> ParamPoly {
        self.coeffs
            .iter()
            .rev()
            .fold(ParamPoly::zero(), |acc, c| &(&acc * point) + c)
    }

    /// Signed terms, highest power of `s` first. Single-monomial coefficients
    /// absorb the power of `s`; sums are parenthesized in front of it.
    pub fn signed_terms(&self) -> Vec<(bool, Expr)> {
        self.coeffs
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, c)| !c.is_zero())
            .flat_map(|(k, c)| {
                if k == 0 || c.as_monomial().is_some() {
                    c.signed_terms((k > 0).then_some(("s", k as i32)))
                } else {
                    let s_factor = power_expr(("s", k as i32));
                    vec![(false, Expr::binary(c.to_expr(), BinaryOp::Mul, s_factor))]
                }
            })
            .collect()
    }

    pub fn to_expr(&self) -> Expr {
        Expr::signed_sum(self.signed_terms())
    }
}

impl fmt::Display for SPoly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

impl Add for &SPoly {
    type Output = SPoly;
    fn add(self, rhs: &SPoly) -> SPoly {
        let len = self.coeffs.len().max(rhs.coeffs.len());
        SPoly::from_coeffs((0..len).map(|k| &self.coeff(k) + &rhs.coeff(k)).collect())
    }
}

impl Sub for &SPoly {
    type Output = SPoly;
    fn sub(self, rhs: &SPoly) -> SPoly {
        let len = self.coeffs.len().max(rhs.coeffs.len());
        SPoly::from_coeffs((0..len).map(|k| &self.coeff(k) - &rhs.coeff(k)).collect())
    }
}

impl Mul for &SPoly {
    type Output = SPoly;
    fn mul(self, rhs: &SPoly) -> SPoly {
        if self.is_zero() || rhs.is_zero() {
            return SPoly::zero();
        }
        let mut coeffs = vec![ParamPoly::zero(); self.coeffs.len() + rhs.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in rhs.coeffs.iter().enumerate() {
                coeffs[i + j] = &coeffs[i + j] + &(a * b);
            }
        }
        SPoly::from_coeffs(coeffs)
    }
}

/// A rational function `num(s) / den(s)`. The denominator is never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Rational {
    pub num: SPoly,
    pub den: SPoly,
}

impl Rational {
    pub fn zero() -> Self {
        SPoly::zero().into()
    }

    /// `None` if `den` is the zero polynomial.
    pub fn new(num: SPoly, den: SPoly) -> Option<Self> {
        if den.is_zero() {
            None
        } else {
            Some(Self { num, den })
        }
    }

    pub fn constant(value: ParamPoly) -> Self {
        SPoly::constant(value).into()
    }

    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    /// Division; `None` when `rhs` is zero.
    pub fn checked_div(&self, rhs: &Rational) -> Option<Rational> {
        Rational::new(&self.num * &rhs.den, &self.den * &rhs.num)
    }

    /// Cancels the common power of `s` shared by numerator and denominator.
    pub fn normalized(&self) -> Rational {
        if self.num.is_zero() {
            return Rational::zero();
        }
        let k = self.num.lowest_power().min(self.den.lowest_power());
        Rational {
            num: self.num.shift_down(k),
            den: self.den.shift_down(k),
        }
    }

    fn has_unit_denominator(&self) -> bool {
        self.den == SPoly::constant(ParamPoly::constant(1.0))
    }

    /// Signed terms of the printed form; a quotient with a single-term
    /// numerator keeps its sign outside the fraction.
    pub fn signed_terms(&self) -> Vec<(bool, Expr)> {
        if self.has_unit_denominator() {
            return self.num.signed_terms();
        }
        let mut num_terms = self.num.signed_terms();
        if num_terms.len() == 1 {
            let (negative, magnitude) = num_terms.remove(0);
            return vec![(
                negative,
                Expr::binary(magnitude, BinaryOp::Div, self.den.to_expr()),
            )];
        }
        vec![(false, self.to_expr())]
    }

    pub fn to_expr(&self) -> Expr {
        if self.has_unit_denominator() {
            return self.num.to_expr();
        }
        if self.num.signed_terms().len() == 1 {
            return Expr::signed_sum(self.signed_terms());
        }
        Expr::binary(self.num.to_expr(), BinaryOp::Div, self.den.to_expr())
    }
}

impl From<SPoly> for Rational {
    fn from(num: SPoly) -> Self {
        Rational {
            num,
            den: SPoly::constant(ParamPoly::constant(1.0)),
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

impl Add for &Rational {
    type Output = Rational;
    fn add(self, rhs: &Rational) -> Rational {
        if self.den == rhs.den {
            return Rational {
                num: &self.num + &rhs.num,
                den: self.den.clone(),
            };
        }
        Rational {
            num: &(&self.num * &rhs.den) + &(&rhs.num * &self.den),
            den: &self.den * &rhs.den,
        }
    }
}

impl Neg for &Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        Rational {
            num: self.num.scale(&ParamPoly::constant(-1.0)),
            den: self.den.clone(),
        }
    }
}

impl Sub for &Rational {
    type Output = Rational;
    fn sub(self, rhs: &Rational) -> Rational {
        self + &(-rhs)
    }
}

impl Mul for &Rational {
    type Output = Rational;
    fn mul(self, rhs: &Rational) -> Rational {
        Rational {
            num: &self.num * &rhs.num,
            den: &self.den * &rhs.den,
        }
    }
}
