use num_traits::{FromPrimitive, Num};
use std::fmt::Debug;
use std::ops::Neg;

/// A trait for types the equation VM can evaluate on.
/// Implemented for plain `f64` and for `Dual` so compiled expressions can be
/// differentiated with respect to time without a second code path.
pub trait Scalar: Num + Neg<Output = Self> + FromPrimitive + Copy + Debug + 'static {
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn powf(self, exponent: Self) -> Self;
    /// Real part, dropping any infinitesimal component.
    fn value(self) -> f64;
}

impl Scalar for f64 {
    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn powf(self, exponent: Self) -> Self {
        f64::powf(self, exponent)
    }

    fn value(self) -> f64 {
        self
    }
}

/// Represents a first-order system `dx/dt = f(t, x)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}
