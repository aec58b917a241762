pub mod autodiff;
pub mod equation_engine;
pub mod evaluator;
pub mod laplace;
pub mod model;
pub mod simulation;
pub mod symbolic;
/// The `dragfall_core` crate derives and evaluates the velocity of a body
/// falling under gravity with drag proportional to velocity.
///
/// Key components:
/// - **Symbolic**: Laurent polynomials in the physical parameters and rational functions in `s`.
/// - **Laplace**: Builds `m dv/dt = m g - gamma v` in the transform domain, solves for `V(s)` and inverts it by residues.
/// - **Equation Engine**: Expression AST, parser and a bytecode VM generic over `Scalar`.
/// - **Evaluator**: Vectorized evaluation of the derived law over a time grid.
/// - **Verify**: Substitutes the law back into the equation of motion using Dual numbers.
pub mod traits;
pub mod verify;

pub use evaluator::VelocityEvaluator;
pub use laplace::{derive_velocity, DerivationError, SymbolicSolution};
pub use model::{EvaluationResult, InputError, PhysicalParams, RunConfig, Scenario, TimeGrid};
pub use simulation::{Simulation, SimulationOutput};
