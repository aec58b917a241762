use crate::evaluator::VelocityEvaluator;
use crate::laplace::{derive_velocity, DerivationError, SymbolicSolution};
use crate::model::{EvaluationResult, InputError, RunConfig, Scenario, TimeGrid};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result of a complete batch run: one grid shared by every scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub grid: TimeGrid,
    pub results: Vec<EvaluationResult>,
}

/// Derives the velocity law once and evaluates any number of scenarios
/// against it.
#[derive(Debug, Clone)]
pub struct Simulation {
    solution: SymbolicSolution,
    evaluator: VelocityEvaluator,
}

impl Simulation {
    pub fn new() -> Result<Self, DerivationError> {
        Self::from_solution(derive_velocity()?)
    }

    pub fn from_solution(solution: SymbolicSolution) -> Result<Self, DerivationError> {
        let evaluator = VelocityEvaluator::compile(&solution)?;
        info!(expression = %solution.expression, "velocity law ready");
        Ok(Self {
            solution,
            evaluator,
        })
    }

    pub fn solution(&self) -> &SymbolicSolution {
        &self.solution
    }

    pub fn evaluator(&self) -> &VelocityEvaluator {
        &self.evaluator
    }

    pub fn evaluate_scenario(&self, grid: &TimeGrid, scenario: &Scenario) -> EvaluationResult {
        let velocities = self.evaluator.evaluate(grid.times(), &scenario.params);
        let terminal_velocity = scenario.params.terminal_velocity();
        let final_velocity = velocities.last().copied().unwrap_or(terminal_velocity);
        let deviation = (final_velocity - terminal_velocity).abs();
        debug!(
            label = %scenario.label,
            terminal_velocity,
            final_velocity,
            deviation,
            "evaluated scenario"
        );
        EvaluationResult {
            label: scenario.label.clone(),
            params: scenario.params,
            velocities,
            terminal_velocity,
            final_velocity,
            deviation,
        }
    }

    /// Evaluates every scenario of `config` in input order. Scenarios never
    /// influence one another.
    pub fn run_scenarios(&self, config: &RunConfig) -> Result<SimulationOutput, InputError> {
        if config.scenarios.is_empty() {
            return Err(InputError::NoScenarios);
        }
        let grid = config.time_grid()?;
        info!(
            t_max = grid.t_max(),
            samples = grid.len(),
            scenarios = config.scenarios.len(),
            "running scenarios"
        );
        let results = config
            .scenarios
            .iter()
            .map(|scenario| self.evaluate_scenario(&grid, scenario))
            .collect();
        Ok(SimulationOutput { grid, results })
    }
}
