use crate::ConstraintBuilder;
use cv_linprog::{LpError, LpSolver};
use log::*;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Binary search for the smallest admissible error `gamma` whose linear program is feasible.
///
/// The search keeps an interval `[lower, upper]`. Each step solves the program built for the
/// midpoint. A feasible midpoint becomes the new `upper` and its solution is remembered, an
/// infeasible one becomes the new `lower`. The search stops after `max_iterations` steps or
/// once the interval is no wider than `epsilon`.
///
/// Because feasibility is monotone in `gamma` for every [`ConstraintBuilder`] in this crate,
/// the result is the global optimum of the maximum error up to the width of the final
/// interval. If the optimum lies above the initial `upper`, no step is feasible and the search
/// reports no solution.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bisection {
    lower: f64,
    upper: f64,
    epsilon: f64,
    max_iterations: usize,
}

impl Bisection {
    /// Creates a `Bisection` with default values.
    ///
    /// Same as calling [`Default::default`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the initial search interval.
    ///
    /// Default is `[0.0, 1.0]`.
    #[must_use]
    pub fn bounds(self, lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            ..self
        }
    }

    /// Set the interval width at which the search stops.
    ///
    /// Default is `1e-8`.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// Set the maximum number of linear programs solved by one search.
    ///
    /// Default is `20`.
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Iterates over the steps of a search, one solved linear program per item.
    ///
    /// The iterator ends when the search terminates or after the first error.
    pub fn steps<'a, B, S>(&self, builder: &'a B, solver: &'a mut S) -> BisectionSteps<'a, B, S>
    where
        B: ConstraintBuilder,
        S: LpSolver,
    {
        BisectionSteps {
            config: *self,
            builder,
            solver,
            lower: self.lower,
            upper: self.upper,
            iteration: 0,
            best: None,
            failed: false,
        }
    }

    /// Runs a search to completion.
    ///
    /// Returns `None` if no step was feasible.
    pub fn solve<B, S>(
        &self,
        builder: &B,
        solver: &mut S,
    ) -> Result<Option<BisectionSolution>, LpError>
    where
        B: ConstraintBuilder,
        S: LpSolver,
    {
        let mut steps = self.steps(builder, solver);
        for step in &mut steps {
            step?;
        }
        let solution = steps.into_solution();
        match &solution {
            Some(solution) => debug!(
                "bisection: gamma {:e} after {} iterations ({} unknowns)",
                solution.gamma,
                solution.iterations,
                builder.parameter_count()
            ),
            None => debug!(
                "bisection: nothing feasible in [{:e}, {:e}]",
                self.lower, self.upper
            ),
        }
        Ok(solution)
    }

    /// Solves the program for one fixed `gamma`, without any search.
    pub fn solve_at<B, S>(
        &self,
        builder: &B,
        solver: &mut S,
        gamma: f64,
    ) -> Result<Option<BisectionSolution>, LpError>
    where
        B: ConstraintBuilder,
        S: LpSolver,
    {
        let parameters = solve_once(builder, solver, gamma)?;
        trace!("bisection: fixed gamma {:e} feasible: {}", gamma, parameters.is_some());
        Ok(parameters.map(|parameters| BisectionSolution {
            gamma,
            parameters,
            iterations: 1,
        }))
    }
}

impl Default for Bisection {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
            epsilon: 1e-8,
            max_iterations: 20,
        }
    }
}

fn solve_once<B, S>(builder: &B, solver: &mut S, gamma: f64) -> Result<Option<Vec<f64>>, LpError>
where
    B: ConstraintBuilder,
    S: LpSolver,
{
    solver.setup(&builder.build(gamma))?;
    if !solver.solve() {
        return Ok(None);
    }
    let parameters = solver.solution()?.to_vec();
    debug_assert_eq!(parameters.len(), builder.parameter_count());
    Ok(Some(parameters))
}

/// One solved linear program of a search.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BisectionStep {
    /// Zero-based index of the step.
    pub iteration: usize,
    /// The admissible error that was tested.
    pub gamma: f64,
    /// Whether the program for `gamma` was feasible.
    pub feasible: bool,
    /// Lower end of the interval after this step.
    pub lower: f64,
    /// Upper end of the interval after this step.
    pub upper: f64,
}

/// The result of a successful search.
#[derive(Clone, Debug, PartialEq)]
pub struct BisectionSolution {
    /// The smallest admissible error proven feasible.
    pub gamma: f64,
    /// The solution of the program built for `gamma`.
    pub parameters: Vec<f64>,
    /// The number of programs solved.
    pub iterations: usize,
}

/// The iterator returned by [`Bisection::steps`].
pub struct BisectionSteps<'a, B, S> {
    config: Bisection,
    builder: &'a B,
    solver: &'a mut S,
    lower: f64,
    upper: f64,
    iteration: usize,
    best: Option<(f64, Vec<f64>)>,
    failed: bool,
}

impl<'a, B, S> BisectionSteps<'a, B, S> {
    /// The current search interval.
    pub fn interval(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }

    /// The best solution found so far.
    pub fn into_solution(self) -> Option<BisectionSolution> {
        let iterations = self.iteration;
        self.best.map(|(gamma, parameters)| BisectionSolution {
            gamma,
            parameters,
            iterations,
        })
    }
}

impl<'a, B, S> Iterator for BisectionSteps<'a, B, S>
where
    B: ConstraintBuilder,
    S: LpSolver,
{
    type Item = Result<BisectionStep, LpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed
            || self.iteration >= self.config.max_iterations
            || self.upper - self.lower <= self.config.epsilon
        {
            return None;
        }

        let gamma = 0.5 * (self.lower + self.upper);
        let parameters = match solve_once(self.builder, self.solver, gamma) {
            Ok(parameters) => parameters,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        let feasible = parameters.is_some();
        match parameters {
            Some(parameters) => {
                self.upper = gamma;
                self.best = Some((gamma, parameters));
            }
            None => self.lower = gamma,
        }

        let step = BisectionStep {
            iteration: self.iteration,
            gamma,
            feasible,
            lower: self.lower,
            upper: self.upper,
        };
        self.iteration += 1;
        trace!(
            "bisection: step {} gamma {:e} feasible: {} interval [{:e}, {:e}]",
            step.iteration,
            step.gamma,
            step.feasible,
            step.lower,
            step.upper
        );
        Some(Ok(step))
    }
}
