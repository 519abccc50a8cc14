use crate::{LinearProgram, LpError, LpSolver, Sign};
use clarabel::algebra::CscMatrix as EngineMatrix;
use clarabel::solver::{DefaultSettings, DefaultSolver, IPSolver, SolverStatus, SupportedConeT};
use log::*;
use nalgebra_sparse::{CooMatrix, CscMatrix};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Tunables handed to the Clarabel engine on every solve.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClarabelSettings {
    /// Maximum number of interior point iterations.
    pub max_iter: u32,
    /// Feasibility tolerance.
    pub tol_feas: f64,
    /// Absolute duality gap tolerance.
    pub tol_gap_abs: f64,
    /// Relative duality gap tolerance.
    pub tol_gap_rel: f64,
    /// Let the engine print its own progress to stdout.
    pub verbose: bool,
}

impl Default for ClarabelSettings {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tol_feas: 1e-8,
            tol_gap_abs: 1e-8,
            tol_gap_rel: 1e-8,
            verbose: false,
        }
    }
}

impl ClarabelSettings {
    fn engine_settings(&self) -> DefaultSettings<f64> {
        let mut settings = DefaultSettings::default();
        settings.max_iter = self.max_iter;
        settings.tol_feas = self.tol_feas;
        settings.tol_gap_abs = self.tol_gap_abs;
        settings.tol_gap_rel = self.tol_gap_rel;
        settings.verbose = self.verbose;
        settings
    }
}

/// A program rewritten into the only row shape the engine's cone form accepts: `a·x ≤ b`.
#[derive(Clone, Debug, Default)]
struct RowTable {
    parameter_count: usize,
    /// `(row, column, value)` of every constraint row coefficient.
    triplets: Vec<(usize, usize, f64)>,
    /// One entry per rewritten row, `None` for free rows.
    rhs: Vec<Option<f64>>,
    /// Variables whose lower and upper bound coincide.
    fixed: Vec<(usize, f64)>,
    /// Finite upper bounds `x ≤ u`.
    upper: Vec<(usize, f64)>,
    /// Finite lower bounds `x ≥ l`.
    lower: Vec<(usize, f64)>,
    /// The objective in minimization form.
    objective: Vec<f64>,
}

impl RowTable {
    fn new<P: LinearProgram>(program: &P) -> Self {
        let parameter_count = program.parameter_count();

        // Every source row maps onto one or two `≤` rows, each with a multiplier for its side.
        let mut rhs = Vec::with_capacity(program.row_count());
        let mut targets: Vec<[Option<(usize, f64)>; 2]> = Vec::with_capacity(program.row_count());
        for (&sign, &b) in program.signs().iter().zip(program.rhs()) {
            let mut push = |scale: f64, value: Option<f64>| {
                rhs.push(value);
                Some((rhs.len() - 1, scale))
            };
            let target = match sign {
                Sign::LessOrEqual => [push(1.0, Some(b)), None],
                Sign::GreaterOrEqual => [push(-1.0, Some(-b)), None],
                Sign::Equal => [push(1.0, Some(b)), push(-1.0, Some(-b))],
                Sign::Free => [push(1.0, None), None],
            };
            targets.push(target);
        }

        let mut triplets = Vec::new();
        program.for_each_coefficient(|row, column, value| {
            for &(target, scale) in targets[row].iter().flatten() {
                triplets.push((target, column, scale * value));
            }
        });

        let mut fixed = Vec::new();
        let mut upper = Vec::new();
        let mut lower = Vec::new();
        for variable in 0..parameter_count {
            let (l, u) = program.bounds().get(variable);
            if l == u {
                fixed.push((variable, l));
                continue;
            }
            if u.is_finite() {
                upper.push((variable, u));
            }
            if l.is_finite() {
                lower.push((variable, l));
            }
        }

        let sense = if program.minimize() { 1.0 } else { -1.0 };
        let objective = if program.objective().is_empty() {
            vec![0.0; parameter_count]
        } else {
            program.objective().iter().map(|&c| sense * c).collect()
        };

        Self {
            parameter_count,
            triplets,
            rhs,
            fixed,
            upper,
            lower,
            objective,
        }
    }

    /// Runs the engine and returns its status together with the primal solution.
    fn solve(&self, settings: &ClarabelSettings) -> (SolverStatus, Vec<f64>) {
        let n = self.parameter_count;

        // Engine rows: zero cone for fixed variables first, then the non-negative cone.
        let mut b = Vec::with_capacity(self.fixed.len() + self.rhs.len());
        let mut entries = Vec::with_capacity(self.triplets.len());
        for &(variable, value) in &self.fixed {
            entries.push((b.len(), variable, 1.0));
            b.push(value);
        }
        let zero_rows = b.len();

        // Free rows never reach the engine.
        let mut remap = vec![None; self.rhs.len()];
        for (row, &rhs) in self.rhs.iter().enumerate() {
            if let Some(rhs) = rhs {
                remap[row] = Some(b.len());
                b.push(rhs);
            }
        }
        entries.extend(
            self.triplets
                .iter()
                .filter_map(|&(row, column, value)| remap[row].map(|row| (row, column, value))),
        );
        for &(variable, u) in &self.upper {
            entries.push((b.len(), variable, 1.0));
            b.push(u);
        }
        for &(variable, l) in &self.lower {
            entries.push((b.len(), variable, -1.0));
            b.push(-l);
        }
        let m = b.len();

        let mut coo = CooMatrix::new(m, n);
        for (row, column, value) in entries {
            coo.push(row, column, value);
        }
        let csc = CscMatrix::from(&coo);
        let a = EngineMatrix::new(
            m,
            n,
            csc.col_offsets().to_vec(),
            csc.row_indices().to_vec(),
            csc.values().to_vec(),
        );
        let p = EngineMatrix::new(n, n, vec![0; n + 1], Vec::new(), Vec::new());

        let mut cones = Vec::with_capacity(2);
        if zero_rows > 0 {
            cones.push(SupportedConeT::ZeroConeT(zero_rows));
        }
        if m > zero_rows {
            cones.push(SupportedConeT::NonnegativeConeT(m - zero_rows));
        }

        trace!(
            "clarabel: {} variables, {} fixed, {} inequality rows",
            n,
            zero_rows,
            m - zero_rows
        );
        let mut solver =
            DefaultSolver::new(&p, &self.objective, &a, &b, &cones, settings.engine_settings());
        solver.solve();
        let status = solver.solution.status.clone();
        (status, std::mem::take(&mut solver.solution.x))
    }
}

/// An [`LpSolver`] backed by the [Clarabel](https://clarabel.org) interior point engine.
///
/// Clarabel expects constraints in the conic form `A x + s = b` with `s` in a cone, so every
/// row is rewritten into `a·x ≤ b` before it reaches the engine:
///
/// * `≤` rows are kept as they are,
/// * `≥` rows have both sides negated,
/// * `=` rows become two rows, `a·x ≤ b` and `-a·x ≤ -b`,
/// * free rows are kept in the row table without a right-hand side and skipped when the
///   engine problem is assembled.
///
/// Finite variable bounds are passed as additional rows, with variables whose bounds coincide
/// pinned through a zero cone.
#[derive(Clone, Debug, Default)]
pub struct ClarabelSolver {
    settings: ClarabelSettings,
    table: Option<RowTable>,
    solution: Option<Vec<f64>>,
}

impl ClarabelSolver {
    /// Creates a solver with default settings.
    ///
    /// Same as calling [`Default::default`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a solver with the given engine settings.
    pub fn with_settings(settings: ClarabelSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &ClarabelSettings {
        &self.settings
    }

    /// The number of constraint rows after rewriting, bound rows excluded.
    ///
    /// Each equality row of the loaded program counts twice. Returns `0` before
    /// [`LpSolver::setup`].
    pub fn row_count(&self) -> usize {
        self.table.as_ref().map_or(0, |table| table.rhs.len())
    }
}

impl LpSolver for ClarabelSolver {
    fn setup<P: LinearProgram>(&mut self, program: &P) -> Result<(), LpError> {
        self.table = None;
        self.solution = None;
        program.validate()?;
        self.table = Some(RowTable::new(program));
        Ok(())
    }

    fn solve(&mut self) -> bool {
        self.solution = None;
        let table = match &self.table {
            Some(table) => table,
            None => {
                debug!("clarabel: solve called without a loaded program");
                return false;
            }
        };

        let (status, x) = table.solve(&self.settings);
        match status {
            SolverStatus::Solved => {
                self.solution = Some(x);
                true
            }
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                trace!("clarabel: infeasible");
                false
            }
            status => {
                debug!("clarabel: stopped with status {:?}", status);
                false
            }
        }
    }

    fn solution(&self) -> Result<&[f64], LpError> {
        self.solution.as_deref().ok_or(LpError::NotSolved)
    }
}
