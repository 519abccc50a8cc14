use crate::LpError;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The relation imposed by one constraint row between `a·x` and its right-hand side.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Sign {
    /// `a·x ≤ b`
    LessOrEqual,
    /// `a·x ≥ b`
    GreaterOrEqual,
    /// `a·x = b`
    Equal,
    /// The row is carried along but restricts nothing.
    Free,
}

impl Sign {
    /// How far `lhs` lies outside of the region allowed by `lhs <sign> rhs`.
    ///
    /// This is `0.0` when the relation holds.
    pub fn violation(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Sign::LessOrEqual => (lhs - rhs).max(0.0),
            Sign::GreaterOrEqual => (rhs - lhs).max(0.0),
            Sign::Equal => (lhs - rhs).abs(),
            Sign::Free => 0.0,
        }
    }
}

/// Lower and upper bounds of the variables of a linear program.
///
/// Infinite values are allowed and mean the variable is unbounded on that side.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum Bounds {
    /// One `(lower, upper)` pair broadcast to every variable.
    Shared(f64, f64),
    /// One `(lower, upper)` pair per variable.
    PerVariable(Vec<(f64, f64)>),
}

impl Bounds {
    /// Every variable may take any value.
    pub fn free() -> Self {
        Bounds::Shared(f64::NEG_INFINITY, f64::INFINITY)
    }

    /// The `(lower, upper)` bounds of `variable`.
    ///
    /// Panics if the bounds are per variable and `variable` is out of range.
    pub fn get(&self, variable: usize) -> (f64, f64) {
        match self {
            Bounds::Shared(lower, upper) => (*lower, *upper),
            Bounds::PerVariable(bounds) => bounds[variable],
        }
    }

    fn check(&self, parameter_count: usize) -> Result<(), LpError> {
        match self {
            Bounds::PerVariable(bounds) if bounds.len() != parameter_count => {
                Err(LpError::DimensionMismatch {
                    what: "bounds",
                    expected: parameter_count,
                    actual: bounds.len(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::free()
    }
}

/// Read access to a linear program, regardless of how its constraint matrix is stored.
pub trait LinearProgram {
    /// The number of variables (columns of the constraint matrix).
    fn parameter_count(&self) -> usize;

    /// The `(rows, columns)` of the stored constraint matrix.
    fn matrix_shape(&self) -> (usize, usize);

    /// The right-hand side, one entry per row.
    fn rhs(&self) -> &[f64];

    /// The relation of every row.
    fn signs(&self) -> &[Sign];

    /// The bounds of the variables.
    fn bounds(&self) -> &Bounds;

    /// The objective coefficients. Empty when the program is a pure feasibility problem.
    fn objective(&self) -> &[f64];

    /// Whether the objective is minimized (`true`) or maximized (`false`).
    fn minimize(&self) -> bool;

    /// Calls `f(row, column, value)` for every stored coefficient of the constraint matrix.
    ///
    /// The same `(row, column)` is visited at most once.
    fn for_each_coefficient<F: FnMut(usize, usize, f64)>(&self, f: F);

    /// The number of constraint rows.
    fn row_count(&self) -> usize {
        self.matrix_shape().0
    }

    /// Checks that every part of the program agrees on the number of rows and variables, and
    /// that every row other than a free one has a finite right-hand side.
    fn validate(&self) -> Result<(), LpError> {
        let (rows, columns) = self.matrix_shape();
        let parameter_count = self.parameter_count();
        if columns != parameter_count {
            return Err(LpError::DimensionMismatch {
                what: "constraint matrix columns",
                expected: parameter_count,
                actual: columns,
            });
        }
        if self.rhs().len() != rows {
            return Err(LpError::DimensionMismatch {
                what: "right-hand side",
                expected: rows,
                actual: self.rhs().len(),
            });
        }
        if self.signs().len() != rows {
            return Err(LpError::DimensionMismatch {
                what: "signs",
                expected: rows,
                actual: self.signs().len(),
            });
        }
        let constrained = self.signs().iter().zip(self.rhs());
        for (row, (&sign, &rhs)) in constrained.enumerate() {
            if sign != Sign::Free && !rhs.is_finite() {
                return Err(LpError::NonFiniteRhs { row, rhs });
            }
        }
        let objective = self.objective().len();
        if objective != 0 && objective != parameter_count {
            return Err(LpError::DimensionMismatch {
                what: "objective",
                expected: parameter_count,
                actual: objective,
            });
        }
        self.bounds().check(parameter_count)
    }

    /// Evaluates `A x`.
    fn row_values(&self, x: &[f64]) -> Vec<f64> {
        let mut values = vec![0.0; self.row_count()];
        self.for_each_coefficient(|row, column, value| values[row] += value * x[column]);
        values
    }

    /// The largest amount by which `x` violates a row or a bound of the program.
    ///
    /// A value of `0.0` means `x` is feasible.
    fn max_violation(&self, x: &[f64]) -> f64 {
        let rows = self
            .row_values(x)
            .into_iter()
            .zip(self.rhs())
            .zip(self.signs())
            .map(|((lhs, &rhs), sign)| sign.violation(lhs, rhs));
        let bounds = x.iter().enumerate().map(|(variable, &value)| {
            let (lower, upper) = self.bounds().get(variable);
            (lower - value).max(value - upper).max(0.0)
        });
        rows.chain(bounds).fold(0.0, f64::max)
    }
}

/// A linear program with a dense constraint matrix.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct LinearConstraints {
    pub parameter_count: usize,
    pub constraint_matrix: DMatrix<f64>,
    pub rhs: Vec<f64>,
    pub signs: Vec<Sign>,
    pub bounds: Bounds,
    pub objective_coeffs: Vec<f64>,
    pub minimize: bool,
}

impl LinearConstraints {
    /// A feasibility problem over the columns of `constraint_matrix` with free variables.
    pub fn new(constraint_matrix: DMatrix<f64>, rhs: Vec<f64>, signs: Vec<Sign>) -> Self {
        Self {
            parameter_count: constraint_matrix.ncols(),
            constraint_matrix,
            rhs,
            signs,
            bounds: Bounds::free(),
            objective_coeffs: Vec::new(),
            minimize: true,
        }
    }

    #[must_use]
    pub fn with_bounds(self, bounds: Bounds) -> Self {
        Self { bounds, ..self }
    }

    #[must_use]
    pub fn with_objective(self, objective_coeffs: Vec<f64>, minimize: bool) -> Self {
        Self {
            objective_coeffs,
            minimize,
            ..self
        }
    }
}

impl LinearProgram for LinearConstraints {
    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn matrix_shape(&self) -> (usize, usize) {
        self.constraint_matrix.shape()
    }

    fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    fn signs(&self) -> &[Sign] {
        &self.signs
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn objective(&self) -> &[f64] {
        &self.objective_coeffs
    }

    fn minimize(&self) -> bool {
        self.minimize
    }

    fn for_each_coefficient<F: FnMut(usize, usize, f64)>(&self, mut f: F) {
        for (column, values) in self.constraint_matrix.column_iter().enumerate() {
            for (row, &value) in values.iter().enumerate() {
                if value != 0.0 {
                    f(row, column, value);
                }
            }
        }
    }
}

/// A linear program with a compressed sparse row constraint matrix.
///
/// With `serde-serialize`, the matrix is written as `(row, column, value)` triplets.
#[cfg_attr(
    feature = "serde-serialize",
    derive(Serialize, Deserialize),
    serde(into = "SparseRows", try_from = "SparseRows")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct SparseLinearConstraints {
    pub parameter_count: usize,
    pub constraint_matrix: CsrMatrix<f64>,
    pub rhs: Vec<f64>,
    pub signs: Vec<Sign>,
    pub bounds: Bounds,
    pub objective_coeffs: Vec<f64>,
    pub minimize: bool,
}

impl SparseLinearConstraints {
    #[must_use]
    pub fn with_bounds(self, bounds: Bounds) -> Self {
        Self { bounds, ..self }
    }

    #[must_use]
    pub fn with_objective(self, objective_coeffs: Vec<f64>, minimize: bool) -> Self {
        Self {
            objective_coeffs,
            minimize,
            ..self
        }
    }
}

impl LinearProgram for SparseLinearConstraints {
    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn matrix_shape(&self) -> (usize, usize) {
        (
            self.constraint_matrix.nrows(),
            self.constraint_matrix.ncols(),
        )
    }

    fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    fn signs(&self) -> &[Sign] {
        &self.signs
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn objective(&self) -> &[f64] {
        &self.objective_coeffs
    }

    fn minimize(&self) -> bool {
        self.minimize
    }

    fn for_each_coefficient<F: FnMut(usize, usize, f64)>(&self, mut f: F) {
        for (row, column, &value) in self.constraint_matrix.triplet_iter() {
            f(row, column, value);
        }
    }
}

/// [`SparseLinearConstraints`] with the matrix in coordinate form.
#[cfg(any(test, feature = "serde-serialize"))]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
struct SparseRows {
    parameter_count: usize,
    shape: (usize, usize),
    triplets: Vec<(usize, usize, f64)>,
    rhs: Vec<f64>,
    signs: Vec<Sign>,
    bounds: Bounds,
    objective_coeffs: Vec<f64>,
    minimize: bool,
}

#[cfg(any(test, feature = "serde-serialize"))]
impl From<SparseLinearConstraints> for SparseRows {
    fn from(program: SparseLinearConstraints) -> Self {
        Self {
            parameter_count: program.parameter_count,
            shape: program.matrix_shape(),
            triplets: program
                .constraint_matrix
                .triplet_iter()
                .map(|(row, column, &value)| (row, column, value))
                .collect(),
            rhs: program.rhs,
            signs: program.signs,
            bounds: program.bounds,
            objective_coeffs: program.objective_coeffs,
            minimize: program.minimize,
        }
    }
}

#[cfg(any(test, feature = "serde-serialize"))]
impl TryFrom<SparseRows> for SparseLinearConstraints {
    type Error = LpError;

    fn try_from(rows: SparseRows) -> Result<Self, LpError> {
        let (nrows, ncols) = rows.shape;
        let mut row_indices = Vec::with_capacity(rows.triplets.len());
        let mut column_indices = Vec::with_capacity(rows.triplets.len());
        let mut values = Vec::with_capacity(rows.triplets.len());
        for (row, column, value) in rows.triplets {
            row_indices.push(row);
            column_indices.push(column);
            values.push(value);
        }
        let coo = CooMatrix::try_from_triplets(nrows, ncols, row_indices, column_indices, values)
            .map_err(|e| LpError::InvalidSparseMatrix(e.to_string()))?;
        Ok(Self {
            parameter_count: rows.parameter_count,
            constraint_matrix: CsrMatrix::from(&coo),
            rhs: rows.rhs,
            signs: rows.signs,
            bounds: rows.bounds,
            objective_coeffs: rows.objective_coeffs,
            minimize: rows.minimize,
        })
    }
}

/// Assembles a [`SparseLinearConstraints`] row by row.
///
/// Coefficients are collected as triplets and compressed once in
/// [`SparseConstraintsBuilder::finish`]. Entries pushed twice for the same row and column are
/// summed.
#[derive(Clone, Debug)]
pub struct SparseConstraintsBuilder {
    parameter_count: usize,
    rows: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
    rhs: Vec<f64>,
    signs: Vec<Sign>,
}

impl SparseConstraintsBuilder {
    pub fn new(parameter_count: usize) -> Self {
        Self {
            parameter_count,
            rows: Vec::new(),
            columns: Vec::new(),
            values: Vec::new(),
            rhs: Vec::new(),
            signs: Vec::new(),
        }
    }

    /// Reserves space for `rows` more rows with roughly `nonzeros` coefficients in total.
    pub fn reserve(&mut self, rows: usize, nonzeros: usize) {
        self.rhs.reserve(rows);
        self.signs.reserve(rows);
        self.rows.reserve(nonzeros);
        self.columns.reserve(nonzeros);
        self.values.reserve(nonzeros);
    }

    /// Appends the row `Σ value·x[column] <sign> rhs` and returns its index.
    ///
    /// Panics if a column is not below the parameter count.
    pub fn push_row(
        &mut self,
        entries: impl IntoIterator<Item = (usize, f64)>,
        sign: Sign,
        rhs: f64,
    ) -> usize {
        let row = self.rhs.len();
        for (column, value) in entries {
            assert!(
                column < self.parameter_count,
                "column {} is out of range for {} parameters",
                column,
                self.parameter_count
            );
            if value != 0.0 {
                self.rows.push(row);
                self.columns.push(column);
                self.values.push(value);
            }
        }
        self.rhs.push(rhs);
        self.signs.push(sign);
        row
    }

    /// The number of rows pushed so far.
    pub fn row_count(&self) -> usize {
        self.rhs.len()
    }

    /// Compresses the collected rows into a feasibility problem with free variables.
    pub fn finish(self) -> SparseLinearConstraints {
        let mut coo = CooMatrix::new(self.rhs.len(), self.parameter_count);
        for ((&row, &column), &value) in self.rows.iter().zip(&self.columns).zip(&self.values) {
            coo.push(row, column, value);
        }
        SparseLinearConstraints {
            parameter_count: self.parameter_count,
            constraint_matrix: CsrMatrix::from(&coo),
            rhs: self.rhs,
            signs: self.signs,
            bounds: Bounds::free(),
            objective_coeffs: Vec::new(),
            minimize: true,
        }
    }
}
