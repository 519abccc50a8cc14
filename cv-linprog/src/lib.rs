//! # Linear programs for computer vision
//!
//! This crate contains the constraint model shared by the L-infinity geometry solvers of
//! [Rust CV](https://github.com/rust-cv/) and the seam through which those problems reach an
//! actual linear-programming engine.
//!
//! A linear program here is the classic
//!
//! ```text
//! minimize (or maximize)   c·x
//! subject to               A x  <sign>  b      (one sign per row: ≤, ≥, = or free)
//!                          l ≤ x ≤ u
//! ```
//!
//! It comes in two flavors that carry identical semantics:
//!
//! * [`LinearConstraints`] stores `A` as a dense matrix. This suits small problems such as
//!   triangulating one point, where every row touches every unknown.
//! * [`SparseLinearConstraints`] stores `A` in compressed sparse row form. It is assembled
//!   through a [`SparseConstraintsBuilder`] from `(column, value)` pairs and is what the larger
//!   problems (resection, translation registration) use, since each observation only touches a
//!   handful of unknowns.
//!
//! Both implement [`LinearProgram`], which is all an [`LpSolver`] needs to know about them.
//! The engine itself is external. [`ClarabelSolver`] adapts the pure-Rust
//! [Clarabel](https://clarabel.org) interior point solver, but any engine that can solve a
//! bounded-variable LP and report feasibility can be put behind [`LpSolver`].

mod clarabel_solver;
mod constraints;

pub use clarabel_solver::*;
pub use constraints::*;

pub use nalgebra;
pub use nalgebra_sparse;

use thiserror::Error;

/// Errors reported by the constraint model and the solver adapters.
///
/// Infeasibility is not an error: it is the normal answer of [`LpSolver::solve`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LpError {
    /// Two parts of a linear program disagree on their size.
    #[error("dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The part of the program whose size is wrong.
        what: &'static str,
        /// The size implied by the rest of the program.
        expected: usize,
        /// The size that was actually provided.
        actual: usize,
    },
    /// A constrained row has an infinite or NaN right-hand side.
    #[error("row {row} has the non-finite right-hand side {rhs}")]
    NonFiniteRhs { row: usize, rhs: f64 },
    /// A sparse matrix could not be assembled from its coordinates.
    #[error("invalid sparse matrix: {0}")]
    InvalidSparseMatrix(String),
    /// A solution was requested without a preceding successful solve.
    #[error("no solution is available, the last solve did not succeed")]
    NotSolved,
}

/// The capability of an LP engine adapter.
///
/// An adapter is used in cycles of [`LpSolver::setup`], [`LpSolver::solve`] and
/// [`LpSolver::solution`]. A new `setup` discards everything from the previous cycle.
/// Adapters own their engine state exclusively, so running several of them concurrently
/// requires no synchronization.
pub trait LpSolver {
    /// Loads a linear program into the engine.
    ///
    /// Fails if the dimensions of the program are inconsistent.
    fn setup<P: LinearProgram>(&mut self, program: &P) -> Result<(), LpError>;

    /// Solves the loaded program.
    ///
    /// Returns `true` only if the engine proved optimality. For a program without an objective
    /// this means the constraints are feasible.
    fn solve(&mut self) -> bool;

    /// The variable values found by the last successful [`LpSolver::solve`].
    ///
    /// The slice has exactly [`LinearProgram::parameter_count`] entries.
    fn solution(&self) -> Result<&[f64], LpError>;
}
