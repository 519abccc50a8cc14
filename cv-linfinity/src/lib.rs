//! This crate solves multiple-view geometry problems under the L-infinity norm of the
//! reprojection error, following the quasi-convex formulation of Hartley & Schaffalitzky and
//! Kahl & Hartley ("Multiple-View Geometry Under the L∞-Norm", PAMI 2008).
//!
//! ## Why L-infinity
//!
//! The reprojection error of a single observation, `|x/z - u|` and `|y/z - v|`, is a ratio of
//! affine functions of the unknowns. While `z` stays positive (cheirality), the statement
//! "the error is at most `gamma`" can be multiplied through by `z`:
//!
//! ```text
//! (u - gamma) z  ≤  x  ≤  (u + gamma) z
//! (v - gamma) z  ≤  y  ≤  (v + gamma) z
//!                   z  ≥  0
//! ```
//!
//! Those are five linear inequalities. Bounding the worst observation (the L-infinity norm)
//! is just the conjunction of all of them, so for a fixed `gamma` the question "is there a
//! solution with every error at most `gamma`" is a linear feasibility problem. That predicate
//! is monotone in `gamma`, so a [`Bisection`] over `gamma` finds the globally optimal
//! maximum error without any initial guess. This only works for the L-infinity norm; the
//! squared error has no such linear description.
//!
//! ## Problems
//!
//! * [`TriangulationEncoder`] - a 3d point from known cameras.
//! * [`ResectionEncoder`] - a 3x4 projection matrix from known 3d points.
//! * [`TranslationStructureEncoder`] - camera translations and 3d points jointly, given camera
//!   rotations.
//! * [`GlobalTranslationsEncoder`] - camera translations from relative motions or triplets.
//!
//! Every encoder implements [`ConstraintBuilder`], which is all the [`Bisection`] needs. The
//! linear programs are solved through any [`cv_linprog::LpSolver`].
//!
//! Nothing in this crate is global: each call owns its solver, so many estimations may run
//! concurrently, for instance from the hypotheses of a sample consensus loop.

mod bisection;
mod global_translations;
mod projection;
mod resection;
mod rows;
mod translation_structure;
mod triangulation;

pub use bisection::*;
pub use global_translations::*;
pub use projection::*;
pub use resection::*;
pub use translation_structure::*;
pub use triangulation::*;

pub use cv_linprog;
pub use nalgebra;
pub use sample_consensus;

use cv_linprog::{LinearProgram, LpError};
use thiserror::Error;

/// Turns an admissible error `gamma` into a linear program that is feasible exactly when some
/// choice of the unknowns keeps every error at or below `gamma`.
pub trait ConstraintBuilder {
    /// The linear program produced for one `gamma`.
    type Program: LinearProgram;

    /// The number of unknowns, which is the length of every solution vector.
    fn parameter_count(&self) -> usize;

    /// Builds the program for the admissible error `gamma`.
    fn build(&self, gamma: f64) -> Self::Program;
}

/// Errors raised when an estimation problem is set up with inconsistent inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinfError {
    /// Fewer observations were given than the problem needs.
    #[error("at least {required} observations are required, got {actual}")]
    InsufficientData {
        /// Minimum number of observations.
        required: usize,
        /// Number of observations provided.
        actual: usize,
    },
    /// Two inputs that must be paired have different lengths.
    #[error("mismatched lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedLengths {
        left_name: &'static str,
        left_len: usize,
        right_name: &'static str,
        right_len: usize,
    },
    /// An observation or motion refers to a camera or point that does not exist.
    #[error("{what} index {index} is out of range for {count} entries")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },
    /// A relative motion or triplet does not connect distinct cameras.
    #[error("degenerate {what}: {reason}")]
    Degenerate {
        what: &'static str,
        reason: &'static str,
    },
    #[error(transparent)]
    Lp(#[from] LpError),
}
