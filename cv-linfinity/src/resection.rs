//! Resection of a camera from known 3d points.

use crate::rows::{observation_rows, AffineForm, Row, ROWS_PER_OBSERVATION};
use crate::{Bisection, ConstraintBuilder, LinfError, ProjectionMatrix, ResectionMatch};
use cv_linprog::{
    Bounds, ClarabelSettings, ClarabelSolver, SparseConstraintsBuilder, SparseLinearConstraints,
};
use log::*;
use nalgebra::{Matrix3x4, Matrix4, Vector3};
use sample_consensus::Estimator;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The number of unknown entries of the projection matrix.
const UNKNOWNS: usize = 11;

/// Encodes "the camera sees every point within `gamma` of its observation".
///
/// The unknowns are the entries of the projection matrix in row-major order, except the last
/// one, which is fixed to `1` to remove the scale ambiguity. The world is translated so that
/// the first point lies at the origin before the rows are formed; [`ResectionEncoder::projection`]
/// undoes that translation.
///
/// Each observation only touches the entries of one row of the matrix per coordinate, so the
/// program is stored sparse.
#[derive(Clone, Debug)]
pub struct ResectionEncoder<'a> {
    matches: &'a [ResectionMatch],
    origin: Vector3<f64>,
    min_depth: f64,
    bound: f64,
}

impl<'a> ResectionEncoder<'a> {
    /// The minimum number of matches.
    pub const MIN_MATCHES: usize = 6;

    pub fn new(matches: &'a [ResectionMatch]) -> Result<Self, LinfError> {
        if matches.len() < Self::MIN_MATCHES {
            return Err(LinfError::InsufficientData {
                required: Self::MIN_MATCHES,
                actual: matches.len(),
            });
        }
        Ok(Self {
            matches,
            origin: matches[0].1.coords,
            min_depth: 0.0,
            bound: 1e4,
        })
    }

    /// Set the smallest depth every point may have, measured in units of the first point's
    /// depth.
    ///
    /// Default is `0.0`.
    #[must_use]
    pub fn min_depth(self, min_depth: f64) -> Self {
        Self { min_depth, ..self }
    }

    /// Set the largest absolute value of each unknown entry.
    ///
    /// Default is `1e4`.
    #[must_use]
    pub fn bound(self, bound: f64) -> Self {
        Self { bound, ..self }
    }

    /// Reassembles the projection matrix from a solution, in the original world frame.
    pub fn projection(&self, parameters: &[f64]) -> ProjectionMatrix {
        let p = parameters;
        let centered = Matrix3x4::new(
            p[0], p[1], p[2], p[3], //
            p[4], p[5], p[6], p[7], //
            p[8], p[9], p[10], 1.0,
        );
        let mut translation = Matrix4::identity();
        translation[(0, 3)] = -self.origin.x;
        translation[(1, 3)] = -self.origin.y;
        translation[(2, 3)] = -self.origin.z;
        ProjectionMatrix(centered * translation)
    }

    fn forms(&self, world: &Vector3<f64>) -> [AffineForm; 3] {
        let centered = world - self.origin;
        let (a, b, c) = (centered.x, centered.y, centered.z);
        [
            AffineForm::constant(0.0)
                .term(0, a)
                .term(1, b)
                .term(2, c)
                .term(3, 1.0),
            AffineForm::constant(0.0)
                .term(4, a)
                .term(5, b)
                .term(6, c)
                .term(7, 1.0),
            AffineForm::constant(1.0)
                .term(8, a)
                .term(9, b)
                .term(10, c),
        ]
    }
}

impl<'a> ConstraintBuilder for ResectionEncoder<'a> {
    type Program = SparseLinearConstraints;

    fn parameter_count(&self) -> usize {
        UNKNOWNS
    }

    fn build(&self, gamma: f64) -> SparseLinearConstraints {
        let mut builder = SparseConstraintsBuilder::new(UNKNOWNS);
        let rows = ROWS_PER_OBSERVATION * self.matches.len();
        builder.reserve(rows, 8 * rows);
        for ResectionMatch(observation, world) in self.matches {
            let forms = self.forms(&world.coords);
            for row in observation_rows(&forms, observation, gamma, self.min_depth, None) {
                builder.push_row(row.entries, Row::SIGN, row.rhs);
            }
        }
        builder
            .finish()
            .with_bounds(Bounds::Shared(-self.bound, self.bound))
    }
}

/// A resected camera with the largest reprojection error it was proven to reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resection {
    pub projection: ProjectionMatrix,
    pub gamma: f64,
}

/// Estimates projection matrices with the L-infinity bisection.
///
/// It can be used directly or as the [`Estimator`] of a sample consensus algorithm, in which
/// case every call to [`Estimator::estimate`] runs its own bisection with its own solver.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LinfResection {
    bisection: Bisection,
    solver: ClarabelSettings,
}

impl LinfResection {
    /// Creates a `LinfResection` with default values.
    ///
    /// Same as calling [`Default::default`].
    pub fn new() -> Self {
        Default::default()
    }

    #[must_use]
    pub fn bisection(self, bisection: Bisection) -> Self {
        Self { bisection, ..self }
    }

    #[must_use]
    pub fn solver(self, solver: ClarabelSettings) -> Self {
        Self { solver, ..self }
    }

    /// Finds the projection matrix minimizing the largest reprojection error.
    ///
    /// Returns `Ok(None)` if the error cannot be brought within the bisection bounds.
    pub fn resect(&self, matches: &[ResectionMatch]) -> Result<Option<Resection>, LinfError> {
        let encoder = ResectionEncoder::new(matches)?;
        let mut solver = ClarabelSolver::with_settings(self.solver);
        let solution = self.bisection.solve(&encoder, &mut solver)?;
        Ok(solution.map(|solution| Resection {
            projection: encoder.projection(&solution.parameters),
            gamma: solution.gamma,
        }))
    }
}

impl Estimator<ResectionMatch> for LinfResection {
    type Model = ProjectionMatrix;
    type ModelIter = Option<ProjectionMatrix>;
    const MIN_SAMPLES: usize = ResectionEncoder::MIN_MATCHES;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = ResectionMatch> + Clone,
    {
        let matches: Vec<ResectionMatch> = data.collect();
        match self.resect(&matches) {
            Ok(resection) => resection.map(|resection| resection.projection),
            Err(e) => {
                debug!("resection failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_linprog::LinearProgram;
    use nalgebra::Point3;

    fn camera() -> ProjectionMatrix {
        ProjectionMatrix(Matrix3x4::new(
            1.0, 0.0, 0.0, 0.5, //
            0.0, 1.0, 0.0, -0.25, //
            0.0, 0.0, 1.0, 5.0,
        ))
    }

    fn matches() -> Vec<ResectionMatch> {
        [
            [0.5, 0.2, 0.1],
            [-0.3, 0.4, -0.2],
            [0.1, -0.6, 0.3],
            [0.7, 0.7, -0.5],
            [-0.8, -0.1, 0.6],
            [0.2, 0.9, 0.8],
            [-0.4, -0.7, -0.9],
        ]
        .iter()
        .map(|&[x, y, z]| {
            let world = Point3::new(x, y, z);
            ResectionMatch(camera().project(&world).unwrap(), world)
        })
        .collect()
    }

    #[test]
    fn needs_six_matches() {
        let matches = matches();
        assert_eq!(
            ResectionEncoder::new(&matches[..5]).err(),
            Some(LinfError::InsufficientData {
                required: 6,
                actual: 5
            })
        );
        assert!(LinfResection::new().resect(&[]).is_err());
        assert_eq!(LinfResection::new().estimate(matches[..3].iter().copied()), None);
    }

    #[test]
    fn true_camera_satisfies_rows() {
        let matches = matches();
        let encoder = ResectionEncoder::new(&matches).unwrap();
        let program = encoder.build(1e-3);
        assert_eq!(program.matrix_shape(), (35, 11));

        // Scale the camera so that the first point has unit depth, then move the world origin.
        let truth = camera();
        let first = matches[0].1;
        let depth = truth.transform(&first).z;
        let centered = truth.0 / depth;
        let mut parameters = Vec::with_capacity(11);
        for r in 0..3 {
            for c in 0..4 {
                let value = if c == 3 {
                    centered[(r, 0)] * first.x
                        + centered[(r, 1)] * first.y
                        + centered[(r, 2)] * first.z
                        + centered[(r, 3)]
                } else {
                    centered[(r, c)]
                };
                parameters.push(value);
            }
        }
        assert!((parameters.pop().unwrap() - 1.0).abs() < 1e-12);
        assert!(program.max_violation(&parameters) < 1e-12);

        let recovered = encoder.projection(&parameters);
        for ResectionMatch(observation, world) in &matches {
            assert!(recovered.reprojection_error(observation, world) < 1e-12);
        }
    }
}
