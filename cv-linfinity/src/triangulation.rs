//! Triangulation of one 3d point from known cameras.

use crate::rows::{observation_rows, reprojection_error, AffineForm, Row, ROWS_PER_OBSERVATION};
use crate::{Bisection, ConstraintBuilder, LinfError};
use cv_linprog::{Bounds, ClarabelSettings, ClarabelSolver, LinearConstraints};
use log::*;
use nalgebra::{DMatrix, Matrix3x4, Point2, Point3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Encodes "every camera sees the point within `gamma` of its observation".
///
/// The unknowns are the three coordinates of the point. Each camera contributes the five rows
/// of one observation, so the program is small and dense.
#[derive(Clone, Debug)]
pub struct TriangulationEncoder<'a> {
    cameras: &'a [Matrix3x4<f64>],
    observations: &'a [Point2<f64>],
    min_depth: f64,
    bound: f64,
}

impl<'a> TriangulationEncoder<'a> {
    /// Pairs every camera with its observation of the point.
    ///
    /// At least two cameras are required.
    pub fn new(
        cameras: &'a [Matrix3x4<f64>],
        observations: &'a [Point2<f64>],
    ) -> Result<Self, LinfError> {
        if cameras.len() != observations.len() {
            return Err(LinfError::MismatchedLengths {
                left_name: "cameras",
                left_len: cameras.len(),
                right_name: "observations",
                right_len: observations.len(),
            });
        }
        if cameras.len() < 2 {
            return Err(LinfError::InsufficientData {
                required: 2,
                actual: cameras.len(),
            });
        }
        Ok(Self {
            cameras,
            observations,
            min_depth: 0.0,
            bound: 1e4,
        })
    }

    /// Set the smallest depth the point may have in every camera.
    ///
    /// Default is `0.0`.
    #[must_use]
    pub fn min_depth(self, min_depth: f64) -> Self {
        Self { min_depth, ..self }
    }

    /// Set the largest absolute value of each coordinate of the point.
    ///
    /// Default is `1e4`.
    #[must_use]
    pub fn bound(self, bound: f64) -> Self {
        Self { bound, ..self }
    }

    /// Reads the point out of a solution.
    pub fn point(&self, parameters: &[f64]) -> Point3<f64> {
        Point3::new(parameters[0], parameters[1], parameters[2])
    }

    /// The largest reprojection error of `point` over all cameras.
    pub fn max_error(&self, point: &Point3<f64>) -> f64 {
        self.cameras
            .iter()
            .zip(self.observations)
            .map(|(camera, observation)| {
                let camera = camera * point.to_homogeneous();
                reprojection_error([camera.x, camera.y, camera.z], observation)
            })
            .fold(0.0, f64::max)
    }

    fn forms(camera: &Matrix3x4<f64>) -> [AffineForm; 3] {
        let row = |r: usize| {
            AffineForm::constant(camera[(r, 3)])
                .term(0, camera[(r, 0)])
                .term(1, camera[(r, 1)])
                .term(2, camera[(r, 2)])
        };
        [row(0), row(1), row(2)]
    }
}

impl<'a> ConstraintBuilder for TriangulationEncoder<'a> {
    type Program = LinearConstraints;

    fn parameter_count(&self) -> usize {
        3
    }

    fn build(&self, gamma: f64) -> LinearConstraints {
        let rows = ROWS_PER_OBSERVATION * self.cameras.len();
        let mut matrix = DMatrix::zeros(rows, 3);
        let mut rhs = Vec::with_capacity(rows);
        for (camera, observation) in self.cameras.iter().zip(self.observations) {
            let forms = Self::forms(camera);
            for row in observation_rows(&forms, observation, gamma, self.min_depth, None) {
                for &(column, value) in &row.entries {
                    matrix[(rhs.len(), column)] += value;
                }
                rhs.push(row.rhs);
            }
        }
        LinearConstraints::new(matrix, rhs, vec![Row::SIGN; rows])
            .with_bounds(Bounds::Shared(-self.bound, self.bound))
    }
}

/// A triangulated point with the largest reprojection error it was proven to reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangulatedPoint {
    pub point: Point3<f64>,
    pub gamma: f64,
}

/// Triangulates points with the L-infinity bisection.
///
/// ```
/// use cv_linfinity::LinfTriangulator;
/// use cv_linfinity::nalgebra::{Matrix3x4, Point2, Point3};
///
/// let cameras = [
///     Matrix3x4::new(1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 4.0),
///     Matrix3x4::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 4.0),
/// ];
/// let observations = [Point2::new(0.1, 0.04), Point2::new(-0.1, 0.04)];
/// let triangulated = LinfTriangulator::new()
///     .triangulate(&cameras, &observations)
///     .unwrap()
///     .unwrap();
/// assert!((triangulated.point - Point3::new(0.5, 0.2, 1.0)).norm() < 1e-3);
/// ```
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinfTriangulator {
    bisection: Bisection,
    solver: ClarabelSettings,
    min_depth: f64,
    bound: f64,
}

impl Default for LinfTriangulator {
    fn default() -> Self {
        Self {
            bisection: Bisection::default(),
            solver: ClarabelSettings::default(),
            min_depth: 0.0,
            bound: 1e4,
        }
    }
}

impl LinfTriangulator {
    /// Creates a `LinfTriangulator` with default values.
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

    /// Set the smallest depth of the point in every camera.
    ///
    /// Default is `0.0`.
    #[must_use]
    pub fn min_depth(self, min_depth: f64) -> Self {
        Self { min_depth, ..self }
    }

    /// Set the largest absolute value of each coordinate of the point.
    ///
    /// Default is `1e4`.
    #[must_use]
    pub fn bound(self, bound: f64) -> Self {
        Self { bound, ..self }
    }

    /// Finds the point minimizing the largest reprojection error.
    ///
    /// Returns `Ok(None)` if the error cannot be brought within the bisection bounds.
    pub fn triangulate(
        &self,
        cameras: &[Matrix3x4<f64>],
        observations: &[Point2<f64>],
    ) -> Result<Option<TriangulatedPoint>, LinfError> {
        let encoder = TriangulationEncoder::new(cameras, observations)?
            .min_depth(self.min_depth)
            .bound(self.bound);
        let mut solver = ClarabelSolver::with_settings(self.solver);
        let solution = self.bisection.solve(&encoder, &mut solver)?;
        Ok(solution.map(|solution| {
            let point = encoder.point(&solution.parameters);
            trace!("triangulated {:?} with gamma {:e}", point, solution.gamma);
            TriangulatedPoint {
                point,
                gamma: solution.gamma,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_linprog::LinearProgram;

    fn cameras() -> [Matrix3x4<f64>; 2] {
        [
            Matrix3x4::new(1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 4.0),
            Matrix3x4::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 4.0),
        ]
    }

    #[test]
    fn rejects_bad_input() {
        let cameras = cameras();
        let observations = [Point2::origin()];
        assert!(matches!(
            TriangulationEncoder::new(&cameras, &observations),
            Err(LinfError::MismatchedLengths { .. })
        ));
        assert_eq!(
            TriangulationEncoder::new(&cameras[..1], &observations).err(),
            Some(LinfError::InsufficientData {
                required: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn bound_limits_the_point() {
        assert_eq!(
            LinfTriangulator::new(),
            LinfTriangulator::new().min_depth(0.0).bound(1e4)
        );

        // The exact point lies at z = 1. Within the box the two views are at most 4.5 deep, so
        // their x disparity is at least 1 / 4.5 against an observed 0.2.
        let cameras = cameras();
        let observations = [Point2::new(0.1, 0.04), Point2::new(-0.1, 0.04)];
        let triangulated = LinfTriangulator::new()
            .bound(0.5)
            .triangulate(&cameras, &observations)
            .unwrap()
            .unwrap();
        assert!(triangulated.point.coords.amax() <= 0.5 + 1e-6);
        assert!(triangulated.gamma > 0.01, "gamma {}", triangulated.gamma);
    }

    #[test]
    fn true_point_satisfies_rows() {
        let cameras = cameras();
        let observations = [Point2::new(0.1, 0.04), Point2::new(-0.1, 0.04)];
        let encoder = TriangulationEncoder::new(&cameras, &observations).unwrap();
        let program = encoder.build(0.01);
        assert_eq!(program.matrix_shape(), (10, 3));
        assert!(program.max_violation(&[0.5, 0.2, 1.0]) < 1e-12);
        assert!(program.max_violation(&[0.5, 0.2, 2.0]) > 0.0);
        assert!(encoder.max_error(&Point3::new(0.5, 0.2, 1.0)) < 1e-12);
    }
}
