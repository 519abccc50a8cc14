//! Joint estimation of camera translations and 3d points from known rotations.
//!
//! For an observation of point `X_p` in camera `c` with rotation `R_c` and translation `t_c`,
//! the point in the camera frame is `R_c X_p + t_c`. With the rotation known this is affine in
//! the unknowns, so the observation rows are the same as for triangulation, only now both the
//! translation of the camera and the position of the point are unknown.
//!
//! The reconstruction is only defined up to a translation and a scale. The translation of the
//! first camera is pinned to zero, and a minimum depth of `1` in every camera fixes the scale
//! from below. A box on every coordinate keeps the feasible set bounded.

use crate::rows::{observation_rows, reprojection_error, AffineForm, Row, ROWS_PER_OBSERVATION};
use crate::{Bisection, ConstraintBuilder, LinfError};
use cv_linprog::{
    Bounds, ClarabelSettings, ClarabelSolver, SparseConstraintsBuilder, SparseLinearConstraints,
};
use log::*;
use nalgebra::{Matrix3, Point2, Point3, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// One image observation of a point.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Normalized image coordinates.
    pub point: Point2<f64>,
    pub point_index: usize,
    pub camera_index: usize,
}

/// Camera translations and points recovered from one solution.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationStructure {
    /// One translation per camera, in camera index order.
    pub translations: Vec<Vector3<f64>>,
    /// One position per point, in point index order.
    pub points: Vec<Point3<f64>>,
    /// One slack per observation, empty unless the noise variant was used.
    ///
    /// A slack is measured in units of depth times image error. Observations with a positive
    /// slack exceed the admissible error.
    pub noise: Vec<f64>,
}

/// Encodes "every observation is within `gamma` of the projection of its point".
///
/// Solution layout: the translations of all cameras (three entries each, in camera order),
/// then the positions of all points (three entries each, in point order), then one slack per
/// observation if the noise variant is enabled.
#[derive(Clone, Debug)]
pub struct TranslationStructureEncoder<'a> {
    rotations: &'a [Matrix3<f64>],
    observations: &'a [Observation],
    point_count: usize,
    min_depth: f64,
    bound: f64,
    noise: bool,
}

impl<'a> TranslationStructureEncoder<'a> {
    /// Creates an encoder for `point_count` points seen by one camera per rotation.
    pub fn new(
        rotations: &'a [Matrix3<f64>],
        observations: &'a [Observation],
        point_count: usize,
    ) -> Result<Self, LinfError> {
        if rotations.len() < 2 {
            return Err(LinfError::InsufficientData {
                required: 2,
                actual: rotations.len(),
            });
        }
        for observation in observations {
            if observation.camera_index >= rotations.len() {
                return Err(LinfError::IndexOutOfRange {
                    what: "camera",
                    index: observation.camera_index,
                    count: rotations.len(),
                });
            }
            if observation.point_index >= point_count {
                return Err(LinfError::IndexOutOfRange {
                    what: "point",
                    index: observation.point_index,
                    count: point_count,
                });
            }
        }
        Ok(Self {
            rotations,
            observations,
            point_count,
            min_depth: 1.0,
            bound: 1e4,
            noise: false,
        })
    }

    /// Set the smallest depth of every observed point.
    ///
    /// Default is `1.0`.
    #[must_use]
    pub fn min_depth(self, min_depth: f64) -> Self {
        Self { min_depth, ..self }
    }

    /// Set the largest absolute value of every translation and point coordinate.
    ///
    /// Default is `1e4`.
    #[must_use]
    pub fn bound(self, bound: f64) -> Self {
        Self { bound, ..self }
    }

    /// Add one non-negative slack per observation and minimize their sum.
    ///
    /// Every program is feasible then, so it is meant to be solved at a fixed `gamma` with
    /// [`Bisection::solve_at`]. Default is `false`.
    #[must_use]
    pub fn with_noise(self, noise: bool) -> Self {
        Self { noise, ..self }
    }

    pub fn camera_count(&self) -> usize {
        self.rotations.len()
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    fn translation_column(&self, camera: usize) -> usize {
        3 * camera
    }

    fn point_column(&self, point: usize) -> usize {
        3 * (self.camera_count() + point)
    }

    fn slack_column(&self, observation: usize) -> usize {
        3 * (self.camera_count() + self.point_count) + observation
    }

    fn forms(&self, observation: &Observation) -> [AffineForm; 3] {
        let rotation = &self.rotations[observation.camera_index];
        let translation = self.translation_column(observation.camera_index);
        let point = self.point_column(observation.point_index);
        let row = |r: usize| {
            AffineForm::constant(0.0)
                .term(point, rotation[(r, 0)])
                .term(point + 1, rotation[(r, 1)])
                .term(point + 2, rotation[(r, 2)])
                .term(translation + r, 1.0)
        };
        [row(0), row(1), row(2)]
    }

    fn bounds(&self) -> Bounds {
        let mut bounds = vec![(-self.bound, self.bound); self.parameter_count()];
        for bound in &mut bounds[..3] {
            *bound = (0.0, 0.0);
        }
        if self.noise {
            for bound in &mut bounds[self.slack_column(0)..] {
                *bound = (0.0, f64::INFINITY);
            }
        }
        Bounds::PerVariable(bounds)
    }

    /// Splits a solution into translations, points and slacks.
    pub fn unpack(&self, parameters: &[f64]) -> TranslationStructure {
        let vector = |column: usize| {
            Vector3::new(
                parameters[column],
                parameters[column + 1],
                parameters[column + 2],
            )
        };
        TranslationStructure {
            translations: (0..self.camera_count())
                .map(|camera| vector(self.translation_column(camera)))
                .collect(),
            points: (0..self.point_count)
                .map(|point| Point3::from(vector(self.point_column(point))))
                .collect(),
            noise: if self.noise {
                parameters[self.slack_column(0)..].to_vec()
            } else {
                Vec::new()
            },
        }
    }

    /// The reprojection error of every observation under `structure`, in observation order.
    pub fn reprojection_errors(&self, structure: &TranslationStructure) -> Vec<f64> {
        self.observations
            .iter()
            .map(|observation| {
                let camera = self.rotations[observation.camera_index]
                    * structure.points[observation.point_index].coords
                    + structure.translations[observation.camera_index];
                reprojection_error([camera.x, camera.y, camera.z], &observation.point)
            })
            .collect()
    }
}

impl<'a> ConstraintBuilder for TranslationStructureEncoder<'a> {
    type Program = SparseLinearConstraints;

    fn parameter_count(&self) -> usize {
        let slacks = if self.noise {
            self.observations.len()
        } else {
            0
        };
        3 * (self.camera_count() + self.point_count) + slacks
    }

    fn build(&self, gamma: f64) -> SparseLinearConstraints {
        let mut builder = SparseConstraintsBuilder::new(self.parameter_count());
        let rows = ROWS_PER_OBSERVATION * self.observations.len();
        builder.reserve(rows, 13 * rows);
        for (index, observation) in self.observations.iter().enumerate() {
            let slack = if self.noise {
                Some(self.slack_column(index))
            } else {
                None
            };
            let forms = self.forms(observation);
            for row in observation_rows(&forms, &observation.point, gamma, self.min_depth, slack) {
                builder.push_row(row.entries, Row::SIGN, row.rhs);
            }
        }
        let program = builder.finish().with_bounds(self.bounds());
        if self.noise {
            let mut objective = vec![0.0; self.parameter_count()];
            for coefficient in &mut objective[self.slack_column(0)..] {
                *coefficient = 1.0;
            }
            program.with_objective(objective, true)
        } else {
            program
        }
    }
}

/// A registration with the largest reprojection error it was solved for.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredStructure {
    pub structure: TranslationStructure,
    pub gamma: f64,
}

/// Registers camera translations and points with the L-infinity bisection.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TranslationRegistration {
    bisection: Bisection,
    solver: ClarabelSettings,
    min_depth: f64,
    bound: f64,
}

impl Default for TranslationRegistration {
    fn default() -> Self {
        Self {
            bisection: Bisection::default(),
            solver: ClarabelSettings::default(),
            min_depth: 1.0,
            bound: 1e4,
        }
    }
}

impl TranslationRegistration {
    /// Creates a `TranslationRegistration` with default values.
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

    /// Set the smallest depth of every observed point.
    ///
    /// Default is `1.0`.
    #[must_use]
    pub fn min_depth(self, min_depth: f64) -> Self {
        Self { min_depth, ..self }
    }

    /// Set the largest absolute value of every translation and point coordinate.
    ///
    /// Default is `1e4`.
    #[must_use]
    pub fn bound(self, bound: f64) -> Self {
        Self { bound, ..self }
    }

    fn encoder<'a>(
        &self,
        rotations: &'a [Matrix3<f64>],
        observations: &'a [Observation],
        point_count: usize,
    ) -> Result<TranslationStructureEncoder<'a>, LinfError> {
        Ok(
            TranslationStructureEncoder::new(rotations, observations, point_count)?
                .min_depth(self.min_depth)
                .bound(self.bound),
        )
    }

    /// Finds the translations and points minimizing the largest reprojection error.
    pub fn register(
        &self,
        rotations: &[Matrix3<f64>],
        observations: &[Observation],
        point_count: usize,
    ) -> Result<Option<RegisteredStructure>, LinfError> {
        let encoder = self.encoder(rotations, observations, point_count)?;
        let mut solver = ClarabelSolver::with_settings(self.solver);
        let solution = self.bisection.solve(&encoder, &mut solver)?;
        Ok(solution.map(|solution| RegisteredStructure {
            structure: encoder.unpack(&solution.parameters),
            gamma: solution.gamma,
        }))
    }

    /// Allows observations to exceed the error `sigma` at the cost of a slack each, minimizing
    /// the total slack.
    pub fn register_with_noise(
        &self,
        rotations: &[Matrix3<f64>],
        observations: &[Observation],
        point_count: usize,
        sigma: f64,
    ) -> Result<Option<RegisteredStructure>, LinfError> {
        let encoder = self
            .encoder(rotations, observations, point_count)?
            .with_noise(true);
        let mut solver = ClarabelSolver::with_settings(self.solver);
        let solution = self.bisection.solve_at(&encoder, &mut solver, sigma)?;
        Ok(solution.map(|solution| {
            let structure = encoder.unpack(&solution.parameters);
            debug!(
                "registration: {} of {} observations exceed {:e}",
                structure.noise.iter().filter(|&&slack| slack > 1e-6).count(),
                observations.len(),
                sigma
            );
            RegisteredStructure {
                structure,
                gamma: solution.gamma,
            }
        }))
    }
}
