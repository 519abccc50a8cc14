//! Global camera translations from relative motions.
//!
//! A relative motion between cameras `i` and `j` relates their camera frames by
//! `x_j = R_ij x_i + t_ij`. With world-to-camera translations `t_i` and `t_j` and known
//! relative rotations, the relative translation is `t_j - R_ij t_i`. Relative translations are
//! only known up to scale, so each one is compared against `λ t_ij` with an unknown scale `λ`
//! shared by a group of motions. Motions estimated together, such as the three motions of a
//! triplet, share one scale.
//!
//! The first camera is pinned to the origin and the first scale to `1`.

use crate::{Bisection, ConstraintBuilder, LinfError};
use cv_linprog::{
    Bounds, ClarabelSettings, ClarabelSolver, Sign, SparseConstraintsBuilder,
    SparseLinearConstraints,
};
use log::*;
use nalgebra::{Matrix3, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The motion from camera `i` to camera `j`: `x_j = rotation * x_i + translation`.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeMotion {
    pub i: usize,
    pub j: usize,
    pub rotation: Matrix3<f64>,
    /// Known up to a positive scale.
    pub translation: Vector3<f64>,
}

/// Three cameras forming a cycle of the view graph, in increasing index order.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triplet {
    i: usize,
    j: usize,
    k: usize,
}

impl Triplet {
    /// Sorts the cameras so that `i < j < k`.
    pub fn new(a: usize, b: usize, c: usize) -> Self {
        let mut indices = [a, b, c];
        indices.sort_unstable();
        let [i, j, k] = indices;
        Self { i, j, k }
    }

    pub fn indices(&self) -> [usize; 3] {
        [self.i, self.j, self.k]
    }

    pub fn contains(&self, camera: usize) -> bool {
        self.indices().contains(&camera)
    }

    fn is_degenerate(&self) -> bool {
        self.i == self.j || self.j == self.k
    }
}

/// The three motions estimated within one triplet, sharing one unknown scale.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripletMotions {
    pub triplet: Triplet,
    pub motions: [RelativeMotion; 3],
}

/// Camera translations with the scale of every motion group.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalTranslations {
    /// One world-to-camera translation per camera.
    pub translations: Vec<Vector3<f64>>,
    /// One scale per group, the first one being `1`.
    pub scales: Vec<f64>,
}

/// Encodes "every relative translation matches its motion within `gamma`, per coordinate".
///
/// Solution layout: three entries per camera translation in camera order, then one scale per
/// group.
#[derive(Clone, Debug)]
pub struct GlobalTranslationsEncoder {
    camera_count: usize,
    motions: Vec<(RelativeMotion, usize)>,
    group_count: usize,
    min_scale: f64,
    max_scale: f64,
    bound: f64,
}

impl GlobalTranslationsEncoder {
    /// One scale per motion.
    pub fn from_motions(
        camera_count: usize,
        motions: &[RelativeMotion],
    ) -> Result<Self, LinfError> {
        let grouped = motions.iter().enumerate().map(|(group, &motion)| (motion, group));
        Self::new(camera_count, grouped.collect(), motions.len())
    }

    /// One scale per triplet.
    pub fn from_triplets(
        camera_count: usize,
        triplets: &[TripletMotions],
    ) -> Result<Self, LinfError> {
        let mut grouped = Vec::with_capacity(3 * triplets.len());
        for (group, triplet) in triplets.iter().enumerate() {
            if triplet.triplet.is_degenerate() {
                return Err(LinfError::Degenerate {
                    what: "triplet",
                    reason: "cameras must be distinct",
                });
            }
            for &motion in &triplet.motions {
                if !triplet.triplet.contains(motion.i) || !triplet.triplet.contains(motion.j) {
                    return Err(LinfError::Degenerate {
                        what: "triplet",
                        reason: "motion does not connect cameras of its triplet",
                    });
                }
                grouped.push((motion, group));
            }
        }
        Self::new(camera_count, grouped, triplets.len())
    }

    fn new(
        camera_count: usize,
        motions: Vec<(RelativeMotion, usize)>,
        group_count: usize,
    ) -> Result<Self, LinfError> {
        if camera_count < 2 {
            return Err(LinfError::InsufficientData {
                required: 2,
                actual: camera_count,
            });
        }
        if motions.is_empty() {
            return Err(LinfError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        for (motion, _) in &motions {
            for index in [motion.i, motion.j] {
                if index >= camera_count {
                    return Err(LinfError::IndexOutOfRange {
                        what: "camera",
                        index,
                        count: camera_count,
                    });
                }
            }
            if motion.i == motion.j {
                return Err(LinfError::Degenerate {
                    what: "relative motion",
                    reason: "cameras must be distinct",
                });
            }
        }
        Ok(Self {
            camera_count,
            motions,
            group_count,
            min_scale: 0.0,
            max_scale: 1e3,
            bound: 1e6,
        })
    }

    /// Set the range of every scale but the first.
    ///
    /// Default is `[0.0, 1e3]`.
    #[must_use]
    pub fn scale_range(self, min_scale: f64, max_scale: f64) -> Self {
        Self {
            min_scale,
            max_scale,
            ..self
        }
    }

    /// Set the largest absolute value of every translation coordinate.
    ///
    /// Default is `1e6`.
    #[must_use]
    pub fn bound(self, bound: f64) -> Self {
        Self { bound, ..self }
    }

    pub fn camera_count(&self) -> usize {
        self.camera_count
    }

    pub fn group_count(&self) -> usize {
        self.group_count
    }

    fn scale_column(&self, group: usize) -> usize {
        3 * self.camera_count + group
    }

    /// Splits a solution into translations and scales.
    pub fn unpack(&self, parameters: &[f64]) -> GlobalTranslations {
        GlobalTranslations {
            translations: parameters[..3 * self.camera_count]
                .chunks_exact(3)
                .map(Vector3::from_column_slice)
                .collect(),
            scales: parameters[self.scale_column(0)..].to_vec(),
        }
    }

    /// The largest coordinate of `t_j - R_ij t_i - λ t_ij` for every motion, in input order.
    pub fn residuals(&self, solution: &GlobalTranslations) -> Vec<f64> {
        self.motions
            .iter()
            .map(|(motion, group)| {
                let t = &solution.translations;
                (t[motion.j]
                    - motion.rotation * t[motion.i]
                    - solution.scales[*group] * motion.translation)
                    .amax()
            })
            .collect()
    }
}

impl ConstraintBuilder for GlobalTranslationsEncoder {
    type Program = SparseLinearConstraints;

    fn parameter_count(&self) -> usize {
        3 * self.camera_count + self.group_count
    }

    fn build(&self, gamma: f64) -> SparseLinearConstraints {
        let mut builder = SparseConstraintsBuilder::new(self.parameter_count());
        builder.reserve(6 * self.motions.len(), 30 * self.motions.len());
        for (motion, group) in &self.motions {
            for k in 0..3 {
                let entries = [
                    (3 * motion.j + k, 1.0),
                    (3 * motion.i, -motion.rotation[(k, 0)]),
                    (3 * motion.i + 1, -motion.rotation[(k, 1)]),
                    (3 * motion.i + 2, -motion.rotation[(k, 2)]),
                    (self.scale_column(*group), -motion.translation[k]),
                ];
                builder.push_row(entries, Sign::LessOrEqual, gamma);
                builder.push_row(
                    entries.map(|(column, value)| (column, -value)),
                    Sign::LessOrEqual,
                    gamma,
                );
            }
        }

        let mut bounds = vec![(-self.bound, self.bound); 3 * self.camera_count];
        for bound in &mut bounds[..3] {
            *bound = (0.0, 0.0);
        }
        bounds.push((1.0, 1.0));
        bounds.extend(
            std::iter::repeat((self.min_scale, self.max_scale)).take(self.group_count - 1),
        );
        builder.finish().with_bounds(Bounds::PerVariable(bounds))
    }
}

/// Global translations with the largest residual they were proven to reach.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredTranslations {
    pub translations: GlobalTranslations,
    pub gamma: f64,
}

/// Averages relative motions into global translations with the L-infinity bisection.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TranslationAveraging {
    bisection: Bisection,
    solver: ClarabelSettings,
}

impl TranslationAveraging {
    /// Creates a `TranslationAveraging` with default values.
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

    /// Averages independent relative motions, each with its own scale.
    pub fn average_motions(
        &self,
        camera_count: usize,
        motions: &[RelativeMotion],
    ) -> Result<Option<RegisteredTranslations>, LinfError> {
        self.average(GlobalTranslationsEncoder::from_motions(
            camera_count,
            motions,
        )?)
    }

    /// Averages the motions of triplets, with one scale per triplet.
    pub fn average_triplets(
        &self,
        camera_count: usize,
        triplets: &[TripletMotions],
    ) -> Result<Option<RegisteredTranslations>, LinfError> {
        self.average(GlobalTranslationsEncoder::from_triplets(
            camera_count,
            triplets,
        )?)
    }

    fn average(
        &self,
        encoder: GlobalTranslationsEncoder,
    ) -> Result<Option<RegisteredTranslations>, LinfError> {
        let mut solver = ClarabelSolver::with_settings(self.solver);
        let solution = self.bisection.solve(&encoder, &mut solver)?;
        debug!(
            "translation averaging: {} cameras, {} groups, feasible: {}",
            encoder.camera_count(),
            encoder.group_count(),
            solution.is_some()
        );
        Ok(solution.map(|solution| RegisteredTranslations {
            translations: encoder.unpack(&solution.parameters),
            gamma: solution.gamma,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_linprog::LinearProgram;

    fn motion(i: usize, j: usize, translation: [f64; 3]) -> RelativeMotion {
        RelativeMotion {
            i,
            j,
            rotation: Matrix3::identity(),
            translation: Vector3::from(translation),
        }
    }

    #[test]
    fn triplets_are_sorted() {
        let triplet = Triplet::new(7, 2, 5);
        assert_eq!(triplet.indices(), [2, 5, 7]);
        assert!(triplet.contains(5));
        assert!(!triplet.contains(3));
        assert_eq!(Triplet::new(2, 5, 7), triplet);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(matches!(
            GlobalTranslationsEncoder::from_motions(3, &[motion(1, 1, [1.0, 0.0, 0.0])]),
            Err(LinfError::Degenerate { .. })
        ));
        assert_eq!(
            GlobalTranslationsEncoder::from_motions(2, &[motion(0, 2, [1.0, 0.0, 0.0])]).err(),
            Some(LinfError::IndexOutOfRange {
                what: "camera",
                index: 2,
                count: 2
            })
        );
        assert!(GlobalTranslationsEncoder::from_motions(2, &[]).is_err());

        let stray = TripletMotions {
            triplet: Triplet::new(0, 1, 2),
            motions: [
                motion(0, 1, [1.0, 0.0, 0.0]),
                motion(1, 2, [1.0, 0.0, 0.0]),
                motion(0, 3, [1.0, 0.0, 0.0]),
            ],
        };
        assert!(matches!(
            GlobalTranslationsEncoder::from_triplets(4, &[stray]),
            Err(LinfError::Degenerate { what: "triplet", .. })
        ));
    }

    #[test]
    fn rows_and_bounds() {
        let motions = [motion(0, 1, [1.0, 0.0, 0.0]), motion(1, 2, [0.0, 2.0, 0.0])];
        let encoder = GlobalTranslationsEncoder::from_motions(3, &motions).unwrap();
        assert_eq!(encoder.parameter_count(), 11);
        let program = encoder.build(0.1);
        assert_eq!(program.matrix_shape(), (12, 11));
        assert_eq!(program.bounds().get(2), (0.0, 0.0));
        assert_eq!(program.bounds().get(9), (1.0, 1.0));
        assert_eq!(program.bounds().get(10), (0.0, 1e3));

        // t1 = (1, 0, 0), t2 = t1 + 3 * (0, 2, 0)
        let parameters = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 6.0, 0.0, 1.0, 3.0];
        assert_eq!(program.max_violation(&parameters), 0.0);
        let solution = encoder.unpack(&parameters);
        assert_eq!(solution.translations[2], Vector3::new(1.0, 6.0, 0.0));
        assert_eq!(solution.scales, vec![1.0, 3.0]);
        assert_eq!(encoder.residuals(&solution), vec![0.0, 0.0]);

        let shifted = [0.0, 0.0, 0.0, 1.0, 0.0, 0.25, 1.0, 6.0, 0.25, 1.0, 3.0];
        assert!((program.max_violation(&shifted) - 0.15).abs() < 1e-12);
    }
}
