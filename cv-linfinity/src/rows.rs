//! The five linear rows every encoder emits for one observation.
//!
//! An encoder describes the camera-frame coordinates `x`, `y` and `z` of an observed point as
//! affine functions of its unknowns. Given the observed normalized image coordinates `(u, v)`,
//! the rows
//!
//! ```text
//! 0:   -z                ≤ -min_depth
//! 1:    x - (u + γ) z - s ≤ 0
//! 2:    y - (v + γ) z - s ≤ 0
//! 3:   -x + (u - γ) z - s ≤ 0
//! 4:   -y + (v - γ) z - s ≤ 0
//! ```
//!
//! bound the reprojection error of the observation by `γ` while keeping the point in front of
//! the camera. The optional slack `s` loosens the four reprojection rows.

use arrayvec::ArrayVec;
use cv_linprog::Sign;
use nalgebra::Point2;

/// Number of rows emitted per observation.
pub(crate) const ROWS_PER_OBSERVATION: usize = 5;

/// Coefficients of one row: three forms of up to four terms each and a slack.
pub(crate) type RowEntries = ArrayVec<(usize, f64), 13>;

/// `constant + Σ coefficient·x[column]`
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct AffineForm {
    terms: ArrayVec<(usize, f64), 4>,
    constant: f64,
}

impl AffineForm {
    pub(crate) fn constant(constant: f64) -> Self {
        Self {
            terms: ArrayVec::new(),
            constant,
        }
    }

    /// Adds `coefficient·x[column]`.
    ///
    /// Panics beyond four terms.
    #[must_use]
    pub(crate) fn term(mut self, column: usize, coefficient: f64) -> Self {
        self.terms.push((column, coefficient));
        self
    }

    pub(crate) fn evaluate(&self, x: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(column, coefficient)| coefficient * x[column])
            .sum::<f64>()
            + self.constant
    }
}

/// One `≤` row, possibly with repeated columns that the consumer must sum.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Row {
    pub entries: RowEntries,
    pub rhs: f64,
}

impl Row {
    /// All rows are inequalities of the same direction.
    pub(crate) const SIGN: Sign = Sign::LessOrEqual;

    /// `Σ α_k form_k (- slack) ≤ bound`
    fn combine(
        forms: &[AffineForm; 3],
        alphas: [f64; 3],
        bound: f64,
        slack: Option<usize>,
    ) -> Self {
        let mut entries = RowEntries::new();
        let mut rhs = bound;
        for (form, alpha) in forms.iter().zip(alphas) {
            if alpha == 0.0 {
                continue;
            }
            entries.extend(
                form.terms
                    .iter()
                    .map(|&(column, coefficient)| (column, alpha * coefficient)),
            );
            rhs -= alpha * form.constant;
        }
        if let Some(column) = slack {
            entries.push((column, -1.0));
        }
        Self { entries, rhs }
    }
}

/// The cheirality row followed by the four reprojection rows of one observation.
pub(crate) fn observation_rows(
    forms: &[AffineForm; 3],
    point: &Point2<f64>,
    gamma: f64,
    min_depth: f64,
    slack: Option<usize>,
) -> [Row; ROWS_PER_OBSERVATION] {
    let (u, v) = (point.x, point.y);
    [
        Row::combine(forms, [0.0, 0.0, -1.0], -min_depth, None),
        Row::combine(forms, [1.0, 0.0, -(u + gamma)], 0.0, slack),
        Row::combine(forms, [0.0, 1.0, -(v + gamma)], 0.0, slack),
        Row::combine(forms, [-1.0, 0.0, u - gamma], 0.0, slack),
        Row::combine(forms, [0.0, -1.0, v - gamma], 0.0, slack),
    ]
}

/// L-infinity distance between `point` and the projection of the camera-frame coordinates.
///
/// Infinite when the depth is not positive.
pub(crate) fn reprojection_error(camera: [f64; 3], point: &Point2<f64>) -> f64 {
    let [x, y, z] = camera;
    if z <= 0.0 {
        return f64::INFINITY;
    }
    (x / z - point.x).abs().max((y / z - point.y).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn forms() -> [AffineForm; 3] {
        [
            AffineForm::constant(0.5).term(0, 1.0),
            AffineForm::constant(-0.25).term(1, 1.0),
            AffineForm::constant(2.0).term(0, 0.5).term(2, 1.0),
        ]
    }

    fn evaluate(row: &Row, x: &[f64]) -> f64 {
        row.entries
            .iter()
            .map(|&(column, coefficient)| coefficient * x[column])
            .sum()
    }

    #[test]
    fn rows_bound_the_error() {
        let forms = forms();
        // x = 1.5, y = 0.75, z = 3.0 projects to (0.5, 0.25)
        let x = [1.0, 1.0, 0.5];
        let camera = [forms[0].evaluate(&x), forms[1].evaluate(&x), forms[2].evaluate(&x)];
        assert_eq!(camera, [1.5, 0.75, 3.0]);

        let exact = Point2::new(0.5, 0.25);
        let off = Point2::new(0.6, 0.25);
        for (point, gamma, feasible) in [
            (exact, 0.0, true),
            (off, 0.05, false),
            (off, 0.1 + 1e-12, true),
        ] {
            let rows = observation_rows(&forms, &point, gamma, 1.0, None);
            let satisfied = rows.iter().all(|row| evaluate(row, &x) <= row.rhs + 1e-12);
            assert_eq!(satisfied, feasible, "gamma {}", gamma);
        }
        assert_relative_eq!(reprojection_error(camera, &off), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn cheirality_margin() {
        let forms = forms();
        let x = [1.0, 1.0, 0.5];
        let rows = observation_rows(&forms, &Point2::new(0.5, 0.25), 0.0, 3.5, None);
        assert!(evaluate(&rows[0], &x) > rows[0].rhs);
        assert_eq!(reprojection_error([1.0, 1.0, -1.0], &Point2::origin()), f64::INFINITY);
    }

    #[test]
    fn slack_enters_reprojection_rows() {
        let rows = observation_rows(&forms(), &Point2::new(0.0, 0.0), 0.1, 0.0, Some(7));
        assert!(!rows[0].entries.iter().any(|&(column, _)| column == 7));
        for row in &rows[1..] {
            assert_eq!(row.entries.last(), Some(&(7, -1.0)));
        }
    }
}
