use crate::rows::reprojection_error;
use nalgebra::{Matrix3x4, Point2, Point3, Vector3};
use sample_consensus::Model;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A normalized image coordinate matched to the 3d point it observes.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResectionMatch(pub Point2<f64>, pub Point3<f64>);

/// A 3x4 projection matrix `P` mapping homogeneous world points to homogeneous image points.
///
/// Image coordinates are normalized: the third row gives the depth, and `(x / z, y / z)` is
/// compared directly to the observation.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionMatrix(pub Matrix3x4<f64>);

impl ProjectionMatrix {
    /// `P · (X, 1)`
    pub fn transform(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.0 * point.to_homogeneous()
    }

    /// The image of `point`, or `None` if it does not lie in front of the camera.
    pub fn project(&self, point: &Point3<f64>) -> Option<Point2<f64>> {
        let camera = self.transform(point);
        if camera.z > 0.0 {
            Some(Point2::new(camera.x / camera.z, camera.y / camera.z))
        } else {
            None
        }
    }

    /// The L-infinity distance between `observation` and the image of `point`.
    ///
    /// Points behind the camera have an infinite error.
    pub fn reprojection_error(&self, observation: &Point2<f64>, point: &Point3<f64>) -> f64 {
        let camera = self.transform(point);
        reprojection_error([camera.x, camera.y, camera.z], observation)
    }

    /// The same projection scaled to unit Frobenius norm.
    pub fn normalized(&self) -> Self {
        Self(self.0.normalize())
    }
}

impl From<Matrix3x4<f64>> for ProjectionMatrix {
    fn from(matrix: Matrix3x4<f64>) -> Self {
        Self(matrix)
    }
}

impl Model<ResectionMatch> for ProjectionMatrix {
    fn residual(&self, data: &ResectionMatch) -> f64 {
        let ResectionMatch(observation, point) = data;
        self.reprojection_error(observation, point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> ProjectionMatrix {
        // Identity rotation, camera center at (0, 0, -4).
        ProjectionMatrix(Matrix3x4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 4.0,
        ))
    }

    #[test]
    fn projects_in_front() {
        let p = camera();
        let image = p.project(&Point3::new(1.0, -2.0, 0.0)).unwrap();
        assert_relative_eq!(image, Point2::new(0.25, -0.5));
        assert_eq!(p.project(&Point3::new(0.0, 0.0, -5.0)), None);
    }

    #[test]
    fn residual_is_linfinity() {
        let p = camera();
        let point = Point3::new(1.0, -2.0, 0.0);
        let observation = Point2::new(0.35, -0.45);
        assert_relative_eq!(
            p.residual(&ResectionMatch(observation, point)),
            0.1,
            epsilon = 1e-12
        );
        assert_eq!(
            p.residual(&ResectionMatch(observation, Point3::new(0.0, 0.0, -4.0))),
            f64::INFINITY
        );
    }

    #[test]
    fn normalization_keeps_projection() {
        let p = ProjectionMatrix(camera().0 * 3.0);
        let normalized = p.normalized();
        assert_relative_eq!(normalized.0.norm(), 1.0, epsilon = 1e-12);
        let point = Point3::new(0.5, 0.5, 1.0);
        assert_relative_eq!(
            normalized.project(&point).unwrap(),
            camera().project(&point).unwrap(),
            epsilon = 1e-12
        );
    }
}
