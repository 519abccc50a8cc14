#![allow(dead_code)]

use cv_linfinity::nalgebra::{Matrix3, Matrix3x4, Point2, Point3, Vector3};
use cv_linfinity::{Observation, ResectionMatch};
use rand::{rngs::SmallRng, Rng, SeedableRng};

pub const RADIUS: f64 = 4.0;

/// Cameras on a ring around the origin, all looking at it, and points inside the unit cube.
pub struct Scene {
    pub rotations: Vec<Matrix3<f64>>,
    pub translations: Vec<Vector3<f64>>,
    pub points: Vec<Point3<f64>>,
}

impl Scene {
    pub fn new(camera_count: usize, point_count: usize, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut rotations = Vec::with_capacity(camera_count);
        let mut translations = Vec::with_capacity(camera_count);
        for camera in 0..camera_count {
            let angle = 2.0 * std::f64::consts::PI * camera as f64 / camera_count as f64;
            let center = Vector3::new(
                RADIUS * angle.cos(),
                0.5 * (2.0 * angle).sin(),
                RADIUS * angle.sin(),
            );
            let forward = (-center).normalize();
            let right = Vector3::y().cross(&forward).normalize();
            let up = forward.cross(&right);
            let rotation = Matrix3::from_rows(&[
                right.transpose(),
                up.transpose(),
                forward.transpose(),
            ]);
            translations.push(-(rotation * center));
            rotations.push(rotation);
        }
        let points = (0..point_count)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                )
            })
            .collect();
        Self {
            rotations,
            translations,
            points,
        }
    }

    pub fn camera_count(&self) -> usize {
        self.rotations.len()
    }

    pub fn camera(&self, camera: usize) -> Matrix3x4<f64> {
        let mut matrix = Matrix3x4::zeros();
        matrix
            .fixed_columns_mut::<3>(0)
            .copy_from(&self.rotations[camera]);
        matrix.set_column(3, &self.translations[camera]);
        matrix
    }

    pub fn cameras(&self) -> Vec<Matrix3x4<f64>> {
        (0..self.camera_count()).map(|c| self.camera(c)).collect()
    }

    pub fn camera_frame(&self, camera: usize, point: &Point3<f64>) -> Vector3<f64> {
        self.rotations[camera] * point.coords + self.translations[camera]
    }

    pub fn project(&self, camera: usize, point: &Point3<f64>) -> Point2<f64> {
        let x = self.camera_frame(camera, point);
        Point2::new(x.x / x.z, x.y / x.z)
    }

    /// Every camera observes every point.
    pub fn observations(&self) -> Vec<Observation> {
        let mut observations = Vec::new();
        for camera_index in 0..self.camera_count() {
            for (point_index, point) in self.points.iter().enumerate() {
                observations.push(Observation {
                    point: self.project(camera_index, point),
                    point_index,
                    camera_index,
                });
            }
        }
        observations
    }

    pub fn resection_matches(&self, camera: usize) -> Vec<ResectionMatch> {
        self.points
            .iter()
            .map(|point| ResectionMatch(self.project(camera, point), *point))
            .collect()
    }

    /// Moves the world so that `offset` becomes the origin, without changing any image.
    pub fn shifted(&self, offset: Vector3<f64>) -> Self {
        Self {
            rotations: self.rotations.clone(),
            translations: self
                .rotations
                .iter()
                .zip(&self.translations)
                .map(|(rotation, translation)| translation + rotation * offset)
                .collect(),
            points: self.points.iter().map(|point| point - offset).collect(),
        }
    }

    pub fn center(&self, camera: usize) -> Vector3<f64> {
        -(self.rotations[camera].transpose() * self.translations[camera])
    }
}

pub fn init() {
    let _ = pretty_env_logger::try_init();
}
