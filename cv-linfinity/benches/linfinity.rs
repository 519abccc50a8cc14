use criterion::{criterion_group, criterion_main, Criterion};
use cv_linfinity::nalgebra::{Matrix3, Matrix3x4, Point2, Point3, Vector3};
use cv_linfinity::{
    LinfResection, LinfTriangulator, Observation, ResectionMatch, TranslationRegistration,
};

/// Cameras on a circle of radius 4 looking at the origin.
fn cameras(count: usize) -> Vec<(Matrix3<f64>, Vector3<f64>)> {
    (0..count)
        .map(|camera| {
            let angle = 2.0 * std::f64::consts::PI * camera as f64 / count as f64;
            let center = Vector3::new(4.0 * angle.cos(), 0.3, 4.0 * angle.sin());
            let forward = (-center).normalize();
            let right = Vector3::y().cross(&forward).normalize();
            let up = forward.cross(&right);
            let rotation =
                Matrix3::from_rows(&[right.transpose(), up.transpose(), forward.transpose()]);
            (rotation, -(rotation * center))
        })
        .collect()
}

fn points(count: usize) -> Vec<Point3<f64>> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            Point3::new((1.3 * t).sin(), (0.7 * t).cos(), (2.1 * t).sin())
        })
        .collect()
}

fn project(
    (rotation, translation): &(Matrix3<f64>, Vector3<f64>),
    point: &Point3<f64>,
) -> Point2<f64> {
    let x = rotation * point.coords + translation;
    Point2::new(x.x / x.z, x.y / x.z)
}

fn triangulate(c: &mut Criterion) {
    let poses = cameras(6);
    let point = Point3::new(0.2, -0.3, 0.1);
    let matrices: Vec<Matrix3x4<f64>> = poses
        .iter()
        .map(|(rotation, translation)| {
            let mut matrix = Matrix3x4::zeros();
            matrix.fixed_columns_mut::<3>(0).copy_from(rotation);
            matrix.set_column(3, translation);
            matrix
        })
        .collect();
    let observations: Vec<Point2<f64>> = poses.iter().map(|pose| project(pose, &point)).collect();
    let triangulator = LinfTriangulator::new();
    c.bench_function("triangulate_6_views", |b| {
        b.iter(|| triangulator.triangulate(&matrices, &observations))
    });
}

fn resect(c: &mut Criterion) {
    let poses = cameras(3);
    let matches: Vec<ResectionMatch> = points(20)
        .into_iter()
        .map(|point| ResectionMatch(project(&poses[0], &point), point))
        .collect();
    let resection = LinfResection::new();
    c.bench_function("resect_20_points", |b| b.iter(|| resection.resect(&matches)));
}

fn register(c: &mut Criterion) {
    let poses = cameras(8);
    let points = points(16);
    let rotations: Vec<Matrix3<f64>> = poses.iter().map(|(rotation, _)| *rotation).collect();
    let mut observations = Vec::new();
    for (camera_index, pose) in poses.iter().enumerate() {
        for (point_index, point) in points.iter().enumerate() {
            observations.push(Observation {
                point: project(pose, point),
                point_index,
                camera_index,
            });
        }
    }
    let registration = TranslationRegistration::new();
    c.bench_function("register_8_cameras_16_points", |b| {
        b.iter(|| registration.register(&rotations, &observations, points.len()))
    });
}

criterion_group!(
    name = linfinity;
    config = Criterion::default().sample_size(10);
    targets = triangulate, resect, register
);
criterion_main!(linfinity);
