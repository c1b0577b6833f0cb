//! Synthetic scenes for the odometry tests.

#![allow(dead_code)]

use ct_odometry::{
    Point3D, Pose, Problem, Registered, Solver, SolverError, SolverOptions, TrajectoryFrame,
};
use nalgebra::{IsometryMatrix3, Point3, Vector3};

/// Half extent of the room along x and y.
pub const ROOM_HALF_WIDTH: f64 = 10.0;
pub const FLOOR: f64 = -2.0;
pub const CEILING: f64 = 3.0;

/// The surfaces of a closed box room, sampled on a regular grid with the
/// given step.
pub fn room(step: f64) -> Vec<Point3<f64>> {
    let width = 2.0 * ROOM_HALF_WIDTH;
    let height = CEILING - FLOOR;
    let across = (width / step).round() as usize;
    let up = (height / step).round() as usize;
    let at = |start: f64, i: usize| start + step * (i as f64 + 0.5);

    let mut points = Vec::with_capacity(2 * across * across + 4 * across * up);
    for i in 0..across {
        for j in 0..across {
            let (x, y) = (at(-ROOM_HALF_WIDTH, i), at(-ROOM_HALF_WIDTH, j));
            points.push(Point3::new(x, y, FLOOR));
            points.push(Point3::new(x, y, CEILING));
        }
        for k in 0..up {
            let (u, z) = (at(-ROOM_HALF_WIDTH, i), at(FLOOR, k));
            points.push(Point3::new(ROOM_HALF_WIDTH, u, z));
            points.push(Point3::new(-ROOM_HALF_WIDTH, u, z));
            points.push(Point3::new(u, ROOM_HALF_WIDTH, z));
            points.push(Point3::new(u, -ROOM_HALF_WIDTH, z));
        }
    }
    points
}

/// The scene as seen by a sensor at `pose`, every point acquired at once.
pub fn scan_at(scene: &[Point3<f64>], pose: &IsometryMatrix3<f64>) -> Vec<Point3D<f64>> {
    scene
        .iter()
        .map(|point| Point3D::from_raw(pose.inverse_transform_point(point)))
        .collect()
}

/// A sensor moving along x without rotating.
pub fn pose_x(x: f64) -> IsometryMatrix3<f64> {
    IsometryMatrix3::translation(x, 0.0, 0.0)
}

pub fn yawed(x: f64, y: f64, yaw: f64) -> IsometryMatrix3<f64> {
    IsometryMatrix3::new(Vector3::new(x, y, 0.0), Vector3::z() * yaw)
}

pub fn static_frame(pose: IsometryMatrix3<f64>) -> TrajectoryFrame<f64> {
    TrajectoryFrame::from_pose(Pose::new(pose))
}

fn register_at(problem: Problem<'_, f64>, frame: TrajectoryFrame<f64>) -> Registered<f64> {
    let mut keypoints = problem.keypoints.to_vec();
    frame.transform(&mut keypoints, false);
    Registered {
        frame,
        num_residuals: keypoints.len(),
        keypoints,
    }
}

/// Accepts the initial guess as is.
pub struct Echo;

impl Solver<f64> for Echo {
    fn register(
        &self,
        problem: Problem<'_, f64>,
        _options: &SolverOptions<f64>,
    ) -> Result<Registered<f64>, SolverError> {
        Ok(register_at(problem, *problem.initial_guess))
    }
}

/// Moves both poses of the guess by a fixed offset along x.
pub struct Drifting(pub f64);

impl Solver<f64> for Drifting {
    fn register(
        &self,
        problem: Problem<'_, f64>,
        _options: &SolverOptions<f64>,
    ) -> Result<Registered<f64>, SolverError> {
        let offset = IsometryMatrix3::translation(self.0, 0.0, 0.0);
        let guess = problem.initial_guess;
        let frame = TrajectoryFrame::new(
            Pose::new(offset * *guess.begin_pose),
            Pose::new(offset * *guess.end_pose),
        );
        Ok(register_at(problem, frame))
    }
}

/// Never finds enough residuals.
pub struct Starved;

impl Solver<f64> for Starved {
    fn register(
        &self,
        _problem: Problem<'_, f64>,
        options: &SolverOptions<f64>,
    ) -> Result<Registered<f64>, SolverError> {
        Err(SolverError::TooFewResiduals {
            found: 0,
            required: options.min_number_residuals,
        })
    }
}
