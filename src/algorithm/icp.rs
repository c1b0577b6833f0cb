//! Point-to-plane registration of keypoints against the voxel map.

mod normal_equations;
mod options;

use std::ops::Deref;

use nalgebra::{IsometryMatrix3, Point3, RealField, Rotation3, SVector, Translation3, Vector3};
use rayon::prelude::*;
use tracing::trace;

pub use options::{DistanceMetric, SolverOptions};

use crate::{
    error::SolverError,
    frame::{Point3D, Pose, TrajectoryFrame},
    voxel_map::{LocalPlane, VoxelMap},
};
use normal_equations::NormalEquations;

/// Everything a solver may read to register one frame.
#[derive(Clone, Copy)]
pub struct Problem<'a, T: RealField> {
    /// The reference map, read-only during the registration.
    pub map: &'a VoxelMap<T>,
    /// Keypoints, in raw coordinates with their `alpha_timestamp`.
    pub keypoints: &'a [Point3D<T>],
    pub initial_guess: &'a TrajectoryFrame<T>,
    /// The last registered frame, if any.
    pub previous: Option<&'a TrajectoryFrame<T>>,
    /// Index of the frame in the sequence.
    pub frame_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registered<T: RealField> {
    pub frame: TrajectoryFrame<T>,
    /// The keypoints with world coordinates from `frame`.
    pub keypoints: Vec<Point3D<T>>,
    /// Number of residuals of the last iteration.
    pub num_residuals: usize,
}

/// Optimizes the trajectory frame of a scan given the map and an initial
/// guess.
///
/// Implementations must be deterministic: identical inputs give identical
/// outputs.
pub trait Solver<T: RealField> {
    fn register(
        &self,
        problem: Problem<'_, T>,
        options: &SolverOptions<T>,
    ) -> Result<Registered<T>, SolverError>;
}

impl<T: RealField, S: Solver<T> + ?Sized> Solver<T> for &S {
    fn register(
        &self,
        problem: Problem<'_, T>,
        options: &SolverOptions<T>,
    ) -> Result<Registered<T>, SolverError> {
        (**self).register(problem, options)
    }
}

/// Gauss-Newton point-to-plane ICP.
///
/// With [`DistanceMetric::PointToPlane`] a single rigid update is estimated
/// per iteration, applied to both poses, or to the end pose only when the
/// keypoints are distorted along the scan. With
/// [`DistanceMetric::CtPointToPlane`] the begin and end poses are estimated
/// jointly, each residual contributing to both in proportion to its
/// `alpha_timestamp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointToPlaneIcp;

/// One keypoint matched to a local plane of the map.
struct Residual<T: RealField> {
    world: Point3<T>,
    normal: Vector3<T>,
    distance: T,
    weight: T,
    alpha: T,
}

impl<T: RealField + Copy> Solver<T> for PointToPlaneIcp {
    fn register(
        &self,
        problem: Problem<'_, T>,
        options: &SolverOptions<T>,
    ) -> Result<Registered<T>, SolverError> {
        let Problem {
            map,
            keypoints,
            initial_guess,
            previous,
            frame_index,
        } = problem;

        let is_initializing = frame_index < options.init_num_frames;
        let voxel_neighborhood = if is_initializing {
            options.voxel_neighborhood.max(2)
        } else {
            options.voxel_neighborhood
        };
        let regularization = previous.filter(|_| !is_initializing);

        let compensate = options.point_to_plane_with_distortion;
        let mut frame = *initial_guess;
        let mut keypoints = keypoints.to_vec();
        let mut num_residuals = 0;

        for iteration in 0..options.num_iters_icp {
            frame.transform(&mut keypoints, compensate);
            let residuals = collect_residuals(map, &keypoints, voxel_neighborhood, options);
            num_residuals = residuals.len();
            if num_residuals < options.min_number_residuals {
                return Err(SolverError::TooFewResiduals {
                    found: num_residuals,
                    required: options.min_number_residuals,
                });
            }

            let (rotation_norm, translation_norm) = match options.distance {
                DistanceMetric::PointToPlane => {
                    rigid_step(&mut frame, &residuals, compensate, options.damping)?
                }
                DistanceMetric::CtPointToPlane => {
                    continuous_step(&mut frame, &residuals, regularization, options)?
                }
            };
            trace!(
                iteration,
                num_residuals,
                rotation_norm = ?rotation_norm,
                translation_norm = ?translation_norm,
                "icp iteration"
            );

            if rotation_norm < options.threshold_orientation_norm
                && translation_norm < options.threshold_translation_norm
            {
                break;
            }
        }

        frame.transform(&mut keypoints, compensate);
        Ok(Registered {
            frame,
            keypoints,
            num_residuals,
        })
    }
}

fn collect_residuals<T: RealField + Copy>(
    map: &VoxelMap<T>,
    keypoints: &[Point3D<T>],
    voxel_neighborhood: usize,
    options: &SolverOptions<T>,
) -> Vec<Residual<T>> {
    keypoints
        .par_iter()
        .filter_map(|keypoint| {
            let query = keypoint.world.deref();
            let neighbors = map.neighbors(query, voxel_neighborhood, options.max_number_neighbors);
            if neighbors.len() < options.min_number_neighbors {
                return None;
            }

            let plane = LocalPlane::fit(&neighbors)?;
            let distance = plane.distance_to(query);
            if distance.abs() > options.max_dist_to_plane {
                return None;
            }

            Some(Residual {
                world: *query,
                normal: plane.normal,
                distance,
                weight: plane.planarity.powf(options.power_planarity),
                alpha: keypoint.alpha_timestamp,
            })
        })
        .collect()
}

/// Left-multiplies `pose` by the rotation `rotation` about `pivot` followed by
/// the translation `translation`.
fn perturb<T: RealField + Copy>(
    pose: &Pose<T>,
    rotation: &Rotation3<T>,
    pivot: &Vector3<T>,
    translation: &Vector3<T>,
) -> Pose<T> {
    let position = rotation * (pose.translation.vector - pivot) + pivot + translation;
    Pose::new(IsometryMatrix3::from_parts(
        Translation3::from(position),
        rotation * pose.rotation,
    ))
}

fn check_finite<T: RealField + Copy, const D: usize>(
    delta: SVector<T, D>,
) -> Result<SVector<T, D>, SolverError> {
    if delta.iter().all(|x| x.is_finite()) {
        Ok(delta)
    } else {
        Err(SolverError::Diverged)
    }
}

/// One rigid update `[δθ, δt]` about the end pose. Returns the update norms.
fn rigid_step<T: RealField + Copy>(
    frame: &mut TrajectoryFrame<T>,
    residuals: &[Residual<T>],
    end_only: bool,
    damping: T,
) -> Result<(T, T), SolverError> {
    let pivot = *frame.end_translation();

    let mut equations = NormalEquations::<T, 6>::new();
    for residual in residuals {
        let lever = (residual.world.coords - pivot).cross(&residual.normal);
        let jacobian = SVector::<T, 6>::from_iterator(
            lever.iter().chain(residual.normal.iter()).copied(),
        );
        equations.add_residual(&jacobian, residual.distance, residual.weight);
    }
    let delta = check_finite(equations.solve(damping).ok_or(SolverError::Degenerate)?)?;

    let rotation_vector: Vector3<T> = delta.fixed_rows::<3>(0).into_owned();
    let translation: Vector3<T> = delta.fixed_rows::<3>(3).into_owned();
    let rotation = Rotation3::new(rotation_vector);

    frame.end_pose = perturb(&frame.end_pose, &rotation, &pivot, &translation);
    if !end_only {
        frame.begin_pose = perturb(&frame.begin_pose, &rotation, &pivot, &translation);
    }
    Ok((rotation_vector.norm(), translation.norm()))
}

/// One joint update `[δθb, δtb, δθe, δte]` of the begin and end poses.
/// Returns the largest rotation and translation norms.
fn continuous_step<T: RealField + Copy>(
    frame: &mut TrajectoryFrame<T>,
    residuals: &[Residual<T>],
    previous: Option<&TrajectoryFrame<T>>,
    options: &SolverOptions<T>,
) -> Result<(T, T), SolverError> {
    let begin_pivot = *frame.begin_translation();
    let end_pivot = *frame.end_translation();

    let mut equations = NormalEquations::<T, 12>::new();
    for residual in residuals {
        let end_weight = residual.alpha;
        let begin_weight = T::one() - end_weight;
        let begin_lever = (residual.world.coords - begin_pivot).cross(&residual.normal) * begin_weight;
        let end_lever = (residual.world.coords - end_pivot).cross(&residual.normal) * end_weight;
        let begin_normal = residual.normal * begin_weight;
        let end_normal = residual.normal * end_weight;
        let jacobian = SVector::<T, 12>::from_iterator(
            begin_lever
                .iter()
                .chain(begin_normal.iter())
                .chain(end_lever.iter())
                .chain(end_normal.iter())
                .copied(),
        );
        equations.add_residual(&jacobian, residual.distance, residual.weight);
    }

    if let Some(previous) = previous {
        let scale: T = nalgebra::convert(residuals.len() as f64);
        let location_weight = options.beta_location_consistency * scale;
        let velocity_weight = options.beta_constant_velocity * scale;

        // begin of this scan at the end of the previous one
        let location_gap = begin_pivot - previous.end_translation();
        // same displacement as the previous scan
        let velocity_gap = (end_pivot - begin_pivot)
            - (previous.end_translation() - previous.begin_translation());

        for axis in 0..3 {
            let jacobian = SVector::<T, 12>::ith(3 + axis, T::one());
            equations.add_residual(&jacobian, location_gap[axis], location_weight);

            let mut jacobian = SVector::<T, 12>::zeros();
            jacobian[3 + axis] = -T::one();
            jacobian[9 + axis] = T::one();
            equations.add_residual(&jacobian, velocity_gap[axis], velocity_weight);
        }
    }

    let delta = check_finite(
        equations
            .solve(options.damping)
            .ok_or(SolverError::Degenerate)?,
    )?;

    let begin_rotation: Vector3<T> = delta.fixed_rows::<3>(0).into_owned();
    let begin_translation: Vector3<T> = delta.fixed_rows::<3>(3).into_owned();
    let end_rotation: Vector3<T> = delta.fixed_rows::<3>(6).into_owned();
    let end_translation: Vector3<T> = delta.fixed_rows::<3>(9).into_owned();

    frame.begin_pose = perturb(
        &frame.begin_pose,
        &Rotation3::new(begin_rotation),
        &begin_pivot,
        &begin_translation,
    );
    frame.end_pose = perturb(
        &frame.end_pose,
        &Rotation3::new(end_rotation),
        &end_pivot,
        &end_translation,
    );

    Ok((
        begin_rotation.norm().max(end_rotation.norm()),
        begin_translation.norm().max(end_translation.norm()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel_map::InsertParams;
    use approx::assert_relative_eq;

    /// A floor and two walls, apart from each other so that no neighborhood
    /// mixes two planes, sampled every `step`.
    fn three_planes(step: f64) -> Vec<Point3<f64>> {
        let n = (4.0 / step) as i32;
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let (u, v) = (i as f64 * step - 2.0, j as f64 * step - 2.0);
                points.push(Point3::new(u, v, -1.0));
                points.push(Point3::new(u, 3.0, v + 2.0));
                points.push(Point3::new(3.0, u, v + 2.0));
            }
        }
        points
    }

    fn map_of(points: &[Point3<f64>]) -> VoxelMap<f64> {
        let mut map = VoxelMap::new(1.0, 30);
        let points: Vec<_> = points
            .iter()
            .map(|p| crate::frame::WorldPoint::new(*p))
            .collect();
        map.insert(
            &points,
            &InsertParams {
                max_num_points_in_voxel: 30,
                min_distance_points: 0.15,
            },
        );
        map
    }

    fn options(distance: DistanceMetric, distortion: bool) -> SolverOptions<f64> {
        SolverOptions {
            num_iters_icp: 30,
            min_number_residuals: 50,
            max_dist_to_plane: 0.5,
            point_to_plane_with_distortion: distortion,
            distance,
            init_num_frames: 0,
            ..Default::default()
        }
    }

    fn keypoints(points: &[Point3<f64>], step: usize) -> Vec<Point3D<f64>> {
        points
            .iter()
            .step_by(step)
            .map(|p| Point3D::new(*p, 0.0, 1.0))
            .collect()
    }

    #[test]
    fn test_rigid_registration_recovers_offset() {
        let map = map_of(&three_planes(0.1));
        let keypoints = keypoints(&three_planes(0.1), 7);
        let guess = TrajectoryFrame::from_pose(Pose::new(IsometryMatrix3::new(
            Vector3::new(0.1, -0.08, 0.05),
            Vector3::z() * 0.02,
        )));

        let registered = PointToPlaneIcp
            .register(
                Problem {
                    map: &map,
                    keypoints: &keypoints,
                    initial_guess: &guess,
                    previous: None,
                    frame_index: 0,
                },
                &options(DistanceMetric::PointToPlane, false),
            )
            .unwrap();

        let end = registered.frame.end_pose;
        assert_relative_eq!(end.translation.vector, Vector3::zeros(), epsilon = 1e-2);
        assert!(end.rotation.angle() < 1e-2);
        assert_eq!(registered.frame.begin_pose, registered.frame.end_pose);
        assert_eq!(registered.keypoints.len(), keypoints.len());
    }

    #[test]
    fn test_continuous_registration_is_deterministic() {
        let map = map_of(&three_planes(0.1));
        let keypoints: Vec<_> = three_planes(0.1)
            .iter()
            .step_by(5)
            .enumerate()
            .map(|(i, p)| Point3D::new(*p, 0.0, (i % 10) as f64 / 9.0))
            .collect();
        let guess = TrajectoryFrame::from_pose(Pose::new(IsometryMatrix3::translation(
            0.05, 0.05, 0.0,
        )));
        let problem = Problem {
            map: &map,
            keypoints: &keypoints,
            initial_guess: &guess,
            previous: None,
            frame_index: 0,
        };
        let options = options(DistanceMetric::CtPointToPlane, true);

        let first = PointToPlaneIcp.register(problem, &options).unwrap();
        let second = PointToPlaneIcp.register(problem, &options).unwrap();
        assert_eq!(first, second);
        assert!(first.frame.end_translation().norm() < 0.05);
    }

    #[test]
    fn test_too_few_residuals() {
        let map = map_of(&three_planes(0.1));
        let keypoints = keypoints(&three_planes(0.1), 7);
        let guess = TrajectoryFrame::from_pose(Pose::new(IsometryMatrix3::translation(
            50.0, 0.0, 0.0,
        )));

        let result = PointToPlaneIcp.register(
            Problem {
                map: &map,
                keypoints: &keypoints,
                initial_guess: &guess,
                previous: None,
                frame_index: 0,
            },
            &options(DistanceMetric::PointToPlane, false),
        );
        assert_eq!(
            result,
            Err(SolverError::TooFewResiduals {
                found: 0,
                required: 50
            })
        );
    }
}
