//! Sequential LiDAR odometry: every scan is registered against a local voxel
//! map built from the previously registered scans.
//!
//! Most of the ideas come from CT-ICP.

pub mod assess;
pub mod config;
pub mod downsample;
pub mod predict;
pub mod register;
mod summary;

use nalgebra::{IsometryMatrix3, Point3, RealField};
use tracing::{debug, info, warn};

pub use config::{Initialization, MotionCompensation, OdometryOptions, Profile};
pub use downsample::{Downsample, FrameSampler};
pub use predict::MotionPredictor;
pub use register::{AttemptParams, RegistrationController};
pub use summary::RegistrationSummary;

use crate::{
    algorithm::icp::{PointToPlaneIcp, Solver, SolverOptions},
    error::ConfigError,
    frame::{Point3D, Pose, TrajectoryFrame},
    voxel_map::VoxelMap,
};
use register::FrameInput;

/// # Pipeline
/// ```text
/// raw scan ─> subsample ─> keypoints ──────┐
///                │                         ├─> register ─> accepted? ─> map + trajectory
///                │   trajectory ─> guess ──┘
///                ╰───────────────────────────────────────────> corrected points
/// ```
///
/// Calls must be serialized: every scan depends on the map and trajectory
/// left by the previous ones. The map is only read while a scan is being
/// registered and only updated once it is accepted.
pub struct OdometryEngine<T, S = PointToPlaneIcp>
where
    T: RealField,
{
    options: OdometryOptions<T>,
    solver_options: SolverOptions<T>,
    solver: S,
    predictor: MotionPredictor,
    sampler: FrameSampler,
    trajectory: Vec<TrajectoryFrame<T>>,
    map: VoxelMap<T>,
}

impl<T> OdometryEngine<T>
where
    T: RealField + Copy,
{
    /// An engine using the [`PointToPlaneIcp`] solver.
    pub fn new(options: OdometryOptions<T>) -> Result<Self, ConfigError> {
        Self::with_solver(options, PointToPlaneIcp)
    }
}

impl<T, S> OdometryEngine<T, S>
where
    T: RealField + Copy,
    S: Solver<T>,
{
    pub fn with_solver(options: OdometryOptions<T>, solver: S) -> Result<Self, ConfigError> {
        options.validate()?;
        let solver_options = options.solver_options();
        let map = VoxelMap::new(solver_options.size_voxel_map, options.max_num_points_in_voxel);

        Ok(Self {
            predictor: MotionPredictor::new(options.initialization),
            sampler: FrameSampler::new(),
            trajectory: Vec::new(),
            map,
            solver_options,
            solver,
            options,
        })
    }

    /// Registers a scan, guessing its poses from the trajectory so far.
    pub fn register_frame(&mut self, points: &[Point3D<T>]) -> RegistrationSummary<T> {
        let guess = self
            .predictor
            .predict_with_timestamps(&self.trajectory, points);
        self.register_frame_with_guess(points, guess)
    }

    /// Registers a scan starting from `estimate` instead of the motion model.
    pub fn register_frame_with_estimate(
        &mut self,
        points: &[Point3D<T>],
        estimate: TrajectoryFrame<T>,
    ) -> RegistrationSummary<T> {
        self.register_frame_with_guess(points, estimate)
    }

    fn register_frame_with_guess(
        &mut self,
        points: &[Point3D<T>],
        guess: TrajectoryFrame<T>,
    ) -> RegistrationSummary<T> {
        let frame_index = self.trajectory.len();
        let (frame_voxel_size, sample_voxel_size) = self.options.sampling_sizes(frame_index);
        let frame = self
            .sampler
            .sample(points.iter().copied(), frame_voxel_size);

        let controller = RegistrationController {
            options: &self.options,
            solver_options: &self.solver_options,
            solver: &self.solver,
            map: &self.map,
            sampler: &mut self.sampler,
        };
        let mut summary = controller.run(FrameInput {
            points: frame,
            guess,
            previous: self.trajectory.last(),
            frame_index,
            frame_voxel_size,
            sample_voxel_size,
        });

        let mut all_corrected_points = points.to_vec();
        summary.frame.transform(
            &mut all_corrected_points,
            self.options.motion_compensation != MotionCompensation::None,
        );
        summary.all_corrected_points = all_corrected_points;

        if summary.success {
            self.insert_frame(&summary);
        } else {
            warn!(
                frame_index,
                attempts = summary.number_of_attempts,
                error = %summary.error_message(),
                "scan rejected"
            );
        }
        self.log_summary(frame_index, &summary);
        summary
    }

    fn insert_frame(&mut self, summary: &RegistrationSummary<T>) {
        self.map.insert(
            summary.corrected_points.iter().map(|point| &point.world),
            &self.options.insert_params(),
        );
        let location = Point3::from(*summary.frame.end_translation());
        let removed = self.map.prune(&location, self.options.max_distance);
        if removed > 0 {
            debug!(removed, "pruned voxels far from the sensor");
        }
        self.trajectory.push(summary.frame);
    }

    fn log_summary(&self, frame_index: usize, summary: &RegistrationSummary<T>) {
        macro_rules! log_at {
            ($level:ident) => {
                $level!(
                    frame_index,
                    success = summary.success,
                    attempts = summary.number_of_attempts,
                    sample_size = summary.sample_size,
                    keypoints = summary.number_keypoints,
                    relative_distance = ?summary.relative_distance,
                    relative_orientation = ?summary.relative_orientation,
                    distance_correction = ?summary.distance_correction,
                    scan_distance = ?summary.scan_distance,
                    map_voxels = self.map.num_voxels(),
                    "scan registered"
                )
            };
        }
        if self.options.debug_print {
            log_at!(info);
        } else {
            log_at!(debug);
        }
    }

    /// The end pose of the last registered scan, the origin before the first.
    pub fn last_inserted_pose(&self) -> Pose<T> {
        self.trajectory.last().map_or_else(
            || Pose::new(IsometryMatrix3::identity()),
            |frame| frame.end_pose,
        )
    }

    pub fn trajectory(&self) -> &[TrajectoryFrame<T>] {
        &self.trajectory
    }

    /// A snapshot of the map points, in world coordinates.
    pub fn local_map(&self) -> Vec<Point3<T>> {
        self.map.to_point_cloud()
    }

    /// Number of points in the map. Visits every voxel.
    pub fn map_size(&self) -> usize {
        self.map.size()
    }

    pub fn map(&self) -> &VoxelMap<T> {
        &self.map
    }

    pub fn options(&self) -> &OdometryOptions<T> {
        &self.options
    }

    pub fn num_registered_frames(&self) -> usize {
        self.trajectory.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithm::icp::{Problem, Registered},
        error::{RegistrationError, SolverError},
    };

    struct Failing;

    impl Solver<f64> for Failing {
        fn register(
            &self,
            _problem: Problem<'_, f64>,
            _options: &SolverOptions<f64>,
        ) -> Result<Registered<f64>, SolverError> {
            Err(SolverError::Degenerate)
        }
    }

    fn scan() -> Vec<Point3D<f64>> {
        (0..400)
            .map(|i| {
                let angle = i as f64 * 0.05;
                Point3D::from_raw(Point3::new(
                    5.0 * angle.cos(),
                    5.0 * angle.sin(),
                    (i % 7) as f64 * 0.3,
                ))
            })
            .collect()
    }

    #[test]
    fn test_invalid_options() {
        let options = OdometryOptions::<f64> {
            voxel_size: 0.0,
            ..Default::default()
        };
        assert!(OdometryEngine::new(options).is_err());
    }

    #[test]
    fn test_solver_failure_leaves_state_untouched() {
        let mut engine = OdometryEngine::with_solver(OdometryOptions::default(), Failing).unwrap();
        assert!(engine.register_frame(&scan()).success);
        let map = engine.local_map();

        let summary = engine.register_frame(&scan());
        assert!(!summary.success);
        assert_eq!(summary.number_of_attempts, 1);
        assert_eq!(
            summary.error,
            Some(RegistrationError::SolverNonConvergence(SolverError::Degenerate))
        );
        assert_eq!(summary.all_corrected_points.len(), 400);
        assert_eq!(summary.corrected_points.len(), summary.sample_size);
        assert_eq!(engine.trajectory().len(), 1);
        assert_eq!(engine.local_map(), map);
    }

    #[test]
    fn test_last_inserted_pose() {
        let mut engine = OdometryEngine::with_solver(OdometryOptions::default(), Failing).unwrap();
        assert_eq!(
            engine.last_inserted_pose(),
            Pose::new(IsometryMatrix3::identity())
        );
        engine.register_frame(&scan());
        assert_eq!(engine.num_registered_frames(), 1);
        assert!(engine.map_size() > 0);
        assert_eq!(engine.map_size(), engine.local_map().len());
    }
}
