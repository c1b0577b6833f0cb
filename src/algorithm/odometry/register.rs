//! Robust registration of one scan: attempts, assessment and retries.

use nalgebra::RealField;
use tracing::{debug, warn};

use super::{
    assess::{self, Assessment},
    config::{MotionCompensation, OdometryOptions},
    downsample::FrameSampler,
    summary::RegistrationSummary,
};
use crate::{
    algorithm::icp::{Problem, Solver, SolverOptions},
    error::RegistrationError,
    frame::{Point3D, TrajectoryFrame},
    voxel_map::VoxelMap,
};

/// The parameters of one registration attempt.
///
/// Every retry derives a new value with [`relaxed`](Self::relaxed), so the
/// inputs of each attempt can be reproduced on their own.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptParams<T> {
    pub solver: SolverOptions<T>,
    pub sample_voxel_size: T,
    /// Predicted translation above which the neighborhood is widened.
    pub neighborhood_min_dist: T,
    /// Predicted rotation above which the neighborhood is widened.
    pub neighborhood_min_orientation: T,
}

impl<T: RealField + Copy> AttemptParams<T> {
    pub fn new(options: &OdometryOptions<T>, solver: SolverOptions<T>, sample_voxel_size: T) -> Self {
        Self {
            solver,
            sample_voxel_size,
            neighborhood_min_dist: options.robust_neighborhood_min_dist,
            neighborhood_min_orientation: options.robust_neighborhood_min_orientation,
        }
    }

    /// More conservative parameters for the next attempt: wider neighborhood,
    /// more iterations, tighter convergence thresholds, looser plane distance
    /// and denser keypoints. Never less conservative than `self`.
    pub fn relaxed(&self, max_voxel_neighborhood: usize, frame_voxel_size: T) -> Self {
        let solver = &self.solver;
        let ten: T = nalgebra::convert(10.0);
        let two: T = nalgebra::convert(2.0);
        let one_and_half: T = nalgebra::convert(1.5);

        let shrink = |value: T, floor: T| {
            if value > floor {
                (value / ten).max(floor)
            } else {
                value
            }
        };

        Self {
            solver: SolverOptions {
                voxel_neighborhood: (solver.voxel_neighborhood + 1)
                    .min(max_voxel_neighborhood)
                    .max(solver.voxel_neighborhood),
                num_iters_icp: (solver.num_iters_icp + 20)
                    .min(50)
                    .max(solver.num_iters_icp),
                threshold_orientation_norm: shrink(
                    solver.threshold_orientation_norm,
                    nalgebra::convert(1e-5),
                ),
                threshold_translation_norm: shrink(
                    solver.threshold_translation_norm,
                    nalgebra::convert(1e-4),
                ),
                max_dist_to_plane: solver.max_dist_to_plane * one_and_half,
                ..solver.clone()
            },
            sample_voxel_size: (self.sample_voxel_size / one_and_half)
                .max(frame_voxel_size.min(self.sample_voxel_size)),
            neighborhood_min_dist: self.neighborhood_min_dist / two,
            neighborhood_min_orientation: self.neighborhood_min_orientation / two,
        }
    }

    /// The solver options of the attempt, with the neighborhood widened to at
    /// least two voxels when the predicted motion exceeds the trigger
    /// thresholds.
    pub fn solver_options(
        &self,
        guess: &TrajectoryFrame<T>,
        previous: Option<&TrajectoryFrame<T>>,
    ) -> SolverOptions<T> {
        let Some(previous) = previous else {
            return self.solver.clone();
        };
        let translation = (guess.end_translation() - previous.end_translation()).norm();
        let rotation = (previous.end_pose.rotation.inverse() * guess.end_pose.rotation).angle();

        if translation > self.neighborhood_min_dist
            || rotation > self.neighborhood_min_orientation
        {
            SolverOptions {
                voxel_neighborhood: self.solver.voxel_neighborhood.max(2),
                ..self.solver.clone()
            }
        } else {
            self.solver.clone()
        }
    }
}

/// Runs the attempts of one scan against a read-only map.
pub struct RegistrationController<'a, T: RealField, S> {
    pub options: &'a OdometryOptions<T>,
    pub solver_options: &'a SolverOptions<T>,
    pub solver: &'a S,
    pub map: &'a VoxelMap<T>,
    pub sampler: &'a mut FrameSampler,
}

/// The scan to register.
pub struct FrameInput<'a, T: RealField> {
    /// The subsampled scan, raw coordinates.
    pub points: Vec<Point3D<T>>,
    pub guess: TrajectoryFrame<T>,
    pub previous: Option<&'a TrajectoryFrame<T>>,
    pub frame_index: usize,
    /// Voxel size the scan was subsampled with.
    pub frame_voxel_size: T,
    /// Initial keypoint sampling voxel size.
    pub sample_voxel_size: T,
}

impl<T, S> RegistrationController<'_, T, S>
where
    T: RealField + Copy,
    S: Solver<T>,
{
    /// Registers the scan. The returned summary has no `all_corrected_points`.
    pub fn run(self, input: FrameInput<'_, T>) -> RegistrationSummary<T> {
        let Self {
            options,
            solver_options,
            solver,
            map,
            sampler,
        } = self;
        let FrameInput {
            mut points,
            guess,
            previous,
            frame_index,
            frame_voxel_size,
            sample_voxel_size,
        } = input;

        let mut summary = RegistrationSummary::new(guess);
        summary.sample_size = points.len();
        summary.number_of_attempts = 1;

        let required = options.min_number_keypoints;
        if points.is_empty() {
            warn!(frame_index, "empty scan after sampling");
            summary.error = Some(RegistrationError::SamplingDegenerate {
                found: 0,
                required: required.max(1),
            });
            return summary;
        }

        let compensate = solver_options.point_to_plane_with_distortion;
        if options.motion_compensation == MotionCompensation::ConstantVelocity
            && previous.is_some()
        {
            guess.distort_to_end(&mut points);
        }

        // the first scan defines the map
        let Some(previous) = previous else {
            let keypoints = sampler.sample(points.iter().copied(), sample_voxel_size);
            summary.number_keypoints = keypoints.len();
            guess.transform(&mut points, compensate);
            summary.corrected_points = points;
            summary.success = true;
            return summary;
        };

        let max_attempts = if options.robust_registration {
            options.robust_num_attempts
        } else {
            1
        };

        let mut params = AttemptParams::new(options, solver_options.clone(), sample_voxel_size);
        let mut last_error = None;
        let mut attempt = 0;
        while attempt < max_attempts {
            attempt += 1;
            summary.number_of_attempts = attempt;

            let keypoints = sampler.sample(points.iter().copied(), params.sample_voxel_size);
            summary.number_keypoints = keypoints.len();
            if keypoints.len() < required {
                warn!(
                    frame_index,
                    keypoints = keypoints.len(),
                    required,
                    "few keypoints, registering anyway"
                );
            }

            let attempt_options = if options.robust_registration {
                params.solver_options(&guess, Some(previous))
            } else {
                params.solver.clone()
            };
            let problem = Problem {
                map,
                keypoints: &keypoints,
                initial_guess: &guess,
                previous: Some(previous),
                frame_index,
            };

            let error = match solver.register(problem, &attempt_options) {
                Ok(registered) => {
                    let assessment = Assessment::new(&registered.frame, &guess, Some(previous));
                    summary.frame = registered.frame;
                    summary.relative_distance = assessment.relative_distance;
                    summary.relative_orientation = assessment.relative_orientation;
                    summary.distance_correction = assessment.distance_correction;
                    summary.scan_distance = assessment.scan_distance;
                    summary.scan_orientation = assessment.scan_orientation;

                    let time_scale = assess::elapsed_time_scale(
                        &registered.frame,
                        Some(previous),
                        options.nominal_frame_period,
                    );
                    match assessment.check(options, time_scale) {
                        Ok(()) => {
                            summary.full_voxel_ratio =
                                assess::full_voxel_ratio(map, &registered.keypoints);
                            if summary.full_voxel_ratio < options.robust_full_voxel_threshold {
                                debug!(
                                    frame_index,
                                    full_voxel_ratio = ?summary.full_voxel_ratio,
                                    "sparse overlap with the map"
                                );
                            }
                            registered.frame.transform(&mut points, compensate);
                            summary.corrected_points = points;
                            summary.success = true;
                            return summary;
                        }
                        Err(rejection) => {
                            let is_final =
                                options.robust_fail_early && rejection.is_unambiguous;
                            let error = RegistrationError::QualityRejected(rejection.reason);
                            if is_final {
                                debug!(frame_index, attempt, %error, "failing early");
                                summary.frame.transform(&mut points, compensate);
                                summary.corrected_points = points;
                                summary.error = Some(error);
                                return summary;
                            }
                            error
                        }
                    }
                }
                Err(error) => RegistrationError::from(error),
            };

            debug!(frame_index, attempt, %error, "registration attempt failed");
            last_error = Some(error);
            params = params.relaxed(options.robust_max_voxel_neighborhood, frame_voxel_size);
        }

        // the rejected scan, placed with the last candidate
        summary.frame.transform(&mut points, compensate);
        summary.corrected_points = points;
        summary.error = last_error.map(|last| {
            if options.robust_registration {
                RegistrationError::AttemptsExhausted {
                    attempts: attempt,
                    last: Box::new(last),
                }
            } else {
                last
            }
        });
        summary
    }
}
