use std::ops::Deref;

use nalgebra::RealField;

use super::config::OdometryOptions;
use crate::{
    frame::{Point3D, TrajectoryFrame},
    voxel_map::VoxelMap,
};

/// Motion metrics of a registered scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment<T> {
    /// Translation from the end of the previous scan to the beginning of
    /// this one.
    pub relative_distance: T,
    /// Rotation angle from the end of the previous scan to the beginning of
    /// this one.
    pub relative_orientation: T,
    /// How far the solver moved the poses away from the initial guess.
    pub distance_correction: T,
    /// Translation travelled during the scan.
    pub scan_distance: T,
    /// Rotation angle between the begin and end poses of the scan.
    pub scan_orientation: T,
}

/// Why an assessment failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: String,
    /// The failure is far beyond the thresholds, a tracking loss rather than
    /// noise.
    pub is_unambiguous: bool,
}

impl<T: RealField + Copy> Assessment<T> {
    pub fn new(
        frame: &TrajectoryFrame<T>,
        guess: &TrajectoryFrame<T>,
        previous: Option<&TrajectoryFrame<T>>,
    ) -> Self {
        Self {
            relative_distance: previous.map_or(T::zero(), |previous| frame.distance_from(previous)),
            relative_orientation: previous
                .map_or(T::zero(), |previous| frame.orientation_from(previous)),
            distance_correction: frame.correction_from(guess),
            scan_distance: frame.scan_distance(),
            scan_orientation: frame.scan_orientation(),
        }
    }

    /// Checks the metrics against the thresholds of `options`, the motion
    /// threshold being scaled by `time_scale` nominal scan periods.
    ///
    /// Every exceeded threshold is reported; the rejection is unambiguous if
    /// any of them is exceeded by more than `robust_fail_early_ratio`.
    pub fn check(&self, options: &OdometryOptions<T>, time_scale: T) -> Result<(), Rejection> {
        let ratio = options.robust_fail_early_ratio;
        let max_motion = options.robust_relative_trans_threshold * time_scale;
        let max_correction = options.distance_error_threshold;

        let violations: Vec<_> = [
            ("relative distance", self.relative_distance, max_motion),
            ("distance correction", self.distance_correction, max_correction),
        ]
        .into_iter()
        .filter(|(_, value, threshold)| value > threshold)
        .collect();

        if violations.is_empty() {
            return Ok(());
        }
        Err(Rejection {
            reason: violations
                .iter()
                .map(|(name, value, threshold)| format!("{name} {value:?} above {threshold:?}"))
                .collect::<Vec<_>>()
                .join(", "),
            is_unambiguous: violations
                .iter()
                .any(|(_, value, threshold)| *value > *threshold * ratio),
        })
    }
}

/// Elapsed time since the previous scan, in nominal scan periods. Falls back
/// to one period without usable timestamps.
pub fn elapsed_time_scale<T: RealField + Copy>(
    frame: &TrajectoryFrame<T>,
    previous: Option<&TrajectoryFrame<T>>,
    nominal_frame_period: T,
) -> T {
    previous
        .map(|previous| (frame.end_timestamp - previous.end_timestamp) / nominal_frame_period)
        .filter(|scale| *scale > T::zero())
        .unwrap_or_else(T::one)
}

/// Fraction of `keypoints` whose world position falls into a full voxel of
/// `map`.
pub fn full_voxel_ratio<T: RealField + Copy>(map: &VoxelMap<T>, keypoints: &[Point3D<T>]) -> T {
    if keypoints.is_empty() {
        return T::zero();
    }
    let full = keypoints
        .iter()
        .filter(|keypoint| map.is_full(&map.key_of(keypoint.world.deref())))
        .count();
    nalgebra::convert::<f64, T>(full as f64) / nalgebra::convert(keypoints.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frame::Pose, voxel_map::InsertParams};
    use approx::assert_relative_eq;
    use nalgebra::{IsometryMatrix3, Point3};

    fn pose(x: f64) -> Pose<f64> {
        Pose::new(IsometryMatrix3::translation(x, 0.0, 0.0))
    }

    fn robust_options() -> OdometryOptions<f64> {
        OdometryOptions {
            robust_registration: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_metrics() {
        let previous = TrajectoryFrame::new(pose(0.0), pose(1.0));
        let guess = TrajectoryFrame::new(pose(1.0), pose(2.0));
        let frame = TrajectoryFrame::new(pose(1.5), pose(2.25));
        let assessment = Assessment::new(&frame, &guess, Some(&previous));
        assert_relative_eq!(assessment.relative_distance, 0.5);
        assert_relative_eq!(assessment.relative_orientation, 0.0);
        assert_relative_eq!(assessment.distance_correction, 0.5);
        assert_relative_eq!(assessment.scan_distance, 0.75);

        let first = TrajectoryFrame::from_pose(pose(3.0));
        let first = Assessment::new(&first, &first, None);
        assert_relative_eq!(first.relative_distance, 0.0);
        assert_relative_eq!(first.distance_correction, 0.0);
    }

    #[test]
    fn test_jump_accepted_by_the_solver_is_rejected() {
        // the solver agrees with a guess 3 m away from the previous scan
        let previous = TrajectoryFrame::from_pose(pose(0.0));
        let frame = TrajectoryFrame::from_pose(pose(3.0));
        let assessment = Assessment::new(&frame, &frame, Some(&previous));
        assert_relative_eq!(assessment.distance_correction, 0.0);
        assert_relative_eq!(assessment.relative_distance, 3.0);

        let rejection = assessment.check(&robust_options(), 1.0).unwrap_err();
        assert!(rejection.reason.contains("relative distance"));
        assert!(rejection.is_unambiguous);
        assert!(assessment.check(&OdometryOptions::default(), 1.0).is_err());
    }

    #[test]
    fn test_check_thresholds() {
        let options = robust_options();
        let assessment = |relative_distance, distance_correction| Assessment {
            relative_distance,
            relative_orientation: 0.0,
            distance_correction,
            scan_distance: 0.0,
            scan_orientation: 0.0,
        };

        assert!(assessment(0.9, 4.0).check(&options, 1.0).is_ok());

        let rejection = assessment(1.5, 0.0).check(&options, 1.0).unwrap_err();
        assert!(!rejection.is_unambiguous);
        let rejection = assessment(2.5, 0.0).check(&options, 1.0).unwrap_err();
        assert!(rejection.is_unambiguous);
        // two periods elapsed, twice the motion is fine
        assert!(assessment(1.5, 0.0).check(&options, 2.0).is_ok());

        let rejection = assessment(0.0, 6.0).check(&options, 1.0).unwrap_err();
        assert!(!rejection.is_unambiguous);
        assert!(rejection.reason.contains("distance correction"));

        // one unambiguous threshold is enough to fail early
        let rejection = assessment(1.5, 11.0).check(&options, 1.0).unwrap_err();
        assert!(rejection.is_unambiguous);
        assert!(rejection.reason.contains("relative distance"));
        assert!(rejection.reason.contains("distance correction"));

        // both thresholds hold without robust registration too
        let options = OdometryOptions::default();
        assert!(assessment(10.0, 0.0).check(&options, 1.0).is_err());
        assert!(assessment(0.0, 6.0).check(&options, 1.0).is_err());
        assert!(assessment(0.9, 4.0).check(&options, 1.0).is_ok());
    }

    #[test]
    fn test_elapsed_time_scale() {
        let previous = TrajectoryFrame::default().with_timestamps(0.0, 0.1);
        let frame = TrajectoryFrame::default().with_timestamps(0.1, 0.3);
        assert_relative_eq!(elapsed_time_scale(&frame, Some(&previous), 0.1), 2.0, epsilon = 1e-9);
        assert_relative_eq!(elapsed_time_scale(&frame, None, 0.1), 1.0);

        let stale = TrajectoryFrame::default();
        assert_relative_eq!(elapsed_time_scale(&stale, Some(&previous), 0.1), 1.0);
    }

    #[test]
    fn test_full_voxel_ratio() {
        let mut map = VoxelMap::new(1.0, 2);
        let points: Vec<_> = [[0.1, 0.1, 0.1], [0.5, 0.5, 0.5], [1.5, 0.5, 0.5]]
            .into_iter()
            .map(|p| crate::frame::WorldPoint::new(Point3::from(p)))
            .collect();
        map.insert(
            &points,
            &InsertParams {
                max_num_points_in_voxel: 2,
                min_distance_points: 0.0,
            },
        );

        let keypoints: Vec<_> = [[0.2, 0.2, 0.2], [1.2, 0.2, 0.2]]
            .into_iter()
            .map(|p| Point3D::from_raw(Point3::from(p)))
            .collect();
        assert_relative_eq!(full_voxel_ratio(&map, &keypoints), 0.5);
        assert_relative_eq!(full_voxel_ratio(&map, &[]), 0.0);
    }
}
