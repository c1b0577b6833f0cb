use nalgebra::RealField;

use super::config::Initialization;
use crate::frame::{Point3D, Pose, TrajectoryFrame};

/// Initial guess of the trajectory frame of an incoming scan.
pub struct MotionPredictor {
    pub initialization: Initialization,
}

impl MotionPredictor {
    pub const fn new(initialization: Initialization) -> Self {
        Self { initialization }
    }

    /// Predicts the poses of the next scan from the trajectory so far.
    ///
    /// With fewer than two registered scans the sensor is assumed static at
    /// the last known pose, or at the origin for the first scan.
    pub fn predict<T: RealField + Copy>(&self, trajectory: &[TrajectoryFrame<T>]) -> TrajectoryFrame<T> {
        match (self.initialization, trajectory) {
            (Initialization::ConstantVelocity, [.., before_last, last]) => {
                let step = before_last.end_pose.inverse() * *last.end_pose;
                let begin = Pose::new(*last.end_pose * step);
                let end = Pose::new(*begin * step);
                TrajectoryFrame::new(begin, end)
            }
            (_, [.., last]) => TrajectoryFrame::from_pose(last.end_pose),
            (_, []) => TrajectoryFrame::default(),
        }
    }

    /// [`predict`](Self::predict) with the begin and end timestamps taken from
    /// the earliest and latest points of the scan.
    pub fn predict_with_timestamps<T: RealField + Copy>(
        &self,
        trajectory: &[TrajectoryFrame<T>],
        points: &[Point3D<T>],
    ) -> TrajectoryFrame<T> {
        let (begin_timestamp, end_timestamp) = timestamp_range(points).unwrap_or_else(|| {
            let last = trajectory.last().map_or(T::zero(), |frame| frame.end_timestamp);
            (last, last)
        });
        self.predict(trajectory)
            .with_timestamps(begin_timestamp, end_timestamp)
    }
}

fn timestamp_range<T: RealField + Copy>(points: &[Point3D<T>]) -> Option<(T, T)> {
    points.iter().fold(None, |range, point| {
        let t = point.timestamp;
        Some(match range {
            Some((min, max)) => (t.min(min), t.max(max)),
            None => (t, t),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{IsometryMatrix3, Point3, Vector3};

    fn frame_at(x: f64, yaw: f64) -> TrajectoryFrame<f64> {
        TrajectoryFrame::from_pose(Pose::new(IsometryMatrix3::new(
            Vector3::new(x, 0.0, 0.0),
            Vector3::z() * yaw,
        )))
    }

    #[test]
    fn test_static_prior() {
        let predictor = MotionPredictor::new(Initialization::None);
        assert_eq!(predictor.predict::<f64>(&[]), TrajectoryFrame::default());

        let trajectory = [frame_at(0.0, 0.0), frame_at(1.0, 0.1)];
        let predicted = predictor.predict(&trajectory);
        assert_eq!(predicted.begin_pose, trajectory[1].end_pose);
        assert_eq!(predicted.end_pose, trajectory[1].end_pose);
    }

    #[test]
    fn test_constant_velocity() {
        let predictor = MotionPredictor::new(Initialization::ConstantVelocity);

        // a single frame is not enough to estimate a velocity
        let trajectory = [frame_at(1.0, 0.0)];
        assert_eq!(
            predictor.predict(&trajectory),
            TrajectoryFrame::from_pose(trajectory[0].end_pose)
        );

        let trajectory = [frame_at(0.0, 0.0), frame_at(1.0, 0.0)];
        let predicted = predictor.predict(&trajectory);
        assert_relative_eq!(predicted.begin_translation().x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(predicted.end_translation().x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(predicted.scan_distance(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_velocity_with_rotation() {
        let predictor = MotionPredictor::new(Initialization::ConstantVelocity);
        let trajectory = [frame_at(0.0, 0.0), frame_at(0.0, 0.1)];
        let predicted = predictor.predict(&trajectory);
        assert_relative_eq!(predicted.begin_pose.rotation.angle(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(predicted.end_pose.rotation.angle(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_timestamps() {
        let predictor = MotionPredictor::new(Initialization::None);
        let points = [
            Point3D::new(Point3::origin(), 1.05, 0.5),
            Point3D::new(Point3::origin(), 1.0, 0.0),
            Point3D::new(Point3::origin(), 1.1, 1.0),
        ];
        let predicted = predictor.predict_with_timestamps(&[], &points);
        assert_relative_eq!(predicted.begin_timestamp, 1.0);
        assert_relative_eq!(predicted.end_timestamp, 1.1);
    }
}
