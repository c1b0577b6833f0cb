use std::ops::Deref;

use nalgebra::{IsometryMatrix3, RealField, Rotation3, Translation3, Vector3};

use super::{Point3D, Pose, WorldPoint};

/// The sensor motion over one scan: the pose at the first and at the last
/// acquired point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryFrame<T: RealField> {
    pub begin_pose: Pose<T>,
    pub end_pose: Pose<T>,
    pub begin_timestamp: T,
    pub end_timestamp: T,
}

impl<T: RealField + Copy> Default for TrajectoryFrame<T> {
    fn default() -> Self {
        Self::from_pose(Pose::new(IsometryMatrix3::identity()))
    }
}

impl<T: RealField + Copy> TrajectoryFrame<T> {
    pub fn new(begin_pose: Pose<T>, end_pose: Pose<T>) -> Self {
        Self {
            begin_pose,
            end_pose,
            begin_timestamp: T::zero(),
            end_timestamp: T::zero(),
        }
    }

    /// A static frame, begin and end at the same pose.
    pub fn from_pose(pose: Pose<T>) -> Self {
        Self::new(pose, pose)
    }

    pub fn with_timestamps(self, begin_timestamp: T, end_timestamp: T) -> Self {
        Self {
            begin_timestamp,
            end_timestamp,
            ..self
        }
    }

    #[inline]
    pub fn begin_translation(&self) -> &Vector3<T> {
        &self.begin_pose.translation.vector
    }

    #[inline]
    pub fn end_translation(&self) -> &Vector3<T> {
        &self.end_pose.translation.vector
    }

    /// The pose at `alpha` of the scan interval: rotations are slerped,
    /// translations interpolated linearly.
    pub fn pose_at(&self, alpha: T) -> Pose<T> {
        let rotation = self
            .begin_pose
            .rotation
            .slerp(&self.end_pose.rotation, alpha);
        let translation = self.begin_translation().lerp(self.end_translation(), alpha);
        Pose::new(IsometryMatrix3::from_parts(
            Translation3::from(translation),
            rotation,
        ))
    }

    #[inline]
    pub fn mid_pose(&self) -> Pose<T> {
        self.pose_at(nalgebra::convert(0.5))
    }

    /// The world coordinates of `point`, interpolating the pose at the point's
    /// acquisition time when `compensate` is set, using the end pose otherwise.
    pub fn transform_point(&self, point: &Point3D<T>, compensate: bool) -> WorldPoint<T> {
        if compensate {
            &point.raw * &self.pose_at(point.alpha_timestamp)
        } else {
            &point.raw * &self.end_pose
        }
    }

    /// Writes the world coordinates of every point.
    pub fn transform(&self, points: &mut [Point3D<T>], compensate: bool) {
        points.iter_mut().for_each(|point| {
            point.world = self.transform_point(point, compensate);
        });
    }

    /// Re-expresses the raw coordinates of the points in the end-of-scan
    /// sensor frame, removing the motion that happened during acquisition.
    pub fn distort_to_end(&self, points: &mut [Point3D<T>]) {
        let end_inverse = self.end_pose.inverse();
        points.iter_mut().for_each(|point| {
            let world = self.transform_point(point, true);
            *point.raw = &end_inverse * world.deref();
        });
    }

    /// Translation travelled during the scan.
    pub fn scan_distance(&self) -> T {
        (self.end_translation() - self.begin_translation()).norm()
    }

    /// Rotation angle between the begin and end poses, in radians.
    pub fn scan_orientation(&self) -> T {
        let relative: Rotation3<T> = self.begin_pose.rotation.inverse() * self.end_pose.rotation;
        relative.angle()
    }

    /// Translation from the end of `previous` to the beginning of this frame.
    pub fn distance_from(&self, previous: &Self) -> T {
        (self.begin_translation() - previous.end_translation()).norm()
    }

    /// Rotation angle from the end of `previous` to the beginning of this
    /// frame, in radians.
    pub fn orientation_from(&self, previous: &Self) -> T {
        let relative: Rotation3<T> =
            previous.end_pose.rotation.inverse() * self.begin_pose.rotation;
        relative.angle()
    }

    /// Largest translation of the begin or end pose away from `reference`.
    pub fn correction_from(&self, reference: &Self) -> T {
        let begin = (self.begin_translation() - reference.begin_translation()).norm();
        let end = (self.end_translation() - reference.end_translation()).norm();
        begin.max(end)
    }
}
