use nalgebra::{Point3, RealField, Scalar};

use super::{BodyPoint, WorldPoint};

/// A LiDAR return, carried through every stage of the pipeline by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3D<T: Scalar> {
    /// Coordinates in the sensor frame at acquisition time.
    pub raw: BodyPoint<T>,
    /// Motion-compensated coordinates in the world frame.
    pub world: WorldPoint<T>,
    /// Absolute acquisition time, in seconds.
    pub timestamp: T,
    /// Acquisition time as a fraction of the scan interval, in `[0, 1]`.
    pub alpha_timestamp: T,
}

impl<T: RealField + Copy> Point3D<T> {
    pub fn new(raw: Point3<T>, timestamp: T, alpha_timestamp: T) -> Self {
        Self {
            raw: BodyPoint::new(raw),
            world: WorldPoint::new(raw),
            timestamp,
            alpha_timestamp,
        }
    }

    /// A point without timing information, acquired at the end of the scan.
    pub fn from_raw(raw: Point3<T>) -> Self {
        Self::new(raw, T::zero(), T::one())
    }
}

/// Recomputes `alpha_timestamp` of every point from the absolute timestamps,
/// mapping the earliest point to `0` and the latest to `1`.
///
/// Frames whose points share a single timestamp get `alpha = 1`.
pub fn normalize_alpha_timestamps<T: RealField + Copy>(points: &mut [Point3D<T>]) {
    let Some((min, max)) = points.iter().fold(None, |range: Option<(T, T)>, point| {
        let t = point.timestamp;
        Some(match range {
            Some((min, max)) => (min.min(t), max.max(t)),
            None => (t, t),
        })
    }) else {
        return;
    };

    let duration = max - min;
    points.iter_mut().for_each(|point| {
        point.alpha_timestamp = if duration > T::zero() {
            (point.timestamp - min) / duration
        } else {
            T::one()
        };
    });
}
