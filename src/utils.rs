use nalgebra::{Matrix3, RealField, Vector3};
use std::iter::Sum;

/// Accumulated first and second moments of a point set.
pub struct Moments<T: RealField> {
    count: usize,
    sum: Vector3<T>,
    outer_sum: Matrix3<T>,
}

impl<T: RealField + Copy> Moments<T> {
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// The centroid and the biased covariance, `None` for an empty set.
    pub fn centroid_and_covariance(&self) -> Option<(Vector3<T>, Matrix3<T>)> {
        if self.count == 0 {
            return None;
        }
        let count: T = nalgebra::convert(self.count as f64);
        let centroid = self.sum / count;
        Some((
            centroid,
            self.outer_sum / count - centroid * centroid.transpose(),
        ))
    }
}

impl<'a, T: RealField + Copy> Sum<&'a Vector3<T>> for Moments<T> {
    fn sum<I: Iterator<Item = &'a Vector3<T>>>(iter: I) -> Self {
        let empty = Self {
            count: 0,
            sum: Vector3::zeros(),
            outer_sum: Matrix3::zeros(),
        };
        iter.fold(empty, |mut moments, v| {
            moments.count += 1;
            moments.sum += v;
            moments.outer_sum += v * v.transpose();
            moments
        })
    }
}
