pub mod frames;
mod point;
mod trajectory;

use std::{
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut, Mul},
};

pub use frames::*;
pub use point::{Point3D, normalize_alpha_timestamps};
pub use trajectory::TrajectoryFrame;

/// A value tagged with the coordinate frame it is expressed in.
///
/// Transforms are tagged with `fn(From) -> To`, so `point * transform` only
/// type-checks when the point lives in the transform's source frame.
pub struct Framed<T, F> {
    inner: T,
    frame: PhantomData<F>,
}

impl<T: Clone, F> Clone for Framed<T, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            frame: PhantomData,
        }
    }
}

impl<T: Copy, F> Copy for Framed<T, F> {}

impl<T: Default, F> Default for Framed<T, F> {
    fn default() -> Self {
        Self {
            inner: Default::default(),
            frame: PhantomData,
        }
    }
}

impl<T: fmt::Debug, F> fmt::Debug for Framed<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T: PartialEq, F> PartialEq for Framed<T, F> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T, F> Framed<T, F> {
    pub const fn new(inner: T) -> Self {
        Self {
            inner,
            frame: PhantomData,
        }
    }
}

impl<T, F> Deref for Framed<T, F> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T, F> DerefMut for Framed<T, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<'a, T1, T2, F1, F2> Mul<&'a Framed<T2, fn(F1) -> F2>> for &'a Framed<T1, F1>
where
    &'a T2: Mul<&'a T1>,
{
    type Output = Framed<<&'a T2 as Mul<&'a T1>>::Output, F2>;
    fn mul(self, transform: &'a Framed<T2, fn(F1) -> F2>) -> Self::Output {
        Framed {
            inner: transform.deref() * self.deref(),
            frame: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{IsometryMatrix3, Point3, Vector3};

    use super::*;

    #[test]
    fn test_body_point_to_world() {
        let pose = Pose::new(IsometryMatrix3::new(
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::z() * std::f64::consts::FRAC_PI_2,
        ));
        let point = BodyPoint::new(Point3::new(1.0, 0.0, 0.0));

        let world: WorldPoint<f64> = &point * &pose;
        assert!(nalgebra::distance(&world, &Point3::new(1.0, 2.0, 0.0)) < 1e-9);
    }
}
