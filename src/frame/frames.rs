use nalgebra::{IsometryMatrix3, Point3};

use super::Framed;

/// The sensor frame, in which the raw points of a scan are measured.
#[derive(Debug)]
pub struct Body;

/// The fixed frame of the map, anchored at the first scan.
#[derive(Debug)]
pub struct World;

pub type BodyPoint<T> = Framed<Point3<T>, Body>;
pub type WorldPoint<T> = Framed<Point3<T>, World>;

/// A sensor pose, mapping body points to the world frame.
pub type Pose<T> = Framed<IsometryMatrix3<T>, fn(Body) -> World>;
