use nalgebra::RealField;
use nohash_hasher::IntSet;

use crate::{
    frame::Point3D,
    voxel_map::{ToVoxelKey, VoxelKey},
};

/// Voxel grid sampler of raw scans.
///
/// Keeps the first point received in every voxel of the sensor frame, in the
/// order of first appearance, so the output only depends on the input order.
/// The grid is kept between calls to reuse its allocation.
pub struct FrameSampler {
    grid: IntSet<VoxelKey>,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self {
            grid: IntSet::default(),
        }
    }

    pub fn sample<T: RealField + Copy>(
        &mut self,
        points: impl IntoIterator<Item = Point3D<T>>,
        voxel_size: T,
    ) -> Vec<Point3D<T>> {
        points
            .into_iter()
            .voxel_grid_sample(voxel_size, &mut self.grid)
            .collect()
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Downsample<T: RealField + Copy>: Iterator<Item = Point3D<T>> + Sized {
    /// Keeps the first point of every voxel of size `voxel_size`, using `grid`
    /// to remember the visited voxels.
    ///
    /// Note that `grid` is cleared before sampling.
    fn voxel_grid_sample(
        self,
        voxel_size: T,
        grid: &mut IntSet<VoxelKey>,
    ) -> impl Iterator<Item = Point3D<T>> {
        grid.clear();
        self.filter(move |point| grid.insert(point.raw.as_voxel_key(voxel_size)))
    }
}

impl<T, I> Downsample<T> for I
where
    T: RealField + Copy,
    I: Iterator<Item = Point3D<T>>,
{
}
