use nalgebra::{Point3, RealField};
use std::hash::{Hash, Hasher};

/// Integer coordinates of a voxel, `floor(point / voxel_size)` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelKey {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl VoxelKey {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// see also Optimized Spatial Hashing for Collision Detection of Deformable Objects, Matthias Teschner et. al., VMV 2003
    #[inline]
    pub const fn spatial_hash(&self) -> u64 {
        (self.x.wrapping_mul(73856093) ^ self.y.wrapping_mul(19349663) ^ self.z.wrapping_mul(83492791))
            as u64
    }

    #[inline]
    pub const fn offset(&self, dx: i64, dy: i64, dz: i64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// Only the spatial hash is fed to the hasher, so [`VoxelKey`] can be used with
/// [`nohash_hasher`]. Equality still compares every coordinate.
impl Hash for VoxelKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.spatial_hash());
    }
}

impl nohash_hasher::IsEnabled for VoxelKey {}

pub trait ToVoxelKey<S> {
    fn as_voxel_key(&self, voxel_size: S) -> VoxelKey;
}

impl<T: RealField + Copy> ToVoxelKey<T> for Point3<T> {
    #[inline]
    fn as_voxel_key(&self, voxel_size: T) -> VoxelKey {
        let cell = |x: T| {
            let cell: f64 = (x / voxel_size).floor().to_subset_unchecked();
            cell as i64
        };
        VoxelKey::new(cell(self.x), cell(self.y), cell(self.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nohash_hasher::IntMap;

    #[test]
    fn test_voxel_key_floor() {
        let key = Point3::new(0.49, -0.01, 1.0).as_voxel_key(0.5);
        assert_eq!(key, VoxelKey::new(0, -1, 2));
    }

    #[test]
    fn test_int_map_with_voxel_keys() {
        let a = VoxelKey::new(0, 0, 0);
        let b = VoxelKey::new(-1, 2, 0).offset(1, -2, 0);
        let c = VoxelKey::new(1, 0, 0);
        let mut map = IntMap::default();
        map.insert(a, 1);
        map.insert(b, 2);
        map.insert(c, 3);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&a], 2);
        assert_eq!(map[&c], 3);
    }
}
