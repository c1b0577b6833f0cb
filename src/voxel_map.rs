pub mod index;
mod neighborhood;
mod storage;

use std::ops::Deref;

use nalgebra::{Point3, RealField, Scalar};
use nohash_hasher::IntMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

pub use index::{ToVoxelKey, VoxelKey};
pub use neighborhood::LocalPlane;

use crate::{
    context::{Contextual, WithContext},
    frame::WorldPoint,
    voxel_map::storage::{VoxelId, VoxelSlotsMut, VoxelStorage},
};

/// A sparse voxel hash map of world points, the local map registered against.
///
/// Every voxel holds at most `capacity` points in insertion order; once full,
/// new points are rejected rather than replacing older ones.
pub struct VoxelMap<T: Scalar> {
    index: IntMap<VoxelKey, VoxelId>,
    storage: VoxelStorage<T>,
    voxel_size: T,
}

/// Density constraints applied when inserting points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsertParams<T> {
    /// Maximum number of points kept in a voxel, clamped to the map capacity.
    pub max_num_points_in_voxel: usize,
    /// Minimum distance between two points of the same voxel.
    pub min_distance_points: T,
}

impl<T: RealField + Copy> VoxelMap<T> {
    pub fn new(voxel_size: T, max_num_points_in_voxel: usize) -> Self {
        Self {
            index: IntMap::default(),
            storage: VoxelStorage::new(max_num_points_in_voxel),
            voxel_size,
        }
    }

    #[inline]
    pub fn voxel_size(&self) -> T {
        self.voxel_size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    #[inline]
    pub fn key_of(&self, point: &Point3<T>) -> VoxelKey {
        point.as_voxel_key(self.voxel_size)
    }

    /// Inserts every point whose voxel still has room and which keeps at least
    /// `min_distance_points` from the points already in that voxel. Returns the
    /// number of points actually stored.
    pub fn insert<'a>(
        &mut self,
        points: impl IntoIterator<Item = &'a WorldPoint<T>>,
        params: &InsertParams<T>,
    ) -> usize {
        let params = InsertParams {
            max_num_points_in_voxel: params.max_num_points_in_voxel.min(self.capacity()),
            ..*params
        };
        if params.max_num_points_in_voxel == 0 {
            return 0;
        }

        let inserted = points
            .into_iter()
            .map(|point| self.insert_point(*point, &params))
            .filter(|&is_inserted| is_inserted)
            .count();
        trace!(inserted, voxels = self.num_voxels(), "map updated");
        inserted
    }

    fn insert_point(&mut self, point: WorldPoint<T>, params: &InsertParams<T>) -> bool {
        let key = self.key_of(&point);
        match self.index.get(&key) {
            Some(&id) => self.storage.slots_mut(id).with_context(params).push(point),
            None => {
                let id = self.storage.alloc(key, point);
                self.index.insert(key, id);
                true
            }
        }
    }

    /// Removes every voxel whose representative point (its first point) is
    /// farther than `max_distance` from `location`. Returns the number of
    /// removed voxels.
    pub fn prune(&mut self, location: &Point3<T>, max_distance: T) -> usize {
        let max_distance_squared = max_distance * max_distance;
        let Self { index, storage, .. } = self;
        let before = index.len();
        index.retain(|_, id| {
            let keep = storage
                .points(*id)
                .first()
                .is_some_and(|representative| {
                    (representative.deref() - location).norm_squared() <= max_distance_squared
                });
            if !keep {
                storage.release(*id);
            }
            keep
        });
        before - index.len()
    }

    /// Iterates over all stored points, voxel by voxel.
    pub fn iter(&self) -> impl Iterator<Item = &WorldPoint<T>> {
        let storage = &self.storage;
        storage
            .iter()
            .flat_map(move |(id, _)| storage.points(id).iter())
    }

    /// Keys of the occupied voxels.
    pub fn keys(&self) -> impl Iterator<Item = VoxelKey> {
        self.storage.iter().map(|(_, voxel)| voxel.key)
    }

    /// A snapshot of the stored points in world coordinates.
    pub fn to_point_cloud(&self) -> Vec<Point3<T>> {
        self.iter().map(|point| *point.deref()).collect()
    }

    /// The points of the voxel with the given key, in insertion order.
    pub fn voxel(&self, key: &VoxelKey) -> Option<&[WorldPoint<T>]> {
        self.index.get(key).map(|&id| self.storage.points(id))
    }

    /// Whether the voxel with the given key has reached the map capacity.
    pub fn is_full(&self, key: &VoxelKey) -> bool {
        self.index
            .get(key)
            .is_some_and(|&id| self.storage[id].len() >= self.capacity())
    }

    /// Number of stored points.
    ///
    /// Note that this visits every voxel.
    pub fn size(&self) -> usize {
        self.storage.iter().map(|(_, voxel)| voxel.len()).sum()
    }

    #[inline]
    pub fn num_voxels(&self) -> usize {
        self.storage.len()
    }
}

impl<T> Contextual<VoxelSlotsMut<'_, T>, &InsertParams<T>>
where
    T: RealField + Copy,
{
    /// Returns `false` if the voxel is full or the point is too close to a
    /// stored one.
    fn push(&mut self, point: WorldPoint<T>) -> bool {
        let Contextual {
            inner: VoxelSlotsMut { len, slots },
            context: params,
        } = self;

        let len_value = **len;
        if len_value >= params.max_num_points_in_voxel {
            return false;
        }

        let min_distance_squared = params.min_distance_points * params.min_distance_points;
        let too_close = slots[..len_value]
            .iter()
            .any(|stored| (stored.deref() - point.deref()).norm_squared() < min_distance_squared);
        if too_close {
            return false;
        }

        slots[len_value] = point;
        **len += 1;
        true
    }
}
