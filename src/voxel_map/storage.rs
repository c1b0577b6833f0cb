use std::ops::{Index, Range};

use nalgebra::Scalar;
use slab::Slab;

use super::index::VoxelKey;
use crate::frame::WorldPoint;

/// Point storage of the voxel map.
///
/// Voxel headers live in a [`Slab`], the points in one flat arena where the
/// voxel with id `i` owns the fixed block `i * capacity .. (i + 1) * capacity`.
/// A released voxel frees its slab entry, and the next allocated voxel reuses
/// the same block.
pub(crate) struct VoxelStorage<T: Scalar> {
    voxels: Slab<Voxel>,
    points: Vec<WorldPoint<T>>,
    capacity: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Voxel {
    pub(crate) key: VoxelKey,
    len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VoxelId(usize);

/// Mutable view of the occupied and free slots of one voxel.
pub(crate) struct VoxelSlotsMut<'a, T: Scalar> {
    pub(crate) len: &'a mut usize,
    pub(crate) slots: &'a mut [WorldPoint<T>],
}

impl<T: Scalar + Copy> VoxelStorage<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            voxels: Slab::new(),
            points: Vec::new(),
            capacity,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn block(&self, id: VoxelId) -> Range<usize> {
        let start = id.0 * self.capacity;
        start..start + self.capacity
    }

    /// Allocates a voxel holding `first` as its only point.
    pub(crate) fn alloc(&mut self, key: VoxelKey, first: WorldPoint<T>) -> VoxelId {
        let id = VoxelId(self.voxels.insert(Voxel { key, len: 1 }));
        let block = self.block(id);
        if self.points.len() < block.end {
            self.points.resize(block.end, first);
        }
        self.points[block.start] = first;
        id
    }

    /// Frees the voxel; its block is left in place for the next allocation.
    pub(crate) fn release(&mut self, id: VoxelId) {
        self.voxels.remove(id.0);
    }

    pub(crate) fn slots_mut(&mut self, id: VoxelId) -> VoxelSlotsMut<'_, T> {
        let block = self.block(id);
        let voxel = &mut self.voxels[id.0];
        VoxelSlotsMut {
            len: &mut voxel.len,
            slots: &mut self.points[block],
        }
    }

    /// The points of a voxel, in insertion order.
    pub(crate) fn points(&self, id: VoxelId) -> &[WorldPoint<T>] {
        let start = id.0 * self.capacity;
        &self.points[start..start + self.voxels[id.0].len]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (VoxelId, &Voxel)> {
        self.voxels.iter().map(|(id, voxel)| (VoxelId(id), voxel))
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.voxels.len()
    }
}

impl Voxel {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl<T: Scalar + Copy> Index<VoxelId> for VoxelStorage<T> {
    type Output = Voxel;

    #[inline]
    fn index(&self, id: VoxelId) -> &Self::Output {
        &self.voxels[id.0]
    }
}
