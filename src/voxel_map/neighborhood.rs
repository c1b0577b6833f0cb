use std::{cmp::Ordering, ops::Deref};

use nalgebra::{Point3, RealField, SymmetricEigen, Vector3};

use super::VoxelMap;
use crate::{frame::WorldPoint, utils::Moments};

/// A plane fitted to a neighborhood of map points.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPlane<T: RealField> {
    pub center: Point3<T>,
    /// Unit normal, the direction of least variance of the neighborhood.
    pub normal: Vector3<T>,
    /// `(σ2 - σ3) / σ1` where `σi` are the square roots of the covariance
    /// eigenvalues in decreasing order; close to 1 for a clean plane.
    pub planarity: T,
}

impl<T: RealField + Copy> VoxelMap<T> {
    /// The `max_neighbors` stored points nearest to `query`, searched in the
    /// `(2 * voxel_neighborhood + 1)^3` voxels around it, closest first.
    pub fn neighbors(
        &self,
        query: &Point3<T>,
        voxel_neighborhood: usize,
        max_neighbors: usize,
    ) -> Vec<WorldPoint<T>> {
        let center = self.key_of(query);
        let n = voxel_neighborhood as i64;

        let mut candidates = Vec::new();
        for dx in -n..=n {
            for dy in -n..=n {
                for dz in -n..=n {
                    let Some(points) = self.voxel(&center.offset(dx, dy, dz)) else {
                        continue;
                    };
                    candidates.extend(points.iter().map(|point| {
                        ((point.deref() - query).norm_squared(), *point)
                    }));
                }
            }
        }

        // TODO: a bounded heap would avoid sorting every candidate for large neighborhoods
        candidates.sort_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        candidates.truncate(max_neighbors);
        candidates.into_iter().map(|(_, point)| point).collect()
    }
}

impl<T: RealField + Copy> LocalPlane<T> {
    /// Returns `None` with fewer than three points or a degenerate spread.
    pub fn fit(points: &[WorldPoint<T>]) -> Option<Self> {
        let moments: Moments<T> = points.iter().map(|point| &point.coords).sum();
        if moments.count() < 3 {
            return None;
        }
        let (center, covariance) = moments.centroid_and_covariance()?;

        let SymmetricEigen {
            eigenvectors,
            eigenvalues,
        } = covariance.symmetric_eigen();

        let mut order = [0, 1, 2];
        order.sort_by(|&a, &b| {
            eigenvalues[b]
                .partial_cmp(&eigenvalues[a])
                .unwrap_or(Ordering::Equal)
        });
        let [s1, s2, s3] = order.map(|i| eigenvalues[i].max(T::zero()).sqrt());
        if s1 <= T::default_epsilon() {
            return None;
        }

        let normal = eigenvectors.column(order[2]).normalize();
        Some(Self {
            center: Point3::from(center),
            normal,
            planarity: (s2 - s3) / s1,
        })
    }

    /// Signed distance of `point` to the plane, along the normal.
    #[inline]
    pub fn distance_to(&self, point: &Point3<T>) -> T {
        self.normal.dot(&(point - self.center))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel_map::InsertParams;
    use approx::assert_relative_eq;

    fn grid_plane(z: f64, step: f64, extent: i32) -> Vec<WorldPoint<f64>> {
        (-extent..=extent)
            .flat_map(|i| {
                (-extent..=extent).map(move |j| {
                    WorldPoint::new(Point3::new(i as f64 * step, j as f64 * step, z))
                })
            })
            .collect()
    }

    #[test]
    fn test_plane_fit() {
        let points = grid_plane(1.0, 0.1, 3);
        let plane = LocalPlane::fit(&points).unwrap();
        assert_relative_eq!(plane.normal.z.abs(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(plane.center.z, 1.0, epsilon = 1e-9);
        assert!(plane.planarity > 0.9);
        assert_relative_eq!(
            plane.distance_to(&Point3::new(0.3, -0.2, 1.5)).abs(),
            0.5,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_degenerate_plane() {
        let points = vec![WorldPoint::new(Point3::new(1.0, 1.0, 1.0)); 5];
        assert!(LocalPlane::fit(&points).is_none());
        assert!(LocalPlane::fit(&points[..2]).is_none());
    }

    #[test]
    fn test_neighbors_sorted_and_bounded() {
        let mut map = VoxelMap::new(1.0, 50);
        let points = grid_plane(0.0, 0.25, 8);
        map.insert(
            &points,
            &InsertParams {
                max_num_points_in_voxel: 50,
                min_distance_points: 0.0,
            },
        );

        let query = Point3::new(0.1, 0.1, 0.2);
        let neighbors = map.neighbors(&query, 1, 10);
        assert_eq!(neighbors.len(), 10);
        assert_eq!(*neighbors[0].deref(), Point3::new(0.0, 0.0, 0.0));
        let distances: Vec<_> = neighbors
            .iter()
            .map(|p| nalgebra::distance(p.deref(), &query))
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));

        // nothing within reach of a far query
        assert!(map.neighbors(&Point3::new(50.0, 0.0, 0.0), 1, 10).is_empty());
    }
}
