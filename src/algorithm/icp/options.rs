use serde::{Deserialize, Serialize};
use simba::scalar::SupersetOf;

/// Residual used by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceMetric {
    /// Rigid point-to-plane distance, one pose estimated per scan.
    #[default]
    PointToPlane,
    /// Point-to-plane distance of points interpolated between the begin and
    /// end poses, both poses estimated jointly.
    CtPointToPlane,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Deserialize<'de> + SupersetOf<f64>"))]
pub struct SolverOptions<T> {
    /// Voxel size of the map the solver searches in.
    pub size_voxel_map: T,

    pub num_iters_icp: usize,

    /// Radius, in voxels, of the neighborhood searched around a keypoint.
    pub voxel_neighborhood: usize,

    pub min_number_neighbors: usize,

    pub max_number_neighbors: usize,

    /// Exponent of the planarity used to weight each residual.
    pub power_planarity: T,

    /// Residuals farther from their plane are dropped.
    pub max_dist_to_plane: T,

    /// The solver stops once the rotation update norm falls below this value
    /// (and the translation one below `threshold_translation_norm`).
    pub threshold_orientation_norm: T,

    pub threshold_translation_norm: T,

    /// Weight of the constraint pulling the beginning of the scan onto the
    /// end of the previous one.
    pub beta_location_consistency: T,

    /// Weight of the constraint keeping the scan displacement close to the
    /// previous one.
    pub beta_constant_velocity: T,

    /// Fewer residuals than this fails the registration.
    pub min_number_residuals: usize,

    /// Diagonal damping added to the normal equations.
    pub damping: T,

    /// Whether keypoints are interpolated along the scan at every iteration.
    pub point_to_plane_with_distortion: bool,

    pub distance: DistanceMetric,

    /// Scans registered with a widened neighborhood while the map is
    /// bootstrapped.
    pub init_num_frames: usize,
}

impl<T: SupersetOf<f64>> Default for SolverOptions<T> {
    fn default() -> Self {
        Self {
            size_voxel_map: nalgebra::convert(1.0),
            num_iters_icp: 10,
            voxel_neighborhood: 1,
            min_number_neighbors: 20,
            max_number_neighbors: 20,
            power_planarity: nalgebra::convert(2.0),
            max_dist_to_plane: nalgebra::convert(0.3),
            threshold_orientation_norm: nalgebra::convert(1e-4),
            threshold_translation_norm: nalgebra::convert(1e-3),
            beta_location_consistency: nalgebra::convert(0.001),
            beta_constant_velocity: nalgebra::convert(0.001),
            min_number_residuals: 100,
            damping: nalgebra::convert(1e-6),
            point_to_plane_with_distortion: true,
            distance: DistanceMetric::CtPointToPlane,
            init_num_frames: 20,
        }
    }
}
