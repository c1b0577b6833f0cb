use std::str::FromStr;

use nalgebra::RealField;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use simba::scalar::SupersetOf;

use crate::{
    algorithm::icp::{DistanceMetric, SolverOptions},
    error::ConfigError,
    voxel_map::InsertParams,
};

/// How the motion of the sensor during a scan is compensated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MotionCompensation {
    /// No compensation of the motion.
    None,
    /// The scan is distorted once, before registration, with the predicted
    /// motion.
    ConstantVelocity,
    /// The scan is distorted again after every solver iteration.
    Iterative,
    /// The begin and end poses of the scan are estimated jointly.
    #[default]
    Continuous,
}

impl MotionCompensation {
    /// Whether the solver interpolates keypoints along the scan, and the
    /// residual it minimizes.
    pub const fn solver_flags(self) -> (bool, DistanceMetric) {
        match self {
            Self::None | Self::ConstantVelocity => (false, DistanceMetric::PointToPlane),
            Self::Iterative => (true, DistanceMetric::PointToPlane),
            Self::Continuous => (true, DistanceMetric::CtPointToPlane),
        }
    }
}

/// Motion model used to guess the pose of an incoming scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Initialization {
    #[serde(rename = "INIT_NONE")]
    None,
    #[default]
    #[serde(rename = "INIT_CONSTANT_VELOCITY")]
    ConstantVelocity,
}

/// Named option presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// High-speed, low-distortion motion (e.g. a car on a road).
    Driving,
    /// Abrupt, low-speed motion (e.g. a handheld or wheeled platform outdoors),
    /// with robust registration enabled.
    SlowOutdoor,
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "driving" => Ok(Self::Driving),
            "slow_outdoor" | "slow-outdoor" => Ok(Self::SlowOutdoor),
            _ => Err(ConfigError::UnknownProfile(s.to_owned())),
        }
    }
}

/// Options of the [`OdometryEngine`](super::OdometryEngine).
///
/// Missing fields fall back to the driving profile when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Deserialize<'de> + SupersetOf<f64>"))]
pub struct OdometryOptions<T> {
    /// Subsampling voxel size of the scans inserted while the map is
    /// initialized.
    pub init_voxel_size: T,

    /// Keypoint sampling voxel size while the map is initialized.
    pub init_sample_voxel_size: T,

    /// Number of scans registered with the initialization voxel sizes.
    pub init_num_frames: usize,

    pub voxel_size: T,

    pub sample_voxel_size: T,

    /// Voxels farther than this from the last position are dropped from the
    /// map.
    pub max_distance: T,

    pub max_num_points_in_voxel: usize,

    /// Log the summary of every scan at `info` level instead of `debug`.
    pub debug_print: bool,

    /// Minimal distance between two points of a map voxel.
    pub min_distance_points: T,

    /// Largest accepted gap between the end of the previous scan and the
    /// beginning of the new one.
    pub distance_error_threshold: T,

    /// Assess every registration and retry with more conservative parameters
    /// on failure.
    pub robust_registration: bool,

    /// Fraction of keypoints falling into full voxels below which the overlap
    /// with the map is reported as sparse.
    pub robust_full_voxel_threshold: T,

    /// Predicted translation above which the first attempt already searches a
    /// wider neighborhood.
    pub robust_neighborhood_min_dist: T,

    /// Predicted rotation, in radians, above which the first attempt already
    /// searches a wider neighborhood.
    pub robust_neighborhood_min_orientation: T,

    /// Largest accepted motion during one nominal scan period.
    pub robust_relative_trans_threshold: T,

    /// Stop retrying when an attempt fails by a wide margin.
    pub robust_fail_early: bool,

    pub robust_num_attempts: usize,

    pub robust_max_voxel_neighborhood: usize,

    /// How many times over its threshold a metric must be for
    /// `robust_fail_early` to stop retrying.
    pub robust_fail_early_ratio: T,

    /// Expected duration between two scans, in seconds.
    pub nominal_frame_period: T,

    /// Scans with fewer keypoints are still registered, with a warning.
    pub min_number_keypoints: usize,

    pub motion_compensation: MotionCompensation,

    pub initialization: Initialization,

    pub solver: SolverOptions<T>,
}

impl<T: SupersetOf<f64>> Default for OdometryOptions<T> {
    #[inline]
    fn default() -> Self {
        Self::driving()
    }
}

impl<T: SupersetOf<f64>> OdometryOptions<T> {
    pub fn from_profile(profile: Profile) -> Self {
        match profile {
            Profile::Driving => Self::driving(),
            Profile::SlowOutdoor => Self::slow_outdoor(),
        }
    }

    pub fn driving() -> Self {
        Self {
            init_voxel_size: nalgebra::convert(0.2),
            init_sample_voxel_size: nalgebra::convert(1.0),
            init_num_frames: 20,
            voxel_size: nalgebra::convert(0.5),
            sample_voxel_size: nalgebra::convert(1.5),
            max_distance: nalgebra::convert(100.0),
            max_num_points_in_voxel: 20,
            debug_print: true,
            min_distance_points: nalgebra::convert(0.1),
            distance_error_threshold: nalgebra::convert(5.0),
            robust_registration: false,
            robust_full_voxel_threshold: nalgebra::convert(0.7),
            robust_neighborhood_min_dist: nalgebra::convert(0.10),
            robust_neighborhood_min_orientation: nalgebra::convert(0.01),
            robust_relative_trans_threshold: nalgebra::convert(1.0),
            robust_fail_early: false,
            robust_num_attempts: 6,
            robust_max_voxel_neighborhood: 4,
            robust_fail_early_ratio: nalgebra::convert(2.0),
            nominal_frame_period: nalgebra::convert(0.1),
            min_number_keypoints: 1,
            motion_compensation: MotionCompensation::Continuous,
            initialization: Initialization::ConstantVelocity,
            solver: SolverOptions {
                max_dist_to_plane: nalgebra::convert(0.5),
                num_iters_icp: 30,
                voxel_neighborhood: 1,
                ..Default::default()
            },
        }
    }

    pub fn slow_outdoor() -> Self {
        let driving = Self::driving();
        Self {
            voxel_size: nalgebra::convert(0.8),
            sample_voxel_size: nalgebra::convert(1.5),
            max_distance: nalgebra::convert(100.0),
            min_distance_points: nalgebra::convert(0.1),
            robust_registration: true,
            robust_num_attempts: 10,
            robust_fail_early: false,
            robust_relative_trans_threshold: nalgebra::convert(1.0),
            robust_max_voxel_neighborhood: 4,
            solver: SolverOptions {
                num_iters_icp: 30,
                max_dist_to_plane: nalgebra::convert(0.5),
                threshold_orientation_norm: nalgebra::convert(1e-4),
                threshold_translation_norm: nalgebra::convert(1e-3),
                ..driving.solver
            },
            ..driving
        }
    }
}

impl<T> OdometryOptions<T>
where
    T: RealField + Copy,
{
    /// Parses options from TOML and validates them.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError>
    where
        T: DeserializeOwned,
    {
        let options: Self = toml::from_str(s)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("init_voxel_size", self.init_voxel_size)?;
        positive("init_sample_voxel_size", self.init_sample_voxel_size)?;
        positive("voxel_size", self.voxel_size)?;
        positive("sample_voxel_size", self.sample_voxel_size)?;
        positive("max_distance", self.max_distance)?;
        positive("nominal_frame_period", self.nominal_frame_period)?;
        positive("solver.size_voxel_map", self.solver.size_voxel_map)?;
        non_negative("min_distance_points", self.min_distance_points)?;
        non_negative("distance_error_threshold", self.distance_error_threshold)?;
        non_negative("robust_full_voxel_threshold", self.robust_full_voxel_threshold)?;
        non_negative("robust_neighborhood_min_dist", self.robust_neighborhood_min_dist)?;
        non_negative(
            "robust_neighborhood_min_orientation",
            self.robust_neighborhood_min_orientation,
        )?;
        non_negative(
            "robust_relative_trans_threshold",
            self.robust_relative_trans_threshold,
        )?;
        non_negative("robust_fail_early_ratio", self.robust_fail_early_ratio)?;
        non_negative("solver.max_dist_to_plane", self.solver.max_dist_to_plane)?;
        non_negative("solver.damping", self.solver.damping)?;

        if self.max_num_points_in_voxel == 0 {
            return Err(invalid("max_num_points_in_voxel", "must be at least 1"));
        }
        if self.robust_num_attempts == 0 {
            return Err(invalid("robust_num_attempts", "must be at least 1"));
        }
        if self.solver.min_number_neighbors > self.solver.max_number_neighbors {
            return Err(invalid(
                "solver.min_number_neighbors",
                "must not exceed solver.max_number_neighbors",
            ));
        }
        Ok(())
    }

    /// The solver options with the flags derived from `motion_compensation`.
    pub fn solver_options(&self) -> SolverOptions<T> {
        let (point_to_plane_with_distortion, distance) = self.motion_compensation.solver_flags();
        SolverOptions {
            point_to_plane_with_distortion,
            distance,
            init_num_frames: self.init_num_frames,
            ..self.solver.clone()
        }
    }

    /// Map insertion parameters.
    pub fn insert_params(&self) -> InsertParams<T> {
        InsertParams {
            max_num_points_in_voxel: self.max_num_points_in_voxel,
            min_distance_points: self.min_distance_points,
        }
    }

    /// Frame and keypoint voxel sizes for the scan at `frame_index`.
    pub fn sampling_sizes(&self, frame_index: usize) -> (T, T) {
        if frame_index < self.init_num_frames {
            (self.init_voxel_size, self.init_sample_voxel_size)
        } else {
            (self.voxel_size, self.sample_voxel_size)
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive<T: RealField>(field: &'static str, value: T) -> Result<(), ConfigError> {
    if value > T::zero() {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive, got {value:?}")))
    }
}

fn non_negative<T: RealField>(field: &'static str, value: T) -> Result<(), ConfigError> {
    if value >= T::zero() {
        Ok(())
    } else {
        Err(invalid(field, format!("must not be negative, got {value:?}")))
    }
}
