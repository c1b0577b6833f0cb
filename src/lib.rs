#![deny(clippy::unwrap_used)]
#![deny(unused_must_use)]
mod context;
pub mod algorithm;
pub mod error;
pub mod frame;
mod utils;
pub mod voxel_map;

pub use algorithm::{
    icp::{DistanceMetric, PointToPlaneIcp, Problem, Registered, Solver, SolverOptions},
    odometry::{
        FrameSampler, Initialization, MotionCompensation, MotionPredictor, OdometryEngine,
        OdometryOptions, Profile, RegistrationSummary,
    },
};
pub use error::{ConfigError, RegistrationError, SolverError};
pub use frame::{Point3D, Pose, TrajectoryFrame};
pub use voxel_map::{InsertParams, VoxelMap};
