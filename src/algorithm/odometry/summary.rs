use nalgebra::RealField;

use crate::{
    error::RegistrationError,
    frame::{Point3D, TrajectoryFrame},
};

/// The outcome of registering one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationSummary<T: RealField> {
    /// The registered trajectory frame, or the last candidate on failure.
    pub frame: TrajectoryFrame<T>,

    /// Number of points of the subsampled scan.
    pub sample_size: usize,

    /// Number of keypoints used by the last attempt.
    pub number_keypoints: usize,

    /// How far the solver moved the poses away from the initial guess.
    pub distance_correction: T,

    /// Translation from the end of the previous scan to the beginning of
    /// this one.
    pub relative_distance: T,

    /// Rotation angle from the end of the previous scan to the beginning of
    /// this one.
    pub relative_orientation: T,

    /// Translation travelled during the scan.
    pub scan_distance: T,

    /// Rotation angle between the begin and end poses of the scan.
    pub scan_orientation: T,

    pub success: bool,

    pub number_of_attempts: usize,

    pub error: Option<RegistrationError>,

    /// Fraction of the registered keypoints lying in full map voxels.
    pub full_voxel_ratio: T,

    /// The subsampled scan, in world coordinates from `frame`.
    pub corrected_points: Vec<Point3D<T>>,

    /// Every point of the scan, in world coordinates from `frame`.
    pub all_corrected_points: Vec<Point3D<T>>,
}

impl<T: RealField + Copy> RegistrationSummary<T> {
    pub(super) fn new(frame: TrajectoryFrame<T>) -> Self {
        Self {
            frame,
            sample_size: 0,
            number_keypoints: 0,
            distance_correction: T::zero(),
            relative_distance: T::zero(),
            relative_orientation: T::zero(),
            scan_distance: T::zero(),
            scan_orientation: T::zero(),
            success: false,
            number_of_attempts: 0,
            error: None,
            full_voxel_ratio: T::zero(),
            corrected_points: Vec::new(),
            all_corrected_points: Vec::new(),
        }
    }

    /// The rendered error, empty on success.
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}
