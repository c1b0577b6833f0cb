pub mod icp;
pub mod odometry;
