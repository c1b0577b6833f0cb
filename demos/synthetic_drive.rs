use ct_odometry::{OdometryEngine, OdometryOptions, Point3D, Profile};
use itertools::Itertools;
use nalgebra::{IsometryMatrix3, Point3, Vector3, vector};
use rand::Rng;
use tracing_subscriber::EnvFilter;

const PERIOD: f64 = 0.1;
const POINTS_PER_SCAN: usize = 20_000;

/// A random point on the walls, floor or ceiling of a 30 m x 30 m x 6 m hall.
fn hall_point(rng: &mut impl Rng) -> Point3<f64> {
    let u = rng.random_range(-15.0..15.0);
    let v = rng.random_range(-15.0..15.0);
    let h = rng.random_range(-2.0..4.0);
    let side = if rng.random_bool(0.5) { 15.0 } else { -15.0 };
    match rng.random_range(0..4) {
        0 => Point3::new(u, v, if rng.random_bool(0.5) { -2.0 } else { 4.0 }),
        1 => Point3::new(side, v, h),
        2 => Point3::new(u, side, h),
        // a partition wall across half of the hall
        _ => Point3::new(5.0, v.min(0.0), h),
    }
}

fn sensor_pose(time: f64) -> IsometryMatrix3<f64> {
    IsometryMatrix3::new(
        vector![2.0 * time - 5.0, 0.5 * (time * 0.7).sin(), 0.0],
        Vector3::z() * 0.05 * time,
    )
}

fn scan(rng: &mut impl Rng, index: usize) -> Vec<Point3D<f64>> {
    let begin = index as f64 * PERIOD;
    (0..POINTS_PER_SCAN)
        .map(|_| {
            let alpha: f64 = rng.random();
            let timestamp = begin + alpha * PERIOD;
            let noise = vector![
                rng.random_range(-0.01..0.01),
                rng.random_range(-0.01..0.01),
                rng.random_range(-0.01..0.01)
            ];
            let world = hall_point(&mut *rng);
            let raw = sensor_pose(timestamp).inverse_transform_point(&world) + noise;
            Point3D::new(raw, timestamp, alpha)
        })
        .sorted_by(|a, b| a.timestamp.total_cmp(&b.timestamp))
        .collect_vec()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let profile = std::env::var("ODOMETRY_PROFILE")
        .ok()
        .and_then(|s| {
            s.parse::<Profile>()
                .inspect_err(|e| eprintln!("Invalid ODOMETRY_PROFILE: {e}"))
                .ok()
        })
        .unwrap_or(Profile::Driving);
    let steps = option_env!("STEPS")
        .and_then(|s| {
            s.parse()
                .inspect_err(|e| eprintln!("Invalid STEPS: {e}"))
                .ok()
        })
        .unwrap_or(50);

    let mut engine = match OdometryEngine::new(OdometryOptions::from_profile(profile)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Invalid options: {e}");
            return;
        }
    };

    let mut rng = rand::rng();
    let failures = (0..steps)
        .map(|index| engine.register_frame(&scan(&mut rng, index)))
        .filter(|summary| !summary.success)
        .count();

    let estimate = engine.last_inserted_pose();
    // the first scan defines the world frame
    let truth = sensor_pose(0.0).inverse() * sensor_pose(steps as f64 * PERIOD);
    println!(
        "{steps} scans, {failures} rejected, {} map points",
        engine.map_size()
    );
    println!("estimated end: {:?}", estimate.translation.vector);
    println!("true end:      {:?}", truth.translation.vector);
}
