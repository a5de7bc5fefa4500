//! Wall geometry from the paired distance sensors.
//!
//! Each side of the robot carries two beams. When both beams of a
//! side see the same wall, the pair yields the robot's angle relative
//! to that wall and the perpendicular distance to it. The angles of
//! all usable pairs are averaged and anchored to the current cardinal
//! heading, giving an absolute heading estimate the pose filter blends
//! in proportionally to how many pairs contributed.

use crate::config::MechanicsConfig;
use crate::core::math::{normalize_angle, wall_fit_from_two_distances};
use crate::core::types::{DistSensorStates, DistSensorStatus, Distances, FusedData};

/// Closest reading the short-range side sensors can report (mm).
pub const SIDE_SENSOR_MIN_DIST_MM: u16 = 25;
/// Closest reading the front sensors can report (mm).
pub const FRONT_SENSOR_MIN_DIST_MM: u16 = 30;

/// Source of fresh sensor samples for standstill recalibration.
pub trait SensorSource {
    /// Trigger a measurement and return the new readings.
    fn sample_distances(&mut self) -> (Distances, DistSensorStates);

    /// Cumulative wheel travel since startup (left, right) in cm.
    fn wheel_travel(&mut self) -> (f32, f32);
}

/// Distance usable for a wall fit, in cm. `None` when the beam does
/// not see a wall of the current cell.
fn usable_cm(status: DistSensorStatus, dist_mm: u16, min_dist_mm: u16, max_cm: f32) -> Option<f32> {
    match status {
        DistSensorStatus::Ok if (dist_mm as f32) / 10.0 < max_cm => Some(dist_mm as f32 / 10.0),
        DistSensorStatus::Underflow => Some(min_dist_mm as f32 / 10.0),
        _ => None,
    }
}

/// Recompute `fused.dist_sens` from the raw readings in `fused`.
pub fn fuse(fused: &mut FusedData, mech: &MechanicsConfig, cell_size: f32) {
    let d = &fused.distances;
    let s = &fused.dist_sensor_states;

    let side_max = cell_size - mech.side_sensor_offset;
    let front_max = cell_size - mech.front_sensor_offset;

    let lf = usable_cm(s.left_front, d.left_front, SIDE_SENSOR_MIN_DIST_MM, side_max);
    let lb = usable_cm(s.left_back, d.left_back, SIDE_SENSOR_MIN_DIST_MM, side_max);
    let rf = usable_cm(s.right_front, d.right_front, SIDE_SENSOR_MIN_DIST_MM, side_max);
    let rb = usable_cm(s.right_back, d.right_back, SIDE_SENSOR_MIN_DIST_MM, side_max);
    let fl = usable_cm(s.front_left, d.front_left, FRONT_SENSOR_MIN_DIST_MM, front_max);
    let fr = usable_cm(s.front_right, d.front_right, FRONT_SENSOR_MIN_DIST_MM, front_max);

    let mut angle_sum = 0.0;
    let mut num_pairs = 0;
    let mut dist_left = -1.0;
    let mut dist_right = -1.0;
    let mut dist_front = -1.0;

    if let (Some(front), Some(back)) = (lf, lb) {
        let (angle, dist) = wall_fit_from_two_distances(
            front,
            back,
            mech.side_sensor_spacing,
            mech.side_sensor_offset,
        );
        // A left wall falling away to the back means the robot is
        // turned toward it, the mirror of the right side.
        angle_sum += -angle;
        dist_left = dist;
        num_pairs += 1;
    }

    if let (Some(front), Some(back)) = (rf, rb) {
        let (angle, dist) = wall_fit_from_two_distances(
            front,
            back,
            mech.side_sensor_spacing,
            mech.side_sensor_offset,
        );
        angle_sum += angle;
        dist_right = dist;
        num_pairs += 1;
    }

    if let (Some(left), Some(right)) = (fl, fr) {
        let (angle, dist) = wall_fit_from_two_distances(
            left,
            right,
            mech.side_sensor_spacing,
            mech.front_sensor_offset,
        );
        angle_sum += angle;
        dist_front = dist;
        num_pairs += 1;
    } else if let Some(long) =
        usable_cm(s.front_long, d.front_long, FRONT_SENSOR_MIN_DIST_MM, front_max)
    {
        // Single beam gives no angle, only the wall distance.
        dist_front = long + mech.front_sensor_offset;
    }

    fused.dist_sens.dist_to_wall_left = dist_left;
    fused.dist_sens.dist_to_wall_right = dist_right;
    fused.dist_sens.dist_to_wall_front = dist_front;

    if num_pairs > 0 {
        let deviation = angle_sum / num_pairs as f32;
        let base = fused.robot_state.heading.heading();
        fused.dist_sens.wall_angle = normalize_angle(deviation + base);
        fused.dist_sens.wall_angle_trust = (num_pairs as f32 + 2.0) / 5.0;
    } else {
        fused.dist_sens.wall_angle_trust = 0.0;
    }
}
