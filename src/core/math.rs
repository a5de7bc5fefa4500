//! Mathematical primitives for heading fusion and wall geometry.
//!
//! Angle normalization, shortest-arc arithmetic, weighted circular
//! interpolation, and rotation-coherent unwrapping. All angles in radians,
//! counter-clockwise positive, heading 0 pointing east (+x, y = north).

use std::f32::consts::PI;

use crate::core::types::Vec3;

/// Normalize angle to [-π, π].
///
/// # Example
/// ```
/// use vyuha_nav::core::math::normalize_angle;
/// use std::f32::consts::PI;
///
/// assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-6);
/// assert!((normalize_angle(-3.0 * PI) - (-PI)).abs() < 1e-6);
/// ```
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Shortest angular difference from angle `a` to angle `b`.
///
/// Returns the signed angle you need to add to `a` to reach `b`,
/// taking the shortest path around the circle.
#[inline]
pub fn angle_diff(a: f32, b: f32) -> f32 {
    normalize_angle(b - a)
}

/// Weighted interpolation between two angles along the shorter arc.
///
/// `weight_b` in [0, 1]: 0 returns `a`, 1 returns `b`. Interpolating
/// between 179° and −179° moves across the ±180° boundary, never the
/// long way around.
#[inline]
pub fn interpolate_angle(a: f32, b: f32, weight_b: f32) -> f32 {
    normalize_angle(a + angle_diff(a, b) * weight_b)
}

/// Unwrap `wrapped` so it is rotation-coherent with `last`.
///
/// Returns the representative of `wrapped` (mod 2π) closest to `last`;
/// the result never differs from `last` by more than π. Accumulating
/// headings through this keeps full revolutions instead of jumping at
/// the ±π boundary, so rounding to the nearest cardinal cannot flicker.
#[inline]
pub fn make_rotation_coherent(last: f32, wrapped: f32) -> f32 {
    last + angle_diff(normalize_angle(last), wrapped)
}

/// Unit forward vector for a heading/pitch pair.
///
/// Heading 0 = east = +x, CCW positive; positive pitch tilts the nose up.
#[inline]
pub fn forward_vec(heading: f32, pitch: f32) -> Vec3 {
    Vec3 {
        x: heading.cos() * pitch.cos(),
        y: heading.sin() * pitch.cos(),
        z: pitch.sin(),
    }
}

/// Wall angle and perpendicular distance from two ranging beams.
///
/// `front`/`back` are distances (cm) measured by two parallel beams
/// `spacing` cm apart along the robot axis, mounted `mount_offset` cm
/// from the robot center. Returns `(angle, dist_to_wall)` where `angle`
/// is the robot's angle relative to the wall (positive = nose toward the
/// wall at the front beam) and `dist_to_wall` is the robot-center
/// distance perpendicular to the wall.
#[inline]
pub fn wall_fit_from_two_distances(
    front: f32,
    back: f32,
    spacing: f32,
    mount_offset: f32,
) -> (f32, f32) {
    let angle = ((back - front) / spacing).atan();
    let dist = (front + back) / 2.0 * angle.cos() + mount_offset;
    (angle, dist)
}
