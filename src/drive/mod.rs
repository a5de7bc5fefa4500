//! Drive tasks: closed set of motion primitives executed against the
//! fused state.
//!
//! Each task turns the latest [`FusedData`] into wheel speed commands
//! until it reports itself finished. Tasks are plain enum variants so
//! the motion layer can match on them, and [`DriveTask::Sequence`]
//! chains primitives into maneuvers.

use log::debug;

use crate::config::MechanicsConfig;
use crate::core::math::angle_diff;
use crate::core::types::{FusedData, Vec3, WheelSpeeds};

/// Minimum commanded speed so a ramping task never stalls short of
/// its distance (cm/s).
const MIN_DRIVE_SPEED: f32 = 2.0;

/// Wall alignment gain (wheel speed per rad of deviation).
const ALIGN_GAIN: f32 = 20.0;
/// Deviation below which alignment counts as done (rad).
const ALIGN_TOLERANCE: f32 = 0.02;
/// Consecutive in-tolerance cycles to finish alignment.
const ALIGN_SETTLE_CYCLES: u32 = 5;
/// Cycles without usable walls before alignment gives up.
const ALIGN_GIVE_UP_CYCLES: u32 = 50;

/// Wall following lateral gain (wheel speed per cm of offset).
const FOLLOW_GAIN: f32 = 1.5;
/// Heading gain used when only one or no side wall is visible.
const FOLLOW_HEADING_GAIN: f32 = 25.0;

fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// A motion primitive with its progress state.
#[derive(Debug, Clone)]
pub enum DriveTask {
    /// Ramp from the current speed to `end_speed` over `distance` cm.
    Accelerate {
        end_speed: f32,
        distance: f32,
        start: Option<(Vec3, f32)>,
        finished: bool,
    },
    /// Hold `speed` for `distance` cm.
    Straight {
        speed: f32,
        distance: f32,
        start_pos: Option<Vec3>,
        finished: bool,
    },
    /// Command zero and wait for the robot to come to rest.
    Stop { finished: bool },
    /// Turn in place by `angle` rad (sign gives the direction) at up
    /// to `max_angular_vel` rad/s.
    Rotate {
        max_angular_vel: f32,
        angle: f32,
        start_heading: Option<f32>,
        finished: bool,
    },
    /// Raw fixed wheel speed over `distance` cm, no corrections.
    ForceSpeed {
        speed: f32,
        distance: f32,
        start_pos: Option<Vec3>,
        finished: bool,
    },
    /// Rotate in place until the wall-derived deviation settles.
    AlignWalls {
        settled: u32,
        blind: u32,
        finished: bool,
    },
    /// Drive `distance` cm keeping centered between the side walls.
    FollowWall {
        speed: f32,
        distance: f32,
        start_pos: Option<Vec3>,
        finished: bool,
    },
    /// Run tasks one after another.
    Sequence {
        tasks: Vec<DriveTask>,
        index: usize,
    },
}

impl DriveTask {
    pub fn accelerate(end_speed: f32, distance: f32) -> Self {
        DriveTask::Accelerate {
            end_speed,
            distance,
            start: None,
            finished: false,
        }
    }

    pub fn straight(speed: f32, distance: f32) -> Self {
        DriveTask::Straight {
            speed,
            distance,
            start_pos: None,
            finished: false,
        }
    }

    pub fn stop() -> Self {
        DriveTask::Stop { finished: false }
    }

    pub fn rotate(max_angular_vel: f32, angle: f32) -> Self {
        DriveTask::Rotate {
            max_angular_vel,
            angle,
            start_heading: None,
            finished: false,
        }
    }

    pub fn force_speed(speed: f32, distance: f32) -> Self {
        DriveTask::ForceSpeed {
            speed,
            distance,
            start_pos: None,
            finished: false,
        }
    }

    pub fn align_walls() -> Self {
        DriveTask::AlignWalls {
            settled: 0,
            blind: 0,
            finished: false,
        }
    }

    pub fn follow_wall(speed: f32, distance: f32) -> Self {
        DriveTask::FollowWall {
            speed,
            distance,
            start_pos: None,
            finished: false,
        }
    }

    pub fn sequence(tasks: Vec<DriveTask>) -> Self {
        DriveTask::Sequence { tasks, index: 0 }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            DriveTask::Accelerate { finished, .. }
            | DriveTask::Straight { finished, .. }
            | DriveTask::Stop { finished }
            | DriveTask::Rotate { finished, .. }
            | DriveTask::ForceSpeed { finished, .. }
            | DriveTask::AlignWalls { finished, .. }
            | DriveTask::FollowWall { finished, .. } => *finished,
            DriveTask::Sequence { tasks, index } => *index >= tasks.len(),
        }
    }

    /// Does this task currently hold a straight line? Gates the wall
    /// angle trust in the pose filter.
    pub fn is_driving_straight(&self) -> bool {
        match self {
            DriveTask::Accelerate { finished, .. }
            | DriveTask::Straight { finished, .. }
            | DriveTask::ForceSpeed { finished, .. }
            | DriveTask::FollowWall { finished, .. } => !finished,
            DriveTask::Stop { .. } | DriveTask::Rotate { .. } | DriveTask::AlignWalls { .. } => {
                false
            }
            DriveTask::Sequence { tasks, index } => tasks
                .get(*index)
                .map(|t| t.is_driving_straight())
                .unwrap_or(false),
        }
    }

    /// Compute the wheel speeds for this cycle. A finished task always
    /// commands zero.
    pub fn update(&mut self, fused: &FusedData, dt: f32, mech: &MechanicsConfig) -> WheelSpeeds {
        let state = &fused.robot_state;
        match self {
            DriveTask::Accelerate {
                end_speed,
                distance,
                start,
                finished,
            } => {
                if *finished {
                    return WheelSpeeds::default();
                }
                let (start_pos, start_speed) =
                    *start.get_or_insert((state.position, state.forward_vel));
                let driven = planar_distance(state.position, start_pos);
                if driven >= distance.abs() {
                    *finished = true;
                    return WheelSpeeds::new(*end_speed, *end_speed);
                }
                let progress = (driven / distance.abs()).clamp(0.0, 1.0);
                let mut speed = start_speed + (*end_speed - start_speed) * progress;
                if speed.abs() < MIN_DRIVE_SPEED {
                    speed = MIN_DRIVE_SPEED * end_speed.signum();
                }
                WheelSpeeds::new(speed, speed)
            }
            DriveTask::Straight {
                speed,
                distance,
                start_pos,
                finished,
            } => {
                if *finished {
                    return WheelSpeeds::default();
                }
                let start = *start_pos.get_or_insert(state.position);
                if planar_distance(state.position, start) >= distance.abs() {
                    *finished = true;
                    return WheelSpeeds::default();
                }
                WheelSpeeds::new(*speed, *speed)
            }
            DriveTask::Stop { finished } => {
                if state.forward_vel.abs() < 0.5 && state.angular_vel.x.abs() < 0.05 {
                    *finished = true;
                }
                WheelSpeeds::default()
            }
            DriveTask::Rotate {
                max_angular_vel,
                angle,
                start_heading,
                finished,
            } => {
                if *finished {
                    return WheelSpeeds::default();
                }
                let start = *start_heading.get_or_insert(state.global_heading);
                let rotated = state.global_heading - start;
                let remaining = *angle - rotated;
                if remaining * angle.signum() <= 0.0 {
                    *finished = true;
                    return WheelSpeeds::default();
                }
                // Slow down over the last tenth of the turn
                let slow = (remaining.abs() / (0.1 * angle.abs())).clamp(0.2, 1.0);
                let omega = max_angular_vel.abs() * slow * angle.signum();
                let half = omega * mech.wheel_distance / 2.0;
                WheelSpeeds::new(-half, half)
            }
            DriveTask::ForceSpeed {
                speed,
                distance,
                start_pos,
                finished,
            } => {
                if *finished {
                    return WheelSpeeds::default();
                }
                let start = *start_pos.get_or_insert(state.position);
                if planar_distance(state.position, start) >= distance.abs() {
                    *finished = true;
                    return WheelSpeeds::default();
                }
                WheelSpeeds::new(*speed, *speed)
            }
            DriveTask::AlignWalls {
                settled,
                blind,
                finished,
            } => {
                if *finished {
                    return WheelSpeeds::default();
                }
                if fused.dist_sens.wall_angle_trust <= 0.0 {
                    *blind += 1;
                    if *blind >= ALIGN_GIVE_UP_CYCLES {
                        debug!("Wall alignment gave up, no usable walls");
                        *finished = true;
                    }
                    return WheelSpeeds::default();
                }
                *blind = 0;
                // Walls report the actual heading; rotate by the
                // remainder to the cardinal.
                let error = angle_diff(fused.dist_sens.wall_angle, state.heading.heading());
                if error.abs() < ALIGN_TOLERANCE {
                    *settled += 1;
                    if *settled >= ALIGN_SETTLE_CYCLES {
                        *finished = true;
                    }
                    return WheelSpeeds::default();
                }
                *settled = 0;
                let half = (ALIGN_GAIN * error).clamp(-10.0, 10.0);
                WheelSpeeds::new(-half, half)
            }
            DriveTask::FollowWall {
                speed,
                distance,
                start_pos,
                finished,
            } => {
                if *finished {
                    return WheelSpeeds::default();
                }
                let start = *start_pos.get_or_insert(state.position);
                if planar_distance(state.position, start) >= distance.abs() {
                    *finished = true;
                    return WheelSpeeds::default();
                }
                let left = fused.dist_sens.dist_to_wall_left;
                let right = fused.dist_sens.dist_to_wall_right;
                let correction = if left > 0.0 && right > 0.0 {
                    // Positive when closer to the right wall: steer left
                    FOLLOW_GAIN * (left - right) / 2.0
                } else {
                    // No corridor, steer back onto the cardinal heading
                    let error =
                        angle_diff(state.global_heading, state.heading.heading());
                    FOLLOW_HEADING_GAIN * error
                };
                let correction = correction.clamp(-speed.abs() / 2.0, speed.abs() / 2.0);
                WheelSpeeds::new(*speed - correction, *speed + correction)
            }
            DriveTask::Sequence { tasks, index } => {
                while *index < tasks.len() {
                    let speeds = tasks[*index].update(fused, dt, mech);
                    if tasks[*index].is_finished() {
                        *index += 1;
                        continue;
                    }
                    return speeds;
                }
                WheelSpeeds::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AbsoluteDir, RobotState};
    use approx::assert_relative_eq;

    fn mech() -> MechanicsConfig {
        MechanicsConfig::default()
    }

    fn fused_at(x: f32, vel: f32) -> FusedData {
        FusedData {
            robot_state: RobotState {
                position: Vec3::new(x, 0.0, 0.0),
                forward_vel: vel,
                ..RobotState::default()
            },
            ..FusedData::default()
        }
    }

    #[test]
    fn test_straight_finishes_at_distance() {
        let mut task = DriveTask::straight(10.0, 30.0);
        let speeds = task.update(&fused_at(0.0, 0.0), 0.05, &mech());
        assert_relative_eq!(speeds.left, 10.0);
        assert!(!task.is_finished());
        assert!(task.is_driving_straight());

        task.update(&fused_at(31.0, 10.0), 0.05, &mech());
        assert!(task.is_finished());
        assert!(!task.is_driving_straight());
    }

    #[test]
    fn test_accelerate_ramps_toward_end_speed() {
        let mut task = DriveTask::accelerate(20.0, 30.0);
        let at_start = task.update(&fused_at(0.0, 0.0), 0.05, &mech());
        let midway = task.update(&fused_at(15.0, 10.0), 0.05, &mech());
        assert!(at_start.left < midway.left);
        assert!(midway.left <= 20.0);
        assert!(at_start.left >= MIN_DRIVE_SPEED);
    }

    #[test]
    fn test_stop_waits_for_standstill() {
        let mut task = DriveTask::stop();
        let speeds = task.update(&fused_at(0.0, 5.0), 0.05, &mech());
        assert_relative_eq!(speeds.left, 0.0);
        assert!(!task.is_finished());
        task.update(&fused_at(0.0, 0.0), 0.05, &mech());
        assert!(task.is_finished());
    }

    #[test]
    fn test_rotate_commands_opposing_wheels() {
        let mut task = DriveTask::rotate(1.0, std::f32::consts::FRAC_PI_2);
        let fused = fused_at(0.0, 0.0);
        let speeds = task.update(&fused, 0.05, &mech());
        // CCW turn: right wheel forward, left wheel back
        assert!(speeds.right > 0.0);
        assert!(speeds.left < 0.0);
        assert_relative_eq!(speeds.right, -speeds.left);
        assert!(!task.is_driving_straight());
    }

    #[test]
    fn test_rotate_finishes_at_target_angle() {
        let mut task = DriveTask::rotate(1.0, 1.0);
        let mut fused = fused_at(0.0, 0.0);
        task.update(&fused, 0.05, &mech());
        fused.robot_state.global_heading = 1.05;
        task.update(&fused, 0.05, &mech());
        assert!(task.is_finished());
    }

    #[test]
    fn test_align_settles_on_small_deviation() {
        let mut task = DriveTask::align_walls();
        let mut fused = fused_at(0.0, 0.0);
        fused.robot_state.heading = AbsoluteDir::East;
        fused.dist_sens.wall_angle_trust = 0.6;
        fused.dist_sens.wall_angle = 0.1;
        let speeds = task.update(&fused, 0.05, &mech());
        // Robot sits left of the cardinal: turn CW back onto it
        assert!(speeds.right < 0.0 && speeds.left > 0.0);

        fused.dist_sens.wall_angle = 0.0;
        for _ in 0..ALIGN_SETTLE_CYCLES {
            task.update(&fused, 0.05, &mech());
        }
        assert!(task.is_finished());
    }

    #[test]
    fn test_align_gives_up_without_walls() {
        let mut task = DriveTask::align_walls();
        let fused = fused_at(0.0, 0.0);
        for _ in 0..ALIGN_GIVE_UP_CYCLES {
            task.update(&fused, 0.05, &mech());
        }
        assert!(task.is_finished());
    }

    #[test]
    fn test_follow_wall_steers_away_from_near_wall() {
        let mut task = DriveTask::follow_wall(10.0, 60.0);
        let mut fused = fused_at(0.0, 0.0);
        fused.dist_sens.dist_to_wall_left = 12.0;
        fused.dist_sens.dist_to_wall_right = 6.0;
        let speeds = task.update(&fused, 0.05, &mech());
        // Closer to the right wall: steer left, right wheel faster
        assert!(speeds.right > speeds.left);
    }

    #[test]
    fn test_sequence_advances_through_tasks() {
        let mut task = DriveTask::sequence(vec![
            DriveTask::straight(10.0, 10.0),
            DriveTask::stop(),
        ]);
        let speeds = task.update(&fused_at(0.0, 10.0), 0.05, &mech());
        assert_relative_eq!(speeds.left, 10.0);
        assert!(task.is_driving_straight());

        // Straight leg done, stop leg takes over in the same call
        let speeds = task.update(&fused_at(11.0, 0.0), 0.05, &mech());
        assert_relative_eq!(speeds.left, 0.0);
        assert!(task.is_finished());
        assert!(!task.is_driving_straight());
    }
}
