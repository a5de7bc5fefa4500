//! Pose estimation by fusing wheel encoders, the inertial unit, and
//! the distance sensors.
//!
//! One call to [`SensorFusion::update`] is one cycle: raw inputs go
//! in, a complete [`FusedData`] snapshot comes out. Updates faster
//! than the configured maximum frequency are skipped so a tight caller
//! loop cannot starve the integration of meaningful time steps.
//!
//! The heading estimate is a chain of weighted circular interpolations
//! starting from the encoder heading: first toward the inertial
//! heading, then toward the wall-derived heading in proportion to its
//! trust, finally toward the rate-predicted heading. The result is
//! kept rotation-coherent, so the global heading never jumps by full
//! turns at the wrap-around.

use log::warn;

use crate::config::{FusionConfig, MechanicsConfig};
use crate::core::math::{
    forward_vec, interpolate_angle, make_rotation_coherent, normalize_angle,
};
use crate::core::types::{
    cell_state, AbsoluteDir, DistSensorStates, Distances, FusedData, GridCell, RelativeDir, Vec3,
    WheelSpeeds,
};
use crate::shared::CorrectionRequest;

pub mod dist_sens;

pub use dist_sens::SensorSource;

/// Cycles of encoder/gyro disagreement before the robot counts as
/// stuck while rotating.
const ROT_STUCK_CYCLES: u32 = 10;

/// Raw sensor inputs for one fusion cycle.
#[derive(Debug, Clone, Copy)]
pub struct SensorInputs {
    /// Time since the previous accepted cycle (s).
    pub dt: f32,
    pub wheel_speeds: WheelSpeeds,
    /// Cumulative wheel travel since startup (left, right) in cm.
    pub wheel_travel: (f32, f32),
    /// Unit forward vector from the inertial unit.
    pub inertial_forward: Vec3,
    pub distances: Distances,
    pub dist_sensor_states: DistSensorStates,
    /// The active drive command holds a straight line. Wall-derived
    /// heading is only trusted while this is true.
    pub driving_straight: bool,
}

/// Result of one accepted fusion cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleOutcome {
    /// The snapshot to publish.
    pub fused: FusedData,
    /// The robot moved to a different cell (or the record was cleared);
    /// downstream per-cell evidence must restart.
    pub cell_changed: bool,
}

/// Sensor fusion state machine.
pub struct SensorFusion {
    mechanics: MechanicsConfig,
    config: FusionConfig,
    cell_size: f32,
    fused: FusedData,
    /// Encoder heading offset accumulated by recalibrations.
    total_heading_offset: f32,
    /// Correction received on a skipped cycle, applied on the next
    /// accepted one.
    pending_correction: Option<CorrectionRequest>,
    last_inertial_heading: f32,
    consecutive_ramp: u32,
    consecutive_rot_stuck: u32,
    first_cycle: bool,
}

impl SensorFusion {
    pub fn new(mechanics: MechanicsConfig, config: FusionConfig, cell_size: f32) -> Self {
        Self {
            mechanics,
            config,
            cell_size,
            fused: FusedData::default(),
            total_heading_offset: 0.0,
            pending_correction: None,
            last_inertial_heading: 0.0,
            consecutive_ramp: 0,
            consecutive_rot_stuck: 0,
            first_cycle: true,
        }
    }

    /// Latest fused state, also available from the last [`CycleOutcome`].
    pub fn fused(&self) -> &FusedData {
        &self.fused
    }

    /// Run one fusion cycle. Returns `None` when the cycle was skipped
    /// (first call, or called faster than the configured maximum
    /// frequency); nothing is published for a skipped cycle. A
    /// correction handed to a skipped cycle is held and applied on the
    /// next accepted one, so draining the mailbox per call never loses
    /// a request.
    pub fn update(
        &mut self,
        inputs: &SensorInputs,
        correction: Option<CorrectionRequest>,
    ) -> Option<CycleOutcome> {
        if let Some(c) = correction {
            match self.pending_correction.as_mut() {
                Some(pending) => pending.merge(c),
                None => self.pending_correction = Some(c),
            }
        }

        let dt = inputs.dt;
        if dt <= 0.0 || 1.0 / dt > self.config.max_frequency {
            return None;
        }

        let inertial_heading = inputs.inertial_forward.y.atan2(inputs.inertial_forward.x);
        let inertial_pitch = inputs.inertial_forward.z.clamp(-1.0, 1.0).asin();

        if self.first_cycle {
            self.first_cycle = false;
            self.last_inertial_heading = inertial_heading;
            return None;
        }

        let correction = self.pending_correction.take();

        self.fused.distances = inputs.distances;
        self.fused.dist_sensor_states = inputs.dist_sensor_states;
        dist_sens::fuse(&mut self.fused, &self.mechanics, self.cell_size);

        let mut state = self.fused.robot_state;
        let last_heading = state.global_heading;
        let last_angular_vel = state.angular_vel;
        state.wheel_speeds = inputs.wheel_speeds;

        // Pitch low-pass and pitch rate
        let last_pitch = state.pitch;
        state.pitch = inertial_pitch * self.config.pitch_iir_factor
            + state.pitch * (1.0 - self.config.pitch_iir_factor);
        state.angular_vel.z = (state.pitch - last_pitch) / dt;

        // Yaw rate from both sources
        let encoder_yaw_vel = (inputs.wheel_speeds.right - inputs.wheel_speeds.left)
            / (self.mechanics.wheel_distance * self.mechanics.chi);
        let inertial_yaw_vel =
            normalize_angle(inertial_heading - self.last_inertial_heading) / dt;

        // Wheels spinning without the gyro following means the robot
        // is blocked mid-rotation; the encoders are lying.
        if encoder_yaw_vel.abs() - inertial_yaw_vel.abs() > self.config.rotation_stuck_threshold {
            self.consecutive_rot_stuck += 1;
        } else {
            self.consecutive_rot_stuck = 0;
        }
        let rotation_stuck = self.consecutive_rot_stuck > ROT_STUCK_CYCLES;

        // The inverse mismatch means a faulty inertial unit.
        let inertial_faulty = !rotation_stuck
            && (inertial_yaw_vel - encoder_yaw_vel).abs() > self.config.inertial_error_threshold
            && (inertial_yaw_vel.abs() > encoder_yaw_vel.abs());

        if rotation_stuck {
            warn!("Rotation stuck, trusting gyro only for yaw rate");
            state.angular_vel.x = inertial_yaw_vel;
        } else if inertial_faulty {
            warn!("Inertial yaw rate implausible, trusting encoders only");
            state.angular_vel.x = encoder_yaw_vel;
        } else {
            state.angular_vel.x = inertial_yaw_vel * self.config.angular_vel_portion
                + encoder_yaw_vel * (1.0 - self.config.angular_vel_portion);
        }
        state.angular_vel.y = 0.0;
        state.angular_vel = state.angular_vel * self.config.angular_vel_iir_factor
            + last_angular_vel * (1.0 - self.config.angular_vel_iir_factor);

        // Heading chain: encoder -> inertial -> walls -> prediction
        let encoder_heading = (inputs.wheel_travel.1 - inputs.wheel_travel.0)
            / (self.mechanics.wheel_distance * self.mechanics.chi)
            - self.total_heading_offset;
        let inertial_portion = if inertial_faulty {
            0.0
        } else {
            self.config.angular_vel_portion
        };
        let mut heading = interpolate_angle(
            normalize_angle(encoder_heading),
            inertial_heading,
            inertial_portion,
        );
        let wall_trust = if inputs.driving_straight {
            self.fused.dist_sens.wall_angle_trust
        } else {
            0.0
        };
        heading = interpolate_angle(
            heading,
            normalize_angle(self.fused.dist_sens.wall_angle),
            wall_trust * self.config.dist_sens_portion,
        );
        heading = interpolate_angle(
            heading,
            normalize_angle(last_heading + state.angular_vel.x * dt),
            self.config.predicted_portion,
        );

        let mut clear_cell = false;
        if let Some(c) = correction {
            if let Some(h) = c.heading {
                heading = normalize_angle(h);
            }
            if c.zero_pitch {
                state.pitch = 0.0;
                state.angular_vel.z = 0.0;
            }
            clear_cell = c.clear_cell;
            // x/y land after position integration below
        }

        state.global_heading = make_rotation_coherent(last_heading, normalize_angle(heading));
        state.forward_vec = forward_vec(state.global_heading, state.pitch);

        state.forward_vel = inputs.wheel_speeds.average() * self.config.speed_iir_factor
            + state.forward_vel * (1.0 - self.config.speed_iir_factor);
        state.position += state.forward_vec * (state.forward_vel * dt);

        if let Some(c) = correction {
            if let Some(x) = c.x {
                state.position.x = x;
            }
            if let Some(y) = c.y {
                state.position.y = y;
            }
        }

        // Ramp detection with hysteresis on the threshold
        let ramp_threshold = self.config.ramp_pitch_threshold
            * if self.consecutive_ramp > 0 { 0.8 } else { 1.0 };
        if state.pitch.abs() > ramp_threshold {
            self.consecutive_ramp += 1;
        } else {
            self.consecutive_ramp = 0;
        }
        if self.consecutive_ramp >= self.config.ramp_cycles {
            self.fused.grid_cell.state |= cell_state::RAMP;
        }

        state.heading = AbsoluteDir::from_heading(state.global_heading);

        let prev_coord = state.map_coordinate;
        state.map_coordinate.x = (state.position.x / self.cell_size).round() as i8;
        state.map_coordinate.y = (state.position.y / self.cell_size).round() as i8;

        let cell_changed = clear_cell || state.map_coordinate != prev_coord;
        if cell_changed {
            self.fused.grid_cell = GridCell::default();
            self.fused.grid_cell_certainty = 0.0;
        }

        self.fused.robot_state = state;
        self.last_inertial_heading = inertial_heading;

        Some(CycleOutcome {
            fused: self.fused,
            cell_changed,
        })
    }

    /// Mirror the wall detector's provisional cell record into the
    /// published state.
    pub fn set_grid_cell(&mut self, cell: GridCell, certainty: f32) {
        self.fused.grid_cell = cell;
        self.fused.grid_cell_certainty = certainty;
    }

    /// Standstill recalibration against the surrounding walls.
    ///
    /// Samples the distance sensors several times, averages the
    /// wall-derived heading by trust, derives the in-cell position
    /// from the perpendicular wall distances, and re-zeroes the
    /// encoder heading against the result. Returns the correction to
    /// feed into the next cycle. With no usable walls the correction
    /// only zeroes the pitch.
    pub fn recalibrate<S: SensorSource>(&mut self, source: &mut S) -> CorrectionRequest {
        let mut total_weight = 0.0f32;
        let mut avg_cos = 0.0f32;
        let mut avg_sin = 0.0f32;
        let mut sum_x = 0.0f32;
        let mut num_x = 0u32;
        let mut sum_y = 0.0f32;
        let mut num_y = 0u32;

        let state = self.fused.robot_state;
        let heading = state.heading;

        for _ in 0..self.config.recalibration_samples {
            let (distances, states) = source.sample_distances();
            self.fused.distances = distances;
            self.fused.dist_sensor_states = states;
            dist_sens::fuse(&mut self.fused, &self.mechanics, self.cell_size);

            let sens = self.fused.dist_sens;
            if sens.wall_angle_trust > 0.01 {
                total_weight += sens.wall_angle_trust;
                avg_cos += sens.wall_angle.cos() * sens.wall_angle_trust;
                avg_sin += sens.wall_angle.sin() * sens.wall_angle_trust;
            }

            let sides = [
                (AbsoluteDir::make_absolute(RelativeDir::Left, heading), sens.dist_to_wall_left),
                (AbsoluteDir::make_absolute(RelativeDir::Right, heading), sens.dist_to_wall_right),
                (heading, sens.dist_to_wall_front),
            ];
            for (wall_dir, dist) in sides {
                if dist <= 0.0 {
                    continue;
                }
                // A wall in direction d pins the position along d's
                // axis: cell edge minus (or plus) the measured gap.
                match wall_dir {
                    AbsoluteDir::North => {
                        sum_y += (state.map_coordinate.y as f32 + 0.5) * self.cell_size - dist;
                        num_y += 1;
                    }
                    AbsoluteDir::South => {
                        sum_y += (state.map_coordinate.y as f32 - 0.5) * self.cell_size + dist;
                        num_y += 1;
                    }
                    AbsoluteDir::East => {
                        sum_x += (state.map_coordinate.x as f32 + 0.5) * self.cell_size - dist;
                        num_x += 1;
                    }
                    AbsoluteDir::West => {
                        sum_x += (state.map_coordinate.x as f32 - 0.5) * self.cell_size + dist;
                        num_x += 1;
                    }
                }
            }
        }

        let mut request = CorrectionRequest {
            zero_pitch: true,
            ..Default::default()
        };

        if num_x > 0 {
            request.x = Some(sum_x / num_x as f32);
        }
        if num_y > 0 {
            request.y = Some(sum_y / num_y as f32);
        }

        if total_weight > 0.01 {
            let avg_angle = (avg_sin / total_weight).atan2(avg_cos / total_weight);
            request.heading = Some(make_rotation_coherent(state.global_heading, avg_angle));

            // Re-zero the encoder heading against the wall evidence so
            // its drift does not carry into the next leg.
            let (left, right) = source.wheel_travel();
            let raw_encoder_heading =
                (right - left) / (self.mechanics.wheel_distance * self.mechanics.chi);
            self.total_heading_offset = normalize_angle(raw_encoder_heading - avg_angle);
        }

        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DistSensorStatus, MapCoordinate};
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn fusion() -> SensorFusion {
        let mut config = FusionConfig::default();
        // Deterministic arithmetic for the tests
        config.pitch_iir_factor = 1.0;
        config.speed_iir_factor = 1.0;
        config.predicted_portion = 0.0;
        SensorFusion::new(MechanicsConfig::default(), config, 30.0)
    }

    fn still_inputs() -> SensorInputs {
        SensorInputs {
            dt: 0.05,
            wheel_speeds: WheelSpeeds::default(),
            wheel_travel: (0.0, 0.0),
            inertial_forward: Vec3::new(1.0, 0.0, 0.0),
            distances: Distances::default(),
            dist_sensor_states: DistSensorStates::default(),
            driving_straight: false,
        }
    }

    /// Burn the first-cycle skip.
    fn primed() -> SensorFusion {
        let mut f = fusion();
        assert!(f.update(&still_inputs(), None).is_none());
        f
    }

    #[test]
    fn test_over_frequency_cycle_skipped() {
        let mut f = primed();
        let mut inputs = still_inputs();
        inputs.dt = 0.001;
        assert!(f.update(&inputs, None).is_none());
    }

    #[test]
    fn test_straight_drive_integrates_position() {
        let mut f = primed();
        let mut inputs = still_inputs();
        inputs.wheel_speeds = WheelSpeeds::new(10.0, 10.0);
        let mut travel = 0.0;
        let mut last = FusedData::default();
        for _ in 0..40 {
            travel += 10.0 * inputs.dt;
            inputs.wheel_travel = (travel, travel);
            last = f.update(&inputs, None).unwrap().fused;
        }
        // 2 s at 10 cm/s straight east
        assert_relative_eq!(last.robot_state.position.x, 20.0, epsilon = 0.1);
        assert_relative_eq!(last.robot_state.position.y, 0.0, epsilon = 0.1);
        assert_eq!(last.robot_state.heading, AbsoluteDir::East);
    }

    #[test]
    fn test_cell_change_clears_record() {
        let mut f = primed();
        let mut inputs = still_inputs();
        inputs.wheel_speeds = WheelSpeeds::new(10.0, 10.0);
        let mut travel = 0.0;
        let mut changed = false;
        let mut coord = MapCoordinate::default();
        for _ in 0..40 {
            travel += 10.0 * inputs.dt;
            inputs.wheel_travel = (travel, travel);
            let outcome = f.update(&inputs, None).unwrap();
            if outcome.cell_changed {
                changed = true;
                assert_eq!(outcome.fused.grid_cell, GridCell::default());
                assert_relative_eq!(outcome.fused.grid_cell_certainty, 0.0);
            }
            coord = outcome.fused.robot_state.map_coordinate;
        }
        // 20 cm east of the origin rounds to cell (1, 0)
        assert!(changed);
        assert_eq!(coord, MapCoordinate::new(1, 0));
    }

    #[test]
    fn test_heading_correction_applied() {
        let mut f = primed();
        let correction = CorrectionRequest {
            heading: Some(PI / 2.0),
            ..Default::default()
        };
        let outcome = f.update(&still_inputs(), Some(correction)).unwrap();
        assert_relative_eq!(outcome.fused.robot_state.global_heading, PI / 2.0, epsilon = 1e-4);
        assert_eq!(outcome.fused.robot_state.heading, AbsoluteDir::North);
        // One-shot: the next uncorrected cycle does not re-apply it
        let next = f.update(&still_inputs(), None).unwrap();
        assert!(next.fused.robot_state.global_heading.abs() < PI / 2.0 + 0.1);
    }

    #[test]
    fn test_position_correction_overrides_integration() {
        let mut f = primed();
        let correction = CorrectionRequest {
            x: Some(15.0),
            y: Some(-3.0),
            ..Default::default()
        };
        let outcome = f.update(&still_inputs(), Some(correction)).unwrap();
        assert_relative_eq!(outcome.fused.robot_state.position.x, 15.0);
        assert_relative_eq!(outcome.fused.robot_state.position.y, -3.0);
    }

    #[test]
    fn test_correction_survives_skipped_cycle() {
        let mut f = primed();
        let mut fast = still_inputs();
        fast.dt = 0.001;
        // Both requests land on over-frequency cycles and merge
        assert!(f
            .update(
                &fast,
                Some(CorrectionRequest {
                    x: Some(15.0),
                    ..Default::default()
                })
            )
            .is_none());
        assert!(f
            .update(
                &fast,
                Some(CorrectionRequest {
                    y: Some(-3.0),
                    ..Default::default()
                })
            )
            .is_none());
        let outcome = f.update(&still_inputs(), None).unwrap();
        assert_relative_eq!(outcome.fused.robot_state.position.x, 15.0);
        assert_relative_eq!(outcome.fused.robot_state.position.y, -3.0);
        // Applied once, not re-applied afterwards
        let next = f.update(&still_inputs(), None).unwrap();
        assert_relative_eq!(next.fused.robot_state.position.x, 15.0);
    }

    #[test]
    fn test_zero_pitch_correction() {
        let mut f = primed();
        let mut inputs = still_inputs();
        // Nose-up forward vector
        inputs.inertial_forward = Vec3::new(0.96, 0.0, 0.28);
        f.update(&inputs, None).unwrap();
        assert!(f.fused().robot_state.pitch > 0.2);
        let correction = CorrectionRequest {
            zero_pitch: true,
            ..Default::default()
        };
        let outcome = f.update(&still_inputs(), Some(correction)).unwrap();
        assert_relative_eq!(outcome.fused.robot_state.pitch, 0.0);
    }

    #[test]
    fn test_ramp_flag_after_consecutive_cycles() {
        let mut f = primed();
        let mut inputs = still_inputs();
        inputs.inertial_forward = Vec3::new(0.96, 0.0, 0.28); // ~0.28 rad pitch
        let mut flagged_at = None;
        for i in 0..12 {
            let outcome = f.update(&inputs, None).unwrap();
            if outcome.fused.grid_cell.state & cell_state::RAMP != 0 && flagged_at.is_none() {
                flagged_at = Some(i);
            }
        }
        // Not before the debounce, set once it passes
        let at = flagged_at.expect("ramp flag never set");
        assert!(at >= 7, "flag set too early at cycle {}", at);
    }

    #[test]
    fn test_brief_pitch_spike_sets_no_ramp() {
        let mut f = primed();
        let mut tilted = still_inputs();
        tilted.inertial_forward = Vec3::new(0.96, 0.0, 0.28);
        for _ in 0..4 {
            f.update(&tilted, None).unwrap();
        }
        let outcome = f.update(&still_inputs(), None).unwrap();
        assert_eq!(outcome.fused.grid_cell.state & cell_state::RAMP, 0);
    }

    struct WalledSource {
        distances: Distances,
        states: DistSensorStates,
    }

    impl SensorSource for WalledSource {
        fn sample_distances(&mut self) -> (Distances, DistSensorStates) {
            (self.distances, self.states)
        }
        fn wheel_travel(&mut self) -> (f32, f32) {
            (0.0, 0.0)
        }
    }

    #[test]
    fn test_recalibrate_centers_between_side_walls() {
        let mut f = primed();
        // Facing east in a corridor, both side walls parallel at 60 mm
        let mut distances = Distances::default();
        let mut states = DistSensorStates::default();
        states.left_front = DistSensorStatus::Ok;
        states.left_back = DistSensorStatus::Ok;
        states.right_front = DistSensorStatus::Ok;
        states.right_back = DistSensorStatus::Ok;
        distances.left_front = 60;
        distances.left_back = 60;
        distances.right_front = 60;
        distances.right_back = 60;
        let mut source = WalledSource { distances, states };

        let request = f.recalibrate(&mut source);
        assert!(request.zero_pitch);
        // Left wall north at 12 cm, right wall south at 12 cm: the two
        // estimates average to a y offset of zero, dead center.
        assert_relative_eq!(request.y.unwrap(), 0.0, epsilon = 1e-4);
        assert!(request.x.is_none());
        // Parallel walls confirm the cardinal heading
        assert_relative_eq!(request.heading.unwrap(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_recalibrate_without_walls_only_zeroes_pitch() {
        let mut f = primed();
        let mut source = WalledSource {
            distances: Distances::default(),
            states: DistSensorStates::default(),
        };
        let request = f.recalibrate(&mut source);
        assert!(request.zero_pitch);
        assert!(request.x.is_none());
        assert!(request.y.is_none());
        assert!(request.heading.is_none());
    }
}
