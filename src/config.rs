//! Configuration loading for the navigation core

use crate::error::{Result, VyuhaError};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Deserialize, Default)]
pub struct VyuhaConfig {
    #[serde(default)]
    pub mechanics: MechanicsConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub maze: MazeConfig,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// Robot physical parameters
#[derive(Clone, Debug, Deserialize)]
pub struct MechanicsConfig {
    /// Distance between wheel contact points in cm (default: 15.0)
    #[serde(default = "default_wheel_distance")]
    pub wheel_distance: f32,

    /// Skid-steer correction factor for encoder heading (default: 1.0)
    #[serde(default = "default_chi")]
    pub chi: f32,

    /// Spacing between the two side sensors of one pair in cm (default: 8.0)
    #[serde(default = "default_side_sensor_spacing")]
    pub side_sensor_spacing: f32,

    /// Side sensor mount offset from robot center in cm (default: 6.0)
    #[serde(default = "default_side_sensor_offset")]
    pub side_sensor_offset: f32,

    /// Front sensor mount offset from robot center in cm (default: 7.0)
    #[serde(default = "default_front_sensor_offset")]
    pub front_sensor_offset: f32,
}

/// Sensor fusion tuning
#[derive(Clone, Debug, Deserialize)]
pub struct FusionConfig {
    /// Maximum fusion update frequency in Hz (default: 100.0)
    #[serde(default = "default_max_frequency")]
    pub max_frequency: f32,

    /// IIR low-pass factor for pitch, weight of the old value (default: 0.8)
    #[serde(default = "default_pitch_iir_factor")]
    pub pitch_iir_factor: f32,

    /// Weight of the gyro-integrated heading against the encoder
    /// heading (default: 0.7)
    #[serde(default = "default_angular_vel_portion")]
    pub angular_vel_portion: f32,

    /// Weight of the wall-derived heading at full trust (default: 0.6)
    #[serde(default = "default_dist_sens_portion")]
    pub dist_sens_portion: f32,

    /// Weight of the rate-predicted heading in the final blend
    /// (default: 0.3)
    #[serde(default = "default_predicted_portion")]
    pub predicted_portion: f32,

    /// IIR low-pass factor for forward velocity, weight of the new
    /// sample (default: 0.8)
    #[serde(default = "default_speed_iir_factor")]
    pub speed_iir_factor: f32,

    /// IIR low-pass factor for angular velocity, weight of the new
    /// sample (default: 0.5)
    #[serde(default = "default_angular_vel_iir_factor")]
    pub angular_vel_iir_factor: f32,

    /// Pitch magnitude above which the robot is considered on a
    /// ramp, in radians (default: 0.15)
    #[serde(default = "default_ramp_pitch_threshold")]
    pub ramp_pitch_threshold: f32,

    /// Consecutive over-threshold cycles before the ramp flag is set
    /// (default: 8)
    #[serde(default = "default_ramp_cycles")]
    pub ramp_cycles: u32,

    /// Disagreement between gyro and encoder yaw rates above which
    /// the gyro is considered faulty, in rad/s (default: 0.8)
    #[serde(default = "default_inertial_error_threshold")]
    pub inertial_error_threshold: f32,

    /// Commanded-vs-measured yaw rate mismatch above which the robot
    /// is considered stuck while rotating, in rad/s (default: 0.5)
    #[serde(default = "default_rotation_stuck_threshold")]
    pub rotation_stuck_threshold: f32,

    /// Sample-and-fuse iterations of a standstill recalibration
    /// (default: 10)
    #[serde(default = "default_recalibration_samples")]
    pub recalibration_samples: u32,
}

/// Maze geometry and wall detection tuning
#[derive(Clone, Debug, Deserialize)]
pub struct MazeConfig {
    /// Side length of one maze cell in cm (default: 30.0)
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,

    /// Consecutive consistent scans required before a cell is
    /// committed (default: 3)
    #[serde(default = "default_consistency_scans")]
    pub consistency_scans: u32,

    /// Per-side hit count at which a wall is considered sure
    /// (default: 2)
    #[serde(default = "default_sure_wall_hits")]
    pub sure_wall_hits: u8,

    /// Distance below which a side beam counts as a wall hit, in mm
    /// (default: 200)
    #[serde(default = "default_wall_hit_distance")]
    pub wall_hit_distance_mm: u16,
}

/// Path solver limits
#[derive(Clone, Debug, Deserialize)]
pub struct SolverConfig {
    /// BFS frontier queue capacity (default: 128)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Default maximum returned path length (default: 64)
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,
}

// Default value functions
fn default_wheel_distance() -> f32 {
    15.0
}
fn default_chi() -> f32 {
    1.0
}
fn default_side_sensor_spacing() -> f32 {
    8.0
}
fn default_side_sensor_offset() -> f32 {
    6.0
}
fn default_front_sensor_offset() -> f32 {
    7.0
}

fn default_max_frequency() -> f32 {
    100.0
}
fn default_pitch_iir_factor() -> f32 {
    0.8
}
fn default_angular_vel_portion() -> f32 {
    0.7
}
fn default_dist_sens_portion() -> f32 {
    0.6
}
fn default_predicted_portion() -> f32 {
    0.3
}
fn default_speed_iir_factor() -> f32 {
    0.8
}
fn default_angular_vel_iir_factor() -> f32 {
    0.5
}
fn default_ramp_pitch_threshold() -> f32 {
    0.15
}
fn default_ramp_cycles() -> u32 {
    8
}
fn default_inertial_error_threshold() -> f32 {
    0.8
}
fn default_rotation_stuck_threshold() -> f32 {
    0.5
}
fn default_recalibration_samples() -> u32 {
    10
}

fn default_cell_size() -> f32 {
    30.0
}
fn default_consistency_scans() -> u32 {
    3
}
fn default_sure_wall_hits() -> u8 {
    2
}
fn default_wall_hit_distance() -> u16 {
    200
}

fn default_queue_capacity() -> usize {
    128
}
fn default_max_path_len() -> usize {
    64
}

impl Default for MechanicsConfig {
    fn default() -> Self {
        Self {
            wheel_distance: default_wheel_distance(),
            chi: default_chi(),
            side_sensor_spacing: default_side_sensor_spacing(),
            side_sensor_offset: default_side_sensor_offset(),
            front_sensor_offset: default_front_sensor_offset(),
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_frequency: default_max_frequency(),
            pitch_iir_factor: default_pitch_iir_factor(),
            angular_vel_portion: default_angular_vel_portion(),
            dist_sens_portion: default_dist_sens_portion(),
            predicted_portion: default_predicted_portion(),
            speed_iir_factor: default_speed_iir_factor(),
            angular_vel_iir_factor: default_angular_vel_iir_factor(),
            ramp_pitch_threshold: default_ramp_pitch_threshold(),
            ramp_cycles: default_ramp_cycles(),
            inertial_error_threshold: default_inertial_error_threshold(),
            rotation_stuck_threshold: default_rotation_stuck_threshold(),
            recalibration_samples: default_recalibration_samples(),
        }
    }
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            consistency_scans: default_consistency_scans(),
            sure_wall_hits: default_sure_wall_hits(),
            wall_hit_distance_mm: default_wall_hit_distance(),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_path_len: default_max_path_len(),
        }
    }
}

impl VyuhaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VyuhaError::Config(format!("Failed to read config file: {}", e)))?;
        let config: VyuhaConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = VyuhaConfig::default();
        assert_relative_eq!(config.maze.cell_size, 30.0);
        assert_eq!(config.solver.queue_capacity, 128);
        assert_eq!(config.fusion.ramp_cycles, 8);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: VyuhaConfig = toml::from_str(
            r#"
            [mechanics]
            wheel_distance = 14.2

            [maze]
            consistency_scans = 4
            "#,
        )
        .unwrap();
        assert_relative_eq!(config.mechanics.wheel_distance, 14.2);
        assert_relative_eq!(config.mechanics.chi, 1.0);
        assert_eq!(config.maze.consistency_scans, 4);
        assert_eq!(config.maze.sure_wall_hits, 2);
    }
}
