//! Core data types for the navigation stack.
//!
//! World frame: x = east, y = north, z = up; heading in radians, CCW
//! positive, 0 pointing east. Map coordinates are discrete 30 cm cells
//! with north = +y and east = +x.

use std::f32::consts::{FRAC_PI_4, PI};
use std::ops::{Add, AddAssign, Mul};

use crate::core::math::normalize_angle;

/// Minimum cell index supported by the fixed-width map addressing.
pub const MIN_COORD: i8 = -32;
/// Maximum cell index supported by the fixed-width map addressing.
pub const MAX_COORD: i8 = 31;

/// Small 3D vector (f32). Position in cm, velocities in cm/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Cardinal direction on the maze grid, robot-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbsoluteDir {
    North,
    East,
    South,
    West,
}

impl AbsoluteDir {
    /// All four directions in the fixed expansion/check order.
    pub const ALL: [AbsoluteDir; 4] = [
        AbsoluteDir::North,
        AbsoluteDir::East,
        AbsoluteDir::South,
        AbsoluteDir::West,
    ];

    /// Connection-mask bit for this direction.
    #[inline]
    pub const fn bit(self) -> u8 {
        match self {
            AbsoluteDir::North => connections::NORTH,
            AbsoluteDir::East => connections::EAST,
            AbsoluteDir::South => connections::SOUTH,
            AbsoluteDir::West => connections::WEST,
        }
    }

    #[inline]
    pub const fn opposite(self) -> AbsoluteDir {
        match self {
            AbsoluteDir::North => AbsoluteDir::South,
            AbsoluteDir::East => AbsoluteDir::West,
            AbsoluteDir::South => AbsoluteDir::North,
            AbsoluteDir::West => AbsoluteDir::East,
        }
    }

    /// Cell offset (dx, dy) when moving one cell in this direction.
    #[inline]
    pub const fn offset(self) -> (i8, i8) {
        match self {
            AbsoluteDir::North => (0, 1),
            AbsoluteDir::East => (1, 0),
            AbsoluteDir::South => (0, -1),
            AbsoluteDir::West => (-1, 0),
        }
    }

    /// Nearest cardinal for a continuous heading (quadrant test).
    pub fn from_heading(heading: f32) -> AbsoluteDir {
        let h = normalize_angle(heading);
        if h > FRAC_PI_4 && h < 3.0 * FRAC_PI_4 {
            AbsoluteDir::North
        } else if h < -FRAC_PI_4 && h > -3.0 * FRAC_PI_4 {
            AbsoluteDir::South
        } else if h.abs() <= FRAC_PI_4 {
            AbsoluteDir::East
        } else {
            AbsoluteDir::West
        }
    }

    /// Heading (radians) at the center of this direction's quadrant.
    #[inline]
    pub fn heading(self) -> f32 {
        match self {
            AbsoluteDir::North => PI / 2.0,
            AbsoluteDir::East => 0.0,
            AbsoluteDir::South => -PI / 2.0,
            AbsoluteDir::West => PI,
        }
    }

    /// Rotate a robot-relative direction into the absolute frame.
    pub fn make_absolute(relative: RelativeDir, heading: AbsoluteDir) -> AbsoluteDir {
        let base = match heading {
            AbsoluteDir::North => 0,
            AbsoluteDir::East => 1,
            AbsoluteDir::South => 2,
            AbsoluteDir::West => 3,
        };
        let turn = match relative {
            RelativeDir::Forward => 0,
            RelativeDir::Right => 1,
            RelativeDir::Backward => 2,
            RelativeDir::Left => 3,
        };
        match (base + turn) % 4 {
            0 => AbsoluteDir::North,
            1 => AbsoluteDir::East,
            2 => AbsoluteDir::South,
            _ => AbsoluteDir::West,
        }
    }
}

/// Direction relative to the robot's current heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDir {
    Forward,
    Backward,
    Left,
    Right,
}

/// Discrete cell coordinate on the maze map.
///
/// Bounded to [-32, 31] per axis by the store's fixed-width addressing;
/// the store masks coordinates into range, callers keep them in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MapCoordinate {
    pub x: i8,
    pub y: i8,
    pub floor: u8,
}

/// Start cell of the maze run.
pub const HOME: MapCoordinate = MapCoordinate {
    x: 0,
    y: 0,
    floor: 0,
};

impl MapCoordinate {
    pub const fn new(x: i8, y: i8) -> Self {
        Self { x, y, floor: 0 }
    }

    /// Neighbor cell one step in `dir`. Does not bounds-check; the
    /// solver's loop bounds keep results in range.
    pub fn neighbor(self, dir: AbsoluteDir) -> MapCoordinate {
        let (dx, dy) = dir.offset();
        MapCoordinate {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
            floor: self.floor,
        }
    }
}

/// Connection-mask bits of a [`GridCell`] (bits 0-3) and the
/// ramp-direction sub-field (bits 4-5).
pub mod connections {
    pub const NORTH: u8 = 1 << 0;
    pub const EAST: u8 = 1 << 1;
    pub const SOUTH: u8 = 1 << 2;
    pub const WEST: u8 = 1 << 3;
    pub const NOWHERE: u8 = 0;
    pub const DIRECTION_MASK: u8 = 0x0f;

    pub const RAMP_NORTH: u8 = 0b00 << 4;
    pub const RAMP_EAST: u8 = 0b01 << 4;
    pub const RAMP_SOUTH: u8 = 0b10 << 4;
    pub const RAMP_WEST: u8 = 0b11 << 4;
    pub const RAMP_DIR_MASK: u8 = 0b11 << 4;
}

/// State-flag bits of a [`GridCell`].
pub mod cell_state {
    pub const VISITED: u8 = 1 << 0;
    pub const VICTIM: u8 = 1 << 1;
    pub const CHECKPOINT: u8 = 1 << 2;
    pub const BLACK_TILE: u8 = 1 << 3;
    pub const RAMP: u8 = 1 << 4;
    pub const NONE: u8 = 0;
}

/// Persisted record for one maze cell.
///
/// `connections` holds the confirmed-open direction bits plus the
/// ramp-direction sub-field; `state` holds the visited/victim/
/// checkpoint/black-tile/ramp flags. The byte layout is the persistence
/// schema and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridCell {
    pub connections: u8,
    pub state: u8,
}

impl GridCell {
    pub const fn new(connections: u8, state: u8) -> Self {
        Self { connections, state }
    }

    /// Is the passage in `dir` confirmed open?
    #[inline]
    pub fn is_open(self, dir: AbsoluteDir) -> bool {
        self.connections & dir.bit() != 0
    }

    #[inline]
    pub fn is_visited(self) -> bool {
        self.state & cell_state::VISITED != 0
    }

    #[inline]
    pub fn is_hazard(self) -> bool {
        self.state & cell_state::BLACK_TILE != 0
    }
}

/// Per-cell search scratch byte used by the BFS solver.
///
/// Zero means undiscovered. A discovered cell stores the cardinal
/// direction leading *back toward the BFS start* in the low bits plus
/// the discovered flag. Ephemeral: zeroed between searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScratchValue(pub u8);

impl ScratchValue {
    const DISCOVERED: u8 = 1 << 7;

    pub const UNDISCOVERED: ScratchValue = ScratchValue(0);

    /// Mark discovered with a back-pointer toward the start.
    pub fn discovered(back: AbsoluteDir) -> Self {
        let dir = match back {
            AbsoluteDir::North => 0,
            AbsoluteDir::East => 1,
            AbsoluteDir::South => 2,
            AbsoluteDir::West => 3,
        };
        ScratchValue(Self::DISCOVERED | dir)
    }

    /// Mark discovered with no back-pointer (the start cell itself).
    pub const fn discovered_start() -> Self {
        ScratchValue(Self::DISCOVERED | 0b100)
    }

    #[inline]
    pub fn is_discovered(self) -> bool {
        self.0 & Self::DISCOVERED != 0
    }

    /// Back-pointer direction, `None` for the start cell or undiscovered.
    pub fn back_dir(self) -> Option<AbsoluteDir> {
        if !self.is_discovered() {
            return None;
        }
        match self.0 & 0b111 {
            0 => Some(AbsoluteDir::North),
            1 => Some(AbsoluteDir::East),
            2 => Some(AbsoluteDir::South),
            3 => Some(AbsoluteDir::West),
            _ => None,
        }
    }
}

/// Speed of both wheels (cm/s).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelSpeeds {
    pub left: f32,
    pub right: f32,
}

impl WheelSpeeds {
    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Average forward speed of the two wheels.
    #[inline]
    pub fn average(self) -> f32 {
        (self.left + self.right) / 2.0
    }
}

/// Continuous robot pose and motion state.
///
/// Mutated exclusively by the fusion cycle; everything downstream
/// receives copies. `global_heading` is rotation-coherent (unwrapped),
/// not clamped to ±π.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotState {
    /// Wheel speeds from the encoder layer (cm/s).
    pub wheel_speeds: WheelSpeeds,
    /// Forward velocity along the forward vector (cm/s).
    pub forward_vel: f32,
    /// Position in cm, world frame.
    pub position: Vec3,
    /// Angular velocity: x = yaw rate, z = pitch rate (rad/s).
    pub angular_vel: Vec3,
    /// Continuously unwrapped heading (rad).
    pub global_heading: f32,
    /// Pitch (rad), positive nose-up.
    pub pitch: f32,
    /// Unit forward vector derived from heading and pitch.
    pub forward_vec: Vec3,
    /// Nearest cardinal heading.
    pub heading: AbsoluteDir,
    /// Nearest map cell.
    pub map_coordinate: MapCoordinate,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            wheel_speeds: WheelSpeeds::default(),
            forward_vel: 0.0,
            position: Vec3::default(),
            angular_vel: Vec3::default(),
            global_heading: 0.0,
            pitch: 0.0,
            forward_vec: Vec3::new(1.0, 0.0, 0.0),
            heading: AbsoluteDir::East,
            map_coordinate: HOME,
        }
    }
}

/// Status of one ranging beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistSensorStatus {
    Ok,
    /// Target beyond the sensor's maximum range.
    Overflow,
    /// Target closer than the sensor's minimum range.
    Underflow,
    #[default]
    Error,
}

/// Latest distance readings (mm), one per beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Distances {
    pub front_left: u16,
    pub front_right: u16,
    pub front_long: u16,
    pub left_front: u16,
    pub left_back: u16,
    pub right_front: u16,
    pub right_back: u16,
}

/// Per-beam status, same layout as [`Distances`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DistSensorStates {
    pub front_left: DistSensorStatus,
    pub front_right: DistSensorStatus,
    pub front_long: DistSensorStatus,
    pub left_front: DistSensorStatus,
    pub left_back: DistSensorStatus,
    pub right_front: DistSensorStatus,
    pub right_back: DistSensorStatus,
}

/// Wall geometry derived from paired distance sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedDistSens {
    /// Absolute heading implied by the visible walls (rad, wrapped).
    pub wall_angle: f32,
    /// Trust in `wall_angle`, [0, 1]. Zero when no wall pair is usable.
    pub wall_angle_trust: f32,
    /// Perpendicular distance (cm) to the left wall, negative if unknown.
    pub dist_to_wall_left: f32,
    /// Perpendicular distance (cm) to the right wall, negative if unknown.
    pub dist_to_wall_right: f32,
    /// Perpendicular distance (cm) to the front wall, negative if unknown.
    pub dist_to_wall_front: f32,
}

impl Default for FusedDistSens {
    fn default() -> Self {
        Self {
            wall_angle: 0.0,
            wall_angle_trust: 0.0,
            dist_to_wall_left: -1.0,
            dist_to_wall_right: -1.0,
            dist_to_wall_front: -1.0,
        }
    }
}

/// Aggregate hand-off between the fusion cycle and every consumer.
///
/// Obtained only as a whole-struct snapshot via
/// [`SharedFusedData::snapshot`](crate::shared::SharedFusedData::snapshot);
/// never observed partially updated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FusedData {
    pub robot_state: RobotState,
    /// In-progress record for the cell the robot currently occupies.
    pub grid_cell: GridCell,
    /// Certainty about `grid_cell`, [0, 1].
    pub grid_cell_certainty: f32,
    pub distances: Distances,
    pub dist_sensor_states: DistSensorStates,
    pub dist_sens: FusedDistSens,
}
