//! VyuhaNav - Navigation core for an autonomous maze rescue robot
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 solver/  drive/                     │  ← Planning & motion
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                fusion/  shared                      │  ← Pose estimation
//! │       (sensor fusion, published snapshots)          │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      map/                           │  ← Persisted maze map
//! │          (transport, store, wall detection)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                 (types, math)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The fusion cycle is the single writer of the robot's pose: it fuses
//! wheel encoders, the inertial unit, and the paired distance sensors
//! into a [`FusedData`] snapshot published through [`SharedFusedData`].
//! The wall detector turns the same distance readings into debounced
//! per-cell wall commits on the persisted [`MazeStore`], and the BFS
//! [`solver`] plans over that map toward arbitrary goal predicates.
//!
//! World frame: x = east, y = north, heading in radians CCW with 0
//! pointing east. The maze is a grid of 30 cm cells addressed by
//! signed cell coordinates with the start cell at (0, 0).

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Maze map (depends on core)
// ============================================================================
pub mod map;

// ============================================================================
// Layer 3: Pose estimation (depends on core, map)
// ============================================================================
pub mod fusion;
pub mod shared;

// ============================================================================
// Layer 4: Planning and motion (depends on all layers)
// ============================================================================
pub mod drive;
pub mod solver;

pub mod config;
pub mod error;

pub use crate::config::VyuhaConfig;
pub use crate::core::types::{
    AbsoluteDir, DistSensorStates, DistSensorStatus, Distances, FusedData, GridCell,
    MapCoordinate, RelativeDir, RobotState, Vec3, WheelSpeeds, HOME,
};
pub use crate::drive::DriveTask;
pub use crate::error::{Result, VyuhaError};
pub use crate::fusion::{CycleOutcome, SensorFusion, SensorInputs, SensorSource};
pub use crate::map::{MazeStore, MemoryTransport, WallDetector, WallScan};
pub use crate::shared::{CorrectionRequest, SharedFusedData};
pub use crate::solver::{find_shortest_path, SolveError};
