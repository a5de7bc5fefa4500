//! Wall detection with debounced cell commits.
//!
//! Every fusion cycle turns the raw side and front beams into per-side
//! wall hit counts, rotates them into the absolute frame, and checks
//! the result against what is already believed about the current cell.
//! Only after several consecutive consistent scans does the cell get
//! committed, with sure detections (both beams of a side agreeing)
//! accumulated and forced closed in the committed mask.

use log::{info, trace};

use crate::config::MazeConfig;
use crate::core::types::{
    cell_state, connections, AbsoluteDir, DistSensorStatus, FusedData, GridCell, MapCoordinate,
    RelativeDir, HOME,
};
use crate::error::Result;
use crate::map::store::MazeStore;
use crate::map::transport::MapTransport;

/// Wall hit counts for one scan, robot-relative. Each side is covered
/// by up to two beams, so counts run 0 to 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WallScan {
    pub front_hits: u8,
    pub left_hits: u8,
    pub right_hits: u8,
}

impl WallScan {
    /// Count wall hits from the raw beams in `fused`. A beam hits when
    /// its reading, referred back to the cell center, is closer than
    /// the threshold, or when it reports underflow (wall pressed
    /// against the sensor).
    ///
    /// Each reading is compensated by the robot's in-cell offset along
    /// the beam axis, so a robot standing near a cell edge neither
    /// counts the next cell's wall nor misses its own.
    pub fn from_beams(fused: &FusedData, config: &MazeConfig) -> Self {
        let d = &fused.distances;
        let s = &fused.dist_sensor_states;
        let pos = fused.robot_state.position;
        let cell = config.cell_size;

        // Positive offset: too far toward that side, walls there read
        // short of their center-referenced distance.
        let off_x = pos.x - (pos.x / cell).round() * cell;
        let off_y = pos.y - (pos.y / cell).round() * cell;
        let (to_front, to_left) = match fused.robot_state.heading {
            AbsoluteDir::North => (off_y, -off_x),
            AbsoluteDir::East => (off_x, off_y),
            AbsoluteDir::South => (-off_y, off_x),
            AbsoluteDir::West => (-off_x, -off_y),
        };

        let threshold_cm = config.wall_hit_distance_mm as f32 / 10.0;
        let hit = |status: DistSensorStatus, dist_mm: u16, offset_cm: f32| -> u8 {
            match status {
                DistSensorStatus::Ok if dist_mm as f32 / 10.0 + offset_cm < threshold_cm => 1,
                DistSensorStatus::Underflow => 1,
                _ => 0,
            }
        };
        Self {
            front_hits: hit(s.front_left, d.front_left, to_front)
                + hit(s.front_right, d.front_right, to_front),
            left_hits: hit(s.left_front, d.left_front, to_left)
                + hit(s.left_back, d.left_back, to_left),
            right_hits: hit(s.right_front, d.right_front, -to_left)
                + hit(s.right_back, d.right_back, -to_left),
        }
    }
}

/// Outcome of one scan evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Provisional record for the current cell, to be mirrored into
    /// the published [`FusedData`].
    pub cell: GridCell,
    /// True once the debounce has passed and the cell was committed.
    pub committed: bool,
}

/// Debounced wall detector for the cell the robot occupies.
pub struct WallDetector {
    config: MazeConfig,
    last_position: MapCoordinate,
    last_heading: AbsoluteDir,
    consecutive_ok: u32,
    cumulative_sure_walls: u8,
    /// Home-cell merge of pre-rotation detections, done once per run.
    start_pending: bool,
}

impl WallDetector {
    pub fn new(config: MazeConfig) -> Self {
        Self {
            config,
            last_position: HOME,
            last_heading: AbsoluteDir::East,
            consecutive_ok: 0,
            cumulative_sure_walls: 0,
            start_pending: true,
        }
    }

    /// Forget accumulated evidence. Called when the robot enters a new
    /// cell or the pose was corrected across a cell boundary.
    pub fn reset_cell_record(&mut self) {
        self.consecutive_ok = 0;
        self.cumulative_sure_walls = 0;
    }

    /// Evaluate one scan against the current fused state and, once
    /// enough consecutive scans agree, commit the cell to the map.
    pub fn evaluate<T: MapTransport>(
        &mut self,
        scan: WallScan,
        fused: &FusedData,
        store: &mut MazeStore<T>,
    ) -> Result<ScanOutcome> {
        let position = fused.robot_state.map_coordinate;
        let heading = fused.robot_state.heading;

        let mut walls: u8 = 0;
        let mut sure_walls: u8 = 0;
        let sides = [
            (RelativeDir::Forward, scan.front_hits),
            (RelativeDir::Left, scan.left_hits),
            (RelativeDir::Right, scan.right_hits),
        ];
        for (side, hits) in sides {
            if hits == 0 {
                continue;
            }
            let bit = AbsoluteDir::make_absolute(side, heading).bit();
            walls |= bit;
            if hits >= self.config.sure_wall_hits {
                sure_walls |= bit;
            }
        }

        // First rotation on the home cell: the sides that were behind
        // the robot before turning were already scanned, merge them in.
        if position == HOME
            && self.last_position == HOME
            && heading != self.last_heading
            && self.start_pending
        {
            walls |= !fused.grid_cell.connections & connections::DIRECTION_MASK;
            self.start_pending = false;
        }

        let provisional = GridCell::new(
            !walls & connections::DIRECTION_MASK,
            cell_state::VISITED,
        );

        let mut is_ok = position == self.last_position && heading == self.last_heading;
        if is_ok {
            // The home cell's south edge is the maze entrance; its
            // reading is not required to match.
            let mask = if position == HOME {
                connections::NORTH | connections::EAST | connections::WEST
            } else {
                connections::DIRECTION_MASK
            };
            if provisional.connections & mask != fused.grid_cell.connections & mask {
                is_ok = false;
            }
        }

        self.last_position = position;
        self.last_heading = heading;

        if is_ok {
            self.consecutive_ok += 1;
        } else {
            self.consecutive_ok = 0;
        }

        let mut cell = provisional;
        let committed = self.consecutive_ok >= self.config.consistency_scans;
        if committed {
            self.cumulative_sure_walls |= sure_walls;
            cell.connections &= !self.cumulative_sure_walls;
            // Keep flags accumulated elsewhere: persisted victim or
            // checkpoint marks, and the ramp flag from the pose filter.
            let stored = store.get_cell(position)?;
            cell.state |= stored.state | fused.grid_cell.state;
            store.set_cell(position, cell)?;
            info!(
                "Committed cell ({}, {}): connections {:#06b}, sure walls {:#06b}",
                position.x, position.y, cell.connections, self.cumulative_sure_walls
            );
        } else {
            trace!(
                "Scan at ({}, {}) heading {:?}: walls {:#06b}, ok streak {}",
                position.x,
                position.y,
                heading,
                walls,
                self.consecutive_ok
            );
        }

        Ok(ScanOutcome { cell, committed })
    }
}

/// True once every visited cell's open passages lead only to cells
/// that are themselves visited or known hazards.
///
/// Edges of the explored bounding box are skipped in the direction
/// that would leave it, matching the solver's reachable region.
pub fn exploration_complete<T: MapTransport>(
    store: &mut MazeStore<T>,
    min: MapCoordinate,
    max: MapCoordinate,
) -> Result<bool> {
    for x in min.x..=max.x {
        for y in min.y..=max.y {
            let pos = MapCoordinate {
                x,
                y,
                floor: min.floor,
            };
            let cell = store.get_cell(pos)?;
            if !cell.is_visited() {
                continue;
            }
            for dir in AbsoluteDir::ALL {
                let (dx, dy) = dir.offset();
                let (nx, ny) = (x as i16 + dx as i16, y as i16 + dy as i16);
                if nx < min.x as i16 || nx > max.x as i16 || ny < min.y as i16 || ny > max.y as i16
                {
                    continue;
                }
                if !cell.is_open(dir) {
                    continue;
                }
                let neighbor = store.get_cell(pos.neighbor(dir))?;
                if !neighbor.is_visited() && !neighbor.is_hazard() {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}
