//! Breadth-first path solver over the maze map.
//!
//! Runs directly against the persisted map, using each cell's scratch
//! byte for the discovered flag and the back-pointer toward the start.
//! Scratch state is ephemeral: it is swept back to zero on every exit,
//! success or failure, so a later search never sees stale markers.

use log::{debug, warn};
use thiserror::Error;

use crate::config::SolverConfig;
use crate::core::types::{AbsoluteDir, GridCell, MapCoordinate, ScratchValue, MAX_COORD, MIN_COORD};
use crate::error::VyuhaError;
use crate::map::store::MazeStore;
use crate::map::transport::MapTransport;

pub mod queue;

use queue::BoundedQueue;

#[derive(Error, Debug)]
pub enum SolveError {
    /// A path exists but is longer than the caller accepts.
    #[error("path exceeds maximum length")]
    Aborted,

    #[error("frontier queue overflow")]
    QueueOverflow,

    #[error("no path to goal")]
    Unreachable,

    #[error("map access failed: {0}")]
    Storage(String),

    /// A discovered cell carried no back-pointer during reconstruction.
    #[error("inconsistent search state during path reconstruction")]
    CorruptScratch,
}

impl From<VyuhaError> for SolveError {
    fn from(e: VyuhaError) -> Self {
        SolveError::Storage(e.to_string())
    }
}

/// Find the shortest known path from `start` to the nearest cell
/// satisfying `goal`, as a sequence of travel directions.
///
/// A neighbor is expanded through a passage only if the current cell's
/// mask opens it and, when the neighbor has been visited, the neighbor
/// confirms it from its side. Unvisited neighbors carry no mask yet
/// and are taken on the current cell's word alone. Black tiles are
/// never entered.
///
/// Returns [`SolveError::Aborted`] when the only path found is longer
/// than the configured maximum length.
pub fn find_shortest_path<T, F>(
    store: &mut MazeStore<T>,
    start: MapCoordinate,
    config: &SolverConfig,
    mut goal: F,
) -> Result<Vec<AbsoluteDir>, SolveError>
where
    T: MapTransport,
    F: FnMut(MapCoordinate, GridCell) -> bool,
{
    let mut frontier: BoundedQueue<MapCoordinate> = BoundedQueue::new(config.queue_capacity);

    store.set_scratch(start, ScratchValue::discovered_start())?;
    if frontier.enqueue(start).is_err() {
        reset_scratch(store, start.floor);
        return Err(SolveError::QueueOverflow);
    }

    while let Some(current) = frontier.dequeue() {
        let cell = store.get_cell(current)?;

        if goal(current, cell) {
            let path = reconstruct(store, start, current, config.max_path_len);
            reset_scratch(store, start.floor);
            return path;
        }

        for dir in AbsoluteDir::ALL {
            if !in_bounds(current, dir) || !cell.is_open(dir) {
                continue;
            }
            let next = current.neighbor(dir);
            let (next_cell, scratch) = store.get_cell_and_scratch(next)?;
            if scratch.is_discovered() || next_cell.is_hazard() {
                continue;
            }
            // Reciprocal confirmation: a visited neighbor must agree
            // the passage is open from its side.
            if next_cell.is_visited() && !next_cell.is_open(dir.opposite()) {
                continue;
            }
            store.set_scratch(next, ScratchValue::discovered(dir.opposite()))?;
            if frontier.enqueue(next).is_err() {
                warn!("Solver frontier overflow at ({}, {})", next.x, next.y);
                reset_scratch(store, start.floor);
                return Err(SolveError::QueueOverflow);
            }
        }
    }

    debug!(
        "No path from ({}, {}) to goal",
        start.x, start.y
    );
    reset_scratch(store, start.floor);
    Err(SolveError::Unreachable)
}

/// Walk the back-pointers from `goal_cell` to `start`, recording the
/// travel direction of each step, then reverse into forward order.
fn reconstruct<T: MapTransport>(
    store: &mut MazeStore<T>,
    start: MapCoordinate,
    goal_cell: MapCoordinate,
    max_path_len: usize,
) -> Result<Vec<AbsoluteDir>, SolveError> {
    let mut path = Vec::new();
    let mut current = goal_cell;
    while current != start {
        let back = match store.get_scratch(current)?.back_dir() {
            Some(dir) => dir,
            None => return Err(SolveError::CorruptScratch),
        };
        path.push(back.opposite());
        current = current.neighbor(back);
        if path.len() >= max_path_len {
            return Err(SolveError::Aborted);
        }
    }
    path.reverse();
    Ok(path)
}

/// Does moving in `dir` stay inside the addressable coordinate range?
#[inline]
fn in_bounds(coord: MapCoordinate, dir: AbsoluteDir) -> bool {
    match dir {
        AbsoluteDir::North => coord.y < MAX_COORD,
        AbsoluteDir::East => coord.x < MAX_COORD,
        AbsoluteDir::South => coord.y > MIN_COORD,
        AbsoluteDir::West => coord.x > MIN_COORD,
    }
}

fn reset_scratch<T: MapTransport>(store: &mut MazeStore<T>, floor: u8) {
    // A failing transport here would already have failed the search
    // itself; nothing useful is left to report.
    if store.reset_scratch(floor).is_err() {
        warn!("Scratch reset failed after search");
    }
}
