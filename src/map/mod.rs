//! Persisted maze map: byte transport, cell store, wall detection.

pub mod store;
pub mod transport;
pub mod walls;

pub use store::MazeStore;
pub use transport::{MapTransport, MemoryTransport};
pub use walls::{exploration_complete, ScanOutcome, WallDetector, WallScan};
