//! Persisted maze map with fixed-width cell addressing.
//!
//! ## Address layout
//!
//! Each cell owns an 8-byte slot. Coordinates are biased by 32 and
//! masked to 6 bits, so the full [-32, 31] range of both axes maps
//! into one 32 KiB bank per floor:
//!
//! ```text
//! addr = floor * 0x8000
//!      + ((x + 0x20) & 0x3f) << 3
//!      + ((y + 0x20) & 0x3f) << 9
//! ```
//!
//! Byte 0 of the slot is the connection mask, byte 1 the state flags,
//! byte 2 the solver scratch byte. The remaining slot bytes are spare.

use log::{debug, error};
use rand::Rng;

use crate::core::types::{GridCell, MapCoordinate, ScratchValue};
use crate::error::{Result, VyuhaError};
use crate::map::transport::MapTransport;

/// Bytes reserved per floor bank.
pub const FLOOR_STRIDE: u32 = 0x8000;
/// Number of floor banks.
pub const NUM_FLOORS: u32 = 2;
/// Total bytes a transport must provide.
pub const REQUIRED_CAPACITY: u32 = FLOOR_STRIDE * NUM_FLOORS;

const CELLS_PER_AXIS: i16 = 64;

/// Maze map store over a byte transport.
pub struct MazeStore<T: MapTransport> {
    transport: T,
}

impl<T: MapTransport> MazeStore<T> {
    /// Wrap a transport. Fails if it is too small for both floor banks.
    pub fn new(transport: T) -> Result<Self> {
        if transport.capacity() < REQUIRED_CAPACITY {
            return Err(VyuhaError::Storage(format!(
                "transport holds {} bytes, map needs {}",
                transport.capacity(),
                REQUIRED_CAPACITY
            )));
        }
        Ok(Self { transport })
    }

    /// Slot address for a cell. The bias-and-mask keeps any i8
    /// coordinate in range, so this cannot produce an out-of-bank
    /// address.
    #[inline]
    fn address(coord: MapCoordinate) -> u32 {
        let x = ((coord.x as i16 + 0x20) & 0x3f) as u32;
        let y = ((coord.y as i16 + 0x20) & 0x3f) as u32;
        (coord.floor as u32 % NUM_FLOORS) * FLOOR_STRIDE + (x << 3) + (y << 9)
    }

    pub fn get_cell(&mut self, coord: MapCoordinate) -> Result<GridCell> {
        let mut bytes = [0u8; 2];
        self.transport.read_bytes(Self::address(coord), &mut bytes)?;
        Ok(GridCell::new(bytes[0], bytes[1]))
    }

    pub fn set_cell(&mut self, coord: MapCoordinate, cell: GridCell) -> Result<()> {
        self.transport
            .write_bytes(Self::address(coord), &[cell.connections, cell.state])
    }

    pub fn get_scratch(&mut self, coord: MapCoordinate) -> Result<ScratchValue> {
        Ok(ScratchValue(self.transport.read_byte(Self::address(coord) + 2)?))
    }

    pub fn set_scratch(&mut self, coord: MapCoordinate, value: ScratchValue) -> Result<()> {
        self.transport.write_byte(Self::address(coord) + 2, value.0)
    }

    /// Read cell and scratch in one transport access.
    pub fn get_cell_and_scratch(
        &mut self,
        coord: MapCoordinate,
    ) -> Result<(GridCell, ScratchValue)> {
        let mut bytes = [0u8; 3];
        self.transport.read_bytes(Self::address(coord), &mut bytes)?;
        Ok((GridCell::new(bytes[0], bytes[1]), ScratchValue(bytes[2])))
    }

    /// Write cell and scratch in one transport access.
    pub fn set_cell_and_scratch(
        &mut self,
        coord: MapCoordinate,
        cell: GridCell,
        scratch: ScratchValue,
    ) -> Result<()> {
        self.transport
            .write_bytes(Self::address(coord), &[cell.connections, cell.state, scratch.0])
    }

    /// Zero every cell slot on every floor.
    pub fn reset_all(&mut self) -> Result<()> {
        let zeros = [0u8; 512];
        let mut addr = 0;
        while addr < REQUIRED_CAPACITY {
            self.transport.write_bytes(addr, &zeros)?;
            addr += zeros.len() as u32;
        }
        debug!("Maze map cleared ({} bytes)", REQUIRED_CAPACITY);
        Ok(())
    }

    /// Zero the scratch byte of every cell on `floor`.
    ///
    /// Scratch bytes are interleaved with cell data, so this is a
    /// per-slot sweep rather than a block write.
    pub fn reset_scratch(&mut self, floor: u8) -> Result<()> {
        for y in -32..(CELLS_PER_AXIS - 32) as i16 {
            for x in -32..(CELLS_PER_AXIS - 32) as i16 {
                let coord = MapCoordinate {
                    x: x as i8,
                    y: y as i8,
                    floor,
                };
                self.set_scratch(coord, ScratchValue::UNDISCOVERED)?;
            }
        }
        Ok(())
    }

    /// Round-trip random patterns through a sample of slot addresses,
    /// restoring the original contents afterwards. A mismatch means
    /// the storage is unusable and is reported as fatal.
    pub fn self_test(&mut self) -> Result<()> {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let addr = rng.gen_range(0..REQUIRED_CAPACITY);
            let original = self.transport.read_byte(addr)?;
            let pattern: u8 = rng.gen();
            self.transport.write_byte(addr, pattern)?;
            let read_back = self.transport.read_byte(addr)?;
            self.transport.write_byte(addr, original)?;
            if read_back != pattern {
                error!(
                    "Map self-test mismatch at {:#x}: wrote {:#04x}, read {:#04x}",
                    addr, pattern, read_back
                );
                return Err(VyuhaError::SelfTest(format!(
                    "mismatch at address {:#x}",
                    addr
                )));
            }
        }
        debug!("Map self-test passed");
        Ok(())
    }
}
