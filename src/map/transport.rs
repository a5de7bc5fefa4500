//! Byte-addressed persistence seam for the maze map.

use crate::error::{Result, VyuhaError};

/// Transport trait for map persistence
///
/// Models a flat byte-addressable store. The map layer owns the
/// address layout; transports only move bytes.
pub trait MapTransport: Send {
    /// Read a single byte at `addr`
    fn read_byte(&mut self, addr: u32) -> Result<u8>;

    /// Write a single byte at `addr`
    fn write_byte(&mut self, addr: u32, value: u8) -> Result<()>;

    /// Read `buffer.len()` consecutive bytes starting at `addr`
    fn read_bytes(&mut self, addr: u32, buffer: &mut [u8]) -> Result<()> {
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.read_byte(addr + i as u32)?;
        }
        Ok(())
    }

    /// Write all of `data` starting at `addr`
    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        for (i, byte) in data.iter().enumerate() {
            self.write_byte(addr + i as u32, *byte)?;
        }
        Ok(())
    }

    /// Total addressable size in bytes
    fn capacity(&self) -> u32;
}

/// In-memory transport backed by a plain byte vector
///
/// Used in tests and in host-side runs where no battery-backed
/// storage exists.
pub struct MemoryTransport {
    data: Vec<u8>,
}

impl MemoryTransport {
    pub fn new(capacity: u32) -> Self {
        Self {
            data: vec![0; capacity as usize],
        }
    }

    fn check(&self, addr: u32, len: u32) -> Result<()> {
        if addr.saturating_add(len) > self.data.len() as u32 {
            return Err(VyuhaError::Storage(format!(
                "address {:#x}+{} out of range ({} bytes)",
                addr,
                len,
                self.data.len()
            )));
        }
        Ok(())
    }
}

impl MapTransport for MemoryTransport {
    fn read_byte(&mut self, addr: u32) -> Result<u8> {
        self.check(addr, 1)?;
        Ok(self.data[addr as usize])
    }

    fn write_byte(&mut self, addr: u32, value: u8) -> Result<()> {
        self.check(addr, 1)?;
        self.data[addr as usize] = value;
        Ok(())
    }

    fn read_bytes(&mut self, addr: u32, buffer: &mut [u8]) -> Result<()> {
        self.check(addr, buffer.len() as u32)?;
        let start = addr as usize;
        buffer.copy_from_slice(&self.data[start..start + buffer.len()]);
        Ok(())
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.check(addr, data.len() as u32)?;
        let start = addr as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn capacity(&self) -> u32 {
        self.data.len() as u32
    }
}
