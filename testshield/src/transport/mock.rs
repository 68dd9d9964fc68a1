//! Mock transport implementation used in testing the register blocks

use super::{
    Error,
    Transport,
    TransportResult,
};
use crate::core::Register;
use std::collections::HashMap;

/// A flat memory that only answers at the addresses of the registers it was built with
#[derive(Debug, Default)]
pub struct Mock {
    memory: HashMap<u32, u8>,
}

impl Mock {
    /// Construct a new mock shield that backs every byte of `registers` with zeroed memory
    #[must_use]
    pub fn new(registers: &[Register]) -> Self {
        let mut memory = HashMap::new();
        for Register { addr, width } in registers {
            for i in 0..*width as u32 {
                memory.insert(addr + i, 0u8);
            }
        }
        Self { memory }
    }

    /// Peek at memory without going through the transport
    #[must_use]
    pub fn peek(&self, addr: u32) -> Option<u8> {
        self.memory.get(&addr).copied()
    }
}

fn offset(addr: u32, i: usize) -> TransportResult<u32> {
    u32::try_from(i)
        .ok()
        .and_then(|i| addr.checked_add(i))
        .ok_or(Error::OutOfBounds)
}

impl Transport for Mock {
    fn read_n_bytes(&mut self, addr: u32, n: usize) -> TransportResult<Vec<u8>> {
        (0..n)
            .map(|i| {
                self.memory
                    .get(&offset(addr, i)?)
                    .copied()
                    .ok_or(Error::OutOfBounds)
            })
            .collect()
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> TransportResult<()> {
        // Check the whole range first so a bad write leaves memory untouched
        for i in 0..data.len() {
            if !self.memory.contains_key(&offset(addr, i)?) {
                return Err(Error::OutOfBounds);
            }
        }
        for (i, byte) in data.iter().enumerate() {
            self.memory.insert(offset(addr, i)?, *byte);
        }
        Ok(())
    }
}
