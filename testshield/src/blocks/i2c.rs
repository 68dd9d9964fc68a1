//! The I2C emulation bank
use crate::{
    registers::{
        I2C_ACKS,
        I2C_ADDRESS_MATCHES,
        I2C_ADDRESS_MISMATCHES,
        I2C_CHECKSUM_FROM_SLAVE,
        I2C_CHECKSUM_TO_SLAVE,
        I2C_DEVICE_ADDRESS,
        I2C_HISTORY,
        I2C_NACKS,
        I2C_STARTS,
        I2C_STOPS,
        I2C_TRANSFERS,
    },
    transport::{
        Transport,
        TransportResult,
    },
};

/// Bus events the shield counted since the last peripheral reset
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct I2cStats {
    pub starts: u16,
    pub stops: u16,
    pub acks: u16,
    pub nacks: u16,
    pub transfers: u16,
    pub checksum_to_slave: u32,
    pub checksum_from_slave: u32,
    pub address_matches: u16,
    pub address_mismatches: u16,
}

#[derive(Debug)]
pub struct I2c<'a, T> {
    transport: &'a mut T,
}

impl<'a, T> I2c<'a, T>
where
    T: Transport,
{
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// The address the emulated device answers to
    /// # Errors
    /// Returns an error on transport errors
    pub fn set_device_address(&mut self, addr: u16) -> TransportResult<()> {
        self.transport.write_reg(I2C_DEVICE_ADDRESS, &addr)
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn stats(&mut self) -> TransportResult<I2cStats> {
        Ok(I2cStats {
            starts: self.transport.read_reg(I2C_STARTS)?,
            stops: self.transport.read_reg(I2C_STOPS)?,
            acks: self.transport.read_reg(I2C_ACKS)?,
            nacks: self.transport.read_reg(I2C_NACKS)?,
            transfers: self.transport.read_reg(I2C_TRANSFERS)?,
            checksum_to_slave: self.transport.read_reg(I2C_CHECKSUM_TO_SLAVE)?,
            checksum_from_slave: self.transport.read_reg(I2C_CHECKSUM_FROM_SLAVE)?,
            address_matches: self.transport.read_reg(I2C_ADDRESS_MATCHES)?,
            address_mismatches: self.transport.read_reg(I2C_ADDRESS_MISMATCHES)?,
        })
    }

    /// The last four bytes on the bus, newest first
    /// # Errors
    /// Returns an error on transport errors
    pub fn history(&mut self) -> TransportResult<[u8; 4]> {
        self.transport.read_bytes(I2C_HISTORY.addr)
    }
}
