//! The SPI master and SPI slave emulation banks. The slave bank is the master bank plus the
//! fields the shield needs to generate its own clock.
use crate::{
    core::Register,
    registers::{
        SpiControl,
        SPI_CHECKSUM,
        SPI_CONTROL,
        SPI_CS_TO_FIRST_SCLK,
        SPI_HD_RX_COUNT,
        SPI_HD_TX_COUNT,
        SPI_LAST_SCLK_TO_CS,
        SPI_MASTER_BASE,
        SPI_SLAVE_BASE,
        SPI_SLAVE_CLOCK_DIV,
        SPI_SLAVE_START_DELAY,
        SPI_SLAVE_START_REQUEST,
        SPI_SLAVE_SYMBOL_DELAY,
        SPI_STARTS,
        SPI_STOPS,
        SPI_TRANSFERS,
    },
    transport::{
        Error,
        Transport,
        TransportResult,
    },
};

/// Counters the shield keeps while the target drives (or listens to) the bus
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SpiStats {
    pub starts: u32,
    pub stops: u32,
    pub transfers: u32,
    pub checksum: u32,
}

fn reg(base: u32, offset: u32, width: usize) -> Register {
    Register::new(base + offset, width)
}

#[derive(Debug)]
pub struct Spi<'a, T> {
    transport: &'a mut T,
    base: u32,
}

impl<'a, T> Spi<'a, T>
where
    T: Transport,
{
    /// The `SpiMaster` bank
    pub fn master(transport: &'a mut T) -> Self {
        Self {
            transport,
            base: SPI_MASTER_BASE,
        }
    }

    /// The `SpiSlave` bank, with the extra clock generation fields
    pub fn slave(transport: &'a mut T) -> Self {
        Self {
            transport,
            base: SPI_SLAVE_BASE,
        }
    }

    fn slave_reg(&self, offset: u32, width: usize) -> TransportResult<Register> {
        if self.base == SPI_SLAVE_BASE {
            Ok(reg(self.base, offset, width))
        } else {
            Err(Error::OutOfBounds)
        }
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn control(&mut self) -> TransportResult<SpiControl> {
        self.transport.read_reg(reg(self.base, SPI_CONTROL, 4))
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn set_control(&mut self, control: &SpiControl) -> TransportResult<()> {
        let reg = reg(self.base, SPI_CONTROL, 4);
        self.transport.write_reg(reg, control)
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn stats(&mut self) -> TransportResult<SpiStats> {
        Ok(SpiStats {
            starts: self.transport.read_reg(reg(self.base, SPI_STARTS, 4))?,
            stops: self.transport.read_reg(reg(self.base, SPI_STOPS, 4))?,
            transfers: self.transport.read_reg(reg(self.base, SPI_TRANSFERS, 4))?,
            checksum: self.transport.read_reg(reg(self.base, SPI_CHECKSUM, 4))?,
        })
    }

    /// Symbol counts for half duplex transfers
    /// # Errors
    /// Returns an error on transport errors
    pub fn set_half_duplex_counts(&mut self, tx: u16, rx: u16) -> TransportResult<()> {
        let tx_reg = reg(self.base, SPI_HD_TX_COUNT, 2);
        let rx_reg = reg(self.base, SPI_HD_RX_COUNT, 2);
        self.transport.write_reg(tx_reg, &tx)?;
        self.transport.write_reg(rx_reg, &rx)
    }

    /// Ticks from chip select assertion to the first clock edge, and from the last clock edge to
    /// chip select release
    /// # Errors
    /// Returns an error on transport errors
    pub fn cs_timing(&mut self) -> TransportResult<(u32, u32)> {
        Ok((
            self.transport.read_reg(reg(self.base, SPI_CS_TO_FIRST_SCLK, 4))?,
            self.transport.read_reg(reg(self.base, SPI_LAST_SCLK_TO_CS, 4))?,
        ))
    }

    /// Slave bank only: ticks between symbols
    /// # Errors
    /// Returns [`Error::OutOfBounds`] on the master bank, or transport errors
    pub fn set_symbol_delay(&mut self, ticks: u32) -> TransportResult<()> {
        let reg = self.slave_reg(SPI_SLAVE_SYMBOL_DELAY, 4)?;
        self.transport.write_reg(reg, &ticks)
    }

    /// Slave bank only: ticks from chip select to the first clock edge
    /// # Errors
    /// Returns [`Error::OutOfBounds`] on the master bank, or transport errors
    pub fn set_start_delay(&mut self, ticks: u32) -> TransportResult<()> {
        let reg = self.slave_reg(SPI_SLAVE_START_DELAY, 4)?;
        self.transport.write_reg(reg, &ticks)
    }

    /// Slave bank only: divisor applied to the 100 MHz clock
    /// # Errors
    /// Returns [`Error::OutOfBounds`] on the master bank, or transport errors
    pub fn set_clock_div(&mut self, div: u32) -> TransportResult<()> {
        let reg = self.slave_reg(SPI_SLAVE_CLOCK_DIV, 4)?;
        self.transport.write_reg(reg, &div)
    }

    /// Slave bank only: start a transfer
    /// # Errors
    /// Returns [`Error::OutOfBounds`] on the master bank, or transport errors
    pub fn request_start(&mut self) -> TransportResult<()> {
        let reg = self.slave_reg(SPI_SLAVE_START_REQUEST, 1)?;
        self.transport.write_reg(reg, &true)
    }
}
