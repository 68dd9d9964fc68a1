//! The core types shared by the tester, the register blocks and the simulated shield
use packed_struct::prelude::*;
use std::fmt::Display;

/// The representation of a register in the shield's flat address space
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    /// Byte address of the register
    pub addr: u32,
    /// The number of bytes stored at this location. Callers must match it exactly.
    pub width: usize,
}

impl Register {
    #[must_use]
    pub const fn new(addr: u32, width: usize) -> Self {
        Self { addr, width }
    }

    /// The `index`th copy of a register in a bank of copies spaced `stride` bytes apart
    #[must_use]
    pub const fn bank(self, index: u32, stride: u32) -> Self {
        Self {
            addr: self.addr + index * stride,
            width: self.width,
        }
    }
}

/// A slot in the shield's pin remap table.
///
/// Slots 0 through 7 take their meaning from the active [`Peripheral`]; slots 8 through 15 feed
/// the IO metrics block regardless of mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalPin(u8);

impl LogicalPin {
    /// Total number of remap slots
    pub const COUNT: usize = 16;

    pub const GPIO0: Self = Self(0);
    pub const GPIO1: Self = Self(1);
    pub const GPIO2: Self = Self(2);
    pub const GPIO3: Self = Self(3);
    pub const GPIO4: Self = Self(4);
    pub const GPIO5: Self = Self(5);
    pub const GPIO6: Self = Self(6);
    pub const GPIO7: Self = Self(7);

    pub const SPI_MOSI: Self = Self(0);
    pub const SPI_MISO: Self = Self(1);
    pub const SPI_SCLK: Self = Self(2);
    pub const SPI_SSEL: Self = Self(3);

    pub const UART_RX: Self = Self(0);
    pub const UART_TX: Self = Self(1);
    pub const UART_CTS: Self = Self(2);
    pub const UART_RTS: Self = Self(3);

    pub const I2C_SDA0: Self = Self(0);
    pub const I2C_SCL0: Self = Self(1);
    pub const I2C_SDA1: Self = Self(2);
    pub const I2C_SCL1: Self = Self(3);
    pub const I2C_SDA2: Self = Self(4);
    pub const I2C_SCL2: Self = Self(5);

    pub const IO_METRICS0: Self = Self(8);
    pub const IO_METRICS1: Self = Self(9);
    pub const IO_METRICS2: Self = Self(10);
    pub const IO_METRICS3: Self = Self(11);
    pub const IO_METRICS4: Self = Self(12);
    pub const IO_METRICS5: Self = Self(13);
    pub const IO_METRICS6: Self = Self(14);
    pub const IO_METRICS7: Self = Self(15);

    /// Returns `None` for indices past the end of the remap table
    #[must_use]
    pub fn new(index: u8) -> Option<Self> {
        (usize::from(index) < Self::COUNT).then_some(Self(index))
    }

    /// The `n`th IO metrics slot
    #[must_use]
    pub fn io_metrics(n: u8) -> Option<Self> {
        (n < 8).then_some(Self(8 + n))
    }

    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Iterate over every slot in table order
    pub fn all() -> impl Iterator<Item = Self> {
        (0..16).map(Self)
    }
}

impl Display for LogicalPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The emulation mode of the shield. Exactly one is active at a time.
#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Peripheral {
    #[default]
    Gpio = 1,
    SpiMaster = 2,
    Uart = 4,
    I2c = 8,
    SpiSlave = 16,
}

/// Pull resistor configuration of a shield pin
#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PullMode {
    #[default]
    None = 0,
    Up = 1,
    Down = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_bounds() {
        assert_eq!(LogicalPin::new(15), Some(LogicalPin::IO_METRICS7));
        assert_eq!(LogicalPin::new(16), None);
        assert_eq!(LogicalPin::io_metrics(2), Some(LogicalPin::IO_METRICS2));
        assert_eq!(LogicalPin::io_metrics(8), None);
        assert_eq!(LogicalPin::all().count(), LogicalPin::COUNT);
    }

    #[test]
    fn test_bank() {
        let reg = Register::new(0x0010_3040, 4).bank(2, 0x20);
        assert_eq!(reg, Register::new(0x0010_3080, 4));
    }

    #[test]
    fn test_peripheral_codes() {
        assert_eq!(Peripheral::SpiSlave.to_primitive(), 16);
        assert_eq!(Peripheral::from_primitive(4), Some(Peripheral::Uart));
        assert_eq!(PullMode::from_primitive(3), None);
    }
}
