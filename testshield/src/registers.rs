//! The shield's register map.
//!
//! Every multi-byte field is little endian and has a fixed width; [`Register`] carries the width
//! so [`crate::transport::Transport::read_reg`] can reject mismatched accesses.

use crate::{
    core::Register,
    transport::{
        Address,
        Deserialize,
        Serialize,
    },
};
use packed_struct::prelude::*;
use testshield_derive::{
    address,
    RegisterSerde,
};

// Control block

pub const CONTROL_BASE: u32 = 0x0000_0000;
pub const RESET: Register = Register::new(CONTROL_BASE, 1);
pub const SCRATCH: Register = Register::new(CONTROL_BASE + 0x04, 4);
pub const VERSION: Register = Register::new(CONTROL_BASE + 0x08, 4);
pub const FLASH_SIZE: Register = Register::new(CONTROL_BASE + 0x10, 4);
pub const FLASH_SLOT_SIZE: Register = Register::new(CONTROL_BASE + 0x14, 4);
/// Flash address of the running image, [`NO_IMAGE`] if the flash holds none
pub const FLASH_ACTIVE_ADDR: Register = Register::new(CONTROL_BASE + 0x18, 4);
/// Flash address new images are written to
pub const FLASH_UPDATE_ADDR: Register = Register::new(CONTROL_BASE + 0x1C, 4);
pub const FLASH_ADDR: Register = Register::new(CONTROL_BASE + 0x20, 4);
pub const FLASH_CMD: Register = Register::new(CONTROL_BASE + 0x24, 1);
pub const FLASH_STATUS: Register = Register::new(CONTROL_BASE + 0x25, 1);
pub const FLASH_BUFFER: Register = Register::new(CONTROL_BASE + 0x100, FLASH_PAGE_SIZE);

pub const NO_IMAGE: u32 = 0xFFFF_FFFF;
pub const FLASH_SECTOR_SIZE: u32 = 0x1000;
pub const FLASH_PAGE_SIZE: usize = 256;

// Pin remap, one byte per logical pin holding a physical index

pub const REMAP_BASE: u32 = 0x0000_1000;
pub const REMAP: Register = Register::new(REMAP_BASE, 1);
/// Physical index meaning "not connected"
pub const REMAP_NC: u8 = 0xFF;

// System IO

pub const SYS_IO_BASE: u32 = 0x0000_2000;
/// Pull mode, banked by physical index
pub const PULL: Register = Register::new(SYS_IO_BASE, 1);
pub const PWM_ENABLE: Register = Register::new(SYS_IO_BASE + 0x100, 1);
/// PWM period in 100 MHz ticks
pub const PWM_PERIOD: Register = Register::new(SYS_IO_BASE + 0x104, 4);
pub const PWM_CYCLES_HIGH: Register = Register::new(SYS_IO_BASE + 0x108, 4);
/// Physical index routed to the ADC
pub const ANALOG_MUX: Register = Register::new(SYS_IO_BASE + 0x110, 1);
pub const ADC_RESULT: Register = Register::new(SYS_IO_BASE + 0x114, 2);
pub const POWER_SUM: Register = Register::new(SYS_IO_BASE + 0x118, 8);
pub const POWER_COUNT: Register = Register::new(SYS_IO_BASE + 0x120, 4);
pub const POWER_RESET: Register = Register::new(SYS_IO_BASE + 0x124, 1);

pub const PERIPHERAL_SELECT: Register = Register::new(0x0010_0000, 1);

// GPIO, banked by logical pin

pub const GPIO_BASE: u32 = 0x0010_1000;
pub const GPIO_OUT_VALUE: Register = Register::new(GPIO_BASE, 1);
pub const GPIO_OUT_ENABLE: Register = Register::new(GPIO_BASE + 0x10, 1);
pub const GPIO_IN: Register = Register::new(GPIO_BASE + 0x20, 1);

// SPI, the slave bank mirrors the master bank and adds a few fields

pub const SPI_MASTER_BASE: u32 = 0x0010_2000;
pub const SPI_SLAVE_BASE: u32 = 0x0010_6000;
pub const SPI_STARTS: u32 = 0x00;
pub const SPI_STOPS: u32 = 0x04;
pub const SPI_TRANSFERS: u32 = 0x08;
pub const SPI_CHECKSUM: u32 = 0x0C;
pub const SPI_CONTROL: u32 = 0x10;
pub const SPI_HD_TX_COUNT: u32 = 0x14;
pub const SPI_HD_RX_COUNT: u32 = 0x16;
pub const SPI_CS_TO_FIRST_SCLK: u32 = 0x18;
pub const SPI_LAST_SCLK_TO_CS: u32 = 0x1C;
pub const SPI_SLAVE_SYMBOL_DELAY: u32 = 0x20;
pub const SPI_SLAVE_START_DELAY: u32 = 0x24;
pub const SPI_SLAVE_CLOCK_DIV: u32 = 0x28;
pub const SPI_SLAVE_START_REQUEST: u32 = 0x2C;

// IO metrics

pub const IO_METRICS_BASE: u32 = 0x0010_3000;
pub const IO_METRICS_CONTROL: Register = Register::new(IO_METRICS_BASE, 1);
pub const IO_METRICS_SLOT_BASE: u32 = IO_METRICS_BASE + 0x40;
pub const IO_METRICS_SLOT_STRIDE: u32 = 0x20;
pub const IO_METRICS_MIN_HIGH: Register = Register::new(IO_METRICS_SLOT_BASE, 4);
pub const IO_METRICS_MIN_LOW: Register = Register::new(IO_METRICS_SLOT_BASE + 0x04, 4);
pub const IO_METRICS_MAX_HIGH: Register = Register::new(IO_METRICS_SLOT_BASE + 0x08, 4);
pub const IO_METRICS_MAX_LOW: Register = Register::new(IO_METRICS_SLOT_BASE + 0x0C, 4);
pub const IO_METRICS_RISING: Register = Register::new(IO_METRICS_SLOT_BASE + 0x10, 4);
pub const IO_METRICS_FALLING: Register = Register::new(IO_METRICS_SLOT_BASE + 0x14, 4);

// UART, with RX and TX sub-blocks sharing a layout

pub const UART_BASE: u32 = 0x0010_4000;
pub const UART_BAUD_DIVISOR: Register = Register::new(UART_BASE, 4);
pub const UART_CONTROL: Register = Register::new(UART_BASE + 0x04, 4);
pub const UART_RX_BASE: u32 = UART_BASE + 0x10;
pub const UART_TX_BASE: u32 = UART_BASE + 0x40;
pub const UART_CHANNEL_CONTROL: u32 = 0x00;
pub const UART_CHANNEL_CHECKSUM: u32 = 0x04;
pub const UART_CHANNEL_COUNT: u32 = 0x08;
/// Four 16 bit symbols, newest first
pub const UART_CHANNEL_HISTORY: u32 = 0x0C;
pub const UART_RX_PARITY_ERRORS: Register = Register::new(UART_RX_BASE + 0x14, 4);
pub const UART_RX_STOP_ERRORS: Register = Register::new(UART_RX_BASE + 0x18, 4);

// I2C

pub const I2C_BASE: u32 = 0x0010_5000;
pub const I2C_STARTS: Register = Register::new(I2C_BASE, 2);
pub const I2C_STOPS: Register = Register::new(I2C_BASE + 0x02, 2);
pub const I2C_ACKS: Register = Register::new(I2C_BASE + 0x04, 2);
pub const I2C_NACKS: Register = Register::new(I2C_BASE + 0x06, 2);
pub const I2C_TRANSFERS: Register = Register::new(I2C_BASE + 0x08, 2);
pub const I2C_CHECKSUM_TO_SLAVE: Register = Register::new(I2C_BASE + 0x0C, 4);
pub const I2C_CHECKSUM_FROM_SLAVE: Register = Register::new(I2C_BASE + 0x10, 4);
pub const I2C_DEVICE_ADDRESS: Register = Register::new(I2C_BASE + 0x14, 2);
pub const I2C_ADDRESS_MATCHES: Register = Register::new(I2C_BASE + 0x18, 2);
pub const I2C_ADDRESS_MISMATCHES: Register = Register::new(I2C_BASE + 0x1A, 2);
/// Four 8 bit symbols, newest first
pub const I2C_HISTORY: Register = Register::new(I2C_BASE + 0x1C, 4);

#[address(RESET.addr)]
#[derive(PackedStruct, RegisterSerde, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct ResetControl {
    /// Clear every mapping and pull, reset every peripheral, float every pin
    #[packed_field(bits = "0")]
    pub reset_all: bool,
    #[packed_field(bits = "1")]
    pub reset_peripherals: bool,
    /// Reboot from the active flash image
    #[packed_field(bits = "2")]
    pub reprogram: bool,
}

#[address(FLASH_STATUS.addr)]
#[derive(PackedStruct, RegisterSerde, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct FlashStatus {
    #[packed_field(bits = "0")]
    pub busy: bool,
    /// Latched by a failed command until the next one is issued
    #[packed_field(bits = "1")]
    pub error: bool,
}

#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlashCommand {
    /// Copy a page from flash into the page buffer
    Read = 1,
    /// Erase the sector holding the flash address
    Erase = 2,
    /// Program the page buffer at the flash address
    Program = 3,
    /// Verify the image in the update slot and make it the active image
    Commit = 4,
}

#[derive(PackedStruct, RegisterSerde, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct SpiControl {
    /// CPOL in bit 1, CPHA in bit 0
    #[packed_field(bits = "0..=1")]
    pub clock_mode: Integer<u8, packed_bits::Bits<2>>,
    #[packed_field(bits = "2")]
    pub lsb_first: bool,
    #[packed_field(bits = "3")]
    pub half_duplex: bool,
    #[packed_field(bits = "8..=13")]
    pub symbol_size: Integer<u8, packed_bits::Bits<6>>,
}

#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None = 0,
    Odd = 1,
    Even = 2,
}

#[derive(PackedStruct, RegisterSerde, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct UartControl {
    #[packed_field(bits = "0..=3")]
    pub data_bits: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "4..=5")]
    pub stop_bits: Integer<u8, packed_bits::Bits<2>>,
    #[packed_field(bits = "6..=7", ty = "enum")]
    pub parity: Parity,
    #[packed_field(bits = "8")]
    pub flow_control: bool,
}

#[derive(PackedStruct, RegisterSerde, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct UartChannelControl {
    #[packed_field(bits = "0")]
    pub enable: bool,
    #[packed_field(bits = "1")]
    pub reset: bool,
}

#[address(IO_METRICS_CONTROL.addr)]
#[derive(PackedStruct, RegisterSerde, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct IoMetricsControl {
    #[packed_field(bits = "0")]
    pub active: bool,
    #[packed_field(bits = "1")]
    pub reset: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_control() {
        let ctl = ResetControl {
            reprogram: true,
            ..Default::default()
        };
        assert_eq!(ctl.serialize().unwrap(), [0b100]);
        assert_eq!(ResetControl::addr(), 0);
    }

    #[test]
    fn test_spi_control_little_endian() {
        let ctl = SpiControl {
            clock_mode: 3.into(),
            lsb_first: true,
            half_duplex: false,
            symbol_size: 16.into(),
        };
        // Low byte first on the wire
        assert_eq!(ctl.serialize().unwrap(), [0b0000_0111, 16, 0, 0]);
        assert_eq!(SpiControl::deserialize([0b0000_0111, 16, 0, 0]).unwrap(), ctl);
    }

    #[test]
    fn test_uart_control() {
        let ctl = UartControl {
            data_bits: 8.into(),
            stop_bits: 1.into(),
            parity: Parity::Even,
            flow_control: true,
        };
        assert_eq!(ctl.serialize().unwrap(), [0b1001_1000, 1, 0, 0]);
    }

    #[test]
    fn test_flash_status() {
        let status = FlashStatus::deserialize([0b10]).unwrap();
        assert!(!status.busy);
        assert!(status.error);
        assert_eq!(FlashStatus::addr(), FLASH_STATUS.addr);
    }
}
