//! The UART emulation bank
use crate::{
    core::Register,
    registers::{
        UartChannelControl,
        UartControl,
        UART_BAUD_DIVISOR,
        UART_CHANNEL_CHECKSUM,
        UART_CHANNEL_CONTROL,
        UART_CHANNEL_COUNT,
        UART_CHANNEL_HISTORY,
        UART_CONTROL,
        UART_RX_BASE,
        UART_RX_PARITY_ERRORS,
        UART_RX_STOP_ERRORS,
        UART_TX_BASE,
    },
    transport::{
        Transport,
        TransportResult,
    },
};

/// Clock the baud divisor divides
const CLOCK_HZ: u32 = 100_000_000;

/// Direction of one of the UART sub-blocks, from the shield's point of view
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    fn base(self) -> u32 {
        match self {
            Direction::Rx => UART_RX_BASE,
            Direction::Tx => UART_TX_BASE,
        }
    }
}

#[derive(Debug)]
pub struct Uart<'a, T> {
    transport: &'a mut T,
}

impl<'a, T> Uart<'a, T>
where
    T: Transport,
{
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Set the baud rate, rounded to the nearest achievable divisor
    /// # Errors
    /// Returns an error on transport errors
    pub fn set_baud(&mut self, baud: u32) -> TransportResult<()> {
        let div = (CLOCK_HZ + baud / 2) / baud.max(1);
        self.transport.write_reg(UART_BAUD_DIVISOR, &div)
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn baud_divisor(&mut self) -> TransportResult<u32> {
        self.transport.read_reg(UART_BAUD_DIVISOR)
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn set_control(&mut self, control: &UartControl) -> TransportResult<()> {
        self.transport.write_reg(UART_CONTROL, control)
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn control(&mut self) -> TransportResult<UartControl> {
        self.transport.read_reg(UART_CONTROL)
    }

    /// Enable or disable one direction, optionally clearing its counters
    /// # Errors
    /// Returns an error on transport errors
    pub fn set_channel(&mut self, dir: Direction, enable: bool, reset: bool) -> TransportResult<()> {
        let reg = Register::new(dir.base() + UART_CHANNEL_CONTROL, 1);
        self.transport
            .write_reg(reg, &UartChannelControl { enable, reset })
    }

    /// Symbols seen in one direction
    /// # Errors
    /// Returns an error on transport errors
    pub fn count(&mut self, dir: Direction) -> TransportResult<u32> {
        self.transport
            .read_reg(Register::new(dir.base() + UART_CHANNEL_COUNT, 4))
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn checksum(&mut self, dir: Direction) -> TransportResult<u32> {
        self.transport
            .read_reg(Register::new(dir.base() + UART_CHANNEL_CHECKSUM, 4))
    }

    /// The last four symbols, newest first
    /// # Errors
    /// Returns an error on transport errors
    pub fn history(&mut self, dir: Direction) -> TransportResult<[u16; 4]> {
        let bytes: [u8; 8] = self
            .transport
            .read_bytes(dir.base() + UART_CHANNEL_HISTORY)?;
        let mut symbols = [0u16; 4];
        for (symbol, chunk) in symbols.iter_mut().zip(bytes.chunks_exact(2)) {
            *symbol = u16::from_le_bytes([chunk[0], chunk[1]]);
        }
        Ok(symbols)
    }

    /// Parity and stop bit errors seen by the receiver
    /// # Errors
    /// Returns an error on transport errors
    pub fn rx_errors(&mut self) -> TransportResult<(u32, u32)> {
        Ok((
            self.transport.read_reg(UART_RX_PARITY_ERRORS)?,
            self.transport.read_reg(UART_RX_STOP_ERRORS)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        registers::UART_BASE,
        transport::mock::Mock,
    };

    #[test]
    fn test_baud_rounding() {
        let mut transport = Mock::new(&[Register::new(UART_BASE, 0x60)]);
        let mut uart = Uart::new(&mut transport);
        uart.set_baud(115_200).unwrap();
        assert_eq!(uart.baud_divisor().unwrap(), 868);
    }

    #[test]
    fn test_history_order() {
        let mut transport = Mock::new(&[Register::new(UART_BASE, 0x60)]);
        transport
            .write_bytes(UART_TX_BASE + UART_CHANNEL_HISTORY, &[0x41, 0, 0x42, 0, 0, 1, 0, 0])
            .unwrap();
        let mut uart = Uart::new(&mut transport);
        assert_eq!(uart.history(Direction::Tx).unwrap(), [0x41, 0x42, 0x100, 0]);
    }
}
