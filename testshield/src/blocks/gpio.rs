//! The GPIO emulation bank: one drive value, drive enable and input level per logical pin
use crate::{
    core::LogicalPin,
    registers::{
        GPIO_IN,
        GPIO_OUT_ENABLE,
        GPIO_OUT_VALUE,
    },
    transport::{
        Error,
        Transport,
        TransportResult,
    },
};

/// Logical pins 0 through 7 have a GPIO slot
const SLOTS: u8 = 8;

#[derive(Debug)]
pub struct Gpio<'a, T> {
    transport: &'a mut T,
}

impl<'a, T> Gpio<'a, T>
where
    T: Transport,
{
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    fn slot(pin: LogicalPin) -> TransportResult<u32> {
        if pin.index() < SLOTS {
            Ok(u32::from(pin.index()))
        } else {
            Err(Error::BadLogicalPin(pin.index()))
        }
    }

    /// Set the level the shield drives on `pin` while its output is enabled
    /// # Errors
    /// Returns an error for pins without a GPIO slot or on transport errors
    pub fn write(&mut self, pin: LogicalPin, value: bool) -> TransportResult<()> {
        let slot = Self::slot(pin)?;
        self.transport.write_reg(GPIO_OUT_VALUE.bank(slot, 1), &value)
    }

    /// Make the shield drive `pin` (or float it)
    /// # Errors
    /// Returns an error for pins without a GPIO slot or on transport errors
    pub fn set_output_enable(&mut self, pin: LogicalPin, enable: bool) -> TransportResult<()> {
        let slot = Self::slot(pin)?;
        self.transport.write_reg(GPIO_OUT_ENABLE.bank(slot, 1), &enable)
    }

    /// The level the shield sees on `pin`
    /// # Errors
    /// Returns an error for pins without a GPIO slot or on transport errors
    pub fn read(&mut self, pin: LogicalPin) -> TransportResult<bool> {
        let slot = Self::slot(pin)?;
        self.transport.read_reg(GPIO_IN.bank(slot, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        registers::GPIO_BASE,
        transport::mock::Mock,
    };

    fn mock() -> Mock {
        Mock::new(&[crate::core::Register::new(GPIO_BASE, 0x30)])
    }

    #[test]
    fn test_write_banked() {
        let mut transport = mock();
        let mut gpio = Gpio::new(&mut transport);
        gpio.write(LogicalPin::GPIO3, true).unwrap();
        gpio.set_output_enable(LogicalPin::GPIO3, true).unwrap();
        assert_eq!(transport.peek(GPIO_BASE + 3), Some(1));
        assert_eq!(transport.peek(GPIO_BASE + 0x13), Some(1));
        assert_eq!(transport.peek(GPIO_BASE + 0x12), Some(0));
    }

    #[test]
    fn test_metrics_slots_have_no_gpio() {
        let mut transport = mock();
        let mut gpio = Gpio::new(&mut transport);
        assert!(matches!(
            gpio.read(LogicalPin::IO_METRICS0),
            Err(Error::BadLogicalPin(8))
        ));
    }
}
