//! System IO: the PWM generator, the analog mux feeding the ADC and the power accumulator.
//! This uses the `fixed` crate for duty cycles and ADC readings, both fractions of full scale.

use crate::{
    registers::{
        ADC_RESULT,
        ANALOG_MUX,
        POWER_COUNT,
        POWER_RESET,
        POWER_SUM,
        PWM_CYCLES_HIGH,
        PWM_ENABLE,
        PWM_PERIOD,
    },
    transport::{
        Transport,
        TransportResult,
    },
};
use fixed::types::{
    U0F16,
    U1F15,
};

#[derive(Debug)]
pub struct SysIo<'a, T> {
    transport: &'a mut T,
}

impl<'a, T> SysIo<'a, T>
where
    T: Transport,
{
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Configure the PWM output with a period in 100 MHz ticks and a duty cycle between 0 and 1.
    /// Duty cycles above 1 are clamped.
    /// # Errors
    /// Returns an error on transport errors
    pub fn set_pwm(&mut self, period: u32, duty: U1F15) -> TransportResult<()> {
        let duty = duty.min(U1F15::ONE);
        let high = (u64::from(duty.to_bits()) * u64::from(period)) >> U1F15::FRAC_NBITS;
        // Never more than `period`
        #[allow(clippy::cast_possible_truncation)]
        let high = high as u32;
        self.transport.write_reg(PWM_PERIOD, &period)?;
        self.transport.write_reg(PWM_CYCLES_HIGH, &high)
    }

    /// The PWM period in ticks and the duty cycle it is running at
    /// # Errors
    /// Returns an error on transport errors
    pub fn pwm(&mut self) -> TransportResult<(u32, U1F15)> {
        let period: u32 = self.transport.read_reg(PWM_PERIOD)?;
        let high: u32 = self.transport.read_reg(PWM_CYCLES_HIGH)?;
        if period == 0 {
            return Ok((0, U1F15::ZERO));
        }
        let bits = (u64::from(high.min(period)) << U1F15::FRAC_NBITS) / u64::from(period);
        // At most 1.0
        #[allow(clippy::cast_possible_truncation)]
        Ok((period, U1F15::from_bits(bits as u16)))
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn set_pwm_enable(&mut self, enable: bool) -> TransportResult<()> {
        self.transport.write_reg(PWM_ENABLE, &enable)
    }

    /// Route the shield pin with physical index `index` to the ADC
    /// # Errors
    /// Returns an error on transport errors
    pub fn select_analog(&mut self, index: u8) -> TransportResult<()> {
        self.transport.write_reg(ANALOG_MUX, &index)
    }

    /// The latest ADC sample as a fraction of full scale
    /// # Errors
    /// Returns an error on transport errors
    pub fn adc(&mut self) -> TransportResult<U0F16> {
        Ok(U0F16::from_bits(self.transport.read_reg(ADC_RESULT)?))
    }

    /// Restart the power accumulator
    /// # Errors
    /// Returns an error on transport errors
    pub fn power_reset(&mut self) -> TransportResult<()> {
        self.transport.write_reg(POWER_RESET, &true)
    }

    /// Mean of the ADC samples accumulated since the last reset, `None` before the first sample
    /// # Errors
    /// Returns an error on transport errors
    pub fn power_average(&mut self) -> TransportResult<Option<U0F16>> {
        let sum: u64 = self.transport.read_reg(POWER_SUM)?;
        let count: u32 = self.transport.read_reg(POWER_COUNT)?;
        if count == 0 {
            return Ok(None);
        }
        // The mean of u16 samples fits a u16
        #[allow(clippy::cast_possible_truncation)]
        let mean = (sum / u64::from(count)) as u16;
        Ok(Some(U0F16::from_bits(mean)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::Register,
        registers::SYS_IO_BASE,
        transport::mock::Mock,
    };

    fn mock() -> Mock {
        Mock::new(&[Register::new(SYS_IO_BASE + 0x100, 0x28)])
    }

    #[test]
    fn test_pwm_duty() {
        let mut transport = mock();
        let mut io = SysIo::new(&mut transport);
        io.set_pwm(1000, U1F15::from_num(0.25)).unwrap();
        let (period, duty) = io.pwm().unwrap();
        assert_eq!(period, 1000);
        assert_eq!(duty, U1F15::from_num(0.25));
        let high: u32 = transport.read_reg(PWM_CYCLES_HIGH).unwrap();
        assert_eq!(high, 250);
    }

    #[test]
    fn test_pwm_clamps() {
        let mut transport = mock();
        let mut io = SysIo::new(&mut transport);
        io.set_pwm(400, U1F15::from_num(1.5)).unwrap();
        let high: u32 = transport.read_reg(PWM_CYCLES_HIGH).unwrap();
        assert_eq!(high, 400);
    }

    #[test]
    fn test_power_average() {
        let mut transport = mock();
        assert_eq!(SysIo::new(&mut transport).power_average().unwrap(), None);
        transport.write_reg(POWER_SUM, &(3u64 * 0x8000)).unwrap();
        transport.write_reg(POWER_COUNT, &3u32).unwrap();
        let avg = SysIo::new(&mut transport).power_average().unwrap();
        assert_eq!(avg, Some(U0F16::from_num(0.5)));
    }
}
