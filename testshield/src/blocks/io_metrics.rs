//! The IO metrics block: edge counts and pulse widths of the pins mapped to logical pins 8-15
use crate::{
    core::LogicalPin,
    registers::{
        IoMetricsControl,
        IO_METRICS_FALLING,
        IO_METRICS_MAX_HIGH,
        IO_METRICS_MAX_LOW,
        IO_METRICS_MIN_HIGH,
        IO_METRICS_MIN_LOW,
        IO_METRICS_RISING,
        IO_METRICS_SLOT_STRIDE,
    },
    transport::{
        Error,
        Transport,
        TransportResult,
    },
};
use std::time::Duration;

/// Ticks per second of the clock pulse widths are measured with
pub const TICK_HZ: u64 = 100_000_000;

/// Convert a pulse width in ticks to a duration
#[must_use]
pub fn ticks_to_duration(ticks: u32) -> Duration {
    Duration::from_nanos(u64::from(ticks) * (1_000_000_000 / TICK_HZ))
}

/// What the block measured on one pin since the last reset. Widths are in ticks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PinMetrics {
    /// `u32::MAX` until a full high pulse was seen
    pub min_high: u32,
    pub min_low: u32,
    pub max_high: u32,
    pub max_low: u32,
    pub rising_edges: u32,
    pub falling_edges: u32,
}

#[derive(Debug)]
pub struct IoMetrics<'a, T> {
    transport: &'a mut T,
}

impl<'a, T> IoMetrics<'a, T>
where
    T: Transport,
{
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Clear all measurements and start measuring
    /// # Errors
    /// Returns an error on transport errors
    pub fn start(&mut self) -> TransportResult<()> {
        self.reset()?;
        self.transport.write_addr(&IoMetricsControl {
            active: true,
            reset: false,
        })
    }

    /// Stop measuring, keeping the measurements
    /// # Errors
    /// Returns an error on transport errors
    pub fn stop(&mut self) -> TransportResult<()> {
        self.transport.write_addr(&IoMetricsControl::default())
    }

    /// Clear all measurements
    /// # Errors
    /// Returns an error on transport errors
    pub fn reset(&mut self) -> TransportResult<()> {
        self.transport.write_addr(&IoMetricsControl {
            active: false,
            reset: true,
        })?;
        self.transport.write_addr(&IoMetricsControl::default())
    }

    /// # Errors
    /// Returns an error on transport errors
    pub fn active(&mut self) -> TransportResult<bool> {
        let ctl: IoMetricsControl = self.transport.read_addr()?;
        Ok(ctl.active)
    }

    /// The measurements of the pin mapped to `pin`, which must be one of the IO metrics slots
    /// # Errors
    /// Returns an error for pins outside the metrics bank or on transport errors
    pub fn read(&mut self, pin: LogicalPin) -> TransportResult<PinMetrics> {
        let slot = pin
            .index()
            .checked_sub(LogicalPin::IO_METRICS0.index())
            .ok_or(Error::BadLogicalPin(pin.index()))?;
        let slot = u32::from(slot);
        let stride = IO_METRICS_SLOT_STRIDE;
        Ok(PinMetrics {
            min_high: self.transport.read_reg(IO_METRICS_MIN_HIGH.bank(slot, stride))?,
            min_low: self.transport.read_reg(IO_METRICS_MIN_LOW.bank(slot, stride))?,
            max_high: self.transport.read_reg(IO_METRICS_MAX_HIGH.bank(slot, stride))?,
            max_low: self.transport.read_reg(IO_METRICS_MAX_LOW.bank(slot, stride))?,
            rising_edges: self.transport.read_reg(IO_METRICS_RISING.bank(slot, stride))?,
            falling_edges: self.transport.read_reg(IO_METRICS_FALLING.bank(slot, stride))?,
        })
    }
}
