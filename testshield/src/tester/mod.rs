//! The [`Tester`] handle: the one object through which a test talks to the shield.
//!
//! A harness builds one `Tester` per board, passes it by `&mut` into every test case and calls
//! [`Tester::reset`] between cases. The handle implements [`Transport`], allocating control pins
//! lazily on the first transaction.

pub mod allocator;
pub mod firmware;
pub mod mux;

use crate::{
    core::{
        LogicalPin,
        Peripheral,
        PullMode,
    },
    registers::{
        ResetControl,
        PERIPHERAL_SELECT,
        PULL,
        VERSION,
    },
    transport::{
        Error,
        Transport,
        TransportResult,
    },
};
pub use allocator::ControlMode;
use ctlwire::PinBus;
use packed_struct::PrimitiveEnum;
use shield_utils::{
    board::Board,
    pins::PhysicalPin,
};
use std::sync::Arc;
use tracing::{
    debug,
    info,
};

/// Half period of the control channel clock in microseconds
pub const DEFAULT_BIT_DELAY_US: u32 = 1;
/// How often flash status is polled
pub const DEFAULT_FLASH_POLL_US: u32 = 100;
/// How long a single flash command may stay busy
pub const DEFAULT_FLASH_TIMEOUT_US: u32 = 2_000_000;
/// How long the shield takes to come back after a reprogram
pub const DEFAULT_REPROGRAM_DELAY_US: u32 = 500_000;

/// Timing knobs of a [`Tester`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timing {
    pub bit_delay_us: u32,
    pub flash_poll_us: u32,
    pub flash_timeout_us: u32,
    pub reprogram_delay_us: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            bit_delay_us: DEFAULT_BIT_DELAY_US,
            flash_poll_us: DEFAULT_FLASH_POLL_US,
            flash_timeout_us: DEFAULT_FLASH_TIMEOUT_US,
            reprogram_delay_us: DEFAULT_REPROGRAM_DELAY_US,
        }
    }
}

/// A connection to a test shield over pins of the board under test
#[derive(Debug)]
pub struct Tester<B: PinBus> {
    bus: B,
    board: Arc<Board>,
    mode: ControlMode,
    mapping: [PhysicalPin; LogicalPin::COUNT],
    peripheral: Peripheral,
    timing: Timing,
    pattern: u32,
}

impl<B: PinBus> Tester<B> {
    /// Wrap `bus`. No pins are touched until the first transaction.
    pub fn new(bus: B, board: Arc<Board>) -> Self {
        Self {
            bus,
            board,
            mode: ControlMode::Automatic(None),
            mapping: [PhysicalPin::NC; LogicalPin::COUNT],
            peripheral: Peripheral::default(),
            timing: Timing::default(),
            pattern: 0x5A5A_A5A5,
        }
    }

    #[must_use]
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Direct access to the pins, for test bodies that drive the peripheral under test
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    #[must_use]
    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn set_bit_delay_us(&mut self, us: u32) {
        self.timing.bit_delay_us = us;
    }

    pub fn set_flash_poll_us(&mut self, us: u32) {
        self.timing.flash_poll_us = us;
    }

    pub fn set_flash_timeout_us(&mut self, us: u32) {
        self.timing.flash_timeout_us = us;
    }

    pub fn set_reprogram_delay_us(&mut self, us: u32) {
        self.timing.reprogram_delay_us = us;
    }

    #[must_use]
    pub fn peripheral(&self) -> Peripheral {
        self.peripheral
    }

    #[must_use]
    pub fn control_mode(&self) -> &ControlMode {
        &self.mode
    }

    /// The physical pin mapped to `logical`, `NC` if the slot is empty
    #[must_use]
    pub fn mapped(&self, logical: LogicalPin) -> PhysicalPin {
        self.mapping[usize::from(logical.index())]
    }

    /// Put the shield and this handle back into the documented default state: every pin floated,
    /// every mapping and pull cleared, every peripheral reset and the control pins back in
    /// automatic mode.
    /// # Errors
    /// Returns an error if the reset couldn't be sent
    pub fn reset(&mut self) -> TransportResult<()> {
        let sent = self.write_addr(&ResetControl {
            reset_all: true,
            ..Default::default()
        });
        // The local state is dropped even if the shield never heard us
        self.forget_state();
        sent?;
        info!("Shield reset");
        Ok(())
    }

    /// Local half of a reset, for when the shield resets itself
    fn forget_state(&mut self) {
        self.release_control_pins();
        self.mode = ControlMode::Automatic(None);
        self.mapping = [PhysicalPin::NC; LogicalPin::COUNT];
        self.peripheral = Peripheral::default();
        let pins: Vec<PhysicalPin> = self.board.usable_pins().collect();
        for pin in pins {
            self.bus.release(pin);
        }
    }

    /// Reset the emulated peripherals without touching mappings or pulls
    /// # Errors
    /// Returns an error on transport errors
    pub fn peripherals_reset(&mut self) -> TransportResult<()> {
        self.write_addr(&ResetControl {
            reset_peripherals: true,
            ..Default::default()
        })
    }

    /// Change the emulation mode. Mappings are kept, only their meaning changes.
    /// # Errors
    /// Returns an error on transport errors
    pub fn select_peripheral(&mut self, peripheral: Peripheral) -> TransportResult<()> {
        self.write_reg(PERIPHERAL_SELECT, &peripheral.to_primitive())?;
        debug!("Selected {peripheral:?}");
        self.peripheral = peripheral;
        Ok(())
    }

    /// The 4 byte version of the running shield firmware
    /// # Errors
    /// Returns an error on transport errors
    pub fn version(&mut self) -> TransportResult<u32> {
        self.read_reg(VERSION)
    }

    /// Configure the pull resistor the shield applies to `pin`
    /// # Errors
    /// Returns an error if `pin` isn't part of the form factor, or on transport errors
    pub fn pin_set_pull(&mut self, pin: PhysicalPin, mode: PullMode) -> TransportResult<()> {
        let index = self.physical_index(pin)?;
        self.write_reg(PULL.bank(u32::from(index), 1), &mode.to_primitive())
    }

    fn physical_index(&self, pin: PhysicalPin) -> TransportResult<u8> {
        self.board
            .physical_index(pin)
            .ok_or_else(|| Error::NotInFormFactor(self.board.pin_name(pin).to_owned()))
    }

    fn pin_name(&self, pin: PhysicalPin) -> String {
        self.board.pin_name(pin).to_owned()
    }

    /// A fresh bit pattern for every handshake, so a stale scratch value never passes
    fn next_pattern(&mut self) -> u32 {
        self.pattern = self.pattern.rotate_left(7) ^ 0x9E37_79B9;
        self.pattern
    }
}

impl<B: PinBus> Transport for Tester<B> {
    fn read_n_bytes(&mut self, addr: u32, n: usize) -> TransportResult<Vec<u8>> {
        let pins = self.control_pins(None)?;
        let mut buf = vec![0u8; n];
        ctlwire::read(
            &mut self.bus,
            &pins,
            addr,
            &mut buf,
            self.timing.bit_delay_us,
        )?;
        Ok(buf)
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> TransportResult<()> {
        let pins = self.control_pins(None)?;
        ctlwire::write(&mut self.bus, &pins, addr, data, self.timing.bit_delay_us)?;
        Ok(())
    }
}
