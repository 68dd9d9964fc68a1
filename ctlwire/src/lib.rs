//! Host side of the test shield's bit-banged control channel.
//!
//! The channel is four pins: the host clocks frames out on `clk`/`mosi`, holds `aux` high while a
//! frame is in flight, and samples read data on `miso`. See [`frame`] for the frame layout.
//!
//! Bit timing: the host changes `mosi` while `clk` is low and the shield samples on the rising
//! edge. During the data phase of a read, the shield presents the next bit on `miso` after every
//! rising edge and the host samples it before raising `clk` again. Bytes go MSB first.
//!
//! There is no acknowledgement. A frame sent on pins the shield can't see is silently lost, so
//! callers validate a set of pins with a write/read-back handshake before trusting it.

pub mod frame;

pub use frame::{
    Header,
    Op,
    KEY,
    MAX_FRAME_DATA,
};
use shield_utils::pins::PhysicalPin;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not enough bytes for a frame header")]
    Incomplete,
    #[error("Unknown frame operation {0:#04x}")]
    BadOp(u8),
    #[error("Frames carry between 1 and 255 bytes, not {0}")]
    BadLength(usize),
    #[error("Transfer of {len} bytes at {addr:#010x} runs past the end of the address space")]
    AddressOverflow { addr: u32, len: usize },
}

/// The pin level access the control channel needs from the target.
///
/// Implemented by the target's GPIO layer, or by a simulated shield in tests.
pub trait PinBus {
    /// Drive `pin` as an output at `level`
    fn output(&mut self, pin: PhysicalPin, level: bool);

    /// Sample the level on `pin`. Pins that aren't driven by the host read as inputs.
    fn input(&mut self, pin: PhysicalPin) -> bool;

    /// Return `pin` to high impedance
    fn release(&mut self, pin: PhysicalPin);

    /// Busy wait for `us` microseconds
    fn delay_us(&mut self, us: u32);
}

/// The four pins currently carrying the control channel, with the shield indices of the two the
/// shield needs to be told about
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControlPins {
    pub clk: PhysicalPin,
    pub mosi: PhysicalPin,
    pub miso: PhysicalPin,
    pub aux: PhysicalPin,
    pub miso_index: u8,
    pub aux_index: u8,
}

impl ControlPins {
    #[must_use]
    pub fn pins(&self) -> [PhysicalPin; 4] {
        [self.clk, self.mosi, self.miso, self.aux]
    }

    #[must_use]
    pub fn contains(&self, pin: PhysicalPin) -> bool {
        !pin.is_nc() && self.pins().contains(&pin)
    }
}

/// Put the channel pins into their idle state
pub fn claim<B: PinBus>(bus: &mut B, pins: &ControlPins) {
    bus.output(pins.clk, false);
    bus.output(pins.mosi, false);
    bus.output(pins.aux, false);
    bus.release(pins.miso);
}

/// Tristate all four channel pins
pub fn release<B: PinBus>(bus: &mut B, pins: &ControlPins) {
    for pin in pins.pins() {
        bus.release(pin);
    }
}

/// A set of control pins claimed for the lifetime of the guard and released when it drops.
/// Used to try out candidate pins without committing to them.
pub struct Claim<'a, B: PinBus> {
    bus: &'a mut B,
    pins: ControlPins,
    delay_us: u32,
}

impl<'a, B: PinBus> Claim<'a, B> {
    pub fn new(bus: &'a mut B, pins: ControlPins, delay_us: u32) -> Self {
        claim(bus, &pins);
        Self {
            bus,
            pins,
            delay_us,
        }
    }

    #[must_use]
    pub fn pins(&self) -> &ControlPins {
        &self.pins
    }

    /// Read `buf.len()` bytes starting at `addr`
    /// # Errors
    /// Returns an error if the transfer runs past the address space
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        read(self.bus, &self.pins, addr, buf, self.delay_us)
    }

    /// Write `data` starting at `addr`
    /// # Errors
    /// Returns an error if the transfer runs past the address space
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Error> {
        write(self.bus, &self.pins, addr, data, self.delay_us)
    }
}

impl<B: PinBus> Drop for Claim<'_, B> {
    fn drop(&mut self) {
        release(self.bus, &self.pins);
    }
}

fn pulse<B: PinBus>(bus: &mut B, clk: PhysicalPin, delay_us: u32) {
    bus.output(clk, true);
    bus.delay_us(delay_us);
    bus.output(clk, false);
    bus.delay_us(delay_us);
}

fn clock_out<B: PinBus>(bus: &mut B, pins: &ControlPins, byte: u8, delay_us: u32) {
    for i in (0..8).rev() {
        bus.output(pins.mosi, (byte >> i) & 1 == 1);
        bus.delay_us(delay_us);
        pulse(bus, pins.clk, delay_us);
    }
}

fn clock_in<B: PinBus>(bus: &mut B, pins: &ControlPins, delay_us: u32) -> u8 {
    let mut byte = 0u8;
    for _ in 0..8 {
        byte = (byte << 1) | u8::from(bus.input(pins.miso));
        pulse(bus, pins.clk, delay_us);
    }
    byte
}

/// Sends the key and header, leaving the bus ready for the data phase
fn start<B: PinBus>(bus: &mut B, pins: &ControlPins, header: &Header, delay_us: u32) {
    trace!(
        "{:?} {} bytes at {:#010x} (miso index {}, aux index {})",
        header.op,
        header.len,
        header.addr,
        header.miso_index,
        header.aux_index
    );
    bus.output(pins.aux, true);
    for byte in KEY.iter().chain(header.pack().iter()) {
        clock_out(bus, pins, *byte, delay_us);
    }
}

fn finish<B: PinBus>(bus: &mut B, pins: &ControlPins) {
    bus.output(pins.mosi, false);
    bus.output(pins.aux, false);
}

/// Splits a transfer into frame sized pieces, checking the address space
fn frames(addr: u32, len: usize) -> Result<impl Iterator<Item = (u32, usize, u8)>, Error> {
    let last = u32::try_from(len.saturating_sub(1))
        .ok()
        .and_then(|n| addr.checked_add(n));
    if last.is_none() {
        return Err(Error::AddressOverflow { addr, len });
    }
    Ok((0..len).step_by(MAX_FRAME_DATA).map(move |offset| {
        let n = (len - offset).min(MAX_FRAME_DATA);
        // Both fit, checked above and bounded by MAX_FRAME_DATA
        #[allow(clippy::cast_possible_truncation)]
        (addr + offset as u32, offset, n as u8)
    }))
}

/// Read `buf.len()` bytes from the shield starting at `addr`
/// # Errors
/// Returns an error if the transfer runs past the end of the address space
pub fn read<B: PinBus>(
    bus: &mut B,
    pins: &ControlPins,
    addr: u32,
    buf: &mut [u8],
    delay_us: u32,
) -> Result<(), Error> {
    for (frame_addr, offset, n) in frames(addr, buf.len())? {
        let header = Header {
            miso_index: pins.miso_index,
            aux_index: pins.aux_index,
            op: Op::Read,
            len: n,
            addr: frame_addr,
        };
        start(bus, pins, &header, delay_us);
        for byte in &mut buf[offset..offset + usize::from(n)] {
            *byte = clock_in(bus, pins, delay_us);
        }
        finish(bus, pins);
    }
    Ok(())
}

/// Write `data` to the shield starting at `addr`
/// # Errors
/// Returns an error if the transfer runs past the end of the address space
pub fn write<B: PinBus>(
    bus: &mut B,
    pins: &ControlPins,
    addr: u32,
    data: &[u8],
    delay_us: u32,
) -> Result<(), Error> {
    for (frame_addr, offset, n) in frames(addr, data.len())? {
        let header = Header {
            miso_index: pins.miso_index,
            aux_index: pins.aux_index,
            op: Op::Write,
            len: n,
            addr: frame_addr,
        };
        start(bus, pins, &header, delay_us);
        for byte in &data[offset..offset + usize::from(n)] {
            clock_out(bus, pins, *byte, delay_us);
        }
        finish(bus, pins);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Records the mosi bit at every clk rising edge and plays back scripted miso bits
    #[derive(Default)]
    struct Recorder {
        levels: HashMap<PhysicalPin, bool>,
        sampled: Vec<bool>,
        miso_script: Vec<bool>,
        released: Vec<PhysicalPin>,
    }

    const CLK: PhysicalPin = PhysicalPin::from_id(0);
    const MOSI: PhysicalPin = PhysicalPin::from_id(1);
    const MISO: PhysicalPin = PhysicalPin::from_id(2);
    const AUX: PhysicalPin = PhysicalPin::from_id(3);

    fn pins() -> ControlPins {
        ControlPins {
            clk: CLK,
            mosi: MOSI,
            miso: MISO,
            aux: AUX,
            miso_index: 2,
            aux_index: 3,
        }
    }

    impl PinBus for Recorder {
        fn output(&mut self, pin: PhysicalPin, level: bool) {
            let old = self.levels.insert(pin, level).unwrap_or(false);
            if pin == CLK && !old && level {
                self.sampled.push(self.levels.get(&MOSI).copied().unwrap_or(false));
                // Frames only go out with aux asserted
                assert_eq!(self.levels.get(&AUX), Some(&true));
            }
        }

        fn input(&mut self, pin: PhysicalPin) -> bool {
            assert_eq!(pin, MISO);
            if self.miso_script.is_empty() {
                false
            } else {
                self.miso_script.remove(0)
            }
        }

        fn release(&mut self, pin: PhysicalPin) {
            self.released.push(pin);
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    fn bits(bytes: &[u8]) -> Vec<bool> {
        bytes
            .iter()
            .flat_map(|b| (0..8).rev().map(move |i| (b >> i) & 1 == 1))
            .collect()
    }

    #[test]
    fn test_write_frame_bits() -> anyhow::Result<()> {
        let mut bus = Recorder::default();
        write(&mut bus, &pins(), 0x10, &[0xA5], 0)?;
        let mut expected = KEY.to_vec();
        expected.extend_from_slice(&[2, 3, 1, 1, 0x10, 0, 0, 0, 0xA5]);
        assert_eq!(bus.sampled, bits(&expected));
        assert_eq!(bus.levels.get(&AUX), Some(&false));
        Ok(())
    }

    #[test]
    fn test_read_frame_bits() -> anyhow::Result<()> {
        let mut bus = Recorder {
            miso_script: bits(&[0xBE, 0xEF]),
            ..Default::default()
        };
        let mut buf = [0u8; 2];
        read(&mut bus, &pins(), 0x20, &mut buf, 0)?;
        assert_eq!(buf, [0xBE, 0xEF]);
        // Key, header, then one clock per data bit
        assert_eq!(bus.sampled.len(), (KEY.len() + 8 + 2) * 8);
        Ok(())
    }

    #[test]
    fn test_long_transfer_splits() -> anyhow::Result<()> {
        let mut bus = Recorder::default();
        write(&mut bus, &pins(), 0x100, &[0u8; 300], 0)?;
        let frame_bits = |n: usize| (KEY.len() + 8 + n) * 8;
        assert_eq!(bus.sampled.len(), frame_bits(255) + frame_bits(45));
        // The second header starts right after the first frame
        let second = &bus.sampled[frame_bits(255)..frame_bits(255) + frame_bits(0)];
        let mut expected = KEY.to_vec();
        expected.extend_from_slice(&[2, 3, 1, 45]);
        expected.extend_from_slice(&(0x100u32 + 255).to_le_bytes());
        assert_eq!(second, &bits(&expected)[..]);
        Ok(())
    }

    #[test]
    fn test_address_overflow() {
        let mut bus = Recorder::default();
        assert!(matches!(
            write(&mut bus, &pins(), u32::MAX, &[0, 0], 0),
            Err(Error::AddressOverflow { .. })
        ));
        assert!(bus.sampled.is_empty());
    }

    #[test]
    fn test_claim_releases_on_drop() -> anyhow::Result<()> {
        let mut bus = Recorder::default();
        {
            let mut claim = Claim::new(&mut bus, pins(), 0);
            claim.write(0, &[1])?;
        }
        for pin in pins().pins() {
            assert!(bus.released.contains(&pin));
        }
        Ok(())
    }
}
