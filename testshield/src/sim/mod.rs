//! A simulated test shield for running the tester without hardware.
//!
//! [`Shield`] implements [`PinBus`], so a [`crate::tester::Tester`] can drive it exactly as it
//! would drive the target's GPIO. The shield watches every pin it is wired to, hunts for the sync
//! key on every (clk, mosi) pair, decodes frames, and answers from an emulated register space.
//! Pins can be broken to exercise the allocator and the self tests.
//!
//! Levels are resolved per pin: a pin driven by the host reads as the host's level at the shield,
//! a pin driven by the shield reads as the shield's level at the host, and anything else reads as
//! its pull. A broken pin carries nothing in either direction.

mod flash;
mod regs;

use ctlwire::{
    frame::key_word,
    Header,
    Op,
    PinBus,
};
use flash::Flash;
use regs::SlotMetrics;
use shield_utils::{
    board::Board,
    pins::PhysicalPin,
};
use std::collections::HashMap;
use tracing::trace;

pub use flash::DEFAULT_SLOT_SIZE;

/// Virtual clock ticks per microsecond of [`PinBus::delay_us`]
pub const TICKS_PER_US: u64 = 100;

/// Bits in a frame header, after the key
const HEADER_BITS: u8 = 64;

#[derive(Debug)]
enum Phase {
    Header {
        bits: u64,
        count: u8,
    },
    Write {
        addr: u32,
        len: usize,
        aux: usize,
        data: Vec<u8>,
        bits: usize,
    },
    Read {
        aux: usize,
        miso: usize,
        data: Vec<u8>,
        bit: usize,
    },
}

/// A frame in flight on one (clk, mosi) pair
#[derive(Debug)]
struct Frame {
    clk: usize,
    mosi: usize,
    phase: Phase,
}

impl Frame {
    fn aux(&self) -> Option<usize> {
        match self.phase {
            Phase::Header { .. } => None,
            Phase::Write { aux, .. } | Phase::Read { aux, .. } => Some(aux),
        }
    }
}

/// An emulated shield wired to every pin of a board's form factor
#[derive(Debug)]
pub struct Shield {
    index: HashMap<PhysicalPin, usize>,
    host: Vec<Option<bool>>,
    broken: Vec<bool>,
    seen: Vec<bool>,
    /// Read data the shield drives: (physical index, level)
    miso: Option<(usize, bool)>,
    shift: Vec<u64>,
    frame: Option<Frame>,
    frames: usize,
    now: u64,
    version: u32,
    scratch: [u8; 4],
    remap: [u8; 16],
    pulls: Vec<u8>,
    peripheral: u8,
    gpio_out: [u8; 8],
    gpio_oe: [u8; 8],
    metrics_active: bool,
    metrics: [SlotMetrics; 8],
    memory: HashMap<u32, u8>,
    flash: Flash,
}

impl Shield {
    /// A shield running firmware `version`, with an empty flash of two [`DEFAULT_SLOT_SIZE`]
    /// slots
    #[must_use]
    pub fn new(board: &Board, version: u32) -> Self {
        Self::with_flash_slot(board, version, DEFAULT_SLOT_SIZE)
    }

    /// As [`Shield::new`] with a custom flash slot size, rounded up to a whole sector
    #[must_use]
    pub fn with_flash_slot(board: &Board, version: u32, slot_size: u32) -> Self {
        let n = board.form_factor().len();
        let index = board
            .form_factor()
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_nc())
            .map(|(i, p)| (p, i))
            .collect();
        let mut shield = Self {
            index,
            host: vec![None; n],
            broken: vec![false; n],
            seen: vec![false; n],
            miso: None,
            shift: vec![0; n * n],
            frame: None,
            frames: 0,
            now: 0,
            version,
            scratch: [0; 4],
            remap: [0; 16],
            pulls: vec![0; n],
            peripheral: 0,
            gpio_out: [0; 8],
            gpio_oe: [0; 8],
            metrics_active: false,
            metrics: [SlotMetrics::default(); 8],
            memory: HashMap::new(),
            flash: Flash::new(slot_size),
        };
        shield.full_reset();
        shield
    }

    fn n(&self) -> usize {
        self.seen.len()
    }

    /// Disconnect `pin` from the shield in both directions
    pub fn break_pin(&mut self, pin: PhysicalPin) {
        if let Some(&i) = self.index.get(&pin) {
            self.broken[i] = true;
            self.refresh();
        }
    }

    pub fn repair_pin(&mut self, pin: PhysicalPin) {
        if let Some(&i) = self.index.get(&pin) {
            self.broken[i] = false;
            self.refresh();
        }
    }

    /// Frames the shield accepted and executed
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The level the host currently drives on `pin`, `None` if it floats
    #[must_use]
    pub fn host_drive(&self, pin: PhysicalPin) -> Option<bool> {
        self.index.get(&pin).and_then(|&i| self.host[i])
    }

    /// The remap table, one physical index per logical pin
    #[must_use]
    pub fn remap(&self) -> [u8; 16] {
        self.remap
    }

    /// The raw pull mode configured for `pin`
    #[must_use]
    pub fn pull(&self, pin: PhysicalPin) -> Option<u8> {
        self.index.get(&pin).map(|&i| self.pulls[i])
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Virtual time in 100 MHz ticks
    #[must_use]
    pub fn now(&self) -> u64 {
        self.now
    }

    fn fpga_drive(&self, i: usize) -> Option<bool> {
        match self.miso {
            Some((pin, level)) if pin == i => Some(level),
            _ => self.gpio_drive(i),
        }
    }

    fn pull_level(&self, i: usize) -> bool {
        self.pulls[i] == 1
    }

    /// What the shield sees on pin `i`
    fn shield_level(&self, i: usize) -> bool {
        let host = if self.broken[i] { None } else { self.host[i] };
        host.or_else(|| self.fpga_drive(i))
            .unwrap_or_else(|| self.pull_level(i))
    }

    /// What the host sees on pin `i`
    fn host_level(&self, i: usize) -> bool {
        if self.broken[i] {
            return self.host[i].unwrap_or(false);
        }
        self.fpga_drive(i)
            .or(self.host[i])
            .unwrap_or_else(|| self.pull_level(i))
    }

    /// Recompute every level the shield sees and react to the edges
    fn refresh(&mut self) {
        let levels: Vec<bool> = (0..self.n()).map(|i| self.shield_level(i)).collect();
        let old = std::mem::replace(&mut self.seen, levels);
        for (i, was) in old.into_iter().enumerate() {
            let level = self.seen[i];
            if level == was {
                continue;
            }
            self.record_edge(i, level);
            if level {
                self.rising(i);
            } else {
                self.falling(i);
            }
        }
        self.settle();
    }

    /// Pick up level changes the shield caused itself. They're measured but never clock frames.
    fn settle(&mut self) {
        let levels: Vec<bool> = (0..self.n()).map(|i| self.shield_level(i)).collect();
        let old = std::mem::replace(&mut self.seen, levels);
        for (i, was) in old.into_iter().enumerate() {
            if self.seen[i] != was {
                self.record_edge(i, self.seen[i]);
            }
        }
    }

    fn falling(&mut self, i: usize) {
        if self.frame.as_ref().and_then(Frame::aux) == Some(i) {
            trace!("Frame aborted, aux fell");
            self.frame = None;
            self.miso = None;
        }
    }

    fn rising(&mut self, c: usize) {
        match self.frame.take() {
            Some(frame) if frame.clk == c => self.frame = self.clock(frame),
            Some(frame) => self.frame = Some(frame),
            None => self.hunt(c),
        }
    }

    /// Shift every other pin into its (c, m) register and look for the key
    fn hunt(&mut self, c: usize) {
        let n = self.n();
        for m in 0..n {
            if m == c {
                continue;
            }
            let sr = &mut self.shift[c * n + m];
            *sr = (*sr << 1) | u64::from(self.seen[m]);
            if *sr == key_word() {
                self.shift.fill(0);
                self.frame = Some(Frame {
                    clk: c,
                    mosi: m,
                    phase: Phase::Header { bits: 0, count: 0 },
                });
                return;
            }
        }
    }

    /// Advance `frame` by one clock, returning it if it isn't finished
    fn clock(&mut self, frame: Frame) -> Option<Frame> {
        let Frame { clk, mosi, phase } = frame;
        let bit = self.seen[mosi];
        let phase = match phase {
            Phase::Header { bits, count } => {
                let bits = (bits << 1) | u64::from(bit);
                if count + 1 < HEADER_BITS {
                    Phase::Header {
                        bits,
                        count: count + 1,
                    }
                } else {
                    self.start_data(bits)?
                }
            }
            Phase::Write {
                addr,
                len,
                aux,
                mut data,
                bits,
            } => {
                if bits % 8 == 0 {
                    data.push(0);
                }
                if let Some(byte) = data.last_mut() {
                    *byte = (*byte << 1) | u8::from(bit);
                }
                if bits + 1 < len * 8 {
                    Phase::Write {
                        addr,
                        len,
                        aux,
                        data,
                        bits: bits + 1,
                    }
                } else {
                    if self.seen[aux] {
                        trace!("Write {len} bytes at {addr:#010x}");
                        for (i, &byte) in (0u32..).zip(&data) {
                            self.write_byte(addr.wrapping_add(i), byte);
                        }
                        self.frames += 1;
                    }
                    return None;
                }
            }
            Phase::Read {
                aux,
                miso,
                data,
                bit,
            } => {
                let bit = bit + 1;
                if bit >= data.len() * 8 {
                    self.miso = None;
                    self.frames += 1;
                    return None;
                }
                self.miso = Some((miso, (data[bit / 8] >> (7 - bit % 8)) & 1 == 1));
                Phase::Read {
                    aux,
                    miso,
                    data,
                    bit,
                }
            }
        };
        Some(Frame { clk, mosi, phase })
    }

    /// The header is in: validate it and set up the data phase
    fn start_data(&mut self, bits: u64) -> Option<Phase> {
        let header = Header::unpack(&bits.to_be_bytes()).ok()?;
        let aux = usize::from(header.aux_index);
        let miso = usize::from(header.miso_index);
        if aux >= self.n() || miso >= self.n() || !self.seen[aux] {
            trace!("Dropped frame header {header:?}");
            return None;
        }
        match header.op {
            Op::Write => Some(Phase::Write {
                addr: header.addr,
                len: usize::from(header.len),
                aux,
                data: Vec::with_capacity(usize::from(header.len)),
                bits: 0,
            }),
            Op::Read => {
                trace!("Read {} bytes at {:#010x}", header.len, header.addr);
                let data: Vec<u8> = (0..u32::from(header.len))
                    .map(|i| self.read_byte(header.addr.wrapping_add(i)))
                    .collect();
                self.miso = Some((miso, data[0] & 0x80 != 0));
                Some(Phase::Read {
                    aux,
                    miso,
                    data,
                    bit: 0,
                })
            }
        }
    }

    /// Forget any frame in flight, as after a reboot
    fn abort_frames(&mut self) {
        self.frame = None;
        self.miso = None;
        self.shift.fill(0);
    }
}

impl PinBus for Shield {
    fn output(&mut self, pin: PhysicalPin, level: bool) {
        if let Some(&i) = self.index.get(&pin) {
            self.host[i] = Some(level);
            self.refresh();
        }
    }

    fn input(&mut self, pin: PhysicalPin) -> bool {
        self.index
            .get(&pin)
            .map_or(false, |&i| self.host_level(i))
    }

    fn release(&mut self, pin: PhysicalPin) {
        if let Some(&i) = self.index.get(&pin) {
            self.host[i] = None;
            self.refresh();
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.now += u64::from(us) * TICKS_PER_US;
    }
}
