//! Choosing which board pins carry the control channel.
//!
//! In automatic mode the pins are found by search with handshakes (a scratch register write and
//! read-back of a fresh pattern). The first four pins that answer become a reference set. Each
//! (clk, mosi) pair in form factor order is then tried against reference pins, and the first
//! working pair gets the first miso and then the first aux that answer. Candidates are the usable pins of the board minus anything
//! mapped to a logical pin and minus the pin about to be mapped.

use super::Tester;
use crate::{
    registers::SCRATCH,
    transport::{
        Error,
        TransportResult,
    },
};
use ctlwire::{
    Claim,
    ControlPins,
    PinBus,
};
use shield_utils::pins::PhysicalPin;
use std::collections::HashMap;
use tracing::{
    debug,
    info,
};

/// Handshake outcomes gathered during one pin search
struct Search {
    pool: Vec<PhysicalPin>,
    tried: HashMap<[PhysicalPin; 4], bool>,
    /// The first set that answered
    reference: Option<[PhysicalPin; 4]>,
    exhausted: bool,
}

impl Search {
    fn new(pool: Vec<PhysicalPin>) -> Self {
        Self {
            pool,
            tried: HashMap::new(),
            reference: None,
            exhausted: false,
        }
    }
}

/// Ordered (clk, mosi) pairs of distinct pool pins, in pool order
fn pairs(pool: &[PhysicalPin]) -> Vec<(PhysicalPin, PhysicalPin)> {
    pool.iter()
        .flat_map(|&clk| {
            pool.iter()
                .filter(move |&&mosi| mosi != clk)
                .map(move |&mosi| (clk, mosi))
        })
        .collect()
}

/// Who decides which pins carry the control channel
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlMode {
    /// The tester searches for pins on demand and moves them out of the way of mappings
    Automatic(Option<ControlPins>),
    /// The caller picked the pins and guarantees nothing else uses them
    Manual(ControlPins),
}

impl ControlMode {
    /// The pins currently claimed, if any
    #[must_use]
    pub fn pins(&self) -> Option<&ControlPins> {
        match self {
            ControlMode::Automatic(pins) => pins.as_ref(),
            ControlMode::Manual(pins) => Some(pins),
        }
    }

    #[must_use]
    pub fn is_manual(&self) -> bool {
        matches!(self, ControlMode::Manual(_))
    }
}

impl<B: PinBus> Tester<B> {
    /// The pins to run a transaction on, searching for a set if none is claimed.
    /// `exclude` is kept out of the search.
    pub(crate) fn control_pins(
        &mut self,
        exclude: Option<PhysicalPin>,
    ) -> TransportResult<ControlPins> {
        if let Some(pins) = self.mode.pins() {
            return Ok(*pins);
        }
        let pins = self.allocate(exclude)?;
        self.mode = ControlMode::Automatic(Some(pins));
        Ok(pins)
    }

    /// Pins the allocator may consider, in form factor order
    pub(crate) fn candidates(&self, exclude: Option<PhysicalPin>) -> Vec<PhysicalPin> {
        self.board
            .usable_pins()
            .filter(|&p| Some(p) != exclude && !self.mapping.contains(&p))
            .collect()
    }

    /// Every ordered (clk, mosi) pair of candidate pins, in search order
    #[must_use]
    pub fn candidate_pairs(&self) -> Vec<(PhysicalPin, PhysicalPin)> {
        pairs(&self.candidates(None))
    }

    fn allocate(&mut self, exclude: Option<PhysicalPin>) -> TransportResult<ControlPins> {
        let mut search = Search::new(self.candidates(exclude));
        for (clk, mosi) in pairs(&search.pool) {
            if let Some(pins) = self.find_link(clk, mosi, &mut search)? {
                ctlwire::claim(&mut self.bus, &pins);
                info!(
                    "Control channel on clk={} mosi={} miso={} aux={}",
                    self.board.pin_name(pins.clk),
                    self.board.pin_name(pins.mosi),
                    self.board.pin_name(pins.miso),
                    self.board.pin_name(pins.aux)
                );
                return Ok(pins);
            }
        }
        Err(Error::NoControlPins)
    }

    /// Handshake over `set` as (clk, mosi, miso, aux), at most once per search
    fn try_set(&mut self, search: &mut Search, set: [PhysicalPin; 4]) -> TransportResult<bool> {
        if let Some(&ok) = search.tried.get(&set) {
            return Ok(ok);
        }
        let ok = match self.control_pins_for(set[0], set[1], set[2], set[3]) {
            Some(pins) => self.handshake(pins)?,
            None => false,
        };
        search.tried.insert(set, ok);
        if ok && search.reference.is_none() {
            search.reference = Some(set);
        }
        Ok(ok)
    }

    /// Four pins known to carry a working channel. Consecutive runs of the pool are tried
    /// before every other combination.
    fn reference(&mut self, search: &mut Search) -> TransportResult<Option<[PhysicalPin; 4]>> {
        if search.reference.is_some() || search.exhausted {
            return Ok(search.reference);
        }
        let pool = search.pool.clone();
        for w in pool.windows(4) {
            if self.try_set(search, [w[0], w[1], w[2], w[3]])? {
                return Ok(search.reference);
            }
        }
        let n = pool.len();
        for a in 0..n {
            for b in a + 1..n {
                for c in b + 1..n {
                    for d in c + 1..n {
                        if self.try_set(search, [pool[a], pool[b], pool[c], pool[d]])? {
                            return Ok(search.reference);
                        }
                    }
                }
            }
        }
        debug!("No four candidate pins complete a handshake");
        search.exhausted = true;
        Ok(None)
    }

    /// Complete a (clk, mosi) pair with the first miso, then the first aux, in pool order that
    /// pass a handshake. The pair is judged against two pins of a known working set, and each
    /// miso candidate against a known working aux, so a dead pair costs a single handshake.
    fn find_link(
        &mut self,
        clk: PhysicalPin,
        mosi: PhysicalPin,
        search: &mut Search,
    ) -> TransportResult<Option<ControlPins>> {
        debug!(
            "Trying clk={} mosi={}",
            self.board.pin_name(clk),
            self.board.pin_name(mosi)
        );
        let Some(reference) = self.reference(search)? else {
            return Ok(None);
        };
        let spare = |used: &[PhysicalPin]| {
            reference
                .into_iter()
                .filter(|p| !used.contains(p))
                .collect::<Vec<_>>()
        };
        // At most two of the four reference pins are taken by the pair
        let pair_spare = spare(&[clk, mosi]);
        if !self.try_set(search, [clk, mosi, pair_spare[0], pair_spare[1]])? {
            return Ok(None);
        }
        let pool = search.pool.clone();
        let mut miso = None;
        for &candidate in &pool {
            if candidate == clk || candidate == mosi {
                continue;
            }
            let Some(&aux) = spare(&[clk, mosi, candidate]).first() else {
                continue;
            };
            if self.try_set(search, [clk, mosi, candidate, aux])? {
                miso = Some(candidate);
                break;
            }
        }
        let Some(miso) = miso else {
            return Ok(None);
        };
        for &aux in &pool {
            if aux == clk || aux == mosi || aux == miso {
                continue;
            }
            if self.try_set(search, [clk, mosi, miso, aux])? {
                return Ok(self.control_pins_for(clk, mosi, miso, aux));
            }
        }
        Ok(None)
    }

    /// Judge every ordered pair of usable pins, `false` for the ones that can't carry a channel
    pub(crate) fn judge_pairs(
        &mut self,
    ) -> TransportResult<Vec<(PhysicalPin, PhysicalPin, bool)>> {
        let mut search = Search::new(self.candidates(None));
        let mut verdicts = vec![];
        for (clk, mosi) in pairs(&search.pool) {
            let ok = self.find_link(clk, mosi, &mut search)?.is_some();
            verdicts.push((clk, mosi, ok));
        }
        Ok(verdicts)
    }

    /// Build a pin set, `None` if a pin has no physical index
    pub(crate) fn control_pins_for(
        &self,
        clk: PhysicalPin,
        mosi: PhysicalPin,
        miso: PhysicalPin,
        aux: PhysicalPin,
    ) -> Option<ControlPins> {
        Some(ControlPins {
            clk,
            mosi,
            miso,
            aux,
            miso_index: self.board.physical_index(miso)?,
            aux_index: self.board.physical_index(aux)?,
        })
    }

    /// Write a fresh pattern and its complement to the scratch register over `pins` and read each
    /// back. The pins are released afterwards.
    pub(crate) fn handshake(&mut self, pins: ControlPins) -> TransportResult<bool> {
        let delay = self.timing.bit_delay_us;
        let pattern = self.next_pattern();
        let mut claim = Claim::new(&mut self.bus, pins, delay);
        for value in [pattern, !pattern] {
            claim.write(SCRATCH.addr, &value.to_le_bytes())?;
            let mut echo = [0u8; 4];
            claim.read(SCRATCH.addr, &mut echo)?;
            if u32::from_le_bytes(echo) != value {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Float the current control pins, if any are claimed
    pub(crate) fn release_control_pins(&mut self) {
        if let Some(pins) = self.mode.pins().copied() {
            ctlwire::release(&mut self.bus, &pins);
        }
    }

    /// Hand control pin selection back to the tester. The current pins are released and a new
    /// set is found on the next transaction.
    pub fn set_control_pins_auto(&mut self) {
        self.release_control_pins();
        self.mode = ControlMode::Automatic(None);
    }

    /// Pin the control channel to the given pins. The caller guarantees exclusivity: mapping any
    /// of them to a logical pin afterwards fails with [`Error::ControlPinConflict`].
    /// # Errors
    /// Returns an error if a pin isn't in the form factor, is restricted, is already mapped or
    /// appears twice
    pub fn set_control_pins_manual(
        &mut self,
        clk: PhysicalPin,
        mosi: PhysicalPin,
        miso: PhysicalPin,
        aux: PhysicalPin,
    ) -> TransportResult<()> {
        let set = [clk, mosi, miso, aux];
        for (i, &pin) in set.iter().enumerate() {
            self.physical_index(pin)?;
            if self.board.is_restricted(pin) {
                return Err(Error::RestrictedPin(self.pin_name(pin)));
            }
            if self.mapping.contains(&pin) || set[..i].contains(&pin) {
                return Err(Error::ControlPinConflict(self.pin_name(pin)));
            }
        }
        let pins = self
            .control_pins_for(clk, mosi, miso, aux)
            .ok_or_else(|| Error::NotInFormFactor(self.pin_name(miso)))?;
        self.release_control_pins();
        ctlwire::claim(&mut self.bus, &pins);
        self.mode = ControlMode::Manual(pins);
        info!(
            "Control channel pinned to clk={} mosi={} miso={} aux={}",
            self.board.pin_name(clk),
            self.board.pin_name(mosi),
            self.board.pin_name(miso),
            self.board.pin_name(aux)
        );
        Ok(())
    }

    /// Move the control channel off `pin` if it is on it
    pub(crate) fn evict(&mut self, pin: PhysicalPin) -> TransportResult<()> {
        match self.mode {
            ControlMode::Manual(pins) if pins.contains(pin) => {
                Err(Error::ControlPinConflict(self.pin_name(pin)))
            }
            ControlMode::Automatic(Some(pins)) if pins.contains(pin) => {
                debug!(
                    "Relocating the control channel off {}",
                    self.board.pin_name(pin)
                );
                self.set_control_pins_auto();
                self.control_pins(Some(pin)).map(|_| ())
            }
            ControlMode::Automatic(None) => self.control_pins(Some(pin)).map(|_| ()),
            _ => Ok(()),
        }
    }
}
