//! Routing physical pins to the shield's logical pins

use super::Tester;
use crate::{
    core::LogicalPin,
    registers::{
        REMAP,
        REMAP_NC,
    },
    transport::{
        Error,
        Transport,
        TransportResult,
    },
};
use ctlwire::PinBus;
use shield_utils::pins::PhysicalPin;
use tracing::debug;

impl<B: PinBus> Tester<B> {
    /// Route `physical` to `logical`.
    ///
    /// If the control channel is sitting on `physical` it is moved first. A pin lives on at most
    /// one logical slot: mapping it again moves it, and whatever held `logical` before is
    /// replaced. Mapping [`PhysicalPin::NC`] empties the slot.
    /// # Errors
    /// Returns an error if the pin can't be mapped (not in the form factor, restricted, pinned
    /// for the control channel) or on transport errors
    pub fn pin_map_set(&mut self, physical: PhysicalPin, logical: LogicalPin) -> TransportResult<()> {
        let slot = usize::from(logical.index());
        if physical.is_nc() {
            self.write_reg(REMAP.bank(u32::from(logical.index()), 1), &REMAP_NC)?;
            self.mapping[slot] = PhysicalPin::NC;
            return Ok(());
        }
        let index = self.physical_index(physical)?;
        if self.board.is_restricted(physical) {
            return Err(Error::RestrictedPin(self.pin_name(physical)));
        }
        self.evict(physical)?;
        if let Some(old) = self.mapping.iter().position(|&p| p == physical) {
            if old != slot {
                #[allow(clippy::cast_possible_truncation)]
                let old_reg = REMAP.bank(old as u32, 1);
                self.write_reg(old_reg, &REMAP_NC)?;
                self.mapping[old] = PhysicalPin::NC;
            }
        }
        self.write_reg(REMAP.bank(u32::from(logical.index()), 1), &index)?;
        self.mapping[slot] = physical;
        debug!("Mapped {} to {logical}", self.board.pin_name(physical));
        Ok(())
    }

    /// Map by raw slot number
    /// # Errors
    /// Returns [`Error::BadLogicalPin`] for slots past the end of the table, otherwise as
    /// [`Tester::pin_map_set`]
    pub fn pin_map_set_index(&mut self, physical: PhysicalPin, logical: u8) -> TransportResult<()> {
        let logical = LogicalPin::new(logical).ok_or(Error::BadLogicalPin(logical))?;
        self.pin_map_set(physical, logical)
    }

    /// Empty every slot and float every pin that was mapped
    /// # Errors
    /// Returns an error on transport errors
    pub fn pin_map_reset(&mut self) -> TransportResult<()> {
        self.write_bytes(REMAP.addr, &[REMAP_NC; LogicalPin::COUNT])?;
        let mapped = std::mem::replace(&mut self.mapping, [PhysicalPin::NC; LogicalPin::COUNT]);
        for pin in mapped.into_iter().filter(|p| !p.is_nc()) {
            self.bus.release(pin);
        }
        Ok(())
    }
}
