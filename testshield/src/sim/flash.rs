//! NOR flash behind the page buffer: erase sets bits, program only clears them
use crate::registers::{
    FlashCommand,
    FLASH_PAGE_SIZE,
    FLASH_SECTOR_SIZE,
    NO_IMAGE,
};
use packed_struct::PrimitiveEnum;
use shield_utils::firmware::Image;
use tracing::debug;

/// Default size of each of the two image slots
pub const DEFAULT_SLOT_SIZE: u32 = 0x1_0000;

/// Status reads a command stays busy for
const BUSY_READS: u8 = 2;

#[derive(Debug)]
pub(super) struct Flash {
    mem: Vec<u8>,
    slot_size: u32,
    pub(super) active: u32,
    pub(super) update: u32,
    pub(super) addr: u32,
    pub(super) buffer: [u8; FLASH_PAGE_SIZE],
    busy: u8,
    error: bool,
}

impl Flash {
    pub(super) fn new(slot_size: u32) -> Self {
        let slot_size = slot_size.div_ceil(FLASH_SECTOR_SIZE).max(1) * FLASH_SECTOR_SIZE;
        Self {
            mem: vec![0xFF; 2 * slot_size as usize],
            slot_size,
            active: NO_IMAGE,
            update: 0,
            addr: 0,
            buffer: [0xFF; FLASH_PAGE_SIZE],
            busy: 0,
            error: false,
        }
    }

    pub(super) fn size(&self) -> u32 {
        2 * self.slot_size
    }

    pub(super) fn slot_size(&self) -> u32 {
        self.slot_size
    }

    /// The status byte. Reading it counts down the busy time of the last command.
    pub(super) fn status(&mut self) -> u8 {
        let busy = self.busy > 0;
        self.busy = self.busy.saturating_sub(1);
        u8::from(busy) | (u8::from(self.error) << 1)
    }

    fn range(&self, start: u32, len: u32) -> Option<std::ops::Range<usize>> {
        let end = start.checked_add(len)?;
        (end <= self.size()).then(|| start as usize..end as usize)
    }

    pub(super) fn command(&mut self, cmd: u8) {
        self.busy = BUSY_READS;
        self.error = !match FlashCommand::from_primitive(cmd) {
            Some(FlashCommand::Read) => self.read(),
            Some(FlashCommand::Erase) => self.erase(),
            Some(FlashCommand::Program) => self.program(),
            Some(FlashCommand::Commit) => self.commit(),
            None => false,
        };
    }

    fn read(&mut self) -> bool {
        let Some(range) = self.range(self.addr, FLASH_PAGE_SIZE as u32) else {
            return false;
        };
        self.buffer.copy_from_slice(&self.mem[range]);
        true
    }

    fn erase(&mut self) -> bool {
        let sector = self.addr & !(FLASH_SECTOR_SIZE - 1);
        let Some(range) = self.range(sector, FLASH_SECTOR_SIZE) else {
            return false;
        };
        self.mem[range].fill(0xFF);
        true
    }

    fn program(&mut self) -> bool {
        let Some(range) = self.range(self.addr, FLASH_PAGE_SIZE as u32) else {
            return false;
        };
        for (cell, byte) in self.mem[range].iter_mut().zip(self.buffer) {
            *cell &= byte;
        }
        true
    }

    fn image_at(&self, start: u32) -> Option<Image> {
        let range = self.range(start, self.slot_size)?;
        match Image::parse(&self.mem[range]) {
            Ok(image) => Some(image),
            Err(e) => {
                debug!("No valid image at {start:#010x}: {e}");
                None
            }
        }
    }

    /// Swap slots if the update slot holds a valid image
    fn commit(&mut self) -> bool {
        if self.image_at(self.update).is_none() {
            return false;
        }
        let previous = if self.active == NO_IMAGE {
            self.slot_size - self.update
        } else {
            self.active
        };
        self.active = self.update;
        self.update = previous;
        true
    }

    pub(super) fn active_image(&self) -> Option<Image> {
        if self.active == NO_IMAGE {
            None
        } else {
            self.image_at(self.active)
        }
    }
}
