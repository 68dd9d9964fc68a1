//! Streaming configuration images in and out of the shield's flash.
//!
//! The flash is reached through a page buffer: set the flash address, issue a command, poll the
//! status until it isn't busy. Images are CRC checked by the shield on commit; a rejected image
//! never replaces the active one.

use super::Tester;
use crate::{
    registers::{
        FlashCommand,
        FlashStatus,
        ResetControl,
        FLASH_ACTIVE_ADDR,
        FLASH_ADDR,
        FLASH_BUFFER,
        FLASH_CMD,
        FLASH_PAGE_SIZE,
        FLASH_SECTOR_SIZE,
        FLASH_SIZE,
        FLASH_SLOT_SIZE,
        FLASH_UPDATE_ADDR,
        NO_IMAGE,
    },
    transport::{
        Error,
        Transport,
        TransportResult,
    },
};
use ctlwire::PinBus;
use indicatif::ProgressBar;
use packed_struct::PrimitiveEnum;
use shield_utils::firmware::ImageHeader;
use std::io::{
    Read,
    Seek,
    SeekFrom,
    Write,
};
use tracing::{
    error,
    info,
    warn,
};

/// Reports progress on whole percent boundaries, each percentage at most once
struct Progress<'a> {
    callback: Option<&'a mut dyn FnMut(u8)>,
    total: u64,
    last: Option<u8>,
}

impl<'a> Progress<'a> {
    fn new(callback: Option<&'a mut dyn FnMut(u8)>, total: u64) -> Self {
        Self {
            callback,
            total,
            last: None,
        }
    }

    fn update(&mut self, done: u64) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        let percent = if self.total == 0 {
            100
        } else {
            // At most 100
            #[allow(clippy::cast_possible_truncation)]
            let p = (done.min(self.total) * 100 / self.total) as u8;
            p
        };
        if self.last.map_or(true, |last| percent > last) {
            callback(percent);
            self.last = Some(percent);
        }
    }
}

/// Adapts an indicatif [`ProgressBar`] to the progress callbacks of the firmware methods
pub fn progress_bar(bar: &ProgressBar) -> impl FnMut(u8) + '_ {
    bar.set_length(100);
    move |percent| {
        bar.set_position(u64::from(percent));
        if percent == 100 {
            bar.finish();
        }
    }
}

impl<B: PinBus> Tester<B> {
    /// Wait for the current flash command to finish
    fn flash_wait(&mut self) -> TransportResult<FlashStatus> {
        let poll = self.timing.flash_poll_us.max(1);
        let mut waited = 0u32;
        loop {
            let status: FlashStatus = self.read_addr()?;
            if !status.busy {
                return Ok(status);
            }
            if waited >= self.timing.flash_timeout_us {
                return Err(Error::Timeout("the flash to finish a command"));
            }
            self.bus.delay_us(poll);
            waited = waited.saturating_add(poll);
        }
    }

    fn flash_command(&mut self, cmd: FlashCommand, addr: u32) -> TransportResult<FlashStatus> {
        self.write_reg(FLASH_ADDR, &addr)?;
        self.write_reg(FLASH_CMD, &cmd.to_primitive())?;
        self.flash_wait()
    }

    fn flash_read_page(&mut self, addr: u32) -> TransportResult<Vec<u8>> {
        if self.flash_command(FlashCommand::Read, addr)?.error {
            return Err(Error::OutOfBounds);
        }
        self.read_n_bytes(FLASH_BUFFER.addr, FLASH_PAGE_SIZE)
    }

    fn dump_range<W: Write>(
        &mut self,
        start: u32,
        len: u32,
        dest: &mut W,
        progress: Option<&mut dyn FnMut(u8)>,
    ) -> TransportResult<usize> {
        let mut progress = Progress::new(progress, u64::from(len));
        let mut done = 0u32;
        while done < len {
            let page = self.flash_read_page(start + done)?;
            let n = (len - done).min(FLASH_PAGE_SIZE as u32);
            dest.write_all(&page[..n as usize])?;
            done += n;
            progress.update(u64::from(done));
        }
        Ok(len as usize)
    }

    /// Stream the active configuration image into `dest`. Returns the number of bytes written,
    /// zero if the flash holds no active image.
    /// # Errors
    /// Returns an error on transport or IO errors, or if the active image header is corrupt
    pub fn firmware_dump<W: Write>(
        &mut self,
        dest: &mut W,
        progress: Option<&mut dyn FnMut(u8)>,
    ) -> TransportResult<usize> {
        let active: u32 = self.read_reg(FLASH_ACTIVE_ADDR)?;
        if active == NO_IMAGE {
            warn!("The shield has no active image to dump");
            return Ok(0);
        }
        let first = self.flash_read_page(active)?;
        let header = ImageHeader::parse(&first)?;
        let len = u32::try_from(header.total_len()).map_err(|_| Error::OutOfBounds)?;
        info!("Dumping image version {:#010x}, {len} bytes", header.version);
        self.dump_range(active, len, dest, progress)
    }

    /// Stream the whole flash into `dest`
    /// # Errors
    /// Returns an error on transport or IO errors
    pub fn firmware_dump_all<W: Write>(
        &mut self,
        dest: &mut W,
        progress: Option<&mut dyn FnMut(u8)>,
    ) -> TransportResult<usize> {
        let size: u32 = self.read_reg(FLASH_SIZE)?;
        info!("Dumping {size} bytes of flash");
        self.dump_range(0, size, dest, progress)
    }

    /// Stream a prepared image (see [`shield_utils::firmware::Image::to_bytes`]) into the update
    /// slot and ask the shield to activate it. The shield checks the image CRC; `Ok(false)` means
    /// it refused and the active image is unchanged. Call [`Tester::reprogram`] to boot it.
    /// # Errors
    /// Returns an error on transport or IO errors, flash timeouts, or if the image is larger than
    /// a flash slot
    pub fn firmware_update<R: Read + Seek>(
        &mut self,
        src: &mut R,
        progress: Option<&mut dyn FnMut(u8)>,
    ) -> TransportResult<bool> {
        let size = src.seek(SeekFrom::End(0))?;
        src.seek(SeekFrom::Start(0))?;
        let slot: u32 = self.read_reg(FLASH_SLOT_SIZE)?;
        if size > u64::from(slot) {
            return Err(Error::ImageTooLarge { size, slot });
        }
        // Fits in a slot, so fits in a u32
        #[allow(clippy::cast_possible_truncation)]
        let size = size as u32;
        let base: u32 = self.read_reg(FLASH_UPDATE_ADDR)?;
        info!("Writing {size} byte image at flash {base:#010x}");

        for sector in (0..size).step_by(FLASH_SECTOR_SIZE as usize) {
            if self.flash_command(FlashCommand::Erase, base + sector)?.error {
                error!("Flash erase at {:#010x} failed", base + sector);
                return Ok(false);
            }
        }

        let mut progress = Progress::new(progress, u64::from(size));
        let mut page = [0xFFu8; FLASH_PAGE_SIZE];
        let mut done = 0u32;
        while done < size {
            let n = (size - done).min(FLASH_PAGE_SIZE as u32) as usize;
            page.fill(0xFF);
            src.read_exact(&mut page[..n])?;
            self.write_bytes(FLASH_BUFFER.addr, &page)?;
            if self.flash_command(FlashCommand::Program, base + done)?.error {
                error!("Flash program at {:#010x} failed", base + done);
                return Ok(false);
            }
            done += n as u32;
            progress.update(u64::from(done));
        }

        self.write_reg(FLASH_CMD, &FlashCommand::Commit.to_primitive())?;
        if self.flash_wait()?.error {
            error!("The shield rejected the new image");
            return Ok(false);
        }
        info!("New image committed");
        Ok(true)
    }

    /// Reboot the shield from its active image. The shield comes back fully reset, so this handle
    /// forgets its control pins, mappings and peripheral selection too.
    /// # Errors
    /// Returns an error if the reboot request couldn't be sent
    pub fn reprogram(&mut self) -> TransportResult<()> {
        self.write_addr(&ResetControl {
            reprogram: true,
            ..Default::default()
        })?;
        self.forget_state();
        self.bus.delay_us(self.timing.reprogram_delay_us);
        info!("Shield reprogrammed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_whole_percents() {
        let mut seen = vec![];
        let mut record = |p: u8| seen.push(p);
        let mut progress = Progress::new(Some(&mut record), 1000);
        for done in (0..=1000).step_by(3) {
            progress.update(done);
        }
        progress.update(1000);
        drop(progress);
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.len(), 101);
    }

    #[test]
    fn test_progress_optional() {
        let mut progress = Progress::new(None, 10);
        progress.update(5);
        assert_eq!(progress.last, None);
    }
}
