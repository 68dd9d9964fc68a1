//! The simulated shield's register space, one byte at a time
use super::Shield;
use crate::{
    core::{
        LogicalPin,
        Peripheral,
    },
    registers::{
        IoMetricsControl,
        ResetControl,
        ADC_RESULT,
        ANALOG_MUX,
        FLASH_ACTIVE_ADDR,
        FLASH_ADDR,
        FLASH_BUFFER,
        FLASH_CMD,
        FLASH_SIZE,
        FLASH_SLOT_SIZE,
        FLASH_STATUS,
        FLASH_UPDATE_ADDR,
        GPIO_IN,
        GPIO_OUT_ENABLE,
        GPIO_OUT_VALUE,
        IO_METRICS_CONTROL,
        IO_METRICS_SLOT_BASE,
        IO_METRICS_SLOT_STRIDE,
        PERIPHERAL_SELECT,
        PULL,
        REMAP,
        REMAP_NC,
        RESET,
        SCRATCH,
        VERSION,
    },
    transport::Deserialize,
};
use packed_struct::PrimitiveEnum;
use tracing::debug;

/// GPIO slots, logical pins 0 through 7
const GPIO_SLOTS: usize = 8;
/// IO metrics slots, logical pins 8 through 15
const METRICS_SLOTS: usize = 8;

/// Offset of `addr` into the field at `base`, if it falls inside
fn field(addr: u32, base: u32, width: usize) -> Option<usize> {
    let offset = usize::try_from(addr.checked_sub(base)?).ok()?;
    (offset < width).then_some(offset)
}

fn le_byte(value: u64, i: usize) -> u8 {
    value.to_le_bytes().get(i).copied().unwrap_or(0)
}

fn set_le_byte(value: &mut u32, i: usize, byte: u8) {
    let mut bytes = value.to_le_bytes();
    if let Some(b) = bytes.get_mut(i) {
        *b = byte;
    }
    *value = u32::from_le_bytes(bytes);
}

/// Measurements of one IO metrics slot. Widths are in ticks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) struct SlotMetrics {
    min_high: u32,
    min_low: u32,
    max_high: u32,
    max_low: u32,
    rising: u32,
    falling: u32,
    last_edge: Option<u64>,
}

impl Default for SlotMetrics {
    fn default() -> Self {
        Self {
            min_high: u32::MAX,
            min_low: u32::MAX,
            max_high: 0,
            max_low: 0,
            rising: 0,
            falling: 0,
            last_edge: None,
        }
    }
}

impl SlotMetrics {
    fn edge(&mut self, level: bool, now: u64) {
        if let Some(last) = self.last_edge {
            let width = u32::try_from(now - last).unwrap_or(u32::MAX);
            // A rising edge ends a low pulse
            let (min, max) = if level {
                (&mut self.min_low, &mut self.max_low)
            } else {
                (&mut self.min_high, &mut self.max_high)
            };
            *min = (*min).min(width);
            *max = (*max).max(width);
        }
        if level {
            self.rising += 1;
        } else {
            self.falling += 1;
        }
        self.last_edge = Some(now);
    }

    fn byte(&self, offset: usize) -> u8 {
        let value = match offset / 4 {
            0 => self.min_high,
            1 => self.min_low,
            2 => self.max_high,
            3 => self.max_low,
            4 => self.rising,
            5 => self.falling,
            _ => 0,
        };
        le_byte(u64::from(value), offset % 4)
    }
}

impl Shield {
    /// Everything back to power-on state, except the flash and the scratch register
    pub(super) fn full_reset(&mut self) {
        self.remap = [REMAP_NC; LogicalPin::COUNT];
        self.pulls.fill(0);
        self.peripheral = Peripheral::Gpio.to_primitive();
        self.peripherals_reset();
    }

    fn peripherals_reset(&mut self) {
        self.gpio_out = [0; GPIO_SLOTS];
        self.gpio_oe = [0; GPIO_SLOTS];
        self.metrics_active = false;
        self.metrics = [SlotMetrics::default(); METRICS_SLOTS];
        self.memory.clear();
    }

    fn reboot(&mut self) {
        match self.flash.active_image() {
            Some(image) => {
                self.version = image.version();
                debug!("Booted image version {:#010x}", self.version);
            }
            None => debug!("No valid active image, keeping the running one"),
        }
        self.abort_frames();
        self.full_reset();
    }

    fn reset_control(&mut self, value: u8) {
        let Ok(ctl) = ResetControl::deserialize([value]) else {
            return;
        };
        if ctl.reprogram {
            self.reboot();
        } else if ctl.reset_all {
            self.full_reset();
        } else if ctl.reset_peripherals {
            self.peripherals_reset();
        }
    }

    /// The level the shield drives on physical pin `i` as a GPIO, if any
    pub(super) fn gpio_drive(&self, i: usize) -> Option<bool> {
        if self.peripheral != Peripheral::Gpio.to_primitive() {
            return None;
        }
        (0..GPIO_SLOTS)
            .find(|&k| usize::from(self.remap[k]) == i && self.gpio_oe[k] != 0)
            .map(|k| self.gpio_out[k] != 0)
    }

    /// The level seen on the pin mapped to logical slot `k`, low if unmapped
    fn mapped_level(&self, k: usize) -> bool {
        self.seen
            .get(usize::from(self.remap[k]))
            .copied()
            .unwrap_or(false)
    }

    /// Feed an edge on physical pin `i` to the IO metrics slots watching it
    pub(super) fn record_edge(&mut self, i: usize, level: bool) {
        if !self.metrics_active {
            return;
        }
        let now = self.now;
        for (slot, metrics) in self.metrics.iter_mut().enumerate() {
            if usize::from(self.remap[GPIO_SLOTS + slot]) == i {
                metrics.edge(level, now);
            }
        }
    }

    pub(super) fn read_byte(&mut self, addr: u32) -> u8 {
        let n = self.n();
        if let Some(i) = field(addr, SCRATCH.addr, SCRATCH.width) {
            self.scratch[i]
        } else if let Some(i) = field(addr, VERSION.addr, VERSION.width) {
            le_byte(u64::from(self.version), i)
        } else if let Some(i) = field(addr, FLASH_SIZE.addr, FLASH_SIZE.width) {
            le_byte(u64::from(self.flash.size()), i)
        } else if let Some(i) = field(addr, FLASH_SLOT_SIZE.addr, FLASH_SLOT_SIZE.width) {
            le_byte(u64::from(self.flash.slot_size()), i)
        } else if let Some(i) = field(addr, FLASH_ACTIVE_ADDR.addr, FLASH_ACTIVE_ADDR.width) {
            le_byte(u64::from(self.flash.active), i)
        } else if let Some(i) = field(addr, FLASH_UPDATE_ADDR.addr, FLASH_UPDATE_ADDR.width) {
            le_byte(u64::from(self.flash.update), i)
        } else if let Some(i) = field(addr, FLASH_ADDR.addr, FLASH_ADDR.width) {
            le_byte(u64::from(self.flash.addr), i)
        } else if addr == FLASH_STATUS.addr {
            self.flash.status()
        } else if let Some(i) = field(addr, FLASH_BUFFER.addr, FLASH_BUFFER.width) {
            self.flash.buffer[i]
        } else if let Some(k) = field(addr, REMAP.addr, LogicalPin::COUNT) {
            self.remap[k]
        } else if let Some(i) = field(addr, PULL.addr, n) {
            self.pulls[i]
        } else if let Some(i) = field(addr, ADC_RESULT.addr, ADC_RESULT.width) {
            // Full scale when the routed pin is high
            let routed = self.memory.get(&ANALOG_MUX.addr).copied().unwrap_or(REMAP_NC);
            let high = self.seen.get(usize::from(routed)).copied().unwrap_or(false);
            le_byte(if high { 0xFFFF } else { 0 }, i)
        } else if addr == PERIPHERAL_SELECT.addr {
            self.peripheral
        } else if let Some(k) = field(addr, GPIO_OUT_VALUE.addr, GPIO_SLOTS) {
            self.gpio_out[k]
        } else if let Some(k) = field(addr, GPIO_OUT_ENABLE.addr, GPIO_SLOTS) {
            self.gpio_oe[k]
        } else if let Some(k) = field(addr, GPIO_IN.addr, GPIO_SLOTS) {
            u8::from(self.mapped_level(k))
        } else if addr == IO_METRICS_CONTROL.addr {
            u8::from(self.metrics_active)
        } else if let Some(i) = field(
            addr,
            IO_METRICS_SLOT_BASE,
            METRICS_SLOTS * IO_METRICS_SLOT_STRIDE as usize,
        ) {
            let stride = IO_METRICS_SLOT_STRIDE as usize;
            self.metrics[i / stride].byte(i % stride)
        } else {
            self.memory.get(&addr).copied().unwrap_or(0)
        }
    }

    pub(super) fn write_byte(&mut self, addr: u32, value: u8) {
        let n = self.n();
        if addr == RESET.addr {
            self.reset_control(value);
        } else if let Some(i) = field(addr, SCRATCH.addr, SCRATCH.width) {
            self.scratch[i] = value;
        } else if let Some(i) = field(addr, FLASH_ADDR.addr, FLASH_ADDR.width) {
            set_le_byte(&mut self.flash.addr, i, value);
        } else if addr == FLASH_CMD.addr {
            self.flash.command(value);
        } else if let Some(i) = field(addr, FLASH_BUFFER.addr, FLASH_BUFFER.width) {
            self.flash.buffer[i] = value;
        } else if let Some(k) = field(addr, REMAP.addr, LogicalPin::COUNT) {
            self.remap[k] = value;
        } else if let Some(i) = field(addr, PULL.addr, n) {
            self.pulls[i] = value;
        } else if addr == PERIPHERAL_SELECT.addr {
            self.peripheral = value;
        } else if let Some(k) = field(addr, GPIO_OUT_VALUE.addr, GPIO_SLOTS) {
            self.gpio_out[k] = value;
        } else if let Some(k) = field(addr, GPIO_OUT_ENABLE.addr, GPIO_SLOTS) {
            self.gpio_oe[k] = value;
        } else if addr == IO_METRICS_CONTROL.addr {
            if let Ok(ctl) = IoMetricsControl::deserialize([value]) {
                if ctl.reset {
                    self.metrics = [SlotMetrics::default(); METRICS_SLOTS];
                }
                self.metrics_active = ctl.active;
            }
        } else if field(addr, VERSION.addr, 0x18).is_some()
            || addr == FLASH_STATUS.addr
            || field(addr, GPIO_IN.addr, GPIO_SLOTS).is_some()
            || field(addr, ADC_RESULT.addr, ADC_RESULT.width).is_some()
            || field(
                addr,
                IO_METRICS_SLOT_BASE,
                METRICS_SLOTS * IO_METRICS_SLOT_STRIDE as usize,
            )
            .is_some()
        {
            // Read only
        } else {
            self.memory.insert(addr, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_utils::board::Board;

    fn shield() -> Shield {
        let board = Board::builder()
            .form_factor(["A", "B", "C"])
            .build()
            .unwrap();
        Shield::new(&board, 7)
    }

    #[test]
    fn test_slot_metrics_widths() {
        let mut m = SlotMetrics::default();
        m.edge(true, 100);
        m.edge(false, 300);
        m.edge(true, 350);
        m.edge(false, 1350);
        assert_eq!((m.rising, m.falling), (2, 2));
        assert_eq!((m.min_high, m.max_high), (200, 1000));
        assert_eq!((m.min_low, m.max_low), (50, 50));
    }

    #[test]
    fn test_reset_levels() {
        let mut s = shield();
        s.write_byte(REMAP.addr, 1);
        s.write_byte(PULL.addr + 2, 1);
        s.write_byte(GPIO_OUT_ENABLE.addr, 1);
        s.write_byte(0x0010_2010, 0xAA);
        s.write_byte(RESET.addr, 0b10);
        assert_eq!(s.read_byte(REMAP.addr), 1);
        assert_eq!(s.read_byte(PULL.addr + 2), 1);
        assert_eq!(s.read_byte(GPIO_OUT_ENABLE.addr), 0);
        assert_eq!(s.read_byte(0x0010_2010), 0);
        s.write_byte(RESET.addr, 0b1);
        assert_eq!(s.read_byte(REMAP.addr), REMAP_NC);
        assert_eq!(s.read_byte(PULL.addr + 2), 0);
    }

    #[test]
    fn test_read_only() {
        let mut s = shield();
        s.write_byte(VERSION.addr, 0);
        assert_eq!(s.read_byte(VERSION.addr), 7);
    }

    #[test]
    fn test_gpio_drive_needs_gpio_mode() {
        let mut s = shield();
        s.write_byte(REMAP.addr + 1, 2);
        s.write_byte(GPIO_OUT_VALUE.addr + 1, 1);
        s.write_byte(GPIO_OUT_ENABLE.addr + 1, 1);
        assert_eq!(s.gpio_drive(2), Some(true));
        s.write_byte(PERIPHERAL_SELECT.addr, Peripheral::Uart.to_primitive());
        assert_eq!(s.gpio_drive(2), None);
    }
}
