//! Static descriptions of the board under test: which pins reach the shield, which must never be
//! touched, and which peripheral instance each pin can serve in each role.

pub mod brd;

use crate::pins::{
    PhysicalPin,
    PinList,
};
use kstring::KString;
use std::{
    collections::HashMap,
    path::Path,
};
use thiserror::Error;

/// The largest form factor the shield can address. Index `0xFF` is reserved for "not connected".
pub const MAX_FORM_FACTOR: usize = 0xFF;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Internal system IO error")]
    Io(#[from] std::io::Error),
    #[error("Board description didn't parse, failed near line {0}")]
    Parse(usize),
    #[error("Form factor has {0} pins, the shield addresses at most 255")]
    FormFactorTooLarge(usize),
    #[error("Too many distinct pin names for one board")]
    TooManyPins,
}

/// One row of a [`RoleTable`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RoleEntry {
    pub pin: PhysicalPin,
    /// The peripheral instance (e.g. SPI1 is `1`) this pin connects to in this role
    pub instance: u32,
    /// Vendor specific alternate function code
    pub function: u32,
}

/// The ordered list of pins that can serve one role (e.g. "SPI MOSI") of a peripheral family.
/// Order matters: lookups always return the first matching row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleTable {
    entries: Vec<RoleEntry>,
}

impl RoleTable {
    #[must_use]
    pub fn entries(&self) -> &[RoleEntry] {
        &self.entries
    }

    /// The first row for `pin`, if any
    #[must_use]
    pub fn lookup(&self, pin: PhysicalPin) -> Option<&RoleEntry> {
        self.entries.iter().find(|e| e.pin == pin)
    }

    pub fn push(&mut self, entry: RoleEntry) {
        self.entries.push(entry);
    }
}

/// Everything the test controller knows about one board. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Board {
    name: String,
    names: Vec<KString>,
    lookup: HashMap<KString, PhysicalPin>,
    form_factor: PinList,
    restricted: PinList,
    gpio_unsafe: PinList,
    uart_reserved: Vec<u32>,
    roles: HashMap<KString, RoleTable>,
}

impl Board {
    #[must_use]
    pub fn builder() -> BoardBuilder {
        BoardBuilder::default()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finds a pin by its board name
    #[must_use]
    pub fn pin(&self, name: &str) -> Option<PhysicalPin> {
        self.lookup.get(name).copied()
    }

    /// The board name of `pin`, `"NC"` for the not-connected pin
    #[must_use]
    pub fn pin_name(&self, pin: PhysicalPin) -> &str {
        self.names
            .get(usize::from(pin.id()))
            .map_or("NC", KString::as_str)
    }

    /// The candidate pins, in the order the shield indexes them
    #[must_use]
    pub fn form_factor(&self) -> &PinList {
        &self.form_factor
    }

    /// Pins that must never be driven by the tester (debug, USB, console...)
    #[must_use]
    pub fn restricted(&self) -> &PinList {
        &self.restricted
    }

    /// Pins that can't be used for GPIO tests
    #[must_use]
    pub fn gpio_unsafe(&self) -> &PinList {
        &self.gpio_unsafe
    }

    /// UART instances reserved by the board (e.g. the console)
    #[must_use]
    pub fn uart_reserved(&self) -> &[u32] {
        &self.uart_reserved
    }

    #[must_use]
    pub fn is_restricted(&self, pin: PhysicalPin) -> bool {
        self.restricted.contains(pin)
    }

    /// The index the shield uses for `pin`, if it's part of the form factor
    #[must_use]
    pub fn physical_index(&self, pin: PhysicalPin) -> Option<u8> {
        // Build guarantees the form factor fits in a u8
        self.form_factor
            .index_of(pin)
            .and_then(|i| u8::try_from(i).ok())
    }

    /// The role table named `name` (e.g. `spi_mosi`)
    #[must_use]
    pub fn role_table(&self, name: &str) -> Option<&RoleTable> {
        self.roles.get(name)
    }

    /// Pins of the form factor that could ever carry tester traffic: connected and unrestricted
    pub fn usable_pins(&self) -> impl Iterator<Item = PhysicalPin> + '_ {
        self.form_factor
            .iter()
            .filter(move |&p| !p.is_nc() && !self.is_restricted(p))
    }
}

/// Incremental construction of a [`Board`], used by the `.brd` parser and by tests
#[derive(Debug, Default)]
pub struct BoardBuilder {
    board: Board,
    overflow: bool,
}

impl BoardBuilder {
    fn intern(&mut self, name: &str) -> PhysicalPin {
        if name.eq_ignore_ascii_case("NC") {
            return PhysicalPin::NC;
        }
        if let Some(pin) = self.board.lookup.get(name) {
            return *pin;
        }
        match u16::try_from(self.board.names.len()) {
            Ok(id) if id != u16::MAX => {
                let pin = PhysicalPin::from_id(id);
                let name: KString = KString::from_ref(name);
                self.board.names.push(name.clone());
                self.board.lookup.insert(name, pin);
                pin
            }
            _ => {
                self.overflow = true;
                PhysicalPin::NC
            }
        }
    }

    fn intern_list<I, S>(&mut self, pins: I) -> Vec<PhysicalPin>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        pins.into_iter().map(|p| self.intern(p.as_ref())).collect()
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.board.name = name.to_owned();
        self
    }

    /// Appends pins to the form factor. `"NC"` keeps a placeholder slot.
    #[must_use]
    pub fn form_factor<I, S>(mut self, pins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pin in self.intern_list(pins) {
            self.board.form_factor.push(pin);
        }
        self
    }

    #[must_use]
    pub fn restricted<I, S>(mut self, pins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pin in self.intern_list(pins) {
            self.board.restricted.push(pin);
        }
        self
    }

    #[must_use]
    pub fn gpio_unsafe<I, S>(mut self, pins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pin in self.intern_list(pins) {
            self.board.gpio_unsafe.push(pin);
        }
        self
    }

    #[must_use]
    pub fn uart_reserved<I>(mut self, instances: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        self.board.uart_reserved.extend(instances);
        self
    }

    /// Appends a row to the role table `table`
    #[must_use]
    pub fn role(mut self, table: &str, pin: &str, instance: u32, function: u32) -> Self {
        let pin = self.intern(pin);
        self.board
            .roles
            .entry(KString::from_ref(table))
            .or_default()
            .push(RoleEntry {
                pin,
                instance,
                function,
            });
        self
    }

    /// Finish the board
    /// # Errors
    /// Returns an error if the form factor is too large for the shield to index or the board
    /// names more pins than an id can hold
    pub fn build(self) -> Result<Board, Error> {
        if self.overflow {
            return Err(Error::TooManyPins);
        }
        if self.board.form_factor.len() > MAX_FORM_FACTOR {
            return Err(Error::FormFactorTooLarge(self.board.form_factor.len()));
        }
        Ok(self.board)
    }
}

/// Reads a board description (`.brd`) file
/// # Errors
/// Returns an error on IO errors or malformed descriptions
pub fn read_board_file<T>(filename: T) -> Result<Board, Error>
where
    T: AsRef<Path>,
{
    let contents = std::fs::read_to_string(filename)?;
    brd::parse_board(&contents)
}
