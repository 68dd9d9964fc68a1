//! Physical pin identifiers and ordered pin lists

use std::fmt::Display;

/// An opaque identifier for a pin on the board under test.
///
/// Pins are interned by a [`crate::board::Board`], so two pins compare equal exactly when they
/// name the same board pin. [`PhysicalPin::NC`] stands for "not connected".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalPin(u16);

impl PhysicalPin {
    /// The "not connected" pin
    pub const NC: Self = Self(u16::MAX);

    /// Build a pin from its interned id
    #[must_use]
    pub const fn from_id(id: u16) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_nc(self) -> bool {
        self.0 == u16::MAX
    }
}

impl Default for PhysicalPin {
    fn default() -> Self {
        Self::NC
    }
}

impl Display for PhysicalPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_nc() {
            write!(f, "NC")
        } else {
            write!(f, "P{}", self.0)
        }
    }
}

/// An ordered, immutable list of pins, such as a form factor or a restricted list.
///
/// The position of a pin inside a form factor list is the index the FPGA uses for it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PinList {
    pins: Vec<PhysicalPin>,
}

impl PinList {
    #[must_use]
    pub fn new(pins: Vec<PhysicalPin>) -> Self {
        Self { pins }
    }

    /// Membership test. `NC` is never a member, even if the list holds `NC` placeholders.
    #[must_use]
    pub fn contains(&self, pin: PhysicalPin) -> bool {
        !pin.is_nc() && self.pins.contains(&pin)
    }

    /// The position of `pin` in this list
    #[must_use]
    pub fn index_of(&self, pin: PhysicalPin) -> Option<usize> {
        if pin.is_nc() {
            return None;
        }
        self.pins.iter().position(|&p| p == pin)
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<PhysicalPin> {
        self.pins.get(idx).copied()
    }

    /// Ordered enumeration, including any `NC` placeholders
    pub fn iter(&self) -> impl Iterator<Item = PhysicalPin> + '_ {
        self.pins.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub(crate) fn push(&mut self, pin: PhysicalPin) {
        self.pins.push(pin);
    }
}

impl FromIterator<PhysicalPin> for PinList {
    fn from_iter<T: IntoIterator<Item = PhysicalPin>>(iter: T) -> Self {
        Self {
            pins: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PinList {
    type Item = PhysicalPin;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, PhysicalPin>>;

    fn into_iter(self) -> Self::IntoIter {
        self.pins.iter().copied()
    }
}
