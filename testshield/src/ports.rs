//! Peripheral port descriptors and the pin matching algorithm.
//!
//! A [`Port`] is one testable configuration of a peripheral family: a pin for every role (MOSI,
//! MISO, ...) all belonging to the same peripheral instance. [`find_ports`] enumerates every port
//! a board offers for a [`PortDescriptor`], in a fixed, reproducible order.

use kstring::KString;
use shield_utils::{
    board::{
        Board,
        RoleTable,
    },
    pins::PhysicalPin,
};
use std::cmp::Ordering;
use tracing::warn;

/// Most roles any peripheral family has
pub const MAX_ROLES: usize = 4;

/// Answers "which instance does this pin serve in this role"
pub trait RoleResolver {
    /// The instance `pin` connects to in this role, if any. First match wins.
    fn instance(&self, pin: PhysicalPin) -> Option<u32>;

    /// The first pin, in table order, that serves `instance` in this role and satisfies `usable`
    fn find(&self, instance: u32, usable: &dyn Fn(PhysicalPin) -> bool) -> Option<PhysicalPin>;
}

impl RoleResolver for RoleTable {
    fn instance(&self, pin: PhysicalPin) -> Option<u32> {
        self.lookup(pin).map(|e| e.instance)
    }

    fn find(&self, instance: u32, usable: &dyn Fn(PhysicalPin) -> bool) -> Option<PhysicalPin> {
        self.entries()
            .iter()
            .find(|e| e.instance == instance && usable(e.pin))
            .map(|e| e.pin)
    }
}

impl<R: RoleResolver + ?Sized> RoleResolver for &R {
    fn instance(&self, pin: PhysicalPin) -> Option<u32> {
        (**self).instance(pin)
    }

    fn find(&self, instance: u32, usable: &dyn Fn(PhysicalPin) -> bool) -> Option<PhysicalPin> {
        (**self).find(instance, usable)
    }
}

/// GPIO works on any pin; each pin is its own instance
#[derive(Debug, Copy, Clone, Default)]
pub struct AnyPin;

impl RoleResolver for AnyPin {
    fn instance(&self, pin: PhysicalPin) -> Option<u32> {
        (!pin.is_nc()).then(|| u32::from(pin.id()))
    }

    fn find(&self, instance: u32, usable: &dyn Fn(PhysicalPin) -> bool) -> Option<PhysicalPin> {
        let pin = PhysicalPin::from_id(u16::try_from(instance).ok()?);
        (!pin.is_nc() && usable(pin)).then_some(pin)
    }
}

/// A role no pin of the board can serve
#[derive(Debug, Copy, Clone, Default)]
pub struct NoPins;

impl RoleResolver for NoPins {
    fn instance(&self, _pin: PhysicalPin) -> Option<u32> {
        None
    }

    fn find(&self, _instance: u32, _usable: &dyn Fn(PhysicalPin) -> bool) -> Option<PhysicalPin> {
        None
    }
}

/// The peripheral families the orchestrator knows how to enumerate
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Family {
    Gpio,
    GpioIrq,
    AnalogIn,
    AnalogOut,
    Pwm,
    Spi,
    /// SPI with software chip select
    SpiNoCs,
    SpiSlave,
    Uart,
    /// UART without flow control
    UartNoFc,
    I2c,
}

impl Family {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Family::Gpio => "GPIO",
            Family::GpioIrq => "GPIO_IRQ",
            Family::AnalogIn => "AnalogIn",
            Family::AnalogOut => "AnalogOut",
            Family::Pwm => "PWM",
            Family::Spi => "SPI",
            Family::SpiNoCs => "SPINoCS",
            Family::SpiSlave => "SPISlave",
            Family::Uart => "UART",
            Family::UartNoFc => "UARTNoFC",
            Family::I2c => "I2C",
        }
    }

    /// The role tables, by name, a board provides for this family. The GPIO role isn't backed by
    /// a table.
    #[must_use]
    pub fn role_names(self) -> &'static [&'static str] {
        match self {
            Family::Gpio => &["gpio"],
            Family::GpioIrq => &["gpio_irq"],
            Family::AnalogIn => &["analogin"],
            Family::AnalogOut => &["analogout"],
            Family::Pwm => &["pwm"],
            Family::Spi => &["spi_mosi", "spi_miso", "spi_sclk", "spi_ssel"],
            Family::SpiNoCs => &["spi_mosi", "spi_miso", "spi_sclk"],
            Family::SpiSlave => &[
                "spi_slave_mosi",
                "spi_slave_miso",
                "spi_slave_sclk",
                "spi_slave_ssel",
            ],
            Family::Uart => &["uart_tx", "uart_rx", "uart_cts", "uart_rts"],
            Family::UartNoFc => &["uart_tx", "uart_rx"],
            Family::I2c => &["i2c_sda", "i2c_scl"],
        }
    }
}

/// Everything the matcher needs to know about one peripheral family on one board
pub struct PortDescriptor<'b> {
    name: KString,
    role_names: Vec<KString>,
    resolvers: Vec<Box<dyn RoleResolver + 'b>>,
    excluded_pins: Vec<PhysicalPin>,
    excluded_instances: Vec<u32>,
    /// Roles past [`MAX_ROLES`]. A descriptor with any can never match.
    dropped_roles: usize,
}

impl std::fmt::Debug for PortDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortDescriptor")
            .field("name", &self.name)
            .field("role_names", &self.role_names)
            .field("excluded_pins", &self.excluded_pins)
            .field("excluded_instances", &self.excluded_instances)
            .field("dropped_roles", &self.dropped_roles)
            .finish_non_exhaustive()
    }
}

impl<'b> PortDescriptor<'b> {
    /// A descriptor with no roles yet
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: KString::from_ref(name),
            role_names: vec![],
            resolvers: vec![],
            excluded_pins: vec![],
            excluded_instances: vec![],
            dropped_roles: 0,
        }
    }

    /// The standard descriptor of `family` on `board`, with the family's exclusions: GPIO
    /// families skip the board's GPIO-unsafe pins and UART families skip reserved instances.
    #[must_use]
    pub fn for_family(board: &'b Board, family: Family) -> Self {
        let mut desc = Self::new(family.name());
        for &role in family.role_names() {
            desc = match (family, board.role_table(role)) {
                (Family::Gpio, _) => desc.role(role, AnyPin),
                (_, Some(table)) => desc.role(role, table),
                (_, None) => desc.role(role, NoPins),
            };
        }
        match family {
            Family::Gpio | Family::GpioIrq => desc.exclude_pins(board.gpio_unsafe().iter()),
            Family::Uart | Family::UartNoFc => {
                desc.exclude_instances(board.uart_reserved().iter().copied())
            }
            _ => desc,
        }
    }

    /// Append a role. Ports have room for [`MAX_ROLES`] pins; past that the role is dropped and
    /// every port of this descriptor is reported unmatched.
    #[must_use]
    pub fn role<R: RoleResolver + 'b>(mut self, name: &str, resolver: R) -> Self {
        if self.resolvers.len() < MAX_ROLES {
            self.role_names.push(KString::from_ref(name));
            self.resolvers.push(Box::new(resolver));
        } else {
            warn!("{}: no room for role {name}", self.name);
            self.dropped_roles += 1;
        }
        self
    }

    #[must_use]
    pub fn exclude_pins<I: IntoIterator<Item = PhysicalPin>>(mut self, pins: I) -> Self {
        self.excluded_pins.extend(pins);
        self
    }

    #[must_use]
    pub fn exclude_instances<I: IntoIterator<Item = u32>>(mut self, instances: I) -> Self {
        self.excluded_instances.extend(instances);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn role_count(&self) -> usize {
        self.resolvers.len()
    }

    #[must_use]
    pub fn role_names(&self) -> &[KString] {
        &self.role_names
    }

    /// Roles that didn't fit in a port
    #[must_use]
    pub fn dropped_roles(&self) -> usize {
        self.dropped_roles
    }

    fn pin_excluded(&self, pin: PhysicalPin) -> bool {
        self.excluded_pins.contains(&pin)
    }

    fn instance_excluded(&self, instance: u32) -> bool {
        self.excluded_instances.contains(&instance)
    }
}

/// Test outcome of a port within one enumeration pass
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    NotTested,
    Pass,
    Fail,
}

/// One pin per role of a peripheral, plus the instance they all belong to
#[derive(Debug, Copy, Clone)]
pub struct Port {
    pins: [PhysicalPin; MAX_ROLES],
    role_count: usize,
    instance: Option<u32>,
    pub status: Status,
}

impl Port {
    #[must_use]
    pub fn new(role_count: usize) -> Self {
        Self {
            pins: [PhysicalPin::NC; MAX_ROLES],
            role_count: role_count.min(MAX_ROLES),
            instance: None,
            status: Status::NotTested,
        }
    }

    /// The pin for each role, in role order
    #[must_use]
    pub fn pins(&self) -> &[PhysicalPin] {
        &self.pins[..self.role_count]
    }

    #[must_use]
    pub fn pin(&self, role: usize) -> PhysicalPin {
        self.pins().get(role).copied().unwrap_or(PhysicalPin::NC)
    }

    #[must_use]
    pub fn instance(&self) -> Option<u32> {
        self.instance
    }

    /// Every role resolved to a real pin of a known instance
    #[must_use]
    pub fn is_matched(&self) -> bool {
        self.instance.is_some() && self.pins().iter().all(|p| !p.is_nc())
    }

    #[must_use]
    pub fn uses(&self, pin: PhysicalPin) -> bool {
        !pin.is_nc() && self.pins().contains(&pin)
    }

    /// `FAMILY (role=PIN, ...) instance N` with board pin names
    #[must_use]
    pub fn describe(&self, board: &Board, desc: &PortDescriptor) -> String {
        let roles: Vec<String> = self
            .pins()
            .iter()
            .enumerate()
            .map(|(i, pin)| {
                let role = desc.role_names().get(i).map_or("?", KString::as_str);
                format!("{role}={}", board.pin_name(*pin))
            })
            .collect();
        let instance = match self.instance {
            Some(instance) => format!("instance {instance}"),
            None => "no instance".to_owned(),
        };
        format!("{} ({}) {instance}", desc.name(), roles.join(", "))
    }
}

/// Equality ignores the test status
impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.instance == other.instance && self.pins() == other.pins()
    }
}

impl Eq for Port {}

impl PartialOrd for Port {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by instance, then pins
impl Ord for Port {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instance
            .cmp(&other.instance)
            .then_with(|| self.pins().cmp(other.pins()))
    }
}

/// The outcome of one matching pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matches {
    /// Complete ports, in discovery order
    pub matched: Vec<Port>,
    /// Ports missing a pin, in discovery order. Never executed.
    pub unmatched: Vec<Port>,
}

/// Enumerate every port of `desc` on `board`.
///
/// Form factor pins are visited in order and tried in every role. A pin that resolves to an
/// instance seeds a port; the other roles are filled from their tables, first match in table
/// order, skipping pins that are unusable or already in the port. Identical ports are reported
/// once.
#[must_use]
pub fn find_ports(board: &Board, desc: &PortDescriptor) -> Matches {
    let usable = |pin: PhysicalPin| {
        board.form_factor().contains(pin) && !board.is_restricted(pin) && !desc.pin_excluded(pin)
    };
    let mut found = Matches::default();
    for pin in board.form_factor().iter() {
        if !usable(pin) {
            continue;
        }
        for (role, resolver) in desc.resolvers.iter().enumerate() {
            let Some(instance) = resolver.instance(pin) else {
                continue;
            };
            if desc.instance_excluded(instance) {
                continue;
            }
            let mut port = Port::new(desc.role_count());
            port.instance = Some(instance);
            port.pins[role] = pin;
            for (other, resolver) in desc.resolvers.iter().enumerate() {
                if other == role {
                    continue;
                }
                let taken = port.pins;
                port.pins[other] = resolver
                    .find(instance, &|q| usable(q) && !taken.contains(&q))
                    .unwrap_or(PhysicalPin::NC);
            }
            let list = if port.is_matched() && desc.dropped_roles == 0 {
                &mut found.matched
            } else {
                &mut found.unmatched
            };
            if !list.contains(&port) {
                list.push(port);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nucleo() -> Board {
        Board::builder()
            .name("TEST")
            .form_factor(["D0", "D1", "D2", "D3", "D4", "D5", "D6", "D7"])
            .restricted(["D7"])
            .gpio_unsafe(["D5"])
            .uart_reserved([2])
            .role("spi_mosi", "D1", 1, 5)
            .role("spi_mosi", "D4", 2, 5)
            .role("spi_miso", "D2", 1, 5)
            .role("spi_miso", "D5", 2, 5)
            .role("spi_sclk", "D3", 1, 5)
            .role("spi_sclk", "D6", 2, 5)
            .role("spi_ssel", "D0", 1, 5)
            .role("spi_ssel", "D7", 2, 5)
            .role("uart_tx", "D0", 1, 7)
            .role("uart_tx", "D4", 2, 7)
            .role("uart_rx", "D1", 1, 7)
            .role("uart_rx", "D5", 2, 7)
            .build()
            .unwrap()
    }

    #[test]
    fn test_spi_matching() {
        let board = nucleo();
        let desc = PortDescriptor::for_family(&board, Family::Spi);
        let found = find_ports(&board, &desc);
        assert_eq!(found.matched.len(), 1);
        let port = found.matched[0];
        assert_eq!(port.instance(), Some(1));
        let names: Vec<&str> = port.pins().iter().map(|p| board.pin_name(*p)).collect();
        assert_eq!(names, vec!["D1", "D2", "D3", "D0"]);
        // SPI2 needs the restricted D7 for SSEL
        assert_eq!(found.unmatched.len(), 1);
        assert_eq!(found.unmatched[0].instance(), Some(2));
        assert!(found.unmatched[0].pin(3).is_nc());
    }

    #[test]
    fn test_spi_no_cs_matches_both() {
        let board = nucleo();
        let desc = PortDescriptor::for_family(&board, Family::SpiNoCs);
        let found = find_ports(&board, &desc);
        let instances: Vec<Option<u32>> = found.matched.iter().map(Port::instance).collect();
        assert_eq!(instances, vec![Some(1), Some(2)]);
        assert!(found.unmatched.is_empty());
    }

    #[test]
    fn test_uart_reserved_instance() {
        let board = nucleo();
        let desc = PortDescriptor::for_family(&board, Family::UartNoFc);
        let found = find_ports(&board, &desc);
        assert!(found.matched.iter().all(|p| p.instance() == Some(1)));
        assert_eq!(found.matched.len(), 1);
    }

    #[test]
    fn test_gpio_unsafe_and_restricted() {
        let board = nucleo();
        let desc = PortDescriptor::for_family(&board, Family::Gpio);
        let found = find_ports(&board, &desc);
        let names: Vec<&str> = found
            .matched
            .iter()
            .map(|p| board.pin_name(p.pin(0)))
            .collect();
        assert_eq!(names, vec!["D0", "D1", "D2", "D3", "D4", "D6"]);
    }

    #[test]
    fn test_missing_table_is_unmatched() {
        let board = nucleo();
        let desc = PortDescriptor::for_family(&board, Family::I2c);
        assert_eq!(find_ports(&board, &desc), Matches::default());
    }

    #[test]
    fn test_deterministic() {
        let board = nucleo();
        let desc = PortDescriptor::for_family(&board, Family::Uart);
        assert_eq!(find_ports(&board, &desc), find_ports(&board, &desc));
    }

    #[test]
    fn test_fifth_role_never_matches() {
        let board = Board::builder()
            .name("WIDE")
            .form_factor(["P0", "P1", "P2", "P3", "P4"])
            .role("r0", "P0", 1, 0)
            .role("r1", "P1", 1, 0)
            .role("r2", "P2", 1, 0)
            .role("r3", "P3", 1, 0)
            .build()
            .unwrap();
        let table = |name| board.role_table(name).unwrap();
        let four = || {
            PortDescriptor::new("WIDE")
                .role("r0", table("r0"))
                .role("r1", table("r1"))
                .role("r2", table("r2"))
                .role("r3", table("r3"))
        };
        assert_eq!(find_ports(&board, &four()).matched.len(), 1);

        let five = four().role("r4", NoPins);
        assert_eq!(five.dropped_roles(), 1);
        assert_eq!(five.role_count(), MAX_ROLES);
        let found = find_ports(&board, &five);
        assert!(found.matched.is_empty());
        assert_eq!(found.unmatched.len(), 1);
    }

    #[test]
    fn test_describe() {
        let board = nucleo();
        let desc = PortDescriptor::for_family(&board, Family::UartNoFc);
        let found = find_ports(&board, &desc);
        assert_eq!(
            found.matched[0].describe(&board, &desc),
            "UARTNoFC (uart_tx=D0, uart_rx=D1) instance 1"
        );
        assert_eq!(
            Port::new(1).describe(&board, &desc),
            "UARTNoFC (uart_tx=NC) no instance"
        );
    }

    #[test]
    fn test_port_equality_ignores_status() {
        let mut a = Port::new(2);
        a.instance = Some(1);
        a.pins[0] = PhysicalPin::from_id(3);
        let mut b = a;
        b.status = Status::Fail;
        assert_eq!(a, b);
        b.pins[1] = PhysicalPin::from_id(4);
        assert_ne!(a, b);
        assert!(a < b);
    }
}
