mod common;

use common::{
    pin,
    tester,
    VERSION,
};
use testshield::{
    prelude::*,
    registers::REMAP_NC,
    transport::Error,
};

fn control_names(tester: &Tester<Shield>) -> Vec<String> {
    tester
        .control_mode()
        .pins()
        .map(|pins| {
            pins.pins()
                .iter()
                .map(|p| tester.board().pin_name(*p).to_owned())
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn test_mapping_relocates_control_channel() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    tester.version()?;
    assert_eq!(control_names(&tester), ["A", "B", "C", "D"]);

    let a = pin(&tester, "A");
    tester.pin_map_set(a, LogicalPin::GPIO0)?;
    assert_eq!(control_names(&tester), ["B", "C", "D", "E"]);
    assert_eq!(tester.bus_mut().remap()[0], 0);
    assert_eq!(tester.bus_mut().host_drive(a), None);
    // Still talking after the move
    assert_eq!(tester.version()?, VERSION);
    Ok(())
}

#[test]
fn test_first_mapping_allocates_around_pin() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let b = pin(&tester, "B");
    tester.pin_map_set(b, LogicalPin::GPIO1)?;
    assert_eq!(control_names(&tester), ["A", "C", "D", "E"]);
    Ok(())
}

#[test]
fn test_mapped_pins_leave_pool() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    for (name, logical) in [("A", LogicalPin::GPIO0), ("B", LogicalPin::GPIO1)] {
        let p = pin(&tester, name);
        tester.pin_map_set(p, logical)?;
    }
    tester.set_control_pins_auto();
    tester.version()?;
    assert_eq!(control_names(&tester), ["C", "D", "E", "F"]);

    // Nothing left to move to
    let c = pin(&tester, "C");
    assert!(matches!(
        tester.pin_map_set(c, LogicalPin::GPIO2),
        Err(Error::NoControlPins)
    ));
    Ok(())
}

#[test]
fn test_manual_pins_conflict() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let [c, d, e, f] = ["C", "D", "E", "F"].map(|n| pin(&tester, n));
    tester.set_control_pins_manual(c, d, e, f)?;
    assert!(tester.control_mode().is_manual());
    assert_eq!(tester.version()?, VERSION);

    assert!(matches!(
        tester.pin_map_set(e, LogicalPin::GPIO0),
        Err(Error::ControlPinConflict(name)) if name == "E"
    ));
    assert_eq!(tester.bus_mut().remap()[0], REMAP_NC);
    // Manual mode never moves
    assert_eq!(control_names(&tester), ["C", "D", "E", "F"]);

    let a = pin(&tester, "A");
    tester.pin_map_set(a, LogicalPin::GPIO0)?;
    assert_eq!(tester.bus_mut().remap()[0], 0);
    Ok(())
}

#[test]
fn test_manual_pin_validation() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let [a, b, c, d] = ["A", "B", "C", "D"].map(|n| pin(&tester, n));
    assert!(matches!(
        tester.set_control_pins_manual(a, b, c, a),
        Err(Error::ControlPinConflict(_))
    ));
    assert!(matches!(
        tester.set_control_pins_manual(a, b, c, PhysicalPin::NC),
        Err(Error::NotInFormFactor(_))
    ));
    tester.pin_map_set(d, LogicalPin::GPIO0)?;
    assert!(matches!(
        tester.set_control_pins_manual(a, b, c, d),
        Err(Error::ControlPinConflict(_))
    ));
    Ok(())
}

#[test]
fn test_restricted_never_mapped() {
    let mut tester = tester("arduino.brd");
    let d13 = pin(&tester, "D13");
    assert!(matches!(
        tester.pin_map_set(d13, LogicalPin::GPIO0),
        Err(Error::RestrictedPin(_))
    ));
    assert_eq!(tester.bus_mut().frames(), 0);
}

#[test]
fn test_broken_pin_skipped() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let a = pin(&tester, "A");
    tester.bus_mut().break_pin(a);
    assert_eq!(tester.version()?, VERSION);
    assert_eq!(control_names(&tester), ["B", "C", "D", "E"]);
    Ok(())
}

#[test]
fn test_mux_exclusivity() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let e = pin(&tester, "E");
    let f = pin(&tester, "F");
    tester.pin_map_set(e, LogicalPin::GPIO0)?;
    tester.pin_map_set(e, LogicalPin::GPIO1)?;
    let remap = tester.bus_mut().remap();
    assert_eq!(remap[0], REMAP_NC);
    assert_eq!(remap[1], 4);
    assert!(tester.mapped(LogicalPin::GPIO0).is_nc());
    assert_eq!(tester.mapped(LogicalPin::GPIO1), e);

    // Replacing the pin of a slot
    tester.pin_map_set(f, LogicalPin::GPIO1)?;
    assert_eq!(tester.bus_mut().remap()[1], 5);
    assert_eq!(
        tester.bus_mut().remap().iter().filter(|&&i| i != REMAP_NC).count(),
        1
    );

    tester.pin_map_set(PhysicalPin::NC, LogicalPin::GPIO1)?;
    assert_eq!(tester.bus_mut().remap(), [REMAP_NC; 16]);
    Ok(())
}

#[test]
fn test_map_by_index() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let f = pin(&tester, "F");
    assert!(matches!(
        tester.pin_map_set_index(f, 16),
        Err(Error::BadLogicalPin(16))
    ));
    tester.pin_map_set_index(f, 15)?;
    assert_eq!(tester.mapped(LogicalPin::IO_METRICS7), f);

    tester.pin_map_reset()?;
    assert_eq!(tester.bus_mut().remap(), [REMAP_NC; 16]);
    assert!(tester.mapped(LogicalPin::IO_METRICS7).is_nc());
    Ok(())
}

#[test]
fn test_dead_first_pin_costs_few_handshakes() -> anyhow::Result<()> {
    let bus_time = |broken: Option<&str>| -> anyhow::Result<(u64, Vec<String>)> {
        let mut tester = tester("arduino.brd");
        tester.set_bit_delay_us(1);
        if let Some(name) = broken {
            let p = pin(&tester, name);
            tester.bus_mut().break_pin(p);
        }
        tester.version()?;
        Ok((tester.bus_mut().now(), control_names(&tester)))
    };
    let (healthy, names) = bus_time(None)?;
    assert_eq!(names, ["D0", "D1", "D2", "D3"]);
    let (broken, names) = bus_time(Some("D0"))?;
    assert_eq!(names, ["D1", "D2", "D3", "D4"]);
    // A dead clk candidate is ruled out by one handshake per pair
    assert!(
        broken < 20 * healthy,
        "{broken} ticks against {healthy} on a healthy board"
    );
    Ok(())
}

#[test]
fn test_broken_middle_pin_skipped() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let c = pin(&tester, "C");
    tester.bus_mut().break_pin(c);
    assert_eq!(tester.version()?, VERSION);
    assert_eq!(control_names(&tester), ["A", "B", "D", "E"]);
    Ok(())
}
