mod common;

use common::{
    pin,
    tester,
    VERSION,
};
use paste::paste;
use testshield::{
    core::Register,
    prelude::*,
    registers::{
        REMAP_NC,
        SCRATCH,
        SPI_SLAVE_BASE,
    },
    transport::Error,
};

#[test]
fn test_version_over_the_wire() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    assert_eq!(tester.version()?, VERSION);
    let pins = *tester.control_mode().pins().unwrap();
    let names: Vec<&str> = pins
        .pins()
        .iter()
        .map(|p| tester.board().pin_name(*p))
        .collect();
    assert_eq!(names, vec!["A", "B", "C", "D"]);
    Ok(())
}

macro_rules! test_roundtrip {
    ($num:ty, $value:expr) => {
        paste! {
            #[test]
            fn [<test_roundtrip_ $num>]() -> anyhow::Result<()> {
                let mut tester = tester("small.brd");
                let reg = Register::new(SPI_SLAVE_BASE + 0x20, std::mem::size_of::<$num>());
                let value: $num = $value;
                tester.write_reg(reg, &value)?;
                let echo: $num = tester.read_reg(reg)?;
                assert_eq!(echo, value);
                Ok(())
            }
        }
    };
}

test_roundtrip!(u8, 0xA5);
test_roundtrip!(u16, 0xBEEF);
test_roundtrip!(u32, 0xDEAD_BEEF);

#[test]
fn test_width_checked_before_sending() {
    let mut tester = tester("small.brd");
    assert!(matches!(
        tester.write_reg(SCRATCH, &1u16),
        Err(Error::WidthMismatch { .. })
    ));
    assert_eq!(tester.bus_mut().frames(), 0);
}

#[test]
fn test_every_pair_round_trips() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let pool: Vec<PhysicalPin> = tester.board().usable_pins().collect();
    for (clk, mosi) in tester.candidate_pairs() {
        let mut rest = pool.iter().copied().filter(|&p| p != clk && p != mosi);
        let miso = rest.next().unwrap();
        let aux = rest.next().unwrap();
        tester.set_control_pins_manual(clk, mosi, miso, aux)?;
        let value = u32::from(clk.id()) << 16 | u32::from(mosi.id());
        tester.write_reg(SCRATCH, &value)?;
        assert_eq!(tester.read_reg::<u32, 4>(SCRATCH)?, value);
    }
    assert_eq!(tester.candidate_pairs().len(), 6 * 5);
    Ok(())
}

#[test]
fn test_long_transfer() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let data: Vec<u8> = (0..600u32).map(|i| (i * 7) as u8).collect();
    tester.write_bytes(SPI_SLAVE_BASE + 0x100, &data)?;
    assert_eq!(tester.read_n_bytes(SPI_SLAVE_BASE + 0x100, data.len())?, data);
    Ok(())
}

#[test]
fn test_reset_is_idempotent() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    let c = pin(&tester, "C");
    tester.pin_map_set(c, LogicalPin::GPIO3)?;
    let f = pin(&tester, "F");
    tester.pin_set_pull(f, PullMode::Up)?;
    tester.select_peripheral(Peripheral::Uart)?;

    tester.reset()?;
    let once = (
        *tester.control_mode(),
        tester.bus_mut().remap(),
        tester.bus_mut().pull(f),
        tester.peripheral(),
    );
    tester.reset()?;
    let twice = (
        *tester.control_mode(),
        tester.bus_mut().remap(),
        tester.bus_mut().pull(f),
        tester.peripheral(),
    );
    assert_eq!(once, twice);
    assert_eq!(once.0, ControlMode::Automatic(None));
    assert_eq!(once.1, [REMAP_NC; 16]);
    assert_eq!(once.2, Some(0));
    assert_eq!(once.3, Peripheral::Gpio);
    assert!(tester.mapped(LogicalPin::GPIO3).is_nc());
    Ok(())
}

#[test]
fn test_reset_floats_every_pin() -> anyhow::Result<()> {
    let mut tester = tester("small.brd");
    tester.version()?;
    tester.reset()?;
    let pins: Vec<PhysicalPin> = tester.board().usable_pins().collect();
    for p in pins {
        assert_eq!(tester.bus_mut().host_drive(p), None);
    }
    Ok(())
}

#[test]
fn test_no_control_pins() {
    let mut tester = tester("tiny.brd");
    let a = pin(&tester, "A");
    let b = pin(&tester, "B");
    assert_eq!(tester.candidate_pairs(), vec![(a, b), (b, a)]);
    assert!(matches!(tester.version(), Err(Error::NoControlPins)));
    // The restricted pin was never touched
    let c = pin(&tester, "C");
    assert_eq!(tester.bus_mut().host_drive(c), None);
}
