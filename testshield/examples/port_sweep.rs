//! In this example, we walk every GPIO capable port of an Arduino style board, make the shield
//! drive it and check the level the board sees.

use std::sync::Arc;
use testshield::{
    blocks::gpio::Gpio,
    prelude::*,
};
use tracing_subscriber::EnvFilter;

const BOARD: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/boards/arduino.brd");

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let board = Arc::new(read_board_file(BOARD)?);
    let mut tester = Tester::new(Shield::new(&board, 0x0001_0000), board.clone());
    let desc = PortDescriptor::for_family(&board, Family::Gpio);

    let report = Orchestrator::new(&board, &desc).run(Coverage::AllPorts, |port| {
        let pin = port.pin(0);
        tester.pin_map_set(pin, LogicalPin::GPIO0)?;
        for level in [true, false] {
            let mut gpio = Gpio::new(&mut tester);
            gpio.write(LogicalPin::GPIO0, level)?;
            gpio.set_output_enable(LogicalPin::GPIO0, true)?;
            anyhow::ensure!(tester.bus_mut().input(pin) == level, "level mismatch");
        }
        tester.reset()?;
        Ok(())
    });

    println!(
        "{}: {} ports, {} executed, {} failed",
        report.family,
        report.matched.len(),
        report.executed,
        report.failures
    );
    for line in &report.lines {
        println!("  {line}");
    }
    Ok(())
}
