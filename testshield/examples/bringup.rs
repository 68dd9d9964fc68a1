//! In this example, we bring up a (simulated) shield on an Arduino style board: talk to it, check
//! every control channel, then load and boot a new firmware image.

use indicatif::ProgressBar;
use shield_utils::firmware::Image;
use std::{
    io::Cursor,
    sync::Arc,
};
use testshield::{
    prelude::*,
    tester::firmware::progress_bar,
};
use tracing_subscriber::EnvFilter;

const BOARD: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/boards/arduino.brd");

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let board = Arc::new(read_board_file(BOARD)?);
    let shield = Shield::new(&board, 0x0001_0000);
    let mut tester = Tester::new(shield, board.clone());

    println!("Shield firmware version: {:#010x}", tester.version()?);
    if let Some(pins) = tester.control_mode().pins() {
        let names: Vec<_> = pins.pins().iter().map(|p| board.pin_name(*p)).collect();
        println!("Control channel on {}", names.join(", "));
    }

    if !tester.self_test_all()? {
        anyhow::bail!("Control channel self test failed");
    }

    let image = Image::new(0x0001_0100, (0..20_000u32).map(|i| (i * 31) as u8).collect())?;
    println!("Uploading firmware {}", image.md5_string());
    let bar = ProgressBar::new(100);
    let mut progress = progress_bar(&bar);
    if !tester.firmware_update(&mut Cursor::new(image.to_bytes()), Some(&mut progress))? {
        anyhow::bail!("The shield rejected the image");
    }
    tester.reprogram()?;
    println!("Rebooted into version {:#010x}", tester.version()?);
    Ok(())
}
