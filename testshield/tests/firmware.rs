mod common;

use common::{
    board,
    init_logging,
    VERSION,
};
use indicatif::ProgressBar;
use shield_utils::firmware::Image;
use std::io::Cursor;
use testshield::{
    prelude::*,
    registers::FLASH_SECTOR_SIZE,
    tester::firmware::progress_bar,
    transport::Error,
};

const SLOT: u32 = 2 * FLASH_SECTOR_SIZE;

fn tester() -> Tester<Shield> {
    init_logging();
    let board = board("small.brd");
    let shield = Shield::with_flash_slot(&board, VERSION, SLOT);
    let mut tester = Tester::new(shield, board);
    tester.set_bit_delay_us(0);
    tester.set_flash_poll_us(1);
    tester.set_reprogram_delay_us(0);
    tester
}

fn image(version: u32, len: usize) -> Image {
    let payload = (0..len).map(|i| (i % 251) as u8).collect();
    Image::new(version, payload).unwrap()
}

#[test]
fn test_update_dump_reprogram() -> anyhow::Result<()> {
    let mut tester = tester();
    let image = image(0x0002_0000, 1000);
    let bytes = image.to_bytes();

    let mut percents = vec![];
    let mut record = |p: u8| percents.push(p);
    assert!(tester.firmware_update(&mut Cursor::new(&bytes), Some(&mut record))?);
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] < w[1]));

    let mut dump = vec![];
    assert_eq!(tester.firmware_dump(&mut dump, None)?, bytes.len());
    assert_eq!(dump, bytes);
    assert_eq!(Image::parse(&dump)?.md5(), image.md5());

    // Still the old firmware until reprogrammed
    assert_eq!(tester.version()?, VERSION);
    tester.reprogram()?;
    assert_eq!(*tester.control_mode(), ControlMode::Automatic(None));
    assert_eq!(tester.version()?, 0x0002_0000);
    Ok(())
}

#[test]
fn test_second_update_uses_other_slot() -> anyhow::Result<()> {
    let mut tester = tester();
    let first = image(1, 300).to_bytes();
    let second = image(2, 5000).to_bytes();
    assert!(tester.firmware_update(&mut Cursor::new(&first), None)?);
    assert!(tester.firmware_update(&mut Cursor::new(&second), None)?);
    let mut dump = vec![];
    tester.firmware_dump(&mut dump, None)?;
    assert_eq!(dump, second);
    tester.reprogram()?;
    assert_eq!(tester.version()?, 2);
    Ok(())
}

#[test]
fn test_corrupt_image_rejected() -> anyhow::Result<()> {
    let mut tester = tester();
    let mut bytes = image(3, 700).to_bytes();
    bytes[100] ^= 0x01;
    assert!(!tester.firmware_update(&mut Cursor::new(&bytes), None)?);

    let mut dump = vec![];
    assert_eq!(tester.firmware_dump(&mut dump, None)?, 0);
    assert!(dump.is_empty());
    tester.reprogram()?;
    assert_eq!(tester.version()?, VERSION);
    Ok(())
}

#[test]
fn test_rejection_keeps_active_image() -> anyhow::Result<()> {
    let mut tester = tester();
    let good = image(4, 400).to_bytes();
    assert!(tester.firmware_update(&mut Cursor::new(&good), None)?);
    let mut bad = image(5, 400).to_bytes();
    let last = bad.len() - 1;
    bad[last] ^= 0xFF;
    assert!(!tester.firmware_update(&mut Cursor::new(&bad), None)?);
    let mut dump = vec![];
    tester.firmware_dump(&mut dump, None)?;
    assert_eq!(dump, good);
    Ok(())
}

#[test]
fn test_image_too_large() {
    let mut tester = tester();
    let bytes = image(6, SLOT as usize).to_bytes();
    assert!(matches!(
        tester.firmware_update(&mut Cursor::new(&bytes), None),
        Err(Error::ImageTooLarge { .. })
    ));
}

#[test]
fn test_dump_all() -> anyhow::Result<()> {
    let mut tester = tester();
    let bar = ProgressBar::hidden();
    let mut progress = progress_bar(&bar);
    let mut dump = vec![];
    assert_eq!(
        tester.firmware_dump_all(&mut dump, Some(&mut progress))?,
        2 * SLOT as usize
    );
    assert_eq!(dump.len(), 2 * SLOT as usize);
    assert!(dump.iter().all(|&b| b == 0xFF));
    assert!(bar.is_finished());
    Ok(())
}
