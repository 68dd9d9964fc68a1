#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::Arc,
};
use testshield::prelude::*;
use tracing_subscriber::EnvFilter;

pub const VERSION: u32 = 0x0001_0203;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn board(name: &str) -> Arc<Board> {
    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "tests", "boards", name]
        .iter()
        .collect();
    Arc::new(read_board_file(path).unwrap())
}

pub fn tester(name: &str) -> Tester<Shield> {
    init_logging();
    let board = board(name);
    let shield = Shield::new(&board, VERSION);
    let mut tester = Tester::new(shield, board);
    tester.set_bit_delay_us(0);
    tester.set_flash_poll_us(1);
    tester.set_reprogram_delay_us(0);
    tester
}

pub fn pin(tester: &Tester<Shield>, name: &str) -> PhysicalPin {
    tester.board().pin(name).unwrap()
}
