//! Host side of an FPGA test shield: a register-level link carried over a few bit-banged pins of
//! the board under test, automatic placement of that link out of the way of the pins under test,
//! and enumeration of every pin combination a peripheral can be tested on.
//!
//! ```
//! use std::sync::Arc;
//! use testshield::prelude::*;
//!
//! let board = Arc::new(
//!     Board::builder()
//!         .name("DEMO")
//!         .form_factor(["D0", "D1", "D2", "D3", "D4", "D5"])
//!         .build()
//!         .unwrap(),
//! );
//! let shield = Shield::new(&board, 0x0001_0000);
//! let mut tester = Tester::new(shield, board.clone());
//! assert_eq!(tester.version().unwrap(), 0x0001_0000);
//! tester.reset().unwrap();
//! ```

pub mod blocks;
pub mod core;
pub mod orchestrator;
pub mod ports;
pub mod prelude;
pub mod registers;
pub mod sim;
pub mod tester;
pub mod transport;
