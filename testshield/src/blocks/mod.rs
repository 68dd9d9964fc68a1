//! Typed access to the shield's register blocks.
//!
//! Each block borrows a [`crate::transport::Transport`] for as long as it is used, so the same
//! code runs against a [`crate::tester::Tester`] or the mock transport.

pub mod gpio;
pub mod i2c;
pub mod io_metrics;
pub mod spi;
pub mod sys_io;
pub mod uart;
