//! # Shield Utilities
//!
//! Board descriptions (form factors, restricted pins and peripheral role tables) and the
//! CRC-bearing firmware image format used by FPGA test shields.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod board;
pub mod firmware;
pub mod pins;
