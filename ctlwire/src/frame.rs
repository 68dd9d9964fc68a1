//! An IO-agnostic encoding of control channel frame headers.
//!
//! Every frame starts with the 8 byte sync [`KEY`] followed by an 8 byte [`Header`]:
//! `[miso_index, aux_index, op, len, addr (u32, little endian)]`.

use crate::Error;
use num_derive::{
    FromPrimitive,
    ToPrimitive,
};
use num_traits::{
    FromPrimitive,
    ToPrimitive,
};

/// Sync sequence the shield hunts for on every pin pair
pub const KEY: [u8; 8] = [0x92, 0x9D, 0x9A, 0x9B, 0x29, 0xAA, 0x28, 0xD9];

/// Encoded size of a [`Header`]
pub const HEADER_LEN: usize = 8;

/// Most data bytes a single frame can carry
pub const MAX_FRAME_DATA: usize = 0xFF;

/// The [`KEY`] as the shift register value a receiver sees after clocking it in
#[must_use]
pub const fn key_word() -> u64 {
    u64::from_be_bytes(KEY)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Op {
    Read = 0,
    Write = 1,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    /// Shield index of the pin the shield should drive read data on
    pub miso_index: u8,
    /// Shield index of the pin the host holds high for the duration of the frame
    pub aux_index: u8,
    pub op: Op,
    /// Number of data bytes, 1 to [`MAX_FRAME_DATA`]
    pub len: u8,
    pub addr: u32,
}

impl Header {
    #[must_use]
    pub fn pack(&self) -> [u8; HEADER_LEN] {
        let addr = self.addr.to_le_bytes();
        [
            self.miso_index,
            self.aux_index,
            self.op.to_u8().unwrap_or_default(),
            self.len,
            addr[0],
            addr[1],
            addr[2],
            addr[3],
        ]
    }

    /// Given the bytes following the key, reconstruct the header
    /// # Errors
    /// Returns an error on short input, unknown operations or zero length frames
    pub fn unpack(bytes: &[u8]) -> Result<Self, Error> {
        let bytes = bytes.get(..HEADER_LEN).ok_or(Error::Incomplete)?;
        let op = Op::from_u8(bytes[2]).ok_or(Error::BadOp(bytes[2]))?;
        if bytes[3] == 0 {
            return Err(Error::BadLength(0));
        }
        Ok(Self {
            miso_index: bytes[0],
            aux_index: bytes[1],
            op,
            len: bytes[3],
            addr: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}
