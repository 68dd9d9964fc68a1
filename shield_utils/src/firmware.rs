//! The CRC-bearing configuration image the shield stores in its flash.
//!
//! ```text
//! +-------+---------+--------+-----------------+-----------+
//! | magic | version | length | payload         | crc32     |
//! | 4     | 4 (LE)  | 4 (LE) | `length` bytes  | 4 (LE)    |
//! +-------+---------+--------+-----------------+-----------+
//! ```
//! The CRC covers everything before it. The shield refuses to activate an image whose CRC
//! doesn't check out.

use flate2::read::GzDecoder;
use std::{
    io::Read,
    path::Path,
};
use thiserror::Error;

/// Image header magic
pub const MAGIC: [u8; 4] = *b"SHLD";
/// Bytes before the payload
pub const HEADER_LEN: usize = 12;
/// Bytes after the payload
pub const CRC_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Internal system IO error")]
    Io(#[from] std::io::Error),
    #[error("Not a shield image (bad magic)")]
    BadMagic,
    #[error("Image is truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("Image CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Crc { stored: u32, computed: u32 },
    #[error("Payload of {0} bytes doesn't fit in an image")]
    TooLarge(usize),
}

/// The fixed-size header at the start of every image
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    pub version: u32,
    /// Payload length in bytes
    pub length: u32,
}

impl ImageHeader {
    /// Parse a header from the first [`HEADER_LEN`] bytes of `bytes`
    /// # Errors
    /// Returns an error if the bytes are too short or don't start with [`MAGIC`]
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let header = bytes.get(..HEADER_LEN).ok_or(Error::Truncated {
            expected: HEADER_LEN,
            got: bytes.len(),
        })?;
        if header[..4] != MAGIC {
            return Err(Error::BadMagic);
        }
        Ok(Self {
            version: u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
            length: u32::from_le_bytes([header[8], header[9], header[10], header[11]]),
        })
    }

    /// Length of the whole encoded image (header, payload and CRC)
    #[must_use]
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.length as usize + CRC_LEN
    }
}

/// A configuration image ready to be streamed into the shield
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    version: u32,
    payload: Vec<u8>,
    md5: [u8; 16],
}

impl Image {
    /// Wrap a raw bitstream
    /// # Errors
    /// Returns an error if the payload is longer than the header can describe
    pub fn new(version: u32, payload: Vec<u8>) -> Result<Self, Error> {
        if u32::try_from(payload.len()).is_err() {
            return Err(Error::TooLarge(payload.len()));
        }
        let md5 = md5::compute(&payload).into();
        Ok(Self {
            version,
            payload,
            md5,
        })
    }

    /// Wrap a raw bitstream that may be gzip compressed
    /// # Errors
    /// Returns an error if decompression fails
    pub fn from_raw(version: u32, raw: &[u8]) -> Result<Self, Error> {
        if raw.starts_with(&[0x1F, 0x8B, 0x08]) {
            let mut z = GzDecoder::new(raw);
            let mut decompressed = vec![];
            z.read_to_end(&mut decompressed)?;
            Self::new(version, decompressed)
        } else {
            Self::new(version, raw.to_vec())
        }
    }

    /// Parse and verify an encoded image
    /// # Errors
    /// Returns an error on bad magic, truncation or CRC mismatch
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let header = ImageHeader::parse(bytes)?;
        let total = header.total_len();
        let image = bytes.get(..total).ok_or(Error::Truncated {
            expected: total,
            got: bytes.len(),
        })?;
        let (body, crc) = image.split_at(total - CRC_LEN);
        let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(Error::Crc { stored, computed });
        }
        Self::new(header.version, body[HEADER_LEN..].to_vec())
    }

    /// Encode the image with its header and CRC trailer
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&self.version.to_le_bytes());
        // Length was checked on construction
        bytes.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len() + CRC_LEN
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// MD5 of the payload, used to tell whether an image is already installed
    #[must_use]
    pub fn md5(&self) -> &[u8; 16] {
        &self.md5
    }

    #[must_use]
    pub fn md5_string(&self) -> String {
        self.md5.iter().map(|v| format!("{v:02x}")).collect()
    }
}

/// Reads a raw (optionally gzipped) bitstream from disk and wraps it as version `version`
/// # Errors
/// Returns an error on IO errors
pub fn read_image_file<T>(filename: T, version: u32) -> Result<Image, Error>
where
    T: AsRef<Path>,
{
    let raw = std::fs::read(filename)?;
    Image::from_raw(version, &raw)
}
