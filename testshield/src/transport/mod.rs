//! Defines the register-level transport every way of reaching a shield must implement

pub mod mock;

use crate::core::Register;
use packed_struct::PackingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] ctlwire::Error),
    #[error("No set of control pins on this board completed a handshake")]
    NoControlPins,
    #[error("Pin {0} is carrying the control channel")]
    ControlPinConflict(String),
    #[error("Pin {0} is not part of the board's form factor")]
    NotInFormFactor(String),
    #[error("Pin {0} is restricted and may never be driven")]
    RestrictedPin(String),
    #[error("Register at {addr:#010x} is {expected} bytes wide, not {got}")]
    WidthMismatch {
        addr: u32,
        expected: usize,
        got: usize,
    },
    #[error("Failed to pack or unpack a register")]
    Packing(#[from] PackingError),
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("Out of bounds addressing")]
    OutOfBounds,
    #[error("Image of {size} bytes doesn't fit in a {slot} byte flash slot")]
    ImageTooLarge { size: u64, slot: u32 },
    #[error("Logical pin {0} doesn't exist")]
    BadLogicalPin(u8),
    #[error("Bad firmware image")]
    Image(#[from] shield_utils::firmware::Error),
    #[error("Internal system IO error")]
    Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, Error>;

/// Types that implement this trait can be serialized such that they can be written to shield
/// registers
pub trait Serialize {
    type Chunk;
    /// # Errors
    /// Returns an error if the value doesn't pack into its register layout
    fn serialize(&self) -> Result<Self::Chunk, PackingError>;
}

/// Types that implement this trait can be deserialized such that they can be read from shield
/// registers
pub trait Deserialize: Sized {
    type Chunk;
    /// # Errors
    /// Returns an error if the bytes aren't a valid value of this type
    fn deserialize(chunk: Self::Chunk) -> Result<Self, PackingError>;
}

/// Types that live at a fixed address in the shield's register space
pub trait Address {
    fn addr() -> u32;
}

macro_rules! ser_num {
    ($num:ty) => {
        impl Serialize for $num {
            type Chunk = [u8; core::mem::size_of::<$num>()];
            fn serialize(&self) -> Result<Self::Chunk, PackingError> {
                Ok(self.to_le_bytes())
            }
        }
    };
}

macro_rules! deser_num {
    ($num:ty) => {
        impl Deserialize for $num {
            type Chunk = [u8; core::mem::size_of::<$num>()];
            fn deserialize(chunk: Self::Chunk) -> Result<Self, PackingError> {
                Ok(<$num>::from_le_bytes(chunk))
            }
        }
    };
}

// The shield's register space is little endian throughout
ser_num!(u8);
ser_num!(u16);
ser_num!(u32);
ser_num!(u64);
ser_num!(i8);
ser_num!(i16);
ser_num!(i32);
ser_num!(i64);

deser_num!(u8);
deser_num!(u16);
deser_num!(u32);
deser_num!(u64);
deser_num!(i8);
deser_num!(i16);
deser_num!(i32);
deser_num!(i64);

impl Serialize for bool {
    type Chunk = [u8; 1];
    fn serialize(&self) -> Result<Self::Chunk, PackingError> {
        Ok([u8::from(*self)])
    }
}

impl Deserialize for bool {
    type Chunk = [u8; 1];
    fn deserialize(chunk: Self::Chunk) -> Result<Self, PackingError> {
        Ok(chunk[0] & 1 == 1)
    }
}

/// The trait that is implemented for every way of reaching a shield's register space.
///
/// Writes are visible to every later read of the same address; implementations never reorder or
/// batch across calls.
pub trait Transport {
    /// Read `n` bytes starting at `addr`
    /// # Errors
    /// Returns an error if the transport couldn't perform the read
    fn read_n_bytes(&mut self, addr: u32, n: usize) -> TransportResult<Vec<u8>>;

    /// Write `data` starting at `addr`
    /// # Errors
    /// Returns an error if the transport couldn't perform the write
    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> TransportResult<()>;

    /// Read `N` bytes starting at `addr` into a const-sized array
    /// # Errors
    /// Returns an error if the transport couldn't perform the read
    fn read_bytes<const N: usize>(&mut self, addr: u32) -> TransportResult<[u8; N]> {
        let bytes = self.read_n_bytes(addr, N)?;
        bytes.try_into().map_err(|_| Error::OutOfBounds)
    }

    /// Generically read a `Deserialize` type `T` from `addr`
    /// # Example
    /// ```
    /// # use testshield::{core::Register, transport::{mock::Mock, Transport}};
    /// # let mut transport = Mock::new(&[Register::new(0x4, 4)]);
    /// let my_num: u32 = transport.read(0x4).unwrap();
    /// ```
    /// # Errors
    /// Returns an error on transport errors or invalid register contents
    fn read<T, const N: usize>(&mut self, addr: u32) -> TransportResult<T>
    where
        T: Deserialize<Chunk = [u8; N]>,
    {
        let bytes: [u8; N] = self.read_bytes(addr)?;
        Ok(T::deserialize(bytes)?)
    }

    /// Generically write a `Serialize` type `T` to `addr`
    /// # Example
    /// ```
    /// # use testshield::{core::Register, transport::{mock::Mock, Transport}};
    /// # let mut transport = Mock::new(&[Register::new(0x4, 4)]);
    /// transport.write(0x4, &0xDEAD_BEEFu32).unwrap();
    /// ```
    /// # Errors
    /// Returns an error on transport errors or if `data` doesn't pack
    fn write<T, const N: usize>(&mut self, addr: u32, data: &T) -> TransportResult<()>
    where
        T: Serialize<Chunk = [u8; N]>,
    {
        self.write_bytes(addr, &data.serialize()?)
    }

    /// Read `reg`, checking that `T` is exactly as wide as the register
    /// # Errors
    /// Returns an error on width mismatch or transport errors
    fn read_reg<T, const N: usize>(&mut self, reg: Register) -> TransportResult<T>
    where
        T: Deserialize<Chunk = [u8; N]>,
    {
        check_width(reg, N)?;
        self.read(reg.addr)
    }

    /// Write `data` to `reg`, checking that `T` is exactly as wide as the register
    /// # Errors
    /// Returns an error on width mismatch or transport errors
    fn write_reg<T, const N: usize>(&mut self, reg: Register, data: &T) -> TransportResult<()>
    where
        T: Serialize<Chunk = [u8; N]>,
    {
        check_width(reg, N)?;
        self.write(reg.addr, data)
    }

    /// Read a type that knows its own address
    /// # Errors
    /// Returns an error on transport errors or invalid register contents
    fn read_addr<T, const N: usize>(&mut self) -> TransportResult<T>
    where
        T: Deserialize<Chunk = [u8; N]> + Address,
    {
        self.read(T::addr())
    }

    /// Write a type that knows its own address
    /// # Errors
    /// Returns an error on transport errors or if `data` doesn't pack
    fn write_addr<T, const N: usize>(&mut self, data: &T) -> TransportResult<()>
    where
        T: Serialize<Chunk = [u8; N]> + Address,
    {
        self.write(T::addr(), data)
    }
}

fn check_width(reg: Register, got: usize) -> TransportResult<()> {
    if reg.width == got {
        Ok(())
    } else {
        Err(Error::WidthMismatch {
            addr: reg.addr,
            expected: reg.width,
            got,
        })
    }
}
