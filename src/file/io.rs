//! Low-level byte order and safe reading/writing utilities.
//!
//! This module provides endian-aware, bounds-checked reading of primitive types from byte
//! buffers and the matching appending writers. Module images, symbol files and IL streams are
//! all little-endian, so only the little-endian direction is provided.
//!
//! # Key Components
//!
//! - [`crate::file::io::CilIO`] - Trait defining byte conversions for primitive types
//! - [`crate::file::io::read_le_at`] - Read a value at an offset and advance the offset
//! - [`crate::file::io::write_le`] - Append a value to a growable buffer
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use cilcover::file::io::{read_le_at, write_le};
//!
//! let mut buffer = Vec::new();
//! write_le(&mut buffer, 0x0201_u16);
//! write_le(&mut buffer, -1_i32);
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&buffer, &mut offset)?, 0x0201);
//! assert_eq!(read_le_at::<i32>(&buffer, &mut offset)?, -1);
//! assert_eq!(offset, 6);
//! # Ok::<(), cilcover::Error>(())
//! ```

use crate::Result;

/// Trait for implementing type specific safe readers and writers.
///
/// Implemented for all fixed-size integer and floating point primitives used in CIL operands
/// and image headers.
pub trait CilIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Appends `value` to `buffer` in little-endian byte order.
pub fn write_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}
