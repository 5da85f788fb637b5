//! Growable little-endian output buffer, the writing counterpart of
//! [`crate::file::parser::Parser`].
//!
//! Every encoding read by the parser has a matching `write_*` method here, so an image or symbol
//! file serialized by [`Writer`] parses back with the same field sequence.
//!
//! ```rust,ignore
//! use cilcover::{file::writer::Writer, Parser};
//!
//! let mut writer = Writer::new();
//! writer.write_compressed_uint(0x2E57)?;
//! writer.write_prefixed_string_utf8("Hello");
//!
//! let bytes = writer.into_inner();
//! let mut parser = Parser::new(&bytes);
//! assert_eq!(parser.read_compressed_uint()?, 0x2E57);
//! assert_eq!(parser.read_prefixed_string_utf8()?, "Hello");
//! # Ok::<(), cilcover::Error>(())
//! ```

use crate::{
    file::io::{write_le, CilIO},
    Result,
};

/// Largest value representable by the ECMA-335 compressed unsigned integer encoding.
pub const MAX_COMPRESSED_UINT: u32 = 0x1FFF_FFFF;

/// An append-only byte buffer.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    data: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Writer { data: Vec::new() }
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.data.len()
    }

    /// Consumes the writer and returns the written bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Append `value` in little-endian byte order.
    pub fn write_le<T: CilIO>(&mut self, value: T) {
        write_le(&mut self.data, value);
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Pad with zero bytes up to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        while self.data.len() % alignment != 0 {
            self.data.push(0);
        }
    }

    /// Append a compressed unsigned integer as defined in ECMA-335 II.23.2.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` exceeds [`MAX_COMPRESSED_UINT`].
    pub fn write_compressed_uint(&mut self, value: u32) -> Result<()> {
        match value {
            0..=0x7F => {
                #[allow(clippy::cast_possible_truncation)]
                self.data.push(value as u8);
            }
            0x80..=0x3FFF => {
                #[allow(clippy::cast_possible_truncation)]
                self.data
                    .extend_from_slice(&[0x80 | (value >> 8) as u8, value as u8]);
            }
            0x4000..=MAX_COMPRESSED_UINT => {
                #[allow(clippy::cast_possible_truncation)]
                self.data.extend_from_slice(&[
                    0xC0 | (value >> 24) as u8,
                    (value >> 16) as u8,
                    (value >> 8) as u8,
                    value as u8,
                ]);
            }
            _ => {
                return Err(malformed_error!(
                    "Value {} exceeds the compressed integer range",
                    value
                ))
            }
        }

        Ok(())
    }

    /// Append a compressed signed integer (sign in the least significant bit).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the encoded magnitude exceeds
    /// [`MAX_COMPRESSED_UINT`].
    pub fn write_compressed_int(&mut self, value: i32) -> Result<()> {
        let encoded = if value >= 0 {
            value.unsigned_abs() << 1
        } else {
            ((value.unsigned_abs() - 1) << 1) | 1
        };

        self.write_compressed_uint(encoded)
    }

    /// Append a 7-bit encoded integer (LEB128 style, low bits first).
    pub fn write_7bit_encoded_int(&mut self, mut value: u32) {
        loop {
            #[allow(clippy::cast_possible_truncation)]
            let low = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.data.push(low);
                break;
            }
            self.data.push(low | 0x80);
        }
    }

    /// Append a UTF-8 string prefixed with its 7-bit encoded byte length.
    pub fn write_prefixed_string_utf8(&mut self, value: &str) {
        #[allow(clippy::cast_possible_truncation)]
        self.write_7bit_encoded_int(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Append a blob: compressed unsigned length followed by the raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob is longer than [`MAX_COMPRESSED_UINT`].
    pub fn write_blob(&mut self, blob: &[u8]) -> Result<()> {
        let Ok(length) = u32::try_from(blob.len()) else {
            return Err(malformed_error!("Blob of {} bytes is too large", blob.len()));
        };
        self.write_compressed_uint(length)?;
        self.data.extend_from_slice(blob);
        Ok(())
    }

    /// Append a collection count as a compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the count exceeds [`MAX_COMPRESSED_UINT`].
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        let Ok(count) = u32::try_from(count) else {
            return Err(malformed_error!("Count {} is too large", count));
        };
        self.write_compressed_uint(count)
    }
}
