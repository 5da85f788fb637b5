//! Metadata tokens for cross-references between module rows.
//!
//! Tokens consist of a 32-bit value where the high byte identifies the table and the low
//! 24 bits are the 1-based row index within that table. The table identifiers used by the
//! module image format follow ECMA-335 II.22.

use std::fmt;

/// A metadata token representing a reference to a metadata table entry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Table identifier of type definitions
    pub const TYPE_DEF: u8 = 0x02;
    /// Table identifier of method definitions
    pub const METHOD_DEF: u8 = 0x06;
    /// Table identifier of member references
    pub const MEMBER_REF: u8 = 0x0A;
    /// Heap identifier of user strings (`ldstr` operands)
    pub const USER_STRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table identifier and a 1-based row index
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts() {
        let token = Token::from_parts(Token::MEMBER_REF, 3);
        assert_eq!(token.value(), 0x0A00_0003);
        assert_eq!(token.table(), Token::MEMBER_REF);
        assert_eq!(token.row(), 3);
        assert!(!token.is_null());
        assert!(Token::new(0).is_null());
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Token::new(0x7000_0001)), "0x70000001");
    }
}
