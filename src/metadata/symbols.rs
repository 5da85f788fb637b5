//! Debug symbol file reading and writing.
//!
//! The symbol file accompanies a module under the same base name with the extension
//! [`SYMBOLS_EXTENSION`]. It holds the list of source documents and one sequence point blob per
//! method that has debug information.
//!
//! ```text
//! u32   magic   = 0x4244_5043  ("CPDB")
//! u16   version = 1
//! count documents, each: str absolute document path
//! count method records, each: u32 MethodDef token, blob sequence points
//! ```
//!
//! # Examples
//!
//! ```rust
//! use cilcover::metadata::symbols::SymbolFile;
//!
//! let symbols = SymbolFile {
//!     documents: vec!["/src/app/Program.cs".to_string()],
//!     methods: Vec::new(),
//! };
//! let bytes = symbols.to_bytes()?;
//! assert_eq!(SymbolFile::parse(&bytes)?, symbols);
//! # Ok::<(), cilcover::Error>(())
//! ```

use std::path::{Path, PathBuf};

use crate::{
    file::{parser::Parser, writer::Writer},
    metadata::{
        sequencepoints::{encode_sequence_points, parse_sequence_points, RawSequencePoint},
        token::Token,
    },
    Result,
};

/// Magic number at the start of every symbol file.
pub const SYMBOLS_MAGIC: u32 = 0x4244_5043;
/// Supported symbol file version.
pub const SYMBOLS_VERSION: u16 = 1;
/// File extension of symbol files.
pub const SYMBOLS_EXTENSION: &str = "pdb";

/// Debug information of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDebugRecord {
    /// MethodDef token of the method
    pub token: Token,
    /// Sequence points ordered by IL offset
    pub points: Vec<RawSequencePoint>,
}

/// Parsed contents of a symbol file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolFile {
    /// Absolute source document paths, referenced by index from sequence points
    pub documents: Vec<String>,
    /// Per-method sequence points
    pub methods: Vec<MethodDebugRecord>,
}

impl SymbolFile {
    /// Path of the symbol file belonging to the module at `module_path`.
    #[must_use]
    pub fn path_for(module_path: &Path) -> PathBuf {
        module_path.with_extension(SYMBOLS_EXTENSION)
    }

    /// Read and parse a symbol file from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or any parse error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    /// Parse a symbol file from memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong magic or version, or a sequence point
    /// referencing an unknown document, and [`crate::Error::OutOfBounds`] for truncated data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let magic = parser.read_le::<u32>()?;
        if magic != SYMBOLS_MAGIC {
            return Err(malformed_error!("Invalid symbol file magic - 0x{:08X}", magic));
        }
        let version = parser.read_le::<u16>()?;
        if version != SYMBOLS_VERSION {
            return Err(malformed_error!("Unsupported symbol file version {}", version));
        }

        let document_count = parser.read_compressed_uint()?;
        let mut documents = Vec::new();
        for _ in 0..document_count {
            documents.push(parser.read_prefixed_string_utf8()?);
        }

        let method_count = parser.read_compressed_uint()?;
        let mut methods = Vec::new();
        for _ in 0..method_count {
            let token = Token::new(parser.read_le::<u32>()?);
            let points = parse_sequence_points(parser.read_blob()?)?;
            if let Some(point) = points.iter().find(|point| point.document >= documents.len()) {
                return Err(malformed_error!(
                    "Method {} references unknown document {}",
                    token,
                    point.document + 1
                ));
            }
            methods.push(MethodDebugRecord { token, points });
        }

        Ok(SymbolFile { documents, methods })
    }

    /// Serialize this symbol file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a sequence point list cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new();
        writer.write_le(SYMBOLS_MAGIC);
        writer.write_le(SYMBOLS_VERSION);

        writer.write_count(self.documents.len())?;
        for document in &self.documents {
            writer.write_prefixed_string_utf8(document);
        }

        writer.write_count(self.methods.len())?;
        for record in &self.methods {
            writer.write_le(record.token.value());
            writer.write_blob(&encode_sequence_points(&record.points)?)?;
        }

        Ok(writer.into_inner())
    }
}
