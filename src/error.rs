use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Skip conditions during instrumentation (a module without debug symbols, a module with no
/// in-scope source) are not errors; they are reported as
/// [`crate::instrument::ModuleOutcome::Skipped`]. Everything in here either stops the
/// current run or rejects malformed input.
///
/// # Error Categories
///
/// ## File Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid image / symbol file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond buffer boundaries
/// - [`Error::NotSupported`] - Unsupported image version or feature
/// - [`Error::Empty`] - Empty input provided
///
/// ## Bytecode Errors
/// - [`Error::InvalidOpcode`] - Unknown or reserved opcode
/// - [`Error::InvalidOperand`] - Operand does not match the opcode's operand type
/// - [`Error::BranchTarget`] - Branch or handler boundary does not land on an instruction
///
/// ## Instrumentation Errors
/// - [`Error::AlreadyInstrumented`] - Module carries the marker but no backup to restore from
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust,no_run
/// use cilcover::{Error, metadata::module::Module};
/// use std::path::Path;
///
/// match Module::from_file(Path::new("Sample.dll")) {
///     Ok(module) => println!("Loaded {}", module.name),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This file type or version is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// An opcode byte sequence that is not part of the instruction set.
    ///
    /// The value holds the prefix byte in the high byte (`0xFE` for the extended page) and the
    /// opcode in the low byte.
    #[error("Invalid opcode: {0:04X}")]
    InvalidOpcode(u16),

    /// An instruction was built with an operand that does not match its opcode.
    #[error("Invalid operand for '{mnemonic}', expected {expected}")]
    InvalidOperand {
        /// Mnemonic of the offending instruction
        mnemonic: &'static str,
        /// Description of the operand the opcode requires
        expected: &'static str,
    },

    /// A branch or exception handler boundary does not resolve to an instruction.
    ///
    /// The value is the IL offset that failed to resolve.
    #[error("Branch or handler target 0x{0:04X} is not an instruction boundary")]
    BranchTarget(u32),

    /// A token does not reference a row of the module.
    #[error("Token {0} does not resolve to a row")]
    TokenNotFound(Token),

    /// The module already carries the instrumentation marker and no backup exists to restore it.
    ///
    /// This signals a caller error: the module was instrumented before and the pristine copy was
    /// lost. The module file is left untouched.
    #[error("Module '{}' is already instrumented", .0.display())]
    AlreadyInstrumented(PathBuf),
}
