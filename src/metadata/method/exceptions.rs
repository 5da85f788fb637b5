//! Exception handler representation for CIL method bodies.
//!
//! Region boundaries are instruction handles rather than byte ranges. A region ending at the end
//! of the method body has no instruction to point at and stores `None` as its end.

use bitflags::bitflags;

use crate::{assembly::InstrId, metadata::token::Token};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// The `class_token` field contains the metadata token of the exception type
        /// that this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// Exception handler defining a protected region and its handler within a method.
///
/// ```text
/// try {
///     // try_start .. try_end (exclusive)
/// }
/// catch (ExceptionType) {
///     // handler_start .. handler_end (exclusive)
/// }
/// ```
///
/// # References
/// - ECMA-335 6th Edition, Partition II, Section 25.4.6 - Exception Handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// First instruction of the try block.
    pub try_start: InstrId,
    /// First instruction after the try block, `None` if the block runs to the end of the body.
    pub try_end: Option<InstrId>,
    /// First instruction of the handler.
    pub handler_start: InstrId,
    /// First instruction after the handler, `None` if the handler runs to the end of the body.
    pub handler_end: Option<InstrId>,
    /// First instruction of the filter block, for `FILTER` clauses.
    pub filter_start: Option<InstrId>,
    /// Exception type caught by an `EXCEPTION` clause, null otherwise.
    pub class_token: Token,
}

impl ExceptionHandler {
    /// Returns `true` if this clause uses a filter block.
    #[must_use]
    pub fn is_filter(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FILTER)
    }

    /// Iterate all instruction references held by this handler.
    pub fn references(&self) -> impl Iterator<Item = InstrId> + '_ {
        [
            self.filter_start,
            Some(self.try_start),
            self.try_end,
            Some(self.handler_start),
            self.handler_end,
        ]
        .into_iter()
        .flatten()
    }
}
