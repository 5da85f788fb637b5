// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilcover
//!
//! Statement coverage instrumentation for CIL modules.
//!
//! `cilcover` rewrites compiled modules so that every statement reports its execution to a
//! hits file. It maps IL instructions back to source spans through the module's debug symbols,
//! selects the instructions that start a statement, inserts a probe call in front of each of
//! them and repairs every branch and exception clause that entered at a displaced instruction.
//! The rewritten module behaves exactly like the original apart from the probe calls.
//!
//! ## Features
//!
//! - **Source scoped** - only statements of an explicit set of source files are instrumented
//! - **Structure preserving** - branch targets and exception clauses follow their statements
//!   into the probe sequence; short branches are widened where probes push them
//!   out of range
//! - **Rerunnable** - pristine backups are restored before every run, a marker attribute
//!   guards against instrumenting a module twice
//! - **Deterministic** - the same pristine modules always receive the same probe ids
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilcover::prelude::*;
//!
//! let config = InstrumentConfig::default()
//!     .with_hits_file("/work/coverage/hits")
//!     .with_scope(SourceScope::new("/work", ["/work/src/Program.cs"]))
//!     .with_companion("/tools/CilCover.HitServices.dll");
//!
//! let result = Instrumenter::new(config).run(&["/work/bin/App.dll"])?;
//! println!("{} statements instrumented", result.point_count());
//! # Ok::<(), cilcover::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`instrument`] - The instrumentation pipeline and its result model
//! - [`metadata`] - Module object model with debug symbols
//! - [`assembly`] - CIL instruction decoding and encoding
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and never installs a logger:
//! progress at `info`, per-module and per-method decisions at `debug`, dropped debug
//! information at `warn`.

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use cilcover::prelude::*;
///
/// let module = Module::from_file("bin/App.dll".as_ref())?;
/// println!("{} methods", module.methods().len());
/// # Ok::<(), cilcover::Error>(())
/// ```
pub mod prelude;

/// CIL instruction decoding and encoding based on ECMA-335
///
/// Instructions live in an [`assembly::InstructionStream`], which hands out stable
/// [`assembly::InstrId`] handles. Branch operands and exception clauses refer to instructions
/// by handle, so code can be inserted anywhere without invalidating them.
///
/// # Key Types
///
/// - [`assembly::Instruction`] - A CIL instruction with its operand
/// - [`assembly::Operand`] - Instruction operands
/// - [`assembly::InstructionStream`] - Instruction arena in program order
///
/// # Main Functions
///
/// - [`assembly::decode_stream`] - Decode IL bytes, resolving branch targets to handles
/// - [`assembly::encode_stream`] - Lay out and encode a stream, widening short branches
///
/// # Examples
///
/// ```rust
/// use cilcover::assembly::decode_stream;
///
/// let stream = decode_stream(&[0x00, 0x2A])?; // nop, ret
/// let ret = stream.ids()[1];
/// assert_eq!(stream.describe(ret)?, "IL_0001: ret");
/// # Ok::<(), cilcover::Error>(())
/// ```
pub mod assembly;

/// Statement coverage instrumentation
pub mod instrument;

/// Module images, method bodies and debug information
pub mod metadata;

/// `cilcover` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilcover` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use cilcover::{instrument::{InstrumentConfig, Instrumenter}, Error};
///
/// match Instrumenter::new(InstrumentConfig::default()).run(&["bin/App.dll"]) {
///     Ok(result) => println!("{} probes", result.point_count()),
///     Err(Error::AlreadyInstrumented(path)) => println!("restore {} first", path.display()),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Low-level cursor over binary data
pub use file::parser::Parser;
