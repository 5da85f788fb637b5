//! Module metadata and debug information.
//!
//! This module contains the object model the instrumenter operates on, together with the
//! readers and writers of the on-disk formats.
//!
//! # Key Components
//!
//! - [`module`] - [`module::Module`] and its type hierarchy
//! - [`method`] - Method definitions and method bodies with exception handling clauses
//! - [`sequencepoints`] - Source mapping of IL instructions and its compressed blob encoding
//! - [`symbols`] - The symbol file holding documents and per-method sequence points
//! - [`token`] - Metadata table row references
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilcover::metadata::module::Module;
//! use std::path::Path;
//!
//! let module = Module::from_file(Path::new("bin/Debug/App.dll"))?;
//! for (token, method) in module.methods() {
//!     println!("{} {} ({} sequence points)", token, method.name, method.sequence_points.len());
//! }
//! # Ok::<(), cilcover::Error>(())
//! ```

mod loader;
/// Method definitions and their bodies
pub mod method;
pub mod module;
pub mod sequencepoints;
pub mod symbols;
pub mod token;
mod writer;
